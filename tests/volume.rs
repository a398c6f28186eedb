mod common;

use common::*;
use exfat_inspect::{Error, volume::Volume};

#[test]
fn open_decodes_geometry() {
    let volume = Volume::open(empty_volume()).unwrap();

    assert_eq!(volume.sector_size(), SECTOR as u32);
    assert_eq!(volume.cluster_size(), CLUSTER as u32);
    assert_eq!(volume.cluster_count(), CLUSTER_COUNT);
    assert_eq!(volume.fat_offset(), FAT_OFFSET);
    assert_eq!(volume.heap_offset(), HEAP_OFFSET);
    assert_eq!(volume.root_cluster(), ROOT_CLUSTER);
    assert_eq!(
        volume.fat_length(),
        FAT_LENGTH as u64 * SECTOR as u64
    );
    assert_eq!(volume.total_size(), VOLUME_SECTORS * SECTOR as u64);
}

#[test]
fn rejects_corrupt_superblock() {
    let mut image = empty_volume();
    image[0] = 0x00; // break JumpBoot
    image[112] = 120; // PercentInUse beyond 100

    match Volume::open(image) {
        Err(Error::InvalidSuperblock(n)) => assert_eq!(n, 2),
        other => panic!("expected superblock failure, got {other:?}"),
    }
}

#[test]
fn boot_region_verifies_clean_image() {
    let volume = Volume::open(empty_volume()).unwrap();
    volume.verify_boot_region().unwrap();
}

#[test]
fn boot_checksum_detects_damage() {
    let mut image = empty_volume();
    image[300] ^= 0xFF; // inside the boot code, not covered by validate()

    let volume = Volume::open(image).unwrap();
    assert!(matches!(
        volume.verify_boot_checksum(),
        Err(Error::InvalidSuperblock(_))
    ));
}

#[test]
fn extended_boot_signature_is_checked() {
    let mut image = empty_volume();
    let end = 2 * SECTOR;
    image[end - 4..end].copy_from_slice(&[0, 0, 0, 0]);

    let volume = Volume::open(image).unwrap();
    assert!(volume.check_extended_boot_sectors().is_err());
}

#[test]
fn reads_volume_label_and_root() {
    let mut volume = Volume::open(empty_volume()).unwrap();
    volume.traverse_root_directory().unwrap();

    assert_eq!(volume.label().as_deref(), Some("TEST"));

    let root = volume.lookup("/").unwrap();
    assert!(root.is_directory());
    assert_eq!(root.first_cluster, ROOT_CLUSTER);
    assert_eq!(root.name, "/");
    assert_eq!(root.datalen, CLUSTER as u64);
}

#[test]
fn bitmap_and_upcase_are_loaded_once() {
    let mut volume = Volume::open(empty_volume()).unwrap();
    volume.traverse_root_directory().unwrap();

    let bitmap = volume.bitmap().expect("bitmap loaded");
    assert_eq!(bitmap.first_cluster, BITMAP_CLUSTER);
    assert!(bitmap.map.get(ROOT_CLUSTER).unwrap());
    assert!(!bitmap.map.get(8).unwrap());

    let upcase = volume.upcase().expect("up-case loaded");
    assert_eq!(upcase.first_cluster(), UPCASE_CLUSTER);
    assert_eq!(upcase.upcase(b'a' as u16), b'A' as u16);
}

#[test]
fn opens_from_a_file_backend() {
    use std::io::Write;

    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(&empty_volume()).unwrap();
    file.flush().unwrap();

    let mut volume = Volume::open_path(file.path()).unwrap();
    volume.verify_boot_region().unwrap();
    volume.traverse_root_directory().unwrap();

    let report = volume.check_consistency().unwrap();
    assert_eq!(report.inconsistencies(), 0);
}
