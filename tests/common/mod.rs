#![allow(dead_code)] // each test binary uses a different slice of the fixtures

//! In-memory exFAT image fixtures.
//!
//! Builds a small but fully valid volume: boot region with checksum sector,
//! one FAT, Allocation Bitmap, Up-case table and a root directory, plus
//! whatever files and subdirectories a test asks for. Tests then corrupt the
//! returned bytes to provoke the failure they are interested in.

use std::collections::BTreeMap;

use exfat_inspect::checksum;

pub const SECTOR: usize = 512;
pub const SPC_SHIFT: u8 = 2;
pub const CLUSTER: usize = SECTOR << SPC_SHIFT;
pub const VOLUME_SECTORS: u64 = 4096;
pub const FAT_OFFSET: u32 = 32;
pub const FAT_LENGTH: u32 = 16;
pub const HEAP_OFFSET: u32 = 64;
pub const CLUSTER_COUNT: u32 = (VOLUME_SECTORS as u32 - HEAP_OFFSET) >> SPC_SHIFT;

pub const BITMAP_CLUSTER: u32 = 2;
pub const UPCASE_CLUSTER: u32 = 3;
pub const ROOT_CLUSTER: u32 = 4;

pub const LAST: u32 = 0xFFFFFFFF;

/// 2021-03-14 15:09:26 packed as an exFAT timestamp.
pub const TIMESTAMP: u32 =
    ((2021 - 1980) << 25) | (3 << 21) | (14 << 16) | (15 << 11) | (9 << 5) | (26 / 2);

pub struct ImageBuilder {
    image: Vec<u8>,
    bitmap: Vec<u8>,
    dirs: BTreeMap<u32, Vec<[u8; 32]>>,
    label: Option<&'static str>,
}

fn upcase_bytes() -> Vec<u8> {
    // Identity table over the first 128 code units, except a-z -> A-Z.
    let mut raw = vec![0u8; 128 * 2];
    for c in b'a'..=b'z' {
        let upper = (c - b'a' + b'A') as u16;
        raw[c as usize * 2..c as usize * 2 + 2].copy_from_slice(&upper.to_le_bytes());
    }
    raw
}

fn upcase_unit(unit: u16) -> u16 {
    if (b'a' as u16..=b'z' as u16).contains(&unit) {
        unit - b'a' as u16 + b'A' as u16
    } else {
        unit
    }
}

impl ImageBuilder {
    pub fn new() -> ImageBuilder {
        let mut builder = ImageBuilder {
            image: vec![0u8; VOLUME_SECTORS as usize * SECTOR],
            bitmap: vec![0u8; (CLUSTER_COUNT as usize).div_ceil(8)],
            dirs: BTreeMap::new(),
            label: None,
        };

        builder.set_fat_raw(0, 0xFFFFFFF8);
        builder.set_fat_raw(1, LAST);
        for cluster in [BITMAP_CLUSTER, UPCASE_CLUSTER, ROOT_CLUSTER] {
            builder.set_fat(cluster, LAST);
            builder.set_bitmap_bit(cluster, true);
        }
        builder.dirs.insert(ROOT_CLUSTER, Vec::new());
        builder
    }

    pub fn with_label(mut self, label: &'static str) -> ImageBuilder {
        self.label = Some(label);
        self
    }

    fn set_fat_raw(&mut self, index: u32, value: u32) {
        let offset = FAT_OFFSET as usize * SECTOR + index as usize * 4;
        self.image[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    }

    pub fn set_fat(&mut self, cluster: u32, value: u32) {
        self.set_fat_raw(cluster, value);
    }

    pub fn set_bitmap_bit(&mut self, cluster: u32, value: bool) {
        let index = (cluster - 2) as usize;
        if value {
            self.bitmap[index / 8] |= 1 << (index % 8);
        } else {
            self.bitmap[index / 8] &= !(1 << (index % 8));
        }
    }

    pub fn cluster_offset(cluster: u32) -> usize {
        HEAP_OFFSET as usize * SECTOR + (cluster as usize - 2) * CLUSTER
    }

    pub fn write_cluster(&mut self, cluster: u32, data: &[u8]) {
        let offset = Self::cluster_offset(cluster);
        self.image[offset..offset + data.len()].copy_from_slice(data);
    }

    pub fn entry_set(
        name: &str,
        attributes: u16,
        flags: u8,
        first_cluster: u32,
        datalen: u64,
    ) -> Vec<[u8; 32]> {
        let units: Vec<u16> = name.encode_utf16().collect();
        let upcased: Vec<u16> = units.iter().map(|&u| upcase_unit(u)).collect();
        let name_entries = units.chunks(15).count().max(1);
        let secondary_count = (1 + name_entries) as u8;

        let mut file = [0u8; 32];
        file[0] = 0x85;
        file[1] = secondary_count;
        file[4..6].copy_from_slice(&attributes.to_le_bytes());
        file[8..12].copy_from_slice(&TIMESTAMP.to_le_bytes());
        file[12..16].copy_from_slice(&TIMESTAMP.to_le_bytes());
        file[16..20].copy_from_slice(&TIMESTAMP.to_le_bytes());

        let mut stream = [0u8; 32];
        stream[0] = 0xC0;
        stream[1] = flags;
        stream[3] = units.len() as u8;
        stream[4..6].copy_from_slice(&checksum::name_hash(&upcased).to_le_bytes());
        stream[8..16].copy_from_slice(&datalen.to_le_bytes());
        stream[20..24].copy_from_slice(&first_cluster.to_le_bytes());
        stream[24..32].copy_from_slice(&datalen.to_le_bytes());

        let mut set = vec![file, stream];
        for chunk in units.chunks(15) {
            let mut entry = [0u8; 32];
            entry[0] = 0xC1;
            for (i, unit) in chunk.iter().enumerate() {
                entry[2 + i * 2..4 + i * 2].copy_from_slice(&unit.to_le_bytes());
            }
            set.push(entry);
        }

        let flat: Vec<u8> = set.iter().flatten().copied().collect();
        let sum = checksum::entry_set(&flat, secondary_count);
        set[0][2..4].copy_from_slice(&sum.to_le_bytes());
        set
    }

    /// Adds a file under `dir`, spreading `data` over `clusters`.
    ///
    /// FAT-chained unless `no_fat_chain`; the chain links the clusters in
    /// the order given.
    pub fn add_file_at(
        &mut self,
        dir: u32,
        name: &str,
        clusters: &[u32],
        data: &[u8],
        no_fat_chain: bool,
    ) {
        for (i, &cluster) in clusters.iter().enumerate() {
            let chunk = &data[(i * CLUSTER).min(data.len())..((i + 1) * CLUSTER).min(data.len())];
            self.write_cluster(cluster, chunk);
            self.set_bitmap_bit(cluster, true);
            if !no_fat_chain {
                let next = clusters.get(i + 1).copied().unwrap_or(LAST);
                self.set_fat(cluster, next);
            }
        }

        let flags = if no_fat_chain { 0x03 } else { 0x01 };
        let first = clusters.first().copied().unwrap_or(0);
        let set = Self::entry_set(name, 0x20, flags, first, data.len() as u64);
        self.dirs.entry(dir).or_default().extend(set);
    }

    pub fn add_file(&mut self, name: &str, clusters: &[u32], data: &[u8], no_fat_chain: bool) {
        self.add_file_at(ROOT_CLUSTER, name, clusters, data, no_fat_chain);
    }

    /// Adds an empty single-cluster subdirectory under the root.
    pub fn add_subdir(&mut self, name: &str, first_cluster: u32) {
        self.set_fat(first_cluster, LAST);
        self.set_bitmap_bit(first_cluster, true);
        let set = Self::entry_set(name, 0x10, 0x01, first_cluster, CLUSTER as u64);
        self.dirs.entry(ROOT_CLUSTER).or_default().extend(set);
        self.dirs.entry(first_cluster).or_default();
    }

    /// Appends a raw 32-byte entry to a directory, for crafting holes and
    /// deleted entries.
    pub fn push_raw_entry(&mut self, dir: u32, entry: [u8; 32]) {
        self.dirs.entry(dir).or_default().push(entry);
    }

    fn boot_sector(&self) -> [u8; SECTOR] {
        let mut sector = [0u8; SECTOR];
        sector[0..3].copy_from_slice(&[0xEB, 0x76, 0x90]);
        sector[3..11].copy_from_slice(b"EXFAT   ");
        sector[72..80].copy_from_slice(&VOLUME_SECTORS.to_le_bytes());
        sector[80..84].copy_from_slice(&FAT_OFFSET.to_le_bytes());
        sector[84..88].copy_from_slice(&FAT_LENGTH.to_le_bytes());
        sector[88..92].copy_from_slice(&HEAP_OFFSET.to_le_bytes());
        sector[92..96].copy_from_slice(&CLUSTER_COUNT.to_le_bytes());
        sector[96..100].copy_from_slice(&ROOT_CLUSTER.to_le_bytes());
        sector[100..104].copy_from_slice(&0xDEADBEEFu32.to_le_bytes());
        sector[104..106].copy_from_slice(&0x0100u16.to_le_bytes());
        sector[108] = 9;
        sector[109] = SPC_SHIFT;
        sector[110] = 1;
        sector[111] = 0x80;
        sector[112] = 0xFF;
        for byte in &mut sector[120..510] {
            *byte = 0xF4;
        }
        sector[510..512].copy_from_slice(&0xAA55u16.to_le_bytes());
        sector
    }

    pub fn finish(mut self) -> Vec<u8> {
        // Boot region: main boot sector, extended boot sectors, checksum.
        let boot = self.boot_sector();
        self.image[0..SECTOR].copy_from_slice(&boot);
        for i in 1..=8 {
            let end = (i + 1) * SECTOR;
            self.image[end - 4..end].copy_from_slice(&0xAA550000u32.to_le_bytes());
        }
        let sum = checksum::boot_region(&self.image[..SECTOR * 11]).to_le_bytes();
        for word in self.image[SECTOR * 11..SECTOR * 12].chunks_exact_mut(4) {
            word.copy_from_slice(&sum);
        }

        // Metadata clusters.
        let bitmap = self.bitmap.clone();
        self.write_cluster(BITMAP_CLUSTER, &bitmap);
        let upcase = upcase_bytes();
        self.write_cluster(UPCASE_CLUSTER, &upcase);

        // Root metadata entries come first, then the queued entry sets.
        let mut root = Vec::new();
        if let Some(label) = self.label {
            let mut entry = [0u8; 32];
            entry[0] = 0x83;
            let units: Vec<u16> = label.encode_utf16().collect();
            entry[1] = units.len() as u8;
            for (i, unit) in units.iter().take(11).enumerate() {
                entry[2 + i * 2..4 + i * 2].copy_from_slice(&unit.to_le_bytes());
            }
            root.push(entry);
        }

        let mut bitmap_entry = [0u8; 32];
        bitmap_entry[0] = 0x81;
        bitmap_entry[20..24].copy_from_slice(&BITMAP_CLUSTER.to_le_bytes());
        bitmap_entry[24..32].copy_from_slice(&(bitmap.len() as u64).to_le_bytes());
        root.push(bitmap_entry);

        let mut upcase_entry = [0u8; 32];
        upcase_entry[0] = 0x82;
        upcase_entry[4..8].copy_from_slice(&checksum::upcase_table(&upcase).to_le_bytes());
        upcase_entry[20..24].copy_from_slice(&UPCASE_CLUSTER.to_le_bytes());
        upcase_entry[24..32].copy_from_slice(&(upcase.len() as u64).to_le_bytes());
        root.push(upcase_entry);

        root.extend(self.dirs.remove(&ROOT_CLUSTER).unwrap_or_default());

        let dirs = std::mem::take(&mut self.dirs);
        for (cluster, entries) in std::iter::once((ROOT_CLUSTER, root)).chain(dirs) {
            assert!(entries.len() * 32 <= CLUSTER, "directory overflows a cluster");
            let flat: Vec<u8> = entries.iter().flatten().copied().collect();
            self.write_cluster(cluster, &flat);
        }

        self.image
    }
}

/// An image with nothing but the required metadata.
pub fn empty_volume() -> Vec<u8> {
    ImageBuilder::new().with_label("TEST").finish()
}
