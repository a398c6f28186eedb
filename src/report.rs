//! Human-readable output shared by the command-line front-ends.
//!
//! Everything here prints to stdout; diagnostics stay on the log/stderr
//! side so command output remains pipeable.

use std::io::Write;

use crate::cache::FileInfo;
use crate::dentry::{FileAttributes, SecondaryFlags};
use crate::disk::ImageIo;
use crate::error::{Error, Result};
use crate::volume::Volume;

/// Boot-sector geometry table, as printed by `exfat-statfs`.
pub fn print_boot<I: ImageIo>(volume: &Volume<I>) -> Result<()> {
    let boot = volume.boot();

    println!(
        "{:<28}\t: {:#010x} (sector)",
        "media-relative sector offset", boot.partition_offset
    );
    println!(
        "{:<28}\t: {:#010x} (sector)",
        "Offset of the First FAT", boot.fat_offset
    );
    println!(
        "{:<28}\t: {:>10} (sector)",
        "Length of FAT table", boot.fat_length
    );
    println!(
        "{:<28}\t: {:#010x} (sector)",
        "Offset of the Cluster Heap", boot.cluster_heap_offset
    );
    println!(
        "{:<28}\t: {:>10} (cluster)",
        "The number of clusters", boot.cluster_count
    );
    println!(
        "{:<28}\t: {:>10} (cluster)",
        "The first cluster of the root", boot.first_cluster_of_root_directory
    );
    println!(
        "{:<28}\t: {:>10} (sector)",
        "Size of exFAT volumes", boot.volume_length
    );
    println!(
        "{:<28}\t: {:>10} (byte)",
        "Bytes per sector",
        volume.sector_size()
    );
    println!(
        "{:<28}\t: {:>10} (byte)",
        "Bytes per cluster",
        volume.cluster_size()
    );
    println!(
        "{:<28}\t: {:>10}",
        "The number of FATs", boot.number_of_fats
    );
    if boot.percent_in_use != 0xFF {
        println!(
            "{:<28}\t: {:>10} (%)",
            "The percentage of clusters", boot.percent_in_use
        );
    } else {
        println!("{:<28}\t: {:>10}", "The percentage of clusters", "unknown");
    }
    if let Some(label) = volume.label() {
        println!("{:<28}\t: {label:>10}", "Volume label");
    }
    println!();
    Ok(())
}

fn attr_letters(f: &FileInfo) -> String {
    let flag = |set: bool, c: char| if set { c } else { '-' };
    [
        flag(f.attr.contains(FileAttributes::READ_ONLY), 'R'),
        flag(f.attr.contains(FileAttributes::HIDDEN), 'H'),
        flag(f.attr.contains(FileAttributes::SYSTEM), 'S'),
        flag(f.attr.contains(FileAttributes::DIRECTORY), 'D'),
        flag(f.attr.contains(FileAttributes::ARCHIVE), 'A'),
    ]
    .iter()
    .collect()
}

fn print_dentry_line(f: &FileInfo) {
    println!("{} {:>8} {} {}", attr_letters(f), f.datalen, f.mtime, f.name);
}

/// Long-listing of `path`, as printed by `exfat-ls`.
///
/// For a directory every child is listed in on-disk order; for a file its
/// own row is printed.
pub fn ls<I: ImageIo>(volume: &mut Volume<I>, path: &str) -> Result<()> {
    let target = volume.lookup(path)?;

    if target.is_directory() {
        let cluster = target.first_cluster;
        volume.traverse_directory(cluster)?;
        let slot = volume
            .cache()
            .slot_of(cluster)
            .ok_or_else(|| Error::NotFound(path.to_string()))?;
        for child in slot.children() {
            print_dentry_line(child);
        }
    } else {
        if path.ends_with('/') {
            return Err(Error::NotFound(path.to_string()));
        }
        print_dentry_line(&target);
    }
    Ok(())
}

/// Per-file metadata and fragmentation, as printed by `exfat-stat`.
pub fn stat<I: ImageIo>(volume: &mut Volume<I>, path: &str) -> Result<()> {
    let f = volume.lookup(path)?;

    println!("{:<8}: {}", "File", f.name);
    println!("{:<8}: {}", "Size", f.datalen);
    println!(
        "{:<8}: {} (Fragment: {:.8}%)",
        "Cluster",
        volume.cluster_run_length(&f),
        volume.fragmentation(&f)?
    );
    println!("{:<8}: {:#010x}", "First", f.first_cluster);
    println!("{:<8}: {}", "Attr", attr_letters(&f));
    println!(
        "{:<8}: {} / {}",
        "Flags",
        if f.flags.contains(SecondaryFlags::NO_FAT_CHAIN) {
            "NoFatChain"
        } else {
            "FatChain"
        },
        if f.flags.contains(SecondaryFlags::ALLOCATION_POSSIBLE) {
            "AllocationPossible"
        } else {
            "AllocationImpossible"
        }
    );
    println!("{:<8}: {}", "Access", f.atime);
    println!("{:<8}: {}", "Modify", f.mtime);
    println!("{:<8}: {}", "Create", f.ctime);
    println!();
    Ok(())
}

/// Streams a file's bytes to `out`, as `exfat-cat` does with stdout.
///
/// A truncated chain still writes what was recovered, then surfaces the
/// fault as an inconsistency so the command exits non-zero.
pub fn cat<I: ImageIo>(volume: &mut Volume<I>, path: &str, out: &mut dyn Write) -> Result<()> {
    let f = volume.lookup(path)?;
    if f.is_directory() {
        return Err(Error::InvalidArgument(format!("{path} is a directory")));
    }

    let concat = volume.concat_clusters(&f)?;
    let len = f.datalen.min(concat.data.len() as u64) as usize;
    out.write_all(&concat.data[..len])?;

    if let Some(fault) = concat.fault {
        return Err(Error::Inconsistency(fault.to_string()));
    }
    Ok(())
}
