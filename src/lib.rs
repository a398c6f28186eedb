//! # exFAT inspect
//!
//! Read-only diagnostics for raw exFAT filesystem images.
//!
//! The crate decodes the on-disk structures of an exFAT volume (boot region,
//! FAT, Allocation Bitmap, Up-case table, directory entry sets) and exposes
//! the typed operations behind the `exfat-ls`, `exfat-cat`, `exfat-stat`,
//! `exfat-statfs` and `exfat-check` command-line tools.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use exfat_inspect::volume::Volume;
//!
//! let mut volume = Volume::open_path("disk.img".as_ref()).unwrap();
//! volume.traverse_root_directory().unwrap();
//!
//! let file = volume.lookup("/FOO.TXT").unwrap();
//! let concat = volume.concat_clusters(&file).unwrap();
//! let len = file.datalen.min(concat.data.len() as u64) as usize;
//! std::io::Write::write_all(&mut std::io::stdout(), &concat.data[..len]).unwrap();
//! ```
//!
//! ## Limitations
//! The cluster heap is never modified: the tools read images at rest and only
//! report what they find. TexFAT second FATs and FAT12/16/32 volumes are not
//! supported.

pub mod bitmap;
pub mod boot;
pub mod cache;
pub mod check;
pub mod checksum;
pub mod cluster;
pub mod dentry;
/// Directory traversal and path resolution
pub mod dir;
/// Positional image I/O
pub mod disk;
pub mod error;
pub mod fat;
pub mod report;
pub mod timestamp;
pub mod upcase;
pub mod volume;

pub use error::{Error, Result};

/// Index of the first addressable cluster in the heap.
pub const FIRST_CLUSTER: u32 = 2;
/// FAT marker for a cluster with media failures.
pub const BAD_CLUSTER: u32 = 0xFFFFFFF7;
/// FAT marker terminating a cluster chain.
pub const LAST_CLUSTER: u32 = 0xFFFFFFFF;

/// Size of one directory entry in bytes.
pub const DENTRY_SIZE: usize = 32;
/// UTF-16 code units carried by a single File Name entry.
pub const ENTRY_NAME_MAX: usize = 15;
/// Maximum filename length in UTF-16 code units.
pub const MAX_NAME_LENGTH: usize = 255;
