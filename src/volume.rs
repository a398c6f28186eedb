use std::fs::File;
use std::path::Path;

use checked_num::CheckedU64;

use crate::FIRST_CLUSTER;
use crate::bitmap::ClusterBitmap;
use crate::boot::{BOOT_REGION_SECTORS, BootSector, EXTENDED_BOOT_SIGNATURE};
use crate::cache::{CacheSlot, DirCache, FileInfo};
use crate::checksum;
use crate::dentry::FileAttributes;
use crate::disk::ImageIo;
use crate::error::{Error, Result};
use crate::upcase::UpcaseTable;

/// The in-memory Allocation Bitmap plus the heap run it was read from.
#[derive(Debug, Clone)]
pub struct AllocBitmap {
    pub first_cluster: u32,
    pub data_length: u64,
    pub map: ClusterBitmap,
}

/// Volume label, at most 11 UTF-16 code units.
#[derive(Debug, Clone, Copy, Default)]
pub struct Label {
    pub units: [u16; 11],
    pub len: u8,
}

/// A decoded exFAT volume: superblock geometry, the loaded metadata tables
/// and the directory cache, all backed by one image handle.
///
/// Everything is owned; dropping the volume releases the image handle, the
/// bitmap, the up-case table and every cached record.
#[derive(Debug)]
pub struct Volume<I> {
    pub(crate) image: I,
    boot: BootSector,
    total_size: u64,
    sector_size: u32,
    cluster_size: u32,
    cluster_count: u32,
    fat_offset: u32,
    fat_length: u64,
    heap_offset: u32,
    root_cluster: u32,
    pub(crate) bitmap: Option<AllocBitmap>,
    pub(crate) upcase: Option<UpcaseTable>,
    pub(crate) label: Label,
    pub(crate) cache: DirCache,
}

impl Volume<File> {
    /// Opens an image file read-only and decodes its superblock.
    pub fn open_path(path: &Path) -> Result<Volume<File>> {
        Volume::open(File::open(path)?)
    }
}

impl<I: ImageIo> Volume<I> {
    /// Decodes and validates the superblock, and seeds the directory cache
    /// with the root directory.
    pub fn open(image: I) -> Result<Volume<I>> {
        let boot = BootSector::read_from(&image)?;
        boot.validate()?;

        let total_size = image.len()?;
        let sector_size = boot.bytes_per_sector();
        let cluster_size = boot.bytes_per_cluster();
        let cluster_count = boot.cluster_count;
        let root_cluster = boot.first_cluster_of_root_directory;

        let mut cache = DirCache::new()?;
        cache.insert(CacheSlot::new(
            root_cluster,
            FileInfo {
                name: String::from("/"),
                namelen: 1,
                // Refined once the bitmap is available and the chain can be walked.
                datalen: cluster_count as u64 * cluster_size as u64,
                attr: FileAttributes::DIRECTORY,
                first_cluster: root_cluster,
                ..FileInfo::default()
            },
        ));

        Ok(Volume {
            total_size,
            sector_size,
            cluster_size,
            cluster_count,
            fat_offset: boot.fat_offset,
            fat_length: boot.number_of_fats as u64 * boot.fat_length as u64 * sector_size as u64,
            heap_offset: boot.cluster_heap_offset,
            root_cluster,
            bitmap: None,
            upcase: None,
            label: Label::default(),
            cache,
            boot,
            image,
        })
    }

    pub fn boot(&self) -> &BootSector {
        &self.boot
    }

    /// Releases the volume and hands the image handle back.
    pub fn into_image(self) -> I {
        self.image
    }

    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    pub fn sector_size(&self) -> u32 {
        self.sector_size
    }

    pub fn cluster_size(&self) -> u32 {
        self.cluster_size
    }

    pub fn cluster_count(&self) -> u32 {
        self.cluster_count
    }

    pub fn fat_offset(&self) -> u32 {
        self.fat_offset
    }

    /// Byte length of the FAT region across all FATs.
    pub fn fat_length(&self) -> u64 {
        self.fat_length
    }

    pub fn heap_offset(&self) -> u32 {
        self.heap_offset
    }

    pub fn root_cluster(&self) -> u32 {
        self.root_cluster
    }

    pub fn bitmap(&self) -> Option<&AllocBitmap> {
        self.bitmap.as_ref()
    }

    pub fn upcase(&self) -> Option<&UpcaseTable> {
        self.upcase.as_ref()
    }

    /// The volume label as UTF-8, if one was found.
    pub fn label(&self) -> Option<String> {
        if self.label.len == 0 {
            return None;
        }
        Some(String::from_utf16_lossy(
            &self.label.units[..self.label.len as usize],
        ))
    }

    pub fn cache(&self) -> &DirCache {
        &self.cache
    }

    /// Reads `count` sectors starting at `byte_offset`.
    pub fn read_sectors(&self, buf: &mut [u8], byte_offset: u64, count: usize) -> Result<()> {
        let bytes = count * self.sector_size as usize;
        log::debug!(
            "Get: sector from {byte_offset:#x} to {:#x}",
            byte_offset + bytes as u64 - 1
        );
        self.image.read_exact_at(byte_offset, &mut buf[..bytes])?;
        Ok(())
    }

    /// Writes `count` sectors starting at `byte_offset`.
    pub fn write_sectors(&mut self, buf: &[u8], byte_offset: u64, count: usize) -> Result<()> {
        let bytes = count * self.sector_size as usize;
        log::debug!(
            "Set: sector from {byte_offset:#x} to {:#x}",
            byte_offset + bytes as u64 - 1
        );
        self.image.write_all_at(byte_offset, &buf[..bytes])?;
        Ok(())
    }

    /// Byte offset of `cluster` inside the image.
    pub(crate) fn cluster_offset(&self, cluster: u32) -> Result<u64> {
        let heap_start = CheckedU64::new(self.heap_offset as u64) * self.sector_size as u64;
        (heap_start + (cluster as u64 - 2) * self.cluster_size as u64)
            .ok_or(Error::InvalidArgument(format!(
                "cluster {cluster} offset overflows"
            )))
    }

    /// Reads a single cluster into `buf`.
    pub fn read_cluster(&self, buf: &mut [u8], cluster: u32) -> Result<()> {
        self.read_clusters(buf, cluster, 1)
    }

    /// Reads `count` consecutive clusters into `buf`.
    pub fn read_clusters(&self, buf: &mut [u8], cluster: u32, count: u32) -> Result<()> {
        if cluster < FIRST_CLUSTER
            || cluster as u64 + count as u64 - 1 > self.cluster_count as u64
        {
            return Err(Error::InvalidArgument(format!(
                "invalid cluster range {cluster} ~ {}",
                cluster as u64 + count as u64 - 1
            )));
        }
        let per_cluster = (self.cluster_size / self.sector_size) as usize;
        self.read_sectors(
            buf,
            self.cluster_offset(cluster)?,
            per_cluster * count as usize,
        )
    }

    /// Verifies the extended boot sectors and the boot-region checksum.
    pub fn verify_boot_region(&self) -> Result<()> {
        self.check_extended_boot_sectors()?;
        self.verify_boot_checksum()
    }

    /// Checks that sectors 1-8 end in the extended boot signature.
    pub fn check_extended_boot_sectors(&self) -> Result<()> {
        let mut sector = vec![0u8; self.sector_size as usize];
        let mut violations = 0;

        for i in 1..=8u64 {
            self.read_sectors(&mut sector, self.sector_size as u64 * i, 1)?;
            let tail = &sector[sector.len() - 4..];
            let signature = u32::from_le_bytes(tail.try_into().unwrap());
            if signature != EXTENDED_BOOT_SIGNATURE {
                log::error!("invalid ExtendedBootSignature: {signature:#010x}");
                violations += 1;
            }
        }

        if violations != 0 {
            return Err(Error::InvalidSuperblock(violations));
        }
        Ok(())
    }

    /// Recomputes the boot-region checksum and compares it against every
    /// word of the checksum sector.
    pub fn verify_boot_checksum(&self) -> Result<()> {
        let mut region = vec![0u8; self.sector_size as usize * BOOT_REGION_SECTORS];
        self.read_sectors(&mut region, 0, BOOT_REGION_SECTORS)?;
        let computed = checksum::boot_region(&region);

        let mut sector = vec![0u8; self.sector_size as usize];
        self.read_sectors(
            &mut sector,
            self.sector_size as u64 * BOOT_REGION_SECTORS as u64,
            1,
        )?;

        for word in sector.chunks_exact(4) {
            if u32::from_le_bytes(word.try_into().unwrap()) != computed {
                log::error!("Boot region checksum ({computed:#010x}) is unmatched.");
                return Err(Error::InvalidSuperblock(1));
            }
        }
        Ok(())
    }
}
