use bytemuck::{Pod, Zeroable};
use endify::Endify;

use crate::disk::ImageIo;
use crate::error::{Error, Result};

pub const BOOT_SIGNATURE: u16 = 0xAA55;
pub const EXTENDED_BOOT_SIGNATURE: u32 = 0xAA550000;
/// Sectors covered by the boot-region checksum.
pub const BOOT_REGION_SECTORS: usize = 11;

/// The Main/Backup Boot Sector structure of an exFAT volume.
/// This structure defines the essential parameters required for the file system.
#[derive(Debug, Clone, Copy, Pod, Zeroable, Endify)]
#[repr(C)]
pub struct BootSector {
    /// The jump instruction for CPUs to execute bootstrapping instructions in `boot_code`.
    /// - Must be `0xEB 0x76 0x90` in order (low-order byte first).
    pub(crate) jump_boot: [u8; 3],

    /// The name of the file system on the volume.
    /// - Must be `"EXFAT   "` (including three trailing spaces).
    pub(crate) filesystem_name: [u8; 8],

    /// Reserved field corresponding to the FAT12/16/32 BIOS Parameter Block.
    /// - Must be all zeroes to prevent misinterpretation by FAT-based systems.
    pub(crate) must_be_zero: [u8; 53],

    /// The sector offset from the beginning of the media to the partition that
    /// contains the exFAT volume.
    /// - A value of `0` indicates that this field should be ignored.
    pub(crate) partition_offset: u64,

    /// The total size of the exFAT volume in sectors.
    /// - Must be at least `2^20 / (2^BytesPerSectorShift)`, ensuring a minimum volume size of 1MB.
    pub(crate) volume_length: u64,

    /// The sector offset from the start of the volume to the First FAT.
    /// - Minimum value: `24` (accounts for boot sectors).
    /// - Maximum value: `ClusterHeapOffset - (FatLength * NumberOfFats)`.
    pub(crate) fat_offset: u32,

    /// The number of sectors occupied by each FAT.
    /// - Ensures there is enough space for all clusters in the Cluster Heap.
    pub(crate) fat_length: u32,

    /// The sector offset from the start of the volume to the Cluster Heap.
    pub(crate) cluster_heap_offset: u32,

    /// The number of clusters in the Cluster Heap.
    /// - Must be the lesser of `(VolumeLength - ClusterHeapOffset) / 2^SectorsPerClusterShift`
    ///   or `2^32 - 11`.
    pub(crate) cluster_count: u32,

    /// The cluster index of the first cluster in the root directory.
    /// - Must be between `2` (first valid cluster) and `ClusterCount + 1`.
    pub(crate) first_cluster_of_root_directory: u32,

    /// A unique serial number for identifying the volume.
    pub(crate) volume_serial_number: u32,

    /// The revision number of the exFAT structures on the volume.
    /// - The high byte is the major version, the low byte the minor version.
    /// - Example: `0x0100` represents version 1.0.
    pub(crate) file_system_revision: u16,

    /// A set of flags that indicate file system status.
    /// - **Bit 0**: `ActiveFat`, **Bit 1**: `VolumeDirty`, **Bit 2**: `MediaFailure`.
    pub(crate) volume_flags: u16,

    /// The sector size in a power-of-two exponent.
    /// - Valid range: `9` (512 bytes) to `12` (4096 bytes).
    pub(crate) bytes_per_sector_shift: u8,

    /// The number of sectors per cluster in a power-of-two exponent.
    /// - Valid range: `0` (1 sector per cluster) to `25 - BytesPerSectorShift`.
    pub(crate) sectors_per_cluster_shift: u8,

    /// The number of File Allocation Tables (FATs) in the volume.
    /// - `1`: Only the First FAT is present.
    /// - `2`: Used in **TexFAT**, which has a Second FAT and a Second Allocation Bitmap.
    pub(crate) number_of_fats: u8,

    /// Extended INT 13h drive number, useful for bootstrapping.
    pub(crate) drive_select: u8,

    /// The percentage of allocated clusters in the Cluster Heap.
    /// - Values range from `0` to `100` (rounded down); `0xFF` means unknown.
    pub(crate) percent_in_use: u8,

    /// Reserved for future use. Must be set to zero.
    pub(crate) _reserved: [u8; 7],

    /// The bootstrapping code that is executed if the volume is bootable.
    pub(crate) boot_code: [u8; 390],

    /// Identifies this sector as a boot sector.
    /// - Must be `0xAA55` to be considered valid.
    pub(crate) boot_signature: u16,
}

/// Buffer used to read the boot sector.
#[repr(align(8))]
struct AlignedBootSector([u8; 512]);

impl BootSector {
    /// Reads sector 0 of the image and converts it to native endianness.
    ///
    /// No validation happens here; see [`BootSector::validate`].
    pub fn read_from<I: ImageIo>(image: &I) -> Result<BootSector> {
        let mut aligned = Box::new(AlignedBootSector([0u8; 512]));
        image.read_exact_at(0, &mut aligned.0[..])?;

        let raw = bytemuck::from_bytes::<BootSector>(&aligned.0);
        Ok(Endify::from_le(*raw))
    }

    pub fn bytes_per_sector(&self) -> u32 {
        1 << self.bytes_per_sector_shift
    }

    pub fn bytes_per_cluster(&self) -> u32 {
        (1 << self.sectors_per_cluster_shift) * self.bytes_per_sector()
    }

    /// Verifies every field constraint of the main boot sector.
    ///
    /// All violations are reported, not only the first, so a damaged
    /// superblock can be diagnosed in one pass.
    pub fn validate(&self) -> Result<()> {
        let mut violations = 0;

        if self.jump_boot != [0xEB, 0x76, 0x90] {
            log::error!(
                "invalid JumpBoot: {:#04x}{:02x}{:02x}",
                self.jump_boot[0],
                self.jump_boot[1],
                self.jump_boot[2]
            );
            violations += 1;
        }

        if self.filesystem_name != *b"EXFAT   " {
            log::error!(
                "invalid FileSystemName: {:?}",
                String::from_utf8_lossy(&self.filesystem_name)
            );
            violations += 1;
        }

        if self.must_be_zero != [0u8; 53] {
            log::error!("invalid MustBeZero: field contains non-zero bytes");
            violations += 1;
        }

        let bps = self.bytes_per_sector_shift;
        let spc = self.sectors_per_cluster_shift;
        let shifts_valid = (9..=12).contains(&bps) && spc <= 25 - bps;

        if !(9..=12).contains(&bps) {
            log::error!("invalid BytesPerSectorShift: {bps:#x}");
            violations += 1;
        } else if spc > 25 - bps {
            log::error!("invalid SectorsPerClusterShift: {spc:#x}");
            violations += 1;
        }

        // Geometry checks only make sense once the shifts themselves are sane.
        if shifts_valid {
            let sector_size = 1u64 << bps;
            let fats = self.number_of_fats as u64;
            let fat_end = self.fat_offset as u64 + self.fat_length as u64 * fats;

            if self.volume_length < (1 << 20) / sector_size {
                log::error!("invalid VolumeLength: {}", self.volume_length);
                violations += 1;
            }

            if self.fat_offset < 24 || fat_end > self.cluster_heap_offset as u64 {
                log::error!("invalid FatOffset: {:#x}", self.fat_offset);
                violations += 1;
            }

            let fat_needed = ((self.cluster_count as u64 + 2) * 4).div_ceil(sector_size);
            if (self.fat_length as u64) < fat_needed {
                log::error!("invalid FatLength: {:#x}", self.fat_length);
                violations += 1;
            }

            if (self.cluster_heap_offset as u64) < fat_end
                || (self.cluster_count as u64 * sector_size) < self.cluster_heap_offset as u64
            {
                log::error!("invalid ClusterHeapOffset: {:#x}", self.cluster_heap_offset);
                violations += 1;
            }

            let derived =
                (self.volume_length - (self.cluster_heap_offset as u64).min(self.volume_length))
                    >> spc;
            if derived != self.cluster_count as u64 && self.cluster_count != u32::MAX - 10 {
                log::error!("invalid ClusterCount: {:#x}", self.cluster_count);
                violations += 1;
            }
        }

        if self.file_system_revision < 0x0100 {
            log::error!("invalid FileSystemRevision: {:#06x}", self.file_system_revision);
            violations += 1;
        }

        let root = self.first_cluster_of_root_directory;
        if root < 2 || root > self.cluster_count + 1 {
            log::error!("invalid FirstClusterOfRootDirectory: {root:#x}");
            violations += 1;
        }

        if self.number_of_fats != 1 && self.number_of_fats != 2 {
            log::error!("invalid NumberOfFats: {:#x}", self.number_of_fats);
            violations += 1;
        }

        if self.percent_in_use > 100 && self.percent_in_use != 0xFF {
            log::error!("invalid PercentInUse: {:#x}", self.percent_in_use);
            violations += 1;
        }

        if self.boot_signature != BOOT_SIGNATURE {
            log::error!("invalid BootSignature: {:#06x}", self.boot_signature);
            violations += 1;
        }

        if violations != 0 {
            return Err(Error::InvalidSuperblock(violations));
        }
        Ok(())
    }
}
