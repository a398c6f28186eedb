use checked_num::CheckedU64;

use crate::disk::ImageIo;
use crate::error::{Error, Result};
use crate::volume::Volume;
use crate::{BAD_CLUSTER, FIRST_CLUSTER, LAST_CLUSTER};

/// A decoded FAT entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FatEntry {
    /// The next cluster of a chain.
    Chain(u32),
    /// End of a cluster chain.
    Last,
    /// The cluster is unusable.
    Bad,
    /// The entry value names no cluster of this volume.
    Invalid(u32),
}

impl<I: ImageIo> Volume<I> {
    fn fat_entry_position(&self, cluster: u32) -> Result<(u64, usize)> {
        if cluster == BAD_CLUSTER || cluster == LAST_CLUSTER {
            return Err(Error::InvalidArgument(format!(
                "cluster {cluster:#x} is a reserved FAT marker"
            )));
        }
        if cluster < FIRST_CLUSTER || cluster > self.cluster_count() + 1 {
            return Err(Error::InvalidArgument(format!(
                "cluster {cluster} is invalid"
            )));
        }

        let per_sector = self.sector_size() / 4;
        let sector = CheckedU64::new(self.fat_offset() as u64)
            + (cluster / per_sector) as u64;
        let byte_offset = (sector * self.sector_size() as u64)
            .ok_or(Error::InvalidArgument("FAT entry offset overflows".into()))?;
        Ok((byte_offset, (cluster % per_sector) as usize * 4))
    }

    /// Looks up the FAT entry of `cluster`.
    pub fn fat_get(&self, cluster: u32) -> Result<FatEntry> {
        let (byte_offset, in_sector) = self.fat_entry_position(cluster)?;

        let mut sector = vec![0u8; self.sector_size() as usize];
        self.read_sectors(&mut sector, byte_offset, 1)?;

        let value =
            u32::from_le_bytes(sector[in_sector..in_sector + 4].try_into().unwrap());
        log::debug!("Get FAT[{cluster}] {value:#x}");

        Ok(match value {
            LAST_CLUSTER => FatEntry::Last,
            BAD_CLUSTER => FatEntry::Bad,
            v if v >= FIRST_CLUSTER && v <= self.cluster_count() + 1 => FatEntry::Chain(v),
            v => FatEntry::Invalid(v),
        })
    }

    /// Rewrites the FAT entry of `cluster` and returns the previous value.
    ///
    /// Both the cluster and the new value must name clusters of this volume;
    /// the reserved markers are rejected.
    pub fn fat_set(&mut self, cluster: u32, value: u32) -> Result<u32> {
        if value < FIRST_CLUSTER || value > self.cluster_count() + 1 {
            return Err(Error::InvalidArgument(format!(
                "FAT entry value {value} is invalid"
            )));
        }
        let (byte_offset, in_sector) = self.fat_entry_position(cluster)?;

        let mut sector = vec![0u8; self.sector_size() as usize];
        self.read_sectors(&mut sector, byte_offset, 1)?;

        let previous =
            u32::from_le_bytes(sector[in_sector..in_sector + 4].try_into().unwrap());
        sector[in_sector..in_sector + 4].copy_from_slice(&value.to_le_bytes());
        self.write_sectors(&sector, byte_offset, 1)?;

        log::debug!("Set FAT[{cluster}] {previous:#x} -> {value:#x}");
        Ok(previous)
    }
}
