use core::fmt;

use crate::bitmap::ClusterBitmap;
use crate::cache::FileInfo;
use crate::disk::ImageIo;
use crate::error::Result;
use crate::fat::FatEntry;
use crate::volume::Volume;

/// Why a cluster run was cut short of its expected length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainFault {
    /// The FAT chain revisited a cluster.
    Loop { cluster: u32 },
    /// The chain ended before covering the file's data length.
    LengthMismatch { datalen: u64, chain_bytes: u64 },
    /// A chained cluster is not marked allocated in the bitmap.
    Unallocated { cluster: u32 },
    /// A FAT entry held a bad-cluster marker or an out-of-range value.
    InvalidLink { cluster: u32 },
}

impl fmt::Display for ChainFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChainFault::Loop { cluster } => write!(f, "FAT loop at cluster {cluster}"),
            ChainFault::LengthMismatch {
                datalen,
                chain_bytes,
            } => write!(
                f,
                "file size ({datalen}) and FAT chain size ({chain_bytes}) are un-matched"
            ),
            ChainFault::Unallocated { cluster } => {
                write!(f, "cluster {cluster} is not marked allocated")
            }
            ChainFault::InvalidLink { cluster } => {
                write!(f, "invalid FAT entry for cluster {cluster}")
            }
        }
    }
}

/// A file's bytes materialized from the cluster heap.
#[derive(Debug)]
pub struct Concat {
    pub data: Vec<u8>,
    /// Clusters actually read.
    pub clusters: u64,
    /// Present when the run was truncated.
    pub fault: Option<ChainFault>,
}

impl<I: ImageIo> Volume<I> {
    /// Clusters needed to hold `f`'s data.
    pub fn cluster_run_length(&self, f: &FileInfo) -> u64 {
        f.datalen.div_ceil(self.cluster_size() as u64)
    }

    /// The cluster following `cluster` within `f`, or `None` at end of chain.
    ///
    /// Chained clusters must be marked allocated; a disagreement between FAT
    /// and Allocation Bitmap is an inconsistency.
    pub fn next_cluster(&self, f: &FileInfo, cluster: u32) -> Result<Option<u32>> {
        if f.no_fat_chain() {
            let run_end = f.first_cluster as u64 + self.cluster_run_length(f);
            if (cluster as u64 + 1) < run_end {
                return self.allocated_or_fail(cluster + 1).map(Some);
            }
            return Ok(None);
        }

        match self.fat_get(cluster)? {
            FatEntry::Last => Ok(None),
            FatEntry::Chain(next) => self.allocated_or_fail(next).map(Some),
            FatEntry::Bad => {
                log::warn!("Cluster#{cluster} chains to a bad cluster.");
                Err(crate::Error::Inconsistency(format!(
                    "cluster {cluster} chains to a bad cluster"
                )))
            }
            FatEntry::Invalid(value) => {
                log::warn!("FAT entry for cluster {cluster} is invalid ({value:#x}).");
                Err(crate::Error::Inconsistency(format!(
                    "FAT entry for cluster {cluster} is invalid ({value:#x})"
                )))
            }
        }
    }

    /// A chained-to cluster must be marked allocated before it is followed.
    fn allocated_or_fail(&self, cluster: u32) -> Result<u32> {
        if let Some(bitmap) = &self.bitmap
            && !bitmap.map.get(cluster)?
        {
            log::warn!("Cluster#{cluster} isn't allocated.");
            return Err(crate::Error::Inconsistency(format!(
                "cluster {cluster} is chained but not allocated"
            )));
        }
        Ok(cluster)
    }

    /// Concatenates `f`'s clusters into one buffer.
    ///
    /// FAT loops, premature chain ends and bitmap disagreements truncate the
    /// run at the point of detection; the returned [`Concat`] carries the
    /// fault so callers can decide whether truncation is fatal.
    pub fn concat_clusters(&self, f: &FileInfo) -> Result<Concat> {
        let cluster_size = self.cluster_size() as usize;
        let cluster_num = self.cluster_run_length(f);

        let mut data = Vec::new();
        if cluster_num == 0 || f.first_cluster == 0 {
            return Ok(Concat {
                data,
                clusters: 0,
                fault: None,
            });
        }
        data.try_reserve_exact(cluster_num as usize * cluster_size)?;

        if f.no_fat_chain() {
            return self.concat_contiguous(f, cluster_num, data);
        }

        // Visited set scoped to this walk; a revisit is a FAT loop.
        let mut visited = ClusterBitmap::new(self.cluster_count())?;
        let mut cluster = f.first_cluster;
        visited.set(cluster, true)?;

        data.resize(cluster_size, 0);
        self.read_cluster(&mut data, cluster)?;

        let mut clusters = 1u64;
        let mut fault = None;

        while clusters < cluster_num {
            match self.fat_get(cluster)? {
                FatEntry::Last => {
                    log::warn!(
                        "File size ({}) and FAT chain size ({}) are un-matched.",
                        f.datalen,
                        clusters * cluster_size as u64
                    );
                    fault = Some(ChainFault::LengthMismatch {
                        datalen: f.datalen,
                        chain_bytes: clusters * cluster_size as u64,
                    });
                    break;
                }
                FatEntry::Chain(next) => {
                    if visited.get(next)? {
                        log::warn!("Detected a loop in File (Cluster #{}).", f.first_cluster);
                        fault = Some(ChainFault::Loop { cluster: next });
                        break;
                    }
                    visited.set(next, true)?;

                    if let Some(bitmap) = &self.bitmap
                        && !bitmap.map.get(next)?
                    {
                        log::warn!("FAT and Allocation Bitmap are un-matched. Ignore #{next}.");
                        fault = Some(ChainFault::Unallocated { cluster: next });
                        break;
                    }

                    let offset = data.len();
                    data.resize(offset + cluster_size, 0);
                    self.read_cluster(&mut data[offset..], next)?;
                    cluster = next;
                    clusters += 1;
                }
                FatEntry::Bad | FatEntry::Invalid(_) => {
                    log::warn!("Invalid FAT entry for cluster {cluster}; chain truncated.");
                    fault = Some(ChainFault::InvalidLink { cluster });
                    break;
                }
            }
        }

        Ok(Concat {
            data,
            clusters,
            fault,
        })
    }

    fn concat_contiguous(
        &self,
        f: &FileInfo,
        cluster_num: u64,
        mut data: Vec<u8>,
    ) -> Result<Concat> {
        let cluster_size = self.cluster_size() as usize;
        let mut usable = cluster_num;
        let mut fault = None;

        if let Some(bitmap) = &self.bitmap {
            for i in 1..cluster_num {
                let cluster = f.first_cluster + i as u32;
                // A run reaching past the heap truncates like an
                // unallocated cluster does.
                if !bitmap.map.get(cluster).unwrap_or(false) {
                    log::warn!(
                        "Cluster #{cluster} isn't allocated. Ignore #{cluster} ~ #{}.",
                        f.first_cluster as u64 + cluster_num - 1
                    );
                    fault = Some(ChainFault::Unallocated { cluster });
                    usable = i;
                    break;
                }
            }
        }

        data.resize(usable as usize * cluster_size, 0);
        self.read_clusters(&mut data, f.first_cluster, usable as u32)?;
        Ok(Concat {
            data,
            clusters: usable,
            fault,
        })
    }

    /// Materializes a FAT-chained run without consistency checks.
    ///
    /// Used while the Allocation Bitmap itself (or the Up-case table) is
    /// being loaded, before any bitmap agreement can be verified. Bounded by
    /// the run's expected cluster count.
    pub(crate) fn concat_fast(&self, first_cluster: u32, length: u64) -> Result<Vec<u8>> {
        let cluster_size = self.cluster_size() as usize;
        let cluster_num = length.div_ceil(cluster_size as u64).max(1);

        let mut data = Vec::new();
        data.try_reserve_exact(cluster_num as usize * cluster_size)?;
        data.resize(cluster_size, 0);
        self.read_cluster(&mut data, first_cluster)?;

        let mut cluster = first_cluster;
        for _ in 1..cluster_num {
            match self.fat_get(cluster)? {
                FatEntry::Chain(next) => {
                    let offset = data.len();
                    data.resize(offset + cluster_size, 0);
                    self.read_cluster(&mut data[offset..], next)?;
                    cluster = next;
                }
                _ => break,
            }
        }
        Ok(data)
    }

    /// Fragmentation ratio of `f`'s FAT chain, as a percentage.
    ///
    /// Sums the gaps between consecutive chain links (wrapping around the
    /// heap) and scales by the worst case of `n` maximally-spread clusters.
    pub fn fragmentation(&self, f: &FileInfo) -> Result<f64> {
        let cluster_num = self.cluster_run_length(f);
        if f.no_fat_chain() || cluster_num <= 1 {
            return Ok(0.0);
        }

        let denominator = cluster_num as f64 * (self.cluster_count() as f64 - 2.0);
        let mut weight = 0.0;
        let mut cluster = f.first_cluster;

        for _ in 0..cluster_num {
            match self.fat_get(cluster) {
                Ok(FatEntry::Chain(next)) => {
                    if next > cluster + 1 {
                        weight += (next - cluster - 1) as f64;
                    } else if next < cluster {
                        weight += (self.cluster_count() - (cluster - next) - 1) as f64;
                    }
                    cluster = next;
                }
                _ => break,
            }
        }

        Ok(weight * 100.0 / denominator)
    }
}
