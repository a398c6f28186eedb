use crate::bitmap::ClusterBitmap;
use crate::cache::FileInfo;
use crate::disk::ImageIo;
use crate::error::{Error, Result};
use crate::volume::Volume;
use crate::{FIRST_CLUSTER, LAST_CLUSTER};

/// Tally of a full consistency pass.
#[derive(Debug, Default, Clone, Copy)]
pub struct CheckReport {
    /// Clusters owned by more than one object.
    pub cross_links: u64,
    /// Bits that differ between the on-disk bitmap and reachability.
    pub bitmap_mismatches: u64,
    /// Chains cut short by loops, bad links or allocation disagreements.
    pub chain_faults: u64,
}

impl CheckReport {
    pub fn inconsistencies(&self) -> u64 {
        self.cross_links + self.bitmap_mismatches + self.chain_faults
    }
}

impl<I: ImageIo> Volume<I> {
    /// Rebuilds the Allocation Bitmap from reachability and compares it
    /// against the on-disk copy.
    ///
    /// Marks the bitmap's own run, the up-case run and the root chain, then
    /// every file chain reachable through the directory cache (triggering
    /// traversal of directories not yet visited). Each cluster may be owned
    /// by exactly one object; the final pass reports every bit that differs.
    pub fn check_consistency(&mut self) -> Result<CheckReport> {
        let mut shadow = ClusterBitmap::new(self.cluster_count())?;
        let mut report = CheckReport::default();

        let (bitmap_first, bitmap_length) = self
            .bitmap
            .as_ref()
            .map(|b| (b.first_cluster, b.data_length))
            .ok_or_else(|| Error::Inconsistency("Allocation Bitmap is not loaded".into()))?;
        let (upcase_first, upcase_length) = self
            .upcase
            .as_ref()
            .map(|u| (u.first_cluster(), u.data_length()))
            .ok_or_else(|| Error::Inconsistency("Up-case table is not loaded".into()))?;
        let root = self.root_cluster();
        let root_length = self
            .cache
            .slot_of(root)
            .expect("root slot is created at open")
            .head()
            .datalen;

        self.mark_run(&mut shadow, bitmap_first, bitmap_length, &mut report);
        self.mark_run(&mut shadow, upcase_first, upcase_length, &mut report);
        self.mark_run(&mut shadow, root, root_length, &mut report);

        // The slot vector keeps growing while subdirectories are discovered;
        // indices already visited stay put.
        let mut index = 0;
        while index < self.cache.len() {
            let Some(cluster) = self.cache.cluster_at(index) else {
                index += 1;
                continue;
            };
            if let Err(e) = self.traverse_directory(cluster) {
                log::warn!("Can't traverse directory at cluster {cluster}: {e}");
                report.chain_faults += 1;
            }

            let children: Vec<FileInfo> = self
                .cache
                .slot(index)
                .map(|s| s.children().to_vec())
                .unwrap_or_default();
            for child in &children {
                self.mark_chain(&mut shadow, child, &mut report);
            }
            index += 1;
        }

        let on_disk = &self.bitmap.as_ref().unwrap().map;
        for index in 0..self.cluster_count() {
            let cluster = index + FIRST_CLUSTER;
            if on_disk.get(cluster)? != shadow.get(cluster)? {
                log::warn!("Cluster#{cluster} isn't used at all.");
                report.bitmap_mismatches += 1;
            }
        }

        Ok(report)
    }

    /// Marks a metadata run that has no directory record of its own.
    fn mark_run(
        &self,
        shadow: &mut ClusterBitmap,
        first_cluster: u32,
        length: u64,
        report: &mut CheckReport,
    ) {
        let f = FileInfo {
            first_cluster,
            datalen: length,
            ..FileInfo::default()
        };
        self.mark_chain(shadow, &f, report);
    }

    /// Walks one chain, marking each cluster as owned.
    ///
    /// A revisit within the same chain is a FAT loop; a revisit across
    /// chains is a cross-link. Both stop or flag the walk without aborting
    /// the whole check.
    fn mark_chain(&self, shadow: &mut ClusterBitmap, f: &FileInfo, report: &mut CheckReport) {
        if f.first_cluster == 0 {
            return;
        }

        let Ok(mut visited) = ClusterBitmap::new(self.cluster_count()) else {
            log::warn!("Can't allocate a visited set for cluster {}.", f.first_cluster);
            return;
        };

        let bound = self.cluster_run_length(f).max(1);
        let mut cluster = f.first_cluster;

        for _ in 0..bound {
            if cluster == LAST_CLUSTER {
                break;
            }
            match visited.mark(cluster) {
                Ok(true) => {}
                Ok(false) => {
                    log::warn!("Detected a loop in File (Cluster #{}).", f.first_cluster);
                    report.chain_faults += 1;
                    break;
                }
                Err(e) => {
                    log::warn!("{e}");
                    report.chain_faults += 1;
                    break;
                }
            }
            match shadow.mark(cluster) {
                Ok(true) => {}
                Ok(false) => {
                    log::warn!("Cluster#{cluster} is referenced from other cluster.");
                    report.cross_links += 1;
                }
                Err(_) => break,
            }
            match self.next_cluster(f, cluster) {
                Ok(Some(next)) => cluster = next,
                Ok(None) => break,
                // next_cluster has already reported the disagreement.
                Err(e) => {
                    log::debug!("chain for cluster {} stops: {e}", f.first_cluster);
                    report.chain_faults += 1;
                    break;
                }
            }
        }
    }
}
