use crate::bitmap::ClusterBitmap;
use crate::cache::{CacheSlot, FileInfo};
use crate::checksum;
use crate::dentry::{BitmapDentry, DirEntry, FileDentry, LabelDentry, UpcaseDentry, in_use};
use crate::disk::ImageIo;
use crate::error::{Error, Result};
use crate::fat::FatEntry;
use crate::timestamp::Timestamp;
use crate::upcase::UpcaseTable;
use crate::volume::{AllocBitmap, Label, Volume};
use crate::{DENTRY_SIZE, ENTRY_NAME_MAX, FIRST_CLUSTER};

impl<I: ImageIo> Volume<I> {
    /// Loads the root directory's metadata entries and traverses it.
    ///
    /// The first root cluster must provide the Allocation Bitmap and Up-case
    /// entries before anything else can be decoded; the root's own size is
    /// then derived by walking its FAT chain, since directories carry no
    /// Stream entry of their own.
    pub fn traverse_root_directory(&mut self) -> Result<()> {
        let root = self.root_cluster();

        let mut data = vec![0u8; self.cluster_size() as usize];
        self.read_cluster(&mut data, root)?;

        let mut have_bitmap = false;
        let mut have_upcase = false;
        for raw in data.chunks_exact(DENTRY_SIZE) {
            let raw: &[u8; DENTRY_SIZE] = raw.try_into().unwrap();
            match DirEntry::decode(raw) {
                DirEntry::Bitmap(bitmap) => {
                    self.load_bitmap_dentry(&bitmap)?;
                    have_bitmap = true;
                }
                DirEntry::Upcase(upcase) => {
                    self.load_upcase_dentry(&upcase)?;
                    have_upcase = true;
                }
                DirEntry::Volume(label) => self.load_label_dentry(&label),
                DirEntry::Unused => break,
                _ => {}
            }
        }

        if !have_bitmap || !have_upcase {
            log::error!(
                "Root Directory doesn't have important entries (bitmap: {have_bitmap}, up-case: {have_upcase})"
            );
            return Err(Error::Inconsistency(
                "root directory is missing its Allocation Bitmap or Up-case entry".into(),
            ));
        }

        let head = self
            .cache
            .slot_of(root)
            .expect("root slot is created at open")
            .head()
            .clone();
        let mut clusters = 0u64;
        let mut cluster = root;
        loop {
            clusters += 1;
            match self.next_cluster(&head, cluster) {
                Ok(Some(next)) => cluster = next,
                Ok(None) => break,
                Err(e) => {
                    log::warn!("Root directory chain is truncated: {e}");
                    break;
                }
            }
            if clusters > self.cluster_count() as u64 {
                break;
            }
        }

        let index = self.cache.position(root).unwrap();
        self.cache.slot_mut(index).unwrap().entries[0].datalen =
            clusters * self.cluster_size() as u64;

        self.traverse_directory(root)
    }

    /// Decodes every entry set of one directory into its cache slot.
    ///
    /// Idempotent: a directory whose head record is already marked `cached`
    /// is not read again.
    pub fn traverse_directory(&mut self, cluster: u32) -> Result<()> {
        let Some(slot_index) = self.cache.position(cluster) else {
            return Err(Error::InvalidArgument(format!(
                "cluster {cluster} is not a cached directory"
            )));
        };

        let head = self.cache.slot(slot_index).unwrap().head().clone();
        if head.cached {
            log::debug!("Directory {} was already traversed.", head.name);
            return Ok(());
        }

        let concat = self.concat_clusters(&head)?;
        let data = concat.data;
        let entries = data.len() / DENTRY_SIZE;

        let mut i = 0;
        while i < entries {
            let raw: &[u8; DENTRY_SIZE] =
                data[i * DENTRY_SIZE..(i + 1) * DENTRY_SIZE].try_into().unwrap();
            match DirEntry::decode(raw) {
                // Holes are tolerated inside a directory; only the root scan
                // treats an unused entry as the end.
                DirEntry::Unused => {}
                DirEntry::Bitmap(bitmap) => self.load_bitmap_dentry(&bitmap)?,
                DirEntry::Upcase(upcase) => self.load_upcase_dentry(&upcase)?,
                DirEntry::Volume(label) => self.load_label_dentry(&label),
                DirEntry::File(file) => {
                    i = self.assemble_entry_set(&data, i, slot_index, &file)?;
                    continue;
                }
                // An in-use critical primary entry we don't recognize may
                // not be skipped; benign and secondary strays may.
                DirEntry::Other(t) if in_use(t) && t & 0x60 == 0 => {
                    log::error!("Unrecognized critical primary entry {t:#04x}.");
                    return Err(Error::Unsupported(t));
                }
                _ => log::debug!("Skipping entry type {:#04x}.", raw[0]),
            }
            i += 1;
        }

        self.cache.slot_mut(slot_index).unwrap().entries[0].cached = true;
        Ok(())
    }

    /// Reassembles one File + Stream + Name entry set starting at `start`.
    ///
    /// Returns the index of the first entry after the set. Deleted entries
    /// between the set members are stepped over; a missing Stream or Name
    /// skips the whole set with a warning.
    fn assemble_entry_set(
        &mut self,
        data: &[u8],
        start: usize,
        parent_slot: usize,
        file: &FileDentry,
    ) -> Result<usize> {
        let entries = data.len() / DENTRY_SIZE;
        let entry_at = |i: usize| -> &[u8; DENTRY_SIZE] {
            data[i * DENTRY_SIZE..(i + 1) * DENTRY_SIZE].try_into().unwrap()
        };
        let skip_deleted = |cursor: &mut usize| {
            while *cursor < entries {
                let entry_type = data[*cursor * DENTRY_SIZE];
                if in_use(entry_type) || entry_type == 0 {
                    break;
                }
                log::debug!("This entry was deleted ({entry_type:#04x}).");
                *cursor += 1;
            }
        };

        let mut cursor = start + 1;

        skip_deleted(&mut cursor);
        let stream = match (cursor < entries).then(|| DirEntry::decode(entry_at(cursor))) {
            Some(DirEntry::Stream(stream)) => stream,
            _ => {
                log::warn!("File should have a stream entry, but this doesn't.");
                return Ok(start + 1);
            }
        };
        cursor += 1;

        let name_entries = file.secondary_count.saturating_sub(1) as usize;
        let mut units: Vec<u16> = Vec::with_capacity(name_entries * ENTRY_NAME_MAX);
        for _ in 0..name_entries {
            skip_deleted(&mut cursor);
            match (cursor < entries).then(|| DirEntry::decode(entry_at(cursor))) {
                Some(DirEntry::Name(name)) => {
                    units.extend_from_slice(&name.units);
                    cursor += 1;
                }
                _ => {
                    log::warn!("File should have a name entry, but this doesn't.");
                    return Ok(start + 1);
                }
            }
        }
        units.truncate(stream.name_length as usize);

        let set_end = ((start + 1 + file.secondary_count as usize) * DENTRY_SIZE).min(data.len());
        let calculated = checksum::entry_set(&data[start * DENTRY_SIZE..set_end], file.secondary_count);
        if calculated != file.set_checksum {
            log::warn!(
                "Entry-set checksum is unmatched (dentry: {:#06x}, calculated: {calculated:#06x}).",
                file.set_checksum
            );
        }

        if let Some(upcase) = &self.upcase {
            let calculated = upcase.name_hash(&units);
            if calculated != stream.name_hash {
                log::warn!(
                    "Name hash is unmatched (dentry: {:#06x}, calculated: {calculated:#06x}).",
                    stream.name_hash
                );
            }
        }

        let info = FileInfo {
            name: String::from_utf16_lossy(&units),
            namelen: stream.name_length,
            datalen: stream.data_length,
            attr: file.attributes,
            flags: stream.flags,
            first_cluster: stream.first_cluster,
            hash: stream.name_hash,
            ctime: Timestamp::decode(
                file.create_timestamp,
                file.create_10ms_increment,
                file.create_utc_offset,
            ),
            mtime: Timestamp::decode(
                file.modified_timestamp,
                file.modified_10ms_increment,
                file.modified_utc_offset,
            ),
            atime: Timestamp::decode(file.accessed_timestamp, 0, file.accessed_utc_offset),
            cached: false,
        };

        if info.is_directory() && self.cache.position(info.first_cluster).is_none() {
            self.cache
                .insert(CacheSlot::new(info.first_cluster, info.clone()));
        }
        self.cache
            .slot_mut(parent_slot)
            .expect("parent slot outlives its traversal")
            .entries
            .push(info);

        Ok(cursor)
    }

    /// Loads the Allocation Bitmap on first encounter of its dentry.
    fn load_bitmap_dentry(&mut self, dentry: &BitmapDentry) -> Result<()> {
        if self.bitmap.is_some() {
            return Ok(());
        }
        log::debug!(
            "Get: allocation table: cluster {:#x}, size: {:#x}",
            dentry.first_cluster,
            dentry.data_length
        );

        let bytes = self.concat_fast(dentry.first_cluster, dentry.data_length)?;
        self.bitmap = Some(AllocBitmap {
            first_cluster: dentry.first_cluster,
            data_length: dentry.data_length,
            map: ClusterBitmap::from_bytes(bytes, self.cluster_count()),
        });
        log::info!("Allocation Bitmap (#{})", dentry.first_cluster);
        Ok(())
    }

    /// Loads the Up-case table on first encounter and verifies its checksum.
    fn load_upcase_dentry(&mut self, dentry: &UpcaseDentry) -> Result<()> {
        if self.upcase.is_some() {
            return Ok(());
        }
        log::debug!(
            "Get: up-case table: cluster {:#x}, size: {:#x}",
            dentry.first_cluster,
            dentry.data_length
        );

        let bytes = self.concat_fast(dentry.first_cluster, dentry.data_length)?;
        let table = &bytes[..(dentry.data_length.min(bytes.len() as u64)) as usize];

        let calculated = checksum::upcase_table(table);
        if calculated != dentry.table_checksum {
            log::warn!(
                "Up-case table checksum is unmatched (dentry: {:#010x}, calculated: {calculated:#010x}).",
                dentry.table_checksum
            );
        }

        self.upcase = Some(UpcaseTable::from_bytes(
            table,
            dentry.first_cluster,
            dentry.data_length,
        ));
        Ok(())
    }

    /// Copies the volume label on first encounter.
    fn load_label_dentry(&mut self, dentry: &LabelDentry) {
        if self.label.len != 0 {
            return;
        }
        self.label = Label {
            units: dentry.label,
            len: dentry.character_count.min(11),
        };
        log::debug!("Get: volume label: size {:#x}", dentry.character_count);
    }

    /// Flips one allocation bit in memory and on disk.
    pub fn save_bitmap(&mut self, cluster: u32, value: bool) -> Result<()> {
        let (first_cluster, byte_index) = {
            let Some(bitmap) = &mut self.bitmap else {
                return Err(Error::InvalidArgument(
                    "Allocation Bitmap is not loaded".into(),
                ));
            };
            bitmap.map.set(cluster, value)?;
            (
                bitmap.first_cluster,
                (cluster - FIRST_CLUSTER) as usize / 8,
            )
        };

        // Locate the bitmap-run cluster holding the byte, then patch it.
        let cluster_size = self.cluster_size() as usize;
        let mut target = first_cluster;
        for _ in 0..byte_index / cluster_size {
            match self.fat_get(target)? {
                FatEntry::Chain(next) => target = next,
                _ => {
                    return Err(Error::Inconsistency(
                        "Allocation Bitmap chain ends before its data length".into(),
                    ));
                }
            }
        }

        let mut buf = vec![0u8; cluster_size];
        self.read_cluster(&mut buf, target)?;
        let mask = 1u8 << ((cluster - FIRST_CLUSTER) % 8);
        if value {
            buf[byte_index % cluster_size] |= mask;
        } else {
            buf[byte_index % cluster_size] &= !mask;
        }

        let offset = self.cluster_offset(target)?;
        let sectors = cluster_size / self.sector_size() as usize;
        self.write_sectors(&buf, offset, sectors)
    }

    /// Resolves a slash-separated path to a cluster index.
    ///
    /// A leading `/` resets the walk to the root directory. Components are
    /// compared by binary UTF-8 equality, the way names are stored on disk.
    pub fn path_lookup(&mut self, start: u32, path: &str) -> Result<u32> {
        let mut cluster = if path.starts_with('/') {
            self.root_cluster()
        } else {
            start
        };

        for component in path.split('/').filter(|c| !c.is_empty()) {
            log::debug!("Lookup {component} in cluster#{cluster}");
            if self.cache.position(cluster).is_none() {
                return Err(Error::NotFound(path.to_string()));
            }
            self.traverse_directory(cluster)?;

            let slot = self.cache.slot_of(cluster).unwrap();
            match slot.children().iter().find(|c| c.name == component) {
                Some(child) => cluster = child.first_cluster,
                None => return Err(Error::NotFound(path.to_string())),
            }
        }
        Ok(cluster)
    }

    /// Resolves an absolute path to the file-info record it names.
    ///
    /// `/` (or an empty path) yields the root directory's own record.
    pub fn lookup(&mut self, path: &str) -> Result<FileInfo> {
        let components: Vec<&str> = path.split('/').filter(|c| !c.is_empty()).collect();
        let mut cluster = self.root_cluster();

        if components.is_empty() {
            return Ok(self
                .cache
                .slot_of(cluster)
                .expect("root slot is created at open")
                .head()
                .clone());
        }

        for (depth, component) in components.iter().enumerate() {
            if self.cache.position(cluster).is_none() {
                return Err(Error::NotFound(path.to_string()));
            }
            self.traverse_directory(cluster)?;

            let slot = self.cache.slot_of(cluster).unwrap();
            let Some(child) = slot.children().iter().find(|c| c.name == *component) else {
                return Err(Error::NotFound(path.to_string()));
            };

            if depth + 1 == components.len() {
                return Ok(child.clone());
            }
            if !child.is_directory() {
                return Err(Error::NotFound(path.to_string()));
            }
            cluster = child.first_cluster;
        }
        unreachable!("non-empty component list returns from the loop")
    }
}
