use crate::dentry::{FileAttributes, SecondaryFlags};
use crate::error::Result;
use crate::timestamp::Timestamp;

/// Slots added to the cache whenever it runs out of space.
pub const CACHE_CHUNK: usize = 1024;

/// Everything the tools keep about one directory child.
#[derive(Debug, Clone, Default)]
pub struct FileInfo {
    /// Name converted to UTF-8.
    pub name: String,
    /// Name length in UTF-16 code units, as stored on disk.
    pub namelen: u8,
    pub datalen: u64,
    pub attr: FileAttributes,
    pub flags: SecondaryFlags,
    pub first_cluster: u32,
    pub hash: u16,
    pub ctime: Timestamp,
    pub mtime: Timestamp,
    pub atime: Timestamp,
    /// For directory head records: whether the directory has been traversed.
    pub cached: bool,
}

impl FileInfo {
    pub fn is_directory(&self) -> bool {
        self.attr.contains(FileAttributes::DIRECTORY)
    }

    pub fn no_fat_chain(&self) -> bool {
        self.flags.contains(SecondaryFlags::NO_FAT_CHAIN)
    }
}

/// One cached directory: its own record first, children in on-disk order.
#[derive(Debug, Clone)]
pub struct CacheSlot {
    pub first_cluster: u32,
    pub entries: Vec<FileInfo>,
}

impl CacheSlot {
    pub fn new(first_cluster: u32, head: FileInfo) -> CacheSlot {
        CacheSlot {
            first_cluster,
            entries: vec![head],
        }
    }

    pub fn head(&self) -> &FileInfo {
        &self.entries[0]
    }

    pub fn children(&self) -> &[FileInfo] {
        &self.entries[1..]
    }
}

/// Directory cache keyed by first cluster.
///
/// Lookup is a linear scan; the slot vector grows in fixed chunks. At most
/// one slot exists per first-cluster key, and the root directory occupies
/// slot 0 from volume open onwards.
#[derive(Debug, Default)]
pub struct DirCache {
    slots: Vec<Option<CacheSlot>>,
}

impl DirCache {
    pub fn new() -> Result<DirCache> {
        let mut slots = Vec::new();
        slots.try_reserve_exact(CACHE_CHUNK)?;
        slots.resize_with(CACHE_CHUNK, || None);
        Ok(DirCache { slots })
    }

    /// Number of slots, occupied or not.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }

    /// Index of the slot keyed by `first_cluster`.
    pub fn position(&self, first_cluster: u32) -> Option<usize> {
        self.slots
            .iter()
            .position(|s| s.as_ref().is_some_and(|s| s.first_cluster == first_cluster))
    }

    pub fn slot(&self, index: usize) -> Option<&CacheSlot> {
        self.slots.get(index)?.as_ref()
    }

    pub fn slot_mut(&mut self, index: usize) -> Option<&mut CacheSlot> {
        self.slots.get_mut(index)?.as_mut()
    }

    pub fn slot_of(&self, first_cluster: u32) -> Option<&CacheSlot> {
        self.slot(self.position(first_cluster)?)
    }

    pub fn slot_of_mut(&mut self, first_cluster: u32) -> Option<&mut CacheSlot> {
        let index = self.position(first_cluster)?;
        self.slot_mut(index)
    }

    /// First cluster keyed at `index`, if the slot is occupied.
    pub fn cluster_at(&self, index: usize) -> Option<u32> {
        Some(self.slots.get(index)?.as_ref()?.first_cluster)
    }

    /// Stores `slot`, growing the vector by a chunk when no slot is free.
    ///
    /// When growth fails, the last occupied slot is dropped and its place
    /// reused. An existing slot with the same key is left untouched.
    pub fn insert(&mut self, slot: CacheSlot) -> usize {
        if let Some(existing) = self.position(slot.first_cluster) {
            return existing;
        }

        let index = match self.slots.iter().position(Option::is_none) {
            Some(free) => free,
            None => {
                if self.slots.try_reserve(CACHE_CHUNK).is_ok() {
                    let end = self.slots.len();
                    self.slots.resize_with(end + CACHE_CHUNK, || None);
                    end
                } else {
                    log::warn!("Can't expand directory cache, dropping the last slot.");
                    let last = self
                        .slots
                        .iter()
                        .rposition(Option::is_some)
                        .expect("cache cannot be both full and empty");
                    self.slots[last] = None;
                    last
                }
            }
        };

        self.slots[index] = Some(slot);
        index
    }
}
