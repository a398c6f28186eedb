use bitflags::bitflags;

use crate::ENTRY_NAME_MAX;

// Directory entry type bytes.
pub const TYPE_UNUSED: u8 = 0x00;
pub const TYPE_BITMAP: u8 = 0x81;
pub const TYPE_UPCASE: u8 = 0x82;
pub const TYPE_VOLUME: u8 = 0x83;
pub const TYPE_FILE: u8 = 0x85;
pub const TYPE_GUID: u8 = 0xA0;
pub const TYPE_STREAM: u8 = 0xC0;
pub const TYPE_NAME: u8 = 0xC1;
pub const TYPE_VENDOR: u8 = 0xE0;
pub const TYPE_VENDOR_ALLOC: u8 = 0xE1;

/// The in-use flag of an entry type byte; a cleared bit marks a deleted entry.
pub const TYPE_IN_USE: u8 = 0x80;

/// Whether a raw entry type byte names a live (non-deleted) entry.
pub fn in_use(entry_type: u8) -> bool {
    entry_type & TYPE_IN_USE != 0
}

bitflags! {
    /// FileAttributes of a File directory entry.
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
    pub struct FileAttributes: u16 {
        const READ_ONLY = 0x0001;
        const HIDDEN = 0x0002;
        const SYSTEM = 0x0004;
        const DIRECTORY = 0x0010;
        const ARCHIVE = 0x0020;
    }
}

bitflags! {
    /// GeneralSecondaryFlags of a Stream Extension entry.
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
    pub struct SecondaryFlags: u8 {
        const ALLOCATION_POSSIBLE = 0x01;
        const NO_FAT_CHAIN = 0x02;
    }
}

/// Allocation Bitmap directory entry payload.
#[derive(Debug, Clone, Copy)]
pub struct BitmapDentry {
    pub bitmap_flags: u8,
    pub first_cluster: u32,
    pub data_length: u64,
}

/// Up-case Table directory entry payload.
#[derive(Debug, Clone, Copy)]
pub struct UpcaseDentry {
    pub table_checksum: u32,
    pub first_cluster: u32,
    pub data_length: u64,
}

/// Volume Label directory entry payload.
#[derive(Debug, Clone, Copy)]
pub struct LabelDentry {
    pub character_count: u8,
    pub label: [u16; 11],
}

/// File directory entry payload, the primary of an entry set.
#[derive(Debug, Clone, Copy)]
pub struct FileDentry {
    pub secondary_count: u8,
    pub set_checksum: u16,
    pub attributes: FileAttributes,
    pub create_timestamp: u32,
    pub modified_timestamp: u32,
    pub accessed_timestamp: u32,
    pub create_10ms_increment: u8,
    pub modified_10ms_increment: u8,
    pub create_utc_offset: u8,
    pub modified_utc_offset: u8,
    pub accessed_utc_offset: u8,
}

/// Stream Extension entry payload, first secondary of an entry set.
#[derive(Debug, Clone, Copy)]
pub struct StreamDentry {
    pub flags: SecondaryFlags,
    pub name_length: u8,
    pub name_hash: u16,
    pub valid_data_length: u64,
    pub first_cluster: u32,
    pub data_length: u64,
}

/// File Name entry payload, up to 15 UTF-16 code units of the name.
#[derive(Debug, Clone, Copy)]
pub struct NameDentry {
    pub flags: u8,
    pub units: [u16; ENTRY_NAME_MAX],
}

/// One 32-byte directory entry, decoded by its type byte.
///
/// Benign entries the tools never interpret keep only their tag; anything
/// with an unrecognized type byte (deleted entries included) lands in
/// `Other` so callers can decide whether skipping is allowed.
#[derive(Debug, Clone, Copy)]
pub enum DirEntry {
    Unused,
    Bitmap(BitmapDentry),
    Upcase(UpcaseDentry),
    Volume(LabelDentry),
    File(FileDentry),
    Guid,
    Stream(StreamDentry),
    Name(NameDentry),
    Vendor,
    VendorAlloc,
    Other(u8),
}

fn le16(raw: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([raw[offset], raw[offset + 1]])
}

fn le32(raw: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes(raw[offset..offset + 4].try_into().unwrap())
}

fn le64(raw: &[u8], offset: usize) -> u64 {
    u64::from_le_bytes(raw[offset..offset + 8].try_into().unwrap())
}

impl DirEntry {
    /// Decodes one raw directory entry.
    pub fn decode(raw: &[u8; 32]) -> DirEntry {
        match raw[0] {
            TYPE_UNUSED => DirEntry::Unused,
            TYPE_BITMAP => DirEntry::Bitmap(BitmapDentry {
                bitmap_flags: raw[1],
                first_cluster: le32(raw, 20),
                data_length: le64(raw, 24),
            }),
            TYPE_UPCASE => DirEntry::Upcase(UpcaseDentry {
                table_checksum: le32(raw, 4),
                first_cluster: le32(raw, 20),
                data_length: le64(raw, 24),
            }),
            TYPE_VOLUME => {
                let mut label = [0u16; 11];
                for (i, unit) in label.iter_mut().enumerate() {
                    *unit = le16(raw, 2 + i * 2);
                }
                DirEntry::Volume(LabelDentry {
                    character_count: raw[1],
                    label,
                })
            }
            TYPE_FILE => DirEntry::File(FileDentry {
                secondary_count: raw[1],
                set_checksum: le16(raw, 2),
                attributes: FileAttributes::from_bits_truncate(le16(raw, 4)),
                create_timestamp: le32(raw, 8),
                modified_timestamp: le32(raw, 12),
                accessed_timestamp: le32(raw, 16),
                create_10ms_increment: raw[20],
                modified_10ms_increment: raw[21],
                create_utc_offset: raw[22],
                modified_utc_offset: raw[23],
                accessed_utc_offset: raw[24],
            }),
            TYPE_GUID => DirEntry::Guid,
            TYPE_STREAM => DirEntry::Stream(StreamDentry {
                flags: SecondaryFlags::from_bits_truncate(raw[1]),
                name_length: raw[3],
                name_hash: le16(raw, 4),
                valid_data_length: le64(raw, 8),
                first_cluster: le32(raw, 20),
                data_length: le64(raw, 24),
            }),
            TYPE_NAME => {
                let mut units = [0u16; ENTRY_NAME_MAX];
                for (i, unit) in units.iter_mut().enumerate() {
                    *unit = le16(raw, 2 + i * 2);
                }
                DirEntry::Name(NameDentry {
                    flags: raw[1],
                    units,
                })
            }
            TYPE_VENDOR => DirEntry::Vendor,
            TYPE_VENDOR_ALLOC => DirEntry::VendorAlloc,
            other => DirEntry::Other(other),
        }
    }
}
