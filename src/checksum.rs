//! The rolling checksums of the exFAT on-disk format.
//!
//! All four are the same rotate-right-and-add construction at different
//! widths and with different skipped byte positions.

use crate::DENTRY_SIZE;

/// Boot-region checksum over the 11 sectors of a boot region.
///
/// Byte indices 106, 107 (VolumeFlags) and 112 (PercentInUse) are excluded
/// so the checksum stays stable while those fields change at runtime.
pub fn boot_region(sectors: &[u8]) -> u32 {
    let mut sum: u32 = 0;
    for (index, byte) in sectors.iter().enumerate() {
        if index == 106 || index == 107 || index == 112 {
            continue;
        }
        sum = sum.rotate_right(1).wrapping_add(*byte as u32);
    }
    sum
}

/// Entry-set checksum over a File entry and its `secondary_count` secondaries.
///
/// Bytes 2 and 3 hold the checksum itself and are skipped.
pub fn entry_set(entries: &[u8], secondary_count: u8) -> u16 {
    let bytes = (secondary_count as usize + 1) * DENTRY_SIZE;
    let mut sum: u16 = 0;
    for index in 0..bytes.min(entries.len()) {
        if index == 2 || index == 3 {
            continue;
        }
        sum = sum.rotate_right(1).wrapping_add(entries[index] as u16);
    }
    sum
}

/// Up-case table checksum over the raw table bytes.
pub fn upcase_table(table: &[u8]) -> u32 {
    let mut sum: u32 = 0;
    for byte in table {
        sum = sum.rotate_right(1).wrapping_add(*byte as u32);
    }
    sum
}

/// Name hash over an up-cased UTF-16 name, fed in little-endian byte order.
pub fn name_hash(upcased: &[u16]) -> u16 {
    let mut hash: u16 = 0;
    for unit in upcased {
        for byte in unit.to_le_bytes() {
            hash = hash.rotate_right(1).wrapping_add(byte as u16);
        }
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boot_region_skips_volatile_fields() {
        let mut sectors = vec![0u8; 512 * 11];
        sectors[0] = 0xEB;
        let reference = boot_region(&sectors);

        // VolumeFlags and PercentInUse must not affect the sum.
        sectors[106] = 0xFF;
        sectors[107] = 0xFF;
        sectors[112] = 0x55;
        assert_eq!(boot_region(&sectors), reference);

        sectors[113] = 1;
        assert_ne!(boot_region(&sectors), reference);
    }

    #[test]
    fn entry_set_ignores_own_field() {
        let mut set = [0u8; 64];
        set[0] = 0x85;
        set[1] = 1;
        set[32] = 0xC0;
        let reference = entry_set(&set, 1);

        set[2] = 0xAA;
        set[3] = 0xBB;
        assert_eq!(entry_set(&set, 1), reference);

        set[40] = 7;
        assert_ne!(entry_set(&set, 1), reference);
    }

    #[test]
    fn rolling_sum_rotates() {
        // One byte of 1 lands in the top bit after the next rotation.
        assert_eq!(upcase_table(&[1, 0]), 0x8000_0000);
        assert_eq!(name_hash(&[0x0001]), 0x8000);
    }

    #[test]
    fn name_hash_uses_little_endian_layout() {
        // 'A' (0x0041) feeds bytes 0x41 then 0x00.
        let single = name_hash(&[0x0041]);
        let mut manual: u16 = 0;
        for b in [0x41u8, 0x00] {
            manual = manual.rotate_right(1).wrapping_add(b as u16);
        }
        assert_eq!(single, manual);
    }
}
