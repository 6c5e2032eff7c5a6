//! Byte population count lookup table

/// Number of set bits for every byte value, computed at compile time.
pub const POPCOUNT_TABLE: [u8; 256] = build_table();

const fn build_table() -> [u8; 256] {
    let mut table = [0u8; 256];
    let mut value = 0;
    while value < 256 {
        let mut bits = value;
        let mut count = 0;
        while bits != 0 {
            count += bits & 1;
            bits >>= 1;
        }
        table[value] = count as u8;
        value += 1;
    }
    table
}

/// Total set bits in a byte slice
pub fn count_ones(bytes: &[u8]) -> u32 {
    bytes
        .iter()
        .map(|&b| POPCOUNT_TABLE[b as usize] as u32)
        .sum()
}
