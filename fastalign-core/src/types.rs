pub type Link = u16;
pub type Token = u32;
pub type Count = f64;

/// Sentinel for a target position aligned to no source word.
pub const NULL_LINK: Link = 0xffff;
/// Token id 0 is reserved for the NULL word in every vocabulary.
pub const NULL_TOKEN: Token = 0;

pub const MAX_SENT_LEN: usize = 0x400;

/// Probability that a target word is generated by the NULL word.
pub const DEFAULT_NULL_PRIOR: Count = 0.08;
/// Initial diagonal tension; re-estimated during training unless fixed.
pub const DEFAULT_TENSION: Count = 4.0;
pub const MIN_TENSION: Count = 0.1;
pub const MAX_TENSION: Count = 20.0;

/// Composite key for the sparse translation table.
#[inline]
pub fn pair_key(e: Token, f: Token) -> u64 {
    ((e as u64) << 32) | f as u64
}

/// Diagonal closeness feature h(i, j) = -|i/n - j/m| over 0-based positions.
/// Larger (closer to zero) means closer to the sentence diagonal.
#[inline]
pub fn diagonal_feature(i: usize, j: usize, src_len: usize, tgt_len: usize) -> Count {
    let x = (i + 1) as Count / src_len as Count;
    let y = (j + 1) as Count / tgt_len as Count;
    -(x - y).abs()
}
