//! Change-detection hash
//!
//! 32-bit signed rolling hash over UTF-16 code units. Only used to decide
//! whether a write would change the stored value; collisions are tolerated.

/// Hash a string, folding each UTF-16 code unit as `h * 31 + unit`
pub fn rolling_hash(value: &str) -> i32 {
    value.encode_utf16().fold(0i32, |hash, unit| {
        (hash << 5).wrapping_sub(hash).wrapping_add(i32::from(unit))
    })
}

/// Check whether two serialized values hash equal
#[inline]
pub fn same_content(current: &str, incoming: &str) -> bool {
    rolling_hash(current) == rolling_hash(incoming)
}
