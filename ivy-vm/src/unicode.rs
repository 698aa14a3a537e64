//! Byte-level utf-8 helpers shared by the string operations.

/// Byte count of the utf-8 sequence started by each possible lead byte.
/// `-1` marks bytes that cannot start a sequence (continuations, overlong
/// leads, and values past `0xf4`).
pub static FOLLOWER_TABLE: [i8; 256] = build_follower_table();

const fn build_follower_table() -> [i8; 256] {
    let mut table = [-1i8; 256];
    let mut i = 0;

    while i < 256 {
        table[i] = match i {
            0x00..=0x7f => 1,
            0xc2..=0xdf => 2,
            0xe0..=0xef => 3,
            0xf0..=0xf4 => 4,
            _ => -1,
        };

        i += 1;
    }

    table
}

/// Whether `pos` is a valid sequence boundary of `raw`. The end position is
/// always a boundary; interior positions must land on a lead byte.
pub fn is_boundary(raw: &[u8], pos: usize) -> bool {
    pos == raw.len() || FOLLOWER_TABLE[raw[pos] as usize] != -1
}

/// Resolve a possibly-negative index against `size`, byte semantics.
/// Returns `None` when the wrapped index is still out of `0..size`.
pub fn wrap_index(index: i64, size: usize) -> Option<usize> {
    let wrapped = if index < 0 {
        index.checked_add(size as i64)?
    } else {
        index
    };

    (0 <= wrapped && (wrapped as usize) < size).then_some(wrapped as usize)
}

/// Slice `source` by byte positions, resolving negative indices against the
/// size. A boundary inside a utf-8 sequence yields `None`; `stop` may equal
/// the size, and the follower table is only consulted below it.
pub fn str_slice<'a>(source: &'a str, start: i64, stop: i64) -> Option<&'a str> {
    let raw = source.as_bytes();
    let size = raw.len() as i64;

    let start = if start < 0 { start + size } else { start };
    let stop = if stop < 0 { stop + size } else { stop };

    if start < 0 || stop > size || start > stop {
        return None;
    }

    let (start, stop) = (start as usize, stop as usize);

    if !is_boundary(raw, start) || !is_boundary(raw, stop) {
        return None;
    }

    Some(&source[start..stop])
}

/// Slice raw bytes by byte positions with the same index rules, but no
/// boundary requirements.
pub fn bytes_slice(raw: &[u8], start: i64, stop: i64) -> Option<&[u8]> {
    let size = raw.len() as i64;

    let start = if start < 0 { start + size } else { start };
    let stop = if stop < 0 { stop + size } else { stop };

    if start < 0 || stop > size || start > stop {
        return None;
    }

    Some(&raw[start as usize..stop as usize])
}

/// Which side(s) `strip_set` trims from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StripSide {
    /// Leading bytes only.
    Left,
    /// Trailing bytes only.
    Right,
    /// Both ends.
    Both,
}

/// Trim the code points (or bytes, when `strip_set` is pure ascii) listed
/// in `strip_set` from the chosen ends of `source`.
pub fn strip(source: &str, strip_set: &str, side: StripSide) -> String {
    let stripped = if strip_set.bytes().any(|b| b > 127) {
        let set: Vec<char> = strip_set.chars().collect();
        let matcher = |c: char| set.contains(&c);

        match side {
            StripSide::Left => source.trim_start_matches(matcher),
            StripSide::Right => source.trim_end_matches(matcher),
            StripSide::Both => source.trim_matches(matcher),
        }
    } else {
        let matcher = |c: char| c.is_ascii() && strip_set.as_bytes().contains(&(c as u8));

        match side {
            StripSide::Left => source.trim_start_matches(matcher),
            StripSide::Right => source.trim_end_matches(matcher),
            StripSide::Both => source.trim_matches(matcher),
        }
    };

    stripped.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn follower_table_shape() {
        assert_eq!(FOLLOWER_TABLE[b'a' as usize], 1);
        assert_eq!(FOLLOWER_TABLE[0x80], -1);
        assert_eq!(FOLLOWER_TABLE[0xc2], 2);
        assert_eq!(FOLLOWER_TABLE[0xc1], -1);
        assert_eq!(FOLLOWER_TABLE[0xe0], 3);
        assert_eq!(FOLLOWER_TABLE[0xf4], 4);
        assert_eq!(FOLLOWER_TABLE[0xf5], -1);
    }

    #[rstest]
    #[case("hello", 0, 5, Some("hello"))]
    #[case("hello", 1, 3, Some("el"))]
    #[case("hello", -3, -1, Some("ll"))]
    #[case("hello", 3, 2, None)]
    #[case("hello", 0, 6, None)]
    #[case("héllo", 0, 2, None)]
    #[case("héllo", 0, 3, Some("hé"))]
    fn slicing(
        #[case] source: &str,
        #[case] start: i64,
        #[case] stop: i64,
        #[case] expected: Option<&str>,
    ) {
        assert_eq!(str_slice(source, start, stop), expected);
    }

    #[test]
    fn stop_at_size_is_a_boundary() {
        let s = "é";
        assert_eq!(str_slice(s, 0, s.len() as i64), Some("é"));
    }

    #[test]
    fn ascii_strip_set_trims_bytes() {
        assert_eq!(strip("xxabcx", "x", StripSide::Both), "abc");
        assert_eq!(strip("xxabcx", "x", StripSide::Left), "abcx");
        assert_eq!(strip("xxabcx", "x", StripSide::Right), "xxabc");
    }

    #[test]
    fn wide_strip_set_trims_code_points() {
        assert_eq!(strip("ééabcé", "é", StripSide::Both), "abc");
        assert_eq!(strip("éabc", "éa", StripSide::Left), "bc");
    }
}
