//! Reversible mapping between object keys and relative filesystem paths.
//!
//! Characters that would make a key unsafe or ambiguous on disk are written as
//! `__0x<hex>__`. A literal `_` is escaped whenever another `_` follows it, so
//! the escape marker can never occur in unescaped text.

use std::fmt::Write as _;

const ESCAPE_PREFIX: &str = "__0x";
const ESCAPE_SUFFIX: &str = "__";

/// Encodes `key` into a `/`-separated relative path.
///
/// The result never contains empty, `.` or `..` segments, never starts with a
/// separator and never ends with one.
#[must_use]
pub fn encode(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    let mut out = String::with_capacity(key.len());

    for (i, &c) in chars.iter().enumerate() {
        if must_escape(&chars, i) {
            let _ = write!(out, "{ESCAPE_PREFIX}{:x}{ESCAPE_SUFFIX}", u32::from(c));
        } else {
            out.push(c);
        }
    }
    out
}

/// Inverts [`encode`]. Input not produced by [`encode`] decodes best-effort.
#[must_use]
pub fn decode(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    let mut rest = path;

    while !rest.is_empty() {
        if let Some((c, len)) = parse_escape(rest) {
            out.push(c);
            rest = &rest[len..];
        } else {
            let mut it = rest.chars();
            if let Some(c) = it.next() {
                out.push(c);
            }
            rest = it.as_str();
        }
    }
    out
}

fn must_escape(chars: &[char], i: usize) -> bool {
    let c = chars[i];
    let prev = i.checked_sub(1).map(|p| chars[p]);
    let next = chars.get(i + 1).copied();

    match c {
        c if c.is_control() => true,
        '/' => i == 0 || prev == Some('/') || next.is_none(),
        '_' => next == Some('_'),
        '.' => is_last_dot_of_dot_segment(chars, i),
        c if c != '/' && std::path::is_separator(c) => true,
        c if cfg!(windows) && matches!(c, '<' | '>' | ':' | '"' | '|' | '?' | '*') => true,
        _ => false,
    }
}

/// True for the final `.` of a `.` or `..` segment.
fn is_last_dot_of_dot_segment(chars: &[char], i: usize) -> bool {
    let segment_end = chars.get(i + 1).is_none_or(|&c| c == '/');
    if !segment_end {
        return false;
    }
    let start = chars[..i].iter().rposition(|&c| c == '/').map_or(0, |p| p + 1);
    let segment = &chars[start..=i];
    segment == ['.'] || segment == ['.', '.']
}

fn parse_escape(s: &str) -> Option<(char, usize)> {
    let body = s.strip_prefix(ESCAPE_PREFIX)?;
    let hex_len = body.bytes().take_while(u8::is_ascii_hexdigit).count();
    if hex_len == 0 || !body[hex_len..].starts_with(ESCAPE_SUFFIX) {
        return None;
    }
    let code = u32::from_str_radix(&body[..hex_len], 16).ok()?;
    let c = char::from_u32(code)?;
    Some((c, ESCAPE_PREFIX.len() + hex_len + ESCAPE_SUFFIX.len()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::path::{Component, Path};

    #[test]
    fn plain_keys_are_untouched() {
        assert_eq!(encode("photos/2024/cat.jpg"), "photos/2024/cat.jpg");
        assert_eq!(encode("snake_case.txt"), "snake_case.txt");
    }

    #[test]
    fn traversal_shapes_are_escaped() {
        assert_eq!(encode(".."), ".__0x2e__");
        assert_eq!(encode("."), "__0x2e__");
        assert_eq!(encode("../etc/passwd"), ".__0x2e__/etc/passwd");
        assert_eq!(encode("a/./b"), "a/__0x2e__/b");
        assert_eq!(encode("/abs"), "__0x2f__abs");
        assert_eq!(encode("a//b"), "a/__0x2f__b");
        assert_eq!(encode("dir/"), "dir__0x2f__");
        // Dots inside a longer segment are fine.
        assert_eq!(encode("...x/.hidden"), "...x/.hidden");
    }

    #[test]
    fn escape_marker_cannot_be_forged() {
        assert_eq!(encode("__0x41__"), "__0x5f___0x41__0x5f___");
        assert_eq!(decode(&encode("__0x41__")), "__0x41__");
        assert_eq!(encode("a\u{1}b"), "a__0x1__b");
    }

    #[test]
    fn decode_inverts_escapes() {
        assert_eq!(decode(".__0x2e__/x"), "../x");
        assert_eq!(decode("a/__0x2f__b"), "a//b");
        assert_eq!(decode("__0x7f__"), "\u{7f}");
        // Not an escape: no terminator.
        assert_eq!(decode("_0x41_"), "_0x41_");
    }

    proptest! {
        #[test]
        fn round_trips(key in any::<String>()) {
            prop_assert_eq!(decode(&encode(&key)), key);
        }

        #[test]
        fn round_trips_path_like(key in "[./_a0x\\\\\u{1}]{0,12}") {
            prop_assert_eq!(decode(&encode(&key)), key);
        }

        #[test]
        fn never_escapes_the_root(key in "[./_a]{1,12}") {
            let encoded = encode(&key);
            prop_assert!(!encoded.is_empty());
            for component in Path::new(&encoded).components() {
                prop_assert!(matches!(component, Component::Normal(_)), "{encoded:?}");
            }
        }

        #[test]
        fn is_injective(a in "[./_0x]{0,8}", b in "[./_0x]{0,8}") {
            prop_assume!(a != b);
            prop_assert_ne!(encode(&a), encode(&b));
        }
    }
}
