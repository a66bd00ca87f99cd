//! Entity-tag helpers shared by drivers.

use md5::{Digest, Md5};

/// Lowercase hex MD5 of `data`, the ETag of a single-part object.
#[must_use]
pub fn md5_hex(data: &[u8]) -> String {
    hex::encode(Md5::digest(data))
}

/// Strips the surrounding quotes HTTP clients tend to keep on ETags.
#[must_use]
pub fn canonicalize(etag: &str) -> &str {
    let etag = etag.trim();
    let etag = etag.strip_prefix('"').unwrap_or(etag);
    etag.strip_suffix('"').unwrap_or(etag)
}

/// S3-compatible composite ETag: MD5 over the concatenated part digests,
/// suffixed with the part count.
#[must_use]
pub fn composite<I, D>(part_md5s: I) -> String
where
    I: IntoIterator<Item = D>,
    D: AsRef<[u8]>,
{
    let mut hasher = Md5::new();
    let mut count = 0usize;
    for digest in part_md5s {
        hasher.update(digest.as_ref());
        count += 1;
    }
    format!("{}-{count}", hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quotes_are_stripped() {
        assert_eq!(canonicalize("\"abc\""), "abc");
        assert_eq!(canonicalize("abc"), "abc");
        assert_eq!(canonicalize(" \"abc-2\" "), "abc-2");
    }

    #[test]
    fn composite_hashes_raw_digests() {
        let m1 = Md5::digest(b"first");
        let m2 = Md5::digest(b"second");

        let mut joined = m1.to_vec();
        joined.extend_from_slice(&m2);
        let expected = format!("{}-2", md5_hex(&joined));

        assert_eq!(composite([m1, m2]), expected);
    }

    #[test]
    fn empty_input_has_known_digest() {
        assert_eq!(md5_hex(b""), "d41d8cd98f00b204e9800998ecf8427e");
    }
}
