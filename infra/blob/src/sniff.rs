//! Content-type detection following the WHATWG MIME sniffing rules for the
//! signatures object stores commonly see.

/// Number of leading bytes considered when sniffing.
pub const SNIFF_LEN: usize = 512;

const TEXT_UTF8: &str = "text/plain; charset=utf-8";
const OCTET_STREAM: &str = "application/octet-stream";

/// Tags that mark an HTML document when they open the (whitespace-trimmed) data.
const HTML_TAGS: &[&[u8]] = &[
    b"<!DOCTYPE HTML",
    b"<HTML",
    b"<HEAD",
    b"<SCRIPT",
    b"<IFRAME",
    b"<H1",
    b"<DIV",
    b"<FONT",
    b"<TABLE",
    b"<A",
    b"<STYLE",
    b"<TITLE",
    b"<B",
    b"<BODY",
    b"<BR",
    b"<P",
    b"<!--",
];

/// Exact prefix signatures.
const SIGNATURES: &[(&[u8], &str)] = &[
    (b"%PDF-", "application/pdf"),
    (b"%!PS-Adobe-", "application/postscript"),
    (&[0xFE, 0xFF], "text/plain; charset=utf-16be"),
    (&[0xFF, 0xFE], "text/plain; charset=utf-16le"),
    (&[0xEF, 0xBB, 0xBF], TEXT_UTF8),
    (&[0x00, 0x00, 0x01, 0x00], "image/x-icon"),
    (&[0x00, 0x00, 0x02, 0x00], "image/x-icon"),
    (b"BM", "image/bmp"),
    (b"GIF87a", "image/gif"),
    (b"GIF89a", "image/gif"),
    (b"\x89PNG\r\n\x1a\n", "image/png"),
    (&[0xFF, 0xD8, 0xFF], "image/jpeg"),
    (b"ID3", "audio/mpeg"),
    (b"OggS\x00", "application/ogg"),
    (b"MThd\x00\x00\x00\x06", "audio/midi"),
    (b"wOFF", "font/woff"),
    (b"wOF2", "font/woff2"),
    (&[0x1F, 0x8B, 0x08], "application/x-gzip"),
    (b"PK\x03\x04", "application/zip"),
    (b"Rar!\x1A\x07\x00", "application/x-rar-compressed"),
    (b"Rar!\x1A\x07\x01\x00", "application/x-rar-compressed"),
    (b"\x00asm", "application/wasm"),
];

/// `RIFF` containers: four magic bytes, a length we ignore, then the form type.
const RIFF_FORMS: &[(&[u8], &str)] =
    &[(b"WEBPVP", "image/webp"), (b"WAVE", "audio/wave"), (b"AVI ", "video/avi")];

/// Returns a media type for `data`, never failing.
///
/// At most [`SNIFF_LEN`] bytes are inspected. Unknown binary content falls back
/// to `application/octet-stream`, anything else to UTF-8 text.
#[must_use]
pub fn detect_content_type(data: &[u8]) -> &'static str {
    let data = &data[..data.len().min(SNIFF_LEN)];

    let trimmed = trim_leading_ws(data);
    if HTML_TAGS.iter().any(|tag| is_html_tag(trimmed, tag)) {
        return "text/html; charset=utf-8";
    }
    if trimmed.starts_with(b"<?xml") {
        return "text/xml; charset=utf-8";
    }

    if let Some((_, media_type)) = SIGNATURES.iter().find(|(sig, _)| data.starts_with(sig)) {
        return media_type;
    }
    if data.starts_with(b"RIFF")
        && data.len() >= 8
        && let Some((_, media_type)) =
            RIFF_FORMS.iter().find(|(form, _)| data[8..].starts_with(form))
    {
        return media_type;
    }

    if data.iter().copied().any(is_binary_byte) { OCTET_STREAM } else { TEXT_UTF8 }
}

fn trim_leading_ws(data: &[u8]) -> &[u8] {
    let start = data
        .iter()
        .position(|b| !matches!(b, b'\t' | b'\n' | 0x0C | b'\r' | b' '))
        .unwrap_or(data.len());
    &data[start..]
}

/// Case-insensitive tag match that must be followed by a space or `>`.
fn is_html_tag(data: &[u8], tag: &[u8]) -> bool {
    if data.len() <= tag.len() || !data[..tag.len()].eq_ignore_ascii_case(tag) {
        return false;
    }
    matches!(data[tag.len()], b' ' | b'>')
}

const fn is_binary_byte(b: u8) -> bool {
    matches!(b, 0x00..=0x08 | 0x0B | 0x0E..=0x1A | 0x1C..=0x1F)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text() {
        assert_eq!(detect_content_type(b"hello world"), TEXT_UTF8);
        assert_eq!(detect_content_type(b""), TEXT_UTF8);
    }

    #[test]
    fn html_is_case_insensitive_and_skips_whitespace() {
        assert_eq!(detect_content_type(b"  \n<html><body/>"), "text/html; charset=utf-8");
        assert_eq!(detect_content_type(b"<!doctype html>"), "text/html; charset=utf-8");
        // A bare "<a" prefix of a longer word is not a tag.
        assert_eq!(detect_content_type(b"<abbr"), TEXT_UTF8);
    }

    #[test]
    fn binary_signatures() {
        assert_eq!(detect_content_type(b"\x89PNG\r\n\x1a\n\0\0"), "image/png");
        assert_eq!(detect_content_type(b"%PDF-1.7"), "application/pdf");
        assert_eq!(detect_content_type(b"RIFF\x10\0\0\0WEBPVP8 "), "image/webp");
        assert_eq!(detect_content_type(&[0x1F, 0x8B, 0x08, 0x00]), "application/x-gzip");
    }

    #[test]
    fn unknown_binary_falls_back() {
        assert_eq!(detect_content_type(&[0x01, 0x02, 0x03]), OCTET_STREAM);
    }

    #[test]
    fn only_the_sniff_window_is_inspected() {
        let mut data = vec![b'a'; SNIFF_LEN];
        data.push(0x00);
        assert_eq!(detect_content_type(&data), TEXT_UTF8);
    }
}
