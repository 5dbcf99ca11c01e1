//! Plain-text extraction from `message.attributedBody`.
//!
//! Newer databases leave `message.text` empty and keep the text inside a
//! `typedstream`-archived `NSAttributedString`. The string payload follows
//! the `NSString` class name as `0x01 '+'`, a length prefix and UTF-8
//! bytes. When that layout is not found the longest readable run of text
//! is used instead.

const NSSTRING: &[u8] = b"NSString";
const STRING_START: &[u8] = &[0x01, b'+'];
const MIN_RUN: usize = 3;

/// Archive class names and keys that are never message text.
const ARTIFACTS: &[&str] = &[
    "bplist",
    "NSString",
    "NSNumber",
    "NSDictionary",
    "NSArray",
    "NSData",
    "NSObject",
    "NSAttributedString",
    "NSMutableString",
    "NSMutableAttributedString",
    "NSValue",
    "$class",
    "archiver",
    "streamtyped",
    "__kIM",
];

/// Extracts the message text from an archived attributed string.
#[must_use]
pub fn extract_text(body: &[u8]) -> Option<String> {
    if body.is_empty() {
        return None;
    }
    typedstream_string(body).or_else(|| longest_readable_run(body))
}

fn typedstream_string(body: &[u8]) -> Option<String> {
    let after_class = find(body, NSSTRING)? + NSSTRING.len();
    let rest = &body[after_class..];
    let start = find(rest, STRING_START)? + STRING_START.len();
    let rest = &rest[start..];

    let (len, header) = match *rest.first()? {
        0x81 => (usize::from(u16::from_le_bytes([*rest.get(1)?, *rest.get(2)?])), 3),
        0x82 => {
            let bytes = [*rest.get(1)?, *rest.get(2)?, *rest.get(3)?, *rest.get(4)?];
            (usize::try_from(u32::from_le_bytes(bytes)).ok()?, 5)
        }
        n => (usize::from(n), 1),
    };

    let text = rest.get(header..header + len)?;
    let text = std::str::from_utf8(text).ok()?.trim();
    (!text.is_empty()).then(|| text.to_string())
}

fn longest_readable_run(body: &[u8]) -> Option<String> {
    String::from_utf8_lossy(body)
        .split(|c: char| c.is_control() || c == char::REPLACEMENT_CHARACTER)
        .map(str::trim)
        .filter(|run| run.chars().count() >= MIN_RUN)
        .filter(|run| !ARTIFACTS.iter().any(|artifact| run.contains(artifact)))
        .max_by_key(|run| run.chars().count())
        .map(str::to_string)
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn archive(text: &str) -> Vec<u8> {
        let mut body = b"\x04\x0bstreamtyped\x81\xe8\x03\x84\x01@\x84\x84\x84\x12NSAttributedString\x00\x84\x84\x08NSObject\x00\x85\x92\x84\x84\x84\x08NSString\x01\x94\x84\x01+".to_vec();
        let bytes = text.as_bytes();
        if bytes.len() < 0x80 {
            body.push(u8::try_from(bytes.len()).unwrap());
        } else {
            body.push(0x81);
            body.extend_from_slice(&u16::try_from(bytes.len()).unwrap().to_le_bytes());
        }
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\x86\x84\x02iI\x01\x05\x92\x84\x84\x84\x0cNSDictionary\x00");
        body
    }

    #[test]
    fn test_short_string() {
        assert_eq!(extract_text(&archive("hello there")).unwrap(), "hello there");
    }

    #[test]
    fn test_long_string_with_wide_length() {
        let text = "a fairly long message ".repeat(10);
        assert_eq!(extract_text(&archive(&text)).unwrap(), text.trim());
    }

    #[test]
    fn test_unicode_string() {
        assert_eq!(extract_text(&archive("see you 🎉")).unwrap(), "see you 🎉");
    }

    #[test]
    fn test_fallback_to_readable_run() {
        let body = b"\x00\x01bplist00\x02\x03Lunch at noon?\x04\x05NSDictionary\x06";
        assert_eq!(extract_text(body).unwrap(), "Lunch at noon?");
    }

    #[test]
    fn test_nothing_readable() {
        assert_eq!(extract_text(&[]), None);
        assert_eq!(extract_text(b"\x00\x01\x02NSString\x03"), None);
    }
}
