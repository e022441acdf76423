//! Directory traversal guard.
//!
//! The outer percent-encoding layer must be well formed. Nested layers are
//! decoded leniently until nothing changes, and every layer is checked.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::security::error::InputError;

static PARENT_SEGMENT: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"(^|[/\\])\.\.|\.\.($|[/\\])").ok());

fn has_parent_segment(path: &str) -> bool {
    PARENT_SEGMENT.as_ref().map_or(true, |regex| regex.is_match(path))
}

/// # Errors
/// Returns an [`InputError`] for traversal attempts and undecodable paths.
pub fn check_path(raw: &str) -> Result<(), InputError> {
    ensure_well_formed(raw)?;
    let mut layer = urlencoding::decode(raw)
        .map_err(|_| InputError::MalformedEncoding)?
        .into_owned();
    loop {
        if has_parent_segment(&layer) {
            return Err(InputError::Traversal);
        }
        if !layer.contains('%') {
            return Ok(());
        }
        let next = String::from_utf8_lossy(&urlencoding::decode_binary(layer.as_bytes())).into_owned();
        if next == layer {
            return Ok(());
        }
        layer = next;
    }
}

fn ensure_well_formed(raw: &str) -> Result<(), InputError> {
    let bytes = raw.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let valid = bytes
                .get(i + 1..i + 3)
                .is_some_and(|pair| pair.iter().all(u8::is_ascii_hexdigit));
            if !valid {
                return Err(InputError::MalformedEncoding);
            }
            i += 3;
        } else {
            i += 1;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_parent_segments_are_rejected() {
        for path in ["/a/../../etc/passwd", "/..", "..", "/a/..", "/a\\..\\b"] {
            assert_eq!(check_path(path), Err(InputError::Traversal), "{path}");
        }
    }

    #[test]
    fn encoded_parent_segments_are_rejected() {
        for path in [
            "/a%2e%2e/b",
            "/%2e%2e/etc",
            "/a/%2E%2E%2Fetc",
            "/a/%252e%252e/b",
            "/a/%25252e%25252e%25252fb",
            "/a%5c..%5cb",
        ] {
            assert_eq!(check_path(path), Err(InputError::Traversal), "{path}");
        }
    }

    #[test]
    fn harmless_dots_are_allowed() {
        for path in ["/", "/notes..txt", "/a/b.c/d", "/a/.hidden", "/%E2%9C%93.txt", "/100%25"] {
            assert_eq!(check_path(path), Ok(()), "{path}");
        }
    }

    #[test]
    fn malformed_encoding_is_rejected() {
        assert_eq!(check_path("/a%zz"), Err(InputError::MalformedEncoding));
        assert_eq!(check_path("/a%2"), Err(InputError::MalformedEncoding));
        assert_eq!(check_path("/a%ff%fe"), Err(InputError::MalformedEncoding));
    }
}
