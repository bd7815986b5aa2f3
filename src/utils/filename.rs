//! Uploaded file name charset recovery.
//!
//! Browsers occasionally hand multipart file names over as raw bytes smuggled
//! through a one-byte-per-char string. The name is reinterpreted as UTF-8
//! first, then GBK, then GB18030, keeping the first decode that succeeds; if
//! every attempt fails the name is kept exactly as received. Runs once at
//! ingestion, never at read time.

use encoding_rs::{GB18030, GBK};

/// Recover the intended file name from a possibly mis-encoded multipart name.
pub fn recover_file_name(raw: &str) -> String {
    // Chars above U+00FF cannot come from a byte-per-char smuggle; the name
    // already arrived as real UTF-8.
    if raw.chars().any(|c| c as u32 > 0xFF) {
        return raw.to_string();
    }

    let bytes: Vec<u8> = raw.chars().map(|c| c as u8).collect();
    match decode_bytes(&bytes) {
        Some(decoded) => decoded,
        None => raw.to_string(),
    }
}

fn decode_bytes(bytes: &[u8]) -> Option<String> {
    if let Ok(utf8) = std::str::from_utf8(bytes) {
        return Some(utf8.to_string());
    }
    if let Some(gbk) = GBK.decode_without_bom_handling_and_without_replacement(bytes) {
        return Some(gbk.into_owned());
    }
    if let Some(gb18030) = GB18030.decode_without_bom_handling_and_without_replacement(bytes) {
        return Some(gb18030.into_owned());
    }
    None
}
