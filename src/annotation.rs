//! Annotation block handling.
//!
//! An annotation block is a delimited, non-narrative payload the secondary
//! model appends to a transcript entry. At most one live block exists per
//! entry; the delimiter pair is fixed so both the visibility filter and the
//! result merger agree on what to strip and what to replace.

use lazy_static::lazy_static;
use regex::Regex;

/// Opening delimiter of an annotation block.
pub const BLOCK_OPEN: &str = "<infobar_data>";
/// Closing delimiter of an annotation block.
pub const BLOCK_CLOSE: &str = "</infobar_data>";

lazy_static! {
    // Non-greedy so multiple blocks in one entry are matched individually.
    static ref BLOCK_RE: Regex =
        Regex::new(r"(?s)<infobar_data>.*?</infobar_data>").unwrap();
}

/// Returns true if `text` contains at least one annotation block.
pub fn contains_block(text: &str) -> bool {
    BLOCK_RE.is_match(text)
}

/// Removes every annotation block from `text`.
///
/// The separator blank line the merger inserts is removed along with the
/// block, so a repaired entry reads as pure narrative again.
pub fn strip_blocks(text: &str) -> String {
    if !contains_block(text) {
        return text.to_string();
    }
    BLOCK_RE.replace_all(text, "").trim().to_string()
}
