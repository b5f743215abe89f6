//! Shared text patterns for parsers and provider filters.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// CR and LF, removed before filter matching
    pub static ref LINE_BREAKS: Regex = Regex::new(r"[\r\n]").unwrap();

    /// Runs of Unicode whitespace (non-breaking spaces included)
    pub static ref WHITESPACE_RUN: Regex = Regex::new(r"\s+").unwrap();

    /// Quoted-printable soft line break
    pub static ref QP_SOFT_BREAK: Regex = Regex::new(r"=\r?\n").unwrap();

    /// Quoted-printable escapes left behind in badly decoded HTML cells
    pub static ref QP_RESIDUE: Regex = Regex::new(r"=(?:C2|A0)").unwrap();
}

/// Remove every CR and LF.
pub fn strip_line_breaks(content: &str) -> String {
    LINE_BREAKS.replace_all(content, "").into_owned()
}

/// Collapse whitespace runs to one space and trim.
pub fn collapse_whitespace(content: &str) -> String {
    WHITESPACE_RUN.replace_all(content, " ").trim().to_string()
}
