//! Decoded text access for plain-text rules.

use super::patterns::{collapse_whitespace, QP_SOFT_BREAK};

/// Decode content as UTF-8 (lossy), join quoted-printable soft breaks and
/// normalize line endings to `\n`.
pub fn decode_text(content: &[u8]) -> String {
    let text = String::from_utf8_lossy(content);
    QP_SOFT_BREAK
        .replace_all(&text, "")
        .replace("\r\n", "\n")
        .replace('\r', "\n")
}

/// Non-empty lines with whitespace collapsed.
pub fn text_lines(content: &[u8]) -> Vec<String> {
    decode_text(content)
        .lines()
        .map(collapse_whitespace)
        .filter(|line| !line.is_empty())
        .collect()
}

/// Value following `label` on the first line that contains it, e.g.
/// `labelled_value(lines, "Circuit ID:")`.
pub fn labelled_value(lines: &[String], label: &str) -> Option<String> {
    lines.iter().find_map(|line| {
        line.find(label)
            .map(|at| line[at + label.len()..].trim().to_string())
            .filter(|value| !value.is_empty())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_text() {
        let text = decode_text(b"Dear customer,\r\nplanned work on ci=\r\nrcuit 123\r\n");
        assert_eq!(text, "Dear customer,\nplanned work on circuit 123\n");
    }

    #[test]
    fn test_text_lines_skip_blank() {
        let lines = text_lines(b"Line one\r\n\r\n   \r\n  Line    two  ");
        assert_eq!(lines, vec!["Line one", "Line two"]);
    }

    #[test]
    fn test_labelled_value() {
        let lines = text_lines(b"Ticket: VNOC-1\nCircuit ID: 123 \nCircuit ID:\n");
        assert_eq!(labelled_value(&lines, "Circuit ID:").as_deref(), Some("123"));
        assert_eq!(labelled_value(&lines, "Ticket:").as_deref(), Some("VNOC-1"));
        assert_eq!(labelled_value(&lines, "Account:"), None);
    }
}
