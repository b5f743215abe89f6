//! HTML tree access for HTML rules.
//!
//! Rules parse the fragment once with [`parse_html`] and then query it with
//! CSS selectors. Table cells from vendor emails often carry quoted-printable
//! residue and stray whitespace; [`clean_line`] strips both.

use scraper::{ElementRef, Html, Selector};
use thiserror::Error;

use super::patterns::{collapse_whitespace, QP_RESIDUE};
use super::text::decode_text;

/// Errors from HTML queries.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HtmlError {
    #[error("Invalid CSS selector '{selector}': {reason}")]
    Selector { selector: String, reason: String },
}

/// Parse a fragment into an HTML document.
pub fn parse_html(content: &[u8]) -> Html {
    Html::parse_document(&decode_text(content))
}

/// All elements matching `selector`, in document order.
pub fn select<'a>(document: &'a Html, selector: &str) -> Result<Vec<ElementRef<'a>>, HtmlError> {
    let parsed = Selector::parse(selector).map_err(|e| HtmlError::Selector {
        selector: selector.to_string(),
        reason: e.to_string(),
    })?;
    Ok(document.select(&parsed).collect())
}

/// Cleaned text of one element.
pub fn element_text(element: &ElementRef<'_>) -> String {
    clean_line(&element.text().collect::<String>())
}

/// Cleaned texts of all elements matching `selector`.
pub fn select_texts(document: &Html, selector: &str) -> Result<Vec<String>, HtmlError> {
    Ok(select(document, selector)?
        .iter()
        .map(element_text)
        .collect())
}

/// Visible text of the whole document, one cleaned line per text node.
pub fn document_text(document: &Html) -> String {
    document
        .root_element()
        .descendants()
        .filter_map(|node| {
            let text = node.value().as_text()?;
            let hidden = node.ancestors().any(|ancestor| {
                ancestor
                    .value()
                    .as_element()
                    .is_some_and(|element| matches!(element.name(), "script" | "style"))
            });
            (!hidden).then(|| clean_line(text))
        })
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Strip quoted-printable residue and collapse whitespace.
pub fn clean_line(line: &str) -> String {
    collapse_whitespace(&QP_RESIDUE.replace_all(line, ""))
}
