//! Notification data: the tagged fragments one notification is made of.
//!
//! A notification arrives either as a single payload with a known tag (an
//! iCalendar file, an HTML page) or as a full email, which is walked
//! depth-first into one [`DataPart`] per leaf MIME part plus two synthetic
//! parts for the Subject and Date headers.

use std::fmt;

use indexmap::IndexSet;
use mailparse::{MailHeaderMap, ParsedMail};
use thiserror::Error;

/// Tag of the synthetic fragment holding the email Subject header.
pub const EMAIL_HEADER_SUBJECT: &str = "email-header-subject";

/// Tag of the synthetic fragment holding the email Date header.
pub const EMAIL_HEADER_DATE: &str = "email-header-date";

/// Errors building notification data.
#[derive(Error, Debug)]
pub enum DataError {
    #[error("Email content is not valid UTF-8: {0}")]
    Encoding(#[from] std::str::Utf8Error),

    #[error("Failed to parse email: {0}")]
    Email(#[from] mailparse::MailParseError),
}

/// One tagged chunk of raw notification content.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct DataPart {
    /// Format tag, usually a MIME content type such as `text/html`
    pub data_type: String,

    /// Raw content, already decoded from its transfer encoding
    pub content: Vec<u8>,
}

impl DataPart {
    pub fn new(data_type: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            data_type: data_type.into(),
            content: content.into(),
        }
    }
}

impl fmt::Debug for DataPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataPart")
            .field("data_type", &self.data_type)
            .field("content", &format_args!("<{} bytes>", self.content.len()))
            .finish()
    }
}

/// The ordered, de-duplicated fragments of one notification.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotificationData {
    data_parts: IndexSet<DataPart>,
}

impl NotificationData {
    /// A collection holding a single fragment.
    pub fn init_from_raw(data_type: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        let mut data = Self::default();
        data.append(data_type, content);
        data
    }

    /// Decompose a raw RFC 5322 email.
    ///
    /// Image parts are skipped. Multipart and `message/rfc822` parts are
    /// walked into. Leaf parts whose body cannot be decoded are skipped.
    /// Subject and Date are always added, empty when the header is missing.
    pub fn init_from_email(raw_email: &[u8]) -> Result<Self, DataError> {
        std::str::from_utf8(raw_email)?;
        let message = mailparse::parse_mail(raw_email)?;

        let mut data = Self::default();
        data.walk(&message);

        let subject = message
            .headers
            .get_first_value("Subject")
            .unwrap_or_default();
        let date = message.headers.get_first_value("Date").unwrap_or_default();
        data.append(EMAIL_HEADER_SUBJECT, subject.trim());
        data.append(EMAIL_HEADER_DATE, date.trim());

        Ok(data)
    }

    /// Decompose an email, then add one more fragment.
    pub fn init_from_email_with_extra(
        raw_email: &[u8],
        data_type: impl Into<String>,
        content: impl Into<Vec<u8>>,
    ) -> Result<Self, DataError> {
        let mut data = Self::init_from_email(raw_email)?;
        data.append(data_type, content);
        Ok(data)
    }

    /// Add one fragment. An identical `(tag, content)` pair is kept once.
    pub fn append(&mut self, data_type: impl Into<String>, content: impl Into<Vec<u8>>) {
        self.data_parts.insert(DataPart::new(data_type, content));
    }

    /// Fragments in insertion order.
    pub fn data_parts(&self) -> impl Iterator<Item = &DataPart> {
        self.data_parts.iter()
    }

    /// Fragment tags in insertion order.
    pub fn data_types(&self) -> Vec<&str> {
        self.data_parts
            .iter()
            .map(|part| part.data_type.as_str())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.data_parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data_parts.is_empty()
    }

    fn walk(&mut self, part: &ParsedMail<'_>) {
        let mimetype = part.ctype.mimetype.to_lowercase();

        if mimetype.starts_with("image/") {
            return;
        }

        if !part.subparts.is_empty() {
            for sub in &part.subparts {
                self.walk(sub);
            }
            return;
        }

        let body = match part.get_body_raw() {
            Ok(body) => body,
            Err(e) => {
                tracing::debug!(data_type = %mimetype, error = %e, "Skipping undecodable email part");
                return;
            }
        };

        if mimetype == "message/rfc822" {
            match mailparse::parse_mail(&body) {
                Ok(embedded) => self.walk(&embedded),
                Err(e) => {
                    tracing::debug!(error = %e, "Skipping unparsable embedded message")
                }
            }
            return;
        }

        self.append(mimetype, body);
    }
}
