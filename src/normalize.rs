//! Conversion of raw messages into the fixed 5-field export row.
//!
//! Normalization never aborts an export: the Graph path is total
//! (placeholders stand in for anything missing) and the MIME path returns
//! an error only for a blob the parser rejects outright, which the caller
//! logs and skips.

use chrono::DateTime;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{ExportError, Result};
use crate::graph::GraphMessage;

/// Placeholders for missing fields. A row never contains an empty date,
/// sender or subject.
pub const UNKNOWN_DATE: &str = "Unknown Date";
pub const UNKNOWN_SENDER: &str = "Unknown";
pub const NO_SUBJECT: &str = "No Subject";
pub const UNDECODABLE_BODY: &str = "Could not decode email body";

/// Body previews are capped at this many characters.
pub const BODY_PREVIEW_LIMIT: usize = 500;

const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Bare `local-part@domain` inside a raw From header.
static ADDRESS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\w.-]+@[\w.-]+").expect("address pattern is valid"));

/// One spreadsheet row. The fifth column is read-status for the Graph
/// variant and the folder name for the IMAP variant; the sheet header
/// labels it accordingly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportRow {
    pub date: String,
    pub sender: String,
    pub subject: String,
    pub body_preview: String,
    pub status: String,
}

impl ExportRow {
    /// Column values in sheet order.
    pub fn fields(&self) -> [&str; 5] {
        [
            &self.date,
            &self.sender,
            &self.subject,
            &self.body_preview,
            &self.status,
        ]
    }
}

/// Strip line breaks and cap the preview length.
///
/// Removes `\r`, turns `\n` into spaces, and keeps the first
/// [`BODY_PREVIEW_LIMIT`] characters. Idempotent: running it on its own
/// output is a no-op.
pub fn clean_body(text: &str) -> String {
    text.chars()
        .filter(|c| *c != '\r')
        .map(|c| if c == '\n' { ' ' } else { c })
        .take(BODY_PREVIEW_LIMIT)
        .collect()
}

/// Normalize one Graph message. Total: every missing field degrades to its
/// placeholder.
pub fn normalize_graph(message: &GraphMessage) -> ExportRow {
    let date = message
        .received_date_time
        .as_deref()
        .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
        .map(|dt| dt.format(DATE_FORMAT).to_string())
        .unwrap_or_else(|| UNKNOWN_DATE.to_string());

    let sender = message
        .from
        .as_ref()
        .and_then(|from| from.address())
        .map(str::to_string)
        .unwrap_or_else(|| UNKNOWN_SENDER.to_string());

    let subject = message
        .subject
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| NO_SUBJECT.to_string());

    let body_preview = clean_body(message.body_preview.as_deref().unwrap_or(""));

    let status = if message.is_read.unwrap_or(false) {
        "Read"
    } else {
        "Unread"
    };

    ExportRow {
        date,
        sender,
        subject,
        body_preview,
        status: status.to_string(),
    }
}

/// Normalize one raw RFC822 message for the IMAP variant.
///
/// Errors only when the blob cannot be parsed as a MIME message at all;
/// individual missing or undecodable fields degrade to placeholders.
pub fn normalize_mime(raw: &[u8], folder: &str) -> Result<ExportRow> {
    let message = mail_parser::MessageParser::default()
        .parse(raw)
        .ok_or_else(|| ExportError::Normalize("unparseable MIME message".to_string()))?;

    let date = match message.date() {
        Some(parsed) => DateTime::from_timestamp(parsed.to_timestamp(), 0)
            .map(|dt| dt.format(DATE_FORMAT).to_string())
            // to_timestamp out of chrono's range: fall back to the raw header
            .or_else(|| raw_header(&message, "Date"))
            .unwrap_or_else(|| UNKNOWN_DATE.to_string()),
        // Unparsable or absent Date header: pass the raw value through
        None => raw_header(&message, "Date").unwrap_or_else(|| UNKNOWN_DATE.to_string()),
    };

    let sender = message
        .from()
        .and_then(|from| from.first())
        .and_then(|addr| addr.address())
        .map(str::to_string)
        .or_else(|| extract_bare_address(&message))
        .unwrap_or_else(|| UNKNOWN_SENDER.to_string());

    // mail-parser has already decoded any RFC 2047 encoded words here
    let subject = message
        .subject()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| NO_SUBJECT.to_string());

    // body_text(0) is the first text part in depth-first part order
    let body_preview = message
        .body_text(0)
        .map(|text| clean_body(&text))
        .unwrap_or_else(|| UNDECODABLE_BODY.to_string());

    Ok(ExportRow {
        date,
        sender,
        subject,
        body_preview,
        status: folder.to_string(),
    })
}

fn raw_header<'x>(message: &mail_parser::Message<'x>, name: &'x str) -> Option<String> {
    message
        .header_raw(name)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// Fallback sender extraction from the raw From header: first a bare
/// address match, then the raw header text as-is.
fn extract_bare_address(message: &mail_parser::Message) -> Option<String> {
    let raw = raw_header(message, "From")?;
    Some(bare_address(&raw).unwrap_or(raw))
}

/// First `local-part@domain` match in a raw header value.
fn bare_address(raw: &str) -> Option<String> {
    ADDRESS_RE.find(raw).map(|found| found.as_str().to_string())
}
