//! Tests for per-record failure isolation in the IMAP processing loop.
//!
//! These replicate the skip-and-continue logic the pipeline applies to
//! fetched messages: one undecodable record is dropped, everything else
//! still makes it into the output.

use outlook_export::normalize::{normalize_mime, ExportRow};

/// Helper replicating the pipeline's normalize loop: decode failures are
/// counted and skipped, the run continues.
fn normalize_batch(raw_messages: &[Vec<u8>], folder: &str) -> (Vec<ExportRow>, usize) {
    let mut rows = Vec::new();
    let mut skipped = 0;
    for raw in raw_messages {
        match normalize_mime(raw, folder) {
            Ok(row) => rows.push(row),
            Err(_) => skipped += 1,
        }
    }
    (rows, skipped)
}

fn valid_message(subject: &str) -> Vec<u8> {
    format!(
        "From: sender@example.com\r\n\
         Subject: {}\r\n\
         Date: Mon, 03 Aug 2026 10:00:00 +0000\r\n\
         \r\n\
         body text\r\n",
        subject
    )
    .into_bytes()
}

#[test]
fn one_bad_record_in_a_batch_drops_only_that_record() {
    let batch = vec![
        valid_message("First"),
        Vec::new(), // undecodable: empty blob
        valid_message("Third"),
        valid_message("Fourth"),
    ];

    let (rows, skipped) = normalize_batch(&batch, "inbox");

    assert_eq!(rows.len(), 3);
    assert_eq!(skipped, 1);
    assert_eq!(rows[0].subject, "First");
    assert_eq!(rows[1].subject, "Third");
    assert_eq!(rows[2].subject, "Fourth");
}

#[test]
fn all_good_records_survive() {
    let batch: Vec<_> = (0..5).map(|i| valid_message(&format!("Msg {}", i))).collect();
    let (rows, skipped) = normalize_batch(&batch, "inbox");
    assert_eq!(rows.len(), 5);
    assert_eq!(skipped, 0);
}

#[test]
fn empty_blob_is_a_normalize_error() {
    assert!(normalize_mime(&[], "inbox").is_err());
}
