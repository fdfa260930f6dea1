// Documents module
// Turns tabular rows into the text documents that get embedded and indexed


use std::borrow::Cow;
use std::fs;
use std::path::Path;

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{Result, RetrievalError};

/// One source row: field names paired with their values, in column order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RowRecord {
    fields: Vec<(String, String)>,
}

impl RowRecord {
    #[inline]
    pub fn new<I, K, V>(fields: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            fields: fields
                .into_iter()
                .map(|(name, value)| (name.into(), value.into()))
                .collect(),
        }
    }

    #[inline]
    pub fn fields(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    #[inline]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value.as_str())
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// A retrievable unit of text. `id` is the 0-based position of the row the
/// document was built from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: usize,
    pub content: String,
}

/// Project a record into document text: one `field: value` line per field,
/// in the record's own field order.
///
/// The record must have at least one field.
#[inline]
pub fn build_document(id: usize, record: &RowRecord) -> Document {
    debug_assert!(!record.is_empty(), "row record must have at least one field");

    let content = record
        .fields()
        .map(|(name, value)| format!("{name}: {value}"))
        .join("\n");

    Document { id, content }
}

/// Build one document per record, numbering them by input position.
#[inline]
pub fn build_documents(records: &[RowRecord]) -> Vec<Document> {
    records
        .iter()
        .enumerate()
        .map(|(id, record)| build_document(id, record))
        .collect()
}

/// Read a delimited file with a header row into row records.
///
/// Files that are not valid UTF-8 are decoded as Windows-1252, which covers
/// latin-1 exports from spreadsheet tools.
#[inline]
pub fn read_rows<P: AsRef<Path>>(path: P, delimiter: u8) -> Result<Vec<RowRecord>> {
    let path = path.as_ref();
    debug!("Reading rows from {}", path.display());

    let bytes = fs::read(path).map_err(|e| {
        RetrievalError::Ingest(format!("Failed to read {}: {}", path.display(), e))
    })?;

    let text = decode_text(&bytes);
    let rows = parse_rows(&text, delimiter)?;

    info!("Read {} rows from {}", rows.len(), path.display());
    Ok(rows)
}

/// Parse delimited text with a header row. Short rows are padded with empty
/// values and values beyond the header are dropped.
#[inline]
pub fn parse_rows(text: &str, delimiter: u8) -> Result<Vec<RowRecord>> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .from_reader(text.as_bytes());

    let headers = reader
        .headers()
        .map_err(|e| RetrievalError::Ingest(format!("Failed to read header row: {}", e)))?
        .clone();

    if headers.is_empty() {
        return Err(RetrievalError::Ingest("Header row has no fields".to_string()));
    }

    let mut rows = Vec::new();
    for (line, result) in reader.records().enumerate() {
        let record = result.map_err(|e| {
            RetrievalError::Ingest(format!("Failed to read row {}: {}", line + 1, e))
        })?;

        if record.len() > headers.len() {
            warn!(
                "Row {} has {} values but only {} columns; extra values ignored",
                line + 1,
                record.len(),
                headers.len()
            );
        }

        rows.push(RowRecord::new(
            headers
                .iter()
                .enumerate()
                .map(|(i, name)| (name, record.get(i).unwrap_or_default())),
        ));
    }

    Ok(rows)
}

fn decode_text(bytes: &[u8]) -> Cow<'_, str> {
    let text = match std::str::from_utf8(bytes) {
        Ok(text) => Cow::Borrowed(text),
        Err(_) => {
            debug!("Input is not valid UTF-8, decoding as windows-1252");
            let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(bytes);
            decoded
        }
    };

    if let Some(stripped) = text.strip_prefix('\u{feff}') {
        return Cow::Owned(stripped.to_string());
    }
    text
}
