//! Dataset adapter: loads medical QA records from structured files into an
//! in-memory table.
//!
//! Two formats are supported: JSONL (one JSON object per line, the primary
//! interchange format) and CSV with a header row naming the `question`,
//! `answer`, and `source_document` columns. A plain JSON array of records is
//! also accepted. Records are immutable once loaded.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::types::RagError;

/// One question/answer pair together with the source passage it was drawn
/// from. `source_document` holds the passage text itself; it is the unit that
/// gets chunked and indexed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QaRecord {
    pub question: String,
    pub answer: String,
    pub source_document: String,
}

impl QaRecord {
    pub fn new(
        question: impl Into<String>,
        answer: impl Into<String>,
        source_document: impl Into<String>,
    ) -> Self {
        Self {
            question: question.into(),
            answer: answer.into(),
            source_document: source_document.into(),
        }
    }
}

/// In-memory QA dataset table.
#[derive(Clone, Debug, Default)]
pub struct QaDataset {
    records: Vec<QaRecord>,
}

impl QaDataset {
    pub fn from_records(records: Vec<QaRecord>) -> Self {
        Self { records }
    }

    /// Loads a dataset file, dispatching on the file extension
    /// (`.jsonl`/`.ndjson`, `.csv`, or `.json`).
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, RagError> {
        let path = path.as_ref();
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        match extension.as_str() {
            "jsonl" | "ndjson" => Self::load_jsonl(path).await,
            "csv" => Self::load_csv(path).await,
            "json" => Self::load_json(path).await,
            other => Err(RagError::Dataset(format!(
                "unsupported dataset format '{other}' for {}",
                path.display()
            ))),
        }
    }

    /// Loads a JSONL file: one `QaRecord` object per non-empty line.
    pub async fn load_jsonl(path: impl AsRef<Path>) -> Result<Self, RagError> {
        let content = fs::read_to_string(path.as_ref()).await?;
        let mut records = Vec::new();
        for (line_no, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let record: QaRecord = serde_json::from_str(line).map_err(|err| {
                RagError::Dataset(format!("line {}: {err}", line_no + 1))
            })?;
            records.push(record);
        }
        Ok(Self { records })
    }

    /// Loads a JSON array of records.
    pub async fn load_json(path: impl AsRef<Path>) -> Result<Self, RagError> {
        let content = fs::read_to_string(path.as_ref()).await?;
        let records: Vec<QaRecord> = serde_json::from_str(&content)
            .map_err(|err| RagError::Dataset(err.to_string()))?;
        Ok(Self { records })
    }

    /// Loads a CSV file with a header row. Column order is free; the header
    /// must name `question`, `answer`, and `source_document`.
    pub async fn load_csv(path: impl AsRef<Path>) -> Result<Self, RagError> {
        let content = fs::read_to_string(path.as_ref()).await?;
        let rows = parse_csv(&content);
        let mut iter = rows.into_iter();
        let header = iter
            .next()
            .ok_or_else(|| RagError::Dataset("csv file has no header row".into()))?;

        let column = |name: &str| -> Result<usize, RagError> {
            header
                .iter()
                .position(|field| field.trim().eq_ignore_ascii_case(name))
                .ok_or_else(|| RagError::Dataset(format!("csv header is missing column '{name}'")))
        };
        let question_col = column("question")?;
        let answer_col = column("answer")?;
        let source_col = column("source_document")?;

        let mut records = Vec::new();
        for (row_no, row) in iter.enumerate() {
            if row.iter().all(|field| field.trim().is_empty()) {
                continue;
            }
            let width_needed = question_col.max(answer_col).max(source_col) + 1;
            if row.len() < width_needed {
                return Err(RagError::Dataset(format!(
                    "csv row {} has {} fields, expected at least {}",
                    row_no + 2,
                    row.len(),
                    width_needed
                )));
            }
            records.push(QaRecord::new(
                row[question_col].clone(),
                row[answer_col].clone(),
                row[source_col].clone(),
            ));
        }
        Ok(Self { records })
    }

    pub fn records(&self) -> &[QaRecord] {
        &self.records
    }

    pub fn iter(&self) -> std::slice::Iter<'_, QaRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Minimal RFC 4180 reader. Quoted fields may contain commas, doubled quotes,
/// and line breaks. No crate in this stack covers CSV, so the reader lives
/// here; it handles exactly the shape dataset exports use.
fn parse_csv(content: &str) -> Vec<Vec<String>> {
    let mut rows = Vec::new();
    let mut row: Vec<String> = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;

    let mut chars = content.chars().peekable();
    while let Some(ch) = chars.next() {
        if in_quotes {
            match ch {
                '"' => {
                    if chars.peek() == Some(&'"') {
                        chars.next();
                        field.push('"');
                    } else {
                        in_quotes = false;
                    }
                }
                other => field.push(other),
            }
            continue;
        }
        match ch {
            '"' if field.is_empty() => in_quotes = true,
            ',' => {
                row.push(std::mem::take(&mut field));
            }
            '\r' => {}
            '\n' => {
                row.push(std::mem::take(&mut field));
                rows.push(std::mem::take(&mut row));
            }
            other => field.push(other),
        }
    }
    if !field.is_empty() || !row.is_empty() {
        row.push(field);
        rows.push(row);
    }
    rows
}
