//! Session Export
//!
//! Serializes a session's transcript and debug snapshots for download from
//! the admin surface. Two shapes of the same data: JSON Lines keeps records
//! whole (one JSON object per line), CSV flattens them to rows for
//! spreadsheet triage. Format choice never alters which records appear.

use serde::Serialize;

use crate::debug_recorder::{ConversationDebugSnapshot, ExchangeOutcome};
use crate::events::SessionId;
use crate::transcript::TranscriptItem;

/// Download format for a session export
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExportFormat {
    /// One JSON object per line
    Jsonl,
    /// Comma-separated rows with a header
    Csv,
}

impl std::str::FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "jsonl" => Ok(Self::Jsonl),
            "csv" => Ok(Self::Csv),
            other => Err(format!("unknown export format: {other}")),
        }
    }
}

impl ExportFormat {
    /// MIME type for download responses
    #[must_use]
    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Jsonl => "application/jsonl",
            Self::Csv => "text/csv",
        }
    }
}

/// All exportable records of one session
#[derive(Clone, Debug)]
pub struct SessionExport {
    /// Session being exported
    pub session_id: SessionId,
    /// Transcript in sequence order
    pub items: Vec<TranscriptItem>,
    /// Debug snapshots retained for the session, oldest first
    pub snapshots: Vec<ConversationDebugSnapshot>,
}

#[derive(Serialize)]
#[serde(tag = "record", rename_all = "snake_case")]
enum ExportRecord<'a> {
    Item(&'a TranscriptItem),
    Snapshot(&'a ConversationDebugSnapshot),
}

impl SessionExport {
    /// Render in the requested format
    ///
    /// # Errors
    ///
    /// Returns a [`serde_json::Error`] if a record cannot be serialized.
    pub fn render(&self, format: ExportFormat) -> Result<String, serde_json::Error> {
        match format {
            ExportFormat::Jsonl => self.to_jsonl(),
            ExportFormat::Csv => Ok(self.to_csv()),
        }
    }

    /// One tagged JSON object per line: items first, then snapshots
    ///
    /// # Errors
    ///
    /// Returns a [`serde_json::Error`] if a record cannot be serialized.
    pub fn to_jsonl(&self) -> Result<String, serde_json::Error> {
        let mut out = String::new();
        for item in &self.items {
            out.push_str(&serde_json::to_string(&ExportRecord::Item(item))?);
            out.push('\n');
        }
        for snapshot in &self.snapshots {
            out.push_str(&serde_json::to_string(&ExportRecord::Snapshot(snapshot))?);
            out.push('\n');
        }
        Ok(out)
    }

    /// Flattened rows with a header line
    ///
    /// Transcript rows carry their sequence number; snapshot rows leave it
    /// empty. Multi-line content stays inside its quoted field.
    #[must_use]
    pub fn to_csv(&self) -> String {
        let mut out = String::from("record,seq,timestamp,kind,provider,interrupted,content\n");

        for item in &self.items {
            let row = [
                "item".to_string(),
                item.seq.to_string(),
                item.timestamp.to_rfc3339(),
                item.kind.as_str().to_string(),
                item.provider.map(|p| p.as_str().to_string()).unwrap_or_default(),
                item.metadata.interrupted.to_string(),
                item.content.clone(),
            ];
            push_row(&mut out, &row);
        }

        for snapshot in &self.snapshots {
            let (kind, content) = match &snapshot.outcome {
                ExchangeOutcome::Response(text) => ("snapshot_response", text.clone()),
                ExchangeOutcome::Error(message) => ("snapshot_error", message.clone()),
            };
            let row = [
                "snapshot".to_string(),
                String::new(),
                snapshot.timestamp.to_rfc3339(),
                kind.to_string(),
                String::new(),
                String::new(),
                content,
            ];
            push_row(&mut out, &row);
        }

        out
    }
}

fn push_row(out: &mut String, fields: &[String]) {
    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(&csv_field(field));
    }
    out.push('\n');
}

/// Quote a field when it contains a delimiter, quote, or newline
fn csv_field(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ProviderKind;
    use crate::transcript::{ItemDraft, ItemKind, TranscriptStore};

    fn export_with(content: &str) -> SessionExport {
        let store = TranscriptStore::new();
        store.append(
            ItemDraft::new(ItemKind::UserSpeech, content).from_provider(ProviderKind::Mock),
        );
        let session_id = SessionId::new();
        SessionExport {
            session_id: session_id.clone(),
            items: store.read_all(),
            snapshots: vec![ConversationDebugSnapshot::now(
                session_id,
                content,
                "prompt",
                ExchangeOutcome::Response("done".into()),
            )],
        }
    }

    #[test]
    fn test_jsonl_one_record_per_line() {
        let export = export_with("hello");
        let jsonl = export.to_jsonl().unwrap();
        let lines: Vec<&str> = jsonl.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["record"], "item");
        assert_eq!(first["content"], "hello");
        let second: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second["record"], "snapshot");
    }

    #[test]
    fn test_csv_quotes_embedded_delimiters() {
        let export = export_with("hello, \"world\"\nsecond line");
        let csv = export.to_csv();
        assert!(csv.starts_with("record,seq,timestamp,"));
        assert!(csv.contains("\"hello, \"\"world\"\"\nsecond line\""));
    }

    #[test]
    fn test_format_parse_and_content_type() {
        assert_eq!("jsonl".parse::<ExportFormat>().unwrap(), ExportFormat::Jsonl);
        assert_eq!("CSV".parse::<ExportFormat>().unwrap(), ExportFormat::Csv);
        assert!("xml".parse::<ExportFormat>().is_err());
        assert_eq!(ExportFormat::Csv.content_type(), "text/csv");
    }
}
