//! Provider-record normalizers: map raw gateway records into the canonical
//! document shape. One normalizer per source type, all pure.

use common::storage::types::source_connection::SourceType;
use serde_json::Value;

/// A provider record reduced to the canonical document fields, before
/// workspace/connection attribution.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedRecord {
    pub external_id: String,
    pub url: Option<String>,
    pub title: Option<String>,
    pub author_name: Option<String>,
    pub author_email: Option<String>,
    pub content_text: String,
}

pub fn normalize_records(source_type: SourceType, records: &[Value]) -> Vec<NormalizedRecord> {
    match source_type {
        SourceType::Mail => normalize_mail_records(records),
        SourceType::Note => normalize_note_records(records),
        SourceType::Drive => normalize_drive_records(records),
    }
}

/// Mail records: `{id, sender, subject, body, threadId}`. The sender may be
/// `Name <addr>`; HTML bodies are reduced to plain text.
pub fn normalize_mail_records(records: &[Value]) -> Vec<NormalizedRecord> {
    records
        .iter()
        .filter_map(|record| {
            let external_id = non_empty_str(record, "id")?;

            let sender = str_field(record, "sender").unwrap_or_default();
            let (author_name, author_email) = parse_sender(&sender);

            let mut body = str_field(record, "body").unwrap_or_default();
            if body.contains('<') && body.contains('>') {
                body = strip_html(&body);
            }

            let thread_id = str_field(record, "threadId").unwrap_or_default();
            let url = (!thread_id.is_empty())
                .then(|| format!("https://mail.google.com/mail/u/0/#inbox/{thread_id}"));

            let subject = str_field(record, "subject")
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| "(no subject)".to_string());

            Some(NormalizedRecord {
                external_id,
                url,
                title: Some(subject),
                author_name,
                author_email,
                content_text: body,
            })
        })
        .collect()
}

/// Note records: `{id, path, title, type, content}`. Database containers
/// are skipped; pages without fetched content fall back to the title.
pub fn normalize_note_records(records: &[Value]) -> Vec<NormalizedRecord> {
    records
        .iter()
        .filter_map(|record| {
            if str_field(record, "type").as_deref() == Some("database") {
                return None;
            }

            let external_id = non_empty_str(record, "id")?;
            let title = str_field(record, "title")
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| "(untitled)".to_string());
            let content = str_field(record, "content")
                .filter(|c| !c.is_empty())
                .unwrap_or_else(|| title.clone());

            Some(NormalizedRecord {
                external_id,
                url: str_field(record, "path").filter(|p| !p.is_empty()),
                title: Some(title),
                author_name: None,
                author_email: None,
                content_text: content,
            })
        })
        .collect()
}

/// Drive records: `{id, name, webViewLink, content}`.
pub fn normalize_drive_records(records: &[Value]) -> Vec<NormalizedRecord> {
    records
        .iter()
        .filter_map(|record| {
            let external_id = non_empty_str(record, "id")?;
            let title = str_field(record, "name").filter(|n| !n.is_empty());
            let content = str_field(record, "content").unwrap_or_default();

            Some(NormalizedRecord {
                external_id,
                url: str_field(record, "webViewLink").filter(|u| !u.is_empty()),
                title,
                author_name: None,
                author_email: None,
                content_text: content,
            })
        })
        .collect()
}

/// Split `Name <addr>` into name and address; a bare address has no name.
fn parse_sender(sender: &str) -> (Option<String>, Option<String>) {
    let sender = sender.trim();
    if sender.is_empty() {
        return (None, None);
    }

    if let Some((name, rest)) = sender.split_once('<') {
        if let Some(email) = rest.strip_suffix('>') {
            let name = name.trim().trim_matches('"').to_string();
            let name = (!name.is_empty()).then_some(name);
            return (name, Some(email.trim().to_string()));
        }
    }

    (None, Some(sender.to_string()))
}

/// Minimal HTML tag stripping with whitespace collapsing.
fn strip_html(html: &str) -> String {
    let mut text = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => {
                in_tag = false;
                text.push(' ');
            }
            _ if !in_tag => text.push(c),
            _ => {}
        }
    }
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn str_field(record: &Value, field: &str) -> Option<String> {
    record.get(field).and_then(Value::as_str).map(str::to_string)
}

fn non_empty_str(record: &Value, field: &str) -> Option<String> {
    str_field(record, field).filter(|v| !v.is_empty())
}
