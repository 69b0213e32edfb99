//! Export of the whole collection as JSON or a markdown digest.

use std::str::FromStr;

use time::OffsetDateTime;
use time::format_description::FormatItem;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;

use crate::domain::bookmarks::BookmarkRecord;
use crate::domain::error::DomainError;

const EXPORT_DATE_FORMAT: &[FormatItem<'_>] =
    format_description!("[month repr:long] [day padding:none], [year]");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Markdown,
}

impl ExportFormat {
    pub fn content_type(&self) -> &'static str {
        match self {
            ExportFormat::Json => "application/json",
            ExportFormat::Markdown => "text/markdown; charset=utf-8",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = DomainError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "json" => Ok(ExportFormat::Json),
            "markdown" => Ok(ExportFormat::Markdown),
            other => Err(DomainError::validation(format!(
                "`{other}` is not an export format (expected `json` or `markdown`)"
            ))),
        }
    }
}

/// Render the collection as a markdown digest, newest first, one section per
/// tweet with its captured text quoted and tags and notes underneath.
pub fn render_markdown(records: &[BookmarkRecord], exported_at: OffsetDateTime) -> String {
    let stamp = exported_at
        .format(&Rfc3339)
        .unwrap_or_else(|_| exported_at.to_string());
    let noun = if records.len() == 1 { "tweet" } else { "tweets" };

    let mut doc = String::new();
    doc.push_str("# Tweet bookmarks\n\n");
    doc.push_str(&format!("{} {noun}, exported {stamp}.\n", records.len()));

    for record in records {
        doc.push('\n');
        doc.push_str(&format!(
            "## [{}]({}) ({})\n",
            heading_label(record),
            record.url,
            human_date(record.saved_at)
        ));

        if let Some(text) = record.metadata.as_ref().and_then(|meta| meta.text.as_deref()) {
            doc.push('\n');
            for line in text.lines() {
                doc.push_str(&format!("> {line}\n"));
            }
        }
        if !record.tags.is_empty() {
            let tags: Vec<String> = record.tags.iter().map(|tag| format!("`{tag}`")).collect();
            doc.push('\n');
            doc.push_str(&format!("Tags: {}\n", tags.join(" ")));
        }
        if !record.notes.is_empty() {
            doc.push('\n');
            doc.push_str(&format!("Notes: {}\n", record.notes));
        }
    }
    doc
}

fn heading_label(record: &BookmarkRecord) -> String {
    match record
        .metadata
        .as_ref()
        .and_then(|meta| meta.author_name.as_deref())
    {
        Some(name) => format!("{name} (@{})", record.author_username),
        None => format!("@{}", record.author_username),
    }
}

fn human_date(when: OffsetDateTime) -> String {
    when.date()
        .format(EXPORT_DATE_FORMAT)
        .unwrap_or_else(|_| when.date().to_string())
}
