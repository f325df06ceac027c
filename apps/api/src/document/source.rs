//! Document source: turns an uploaded file into a `ParsedDocument`.
//!
//! `AppState` carries an `Arc<dyn DocumentSource>`; the orchestrator only ever
//! sees the parsed result.

use std::path::Path;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use super::sections::Sections;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),

    #[error("No text could be extracted from {0}")]
    Empty(String),

    #[error("File is not valid UTF-8: {0}")]
    Encoding(String),

    #[error("PDF extraction failed: {0}")]
    Pdf(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedDocument {
    pub text: String,
    pub sections: Sections,
    pub word_count: usize,
    pub file_name: String,
}

impl ParsedDocument {
    /// Builds a document from already-extracted text. Fails on blank input.
    pub fn from_text(file_name: &str, text: &str) -> Result<Self, ParseError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ParseError::Empty(file_name.to_string()));
        }
        Ok(Self {
            text: text.to_string(),
            sections: Sections::parse(text),
            word_count: text.split_whitespace().count(),
            file_name: file_name.to_string(),
        })
    }
}

#[async_trait]
pub trait DocumentSource: Send + Sync {
    async fn parse(&self, file_name: &str, data: Bytes) -> Result<ParsedDocument, ParseError>;
}

/// Extension-dispatched parser: `.pdf`, `.txt`, `.md`.
pub struct FileDocumentSource;

impl FileDocumentSource {
    pub async fn parse_path(&self, path: &Path) -> Result<ParsedDocument, ParseError> {
        let data = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.parse(&file_name, Bytes::from(data)).await
    }
}

#[async_trait]
impl DocumentSource for FileDocumentSource {
    async fn parse(&self, file_name: &str, data: Bytes) -> Result<ParsedDocument, ParseError> {
        let extension = Path::new(file_name)
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        let text = match extension.as_str() {
            "pdf" => {
                // pdf-extract is synchronous and CPU-bound
                tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&data))
                    .await
                    .map_err(|e| ParseError::Pdf(e.to_string()))?
                    .map_err(|e| ParseError::Pdf(format!("{e:?}")))?
            }
            "txt" | "md" => String::from_utf8(data.to_vec())
                .map_err(|_| ParseError::Encoding(file_name.to_string()))?,
            other => return Err(ParseError::UnsupportedFormat(other.to_string())),
        };

        let document = ParsedDocument::from_text(file_name, &text)?;
        info!(
            "Parsed {} ({} words, {} sections)",
            document.file_name,
            document.word_count,
            document.sections.headers().len()
        );
        Ok(document)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn test_parse_text_file_from_disk() {
        let mut file = tempfile::Builder::new().suffix(".txt").tempfile().unwrap();
        write!(file, "Jane Doe\n\nSUMMARY\nEngineer\n\nSKILLS\nRust, Go").unwrap();

        let document = FileDocumentSource.parse_path(file.path()).await.unwrap();
        assert_eq!(document.word_count, 7);
        assert_eq!(document.sections.headers(), vec!["SUMMARY", "SKILLS"]);
        assert!(document.file_name.ends_with(".txt"));
    }

    #[tokio::test]
    async fn test_parse_markdown_bytes() {
        let document = FileDocumentSource
            .parse("resume.MD", Bytes::from_static(b"## Skills\nRust"))
            .await
            .unwrap();
        assert_eq!(document.sections.get("SKILLS"), Some("Rust"));
    }

    #[tokio::test]
    async fn test_unsupported_extension_is_rejected() {
        let result = FileDocumentSource
            .parse("resume.docx", Bytes::from_static(b"PK\x03\x04"))
            .await;
        assert!(matches!(result, Err(ParseError::UnsupportedFormat(ext)) if ext == "docx"));
    }

    #[tokio::test]
    async fn test_blank_file_is_empty_error() {
        let result = FileDocumentSource
            .parse("blank.txt", Bytes::from_static(b"  \n\t "))
            .await;
        assert!(matches!(result, Err(ParseError::Empty(_))));
    }

    #[tokio::test]
    async fn test_invalid_utf8_is_encoding_error() {
        let result = FileDocumentSource
            .parse("bad.txt", Bytes::from_static(&[0xff, 0xfe, 0xfd]))
            .await;
        assert!(matches!(result, Err(ParseError::Encoding(_))));
    }

    #[tokio::test]
    async fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = FileDocumentSource
            .parse_path(&dir.path().join("absent.txt"))
            .await;
        assert!(matches!(result, Err(ParseError::Io(_))));
    }
}
