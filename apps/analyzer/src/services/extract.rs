use async_trait::async_trait;
use tracing::debug;

use crate::services::{ServiceError, TextExtractor};

/// Extracts text from single-page PDF resumes with `pdf-extract`.
///
/// Parsing is CPU-bound and runs on the blocking pool.
#[derive(Debug, Clone, Default)]
pub struct PdfTextExtractor;

#[async_trait]
impl TextExtractor for PdfTextExtractor {
    async fn extract(&self, document: &[u8]) -> Result<String, ServiceError> {
        check_document(document)?;

        let bytes = document.to_vec();
        let text = tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&bytes))
            .await
            .map_err(|e| ServiceError::Unreadable(format!("extraction task failed: {e}")))?
            .map_err(|e| ServiceError::Unreadable(format!("PDF parsing failed: {e}")))?;

        if text.trim().is_empty() {
            return Err(ServiceError::Unreadable(
                "no text layer found (scanned image?)".to_string(),
            ));
        }

        debug!("Extracted {} characters of resume text", text.len());
        Ok(text)
    }
}

/// Rejects input the pipeline cannot handle before handing it to the parser.
fn check_document(document: &[u8]) -> Result<(), ServiceError> {
    if document.is_empty() {
        return Err(ServiceError::Unreadable("document is empty".to_string()));
    }
    if !document.starts_with(b"%PDF") {
        return Err(ServiceError::Unreadable("not a PDF document".to_string()));
    }
    if find(document, b"/Encrypt").is_some() {
        return Err(ServiceError::Unreadable("document is encrypted".to_string()));
    }
    let pages = count_pages(document);
    if pages > 1 {
        return Err(ServiceError::Unreadable(format!(
            "document has {pages} pages; only single-page resumes are supported"
        )));
    }
    Ok(())
}

/// Counts `/Type /Page` dictionaries (not `/Pages`). Returns 0 when page
/// objects live in compressed object streams; callers treat that as unknown.
fn count_pages(document: &[u8]) -> usize {
    let mut count = 0;
    for marker in [&b"/Type /Page"[..], &b"/Type/Page"[..]] {
        let mut rest = document;
        while let Some(idx) = find(rest, marker) {
            let after = idx + marker.len();
            if rest.get(after) != Some(&b's') {
                count += 1;
            }
            rest = &rest[after..];
        }
    }
    count
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
