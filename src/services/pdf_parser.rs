//! PDF content extraction.

use lopdf::Document;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("failed to load PDF: {0}")]
    Load(#[source] lopdf::Error),
    #[error("failed to extract text: {0}")]
    Text(#[source] lopdf::Error),
    #[error("extraction task aborted: {0}")]
    Aborted(String),
}

/// Page count and text of a parsed document.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PdfContent {
    pub page_count: u32,
    pub text: String,
}

/// Turns PDF bytes into [`PdfContent`].
///
/// Parsing is CPU-bound; callers run it off the async executor.
pub trait PdfParser: Send + Sync {
    fn parse(&self, bytes: &[u8]) -> Result<PdfContent, ExtractionError>;
}

/// [`PdfParser`] backed by `lopdf`.
#[derive(Clone, Copy, Debug, Default)]
pub struct LopdfParser;

impl PdfParser for LopdfParser {
    fn parse(&self, bytes: &[u8]) -> Result<PdfContent, ExtractionError> {
        let document = Document::load_mem(bytes).map_err(ExtractionError::Load)?;
        let page_numbers: Vec<u32> = document.get_pages().keys().copied().collect();
        let text = if page_numbers.is_empty() {
            String::new()
        } else {
            document
                .extract_text(&page_numbers)
                .map_err(ExtractionError::Text)?
        };

        Ok(PdfContent {
            page_count: page_numbers.len() as u32,
            text,
        })
    }
}
