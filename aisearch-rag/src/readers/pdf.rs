//! PDF page extraction.

use crate::error::{RagError, Result};
use std::path::Path;

/// Text of every page of a PDF, in page order. Blank pages stay in place so
/// page numbers line up with the source.
pub fn extract_pages(path: &Path) -> Result<Vec<String>> {
    let pages = pdf_extract::extract_text_by_pages(path)
        .map_err(|e| RagError::reader(format!("{}: {}", path.display(), e)))?;
    Ok(pages.into_iter().map(|p| p.trim().to_string()).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn fixture() -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/four_pages.pdf")
    }

    #[test]
    fn test_extract_pages_one_entry_per_page() {
        let pages = extract_pages(&fixture()).unwrap();
        assert_eq!(pages.len(), 4);
        assert!(pages[0].contains("Alpha"), "page 1: {:?}", pages[0]);
        assert!(pages[3].contains("Delta"), "page 4: {:?}", pages[3]);
        assert!(!pages[0].contains("Bravo"));
    }

    #[test]
    fn test_missing_pdf_is_reader_error() {
        let err = extract_pages(Path::new("/nonexistent/10k.pdf")).unwrap_err();
        assert!(matches!(err, RagError::Reader(_)));
    }
}
