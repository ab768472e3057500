//! Document readers.
//!
//! `DirectoryReader` turns files on disk into [`Document`]s: plain text and
//! markdown as-is, HTML with markup stripped, PDFs as one document per page.

pub mod html;
pub mod pdf;

use crate::error::{RagError, Result};
use crate::schema::Document;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// File metadata keys hidden from both the LLM and the embedder.
pub const FILE_METADATA_EXCLUDES: &[&str] = &[
    "file_name",
    "file_type",
    "file_size",
    "creation_date",
    "last_modified_date",
];

const SUPPORTED: &[&str] = &["txt", "md", "html", "htm", "pdf"];

/// Reads a directory tree or an explicit list of files.
#[derive(Debug, Clone, Default)]
pub struct DirectoryReader {
    input_dir: Option<PathBuf>,
    input_files: Vec<PathBuf>,
    required_exts: Option<Vec<String>>,
    recursive: bool,
    num_files_limit: Option<usize>,
}

impl DirectoryReader {
    /// Read every supported file under `dir`.
    pub fn from_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            input_dir: Some(dir.into()),
            recursive: true,
            ..Default::default()
        }
    }

    /// Read exactly these files.
    pub fn from_files(files: Vec<PathBuf>) -> Self {
        Self {
            input_files: files,
            ..Default::default()
        }
    }

    /// Only read files with these extensions (without the dot).
    pub fn with_required_exts(mut self, exts: &[&str]) -> Self {
        self.required_exts = Some(exts.iter().map(|e| e.to_lowercase()).collect());
        self
    }

    pub fn with_recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.num_files_limit = Some(limit);
        self
    }

    fn accepts(&self, path: &Path) -> bool {
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            return false;
        };
        let ext = ext.to_lowercase();
        match &self.required_exts {
            Some(required) => required.contains(&ext),
            None => SUPPORTED.contains(&ext.as_str()),
        }
    }

    /// The files this reader will load, sorted by path.
    pub fn list_files(&self) -> Result<Vec<PathBuf>> {
        let mut files = if let Some(dir) = &self.input_dir {
            if !dir.is_dir() {
                return Err(RagError::reader(format!(
                    "input directory {} does not exist",
                    dir.display()
                )));
            }
            let max_depth = if self.recursive { usize::MAX } else { 1 };
            walkdir::WalkDir::new(dir)
                .max_depth(max_depth)
                .sort_by_file_name()
                .into_iter()
                .flatten()
                .filter(|e| e.file_type().is_file())
                .map(|e| e.into_path())
                .filter(|p| !is_hidden(p) && self.accepts(p))
                .collect::<Vec<_>>()
        } else {
            for file in &self.input_files {
                if !file.is_file() {
                    return Err(RagError::reader(format!(
                        "input file {} does not exist",
                        file.display()
                    )));
                }
            }
            self.input_files.clone()
        };
        if let Some(limit) = self.num_files_limit {
            files.truncate(limit);
        }
        Ok(files)
    }

    /// Load every file. Files that fail to load are skipped with a warning.
    pub async fn load_data(&self) -> Result<Vec<Document>> {
        let mut documents = Vec::new();
        for path in self.list_files()? {
            match load_file(&path).await {
                Ok(mut docs) => {
                    debug!(path = %path.display(), documents = docs.len(), "Loaded file");
                    documents.append(&mut docs);
                }
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping file"),
            }
        }
        Ok(documents)
    }
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with('.'))
}

fn file_type(ext: &str) -> &'static str {
    match ext {
        "pdf" => "application/pdf",
        "html" | "htm" => "text/html",
        "md" => "text/markdown",
        _ => "text/plain",
    }
}

fn file_metadata(path: &Path, ext: &str) -> Document {
    let mut doc = Document::new("")
        .with_metadata("file_path", path.display().to_string())
        .with_metadata(
            "file_name",
            path.file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default(),
        )
        .with_metadata("file_type", file_type(ext));
    if let Ok(meta) = std::fs::metadata(path) {
        doc.metadata
            .insert("file_size".into(), meta.len().to_string());
        if let Ok(modified) = meta.modified() {
            let modified: chrono::DateTime<chrono::Utc> = modified.into();
            doc.metadata.insert(
                "last_modified_date".into(),
                modified.format("%Y-%m-%d").to_string(),
            );
        }
    }
    let excluded: Vec<String> = FILE_METADATA_EXCLUDES.iter().map(|k| k.to_string()).collect();
    doc.excluded_llm_metadata_keys = excluded.clone();
    doc.excluded_embed_metadata_keys = excluded;
    doc
}

/// Load one file into one or more documents.
pub async fn load_file(path: &Path) -> Result<Vec<Document>> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();
    let template = file_metadata(path, &ext);

    match ext.as_str() {
        "pdf" => {
            let owned = path.to_path_buf();
            let pages = tokio::task::spawn_blocking(move || pdf::extract_pages(&owned))
                .await
                .map_err(|e| RagError::reader(format!("PDF task failed: {}", e)))??;
            Ok(pages
                .into_iter()
                .enumerate()
                .map(|(i, text)| {
                    let mut doc = template.clone();
                    doc.id = uuid::Uuid::new_v4().to_string();
                    doc.text = text;
                    doc.metadata
                        .insert("page_label".into(), (i + 1).to_string());
                    doc
                })
                .collect())
        }
        "html" | "htm" => {
            let elements = html::load_elements(path).await?;
            let mut doc = template;
            doc.text = elements.join("\n\n");
            Ok(vec![doc])
        }
        _ => {
            let bytes = tokio::fs::read(path).await?;
            let mut doc = template;
            doc.text = String::from_utf8_lossy(&bytes).into_owned();
            Ok(vec![doc])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &Path, rel: &str, body: &str) -> PathBuf {
        let path = dir.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, body).unwrap();
        path
    }

    #[tokio::test]
    async fn test_directory_reader_recursive_sorted() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "b.txt", "second");
        write(dir.path(), "a.md", "# first");
        write(dir.path(), "nested/c.html", "<p>third</p>");
        write(dir.path(), "skip.bin", "binary");
        write(dir.path(), ".hidden.txt", "hidden");

        let docs = DirectoryReader::from_dir(dir.path()).load_data().await.unwrap();
        let texts: Vec<&str> = docs.iter().map(|d| d.text.as_str()).collect();
        assert_eq!(texts, vec!["# first", "second", "third"]);
        assert_eq!(docs[2].metadata["file_name"], "c.html");
        assert_eq!(docs[2].metadata["file_type"], "text/html");
        assert!(docs[0].metadata.contains_key("file_size"));
        assert!(docs[0]
            .excluded_llm_metadata_keys
            .contains(&"file_name".to_string()));
    }

    #[tokio::test]
    async fn test_non_recursive_and_required_exts() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "a.txt", "top");
        write(dir.path(), "b.md", "md");
        write(dir.path(), "nested/c.txt", "deep");

        let docs = DirectoryReader::from_dir(dir.path())
            .with_recursive(false)
            .with_required_exts(&["txt"])
            .load_data()
            .await
            .unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].text, "top");
    }

    #[tokio::test]
    async fn test_limit() {
        let dir = TempDir::new().unwrap();
        for i in 0..5 {
            write(dir.path(), &format!("{i}.txt"), "x");
        }
        let files = DirectoryReader::from_dir(dir.path())
            .with_limit(3)
            .list_files()
            .unwrap();
        assert_eq!(files.len(), 3);
    }

    #[test]
    fn test_missing_dir_is_error() {
        let err = DirectoryReader::from_dir("/definitely/not/here")
            .list_files()
            .unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }

    #[tokio::test]
    async fn test_pdf_loads_one_document_per_page() {
        let pdf = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/four_pages.pdf");
        let docs = load_file(&pdf).await.unwrap();
        let labels: Vec<&str> = docs.iter().map(|d| d.metadata["page_label"].as_str()).collect();
        assert_eq!(labels, vec!["1", "2", "3", "4"]);
        assert!(docs[1].text.contains("Bravo"));
        assert!(!docs[1].text.contains("Alpha"));
        assert_eq!(docs[2].metadata["file_name"], "four_pages.pdf");
        assert_eq!(docs[2].metadata["file_type"], "application/pdf");
        assert_ne!(docs[0].id, docs[1].id);
    }

    #[tokio::test]
    async fn test_explicit_files() {
        let dir = TempDir::new().unwrap();
        let a = write(dir.path(), "essay.txt", "What I worked on");
        let docs = DirectoryReader::from_files(vec![a]).load_data().await.unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].metadata["file_name"], "essay.txt");

        let missing = DirectoryReader::from_files(vec![dir.path().join("nope.txt")])
            .load_data()
            .await;
        assert!(missing.is_err());
    }
}
