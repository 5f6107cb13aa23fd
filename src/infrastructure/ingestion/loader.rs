//! Corpus loading from a directory tree

use std::path::{Path, PathBuf};

use tracing::{debug, info};
use walkdir::WalkDir;

use crate::domain::DomainError;
use crate::domain::ingestion::Document;

/// File extensions read as documents
pub const SUPPORTED_EXTENSIONS: &[&str] = &["txt", "md", "markdown", "pdf"];

/// Separates the pages of a PDF in the document text; the chunker numbers
/// pages by counting it
const PAGE_SEPARATOR: &str = "\u{c}";

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
}

/// Whether a file is loaded as a document, judged by its extension
pub fn is_supported(path: &Path) -> bool {
    extension(path).is_some_and(|ext| SUPPORTED_EXTENSIONS.contains(&ext.as_str()))
}

/// Load one file; its source identifier is the given path as written
pub async fn load_file(path: &Path) -> Result<Document, DomainError> {
    if !is_supported(path) {
        return Err(DomainError::invalid_config(format!(
            "unsupported file type: {} (expected one of {})",
            path.display(),
            SUPPORTED_EXTENSIONS.join(", ")
        )));
    }

    let text = read_text(path).await?;
    Ok(Document::new(path.to_string_lossy(), text))
}

/// Load every supported file under `root`, sorted by path.
///
/// Source identifiers are paths relative to `root` with `/` separators, so
/// the same corpus keeps its document ids wherever it is mounted.
pub async fn load_directory(root: &Path) -> Result<Vec<Document>, DomainError> {
    if !tokio::fs::metadata(root).await.is_ok_and(|m| m.is_dir()) {
        return Err(DomainError::io(format!(
            "document directory does not exist: {}",
            root.display()
        )));
    }

    let mut documents = Vec::new();

    for (path, relative) in corpus_files(root.to_path_buf()).await? {
        let text = read_text(&path).await?;
        debug!(source = %relative, chars = text.chars().count(), "Loaded document");
        documents.push(Document::new(relative, text));
    }

    info!(root = %root.display(), documents = documents.len(), "Corpus loaded");
    Ok(documents)
}

/// Supported files under `root` with their `/`-joined relative paths
async fn corpus_files(root: PathBuf) -> Result<Vec<(PathBuf, String)>, DomainError> {
    tokio::task::spawn_blocking(move || {
        let mut files = Vec::new();

        for entry in WalkDir::new(&root).sort_by_file_name() {
            let entry = entry.map_err(|e| DomainError::io(e.to_string()))?;
            if !entry.file_type().is_file() || !is_supported(entry.path()) {
                continue;
            }

            let path = entry.into_path();
            let relative = path
                .strip_prefix(&root)
                .unwrap_or(&path)
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");

            files.push((path, relative));
        }

        Ok::<_, DomainError>(files)
    })
    .await
    .map_err(|e| DomainError::internal(format!("directory walk failed: {e}")))?
}

async fn read_text(path: &Path) -> Result<String, DomainError> {
    if extension(path).as_deref() == Some("pdf") {
        return extract_pdf(path).await;
    }

    tokio::fs::read_to_string(path)
        .await
        .map_err(|e| DomainError::io(format!("failed to read {}: {}", path.display(), e)))
}

/// Page texts of a PDF joined by form feeds.
///
/// Extraction runs on the blocking pool; a panic inside the PDF parser is
/// reported as an I/O error for that file.
async fn extract_pdf(path: &Path) -> Result<String, DomainError> {
    let owned = path.to_path_buf();
    let pages = tokio::task::spawn_blocking(move || pdf_extract::extract_text_by_pages(&owned))
        .await
        .map_err(|e| DomainError::io(format!("failed to parse {}: {}", path.display(), e)))?
        .map_err(|e| DomainError::io(format!("failed to parse {}: {}", path.display(), e)))?;

    debug!(path = %path.display(), pages = pages.len(), "Extracted PDF text");
    Ok(join_pages(pages))
}

fn join_pages(pages: Vec<String>) -> String {
    pages
        .iter()
        .map(|page| page.trim_end_matches(PAGE_SEPARATOR))
        .collect::<Vec<_>>()
        .join(PAGE_SEPARATOR)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ingestion::{ChunkingConfig, ChunkingStrategy};
    use crate::infrastructure::ingestion::RecursiveChunker;
    use std::fs;

    #[tokio::test]
    async fn test_loads_supported_files_recursively() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("policies")).unwrap();
        fs::write(dir.path().join("policies/refunds.md"), "# Refunds\n\n30 days").unwrap();
        fs::write(dir.path().join("shipping.TXT"), "5 business days").unwrap();
        fs::write(dir.path().join("notes.markdown"), "Notes").unwrap();
        fs::write(dir.path().join("image.png"), [0u8, 1, 2]).unwrap();

        let documents = load_directory(dir.path()).await.unwrap();
        let sources: Vec<&str> = documents
            .iter()
            .map(|d| d.source_identifier.as_str())
            .collect();

        assert_eq!(sources, vec!["notes.markdown", "policies/refunds.md", "shipping.TXT"]);
        assert_eq!(documents[1].source_name(), "refunds.md");
        assert_eq!(documents[2].raw_text, "5 business days");
    }

    #[tokio::test]
    async fn test_document_ids_do_not_depend_on_mount_point() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        for dir in [&first, &second] {
            fs::write(dir.path().join("faq.md"), "Same text").unwrap();
        }

        let a = load_directory(first.path()).await.unwrap();
        let b = load_directory(second.path()).await.unwrap();

        assert_eq!(a[0].id, b[0].id);
    }

    #[tokio::test]
    async fn test_missing_directory_and_unsupported_file() {
        assert!(matches!(
            load_directory(Path::new("/definitely/not/here")).await,
            Err(DomainError::Io { .. })
        ));
        assert!(matches!(
            load_file(Path::new("slides.pptx")).await,
            Err(DomainError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn test_pdf_is_supported() {
        assert!(is_supported(Path::new("manual.pdf")));
        assert!(is_supported(Path::new("MANUAL.PDF")));
        assert!(!is_supported(Path::new("manual.docx")));
    }

    #[tokio::test]
    async fn test_unreadable_pdf_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.pdf");
        fs::write(&path, b"not a valid pdf").unwrap();

        assert!(matches!(load_file(&path).await, Err(DomainError::Io { .. })));
        assert!(matches!(
            load_directory(dir.path()).await,
            Err(DomainError::Io { .. })
        ));
    }

    #[test]
    fn test_pdf_pages_become_chunk_pages() {
        let text = join_pages(vec![
            "Refunds are accepted within 30 days.\n\u{c}".to_string(),
            "Shipping takes five business days.\n".to_string(),
            "Warranty covers two years.".to_string(),
        ]);
        assert_eq!(text.matches(PAGE_SEPARATOR).count(), 2);

        let chunks = RecursiveChunker::new()
            .chunk(&Document::new("manual.pdf", text), &ChunkingConfig::new(40, 0))
            .unwrap();
        let pages: Vec<Option<u32>> = chunks.iter().map(|c| c.metadata.page).collect();

        assert_eq!(pages, vec![Some(1), Some(2), Some(3)]);
    }
}
