//! Zip extraction on the blocking pool.
//!
//! Entries whose names escape the destination (`../`, absolute paths) are
//! rejected rather than skipped.

use crate::domain::AgentError;
use crate::ports::ArchiveExtractor;
use async_trait::async_trait;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use zip::ZipArchive;

/// [`ArchiveExtractor`] over the `zip` crate.
#[derive(Clone, Copy, Debug, Default)]
pub struct ZipExtractor;

impl ZipExtractor {
    /// New extractor.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ArchiveExtractor for ZipExtractor {
    async fn extract(&self, archive: &Path, destination: &Path) -> Result<usize, AgentError> {
        let archive = archive.to_path_buf();
        let destination = destination.to_path_buf();

        tokio::task::spawn_blocking(move || extract_blocking(&archive, &destination))
            .await
            .map_err(|e| AgentError::Internal(e.to_string()))?
    }
}

fn extract_blocking(archive: &Path, destination: &Path) -> Result<usize, AgentError> {
    let file = File::open(archive).map_err(|e| AgentError::filesystem(archive, e))?;
    let mut zip = ZipArchive::new(file).map_err(|e| AgentError::ExtractionFailed(e.to_string()))?;

    let mut written = 0;
    for index in 0..zip.len() {
        let mut entry = zip
            .by_index(index)
            .map_err(|e| AgentError::ExtractionFailed(e.to_string()))?;

        let relative: PathBuf = entry.enclosed_name().ok_or_else(|| {
            AgentError::ExtractionFailed(format!("entry '{}' escapes the destination", entry.name()))
        })?;
        let out_path = destination.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&out_path).map_err(|e| AgentError::filesystem(&out_path, e))?;
            continue;
        }

        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent).map_err(|e| AgentError::filesystem(parent, e))?;
        }
        let mut out = File::create(&out_path).map_err(|e| AgentError::filesystem(&out_path, e))?;
        io::copy(&mut entry, &mut out).map_err(|e| AgentError::ExtractionFailed(e.to_string()))?;
        written += 1;
    }

    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::zip_bytes;
    use std::io::Write;
    use tempfile::TempDir;
    use zip::write::SimpleFileOptions;

    #[tokio::test]
    async fn test_extracts_nested_entries() {
        let tmp = TempDir::new().unwrap();
        let archive = tmp.path().join("a.zip");
        std::fs::write(&archive, zip_bytes(&[("a.txt", "a"), ("dir/b.txt", "b")])).unwrap();

        let out = tmp.path().join("out");
        let written = ZipExtractor::new().extract(&archive, &out).await.unwrap();

        assert_eq!(written, 2);
        assert_eq!(std::fs::read_to_string(out.join("dir/b.txt")).unwrap(), "b");
    }

    #[tokio::test]
    async fn test_rejects_escaping_entry() {
        let tmp = TempDir::new().unwrap();
        let archive = tmp.path().join("evil.zip");

        let mut buffer = std::io::Cursor::new(Vec::new());
        {
            let mut writer = zip::ZipWriter::new(&mut buffer);
            writer
                .start_file("../escaped.txt", SimpleFileOptions::default())
                .unwrap();
            writer.write_all(b"x").unwrap();
            writer.finish().unwrap();
        }
        std::fs::write(&archive, buffer.into_inner()).unwrap();

        let out = tmp.path().join("out");
        let err = ZipExtractor::new().extract(&archive, &out).await.unwrap_err();

        assert!(matches!(err, AgentError::ExtractionFailed(_)));
        assert!(!tmp.path().join("escaped.txt").exists());
    }

    #[tokio::test]
    async fn test_not_a_zip() {
        let tmp = TempDir::new().unwrap();
        let archive = tmp.path().join("junk.zip");
        std::fs::write(&archive, b"junk").unwrap();

        let err = ZipExtractor::new()
            .extract(&archive, tmp.path())
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::ExtractionFailed(_)));
    }
}
