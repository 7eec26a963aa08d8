//! Cache-directory file pipeline backing PTFI/GHDL (spec.md §4.5, §6).
//!
//! Grounded on `savemanager.rs`'s atomic-write-via-tempfile pattern: an
//! uploaded file is written to a `NamedTempFile` in the cache directory and
//! persisted over the final name only once it's fully received, so a
//! disconnect mid-PTFI never leaves a half-written file at the real path.

use tempfile::NamedTempFile;
use tokio::io::{AsyncRead, AsyncReadExt};

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

pub struct FileHandler {
    cache_dir: PathBuf,
}

impl FileHandler {
    pub fn new<P: AsRef<Path>>(cache_dir: P) -> Result<FileHandler> {
        let cache_dir = cache_dir.as_ref().to_path_buf();
        if !cache_dir.is_dir() {
            return Err(Error::InvalidCacheDirectory(cache_dir));
        }
        Ok(FileHandler { cache_dir })
    }

    /// Cache keys are bare filenames; reject anything that could escape the
    /// cache directory.
    fn validate_filename(filename: &str) -> Result<()> {
        if filename.is_empty()
            || filename.contains('/')
            || filename.contains('\\')
            || filename == "."
            || filename == ".."
        {
            return Err(Error::InvalidFilename(filename.to_string()));
        }
        Ok(())
    }

    pub fn path_for(&self, filename: &str) -> Result<PathBuf> {
        Self::validate_filename(filename)?;
        Ok(self.cache_dir.join(filename))
    }

    pub fn exists(&self, filename: &str) -> bool {
        match self.path_for(filename) {
            Ok(path) => path.is_file(),
            Err(_) => false,
        }
    }

    pub fn read(&self, filename: &str) -> Option<Vec<u8>> {
        let path = self.path_for(filename).ok()?;
        std::fs::read(path).ok()
    }

    /// Reads exactly `size` bytes from `reader` (the PTFI payload, read
    /// synchronously relative to the main loop per spec.md §5) and
    /// atomically persists them at `filename` in the cache directory. A
    /// reader error or early EOF leaves no trace at the final path — the
    /// temp file is simply dropped.
    pub async fn receive_file<R: AsyncRead + Unpin>(
        &self,
        filename: &str,
        size: u64,
        reader: &mut R,
    ) -> Result<()> {
        let path = self.path_for(filename)?;

        let mut tempfile = NamedTempFile::new_in(&self.cache_dir)?;
        let mut remaining = size;
        let mut buf = [0u8; 8192];

        while remaining > 0 {
            let to_read = remaining.min(buf.len() as u64) as usize;
            let n = reader.read(&mut buf[..to_read]).await?;
            if n == 0 {
                return Err(Error::ClientDisconnected);
            }
            std::io::Write::write_all(&mut tempfile, &buf[..n])?;
            remaining -= n as u64;
        }

        tempfile.persist(&path).map_err(|e| Error::Io(e.error))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn receive_file_writes_exact_bytes() {
        let dir = tempdir().unwrap();
        let handler = FileHandler::new(dir.path()).unwrap();

        let payload = b"the quick brown fox".to_vec();
        let mut cursor = std::io::Cursor::new(payload.clone());
        handler.receive_file("ding.wav", payload.len() as u64, &mut cursor).await.unwrap();

        assert_eq!(handler.read("ding.wav").unwrap(), payload);
        assert!(handler.exists("ding.wav"));
    }

    #[tokio::test]
    async fn disconnect_mid_transfer_leaves_no_file() {
        let dir = tempdir().unwrap();
        let handler = FileHandler::new(dir.path()).unwrap();

        let mut cursor = std::io::Cursor::new(b"short".to_vec());
        let result = handler.receive_file("partial.wav", 100, &mut cursor).await;

        assert!(result.is_err());
        assert!(!handler.exists("partial.wav"));
    }

    #[test]
    fn filenames_with_path_separators_are_rejected() {
        let dir = tempdir().unwrap();
        let handler = FileHandler::new(dir.path()).unwrap();
        assert!(handler.path_for("../escape").is_err());
        assert!(handler.path_for("sub/dir").is_err());
    }

    #[test]
    fn nonexistent_cache_dir_is_rejected_at_construction() {
        let missing = std::env::temp_dir().join("oas-nonexistent-cache-dir-xyz");
        assert!(FileHandler::new(&missing).is_err());
    }
}
