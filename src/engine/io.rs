// src/engine/io.rs
//
// Asset sources (where template, mask and artwork bytes come from) and
// render sinks (where the final mockup goes).

use crate::engine::buffer::ImageBuffer;
use crate::error::{MockupError, Result};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Opaque-identifier lookup for raw image bytes.
pub trait AssetSource: Send + Sync {
    fn fetch_bytes(&self, identifier: &str) -> Result<Vec<u8>>;
}

/// Receives the finished mockup.
pub trait RenderSink: Send + Sync {
    fn present(&self, buffer: &ImageBuffer) -> Result<()>;
}

/// Assets resolved as paths relative to a root directory.
#[derive(Clone, Debug)]
pub struct FileAssetSource {
    root: PathBuf,
}

impl FileAssetSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, identifier: &str) -> Result<PathBuf> {
        let relative = Path::new(identifier);
        // Identifiers stay inside the root.
        if relative.is_absolute()
            || relative
                .components()
                .any(|c| matches!(c, std::path::Component::ParentDir))
        {
            return Err(MockupError::invalid_argument(
                "asset identifier",
                identifier.to_string(),
                "must be a relative path without '..'",
            ));
        }
        Ok(self.root.join(relative))
    }
}

impl AssetSource for FileAssetSource {
    fn fetch_bytes(&self, identifier: &str) -> Result<Vec<u8>> {
        let path = self.resolve(identifier)?;
        std::fs::read(&path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => MockupError::asset_not_found(identifier.to_string()),
            _ => MockupError::asset_fetch_failed(identifier.to_string(), e),
        })
    }
}

/// Assets held in memory, keyed by identifier.
#[derive(Clone, Debug, Default)]
pub struct MemoryAssetSource {
    assets: HashMap<String, Vec<u8>>,
}

impl MemoryAssetSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, identifier: impl Into<String>, bytes: impl Into<Vec<u8>>) {
        self.assets.insert(identifier.into(), bytes.into());
    }

    pub fn with(mut self, identifier: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        self.insert(identifier, bytes);
        self
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }
}

impl AssetSource for MemoryAssetSource {
    fn fetch_bytes(&self, identifier: &str) -> Result<Vec<u8>> {
        self.assets
            .get(identifier)
            .cloned()
            .ok_or_else(|| MockupError::asset_not_found(identifier.to_string()))
    }
}

/// Writes the encoded mockup to a file, replacing any previous content.
#[derive(Clone, Debug)]
pub struct FileSink {
    path: PathBuf,
}

impl FileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RenderSink for FileSink {
    fn present(&self, buffer: &ImageBuffer) -> Result<()> {
        std::fs::write(&self.path, buffer.bytes()).map_err(|e| {
            MockupError::sink_failed(format!("{}: {e}", self.path.display()))
        })?;
        tracing::debug!(
            target: "mockup_engine::io",
            path = %self.path.display(),
            bytes = buffer.len(),
            "mockup written"
        );
        Ok(())
    }
}

/// Keeps the most recently presented buffer.
#[derive(Debug, Default)]
pub struct MemorySink {
    last: Mutex<Option<ImageBuffer>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last(&self) -> Option<ImageBuffer> {
        self.last.lock().clone()
    }

    pub fn take(&self) -> Option<ImageBuffer> {
        self.last.lock().take()
    }
}

impl RenderSink for MemorySink {
    fn present(&self, buffer: &ImageBuffer) -> Result<()> {
        *self.last.lock() = Some(buffer.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::buffer::Dimensions;
    use crate::ops::BufferFormat;

    fn buffer(bytes: &[u8]) -> ImageBuffer {
        ImageBuffer::new(bytes.to_vec(), Dimensions::new(1, 1), BufferFormat::Png)
    }

    #[test]
    fn file_source_reads_and_classifies_missing() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("template.jpg"), b"abc").unwrap();
        let source = FileAssetSource::new(dir.path());
        assert_eq!(source.fetch_bytes("template.jpg").unwrap(), b"abc");
        assert!(matches!(
            source.fetch_bytes("missing.png"),
            Err(MockupError::AssetNotFound { .. })
        ));
    }

    #[test]
    fn file_source_rejects_escaping_identifiers() {
        let dir = tempfile::tempdir().unwrap();
        let source = FileAssetSource::new(dir.path());
        assert!(matches!(
            source.fetch_bytes("../etc/passwd"),
            Err(MockupError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn file_source_directory_is_fetch_failure() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        let source = FileAssetSource::new(dir.path());
        let err = source.fetch_bytes("nested").unwrap_err();
        assert!(matches!(err, MockupError::AssetFetchFailed { .. }), "{err:?}");
    }

    #[test]
    fn memory_source_lookup() {
        let source = MemoryAssetSource::new().with("mask", vec![1u8, 2, 3]);
        assert_eq!(source.len(), 1);
        assert_eq!(source.fetch_bytes("mask").unwrap(), vec![1, 2, 3]);
        assert!(source.fetch_bytes("artwork").is_err());
    }

    #[test]
    fn file_sink_writes_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.png");
        FileSink::new(&path).present(&buffer(b"xyz")).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"xyz");
    }

    #[test]
    fn file_sink_reports_unwritable_path() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileSink::new(dir.path().join("no/such/dir/out.png"));
        assert!(matches!(
            sink.present(&buffer(b"x")),
            Err(MockupError::SinkFailed { .. })
        ));
    }

    #[test]
    fn memory_sink_keeps_last() {
        let sink = MemorySink::new();
        assert!(sink.last().is_none());
        sink.present(&buffer(b"a")).unwrap();
        sink.present(&buffer(b"b")).unwrap();
        assert_eq!(sink.last().unwrap().bytes(), b"b");
        assert!(sink.take().is_some());
        assert!(sink.last().is_none());
    }
}
