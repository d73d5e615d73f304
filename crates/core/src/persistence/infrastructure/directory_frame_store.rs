use std::path::{Path, PathBuf};

use crate::persistence::domain::frame_store::FrameStore;
use crate::shared::capture_config::ImageFormat;
use crate::shared::persisted_sequence::{frame_file_name, SequenceLocation};

/// Writes each payload verbatim to `<dir>/frame_{index:03}.{ext}`.
///
/// Payloads are already encoded by the source, so no re-encoding happens
/// here. An existing file for the same index is overwritten.
pub struct DirectoryFrameStore {
    dir: PathBuf,
    format: ImageFormat,
}

impl DirectoryFrameStore {
    /// Creates the directory (and parents) if it does not exist yet.
    pub fn new(dir: impl Into<PathBuf>, format: ImageFormat) -> std::io::Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir, format })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, index: usize) -> PathBuf {
        self.dir.join(frame_file_name(index, self.format))
    }
}

impl FrameStore for DirectoryFrameStore {
    fn put(&self, index: usize, payload: &[u8]) -> std::io::Result<()> {
        std::fs::write(self.path_for(index), payload)
    }

    fn location(&self) -> SequenceLocation {
        SequenceLocation::Directory(self.dir.clone())
    }
}
