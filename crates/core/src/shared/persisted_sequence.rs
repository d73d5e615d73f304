use std::path::{Path, PathBuf};

use super::capture_config::ImageFormat;
use super::constants::FRAME_FILE_PREFIX;

/// Where a persisted sequence lives.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SequenceLocation {
    Directory(PathBuf),
    Memory,
}

/// Descriptor of the frames a sink has persisted.
///
/// Frames are numbered `0..frame_count`; on disk they are named
/// `frame_{index:03}.{ext}`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PersistedSequence {
    location: SequenceLocation,
    format: ImageFormat,
    frame_count: usize,
}

impl PersistedSequence {
    pub fn new(location: SequenceLocation, format: ImageFormat, frame_count: usize) -> Self {
        Self {
            location,
            format,
            frame_count,
        }
    }

    pub fn location(&self) -> &SequenceLocation {
        &self.location
    }

    pub fn format(&self) -> ImageFormat {
        self.format
    }

    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    pub fn directory(&self) -> Option<&Path> {
        match &self.location {
            SequenceLocation::Directory(dir) => Some(dir),
            SequenceLocation::Memory => None,
        }
    }

    pub fn frame_path(&self, index: usize) -> Option<PathBuf> {
        self.directory()
            .map(|dir| dir.join(frame_file_name(index, self.format)))
    }

    /// printf-style pattern understood by ffmpeg's image2 demuxer.
    pub fn input_pattern(&self) -> Option<PathBuf> {
        self.directory().map(|dir| {
            dir.join(format!(
                "{FRAME_FILE_PREFIX}%03d.{}",
                self.format.extension()
            ))
        })
    }
}

pub fn frame_file_name(index: usize, format: ImageFormat) -> String {
    format!("{FRAME_FILE_PREFIX}{index:03}.{}", format.extension())
}
