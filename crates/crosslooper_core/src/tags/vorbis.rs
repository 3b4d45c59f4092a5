//! Vorbis comment storage backed by lofty.
//!
//! Covers Ogg Vorbis, Ogg Opus, Ogg Speex and FLAC. The extension gates the
//! file, the container probe picks the reader.

use std::fs::File;
use std::path::{Path, PathBuf};

use lofty::config::{ParseOptions, WriteOptions};
use lofty::file::{AudioFile, FileType};
use lofty::flac::FlacFile;
use lofty::ogg::{OpusFile, SpeexFile, VorbisComments, VorbisFile};
use lofty::probe::Probe;
use lofty::tag::TagExt;

use super::{TagBackend, TagError, TagResult, TagStore};

/// Extensions considered for loop tagging (lowercase).
pub const SUPPORTED_EXTENSIONS: [&str; 4] = ["ogg", "oga", "opus", "flac"];

/// Whether `path` has a supported extension.
pub fn has_supported_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| SUPPORTED_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Vorbis comments of one file.
pub struct VorbisCommentStore {
    path: PathBuf,
    comments: VorbisComments,
    dirty: bool,
}

impl VorbisCommentStore {
    /// Read the comments of `path`.
    pub fn open(path: &Path) -> TagResult<Self> {
        if !has_supported_extension(path) {
            return Err(TagError::UnsupportedFormat(path.to_path_buf()));
        }

        let file_type = Probe::open(path)?.guess_file_type()?.file_type();
        let mut file = File::open(path)?;
        // Only the comments are needed
        let options = ParseOptions::new().read_properties(false);

        let comments = match file_type {
            Some(FileType::Vorbis) => VorbisFile::read_from(&mut file, options)?
                .vorbis_comments()
                .clone(),
            Some(FileType::Opus) => OpusFile::read_from(&mut file, options)?
                .vorbis_comments()
                .clone(),
            Some(FileType::Speex) => SpeexFile::read_from(&mut file, options)?
                .vorbis_comments()
                .clone(),
            // A FLAC file may have no comment block yet
            Some(FileType::Flac) => FlacFile::read_from(&mut file, options)?
                .vorbis_comments()
                .cloned()
                .unwrap_or_default(),
            _ => return Err(TagError::UnsupportedFormat(path.to_path_buf())),
        };

        Ok(Self {
            path: path.to_path_buf(),
            comments,
            dirty: false,
        })
    }
}

impl TagStore for VorbisCommentStore {
    fn path(&self) -> &Path {
        &self.path
    }

    fn get(&self, key: &str) -> Option<String> {
        self.comments.get(key).map(str::to_string)
    }

    fn set(&mut self, key: &str, value: String) {
        self.comments.insert(key.to_uppercase(), value);
        self.dirty = true;
    }

    fn save(&mut self) -> TagResult<()> {
        if !self.dirty {
            return Ok(());
        }
        self.comments
            .save_to_path(&self.path, WriteOptions::default())?;
        self.dirty = false;
        tracing::debug!("Saved Vorbis comments to {}", self.path.display());
        Ok(())
    }
}

/// [`TagBackend`] opening [`VorbisCommentStore`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct VorbisCommentBackend;

impl TagBackend for VorbisCommentBackend {
    fn open(&self, path: &Path) -> TagResult<Box<dyn TagStore>> {
        Ok(Box::new(VorbisCommentStore::open(path)?))
    }
}
