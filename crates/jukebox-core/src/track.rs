//! Playable track descriptors.
//!
//! A track pairs immutable display metadata with a factory for its audio stream.

use std::fmt;
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};

use jukebox_types::TrackInfo;

/// Readable audio byte stream handed to a transport.
pub type AudioStream = Box<dyn Read + Send>;

/// Produces a fresh audio stream for a track.
pub trait StreamSource: Send + Sync {
    fn open_stream(&self) -> Result<AudioStream>;
}

/// Opens a file on the local filesystem.
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl StreamSource for FileSource {
    fn open_stream(&self) -> Result<AudioStream> {
        let file = std::fs::File::open(&self.path)
            .with_context(|| format!("open audio file {:?}", self.path))?;
        Ok(Box::new(std::io::BufReader::new(file)))
    }
}

/// Serves a fixed in-memory buffer.
pub struct MemorySource {
    bytes: Arc<[u8]>,
}

impl MemorySource {
    pub fn new(bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            bytes: bytes.into(),
        }
    }
}

impl StreamSource for MemorySource {
    fn open_stream(&self) -> Result<AudioStream> {
        Ok(Box::new(std::io::Cursor::new(self.bytes.clone())))
    }
}

/// Immutable playable item. Cloning shares the metadata and source.
#[derive(Clone)]
pub struct Track {
    info: Arc<TrackInfo>,
    source: Arc<dyn StreamSource>,
}

impl Track {
    pub fn new(info: TrackInfo, source: Arc<dyn StreamSource>) -> Self {
        Self {
            info: Arc::new(info),
            source,
        }
    }

    pub fn info(&self) -> &TrackInfo {
        &self.info
    }

    pub fn title(&self) -> &str {
        &self.info.title
    }

    /// Open a new audio stream for this track.
    pub fn open_stream(&self) -> Result<AudioStream> {
        self.source
            .open_stream()
            .with_context(|| format!("open stream for {:?}", self.info.title))
    }
}

impl fmt::Debug for Track {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Track")
            .field("title", &self.info.title)
            .field("url", &self.info.url)
            .finish_non_exhaustive()
    }
}
