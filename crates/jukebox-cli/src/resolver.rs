//! Turns local file paths into playable tracks.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use lofty::{Accessor, AudioFile, TaggedFileExt, read_from_path};

use jukebox_core::{FileSource, Track};
use jukebox_types::{TrackInfo, format_duration};

/// Build a track for `path`, reading title and duration from its tags when possible.
pub fn resolve_file(path: &Path, requester: &str) -> Result<Track> {
    let canonical = path
        .canonicalize()
        .with_context(|| format!("resolve {:?}", path))?;
    let (title, duration_secs) = match read_from_path(&canonical) {
        Ok(tagged) => {
            let title = tagged
                .primary_tag()
                .or_else(|| tagged.first_tag())
                .and_then(|tag| tag.title().map(|t| t.trim().to_string()))
                .filter(|t| !t.is_empty());
            (title, Some(tagged.properties().duration().as_secs()))
        }
        Err(err) => {
            tracing::debug!(path = %canonical.display(), error = %err, "no readable tags");
            (None, None)
        }
    };
    let title = title.unwrap_or_else(|| fallback_title(&canonical));
    let info = TrackInfo {
        title,
        url: format!("file://{}", canonical.display()),
        duration: duration_secs.map(format_duration).unwrap_or_default(),
        requester: requester.to_string(),
        thumbnail: None,
    };
    Ok(Track::new(info, Arc::new(FileSource::new(canonical))))
}

fn fallback_title(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}
