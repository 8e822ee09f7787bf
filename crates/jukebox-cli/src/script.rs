//! Line-oriented command scripts.
//!
//! Each non-empty line names an operation and the channel-group it targets:
//!
//! ```text
//! join  <group> [voice channel name]
//! play  <group> [path]        # with a path: enqueue and autoplay
//! insert <group> <index> <path>
//! skip|pause|resume|queue|clear|np|leave|status <group>
//! vol   <group> <percent>
//! wait  <seconds>
//! ```
//!
//! `#` starts a comment.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};

use jukebox_core::Control;

#[derive(Debug, Clone, PartialEq)]
pub enum ScriptLine {
    Join {
        group: String,
        channel: Option<String>,
    },
    Enqueue {
        group: String,
        path: PathBuf,
        index: Option<usize>,
    },
    Control {
        group: String,
        action: Control,
    },
    Status {
        group: String,
    },
    Wait(Duration),
}

/// Parse one script line. Blank lines and comments yield `None`.
pub fn parse_line(raw: &str) -> Result<Option<ScriptLine>> {
    let line = raw.split('#').next().unwrap_or("").trim();
    if line.is_empty() {
        return Ok(None);
    }
    let mut words = line.split_whitespace();
    let verb = words.next().unwrap_or_default().to_ascii_lowercase();

    if verb == "wait" {
        let secs: f64 = words
            .next()
            .ok_or_else(|| anyhow!("wait needs a number of seconds"))?
            .parse()
            .context("parse wait seconds")?;
        if !secs.is_finite() || secs < 0.0 {
            bail!("wait seconds must be a non-negative number");
        }
        return Ok(Some(ScriptLine::Wait(Duration::from_secs_f64(secs))));
    }

    let group = words
        .next()
        .ok_or_else(|| anyhow!("{verb} needs a group id"))?
        .to_string();
    let rest: Vec<&str> = words.collect();
    let rest_joined = rest.join(" ");

    match verb.as_str() {
        "join" => Ok(Some(ScriptLine::Join {
            group,
            channel: (!rest_joined.is_empty()).then_some(rest_joined),
        })),
        "play" if rest.is_empty() => control(group, Control::Play),
        "play" => Ok(Some(ScriptLine::Enqueue {
            group,
            path: PathBuf::from(rest_joined),
            index: None,
        })),
        "insert" => {
            let (index, path) = rest
                .split_first()
                .filter(|(_, path)| !path.is_empty())
                .ok_or_else(|| anyhow!("insert needs an index and a path"))?;
            let index: usize = index.parse().context("parse insert index")?;
            Ok(Some(ScriptLine::Enqueue {
                group,
                path: PathBuf::from(path.join(" ")),
                index: Some(index),
            }))
        }
        "skip" => control(group, Control::Skip),
        "pause" => control(group, Control::Pause),
        "resume" => control(group, Control::Resume),
        "queue" => control(group, Control::ListQueue),
        "clear" | "purge" => control(group, Control::ClearQueue),
        "np" => control(group, Control::NowPlaying),
        "leave" => control(group, Control::Leave),
        "vol" | "volume" => control(group, Control::SetVolume(rest_joined)),
        "status" => Ok(Some(ScriptLine::Status { group })),
        other => bail!("unknown command {other:?}"),
    }
}

fn control(group: String, action: Control) -> Result<Option<ScriptLine>> {
    Ok(Some(ScriptLine::Control { group, action }))
}
