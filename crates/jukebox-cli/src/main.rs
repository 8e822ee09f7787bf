//! Jukebox console: drives per-group playback engines from a command script.
//!
//! Commands arrive one per line on stdin (or from `--script`). Each line targets a
//! channel-group id; the first command for a group spawns its engine. Voice output goes
//! through the local paced transport, and status lines are printed prefixed with the group.

mod cli;
mod console;
mod resolver;
mod script;

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::Notify;
use tracing_subscriber::EnvFilter;

use jukebox_core::local_voice::LocalVoiceConnector;
use jukebox_core::{
    EngineRegistry, EngineSnapshot, EventBus, PlayerConfig, PlayerEvent, ResolvedConfig,
    StatusSink, VoiceChannel,
};

use console::ConsoleSink;
use script::ScriptLine;

const VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("GIT_SHA"),
    ", ",
    env!("BUILD_DATE"),
    ")"
);

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("info,jukebox_core=info,jukebox_cli=info")
        }))
        .init();

    let config = Arc::new(load_config(&args)?);
    tracing::info!(
        version = VERSION,
        speed = config.local_voice.speed,
        idle_disconnect = config.idle_disconnect,
        "jukebox starting"
    );

    let events = EventBus::new();
    spawn_event_logger(&events);
    let connector = Arc::new(LocalVoiceConnector::new(config.local_voice));
    let registry = EngineRegistry::new(connector, config, events);

    let interrupted = Arc::new(Notify::new());
    let notify = interrupted.clone();
    ctrlc::set_handler(move || notify.notify_one()).context("install ctrl-c handler")?;

    let input: Box<dyn AsyncRead + Unpin + Send> = match &args.script {
        Some(path) => Box::new(
            tokio::fs::File::open(path)
                .await
                .with_context(|| format!("open script {:?}", path))?,
        ),
        None => Box::new(tokio::io::stdin()),
    };
    let mut lines = BufReader::new(input).lines();
    let mut console = Consoles::new(args.json);
    let mut line_no = 0usize;

    loop {
        let raw = tokio::select! {
            _ = interrupted.notified() => {
                tracing::info!("interrupted");
                break;
            }
            line = lines.next_line() => match line.context("read command")? {
                Some(raw) => raw,
                None => break,
            },
        };
        line_no += 1;
        let parsed = match script::parse_line(&raw) {
            Ok(Some(parsed)) => parsed,
            Ok(None) => continue,
            Err(err) => {
                tracing::warn!(line = line_no, error = %err, "skipping bad command");
                continue;
            }
        };
        if let Err(err) = run_line(&registry, &mut console, &args, parsed).await {
            tracing::warn!(line = line_no, error = %err, "command failed");
        }
    }

    registry.shutdown_all().await;
    tracing::info!("jukebox stopped");
    Ok(())
}

fn load_config(args: &cli::Args) -> Result<ResolvedConfig> {
    let file = match &args.config {
        Some(path) => PlayerConfig::load(path)?,
        None => PlayerConfig::default(),
    };
    let mut resolved = file.resolve();
    if let Some(speed) = args.speed {
        if !speed.is_finite() || speed <= 0.0 {
            bail!("--speed must be a positive number");
        }
        resolved.local_voice.speed = speed;
    }
    Ok(resolved)
}

async fn run_line(
    registry: &EngineRegistry,
    console: &mut Consoles,
    args: &cli::Args,
    line: ScriptLine,
) -> Result<()> {
    match line {
        ScriptLine::Wait(duration) => {
            tokio::time::sleep(duration).await;
        }
        ScriptLine::Join { group, channel } => {
            let channel = channel.map(|name| VoiceChannel::new(name.clone(), name));
            let sink = console.sink(&group);
            registry.get_or_spawn(&group).join(channel, sink).await?;
        }
        ScriptLine::Enqueue { group, path, index } => {
            let track = resolver::resolve_file(&path, &args.requester)?;
            let sink = console.sink(&group);
            let engine = registry.get_or_spawn(&group);
            match index {
                Some(index) => engine.enqueue(track, Some(index), sink).await?,
                None => engine.play_track(track, sink).await?,
            }
        }
        ScriptLine::Control { group, action } => {
            let sink = console.sink(&group);
            registry.get_or_spawn(&group).control(action, sink).await?;
        }
        ScriptLine::Status { group } => match registry.get(&group) {
            Some(engine) => print_snapshot(&engine.snapshot().await?, args.json)?,
            None => println!("[{group}] no engine"),
        },
    }
    Ok(())
}

fn print_snapshot(snapshot: &EngineSnapshot, json: bool) -> Result<()> {
    if json {
        let value = serde_json::json!({
            "group": snapshot.group,
            "status": snapshot.status.as_str(),
            "idle_timeout_secs": snapshot.idle_timeout.as_secs(),
            "volume": snapshot.volume,
            "queue": snapshot.queue,
            "channel": snapshot.channel,
            "streaming": snapshot.has_dispatcher,
        });
        println!("{}", serde_json::to_string(&value).context("encode snapshot")?);
        return Ok(());
    }
    println!(
        "[{}] status={} volume={:.0}% idle={}s channel={} queued={}",
        snapshot.group,
        snapshot.status,
        snapshot.volume * 100.0,
        snapshot.idle_timeout.as_secs(),
        snapshot.channel.as_deref().unwrap_or("-"),
        snapshot.queue.len()
    );
    Ok(())
}

/// One console sink per group, so engine output keeps its group prefix.
struct Consoles {
    json: bool,
    sinks: HashMap<String, Arc<ConsoleSink>>,
}

impl Consoles {
    fn new(json: bool) -> Self {
        Self {
            json,
            sinks: HashMap::new(),
        }
    }

    fn sink(&mut self, group: &str) -> Arc<dyn StatusSink> {
        let json = self.json;
        self.sinks
            .entry(group.to_string())
            .or_insert_with(|| Arc::new(ConsoleSink::new(group, json)))
            .clone()
    }
}

fn spawn_event_logger(events: &EventBus) {
    let mut rx = events.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(PlayerEvent::TrackFailed { group, title, error }) => {
                    tracing::warn!(group = %group, title = %title, error = %error, "track failed");
                }
                Ok(event) => tracing::debug!(?event, "player event"),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "event logger lagged");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}
