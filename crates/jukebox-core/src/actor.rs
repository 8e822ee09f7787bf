//! Per-group engine task.
//!
//! Each engine runs inside one tokio task that serializes caller commands and
//! dispatcher events. The task also enforces the idle timeout when configured to.

use std::sync::Arc;

use anyhow::{Result, anyhow};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use uuid::Uuid;

use jukebox_types::EngineStatus;

use crate::config::ResolvedConfig;
use crate::engine::{EngineSnapshot, PlaybackEngine};
use crate::events::EventBus;
use crate::messages;
use crate::track::Track;
use crate::transport::{DispatcherSignal, NullSink, StatusSink, VoiceChannel, VoiceConnector};

/// Control operations that reply through a caller-supplied sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Control {
    Play,
    Skip,
    Pause,
    Resume,
    ListQueue,
    ClearQueue,
    NowPlaying,
    SetVolume(String),
    Leave,
}

pub enum EngineCommand {
    Enqueue {
        track: Track,
        index: Option<usize>,
        /// Enter the play loop afterwards if nothing is streaming.
        autoplay: bool,
        reply: Arc<dyn StatusSink>,
    },
    Control {
        action: Control,
        reply: Arc<dyn StatusSink>,
    },
    Join {
        channel: Option<VoiceChannel>,
        text: Arc<dyn StatusSink>,
    },
    Snapshot(oneshot::Sender<EngineSnapshot>),
    Shutdown,
}

/// Cheap, cloneable handle to a running engine task.
#[derive(Clone)]
pub struct EngineHandle {
    id: Uuid,
    group: String,
    tx: mpsc::Sender<EngineCommand>,
}

impl EngineHandle {
    /// Unique id of the task behind this handle.
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    /// `true` once the engine task has exited.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    pub async fn send(&self, command: EngineCommand) -> Result<()> {
        self.tx
            .send(command)
            .await
            .map_err(|_| anyhow!("engine for group {} has stopped", self.group))
    }

    pub async fn enqueue(
        &self,
        track: Track,
        index: Option<usize>,
        reply: Arc<dyn StatusSink>,
    ) -> Result<()> {
        self.send(EngineCommand::Enqueue {
            track,
            index,
            autoplay: false,
            reply,
        })
        .await
    }

    /// Enqueue and start playing if the engine is idle.
    pub async fn play_track(&self, track: Track, reply: Arc<dyn StatusSink>) -> Result<()> {
        self.send(EngineCommand::Enqueue {
            track,
            index: None,
            autoplay: true,
            reply,
        })
        .await
    }

    pub async fn control(&self, action: Control, reply: Arc<dyn StatusSink>) -> Result<()> {
        self.send(EngineCommand::Control { action, reply }).await
    }

    pub async fn join(
        &self,
        channel: Option<VoiceChannel>,
        text: Arc<dyn StatusSink>,
    ) -> Result<()> {
        self.send(EngineCommand::Join { channel, text }).await
    }

    pub async fn snapshot(&self) -> Result<EngineSnapshot> {
        let (tx, rx) = oneshot::channel();
        self.send(EngineCommand::Snapshot(tx)).await?;
        rx.await
            .map_err(|_| anyhow!("engine for group {} dropped snapshot", self.group))
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.send(EngineCommand::Shutdown).await
    }
}

/// Spawn the engine task for `group`.
pub fn spawn_engine(
    group: impl Into<String>,
    connector: Arc<dyn VoiceConnector>,
    config: Arc<ResolvedConfig>,
    events: EventBus,
) -> (EngineHandle, JoinHandle<()>) {
    let group = group.into();
    let (tx, rx) = mpsc::channel(config.command_buffer);
    let (signal_tx, signal_rx) = mpsc::unbounded_channel();
    let idle_enforced = config.idle_disconnect;
    let engine = PlaybackEngine::new(group.clone(), connector, config, events, signal_tx);
    let handle = EngineHandle {
        id: Uuid::new_v4(),
        group,
        tx,
    };
    tracing::debug!(group = %handle.group, id = %handle.id, "spawning engine task");
    let task = tokio::spawn(run_engine(engine, rx, signal_rx, idle_enforced));
    (handle, task)
}

async fn run_engine(
    mut engine: PlaybackEngine,
    mut commands: mpsc::Receiver<EngineCommand>,
    mut signals: mpsc::UnboundedReceiver<DispatcherSignal>,
    idle_enforced: bool,
) {
    let mut deadline = Instant::now() + engine.idle_timeout();
    loop {
        let status_before = engine.status();
        let idle_armed = idle_enforced && engine.status() != EngineStatus::Playing;
        tokio::select! {
            command = commands.recv() => {
                let Some(command) = command else {
                    break;
                };
                if matches!(command, EngineCommand::Shutdown) {
                    break;
                }
                let observing = matches!(command, EngineCommand::Snapshot(_));
                apply(&mut engine, command).await;
                if !observing || engine.status() != status_before {
                    deadline = Instant::now() + engine.idle_timeout();
                }
            }
            Some(signal) = signals.recv() => {
                engine.handle_dispatcher_signal(signal);
                if engine.status() != status_before {
                    deadline = Instant::now() + engine.idle_timeout();
                }
            }
            _ = tokio::time::sleep_until(deadline), if idle_armed => {
                if engine.status() == EngineStatus::Offline {
                    tracing::info!(group = %engine.group(), "engine idle while offline, stopping");
                    break;
                }
                engine.leave_idle();
                deadline = Instant::now() + engine.idle_timeout();
            }
        }
    }
    reject_pending(engine.group(), &mut commands);
    if engine.is_connected() {
        engine.leave(&NullSink);
    }
    tracing::debug!(group = %engine.group(), "engine task finished");
}

/// Close the command channel and answer whatever was already buffered, so no sender
/// that got `Ok` has its command dropped without a reply.
fn reject_pending(group: &str, commands: &mut mpsc::Receiver<EngineCommand>) -> usize {
    commands.close();
    let mut rejected = 0;
    while let Ok(command) = commands.try_recv() {
        let reply = match command {
            EngineCommand::Enqueue { reply, .. } | EngineCommand::Control { reply, .. } => reply,
            EngineCommand::Join { text, .. } => text,
            // Dropping the sender fails the caller's snapshot.
            EngineCommand::Snapshot(_) | EngineCommand::Shutdown => continue,
        };
        rejected += 1;
        if let Err(err) = reply.send(messages::engine_stopped()) {
            tracing::warn!(group = %group, error = %err, "status message not delivered");
        }
    }
    if rejected > 0 {
        tracing::warn!(group = %group, rejected, "engine stopped with commands pending");
    }
    rejected
}

async fn apply(engine: &mut PlaybackEngine, command: EngineCommand) {
    match command {
        EngineCommand::Enqueue {
            track,
            index,
            autoplay,
            reply,
        } => {
            engine.enqueue(track, index);
            if autoplay && !engine.status().is_streaming() {
                engine.play(&*reply);
            }
        }
        EngineCommand::Control { action, reply } => {
            let reply = &*reply;
            match action {
                Control::Play => engine.play(reply),
                Control::Skip => engine.skip(reply),
                Control::Pause => engine.pause(reply),
                Control::Resume => engine.resume(reply),
                Control::ListQueue => engine.list_queue(reply),
                Control::ClearQueue => engine.clear_queue(reply),
                Control::NowPlaying => engine.now_playing(reply),
                Control::SetVolume(raw) => engine.set_volume(&raw, reply),
                Control::Leave => engine.leave(reply),
            }
        }
        EngineCommand::Join { channel, text } => engine.join(channel, text).await,
        EngineCommand::Snapshot(tx) => {
            let _ = tx.send(engine.snapshot());
        }
        EngineCommand::Shutdown => {}
    }
}
