//! Per-group playback engine.
//!
//! Owns the queue, the voice connection and the active dispatcher, and drives the
//! play/advance loop. Every method expects exclusive access: the actor in
//! [`crate::actor`] is the only caller in production.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::Result;
use tokio::sync::mpsc::UnboundedSender;

use jukebox_types::{EndReason, EngineStatus, NowPlaying, StatusMessage, parse_duration};

use crate::config::ResolvedConfig;
use crate::events::EventBus;
use crate::messages;
use crate::queue::TrackQueue;
use crate::track::Track;
use crate::transport::{
    Dispatcher, DispatcherEvent, DispatcherSignal, EventSink, StatusSink, StreamOptions,
    VoiceChannel, VoiceConnection, VoiceConnector,
};

/// Point-in-time view of an engine, for observers and tests.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSnapshot {
    pub group: String,
    pub status: EngineStatus,
    pub idle_timeout: Duration,
    pub volume: f32,
    pub queue: Vec<String>,
    pub channel: Option<String>,
    pub has_dispatcher: bool,
}

enum Connection {
    Disconnected,
    Connected(Box<Session>),
}

struct Session {
    voice: Box<dyn VoiceConnection>,
    text: Arc<dyn StatusSink>,
    stream: StreamState,
}

enum StreamState {
    Idle,
    Streaming(ActiveStream),
}

struct ActiveStream {
    dispatcher: Box<dyn Dispatcher>,
    generation: u64,
    track: Track,
}

pub struct PlaybackEngine {
    group: String,
    queue: TrackQueue,
    connection: Connection,
    volume: f32,
    status: EngineStatus,
    idle_timeout: Duration,
    next_generation: u64,
    config: Arc<ResolvedConfig>,
    connector: Arc<dyn VoiceConnector>,
    events: EventBus,
    signals: UnboundedSender<DispatcherSignal>,
}

impl PlaybackEngine {
    /// Create an offline engine. Dispatcher events are delivered to `signals`.
    pub fn new(
        group: impl Into<String>,
        connector: Arc<dyn VoiceConnector>,
        config: Arc<ResolvedConfig>,
        events: EventBus,
        signals: UnboundedSender<DispatcherSignal>,
    ) -> Self {
        let status = EngineStatus::Offline;
        Self {
            group: group.into(),
            queue: TrackQueue::new(),
            connection: Connection::Disconnected,
            volume: config.default_volume,
            status,
            idle_timeout: config.idle.for_status(status),
            next_generation: 0,
            config,
            connector,
            events,
            signals,
        }
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn status(&self) -> EngineStatus {
        self.status
    }

    /// How long the current status may persist before the connection is torn down.
    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn queue(&self) -> &TrackQueue {
        &self.queue
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.connection, Connection::Connected(_))
    }

    /// Generation of the dispatcher currently streaming, if any.
    pub fn current_generation(&self) -> Option<u64> {
        self.active().map(|active| active.generation)
    }

    pub fn snapshot(&self) -> EngineSnapshot {
        EngineSnapshot {
            group: self.group.clone(),
            status: self.status,
            idle_timeout: self.idle_timeout,
            volume: self.volume,
            queue: self.queue.titles(),
            channel: self.session().map(|s| s.voice.channel().name.clone()),
            has_dispatcher: self.active().is_some(),
        }
    }

    /// Insert a track. Playback is not started here.
    pub fn enqueue(&mut self, track: Track, index: Option<usize>) {
        tracing::debug!(
            group = %self.group,
            title = %track.title(),
            index = ?index,
            "enqueue"
        );
        self.queue.insert(track, index);
        self.events.queue_changed(&self.group, self.queue.len());
    }

    /// Enter the play loop unless a dispatcher is already streaming.
    pub fn play(&mut self, reply: &dyn StatusSink) {
        if !self.is_connected() {
            send_status(&self.group, reply, messages::not_connected());
            return;
        }
        if self.active().is_some() {
            return;
        }
        self.advance();
    }

    pub fn skip(&mut self, reply: &dyn StatusSink) {
        if self.status != EngineStatus::Playing {
            send_status(&self.group, reply, messages::nothing_to_skip());
            return;
        }
        let Some(mut active) = self.take_stream() else {
            send_status(&self.group, reply, messages::nothing_to_skip());
            return;
        };
        let title = self
            .queue
            .head()
            .map(|t| t.title().to_string())
            .unwrap_or_else(|| active.track.title().to_string());
        self.announce(messages::skipped(&title));
        tracing::info!(group = %self.group, title = %title, "skip");
        active.dispatcher.end(EndReason::Finished);
        self.pop_head();
        self.advance();
    }

    pub fn pause(&mut self, reply: &dyn StatusSink) {
        let Some(active) = self.active_mut() else {
            send_status(&self.group, reply, messages::nothing_playing());
            return;
        };
        active.dispatcher.pause();
        self.change_status(EngineStatus::Paused);
    }

    pub fn resume(&mut self, reply: &dyn StatusSink) {
        let Some(active) = self.active_mut() else {
            send_status(&self.group, reply, messages::nothing_playing());
            return;
        };
        active.dispatcher.resume();
        self.change_status(EngineStatus::Playing);
    }

    pub fn list_queue(&self, reply: &dyn StatusSink) {
        if self.queue.is_empty() {
            send_status(&self.group, reply, messages::queue_empty());
            return;
        }
        let rendered = messages::render_queue(&self.queue, self.config.queue_display_limit);
        let delivered = match rendered {
            Ok(text) => reply.send(StatusMessage::text(text)),
            Err(err) => {
                tracing::error!(group = %self.group, error = %err, "queue render failed");
                reply.send(messages::queue_unavailable())
            }
        };
        if let Err(err) = delivered {
            tracing::warn!(group = %self.group, error = %err, "queue listing not delivered");
            send_status(&self.group, reply, messages::queue_unavailable());
        }
    }

    /// Empty the queue. An active dispatcher keeps playing its own track.
    pub fn clear_queue(&mut self, reply: &dyn StatusSink) {
        self.queue.clear();
        self.events.queue_changed(&self.group, 0);
        send_status(&self.group, reply, messages::queue_cleared());
    }

    pub fn now_playing(&self, reply: &dyn StatusSink) {
        match self.queue.head() {
            Some(track) => send_status(
                &self.group,
                reply,
                StatusMessage::NowPlaying(NowPlaying::from_track(track.info(), now_ms())),
            ),
            None => send_status(&self.group, reply, messages::nothing_playing()),
        }
    }

    /// Apply a volume given in percent. Only accepted while a dispatcher is streaming.
    pub fn set_volume(&mut self, raw: &str, reply: &dyn StatusSink) {
        let percent = match raw.trim().parse::<i64>() {
            Ok(value) if (0..=100).contains(&value) => value as u8,
            _ => {
                send_status(&self.group, reply, messages::volume_out_of_range());
                return;
            }
        };
        let volume = f32::from(percent) / 100.0;
        let Some(active) = self.active_mut() else {
            send_status(&self.group, reply, messages::nothing_playing());
            return;
        };
        active.dispatcher.set_volume(volume);
        self.volume = volume;
        tracing::debug!(group = %self.group, volume, "volume changed");
        send_status(&self.group, reply, messages::volume_set(percent));
    }

    /// Connect to the requester's voice channel and bind `text` for announcements.
    pub async fn join(&mut self, channel: Option<VoiceChannel>, text: Arc<dyn StatusSink>) {
        let Some(channel) = channel else {
            send_status(&self.group, &*text, messages::not_in_voice_channel());
            return;
        };
        if let Connection::Connected(session) = &mut self.connection {
            session.text = text;
            let name = session.voice.channel().name.clone();
            self.announce(messages::already_connected(&name));
            return;
        }
        let voice = match self.connector.connect(&channel).await {
            Ok(voice) => voice,
            Err(err) => {
                tracing::warn!(
                    group = %self.group,
                    channel = %channel.name,
                    error = %err,
                    "voice connect failed"
                );
                send_status(&self.group, &*text, messages::join_failed(&channel.name));
                return;
            }
        };
        tracing::info!(group = %self.group, channel = %channel.name, "joined voice channel");
        self.connection = Connection::Connected(Box::new(Session {
            voice,
            text,
            stream: StreamState::Idle,
        }));
        self.announce(messages::joined(&channel.name));
        self.change_status(EngineStatus::Stopped);
        if !self.queue.is_empty() {
            self.advance();
        }
    }

    pub fn leave(&mut self, reply: &dyn StatusSink) {
        let Some(name) = self.session().map(|s| s.voice.channel().name.clone()) else {
            send_status(&self.group, reply, messages::not_in_voice_self());
            return;
        };
        self.disconnect(messages::leaving(&name));
    }

    /// Tear down the connection because the idle timeout elapsed.
    pub fn leave_idle(&mut self) {
        if let Some(name) = self.session().map(|s| s.voice.channel().name.clone()) {
            tracing::info!(group = %self.group, channel = %name, "idle timeout, leaving");
            self.disconnect(messages::leaving_idle(&name));
        }
    }

    /// React to an event from a dispatcher. Events from retired dispatchers are dropped.
    pub fn handle_dispatcher_signal(&mut self, signal: DispatcherSignal) {
        if self.current_generation() != Some(signal.generation) {
            tracing::trace!(
                group = %self.group,
                generation = signal.generation,
                event = ?signal.event,
                "ignoring event from stale dispatcher"
            );
            return;
        }
        match signal.event {
            DispatcherEvent::Debug(info) => {
                tracing::debug!(group = %self.group, generation = signal.generation, %info, "dispatcher");
            }
            DispatcherEvent::Error(error) => {
                let Some(active) = self.take_stream() else {
                    return;
                };
                self.report_track_failure(active.track.title(), &error);
                self.pop_head();
                self.advance();
            }
            DispatcherEvent::Ended(reason) => {
                let Some(active) = self.take_stream() else {
                    return;
                };
                tracing::debug!(
                    group = %self.group,
                    title = %active.track.title(),
                    reason = ?reason,
                    "dispatcher ended"
                );
                self.pop_head();
                match reason {
                    EndReason::Finished => self.advance(),
                    EndReason::Leave => self.change_status(EngineStatus::Stopped),
                }
            }
        }
    }

    /// Play queue slot 0, discarding tracks that cannot start, until one streams or the
    /// queue runs out.
    fn advance(&mut self) {
        loop {
            let Some(text) = self.session().map(|s| s.text.clone()) else {
                return;
            };
            let gaps = self.queue.discard_leading_gaps();
            if gaps > 0 {
                tracing::debug!(group = %self.group, gaps, "dropped empty queue slots");
            }
            let Some(track) = self.queue.head().cloned() else {
                send_status(&self.group, &*text, messages::queue_complete());
                self.change_status(EngineStatus::Stopped);
                return;
            };
            match self.start_stream(&track, &*text) {
                Ok(()) => return,
                Err(err) => {
                    self.report_track_failure(track.title(), &format!("{err:#}"));
                    self.pop_head();
                }
            }
        }
    }

    fn start_stream(&mut self, track: &Track, text: &dyn StatusSink) -> Result<()> {
        let stream = track.open_stream()?;
        send_status(
            &self.group,
            text,
            StatusMessage::NowPlaying(NowPlaying::from_track(track.info(), now_ms())),
        );
        self.next_generation += 1;
        let generation = self.next_generation;
        let options = StreamOptions {
            volume: self.volume,
            duration_hint: parse_duration(&track.info().duration).map(Duration::from_secs),
        };
        let events = EventSink::new(generation, self.signals.clone());
        let Connection::Connected(session) = &mut self.connection else {
            anyhow::bail!("voice connection went away");
        };
        let dispatcher = session.voice.play_stream(stream, options, events)?;
        session.stream = StreamState::Streaming(ActiveStream {
            dispatcher,
            generation,
            track: track.clone(),
        });
        tracing::info!(
            group = %self.group,
            title = %track.title(),
            generation,
            "now playing"
        );
        self.events.track_started(&self.group, track.title());
        self.change_status(EngineStatus::Playing);
        Ok(())
    }

    fn disconnect(&mut self, farewell: StatusMessage) {
        let Connection::Connected(session) =
            std::mem::replace(&mut self.connection, Connection::Disconnected)
        else {
            return;
        };
        let mut session = *session;
        send_status(&self.group, &*session.text, farewell);
        if let StreamState::Streaming(mut active) =
            std::mem::replace(&mut session.stream, StreamState::Idle)
        {
            active.dispatcher.end(EndReason::Leave);
            self.pop_head();
        }
        session.voice.disconnect();
        tracing::info!(group = %self.group, "left voice channel");
        self.change_status(EngineStatus::Offline);
    }

    fn report_track_failure(&self, title: &str, error: &str) {
        tracing::warn!(group = %self.group, title = %title, error = %error, "track failed, skipping");
        self.events.track_failed(&self.group, title, error);
        if self.config.announce_track_errors {
            self.announce(messages::track_failed(title));
        }
    }

    /// Set the status and recompute the idle timeout for it.
    fn change_status(&mut self, status: EngineStatus) {
        debug_assert_eq!(
            status.is_streaming(),
            self.active().is_some(),
            "status {status} disagrees with dispatcher presence"
        );
        debug_assert_eq!(status == EngineStatus::Offline, !self.is_connected());
        let previous = self.status;
        self.status = status;
        self.idle_timeout = self.config.idle.for_status(status);
        if previous != status {
            tracing::debug!(group = %self.group, from = %previous, to = %status, "status changed");
            self.events.status_changed(&self.group, status);
        }
    }

    fn pop_head(&mut self) {
        self.queue.pop_front();
        self.events.queue_changed(&self.group, self.queue.len());
    }

    fn announce(&self, message: StatusMessage) {
        if let Some(session) = self.session() {
            send_status(&self.group, &*session.text, message);
        }
    }

    fn session(&self) -> Option<&Session> {
        match &self.connection {
            Connection::Connected(session) => Some(session),
            Connection::Disconnected => None,
        }
    }

    fn active(&self) -> Option<&ActiveStream> {
        match &self.session()?.stream {
            StreamState::Streaming(active) => Some(active),
            StreamState::Idle => None,
        }
    }

    fn active_mut(&mut self) -> Option<&mut ActiveStream> {
        let Connection::Connected(session) = &mut self.connection else {
            return None;
        };
        match &mut session.stream {
            StreamState::Streaming(active) => Some(active),
            StreamState::Idle => None,
        }
    }

    fn take_stream(&mut self) -> Option<ActiveStream> {
        let Connection::Connected(session) = &mut self.connection else {
            return None;
        };
        match std::mem::replace(&mut session.stream, StreamState::Idle) {
            StreamState::Streaming(active) => Some(active),
            StreamState::Idle => None,
        }
    }
}

fn send_status(group: &str, sink: &dyn StatusSink, message: StatusMessage) {
    if let Err(err) = sink.send(message) {
        tracing::warn!(group = %group, error = %err, "status message not delivered");
    }
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
