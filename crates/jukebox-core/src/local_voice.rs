//! Local voice transport.
//!
//! Stands in for a real voice gateway: each dispatcher drains its audio stream on a
//! worker thread and then paces for the track's duration, honoring pause, volume and
//! end commands.

use std::io::Read;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};

use jukebox_types::EndReason;

use crate::config::LocalVoiceSettings;
use crate::track::AudioStream;
use crate::transport::{
    Dispatcher, EventSink, StreamOptions, TransportError, VoiceChannel, VoiceConnection,
    VoiceConnector,
};

/// Assumed byte rate when a track has no duration hint (128 kbit/s).
const FALLBACK_BYTES_PER_SEC: f64 = 16_000.0;
const TICK: Duration = Duration::from_millis(50);

pub struct LocalVoiceConnector {
    settings: LocalVoiceSettings,
}

impl LocalVoiceConnector {
    pub fn new(settings: LocalVoiceSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl VoiceConnector for LocalVoiceConnector {
    async fn connect(
        &self,
        channel: &VoiceChannel,
    ) -> Result<Box<dyn VoiceConnection>, TransportError> {
        tracing::info!(channel = %channel.name, "local voice connected");
        Ok(Box::new(LocalVoiceConnection {
            channel: channel.clone(),
            settings: self.settings,
            connected: true,
        }))
    }
}

struct LocalVoiceConnection {
    channel: VoiceChannel,
    settings: LocalVoiceSettings,
    connected: bool,
}

impl VoiceConnection for LocalVoiceConnection {
    fn channel(&self) -> &VoiceChannel {
        &self.channel
    }

    fn play_stream(
        &mut self,
        stream: AudioStream,
        options: StreamOptions,
        events: EventSink,
    ) -> Result<Box<dyn Dispatcher>, TransportError> {
        if !self.connected {
            return Err(TransportError::Offline);
        }
        let (cmd_tx, cmd_rx) = crossbeam_channel::unbounded();
        let settings = self.settings;
        // Detached: the worker reports its own end through `events`.
        std::thread::Builder::new()
            .name(format!("local-voice-{}", events.generation()))
            .spawn(move || stream_thread_main(stream, options, settings, events, cmd_rx))
            .map_err(|err| TransportError::StreamFailed(err.to_string()))?;
        Ok(Box::new(LocalDispatcher { cmd_tx }))
    }

    fn disconnect(&mut self) {
        self.connected = false;
        tracing::info!(channel = %self.channel.name, "local voice disconnected");
    }
}

#[derive(Debug)]
enum StreamCommand {
    Pause,
    Resume,
    End(EndReason),
    Volume(f32),
}

struct LocalDispatcher {
    cmd_tx: Sender<StreamCommand>,
}

impl LocalDispatcher {
    fn send(&self, cmd: StreamCommand) {
        if self.cmd_tx.send(cmd).is_err() {
            tracing::trace!("local voice stream already finished");
        }
    }
}

impl Dispatcher for LocalDispatcher {
    fn pause(&mut self) {
        self.send(StreamCommand::Pause);
    }

    fn resume(&mut self) {
        self.send(StreamCommand::Resume);
    }

    /// Never blocks; `Ended(reason)` follows once the worker picks the command up.
    fn end(&mut self, reason: EndReason) {
        self.send(StreamCommand::End(reason));
    }

    fn set_volume(&mut self, volume: f32) {
        self.send(StreamCommand::Volume(volume));
    }
}

enum Step {
    Continue,
    Ended(EndReason),
    Abandoned,
}

fn apply_command(cmd: StreamCommand, paused: &mut bool, events: &EventSink) -> Step {
    match cmd {
        StreamCommand::Pause => *paused = true,
        StreamCommand::Resume => *paused = false,
        StreamCommand::Volume(volume) => events.debug(format!("volume set to {volume:.2}")),
        StreamCommand::End(reason) => return Step::Ended(reason),
    }
    Step::Continue
}

/// Drain pending commands without blocking.
fn poll_commands(rx: &Receiver<StreamCommand>, paused: &mut bool, events: &EventSink) -> Step {
    loop {
        match rx.try_recv() {
            Ok(cmd) => match apply_command(cmd, paused, events) {
                Step::Continue => continue,
                other => return other,
            },
            Err(crossbeam_channel::TryRecvError::Empty) => return Step::Continue,
            Err(crossbeam_channel::TryRecvError::Disconnected) => return Step::Abandoned,
        }
    }
}

fn stream_thread_main(
    mut stream: AudioStream,
    options: StreamOptions,
    settings: LocalVoiceSettings,
    events: EventSink,
    cmd_rx: Receiver<StreamCommand>,
) {
    let mut paused = false;
    let mut buf = vec![0u8; settings.chunk_bytes];
    let mut total_bytes = 0u64;
    events.debug(format!("stream started at volume {:.2}", options.volume));

    loop {
        match poll_commands(&cmd_rx, &mut paused, &events) {
            Step::Continue => {}
            Step::Ended(reason) => return events.ended(reason),
            Step::Abandoned => return,
        }
        if paused {
            match wait_for_command(&cmd_rx, &mut paused, &events, TICK) {
                Step::Continue => continue,
                Step::Ended(reason) => return events.ended(reason),
                Step::Abandoned => return,
            }
        }
        match stream.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => total_bytes += n as u64,
            Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(err) => return events.error(format!("read failed: {err}")),
        }
    }
    events.debug(format!("stream drained ({total_bytes} bytes)"));

    let nominal = options
        .duration_hint
        .unwrap_or_else(|| Duration::from_secs_f64(total_bytes as f64 / FALLBACK_BYTES_PER_SEC));
    let mut remaining = nominal.div_f64(settings.speed);
    while !remaining.is_zero() {
        let started = Instant::now();
        let wait = remaining.min(TICK);
        match wait_for_command(&cmd_rx, &mut paused, &events, wait) {
            Step::Continue => {}
            Step::Ended(reason) => return events.ended(reason),
            Step::Abandoned => return,
        }
        if !paused {
            remaining = remaining.saturating_sub(started.elapsed());
        }
    }
    events.ended(EndReason::Finished);
}

fn wait_for_command(
    rx: &Receiver<StreamCommand>,
    paused: &mut bool,
    events: &EventSink,
    timeout: Duration,
) -> Step {
    match rx.recv_timeout(timeout) {
        Ok(cmd) => apply_command(cmd, paused, events),
        Err(RecvTimeoutError::Timeout) => Step::Continue,
        Err(RecvTimeoutError::Disconnected) => Step::Abandoned,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::UnboundedReceiver;

    use crate::transport::{DispatcherEvent, DispatcherSignal};

    fn fast() -> LocalVoiceSettings {
        LocalVoiceSettings {
            speed: 1000.0,
            chunk_bytes: 4,
        }
    }

    fn connection(settings: LocalVoiceSettings) -> LocalVoiceConnection {
        LocalVoiceConnection {
            channel: VoiceChannel::new("vc", "Test"),
            settings,
            connected: true,
        }
    }

    fn options(secs: u64) -> StreamOptions {
        StreamOptions {
            volume: 1.0,
            duration_hint: Some(Duration::from_secs(secs)),
        }
    }

    fn next_terminal(rx: &mut UnboundedReceiver<DispatcherSignal>) -> DispatcherEvent {
        loop {
            let signal = rx.blocking_recv().expect("dispatcher event");
            if !matches!(signal.event, DispatcherEvent::Debug(_)) {
                return signal.event;
            }
        }
    }

    struct BrokenReader;

    impl Read for BrokenReader {
        fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
            Err(std::io::Error::other("disk on fire"))
        }
    }

    #[test]
    fn stream_finishes_naturally() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let mut conn = connection(fast());
        let _dispatcher = conn
            .play_stream(
                Box::new(std::io::Cursor::new(vec![1u8; 32])),
                options(1),
                EventSink::new(3, tx),
            )
            .unwrap();
        assert_eq!(next_terminal(&mut rx), DispatcherEvent::Ended(EndReason::Finished));
    }

    #[test]
    fn end_reports_the_requested_reason() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let mut conn = connection(LocalVoiceSettings {
            speed: 1.0,
            chunk_bytes: 4,
        });
        let mut dispatcher = conn
            .play_stream(
                Box::new(std::io::Cursor::new(vec![1u8; 8])),
                options(3600),
                EventSink::new(1, tx),
            )
            .unwrap();
        dispatcher.pause();
        dispatcher.end(EndReason::Leave);
        assert_eq!(next_terminal(&mut rx), DispatcherEvent::Ended(EndReason::Leave));
    }

    /// Blocks every read until the test releases it.
    struct GatedReader(Receiver<()>);

    impl Read for GatedReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            let _ = self.0.recv();
            buf[0] = 0;
            Ok(1)
        }
    }

    #[test]
    fn end_returns_while_a_read_is_blocked() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let (gate_tx, gate_rx) = crossbeam_channel::unbounded();
        let mut conn = connection(fast());
        let mut dispatcher = conn
            .play_stream(Box::new(GatedReader(gate_rx)), options(1), EventSink::new(2, tx))
            .unwrap();

        let started = Instant::now();
        dispatcher.end(EndReason::Leave);
        assert!(started.elapsed() < Duration::from_secs(1));

        // The worker may already have seen the end and dropped the reader.
        let _ = gate_tx.send(());
        assert_eq!(next_terminal(&mut rx), DispatcherEvent::Ended(EndReason::Leave));
    }

    #[test]
    fn read_errors_surface_as_error_events() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let mut conn = connection(fast());
        let _dispatcher = conn
            .play_stream(Box::new(BrokenReader), options(1), EventSink::new(1, tx))
            .unwrap();
        match next_terminal(&mut rx) {
            DispatcherEvent::Error(msg) => assert!(msg.contains("disk on fire")),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn disconnected_connection_refuses_streams() {
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let mut conn = connection(fast());
        conn.disconnect();
        let result = conn.play_stream(
            Box::new(std::io::Cursor::new(Vec::<u8>::new())),
            options(1),
            EventSink::new(1, tx),
        );
        assert!(matches!(result, Err(TransportError::Offline)));
    }
}
