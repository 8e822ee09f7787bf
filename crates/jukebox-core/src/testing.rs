//! Hand-rolled transport doubles shared by unit tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use jukebox_types::{EndReason, StatusMessage, TrackInfo};

use crate::track::{AudioStream, MemorySource, StreamSource, Track};
use crate::transport::{
    Dispatcher, EventSink, StatusSink, StreamOptions, TransportError, VoiceChannel,
    VoiceConnection, VoiceConnector,
};

#[derive(Clone, Default)]
pub(crate) struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    pub(crate) fn push(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    pub(crate) fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub(crate) fn count_prefix(&self, prefix: &str) -> usize {
        self.0
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.starts_with(prefix))
            .count()
    }
}

#[derive(Clone, Default)]
pub(crate) struct TestConnector {
    pub(crate) log: CallLog,
    fail_connect: bool,
    refuse_streams: bool,
}

impl TestConnector {
    pub(crate) fn failing() -> Self {
        Self {
            fail_connect: true,
            ..Self::default()
        }
    }

    pub(crate) fn refusing_streams() -> Self {
        Self {
            refuse_streams: true,
            ..Self::default()
        }
    }
}

#[async_trait]
impl VoiceConnector for TestConnector {
    async fn connect(
        &self,
        channel: &VoiceChannel,
    ) -> Result<Box<dyn VoiceConnection>, TransportError> {
        if self.fail_connect {
            return Err(TransportError::ConnectFailed("gateway timeout".to_string()));
        }
        self.log.push(format!("connect:{}", channel.name));
        Ok(Box::new(TestConnection {
            channel: channel.clone(),
            log: self.log.clone(),
            refuse_streams: self.refuse_streams,
        }))
    }
}

struct TestConnection {
    channel: VoiceChannel,
    log: CallLog,
    refuse_streams: bool,
}

impl VoiceConnection for TestConnection {
    fn channel(&self) -> &VoiceChannel {
        &self.channel
    }

    fn play_stream(
        &mut self,
        _stream: AudioStream,
        options: StreamOptions,
        events: EventSink,
    ) -> Result<Box<dyn Dispatcher>, TransportError> {
        if self.refuse_streams {
            return Err(TransportError::StreamFailed("encoder busy".to_string()));
        }
        self.log
            .push(format!("play:{}:{}", events.generation(), options.volume));
        Ok(Box::new(TestDispatcher {
            log: self.log.clone(),
            events,
        }))
    }

    fn disconnect(&mut self) {
        self.log.push("disconnect");
    }
}

/// Echoes `Ended(reason)` on `end`, like a real transport would.
struct TestDispatcher {
    log: CallLog,
    events: EventSink,
}

impl Dispatcher for TestDispatcher {
    fn pause(&mut self) {
        self.log.push("pause");
    }

    fn resume(&mut self) {
        self.log.push("resume");
    }

    fn end(&mut self, reason: EndReason) {
        self.log
            .push(format!("end:{}:{:?}", self.events.generation(), reason));
        self.events.ended(reason);
    }

    fn set_volume(&mut self, volume: f32) {
        self.log.push(format!("volume:{volume}"));
    }
}

#[derive(Default)]
pub(crate) struct RecordingSink {
    messages: Mutex<Vec<StatusMessage>>,
    reject_next: AtomicBool,
}

impl RecordingSink {
    /// A sink whose first delivery fails.
    pub(crate) fn rejecting_first() -> Self {
        Self {
            messages: Mutex::new(Vec::new()),
            reject_next: AtomicBool::new(true),
        }
    }

    pub(crate) fn messages(&self) -> Vec<StatusMessage> {
        self.messages.lock().unwrap().clone()
    }

    pub(crate) fn texts(&self) -> Vec<String> {
        self.messages()
            .iter()
            .filter_map(|m| m.as_text().map(str::to_string))
            .collect()
    }

    pub(crate) fn now_playing_titles(&self) -> Vec<String> {
        self.messages()
            .into_iter()
            .filter_map(|m| match m {
                StatusMessage::NowPlaying(np) => Some(np.title),
                StatusMessage::Text { .. } => None,
            })
            .collect()
    }
}

impl StatusSink for RecordingSink {
    fn send(&self, message: StatusMessage) -> Result<(), TransportError> {
        if self.reject_next.swap(false, Ordering::SeqCst) {
            return Err(TransportError::Offline);
        }
        self.messages.lock().unwrap().push(message);
        Ok(())
    }
}

pub(crate) struct FailingSource;

impl StreamSource for FailingSource {
    fn open_stream(&self) -> anyhow::Result<AudioStream> {
        anyhow::bail!("source vanished")
    }
}

pub(crate) fn stream_track(title: &str, source: Arc<dyn StreamSource>) -> Track {
    Track::new(
        TrackInfo {
            title: title.to_string(),
            url: format!("https://example.test/{title}"),
            duration: "3:00".to_string(),
            requester: "tester".to_string(),
            thumbnail: None,
        },
        source,
    )
}

pub(crate) fn track(title: &str) -> Track {
    stream_track(title, Arc::new(MemorySource::new(vec![0u8; 16])))
}
