use std::{
    collections::HashMap,
    hash::Hash,
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use chat_core::{ContextQuery, ContextQueryResult, LinkPreview, MediaRecordingMode, Resolution};
use tokio::sync::oneshot;
use tracing::{debug, trace};

use crate::{
    AudioRecorder, ContextQueryResolver, LinkPreviewResolver, PlatformError, RecordedAudio,
    RecordedVideo, RecorderHandle, RecorderProvider, VideoRecorder, respond_after,
};

/// Resolver answering from a local cache immediately and from a slower
/// "remote" table after a latency.
pub struct CachedResolver<K, V> {
    cached: HashMap<K, V>,
    remote: HashMap<K, V>,
    latency: Duration,
}

impl<K, V> CachedResolver<K, V>
where
    K: Eq + Hash,
    V: Clone + Send + 'static,
{
    pub fn new(latency: Duration) -> Self {
        Self {
            cached: HashMap::new(),
            remote: HashMap::new(),
            latency,
        }
    }

    pub fn with_cached(mut self, key: K, value: V) -> Self {
        self.cached.insert(key, value);
        self
    }

    pub fn with_remote(mut self, key: K, value: V) -> Self {
        self.remote.insert(key, value);
        self
    }

    fn lookup(&self, key: &K) -> Resolution<Option<V>> {
        if let Some(value) = self.cached.get(key) {
            return Resolution::Immediate(Some(value.clone()));
        }
        match self.remote.get(key) {
            Some(value) => respond_after(Some(self.latency), Some(value.clone())),
            None => Resolution::Immediate(None),
        }
    }
}

impl ContextQueryResolver for CachedResolver<ContextQuery, ContextQueryResult> {
    fn resolve(&self, query: &ContextQuery) -> Resolution<Option<ContextQueryResult>> {
        self.lookup(query)
    }
}

impl LinkPreviewResolver for CachedResolver<String, LinkPreview> {
    fn resolve(&self, url: &str) -> Resolution<Option<LinkPreview>> {
        self.lookup(&url.to_owned())
    }
}

/// Resolver whose answers are released by hand, for ordering-sensitive tests.
pub struct GatedResolver<K, V> {
    waiting: Mutex<Vec<(K, oneshot::Sender<V>)>>,
}

impl<K, V> Default for GatedResolver<K, V> {
    fn default() -> Self {
        Self {
            waiting: Mutex::new(Vec::new()),
        }
    }
}

impl<K, V> GatedResolver<K, V>
where
    K: PartialEq + Clone,
    V: Send + 'static,
{
    fn park(&self, key: K) -> Resolution<V> {
        let (tx, rx) = oneshot::channel();
        self.waiting
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((key, tx));
        Resolution::pending(async move {
            match rx.await {
                Ok(value) => value,
                Err(_) => std::future::pending().await,
            }
        })
    }

    /// Answer the oldest parked request for `key`; `false` if none is waiting.
    pub fn release(&self, key: &K, value: V) -> bool {
        let mut waiting = self.waiting.lock().unwrap_or_else(PoisonError::into_inner);
        waiting.retain(|(_, tx)| !tx.is_closed());
        let Some(position) = waiting.iter().position(|(parked, _)| parked == key) else {
            return false;
        };
        let (_, tx) = waiting.remove(position);
        tx.send(value).is_ok()
    }

    /// Keys still waiting on an answer whose requester is alive.
    pub fn parked(&self) -> Vec<K> {
        let waiting = self.waiting.lock().unwrap_or_else(PoisonError::into_inner);
        waiting
            .iter()
            .filter(|(_, tx)| !tx.is_closed())
            .map(|(key, _)| key.clone())
            .collect()
    }
}

impl ContextQueryResolver for GatedResolver<ContextQuery, Option<ContextQueryResult>> {
    fn resolve(&self, query: &ContextQuery) -> Resolution<Option<ContextQueryResult>> {
        self.park(query.clone())
    }
}

impl LinkPreviewResolver for GatedResolver<String, Option<LinkPreview>> {
    fn resolve(&self, url: &str) -> Resolution<Option<LinkPreview>> {
        self.park(url.to_owned())
    }
}

/// Observable recorder interaction, in call order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderCall {
    Acquired(MediaRecordingMode),
    Started,
    Locked,
    Stopped,
    Completed,
    Discarded,
    Released,
}

/// Behaviour of the scripted recorders.
#[derive(Debug, Clone)]
pub struct RecorderScript {
    /// Length of the take the recorders pretend to capture.
    pub duration: Duration,
    pub waveform: Option<Vec<u8>>,
    pub video_can_trim: bool,
    pub unavailable: bool,
    pub latency: Option<Duration>,
}

impl Default for RecorderScript {
    fn default() -> Self {
        Self {
            duration: Duration::from_millis(3_200),
            waveform: Some(vec![0, 8, 16, 31, 16, 8, 0]),
            video_can_trim: false,
            unavailable: false,
            latency: None,
        }
    }
}

type CallLog = Arc<Mutex<Vec<RecorderCall>>>;

fn log_call(log: &CallLog, call: RecorderCall) {
    trace!(?call, "scripted recorder call");
    log.lock().unwrap_or_else(PoisonError::into_inner).push(call);
}

/// Recorder provider that hands out scripted capture handles.
#[derive(Clone)]
pub struct ScriptedRecorderProvider {
    script: Arc<Mutex<RecorderScript>>,
    log: CallLog,
}

impl ScriptedRecorderProvider {
    pub fn new(script: RecorderScript) -> Self {
        Self {
            script: Arc::new(Mutex::new(script)),
            log: Arc::default(),
        }
    }

    pub fn set_script(&self, script: RecorderScript) {
        *self.script.lock().unwrap_or_else(PoisonError::into_inner) = script;
    }

    pub fn calls(&self) -> Vec<RecorderCall> {
        self.log.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl RecorderProvider for ScriptedRecorderProvider {
    fn acquire(&self, mode: MediaRecordingMode) -> Resolution<Result<RecorderHandle, PlatformError>> {
        let script = self
            .script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if script.unavailable {
            debug!(?mode, "scripted recorder unavailable");
            return respond_after(
                script.latency,
                Err(PlatformError::Unavailable(format!("{mode:?} capture device busy"))),
            );
        }

        log_call(&self.log, RecorderCall::Acquired(mode));
        let latency = script.latency;
        let capture = ScriptedCapture {
            script,
            log: Arc::clone(&self.log),
            started: false,
            stopped: false,
        };
        let handle = match mode {
            MediaRecordingMode::Audio => RecorderHandle::Audio(Box::new(capture)),
            MediaRecordingMode::Video => RecorderHandle::Video(Box::new(capture)),
        };
        respond_after(latency, Ok(handle))
    }
}

struct ScriptedCapture {
    script: RecorderScript,
    log: CallLog,
    started: bool,
    stopped: bool,
}

impl ScriptedCapture {
    fn elapsed(&self) -> Duration {
        if self.started {
            self.script.duration
        } else {
            Duration::ZERO
        }
    }

    fn payload(&self) -> Vec<u8> {
        let len = (self.script.duration.as_millis() / 10) as usize;
        vec![0x4f; len]
    }
}

impl AudioRecorder for ScriptedCapture {
    fn start(&mut self) {
        self.started = true;
        log_call(&self.log, RecorderCall::Started);
    }

    fn stop(&mut self) {
        if !self.stopped {
            self.stopped = true;
            log_call(&self.log, RecorderCall::Stopped);
        }
    }

    fn elapsed(&self) -> Duration {
        ScriptedCapture::elapsed(self)
    }

    fn take_recorded(&mut self) -> Option<RecordedAudio> {
        if !self.started {
            return None;
        }
        self.started = false;
        Some(RecordedAudio {
            data: self.payload(),
            duration: self.script.duration,
            waveform: self.script.waveform.clone(),
        })
    }
}

impl VideoRecorder for ScriptedCapture {
    fn start(&mut self) {
        self.started = true;
        log_call(&self.log, RecorderCall::Started);
    }

    fn lock(&mut self) {
        log_call(&self.log, RecorderCall::Locked);
    }

    fn stop_soft(&mut self) -> bool {
        self.stopped = true;
        log_call(&self.log, RecorderCall::Stopped);
        self.script.video_can_trim
    }

    fn complete(&mut self) -> Option<RecordedVideo> {
        if !self.started {
            return None;
        }
        self.started = false;
        log_call(&self.log, RecorderCall::Completed);
        Some(RecordedVideo {
            data: self.payload(),
            duration: self.script.duration,
        })
    }

    fn discard(&mut self) {
        self.started = false;
        log_call(&self.log, RecorderCall::Discarded);
    }

    fn elapsed(&self) -> Duration {
        ScriptedCapture::elapsed(self)
    }
}

impl Drop for ScriptedCapture {
    fn drop(&mut self) {
        log_call(&self.log, RecorderCall::Released);
    }
}
