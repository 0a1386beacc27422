//! Scripted media transport for exercising workers, the registry and the reaper

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use relay_media::error::Result;
use relay_media::{MediaKind, MediaSink, MediaSource, MediaTransport, MediaUnit, StreamInfo, TimeBase, TransportError};
use tokio::sync::mpsc;
use tokio::time::Instant;

use super::outcome::{OutcomeCallback, RelayOutcome};
use super::worker::WorkerConfig;

/// One scripted read result
#[derive(Debug, Clone)]
pub enum Step {
    Unit(MediaUnit),
    Eof,
    Fail(&'static str),
    Panic,
}

/// Behavior of one opened source. Once `steps` run out, reads stall forever.
#[derive(Debug, Clone, Default)]
pub struct Script {
    pub open_error: Option<&'static str>,
    pub stall_open: bool,
    pub negotiate_error: Option<&'static str>,
    pub steps: Vec<Step>,
}

impl Script {
    pub fn with_steps(steps: Vec<Step>) -> Self {
        Self {
            steps,
            ..Default::default()
        }
    }

    /// Delivers one unit and then keeps the session alive
    pub fn streaming() -> Self {
        Self::with_steps(vec![Step::Unit(video(0))])
    }

    pub fn dies_after(units: usize, reason: &'static str) -> Self {
        let mut steps: Vec<_> = (0..units).map(|i| Step::Unit(video(i as i64 * 3_000))).collect();
        steps.push(Step::Fail(reason));
        Self::with_steps(steps)
    }

    pub fn fails_open(reason: &'static str) -> Self {
        Self {
            open_error: Some(reason),
            ..Default::default()
        }
    }

    pub fn fails_negotiation(reason: &'static str) -> Self {
        Self {
            negotiate_error: Some(reason),
            ..Default::default()
        }
    }

    pub fn stalls_open() -> Self {
        Self {
            stall_open: true,
            ..Default::default()
        }
    }
}

/// A video unit stamped in 1/90000
pub fn video(ts: i64) -> MediaUnit {
    MediaUnit::new(0, Bytes::from_static(b"frame")).with_timestamps(Some(ts), Some(ts))
}

/// What the transport observed
#[derive(Debug, Default)]
pub struct Probe {
    opens: Mutex<Vec<(String, Instant)>>,
    sinks: Mutex<Vec<String>>,
    written: Mutex<Vec<(MediaUnit, Instant)>>,
    source_closes: AtomicUsize,
    sink_finishes: AtomicUsize,
}

impl Probe {
    pub fn opens(&self) -> usize {
        self.opens.lock().unwrap().len()
    }

    pub fn open_times(&self) -> Vec<Instant> {
        self.opens.lock().unwrap().iter().map(|(_, at)| *at).collect()
    }

    pub fn sinks(&self) -> Vec<String> {
        self.sinks.lock().unwrap().clone()
    }

    pub fn written(&self) -> Vec<(MediaUnit, Instant)> {
        self.written.lock().unwrap().clone()
    }

    pub fn source_closes(&self) -> usize {
        self.source_closes.load(Ordering::SeqCst)
    }

    pub fn sink_finishes(&self) -> usize {
        self.sink_finishes.load(Ordering::SeqCst)
    }
}

/// Hands out queued scripts in open order, then `fallback` forever
pub struct ScriptedTransport {
    scripts: Mutex<VecDeque<Script>>,
    fallback: Script,
    negotiate_error: Mutex<Option<&'static str>>,
    pub probe: Arc<Probe>,
}

impl ScriptedTransport {
    pub fn new(fallback: Script) -> Arc<Self> {
        Self::queued(Vec::new(), fallback)
    }

    pub fn queued(scripts: Vec<Script>, fallback: Script) -> Arc<Self> {
        Arc::new(Self {
            scripts: Mutex::new(scripts.into()),
            fallback,
            negotiate_error: Mutex::new(None),
            probe: Arc::new(Probe::default()),
        })
    }
}

#[async_trait]
impl MediaTransport for ScriptedTransport {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn open(&self, source_url: &str) -> Result<Box<dyn MediaSource>> {
        self.probe
            .opens
            .lock()
            .unwrap()
            .push((source_url.to_string(), Instant::now()));
        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());

        if script.stall_open {
            std::future::pending::<()>().await;
        }
        if let Some(reason) = script.open_error {
            return Err(TransportError::Open(reason.to_string()));
        }
        *self.negotiate_error.lock().unwrap() = script.negotiate_error;

        Ok(Box::new(ScriptedSource {
            steps: script.steps.into(),
            streams: vec![
                StreamInfo::new(0, MediaKind::Video, TimeBase::MPEG),
                StreamInfo::new(1, MediaKind::Audio, TimeBase::new(1, 48_000)),
            ],
            probe: self.probe.clone(),
        }))
    }

    async fn negotiate_output(
        &self,
        streams: &[StreamInfo],
        sink_url: &str,
        _container_hint: &str,
    ) -> Result<Box<dyn MediaSink>> {
        let failure = self.negotiate_error.lock().unwrap().take();
        if let Some(reason) = failure {
            return Err(TransportError::Negotiate(reason.to_string()));
        }
        self.probe.sinks.lock().unwrap().push(sink_url.to_string());

        let streams = streams
            .iter()
            .map(|stream| StreamInfo::new(stream.index, stream.kind, TimeBase::MILLISECONDS))
            .collect();
        Ok(Box::new(ScriptedSink {
            streams,
            probe: self.probe.clone(),
        }))
    }
}

struct ScriptedSource {
    steps: VecDeque<Step>,
    streams: Vec<StreamInfo>,
    probe: Arc<Probe>,
}

#[async_trait]
impl MediaSource for ScriptedSource {
    fn streams(&self) -> &[StreamInfo] {
        &self.streams
    }

    async fn read_unit(&mut self) -> Result<Option<MediaUnit>> {
        match self.steps.pop_front() {
            Some(Step::Unit(unit)) => Ok(Some(unit)),
            Some(Step::Eof) => Ok(None),
            Some(Step::Fail(reason)) => Err(std::io::Error::other(reason).into()),
            Some(Step::Panic) => panic!("scripted source blew up"),
            None => std::future::pending().await,
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.probe.source_closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct ScriptedSink {
    streams: Vec<StreamInfo>,
    probe: Arc<Probe>,
}

#[async_trait]
impl MediaSink for ScriptedSink {
    fn streams(&self) -> &[StreamInfo] {
        &self.streams
    }

    async fn write_header(&mut self) -> Result<()> {
        Ok(())
    }

    async fn write_unit(&mut self, unit: MediaUnit) -> Result<()> {
        self.probe.written.lock().unwrap().push((unit, Instant::now()));
        Ok(())
    }

    async fn finish(&mut self) -> Result<()> {
        self.probe.sink_finishes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Callback that forwards every outcome into a channel
pub fn collector() -> (OutcomeCallback, mpsc::UnboundedReceiver<RelayOutcome>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let callback: OutcomeCallback = Arc::new(move |outcome| {
        let _ = tx.send(outcome);
    });
    (callback, rx)
}

/// Worker settings with an io timeout long enough that stalled reads only end on stop
pub fn patient_config() -> WorkerConfig {
    WorkerConfig {
        io_timeout: Duration::from_secs(24 * 3_600),
        ..WorkerConfig::default()
    }
}
