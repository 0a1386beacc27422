//! Relay worker: one task per session driving read → pace → write
//!
//! ```text
//! Idle ──arm──► Connecting ──first unit──► Streaming ──► Terminated
//!                   │                                       ▲
//!                   └──── open / negotiate / header error ──┘
//! ```
//!
//! The worker reports through its [`OutcomeCallback`]:
//! - `Started` (0) once, when the first unit arrives
//! - `FatalSetup` (-1) for any failure before that point
//! - `DiedAfterStreaming` (-2) for any failure after it
//! - nothing when it was stopped
//!
//! Every transport call is raced against the stop token and bounded by a
//! timeout, so a stop is observed within one call and a stuck peer turns into
//! a failure instead of a hung task.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use relay_media::{rescale, MediaKind, MediaSink, MediaSource, MediaTransport, MediaUnit, StreamInfo, TimeBase};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::outcome::{Attempt, OutcomeCallback, RelayOutcome};
use super::state::{SessionState, SessionStateCell};

/// Tunables shared by every worker
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Container hint passed to output negotiation
    pub container: String,
    /// Bound on opening the source, negotiating the sink and writing the header
    pub setup_timeout: Duration,
    /// Bound on every read and write while streaming
    pub io_timeout: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            container: "flv".to_string(),
            setup_timeout: Duration::from_secs(10),
            io_timeout: Duration::from_secs(10),
        }
    }
}

/// How a worker's task ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerExit {
    /// Never armed: another start won the registry race
    Discarded,
    /// Stopped on request
    Stopped,
    FatalSetup,
    DiedAfterStreaming,
    /// The task was aborted by the runtime
    Aborted,
}

#[derive(Debug, Clone, Copy)]
enum Phase {
    Connecting,
    Streaming,
    Terminated,
}

enum Termination {
    Stopped,
    Failed(String),
}

struct Arming {
    sink_url: String,
    attempt: Attempt,
}

/// Releases an idle worker once its session is registered.
/// Dropping it discards the worker.
pub struct WorkerArm {
    tx: oneshot::Sender<Arming>,
}

impl WorkerArm {
    pub fn release(self, sink_url: String, attempt: Attempt) {
        if self.tx.send(Arming { sink_url, attempt }).is_err() {
            tracing::debug!("Relay worker went away before it was armed");
        }
    }
}

/// Owning handle to a spawned worker
pub struct WorkerHandle {
    cancel: CancellationToken,
    join: JoinHandle<WorkerExit>,
    state: Arc<SessionStateCell>,
}

impl WorkerHandle {
    pub fn state(&self) -> SessionState {
        self.state.get()
    }

    /// Ask the worker to stop. Idempotent and non-blocking; `join` waits.
    pub fn stop(&self) {
        if self.cancel.is_cancelled() {
            return;
        }
        if !self.state.advance(SessionState::Starting, SessionState::Stopping) {
            self.state.advance(SessionState::Streaming, SessionState::Stopping);
        }
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Wait for the worker's task to end
    pub async fn join(self) -> WorkerExit {
        match self.join.await {
            Ok(exit) => exit,
            Err(e) => {
                tracing::error!("Relay worker task failed: {}", e);
                WorkerExit::Aborted
            }
        }
    }
}

/// One relay from a source URL to a sink URL
pub struct RelayWorker {
    source_url: String,
    transport: Arc<dyn MediaTransport>,
    config: Arc<WorkerConfig>,
    on_result: OutcomeCallback,
}

impl RelayWorker {
    pub fn new(
        source_url: impl Into<String>,
        transport: Arc<dyn MediaTransport>,
        config: Arc<WorkerConfig>,
        on_result: OutcomeCallback,
    ) -> Self {
        Self {
            source_url: source_url.into(),
            transport,
            config,
            on_result,
        }
    }

    /// Spawn the worker's task. It stays idle until the returned arm is released.
    pub fn spawn(self) -> (WorkerHandle, WorkerArm) {
        let cancel = CancellationToken::new();
        let state = Arc::new(SessionStateCell::new(SessionState::Starting));
        let (tx, rx) = oneshot::channel();

        let join = tokio::spawn(self.run(rx, cancel.clone(), state.clone()));

        (WorkerHandle { cancel, join, state }, WorkerArm { tx })
    }

    async fn run(
        self,
        arm: oneshot::Receiver<Arming>,
        cancel: CancellationToken,
        state: Arc<SessionStateCell>,
    ) -> WorkerExit {
        let Arming { sink_url, attempt } = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                state.set(SessionState::Dead);
                return WorkerExit::Stopped;
            }
            armed = arm => match armed {
                Ok(arming) => arming,
                Err(_) => {
                    state.set(SessionState::Dead);
                    return WorkerExit::Discarded;
                }
            },
        };

        let streamed = AtomicBool::new(false);
        let relay = AssertUnwindSafe(self.relay(&sink_url, attempt, &cancel, &state, &streamed))
            .catch_unwind()
            .await;
        let termination = match relay {
            Ok(termination) => termination,
            Err(panic) => Termination::Failed(format!("relay worker panicked: {}", panic_message(&*panic))),
        };

        state.set(SessionState::Dead);
        self.enter(Phase::Terminated, attempt);

        let reason = match termination {
            Termination::Failed(reason) if !cancel.is_cancelled() => reason,
            _ => {
                tracing::info!(source = %self.source_url, generation = attempt.generation, "Relay stopped");
                return WorkerExit::Stopped;
            }
        };

        if streamed.load(Ordering::Acquire) {
            tracing::error!(
                source = %self.source_url,
                sink = %sink_url,
                generation = attempt.generation,
                "Relay died after streaming: {}",
                reason
            );
            self.report(RelayOutcome::DiedAfterStreaming {
                sink_url,
                reason,
                attempt,
            });
            WorkerExit::DiedAfterStreaming
        } else {
            tracing::error!(
                source = %self.source_url,
                sink = %sink_url,
                generation = attempt.generation,
                "Relay failed to start: {}",
                reason
            );
            self.report(RelayOutcome::FatalSetup {
                sink_url,
                reason,
                attempt,
            });
            WorkerExit::FatalSetup
        }
    }

    /// Acquire source and sink, pump, then release both exactly once
    async fn relay(
        &self,
        sink_url: &str,
        attempt: Attempt,
        cancel: &CancellationToken,
        state: &SessionStateCell,
        streamed: &AtomicBool,
    ) -> Termination {
        self.enter(Phase::Connecting, attempt);
        let setup = self.config.setup_timeout;

        let mut source = match guarded(cancel, setup, "open input", self.transport.open(&self.source_url)).await {
            Ok(source) => source,
            Err(termination) => return termination,
        };

        let inputs = source.streams().to_vec();
        let negotiated = guarded(
            cancel,
            setup,
            "negotiate output",
            self.transport
                .negotiate_output(&inputs, sink_url, &self.config.container),
        )
        .await;
        let mut sink = match negotiated {
            Ok(sink) => sink,
            Err(termination) => {
                self.close_source(source.as_mut()).await;
                return termination;
            }
        };

        let termination = self
            .pump(source.as_mut(), sink.as_mut(), sink_url, attempt, cancel, state, streamed)
            .await;

        self.finish_sink(sink.as_mut()).await;
        self.close_source(source.as_mut()).await;
        termination
    }

    #[allow(clippy::too_many_arguments)]
    async fn pump(
        &self,
        source: &mut dyn MediaSource,
        sink: &mut dyn MediaSink,
        sink_url: &str,
        attempt: Attempt,
        cancel: &CancellationToken,
        state: &SessionStateCell,
        streamed: &AtomicBool,
    ) -> Termination {
        if let Err(termination) = guarded(cancel, self.config.setup_timeout, "write header", sink.write_header()).await {
            return termination;
        }

        let inputs = source.streams().to_vec();
        let outputs = sink.streams().to_vec();
        let io = self.config.io_timeout;
        let mut pacer = Pacer::default();

        loop {
            let mut unit = match guarded(cancel, io, "read unit", source.read_unit()).await {
                Ok(Some(unit)) => unit,
                Ok(None) => return Termination::Failed("end of stream".to_string()),
                Err(termination) => return termination,
            };

            if !streamed.swap(true, Ordering::AcqRel) {
                state.advance(SessionState::Starting, SessionState::Streaming);
                self.enter(Phase::Streaming, attempt);
                self.report(RelayOutcome::Started {
                    sink_url: sink_url.to_string(),
                    attempt,
                });
            }

            let (Some(input), Some(output)) = (
                find_stream(&inputs, unit.stream_index),
                find_stream(&outputs, unit.stream_index),
            ) else {
                return Termination::Failed(format!("unit for unknown stream {}", unit.stream_index));
            };

            if input.kind == MediaKind::Video {
                if let Some(delay) = pacer.delay_for(&unit, input.time_base) {
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Termination::Stopped,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }

            unit.rescale(input.time_base, output.time_base);

            if let Err(termination) = guarded(cancel, io, "write unit", sink.write_unit(unit)).await {
                return termination;
            }
        }
    }

    async fn finish_sink(&self, sink: &mut dyn MediaSink) {
        match tokio::time::timeout(self.config.io_timeout, sink.finish()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!(source = %self.source_url, "Closing sink failed: {}", e),
            Err(_) => tracing::warn!(source = %self.source_url, "Closing sink timed out"),
        }
    }

    async fn close_source(&self, source: &mut dyn MediaSource) {
        match tokio::time::timeout(self.config.io_timeout, source.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!(source = %self.source_url, "Closing source failed: {}", e),
            Err(_) => tracing::warn!(source = %self.source_url, "Closing source timed out"),
        }
    }

    fn enter(&self, phase: Phase, attempt: Attempt) {
        tracing::debug!(
            source = %self.source_url,
            generation = attempt.generation,
            "Relay worker {:?}",
            phase
        );
    }

    fn report(&self, outcome: RelayOutcome) {
        let code = outcome.code();
        let delivered = std::panic::catch_unwind(AssertUnwindSafe(|| (self.on_result)(outcome)));
        if delivered.is_err() {
            tracing::error!(source = %self.source_url, "Result callback panicked on code {}", code);
        }
    }
}

/// Race a transport call against the stop token and a deadline
async fn guarded<T, F>(
    cancel: &CancellationToken,
    limit: Duration,
    what: &str,
    call: F,
) -> Result<T, Termination>
where
    F: Future<Output = relay_media::error::Result<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Termination::Stopped),
        result = tokio::time::timeout(limit, call) => match result {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(Termination::Failed(format!("{} failed: {}", what, e))),
            Err(_) => Err(Termination::Failed(format!("{} timed out after {:?}", what, limit))),
        },
    }
}

fn find_stream(streams: &[StreamInfo], index: usize) -> Option<&StreamInfo> {
    streams.iter().find(|stream| stream.index == index)
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Holds video to real-time rate against the first paced unit
#[derive(Debug, Default)]
struct Pacer {
    origin: Option<(Instant, i64)>,
}

impl Pacer {
    fn delay_for(&mut self, unit: &MediaUnit, time_base: TimeBase) -> Option<Duration> {
        let due = rescale(unit.clock()?, time_base, TimeBase::MICROSECONDS);
        let (started, base) = *self.origin.get_or_insert_with(|| (Instant::now(), due));

        let elapsed = i64::try_from(started.elapsed().as_micros()).unwrap_or(i64::MAX);
        let ahead = due.saturating_sub(base).saturating_sub(elapsed);
        (ahead > 0).then(|| Duration::from_micros(ahead as u64))
    }
}
