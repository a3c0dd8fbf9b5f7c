//! `PitchEngine`: top-level lifecycle controller.
//!
//! ## Lifecycle
//!
//! ```text
//! PitchEngine::new(config)   → config validated, status = Idle
//!     └─► start()            → device open, worker spawned, status = Listening
//!         └─► stop()         → running=false, worker joined, status = Stopped
//! ```
//!
//! `start()`/`stop()` return an error in the wrong state rather than panicking.
//!
//! ## Threading
//!
//! `cpal::Stream` is `!Send` on Windows/macOS (COM / CoreAudio thread affinity).
//! `AudioCapture` is therefore created *inside* the worker thread so it never
//! crosses a thread boundary. A sync oneshot channel propagates any open-device
//! errors back to the `start()` caller.
//!
//! The worker owns all analysis state. Runtime changes (reference pitch,
//! voice range) travel to it as [`EngineCommand`]s.

pub mod analyzer;
pub mod pipeline;

use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc,
};
use std::thread::JoinHandle;

use crossbeam_channel::Sender;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{info, warn};

pub use analyzer::{FrameAnalyzer, FrameOutcome, SkipReason};
pub use pipeline::{DiagnosticsSnapshot, EngineCommand, PipelineDiagnostics};

use crate::{
    audio::{AudioCapture, CaptureRequest},
    buffering::{create_buffer_pool, create_frame_queue, FrameConsumer, FrameProducer},
    config::AnalysisConfig,
    error::{Result, VocalisError},
    ipc::events::{
        AudioActivityEvent, EngineStatus, EngineStatusEvent, PitchEvent, VoiceRangeEvent,
    },
    range::VoiceRangeProfile,
};

/// Broadcast channel capacity: 256 events buffered for slow consumers.
const BROADCAST_CAP: usize = 256;
/// Frame buffers circulating between the capture callback and the worker.
const FRAME_POOL_DEPTH: usize = 8;

/// Where the worker gets its frames from.
enum FrameSource {
    /// Open a cpal input device (by name, or the default).
    Device(Option<String>),
    /// Frames are pushed by the caller through the returned producer.
    External(FrameConsumer),
}

/// The top-level engine handle.
///
/// `PitchEngine` is `Send + Sync`: all fields use interior mutability.
/// Wrap in `Arc<PitchEngine>` to share with event-forwarding tasks.
pub struct PitchEngine {
    config: Mutex<AnalysisConfig>,
    /// Manual range applied to the next worker; `None` means auto detection.
    manual_range: Mutex<Option<VoiceRangeProfile>>,
    /// Command sender for the live worker.
    commands: Mutex<Option<Sender<EngineCommand>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    /// `true` while capture + pipeline are active.
    running: Arc<AtomicBool>,
    status: Arc<Mutex<EngineStatus>>,
    result_tx: broadcast::Sender<PitchEvent>,
    range_tx: broadcast::Sender<VoiceRangeEvent>,
    status_tx: broadcast::Sender<EngineStatusEvent>,
    activity_tx: broadcast::Sender<AudioActivityEvent>,
    /// Monotonically increasing pitch event sequence counter.
    seq: Arc<AtomicU64>,
    diagnostics: Arc<PipelineDiagnostics>,
}

impl PitchEngine {
    /// Create a new engine. Does not start capturing.
    ///
    /// # Errors
    /// `VocalisError::InvalidConfig` when `config` does not validate.
    pub fn new(config: AnalysisConfig) -> Result<Self> {
        config.validate()?;

        let (result_tx, _) = broadcast::channel(BROADCAST_CAP);
        let (range_tx, _) = broadcast::channel(BROADCAST_CAP);
        let (status_tx, _) = broadcast::channel(BROADCAST_CAP);
        let (activity_tx, _) = broadcast::channel(BROADCAST_CAP);

        Ok(Self {
            config: Mutex::new(config),
            manual_range: Mutex::new(None),
            commands: Mutex::new(None),
            worker: Mutex::new(None),
            running: Arc::new(AtomicBool::new(false)),
            status: Arc::new(Mutex::new(EngineStatus::Idle)),
            result_tx,
            range_tx,
            status_tx,
            activity_tx,
            seq: Arc::new(AtomicU64::new(0)),
            diagnostics: Arc::new(PipelineDiagnostics::default()),
        })
    }

    /// Start audio capture on the default input device.
    ///
    /// Blocks until the audio device is confirmed open (or fails), then returns.
    ///
    /// # Errors
    /// - `VocalisError::AlreadyRunning` if already started.
    /// - `VocalisError::NoDefaultInputDevice` / `VocalisError::AudioStream` on device error.
    /// - `VocalisError::CaptureUnavailable` without the `audio-cpal` feature.
    pub fn start(&self) -> Result<()> {
        self.start_with_device(None)
    }

    /// Start the engine using a preferred input device name.
    ///
    /// If `preferred_input_device` is `None`, default input selection is used.
    pub fn start_with_device(&self, preferred_input_device: Option<String>) -> Result<()> {
        self.launch(FrameSource::Device(preferred_input_device))
            .map(|_| ())
    }

    /// Start the worker without a capture device. Frames pushed through the
    /// returned producer are analyzed exactly like captured ones.
    pub fn start_with_frames(&self) -> Result<FrameProducer> {
        let (producer, consumer) = create_frame_queue();
        self.launch(FrameSource::External(consumer))?;
        Ok(producer)
    }

    /// Stop capture and join the worker.
    ///
    /// # Errors
    /// - `VocalisError::NotRunning` if not currently running.
    pub fn stop(&self) -> Result<()> {
        let was_running = self.running.swap(false, Ordering::SeqCst);
        *self.commands.lock() = None;
        self.join_worker();

        if !was_running {
            return Err(VocalisError::NotRunning);
        }
        self.set_status(EngineStatus::Stopped, None);
        info!("engine stopped");
        Ok(())
    }

    /// Change the A4 reference; a running worker applies it before its next frame.
    ///
    /// # Errors
    /// `VocalisError::InvalidConfig` outside 400–480 Hz.
    pub fn set_reference_frequency(&self, hz: f32) -> Result<()> {
        {
            let mut config = self.config.lock();
            let mut candidate = config.clone();
            candidate.reference_frequency = hz;
            candidate.validate()?;
            *config = candidate;
        }
        self.send_command(EngineCommand::SetReferenceFrequency(hz));
        Ok(())
    }

    /// Manually select a voice range by name, disabling auto detection.
    ///
    /// # Errors
    /// `VocalisError::UnknownVoiceRange` when no profile has that name.
    pub fn set_voice_range(&self, name: &str) -> Result<VoiceRangeProfile> {
        let profile = VoiceRangeProfile::find(name)
            .ok_or_else(|| VocalisError::UnknownVoiceRange(name.to_string()))?;
        *self.manual_range.lock() = Some(profile.clone());
        self.send_command(EngineCommand::SetVoiceRange(profile.name.clone()));
        Ok(profile)
    }

    /// Resume learning the voice range from sung pitches.
    pub fn enable_auto_range(&self) {
        *self.manual_range.lock() = None;
        self.config.lock().auto_range_detection = true;
        self.send_command(EngineCommand::EnableAutoRange);
    }

    pub fn config(&self) -> AnalysisConfig {
        self.config.lock().clone()
    }

    /// Current engine status (snapshot).
    pub fn status(&self) -> EngineStatus {
        *self.status.lock()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Subscribe to display-worthy pitch results.
    pub fn subscribe_results(&self) -> broadcast::Receiver<PitchEvent> {
        self.result_tx.subscribe()
    }

    /// Subscribe to active voice-range changes (auto or manual).
    pub fn subscribe_voice_range(&self) -> broadcast::Receiver<VoiceRangeEvent> {
        self.range_tx.subscribe()
    }

    /// Subscribe to live status change events.
    pub fn subscribe_status(&self) -> broadcast::Receiver<EngineStatusEvent> {
        self.status_tx.subscribe()
    }

    /// Subscribe to per-frame level / voice classification events.
    pub fn subscribe_activity(&self) -> broadcast::Receiver<AudioActivityEvent> {
        self.activity_tx.subscribe()
    }

    /// Snapshot of pipeline counters for observability.
    pub fn diagnostics_snapshot(&self) -> DiagnosticsSnapshot {
        self.diagnostics.snapshot()
    }

    // ── Internal helpers ─────────────────────────────────────────────────────

    fn launch(&self, source: FrameSource) -> Result<()> {
        if self.running.load(Ordering::SeqCst) {
            return Err(VocalisError::AlreadyRunning);
        }
        // A worker that ended on a stream error is still joinable.
        self.join_worker();

        let config = self.config.lock().clone();
        let mut analyzer = FrameAnalyzer::new(config.clone())?;
        let manual_range = self.manual_range.lock().clone();
        if let Some(profile) = &manual_range {
            analyzer.set_voice_range(&profile.name)?;
        }

        self.diagnostics.reset();
        self.running.store(true, Ordering::SeqCst);
        self.set_status(EngineStatus::Listening, None);

        let (command_tx, command_rx) = crossbeam_channel::unbounded();

        // Clone all Arc-wrapped state before moving into the closure.
        let running = Arc::clone(&self.running);
        let result_tx = self.result_tx.clone();
        let range_tx = self.range_tx.clone();
        let activity_tx = self.activity_tx.clone();
        let seq = Arc::clone(&self.seq);
        let diagnostics = Arc::clone(&self.diagnostics);
        let on_error = self.stream_error_handler();

        // Sync oneshot: worker signals open success/failure to the caller.
        // Carries the actual capture sample rate on success.
        let (open_tx, open_rx) = std::sync::mpsc::channel::<Result<u32>>();

        let spawned = std::thread::Builder::new()
            .name("vocalis-pipeline".into())
            .spawn(move || {
                // ── Open audio device (must happen on THIS thread: cpal::Stream is !Send) ──
                let (consumer, capture, recycle) = match source {
                    FrameSource::External(consumer) => {
                        let _ = open_tx.send(Ok(config.sample_rate));
                        (consumer, None, None)
                    }
                    FrameSource::Device(device_name) => {
                        let (producer, consumer) = create_frame_queue();
                        let (recycle, spares) =
                            create_buffer_pool(config.frame_size, FRAME_POOL_DEPTH);
                        let request = CaptureRequest {
                            device_name,
                            sample_rate: config.sample_rate,
                            channels: config.channels,
                            frame_size: config.frame_size,
                        };
                        match AudioCapture::open(
                            &request,
                            producer,
                            spares,
                            Arc::clone(&running),
                            on_error,
                        ) {
                            Ok(capture) => {
                                let _ = open_tx.send(Ok(capture.sample_rate));
                                (consumer, Some(capture), Some(recycle))
                            }
                            Err(e) => {
                                let _ = open_tx.send(Err(e));
                                running.store(false, Ordering::SeqCst);
                                return;
                            }
                        }
                    }
                };

                pipeline::run(pipeline::PipelineContext {
                    analyzer,
                    consumer,
                    recycle,
                    commands: command_rx,
                    running,
                    result_tx,
                    range_tx,
                    activity_tx,
                    seq,
                    diagnostics,
                });

                // Stream drops here, releasing the audio device on this thread.
                if let Some(capture) = capture {
                    capture.stop();
                }
            });

        let handle = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                self.set_status(EngineStatus::Error, Some(e.to_string()));
                return Err(VocalisError::Io(e));
            }
        };

        // Block until device open is confirmed (receives actual sample rate).
        match open_rx.recv() {
            Ok(Ok(rate)) => {
                *self.commands.lock() = Some(command_tx);
                *self.worker.lock() = Some(handle);
                info!(capture_rate = rate, "engine started, listening");
                if let Some(profile) = manual_range {
                    let _ = self.range_tx.send(VoiceRangeEvent {
                        profile,
                        auto_detected: false,
                    });
                }
                Ok(())
            }
            Ok(Err(e)) => {
                let _ = handle.join();
                self.running.store(false, Ordering::SeqCst);
                self.set_status(EngineStatus::Error, Some(e.to_string()));
                Err(e)
            }
            Err(_) => {
                // Channel closed before a message was sent: the worker panicked.
                let _ = handle.join();
                self.running.store(false, Ordering::SeqCst);
                self.set_status(EngineStatus::Error, Some("pipeline failed to start".into()));
                Err(VocalisError::Other(anyhow::anyhow!(
                    "pipeline worker died unexpectedly"
                )))
            }
        }
    }

    /// Stream errors force the engine to stopped and report `Error`.
    fn stream_error_handler(&self) -> crate::audio::StreamErrorHandler {
        let running = Arc::clone(&self.running);
        let status = Arc::clone(&self.status);
        let status_tx = self.status_tx.clone();
        Box::new(move |detail: String| {
            if running.swap(false, Ordering::SeqCst) {
                *status.lock() = EngineStatus::Error;
                let _ = status_tx.send(EngineStatusEvent {
                    status: EngineStatus::Error,
                    detail: Some(detail),
                });
            }
        })
    }

    fn send_command(&self, command: EngineCommand) {
        if let Some(tx) = self.commands.lock().as_ref() {
            if tx.send(command).is_err() {
                warn!("pipeline worker is gone; command dropped");
            }
        }
    }

    fn join_worker(&self) {
        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                warn!("pipeline worker panicked");
            }
        }
    }

    fn set_status(&self, new_status: EngineStatus, detail: Option<String>) {
        *self.status.lock() = new_status;
        let _ = self.status_tx.send(EngineStatusEvent {
            status: new_status,
            detail,
        });
    }
}

impl Drop for PitchEngine {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        self.join_worker();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::f32::consts::PI;
    use std::thread;
    use std::time::{Duration, Instant};

    use tokio::sync::broadcast::error::TryRecvError;

    use crate::buffering::AudioFrame;
    use crate::pitch::PitchClass;

    const SAMPLE_RATE: u32 = 8_000;
    const FRAME: usize = 8_192;

    fn config() -> AnalysisConfig {
        AnalysisConfig {
            sample_rate: SAMPLE_RATE,
            frame_size: FRAME,
            required_stable_readings: 1,
            ..AnalysisConfig::default()
        }
    }

    fn sine(freq: f32) -> Vec<f32> {
        (0..FRAME)
            .map(|i| 0.5 * (2.0 * PI * freq * i as f32 / SAMPLE_RATE as f32).sin())
            .collect()
    }

    fn recv_with_timeout<T: Clone>(rx: &mut broadcast::Receiver<T>, timeout: Duration) -> T {
        let start = Instant::now();
        loop {
            match rx.try_recv() {
                Ok(ev) => return ev,
                Err(TryRecvError::Empty) => {
                    if start.elapsed() >= timeout {
                        panic!("timed out waiting for event");
                    }
                    thread::sleep(Duration::from_millis(5));
                }
                Err(TryRecvError::Lagged(_)) => continue,
                Err(TryRecvError::Closed) => panic!("channel closed unexpectedly"),
            }
        }
    }

    #[test]
    fn new_rejects_invalid_config() {
        let result = PitchEngine::new(AnalysisConfig {
            frame_size: 16,
            ..AnalysisConfig::default()
        });
        assert!(matches!(
            result,
            Err(VocalisError::InvalidConfig { field: "frameSize", .. })
        ));
    }

    #[test]
    fn stop_when_idle_is_not_running() {
        let engine = PitchEngine::new(config()).unwrap();
        assert_eq!(engine.status(), EngineStatus::Idle);
        assert!(matches!(engine.stop(), Err(VocalisError::NotRunning)));
    }

    #[test]
    fn external_frames_flow_to_subscribers() {
        let engine = PitchEngine::new(config()).unwrap();
        let mut results = engine.subscribe_results();
        let mut statuses = engine.subscribe_status();

        let producer = engine.start_with_frames().unwrap();
        assert_eq!(engine.status(), EngineStatus::Listening);
        assert_eq!(
            recv_with_timeout(&mut statuses, Duration::from_secs(1)).status,
            EngineStatus::Listening
        );
        assert!(matches!(
            engine.start_with_frames(),
            Err(VocalisError::AlreadyRunning)
        ));

        producer.send(AudioFrame::new(sine(440.0), SAMPLE_RATE)).unwrap();
        let event = recv_with_timeout(&mut results, Duration::from_secs(5));
        assert_eq!(event.result.note.note, PitchClass::A);
        assert_eq!(event.result.note.octave, 4);

        engine.stop().unwrap();
        assert_eq!(engine.status(), EngineStatus::Stopped);
        assert!(matches!(engine.stop(), Err(VocalisError::NotRunning)));
        assert_eq!(engine.diagnostics_snapshot().results_emitted, 1);
    }

    #[test]
    fn runtime_reference_change_reaches_worker() {
        let engine = PitchEngine::new(config()).unwrap();
        let mut results = engine.subscribe_results();
        let producer = engine.start_with_frames().unwrap();

        engine.set_reference_frequency(466.16).unwrap();
        producer.send(AudioFrame::new(sine(440.0), SAMPLE_RATE)).unwrap();

        let event = recv_with_timeout(&mut results, Duration::from_secs(5));
        assert_eq!(event.result.note.note, PitchClass::GSharp);
        engine.stop().unwrap();
    }

    #[test]
    fn invalid_reference_is_rejected_without_change() {
        let engine = PitchEngine::new(config()).unwrap();
        assert!(engine.set_reference_frequency(500.0).is_err());
        assert_eq!(engine.config().reference_frequency, 440.0);
        engine.set_reference_frequency(432.0).unwrap();
        assert_eq!(engine.config().reference_frequency, 432.0);
    }

    #[test]
    fn manual_range_carries_into_next_start() {
        let engine = PitchEngine::new(config()).unwrap();
        assert!(matches!(
            engine.set_voice_range("Baritone"),
            Err(VocalisError::UnknownVoiceRange(_))
        ));
        let profile = engine.set_voice_range("alto").unwrap();
        assert_eq!(profile.name, "Alto");

        let mut results = engine.subscribe_results();
        let mut ranges = engine.subscribe_voice_range();
        let producer = engine.start_with_frames().unwrap();
        let announced = recv_with_timeout(&mut ranges, Duration::from_secs(5));
        assert_eq!(announced.profile, profile);
        assert!(!announced.auto_detected);
        producer.send(AudioFrame::new(sine(440.0), SAMPLE_RATE)).unwrap();
        let event = recv_with_timeout(&mut results, Duration::from_secs(5));
        assert_eq!(event.result.voice_range, "Alto");
        engine.stop().unwrap();
    }

    #[cfg(not(feature = "audio-cpal"))]
    #[test]
    fn device_start_without_backend_reports_unavailable() {
        let engine = PitchEngine::new(config()).unwrap();
        assert!(matches!(
            engine.start(),
            Err(VocalisError::CaptureUnavailable)
        ));
        assert_eq!(engine.status(), EngineStatus::Error);
        assert!(!engine.is_running());
    }
}
