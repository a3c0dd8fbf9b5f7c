//! Blocking pipeline loop.
//!
//! ## Per iteration
//!
//! ```text
//! 1. Check the running flag
//! 2. Apply pending commands (reference frequency, voice range)
//! 3. Pull one frame from the queue (short timeout), then apply late commands
//! 4. Resample + re-chunk when the capture rate differs from the analysis rate
//! 5. FrameAnalyzer::process → FrameOutcome
//! 6. Publish activity, pitch and voice-range events
//! ```
//!
//! The loop runs on its own OS thread and is the only writer of analysis
//! state; everything else talks to it through channels.

use std::sync::{
    atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
    Arc,
};
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use super::analyzer::{FrameAnalyzer, FrameOutcome};
use crate::{
    audio::resample::RateConverter,
    buffering::{recycle_buffer, AudioFrame, BufferReturn, FrameAssembler, FrameConsumer},
    ipc::events::{AudioActivityEvent, PitchEvent, VoiceRangeEvent},
};

pub struct PipelineDiagnostics {
    pub frames_in: AtomicUsize,
    pub frames_resampled: AtomicUsize,
    pub frames_skipped: AtomicUsize,
    pub frames_rejected: AtomicUsize,
    pub frames_no_pitch: AtomicUsize,
    pub frames_unstable: AtomicUsize,
    pub results_emitted: AtomicUsize,
    pub range_changes: AtomicUsize,
}

impl Default for PipelineDiagnostics {
    fn default() -> Self {
        Self {
            frames_in: AtomicUsize::new(0),
            frames_resampled: AtomicUsize::new(0),
            frames_skipped: AtomicUsize::new(0),
            frames_rejected: AtomicUsize::new(0),
            frames_no_pitch: AtomicUsize::new(0),
            frames_unstable: AtomicUsize::new(0),
            results_emitted: AtomicUsize::new(0),
            range_changes: AtomicUsize::new(0),
        }
    }
}

impl PipelineDiagnostics {
    pub fn reset(&self) {
        self.frames_in.store(0, Ordering::Relaxed);
        self.frames_resampled.store(0, Ordering::Relaxed);
        self.frames_skipped.store(0, Ordering::Relaxed);
        self.frames_rejected.store(0, Ordering::Relaxed);
        self.frames_no_pitch.store(0, Ordering::Relaxed);
        self.frames_unstable.store(0, Ordering::Relaxed);
        self.results_emitted.store(0, Ordering::Relaxed);
        self.range_changes.store(0, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        DiagnosticsSnapshot {
            frames_in: self.frames_in.load(Ordering::Relaxed),
            frames_resampled: self.frames_resampled.load(Ordering::Relaxed),
            frames_skipped: self.frames_skipped.load(Ordering::Relaxed),
            frames_rejected: self.frames_rejected.load(Ordering::Relaxed),
            frames_no_pitch: self.frames_no_pitch.load(Ordering::Relaxed),
            frames_unstable: self.frames_unstable.load(Ordering::Relaxed),
            results_emitted: self.results_emitted.load(Ordering::Relaxed),
            range_changes: self.range_changes.load(Ordering::Relaxed),
        }
    }

    fn record(&self, outcome: &FrameOutcome) {
        let counter = match outcome {
            FrameOutcome::Skipped(_) => &self.frames_skipped,
            FrameOutcome::Rejected { .. } => &self.frames_rejected,
            FrameOutcome::NoPitch { .. } => &self.frames_no_pitch,
            FrameOutcome::Unstable { .. } => &self.frames_unstable,
            FrameOutcome::Pitched { .. } => &self.results_emitted,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticsSnapshot {
    pub frames_in: usize,
    pub frames_resampled: usize,
    pub frames_skipped: usize,
    pub frames_rejected: usize,
    pub frames_no_pitch: usize,
    pub frames_unstable: usize,
    pub results_emitted: usize,
    pub range_changes: usize,
}

/// Runtime changes applied by the worker before its next frame.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineCommand {
    SetReferenceFrequency(f32),
    SetVoiceRange(String),
    EnableAutoRange,
}

/// All context the pipeline needs, passed as one struct so the closure stays tidy.
pub struct PipelineContext {
    pub analyzer: FrameAnalyzer,
    pub consumer: FrameConsumer,
    /// Where analyzed frame buffers go back to the capture callback.
    pub recycle: Option<BufferReturn>,
    pub commands: Receiver<EngineCommand>,
    pub running: Arc<AtomicBool>,
    pub result_tx: broadcast::Sender<PitchEvent>,
    pub range_tx: broadcast::Sender<VoiceRangeEvent>,
    pub activity_tx: broadcast::Sender<AudioActivityEvent>,
    pub seq: Arc<AtomicU64>,
    pub diagnostics: Arc<PipelineDiagnostics>,
}

/// Queue poll timeout when no env override is set.
const DEFAULT_POLL_MS: u64 = 100;
/// Input block size for the rubato resampler.
const RESAMPLE_CHUNK: usize = 1_024;
/// Analyzed frames between audio-level debug lines.
const LEVEL_LOG_EVERY: u64 = 50;

/// Run the blocking pipeline until `ctx.running` becomes false or every
/// frame producer has gone away.
pub fn run(mut ctx: PipelineContext) {
    info!("pipeline started");

    let target_rate = ctx.analyzer.config().sample_rate;
    let frame_size = ctx.analyzer.config().frame_size;
    let poll = Duration::from_millis(poll_timeout_ms());

    // Built lazily on the first frame at a foreign rate.
    let mut resampler: Option<(u32, RateConverter)> = None;
    let mut rechunker = FrameAssembler::new(frame_size);
    let mut activity_seq = 0u64;

    loop {
        if !ctx.running.load(Ordering::Relaxed) {
            break;
        }

        while let Ok(command) = ctx.commands.try_recv() {
            apply_command(&mut ctx, command);
        }

        let frame = match ctx.consumer.recv_timeout(poll) {
            Ok(frame) => frame,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => {
                debug!("frame queue disconnected");
                break;
            }
        };
        // Anything sent while we were waiting applies to this frame.
        while let Ok(command) = ctx.commands.try_recv() {
            apply_command(&mut ctx, command);
        }
        ctx.diagnostics.frames_in.fetch_add(1, Ordering::Relaxed);

        let needs_resampling =
            frame.sample_rate != target_rate && frame.sample_rate > 0 && !frame.is_empty();
        if !needs_resampling {
            analyze_and_publish(&mut ctx, &frame, &mut activity_seq);
            give_back(&ctx, frame);
            continue;
        }

        if resampler
            .as_ref()
            .map_or(true, |(rate, _)| *rate != frame.sample_rate)
        {
            match RateConverter::new(frame.sample_rate, target_rate, RESAMPLE_CHUNK) {
                Ok(converter) => {
                    rechunker.clear();
                    resampler = Some((frame.sample_rate, converter));
                }
                Err(e) => {
                    error!("failed to create resampler: {e}");
                    ctx.diagnostics.frames_skipped.fetch_add(1, Ordering::Relaxed);
                    continue;
                }
            }
        }
        let Some((_, converter)) = resampler.as_mut() else {
            continue;
        };

        let converted = converter.process(&frame.samples);
        give_back(&ctx, frame);
        ctx.diagnostics
            .frames_resampled
            .fetch_add(1, Ordering::Relaxed);

        let mut ready = Vec::new();
        rechunker.push(&converted, |samples| {
            ready.push(AudioFrame::new(samples, target_rate))
        });
        for analysis_frame in ready {
            analyze_and_publish(&mut ctx, &analysis_frame, &mut activity_seq);
        }
    }

    let d = ctx.diagnostics.snapshot();
    info!(
        frames_in = d.frames_in,
        skipped = d.frames_skipped,
        rejected = d.frames_rejected,
        no_pitch = d.frames_no_pitch,
        unstable = d.frames_unstable,
        emitted = d.results_emitted,
        range_changes = d.range_changes,
        "pipeline stopped"
    );
}

fn give_back(ctx: &PipelineContext, frame: AudioFrame) {
    if let Some(pool) = &ctx.recycle {
        recycle_buffer(pool, frame.samples, ctx.analyzer.config().frame_size);
    }
}

fn apply_command(ctx: &mut PipelineContext, command: EngineCommand) {
    match command {
        EngineCommand::SetReferenceFrequency(hz) => {
            match ctx.analyzer.set_reference_frequency(hz) {
                Ok(()) => info!(reference = hz, "reference frequency updated"),
                Err(e) => warn!("ignoring reference frequency change: {e}"),
            }
        }
        EngineCommand::SetVoiceRange(name) => match ctx.analyzer.set_voice_range(&name) {
            Ok(profile) => {
                info!(profile = %profile.name, "voice range set manually");
                ctx.diagnostics.range_changes.fetch_add(1, Ordering::Relaxed);
                let _ = ctx.range_tx.send(VoiceRangeEvent {
                    profile,
                    auto_detected: false,
                });
            }
            Err(e) => warn!("ignoring voice range change: {e}"),
        },
        EngineCommand::EnableAutoRange => {
            ctx.analyzer.enable_auto_range();
            info!("automatic voice range detection enabled");
        }
    }
}

fn analyze_and_publish(ctx: &mut PipelineContext, frame: &AudioFrame, activity_seq: &mut u64) {
    let outcome = ctx.analyzer.process(frame, Instant::now());
    ctx.diagnostics.record(&outcome);

    if let Some(rms) = outcome.rms() {
        if *activity_seq % LEVEL_LOG_EVERY == 0 {
            debug!(rms, voice = outcome.voice_detected(), "audio level");
        }
        let _ = ctx.activity_tx.send(AudioActivityEvent {
            seq: *activity_seq,
            rms,
            voice_detected: outcome.voice_detected(),
        });
        *activity_seq = activity_seq.saturating_add(1);
    }

    match outcome {
        FrameOutcome::Skipped(reason) => debug!(?reason, "frame skipped"),
        FrameOutcome::Rejected { rms, reason } => {
            debug!(rms, reason = reason.as_str(), "frame rejected")
        }
        FrameOutcome::NoPitch { .. } | FrameOutcome::Unstable { .. } => {}
        FrameOutcome::Pitched {
            result,
            range_change,
        } => {
            let seq = ctx.seq.fetch_add(1, Ordering::Relaxed);
            debug!(
                seq,
                frequency = result.frequency,
                note = %result.note,
                confidence = result.confidence,
                "pitch emitted"
            );
            let _ = ctx.result_tx.send(PitchEvent { seq, result });

            if let Some(profile) = range_change {
                ctx.diagnostics.range_changes.fetch_add(1, Ordering::Relaxed);
                let _ = ctx.range_tx.send(VoiceRangeEvent {
                    profile,
                    auto_detected: true,
                });
            }
        }
    }
}

fn poll_timeout_ms() -> u64 {
    static POLL_MS: OnceLock<u64> = OnceLock::new();
    *POLL_MS.get_or_init(|| {
        std::env::var("VOCALIS_PIPELINE_POLL_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .map(|v| v.clamp(1, 500))
            .unwrap_or(DEFAULT_POLL_MS)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::f32::consts::PI;
    use std::thread;

    use crossbeam_channel::unbounded;
    use tokio::sync::broadcast::error::TryRecvError;

    use crate::buffering::{create_buffer_pool, create_frame_queue};
    use crate::config::AnalysisConfig;
    use crate::pitch::PitchClass;
    use crate::vad::{VadDecision, VoiceActivityDetector};

    const SAMPLE_RATE: u32 = 8_000;
    const FRAME: usize = 8_192;

    struct AlwaysVoice;

    impl VoiceActivityDetector for AlwaysVoice {
        fn classify(&mut self, _frame: &AudioFrame) -> VadDecision {
            VadDecision::Voice
        }

        fn reset(&mut self) {}
    }

    fn config() -> AnalysisConfig {
        AnalysisConfig {
            sample_rate: SAMPLE_RATE,
            frame_size: FRAME,
            ..AnalysisConfig::default()
        }
    }

    fn sine(freq: f32, sample_rate: u32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| 0.5 * (2.0 * PI * freq * i as f32 / sample_rate as f32).sin())
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

    struct Harness {
        producer: crate::buffering::FrameProducer,
        commands: crossbeam_channel::Sender<EngineCommand>,
        running: Arc<AtomicBool>,
        result_rx: broadcast::Receiver<PitchEvent>,
        range_rx: broadcast::Receiver<VoiceRangeEvent>,
        activity_rx: broadcast::Receiver<AudioActivityEvent>,
        diagnostics: Arc<PipelineDiagnostics>,
        handle: thread::JoinHandle<()>,
    }

    impl Harness {
        fn spawn(analyzer: FrameAnalyzer) -> Self {
            Self::spawn_with_pool(analyzer, None)
        }

        fn spawn_with_pool(analyzer: FrameAnalyzer, recycle: Option<BufferReturn>) -> Self {
            let (producer, consumer) = create_frame_queue();
            let (commands, command_rx) = unbounded();
            let (result_tx, result_rx) = broadcast::channel(64);
            let (range_tx, range_rx) = broadcast::channel(16);
            let (activity_tx, activity_rx) = broadcast::channel(64);
            let running = Arc::new(AtomicBool::new(true));
            let diagnostics = Arc::new(PipelineDiagnostics::default());

            let ctx = PipelineContext {
                analyzer,
                consumer,
                recycle,
                commands: command_rx,
                running: Arc::clone(&running),
                result_tx,
                range_tx,
                activity_tx,
                seq: Arc::new(AtomicU64::new(0)),
                diagnostics: Arc::clone(&diagnostics),
            };
            let handle = thread::spawn(move || run(ctx));

            Self {
                producer,
                commands,
                running,
                result_rx,
                range_rx,
                activity_rx,
                diagnostics,
                handle,
            }
        }

        fn push(&self, samples: Vec<f32>, sample_rate: u32) {
            self.producer
                .send(AudioFrame::new(samples, sample_rate))
                .expect("pipeline alive");
        }

        fn stop(self) -> DiagnosticsSnapshot {
            self.running.store(false, Ordering::SeqCst);
            self.handle.join().expect("pipeline thread panicked");
            self.diagnostics.snapshot()
        }
    }

    #[test]
    fn analyzed_buffers_return_to_the_pool() {
        let (pool, spares) = create_buffer_pool(FRAME, 2);
        while spares.try_recv().is_ok() {}

        let mut h = Harness::spawn_with_pool(
            FrameAnalyzer::new(config()).expect("valid config"),
            Some(pool),
        );
        h.push(sine(440.0, SAMPLE_RATE, FRAME), SAMPLE_RATE);
        recv_with_timeout(&mut h.activity_rx, Duration::from_secs(5));
        h.stop();

        let buffer = spares.try_recv().expect("buffer recycled");
        assert!(buffer.capacity() >= FRAME);
    }

    #[test]
    fn run_emits_pitch_after_stable_readings() {
        let mut h = Harness::spawn(FrameAnalyzer::new(config()).expect("valid config"));
        for _ in 0..3 {
            h.push(sine(440.0, SAMPLE_RATE, FRAME), SAMPLE_RATE);
        }

        let event = recv_with_timeout(&mut h.result_rx, Duration::from_secs(5));
        assert_eq!(event.seq, 0);
        assert_eq!(event.result.note.note, PitchClass::A);
        assert_eq!(event.result.note.octave, 4);

        for expected in 0..3 {
            let activity = recv_with_timeout(&mut h.activity_rx, Duration::from_secs(1));
            assert_eq!(activity.seq, expected);
            assert!(activity.voice_detected);
        }

        let snapshot = h.stop();
        assert_eq!(snapshot.frames_in, 3);
        assert_eq!(snapshot.frames_unstable, 2);
        assert_eq!(snapshot.results_emitted, 1);
    }

    #[test]
    fn run_skips_malformed_frames_and_keeps_going() {
        let mut h = Harness::spawn(
            FrameAnalyzer::with_detector(
                AnalysisConfig {
                    required_stable_readings: 1,
                    ..config()
                },
                Box::new(AlwaysVoice),
            )
            .expect("valid config"),
        );
        h.push(Vec::new(), SAMPLE_RATE);
        h.push(vec![f32::NAN; FRAME], SAMPLE_RATE);
        h.push(sine(220.0, SAMPLE_RATE, FRAME), SAMPLE_RATE);

        let event = recv_with_timeout(&mut h.result_rx, Duration::from_secs(5));
        assert_eq!(event.result.note.note, PitchClass::A);
        assert_eq!(event.result.note.octave, 3);

        let snapshot = h.stop();
        assert_eq!(snapshot.frames_skipped, 2);
        assert_eq!(snapshot.results_emitted, 1);
    }

    #[test]
    fn commands_apply_before_next_frame() {
        let mut h = Harness::spawn(
            FrameAnalyzer::new(AnalysisConfig {
                required_stable_readings: 1,
                ..config()
            })
            .expect("valid config"),
        );
        // Commands are applied in order, so the range event implies the
        // reference change has landed too.
        h.commands
            .send(EngineCommand::SetReferenceFrequency(466.16))
            .expect("pipeline alive");
        h.commands
            .send(EngineCommand::SetVoiceRange("Tenor".into()))
            .expect("pipeline alive");

        let range = recv_with_timeout(&mut h.range_rx, Duration::from_secs(2));
        assert_eq!(range.profile.name, "Tenor");
        assert!(!range.auto_detected);

        h.push(sine(440.0, SAMPLE_RATE, FRAME), SAMPLE_RATE);
        let event = recv_with_timeout(&mut h.result_rx, Duration::from_secs(5));
        assert_eq!(event.result.note.note, PitchClass::GSharp);
        assert_eq!(event.result.voice_range, "Tenor");

        let snapshot = h.stop();
        assert_eq!(snapshot.range_changes, 1);
    }

    #[test]
    fn foreign_rate_frames_are_resampled_and_rechunked() {
        let mut h = Harness::spawn(
            FrameAnalyzer::new(AnalysisConfig {
                required_stable_readings: 1,
                ..config()
            })
            .expect("valid config"),
        );
        // 16 kHz capture: 4 frames of 8192 ≈ 16384 samples at 8 kHz → 2 analysis frames.
        let capture = sine(330.0, 16_000, FRAME * 4);
        for chunk in capture.chunks(FRAME) {
            h.push(chunk.to_vec(), 16_000);
        }

        let event = recv_with_timeout(&mut h.result_rx, Duration::from_secs(5));
        assert!((event.result.frequency - 330.0).abs() / 330.0 < 0.01);

        let snapshot = h.stop();
        assert_eq!(snapshot.frames_resampled, 4);
        assert_eq!(snapshot.frames_skipped, 0);
    }

    #[test]
    fn run_exits_when_producer_disconnects() {
        let h = Harness::spawn(FrameAnalyzer::new(config()).expect("valid config"));
        drop(h.producer);
        h.handle.join().expect("pipeline thread panicked");
    }
}
