//! Frame hand-off between the capture callback and the analysis worker.
//!
//! The queue is an unbounded `crossbeam-channel`: `send` never blocks, so the
//! real-time callback only copies samples into the pending frame and
//! enqueues it once full.
//!
//! Frame buffers circulate through a bounded pool: the worker hands each
//! analyzed buffer back and the callback reuses it for the next frame. The
//! callback only allocates when the pool has run dry.

pub mod frame;
pub mod history;

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};

pub use frame::AudioFrame;
pub use history::{PitchHistory, PitchHistoryEntry};

/// Sending half, held by the capture callback.
pub type FrameProducer = Sender<AudioFrame>;

/// Receiving half, held by the pipeline worker.
pub type FrameConsumer = Receiver<AudioFrame>;

/// Buffers returned by the worker once a frame has been analyzed.
pub type BufferReturn = Sender<Vec<f32>>;

/// Buffers the capture callback draws from for its next frame.
pub type BufferSupply = Receiver<Vec<f32>>;

/// Create a matched producer/consumer pair for audio frames.
pub fn create_frame_queue() -> (FrameProducer, FrameConsumer) {
    unbounded()
}

/// Pool holding `depth` empty buffers of `frame_size` capacity.
pub fn create_buffer_pool(frame_size: usize, depth: usize) -> (BufferReturn, BufferSupply) {
    let (tx, rx) = bounded(depth);
    for _ in 0..depth {
        let _ = tx.try_send(Vec::with_capacity(frame_size));
    }
    (tx, rx)
}

/// Hand `samples` back to the pool. Undersized buffers and overflow are
/// dropped here, on the worker, instead of in the callback.
pub fn recycle_buffer(pool: &BufferReturn, samples: Vec<f32>, frame_size: usize) {
    if samples.capacity() >= frame_size {
        let _ = pool.try_send(samples);
    }
}

/// Average interleaved samples to mono, appending to `out`.
///
/// A trailing partial frame (fewer than `channels` samples) is dropped.
pub fn mix_to_mono(interleaved: &[f32], channels: usize, out: &mut Vec<f32>) {
    if channels <= 1 {
        out.extend_from_slice(interleaved);
        return;
    }
    let scale = 1.0 / channels as f32;
    out.extend(
        interleaved
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() * scale),
    );
}

/// Accumulates mono samples into fixed-size frames.
#[derive(Debug)]
pub struct FrameAssembler {
    frame_size: usize,
    pending: Vec<f32>,
    spares: Option<BufferSupply>,
}

impl FrameAssembler {
    pub fn new(frame_size: usize) -> Self {
        let frame_size = frame_size.max(1);
        Self {
            frame_size,
            pending: Vec::with_capacity(frame_size),
            spares: None,
        }
    }

    /// Assembler that takes each new frame buffer from `spares` when one is
    /// available.
    pub fn with_spares(frame_size: usize, spares: BufferSupply) -> Self {
        Self {
            spares: Some(spares),
            ..Self::new(frame_size)
        }
    }

    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    /// Samples waiting for the next full frame.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Append `samples`, calling `emit` once for every completed frame.
    pub fn push(&mut self, mut samples: &[f32], mut emit: impl FnMut(Vec<f32>)) {
        while !samples.is_empty() {
            let room = self.frame_size - self.pending.len();
            let take = room.min(samples.len());
            self.pending.extend_from_slice(&samples[..take]);
            samples = &samples[take..];
            if self.pending.len() == self.frame_size {
                let next = self.next_buffer();
                emit(std::mem::replace(&mut self.pending, next));
            }
        }
    }

    fn next_buffer(&self) -> Vec<f32> {
        match self.spares.as_ref().and_then(|rx| rx.try_recv().ok()) {
            Some(mut buffer) if buffer.capacity() >= self.frame_size => {
                buffer.clear();
                buffer
            }
            _ => Vec::with_capacity(self.frame_size),
        }
    }

    /// Drop any partial frame.
    pub fn clear(&mut self) {
        self.pending.clear();
    }
}
