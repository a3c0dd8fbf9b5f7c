//! Audio capture via the cpal backend.
//!
//! # Design constraints
//!
//! The cpal input callback runs on an OS audio thread at elevated priority.
//! It must not block or perform I/O. The callback here converts samples to
//! f32, mixes to mono, fills the pending frame and sends each completed frame
//! on the unbounded frame queue, whose `send` never blocks. Frame buffers come
//! from the pool the worker refills, so steady-state capture does not
//! allocate per frame.
//!
//! # Threading note
//!
//! `cpal::Stream` is `!Send` on most platforms (COM on Windows, CoreAudio on
//! macOS). `AudioCapture` therefore must be created and dropped on the same
//! thread; the engine opens it on the pipeline worker.

pub mod device;
pub mod resample;

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

#[cfg(feature = "audio-cpal")]
use cpal::{
    traits::{DeviceTrait, HostTrait, StreamTrait},
    FromSample, Sample, SampleFormat, SampleRate, SizedSample, Stream, StreamConfig,
    SupportedStreamConfig,
};
#[cfg(feature = "audio-cpal")]
use tracing::{error, info, warn};

#[cfg(feature = "audio-cpal")]
use crate::buffering::{mix_to_mono, AudioFrame, FrameAssembler};
use crate::{
    buffering::{BufferSupply, FrameProducer},
    error::{Result, VocalisError},
};

/// Called from the audio thread when the stream fails.
pub type StreamErrorHandler = Box<dyn FnMut(String) + Send + 'static>;

/// What the engine would like the device to deliver.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureRequest {
    /// Preferred device name; `None` selects the default input.
    pub device_name: Option<String>,
    pub sample_rate: u32,
    pub channels: u16,
    /// Samples per frame pushed into the queue (at the device rate).
    pub frame_size: usize,
}

/// Handle to an active audio capture stream.
///
/// **Not `Send`**: create and drop on the same OS thread.
pub struct AudioCapture {
    /// Kept alive so the stream is not dropped prematurely.
    #[cfg(feature = "audio-cpal")]
    _stream: Stream,
    /// Shared flag; the callback no-ops once it is `false`.
    running: Arc<AtomicBool>,
    /// Actual capture sample rate (Hz).
    pub sample_rate: u32,
    /// Actual capture channel count.
    pub channels: u16,
}

#[cfg(feature = "audio-cpal")]
impl AudioCapture {
    /// Open the requested (or default) input device and start streaming
    /// frames into `producer`.
    ///
    /// # Errors
    /// `VocalisError::NoDefaultInputDevice` when nothing can be opened,
    /// `VocalisError::AudioDevice` / `VocalisError::AudioStream` when cpal
    /// rejects the device or stream.
    pub fn open(
        request: &CaptureRequest,
        producer: FrameProducer,
        spares: BufferSupply,
        running: Arc<AtomicBool>,
        on_error: StreamErrorHandler,
    ) -> Result<Self> {
        let device = select_device(request.device_name.as_deref())?;
        info!(
            device = device.name().unwrap_or_default().as_str(),
            "opening input device"
        );

        let supported = select_config(&device, request)?;
        let sample_rate = supported.sample_rate().0;
        let channels = supported.channels();
        if sample_rate != request.sample_rate {
            warn!(
                requested = request.sample_rate,
                actual = sample_rate,
                "device does not support the analysis rate; frames will be resampled"
            );
        }
        info!(sample_rate, channels, format = ?supported.sample_format(), "audio config selected");

        let config = StreamConfig {
            channels,
            sample_rate: SampleRate(sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };
        let cb_running = Arc::clone(&running);
        let assembler = FrameAssembler::with_spares(request.frame_size, spares);

        let stream = match supported.sample_format() {
            SampleFormat::F32 => {
                build_stream::<f32>(&device, &config, assembler, producer, cb_running, on_error)
            }
            SampleFormat::I16 => {
                build_stream::<i16>(&device, &config, assembler, producer, cb_running, on_error)
            }
            SampleFormat::I32 => {
                build_stream::<i32>(&device, &config, assembler, producer, cb_running, on_error)
            }
            SampleFormat::U16 => {
                build_stream::<u16>(&device, &config, assembler, producer, cb_running, on_error)
            }
            SampleFormat::U8 => {
                build_stream::<u8>(&device, &config, assembler, producer, cb_running, on_error)
            }
            fmt => {
                return Err(VocalisError::AudioStream(format!(
                    "unsupported sample format: {fmt:?}"
                )))
            }
        }?;

        stream
            .play()
            .map_err(|e| VocalisError::AudioStream(e.to_string()))?;

        Ok(Self {
            _stream: stream,
            running,
            sample_rate,
            channels,
        })
    }

    /// Signal the callback to no-op on its next invocation. Idempotent.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }
}

/// Preferred device by exact name, else the default input, else the first one.
#[cfg(feature = "audio-cpal")]
fn select_device(preferred: Option<&str>) -> Result<cpal::Device> {
    let host = cpal::default_host();

    if let Some(preferred_name) = preferred {
        match host.input_devices() {
            Ok(mut devices) => {
                if let Some(device) = devices.find(|d| {
                    d.name()
                        .map(|name| name == preferred_name)
                        .unwrap_or(false)
                }) {
                    return Ok(device);
                }
                warn!("preferred input device '{preferred_name}' not found, falling back");
            }
            Err(e) => warn!("failed to list input devices while resolving preference: {e}"),
        }
    }

    if let Some(default) = host.default_input_device() {
        return Ok(default);
    }
    let mut devices = host
        .input_devices()
        .map_err(|e| VocalisError::AudioDevice(e.to_string()))?;
    let fallback = devices.next().ok_or(VocalisError::NoDefaultInputDevice)?;
    warn!("no default input device, falling back to first available input");
    Ok(fallback)
}

/// A supported config at the requested rate and channel count if the device
/// has one, otherwise the device default.
#[cfg(feature = "audio-cpal")]
fn select_config(device: &cpal::Device, request: &CaptureRequest) -> Result<SupportedStreamConfig> {
    match device.supported_input_configs() {
        Ok(mut ranges) => {
            let wanted = SampleRate(request.sample_rate);
            if let Some(range) = ranges.find(|r| {
                r.channels() == request.channels
                    && r.min_sample_rate() <= wanted
                    && r.max_sample_rate() >= wanted
            }) {
                return Ok(range.with_sample_rate(wanted));
            }
        }
        Err(e) => warn!("failed to query supported input configs: {e}"),
    }
    device
        .default_input_config()
        .map_err(|e| VocalisError::AudioDevice(e.to_string()))
}

#[cfg(feature = "audio-cpal")]
fn build_stream<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    mut assembler: FrameAssembler,
    producer: FrameProducer,
    running: Arc<AtomicBool>,
    mut on_error: StreamErrorHandler,
) -> Result<Stream>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    let channels = config.channels as usize;
    let sample_rate = config.sample_rate.0;
    let frame_size = assembler.frame_size();
    let mut converted: Vec<f32> = Vec::with_capacity(frame_size * channels.max(1));
    let mut mono: Vec<f32> = Vec::with_capacity(frame_size);

    device
        .build_input_stream(
            config,
            move |data: &[T], _info: &cpal::InputCallbackInfo| {
                if !running.load(Ordering::Relaxed) {
                    return;
                }
                converted.clear();
                converted.extend(data.iter().map(|&s| f32::from_sample(s)));
                mono.clear();
                mix_to_mono(&converted, channels, &mut mono);
                assembler.push(&mono, |samples| {
                    // The worker only disappears while shutting down.
                    let _ = producer.send(AudioFrame::new(samples, sample_rate));
                });
            },
            move |err| {
                error!("audio stream error: {err}");
                on_error(err.to_string());
            },
            None,
        )
        .map_err(|e| VocalisError::AudioStream(e.to_string()))
}

/// Stub when the `audio-cpal` feature is disabled.
#[cfg(not(feature = "audio-cpal"))]
impl AudioCapture {
    pub fn open(
        _request: &CaptureRequest,
        _producer: FrameProducer,
        _spares: BufferSupply,
        _running: Arc<AtomicBool>,
        _on_error: StreamErrorHandler,
    ) -> Result<Self> {
        Err(VocalisError::CaptureUnavailable)
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }
}
