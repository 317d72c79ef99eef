//! Audio output devices
//!
//! `OutputDevice` is the shared output context the engine renders into: a
//! clock in device seconds, a suspended/running/closed lifecycle and a voice
//! mixer. `CpalOutput` drives a real device; `HeadlessOutput` (see
//! `headless.rs`) runs without hardware.

use crate::audio::headless::HeadlessOutput;
use crate::audio::mixer::{Voice, VoiceMixer};
use crate::config::{OutputBackend, PreviewConfig};
use crate::error::{Error, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, FromSample, Sample, SampleFormat, SizedSample, Stream, StreamConfig};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use tracing::{debug, error, info, warn};

/// Preferred device rate
pub const PREFERRED_SAMPLE_RATE: u32 = 44100;

/// Output lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    /// Constructed but not producing sound (platform policy or explicit suspend)
    Suspended,
    Running,
    Closed,
}

/// Shared output context.
pub trait OutputDevice: Send + Sync {
    fn name(&self) -> String;

    fn sample_rate(&self) -> u32;

    fn state(&self) -> DeviceState;

    /// Device clock in seconds
    fn current_time(&self) -> f64;

    fn resume(&self) -> Result<()>;

    fn suspend(&self) -> Result<()>;

    /// Release the device. Idempotent.
    fn close(&self);

    fn mixer(&self) -> &VoiceMixer;

    fn connect(&self, voice: Arc<Voice>) {
        self.mixer().connect(voice);
    }

    fn disconnect(&self, id: u64) -> bool {
        self.mixer().disconnect(id)
    }
}

/// Constructs the output on first activation.
pub type OutputFactory = Arc<dyn Fn() -> Result<Arc<dyn OutputDevice>> + Send + Sync>;

/// Output factory for the configured backend.
pub fn output_factory(config: &PreviewConfig) -> OutputFactory {
    match config.output {
        OutputBackend::Cpal => {
            let device_name = config.device_name.clone();
            Arc::new(move || {
                let output = CpalOutput::open(device_name.clone())?;
                Ok(Arc::new(output) as Arc<dyn OutputDevice>)
            })
        }
        OutputBackend::Headless => Arc::new(|| {
            Ok(Arc::new(HeadlessOutput::new(PREFERRED_SAMPLE_RATE)) as Arc<dyn OutputDevice>)
        }),
    }
}

/// Commands for the thread that owns the cpal stream
enum StreamCommand {
    Play(mpsc::Sender<Result<()>>),
    Pause(mpsc::Sender<Result<()>>),
    Close,
}

/// What the stream thread reports once the stream is built
struct StreamInfo {
    name: String,
    sample_rate: u32,
    channels: u16,
}

/// Audio output using cpal.
///
/// `cpal::Stream` is not `Send`, so the stream lives on a dedicated thread
/// and this handle talks to it over a channel.
pub struct CpalOutput {
    name: String,
    sample_rate: u32,
    channels: u16,
    mixer: Arc<VoiceMixer>,
    frames_rendered: Arc<AtomicU64>,
    /// Set by the stream error callback
    error_flag: Arc<AtomicBool>,
    state: Mutex<DeviceState>,
    control: Mutex<Option<mpsc::Sender<StreamCommand>>>,
}

impl CpalOutput {
    /// List available audio output devices.
    pub fn list_devices() -> Result<Vec<String>> {
        let host = cpal::default_host();

        let devices: Vec<String> = host
            .output_devices()
            .map_err(|e| Error::AudioOutput(format!("Failed to enumerate devices: {}", e)))?
            .filter_map(|device| device.name().ok())
            .collect();

        debug!("Found {} output devices", devices.len());
        Ok(devices)
    }

    /// Open the output device and start its stream.
    ///
    /// Falls back to the default device when `device_name` is not found.
    pub fn open(device_name: Option<String>) -> Result<Self> {
        let mixer = Arc::new(VoiceMixer::new());
        let frames_rendered = Arc::new(AtomicU64::new(0));
        let error_flag = Arc::new(AtomicBool::new(false));

        let (ready_tx, ready_rx) = mpsc::channel::<Result<StreamInfo>>();
        let (control_tx, control_rx) = mpsc::channel::<StreamCommand>();

        let thread_mixer = Arc::clone(&mixer);
        let thread_frames = Arc::clone(&frames_rendered);
        let thread_error_flag = Arc::clone(&error_flag);

        thread::Builder::new()
            .name("sonicmap-output".into())
            .spawn(move || {
                let (stream, info) =
                    match Self::build(device_name, thread_mixer, thread_frames, thread_error_flag) {
                        Ok(built) => built,
                        Err(e) => {
                            let _ = ready_tx.send(Err(e));
                            return;
                        }
                    };

                if let Err(e) = stream.play() {
                    let _ = ready_tx.send(Err(Error::AudioOutput(format!("Failed to start stream: {}", e))));
                    return;
                }
                let _ = ready_tx.send(Ok(info));

                // Keep the stream alive until closed or the handle is dropped
                for command in control_rx {
                    match command {
                        StreamCommand::Play(reply) => {
                            let result = stream
                                .play()
                                .map_err(|e| Error::AudioOutput(format!("Failed to resume stream: {}", e)));
                            let _ = reply.send(result);
                        }
                        StreamCommand::Pause(reply) => {
                            let result = stream
                                .pause()
                                .map_err(|e| Error::AudioOutput(format!("Failed to pause stream: {}", e)));
                            let _ = reply.send(result);
                        }
                        StreamCommand::Close => break,
                    }
                }

                drop(stream);
                info!("Audio output stream closed");
            })
            .map_err(|e| Error::AudioOutput(format!("Failed to spawn output thread: {}", e)))?;

        let info = ready_rx
            .recv()
            .map_err(|_| Error::AudioOutput("Output thread exited during startup".to_string()))??;

        info!(
            "Audio output started: {} ({}Hz, {} channels)",
            info.name, info.sample_rate, info.channels
        );

        Ok(Self {
            name: info.name,
            sample_rate: info.sample_rate,
            channels: info.channels,
            mixer,
            frames_rendered,
            error_flag,
            state: Mutex::new(DeviceState::Running),
            control: Mutex::new(Some(control_tx)),
        })
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Whether the stream reported an error since it started
    pub fn has_error(&self) -> bool {
        self.error_flag.load(Ordering::SeqCst)
    }

    fn build(
        device_name: Option<String>,
        mixer: Arc<VoiceMixer>,
        frames_rendered: Arc<AtomicU64>,
        error_flag: Arc<AtomicBool>,
    ) -> Result<(Stream, StreamInfo)> {
        let device = Self::select_device(device_name.as_deref())?;
        let name = device.name().unwrap_or_else(|_| "Unknown".to_string());
        let (config, sample_format) = Self::get_best_config(&device)?;

        debug!(
            "Audio config: sample_rate={}, channels={}, format={:?}",
            config.sample_rate.0, config.channels, sample_format
        );

        let stream = match sample_format {
            SampleFormat::F32 => Self::build_stream::<f32>(&device, &config, mixer, frames_rendered, error_flag)?,
            SampleFormat::I16 => Self::build_stream::<i16>(&device, &config, mixer, frames_rendered, error_flag)?,
            SampleFormat::U16 => Self::build_stream::<u16>(&device, &config, mixer, frames_rendered, error_flag)?,
            sample_format => {
                return Err(Error::AudioOutput(format!(
                    "Unsupported sample format: {:?}",
                    sample_format
                )));
            }
        };

        let info = StreamInfo {
            name,
            sample_rate: config.sample_rate.0,
            channels: config.channels,
        };
        Ok((stream, info))
    }

    fn select_device(device_name: Option<&str>) -> Result<Device> {
        let host = cpal::default_host();

        if let Some(name) = device_name {
            let mut devices = host
                .output_devices()
                .map_err(|e| Error::AudioOutput(format!("Failed to enumerate devices: {}", e)))?;

            if let Some(device) = devices.find(|d| d.name().ok().as_deref() == Some(name)) {
                info!("Found requested audio device: {}", name);
                return Ok(device);
            }
            warn!("Requested device '{}' not found, falling back to default device", name);
        }

        host.default_output_device()
            .ok_or_else(|| Error::AudioOutput("No default output device found".to_string()))
    }

    /// Prefers 44.1kHz stereo f32, otherwise the device default.
    fn get_best_config(device: &Device) -> Result<(StreamConfig, SampleFormat)> {
        let mut supported_configs = device
            .supported_output_configs()
            .map_err(|e| Error::AudioOutput(format!("Failed to get device configs: {}", e)))?;

        let preferred = supported_configs.find(|config| {
            config.channels() == 2
                && config.min_sample_rate().0 <= PREFERRED_SAMPLE_RATE
                && config.max_sample_rate().0 >= PREFERRED_SAMPLE_RATE
                && config.sample_format() == SampleFormat::F32
        });

        if let Some(supported_config) = preferred {
            let sample_format = supported_config.sample_format();
            let config = supported_config
                .with_sample_rate(cpal::SampleRate(PREFERRED_SAMPLE_RATE))
                .config();
            return Ok((config, sample_format));
        }

        let supported_config = device
            .default_output_config()
            .map_err(|e| Error::AudioOutput(format!("Failed to get default config: {}", e)))?;

        let sample_format = supported_config.sample_format();
        Ok((supported_config.config(), sample_format))
    }

    fn build_stream<T>(
        device: &Device,
        config: &StreamConfig,
        mixer: Arc<VoiceMixer>,
        frames_rendered: Arc<AtomicU64>,
        error_flag: Arc<AtomicBool>,
    ) -> Result<Stream>
    where
        T: SizedSample + FromSample<f32>,
    {
        let channels = config.channels as usize;
        let mut scratch: Vec<f32> = Vec::new();

        device
            .build_output_stream(
                config,
                move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                    let frames = (data.len() / channels.max(1)) as u64;
                    let first_frame = frames_rendered.fetch_add(frames, Ordering::SeqCst);

                    scratch.resize(data.len(), 0.0);
                    mixer.render(&mut scratch, channels, first_frame);

                    for (out, sample) in data.iter_mut().zip(scratch.iter()) {
                        *out = T::from_sample(*sample);
                    }
                },
                move |err| {
                    error!("Audio stream error: {}", err);
                    error_flag.store(true, Ordering::SeqCst);
                },
                None, // No timeout
            )
            .map_err(|e| Error::AudioOutput(format!("Failed to build stream: {}", e)))
    }

    fn send(&self, command: fn(mpsc::Sender<Result<()>>) -> StreamCommand) -> Result<()> {
        let (reply_tx, reply_rx) = mpsc::channel();
        {
            let control = self.control.lock().unwrap_or_else(PoisonError::into_inner);
            let sender = control
                .as_ref()
                .ok_or_else(|| Error::InvalidState("Output is closed".to_string()))?;
            sender
                .send(command(reply_tx))
                .map_err(|_| Error::AudioOutput("Output thread is gone".to_string()))?;
        }
        reply_rx
            .recv()
            .map_err(|_| Error::AudioOutput("Output thread did not reply".to_string()))?
    }

    fn set_state(&self, state: DeviceState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }
}

impl OutputDevice for CpalOutput {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn state(&self) -> DeviceState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn current_time(&self) -> f64 {
        self.frames_rendered.load(Ordering::SeqCst) as f64 / self.sample_rate as f64
    }

    fn resume(&self) -> Result<()> {
        match self.state() {
            DeviceState::Running => Ok(()),
            DeviceState::Closed => Err(Error::InvalidState("Output is closed".to_string())),
            DeviceState::Suspended => {
                self.send(StreamCommand::Play)?;
                self.set_state(DeviceState::Running);
                Ok(())
            }
        }
    }

    fn suspend(&self) -> Result<()> {
        match self.state() {
            DeviceState::Suspended => Ok(()),
            DeviceState::Closed => Err(Error::InvalidState("Output is closed".to_string())),
            DeviceState::Running => {
                self.send(StreamCommand::Pause)?;
                self.set_state(DeviceState::Suspended);
                Ok(())
            }
        }
    }

    fn close(&self) {
        let sender = self.control.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(sender) = sender {
            let _ = sender.send(StreamCommand::Close);
        }
        self.mixer.disconnect_all();
        self.set_state(DeviceState::Closed);
    }

    fn mixer(&self) -> &VoiceMixer {
        &self.mixer
    }
}

impl Drop for CpalOutput {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headless_factory() {
        let config = PreviewConfig {
            output: OutputBackend::Headless,
            ..PreviewConfig::default()
        };
        let output = output_factory(&config)().unwrap();

        assert_eq!(output.sample_rate(), PREFERRED_SAMPLE_RATE);
        assert_eq!(output.state(), DeviceState::Running);
    }

    #[test]
    #[ignore] // Requires audio hardware
    fn test_list_devices() {
        let devices = CpalOutput::list_devices().unwrap();
        println!("Available devices: {:?}", devices);
    }

    #[test]
    #[ignore] // Requires audio hardware
    fn test_open_suspend_resume_close() {
        let output = CpalOutput::open(None).unwrap();
        assert_eq!(output.state(), DeviceState::Running);

        output.suspend().unwrap();
        assert_eq!(output.state(), DeviceState::Suspended);
        output.resume().unwrap();
        assert_eq!(output.state(), DeviceState::Running);

        output.close();
        output.close();
        assert_eq!(output.state(), DeviceState::Closed);
        assert!(output.resume().is_err());
    }
}
