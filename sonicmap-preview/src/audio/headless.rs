//! Headless output
//!
//! An output context with no hardware behind it. The clock follows the tokio
//! timer (`tokio::time::Instant`), so under a paused test runtime the device
//! clock advances exactly with `tokio::time::sleep`. Rendering is on demand.

use crate::audio::mixer::VoiceMixer;
use crate::audio::output::{DeviceState, OutputDevice};
use crate::error::{Error, Result};
use std::sync::{Mutex, PoisonError};
use tokio::time::Instant;
use tracing::debug;

pub struct HeadlessOutput {
    sample_rate: u32,
    epoch: Instant,
    state: Mutex<DeviceState>,
    mixer: VoiceMixer,
}

impl HeadlessOutput {
    pub fn new(sample_rate: u32) -> Self {
        Self::with_state(sample_rate, DeviceState::Running)
    }

    /// Start suspended, as a browser-style autoplay policy would.
    pub fn suspended(sample_rate: u32) -> Self {
        Self::with_state(sample_rate, DeviceState::Suspended)
    }

    fn with_state(sample_rate: u32, state: DeviceState) -> Self {
        Self {
            sample_rate,
            epoch: Instant::now(),
            state: Mutex::new(state),
            mixer: VoiceMixer::new(),
        }
    }

    /// Render `frames` stereo frames starting at device time `time`.
    pub fn render_at(&self, time: f64, frames: usize) -> Vec<f32> {
        let mut out = vec![0.0; frames * 2];
        let first_frame = (time.max(0.0) * self.sample_rate as f64) as u64;
        self.mixer.render(&mut out, 2, first_frame);
        out
    }

    /// Peak absolute sample of the next `frames` frames from now.
    pub fn peak_now(&self, frames: usize) -> f32 {
        self.render_at(self.current_time(), frames)
            .iter()
            .fold(0.0f32, |peak, sample| peak.max(sample.abs()))
    }

    fn set_state(&self, state: DeviceState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }
}

impl OutputDevice for HeadlessOutput {
    fn name(&self) -> String {
        "headless".to_string()
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn state(&self) -> DeviceState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn current_time(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64()
    }

    fn resume(&self) -> Result<()> {
        match self.state() {
            DeviceState::Closed => Err(Error::InvalidState("Output is closed".to_string())),
            _ => {
                self.set_state(DeviceState::Running);
                Ok(())
            }
        }
    }

    fn suspend(&self) -> Result<()> {
        match self.state() {
            DeviceState::Closed => Err(Error::InvalidState("Output is closed".to_string())),
            _ => {
                self.set_state(DeviceState::Suspended);
                Ok(())
            }
        }
    }

    fn close(&self) {
        if self.state() != DeviceState::Closed {
            debug!("Closing headless output");
        }
        self.mixer.disconnect_all();
        self.set_state(DeviceState::Closed);
    }

    fn mixer(&self) -> &VoiceMixer {
        &self.mixer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_clock_follows_runtime_timer() {
        let output = HeadlessOutput::new(44100);
        let before = output.current_time();

        tokio::time::sleep(Duration::from_millis(250)).await;

        let elapsed = output.current_time() - before;
        assert!((elapsed - 0.25).abs() < 1e-6, "elapsed {}", elapsed);
    }

    #[test]
    fn test_lifecycle() {
        let output = HeadlessOutput::suspended(44100);
        assert_eq!(output.state(), DeviceState::Suspended);

        output.resume().unwrap();
        assert_eq!(output.state(), DeviceState::Running);

        output.close();
        output.close();
        assert_eq!(output.state(), DeviceState::Closed);
        assert!(output.resume().is_err());
        assert!(output.suspend().is_err());
    }

    #[test]
    fn test_render_silence_without_voices() {
        let output = HeadlessOutput::new(8000);
        assert!(output.render_at(0.0, 64).iter().all(|s| *s == 0.0));
        assert_eq!(output.peak_now(64), 0.0);
    }
}
