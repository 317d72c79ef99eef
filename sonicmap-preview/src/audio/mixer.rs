//! Voice mixer
//!
//! A `Voice` is one scheduled playback of a decoded clip: where in the clip to
//! start, how long to play, when (in device frames) to begin, and the gain
//! automation applied on the way out. The `VoiceMixer` holds the voices
//! connected to an output and renders them into device buffers.
//!
//! Voices are positioned purely from the device frame counter, so rendering
//! never mutates per-voice state; ended or halted voices are pruned after each
//! buffer.

use crate::audio::automation::GainAutomation;
use crate::audio::types::{AudioFrame, DecodedClip};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// One clip routed through a gain stage into the output.
#[derive(Debug)]
pub struct Voice {
    id: u64,
    clip: Arc<DecodedClip>,
    /// First clip frame to play
    offset_frames: u64,
    /// Number of device frames to play
    length_frames: u64,
    /// Device frame at which playback starts
    start_frame: u64,
    device_rate: u32,
    gain: Mutex<GainAutomation>,
    halted: AtomicBool,
}

impl Voice {
    /// Schedule `clip` to start at `start_time` (device seconds) from
    /// `offset_secs` into the clip, for `duration_secs`.
    pub fn new(
        id: u64,
        clip: Arc<DecodedClip>,
        start_time: f64,
        offset_secs: f64,
        duration_secs: f64,
        device_rate: u32,
        gain: GainAutomation,
    ) -> Self {
        let clip_rate = clip.sample_rate() as f64;
        let device_rate_f = device_rate as f64;
        Self {
            id,
            clip,
            offset_frames: (offset_secs.max(0.0) * clip_rate).round() as u64,
            length_frames: (duration_secs.max(0.0) * device_rate_f).round() as u64,
            start_frame: (start_time.max(0.0) * device_rate_f).round() as u64,
            device_rate,
            gain: Mutex::new(gain),
            halted: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Lock the gain automation for scheduling.
    pub fn gain(&self) -> MutexGuard<'_, GainAutomation> {
        self.gain.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn gain_at(&self, time: f64) -> f32 {
        self.gain().value_at(time)
    }

    /// Hard stop: the voice produces silence from now on.
    pub fn halt(&self) {
        self.halted.store(true, Ordering::SeqCst);
    }

    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::SeqCst)
    }

    /// Device time at which the planned playback ends
    pub fn end_time(&self) -> f64 {
        (self.start_frame + self.length_frames) as f64 / self.device_rate as f64
    }

    /// Whether the voice can still contribute sound at `device_frame`
    pub fn is_finished_at(&self, device_frame: u64) -> bool {
        self.is_halted() || device_frame >= self.start_frame + self.length_frames
    }

    /// Whether the voice is inside its play window at `time` and not halted
    pub fn is_playing_at(&self, time: f64) -> bool {
        let frame = (time * self.device_rate as f64) as u64;
        !self.is_finished_at(frame) && frame >= self.start_frame
    }

    /// Clip frame for a device frame, nearest-sample when rates differ
    fn clip_frame(&self, device_frame: u64) -> Option<usize> {
        if device_frame < self.start_frame || device_frame >= self.start_frame + self.length_frames {
            return None;
        }
        let elapsed = device_frame - self.start_frame;
        let clip_rate = self.clip.sample_rate();
        let source = if clip_rate == self.device_rate {
            elapsed
        } else {
            elapsed * clip_rate as u64 / self.device_rate.max(1) as u64
        };
        Some((self.offset_frames + source) as usize)
    }

    fn render_frame(&self, gain: &GainAutomation, device_frame: u64) -> Option<AudioFrame> {
        let index = self.clip_frame(device_frame)?;
        let mut frame = self.clip.frame(index)?;
        frame.apply_gain(gain.value_at(device_frame as f64 / self.device_rate as f64));
        Some(frame)
    }
}

/// The set of voices connected to an output.
#[derive(Debug, Default)]
pub struct VoiceMixer {
    voices: Mutex<Vec<Arc<Voice>>>,
}

impl VoiceMixer {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Arc<Voice>>> {
        self.voices.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn connect(&self, voice: Arc<Voice>) {
        let mut voices = self.lock();
        voices.retain(|existing| existing.id() != voice.id());
        voices.push(voice);
    }

    /// Remove a voice; returns whether it was connected.
    pub fn disconnect(&self, id: u64) -> bool {
        let mut voices = self.lock();
        let before = voices.len();
        voices.retain(|voice| voice.id() != id);
        voices.len() != before
    }

    pub fn disconnect_all(&self) {
        self.lock().clear();
    }

    pub fn voice_count(&self) -> usize {
        self.lock().len()
    }

    pub fn voices(&self) -> Vec<Arc<Voice>> {
        self.lock().clone()
    }

    pub fn is_connected(&self, id: u64) -> bool {
        self.lock().iter().any(|voice| voice.id() == id)
    }

    /// Render interleaved output for `channels` channels starting at
    /// `first_frame`.
    ///
    /// Stereo voices are written to the first two channels; a mono device
    /// receives the average of left and right. Extra channels are silent.
    pub fn render(&self, out: &mut [f32], channels: usize, first_frame: u64) {
        out.fill(0.0);
        if channels == 0 {
            return;
        }

        let mut voices = self.lock();
        if voices.is_empty() {
            return;
        }

        // Snapshot automation once per buffer
        let gains: Vec<GainAutomation> = voices.iter().map(|voice| voice.gain().clone()).collect();

        for (frame_idx, frame_out) in out.chunks_mut(channels).enumerate() {
            let device_frame = first_frame + frame_idx as u64;
            let mut mixed = AudioFrame::zero();

            for (voice, gain) in voices.iter().zip(gains.iter()) {
                if voice.is_halted() {
                    continue;
                }
                if let Some(frame) = voice.render_frame(gain, device_frame) {
                    mixed.add(&frame);
                }
            }

            mixed.clamp();
            if channels == 1 {
                frame_out[0] = (mixed.left + mixed.right) * 0.5;
            } else {
                frame_out[0] = mixed.left;
                frame_out[1] = mixed.right;
            }
        }

        let frames = (out.len() / channels) as u64;
        voices.retain(|voice| !voice.is_finished_at(first_frame + frames));
    }
}
