//! In-memory WAV clips for engine tests
//!
//! Clips are generated at the headless output rate so no resampling happens
//! between fetch and playback.

use hound::{WavSpec, WavWriter};
use std::f32::consts::PI;
use std::io::Cursor;

/// Sample rate used by test clips and the headless test output
pub const TEST_SAMPLE_RATE: u32 = 8000;

/// Stereo 16-bit sine wave as WAV bytes
pub fn sine_wav(duration_secs: f64, frequency_hz: f32, amplitude: f32) -> Vec<u8> {
    let spec = WavSpec {
        channels: 2,
        sample_rate: TEST_SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = WavWriter::new(&mut cursor, spec).unwrap();
        let total_frames = (duration_secs * TEST_SAMPLE_RATE as f64).round() as usize;

        for i in 0..total_frames {
            let t = i as f32 / TEST_SAMPLE_RATE as f32;
            let sample = (amplitude * (2.0 * PI * frequency_hz * t).sin() * i16::MAX as f32) as i16;
            writer.write_sample(sample).unwrap();
            writer.write_sample(sample).unwrap();
        }
        writer.finalize().unwrap();
    }
    cursor.into_inner()
}
