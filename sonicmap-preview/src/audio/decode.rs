//! Clip decoder using symphonia
//!
//! Decodes a fetched clip held in memory to interleaved stereo f32.
//!
//! # Sample Format
//!
//! - Output: Stereo f32 samples (interleaved: [L, R, L, R, ...])
//! - Mono clips: duplicated to stereo
//! - Multi-channel: downmixed to stereo

use crate::audio::resampler::Resampler;
use crate::audio::types::DecodedClip;
use crate::error::{Error, Result};
use std::io::Cursor;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, warn};

/// Guess a container extension from a locator ("…/clip.mp3?sig=…" → "mp3").
pub fn extension_hint(locator: &str) -> Option<&str> {
    let path = locator.split(['?', '#']).next().unwrap_or(locator);
    let file_name = path.rsplit('/').next()?;
    let (_, ext) = file_name.rsplit_once('.')?;
    if ext.is_empty() || ext.len() > 5 {
        return None;
    }
    Some(ext)
}

/// Decode a clip and convert it to the output rate.
///
/// This is CPU-bound; callers run it on the blocking pool.
pub fn decode_clip(bytes: Vec<u8>, extension: Option<&str>, output_rate: u32) -> Result<DecodedClip> {
    let (samples, sample_rate) = decode_to_stereo(bytes, extension)?;
    let samples = Resampler::resample(&samples, sample_rate, output_rate, 2)?;
    Ok(DecodedClip::new(samples, output_rate))
}

/// Decode every packet of the default audio track.
///
/// # Returns
/// - interleaved stereo samples
/// - native sample rate
pub fn decode_to_stereo(bytes: Vec<u8>, extension: Option<&str>) -> Result<(Vec<f32>, u32)> {
    if bytes.is_empty() {
        return Err(Error::Decode("Empty clip".to_string()));
    }

    let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes)), Default::default());

    // Create a hint to help the format registry guess the format
    let mut hint = Hint::new();
    if let Some(ext) = extension {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| Error::Decode(format!("Failed to probe format: {}", e)))?;

    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| Error::Decode("No audio track found".to_string()))?;

    let track_id = track.id;
    let codec_params = track.codec_params.clone();

    let sample_rate = codec_params
        .sample_rate
        .ok_or_else(|| Error::Decode("Sample rate not found".to_string()))?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&codec_params, &DecoderOptions::default())
        .map_err(|e| Error::Decode(format!("Failed to create decoder: {}", e)))?;

    let mut stereo = Vec::new();
    let mut sample_buf: Option<SampleBuffer<f32>> = None;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(ref e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => {
                warn!("Error reading packet: {}", e);
                break;
            }
        };

        // Skip packets for other tracks
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(e)) => {
                // Corrupt packet; keep going
                warn!("Decode error: {}", e);
                continue;
            }
            Err(e) => return Err(Error::Decode(format!("Decoder failed: {}", e))),
        };

        let spec = *decoded.spec();
        let channels = spec.channels.count();
        let frames = decoded.capacity() as u64;

        let needs_alloc = sample_buf
            .as_ref()
            .map_or(true, |buf| buf.capacity() < decoded.capacity() * channels);
        if needs_alloc {
            sample_buf = Some(SampleBuffer::<f32>::new(frames, spec));
        }
        let Some(buf) = sample_buf.as_mut() else {
            continue;
        };
        buf.copy_interleaved_ref(decoded);
        append_stereo(buf.samples(), channels, &mut stereo);
    }

    if stereo.is_empty() {
        return Err(Error::Decode("Clip contains no audio frames".to_string()));
    }

    debug!(
        "Decoded {} frames at {}Hz",
        stereo.len() / 2,
        sample_rate
    );

    Ok((stereo, sample_rate))
}

/// Append interleaved `channels`-wide samples to `output` as stereo.
fn append_stereo(samples: &[f32], channels: usize, output: &mut Vec<f32>) {
    match channels {
        0 => {}
        1 => {
            // Mono: duplicate to stereo
            output.reserve(samples.len() * 2);
            for &sample in samples {
                output.push(sample);
                output.push(sample);
            }
        }
        2 => output.extend_from_slice(samples),
        _ => {
            // Multi-channel: even channels to the left, odd to the right
            let half = channels as f32 / 2.0;
            for frame in samples.chunks_exact(channels) {
                let mut left = 0.0f32;
                let mut right = 0.0f32;
                for (ch_idx, &sample) in frame.iter().enumerate() {
                    if ch_idx % 2 == 0 {
                        left += sample;
                    } else {
                        right += sample;
                    }
                }
                output.push(left / half);
                output.push(right / half);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hound::{WavSpec, WavWriter};

    fn wav_bytes(channels: u16, sample_rate: u32, frames: usize) -> Vec<u8> {
        let spec = WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut bytes = Vec::new();
        {
            let mut writer = WavWriter::new(Cursor::new(&mut bytes), spec).unwrap();
            for i in 0..frames {
                let sample = ((i % 100) as i16 - 50) * 200;
                for _ in 0..channels {
                    writer.write_sample(sample).unwrap();
                }
            }
            writer.finalize().unwrap();
        }
        bytes
    }

    #[test]
    fn test_extension_hint() {
        assert_eq!(extension_hint("https://cdn.example.com/a/jazz.mp3?sig=abc"), Some("mp3"));
        assert_eq!(extension_hint("clips/blues.wav"), Some("wav"));
        assert_eq!(extension_hint("https://p.scdn.co/mp3-preview/d1a1a7b5"), None);
    }

    #[test]
    fn test_decode_stereo_wav() {
        let bytes = wav_bytes(2, 8000, 8000);
        let (samples, rate) = decode_to_stereo(bytes, Some("wav")).unwrap();

        assert_eq!(rate, 8000);
        assert_eq!(samples.len(), 8000 * 2);
    }

    #[test]
    fn test_decode_mono_duplicates_to_stereo() {
        let bytes = wav_bytes(1, 8000, 400);
        let (samples, _) = decode_to_stereo(bytes, None).unwrap();

        assert_eq!(samples.len(), 800);
        for frame in samples.chunks_exact(2) {
            assert_eq!(frame[0], frame[1]);
        }
    }

    #[test]
    fn test_decode_clip_keeps_rate_when_matching() {
        let clip = decode_clip(wav_bytes(2, 44100, 44100), Some("wav"), 44100).unwrap();
        assert_eq!(clip.sample_rate(), 44100);
        assert!((clip.duration_secs() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_garbage_is_decode_error() {
        let result = decode_to_stereo(b"definitely not audio".to_vec(), Some("mp3"));
        assert!(matches!(result, Err(Error::Decode(_))));
    }

    #[test]
    fn test_empty_bytes_is_decode_error() {
        assert!(matches!(decode_to_stereo(Vec::new(), None), Err(Error::Decode(_))));
    }

    #[test]
    fn test_multichannel_downmix() {
        let mut out = Vec::new();
        append_stereo(&[0.2, 0.4, 0.6, 0.8], 4, &mut out);
        assert_eq!(out.len(), 2);
        assert!((out[0] - 0.4).abs() < 1e-6);
        assert!((out[1] - 0.6).abs() < 1e-6);
    }
}
