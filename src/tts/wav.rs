//! LINEAR16 WAV encoding/decoding for the stitching pipeline.
//!
//! The synthesis backend is asked for LINEAR16 so chunk durations can be
//! measured exactly from the PCM sample count. Samples stay `i16` end to end,
//! which makes concatenation lossless.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum WavError {
    #[error("WAV data too short")]
    TooShort,
    #[error("invalid WAV header")]
    InvalidHeader,
    #[error("unsupported WAV format: {0}")]
    Unsupported(String),
    #[error("no data chunk in WAV")]
    NoDataChunk,
}

/// Decoded mono PCM audio.
#[derive(Debug, Clone, PartialEq)]
pub struct PcmAudio {
    pub samples: Vec<i16>,
    pub sample_rate: u32,
}

impl PcmAudio {
    pub fn empty(sample_rate: u32) -> Self {
        Self {
            samples: Vec::new(),
            sample_rate,
        }
    }

    /// Exact duration measured from the sample count.
    pub fn duration_seconds(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }

    /// Serialize to a 16-bit mono PCM WAV byte stream.
    pub fn to_wav(&self) -> Vec<u8> {
        let data_size = self.samples.len() * 2;
        let byte_rate = self.sample_rate * 2;
        let file_size = 36 + data_size;

        let mut buffer = Vec::with_capacity(44 + data_size);

        buffer.extend_from_slice(b"RIFF");
        buffer.extend_from_slice(&(file_size as u32).to_le_bytes());
        buffer.extend_from_slice(b"WAVE");
        buffer.extend_from_slice(b"fmt ");
        buffer.extend_from_slice(&16u32.to_le_bytes());
        buffer.extend_from_slice(&1u16.to_le_bytes()); // PCM format
        buffer.extend_from_slice(&1u16.to_le_bytes()); // Mono
        buffer.extend_from_slice(&self.sample_rate.to_le_bytes());
        buffer.extend_from_slice(&byte_rate.to_le_bytes());
        buffer.extend_from_slice(&2u16.to_le_bytes()); // Block align
        buffer.extend_from_slice(&16u16.to_le_bytes()); // Bits per sample
        buffer.extend_from_slice(b"data");
        buffer.extend_from_slice(&(data_size as u32).to_le_bytes());

        for sample in &self.samples {
            buffer.extend_from_slice(&sample.to_le_bytes());
        }

        buffer
    }
}

/// Parse a 16-bit PCM mono WAV stream.
///
/// Walks the RIFF chunks: reads `fmt ` for the sample rate, then extracts the
/// `data` chunk as i16 samples.
pub fn decode_wav(wav_bytes: &[u8]) -> Result<PcmAudio, WavError> {
    if wav_bytes.len() < 44 {
        return Err(WavError::TooShort);
    }

    if &wav_bytes[0..4] != b"RIFF" || &wav_bytes[8..12] != b"WAVE" {
        return Err(WavError::InvalidHeader);
    }

    let mut sample_rate: Option<u32> = None;
    let mut pos = 12;

    while pos + 8 <= wav_bytes.len() {
        let chunk_id = &wav_bytes[pos..pos + 4];
        let chunk_size = u32::from_le_bytes([
            wav_bytes[pos + 4],
            wav_bytes[pos + 5],
            wav_bytes[pos + 6],
            wav_bytes[pos + 7],
        ]) as usize;

        if chunk_id == b"fmt " {
            if pos + 8 + 16 > wav_bytes.len() {
                return Err(WavError::TooShort);
            }
            let fmt = &wav_bytes[pos + 8..];
            let audio_format = u16::from_le_bytes([fmt[0], fmt[1]]);
            let channels = u16::from_le_bytes([fmt[2], fmt[3]]);
            let rate = u32::from_le_bytes([fmt[4], fmt[5], fmt[6], fmt[7]]);
            let bits = u16::from_le_bytes([fmt[14], fmt[15]]);

            if audio_format != 1 {
                return Err(WavError::Unsupported(format!(
                    "audio format {} (want PCM)",
                    audio_format
                )));
            }
            if channels != 1 {
                return Err(WavError::Unsupported(format!(
                    "{} channels (want mono)",
                    channels
                )));
            }
            if bits != 16 {
                return Err(WavError::Unsupported(format!(
                    "{} bits per sample (want 16)",
                    bits
                )));
            }
            sample_rate = Some(rate);
        } else if chunk_id == b"data" {
            let rate = sample_rate.ok_or(WavError::InvalidHeader)?;
            let data_start = pos + 8;
            let data_end = (data_start + chunk_size).min(wav_bytes.len());

            let mut samples = Vec::with_capacity((data_end - data_start) / 2);
            for chunk in wav_bytes[data_start..data_end].chunks_exact(2) {
                samples.push(i16::from_le_bytes([chunk[0], chunk[1]]));
            }

            return Ok(PcmAudio {
                samples,
                sample_rate: rate,
            });
        }

        pos += 8 + chunk_size;
        // Chunks are word-aligned
        if chunk_size % 2 != 0 {
            pos += 1;
        }
    }

    Err(WavError::NoDataChunk)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Silence of the given duration, for building test fixtures.
    pub(crate) fn silence(duration_seconds: f64, sample_rate: u32) -> PcmAudio {
        let n = (duration_seconds * sample_rate as f64).round() as usize;
        PcmAudio {
            samples: vec![0i16; n],
            sample_rate,
        }
    }

    #[test]
    fn encode_decode_round_trip() {
        let pcm = PcmAudio {
            samples: vec![0, 100, -100, i16::MAX, i16::MIN, 42],
            sample_rate: 24000,
        };
        let decoded = decode_wav(&pcm.to_wav()).unwrap();
        assert_eq!(decoded, pcm);
    }

    #[test]
    fn duration_is_measured_from_samples() {
        let pcm = silence(3.0, 24000);
        assert_eq!(pcm.samples.len(), 72000);
        assert!((pcm.duration_seconds() - 3.0).abs() < 1e-9);
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(decode_wav(&[0u8; 10]), Err(WavError::TooShort)));
        assert!(matches!(
            decode_wav(&[0u8; 64]),
            Err(WavError::InvalidHeader)
        ));
    }

    #[test]
    fn rejects_stereo() {
        let pcm = silence(0.1, 24000);
        let mut bytes = pcm.to_wav();
        bytes[22] = 2; // channel count field
        assert!(matches!(decode_wav(&bytes), Err(WavError::Unsupported(_))));
    }
}
