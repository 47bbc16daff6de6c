//! Turns raw text into one `{audio, timepoints}` asset.
//!
//! Chunks are synthesized concurrently but always stitched in original chunk
//! order: results come back in an index-ordered collection, never completion
//! order. Each chunk's offsets are re-based by the cumulative *measured*
//! duration of the audio stitched so far; estimates would accumulate drift.

use crate::sanitize::sanitize_text_for_speech;
use crate::timepoint::{AudioAsset, Timepoint, TimepointSequence};
use crate::tts::chunker::chunk_text;
use crate::tts::markup::{build_markup, decode_mark_name, ChunkMarkup, ExpectedMark};
use crate::tts::synth::{ChunkAudio, ChunkRequest, SynthesisBackend, SynthesisError, VoiceParams};
use crate::tts::wav::{decode_wav, PcmAudio};
use futures_util::future::join_all;

/// Tolerance for floating-point slack when checking the final timepoint
/// against the total duration.
const DURATION_SLACK_SECONDS: f64 = 1e-6;

/// Trailing silence beyond this after a chunk's last mark gets logged.
const TRAILING_SILENCE_WARN_SECONDS: f64 = 0.150;

/// One synthesized chunk, decoded and ready to stitch: PCM audio plus
/// chunk-local timepoints with mark names already un-escaped.
#[derive(Debug, Clone)]
struct ChunkPiece {
    pcm: PcmAudio,
    timepoints: Vec<Timepoint>,
}

/// Synthesize `text` end to end: sanitize, chunk, mark up, synthesize each
/// chunk concurrently, and stitch one global timeline.
///
/// Returns `Ok(None)` when the input contains no speakable words. Any chunk
/// failure aborts the whole operation; partial audio with missing timing is
/// worse than a clear failure.
pub async fn synthesize_document(
    backend: &dyn SynthesisBackend,
    text: &str,
    voice: &VoiceParams,
    max_chunk_chars: usize,
) -> Result<Option<AudioAsset>, SynthesisError> {
    let sanitized = sanitize_text_for_speech(text);
    let chunks = chunk_text(&sanitized, max_chunk_chars);
    if chunks.is_empty() {
        return Ok(None);
    }

    let markups: Vec<ChunkMarkup> = chunks.iter().map(|c| build_markup(&c.text)).collect();

    // Dispatch concurrently; join_all yields results in input order, keyed by
    // chunk index regardless of completion order.
    let calls = markups.iter().enumerate().map(|(index, markup)| {
        let request = ChunkRequest {
            markup: markup.ssml.clone(),
            voice: voice.clone(),
        };
        async move {
            if markup.expected.is_empty() {
                // Empty chunk: skip the backend entirely.
                return Ok(None);
            }
            let audio = backend
                .synthesize_chunk(&request)
                .await
                .map_err(|e| SynthesisError::ChunkFailed {
                    index,
                    source: Box::new(e),
                })?;
            Ok(Some(audio))
        }
    });
    let responses: Vec<Result<Option<ChunkAudio>, SynthesisError>> = join_all(calls).await;

    let mut pieces: Vec<ChunkPiece> = Vec::with_capacity(responses.len());
    let mut sample_rate: Option<u32> = None;

    for (index, (markup, response)) in markups.iter().zip(responses).enumerate() {
        let Some(audio) = response? else {
            continue;
        };
        let piece = decode_chunk(index, markup, audio, &mut sample_rate)?;
        pieces.push(piece);
    }

    assemble(pieces)
}

/// Validate and decode one backend response against the marks that were sent.
fn decode_chunk(
    index: usize,
    markup: &ChunkMarkup,
    audio: ChunkAudio,
    sample_rate: &mut Option<u32>,
) -> Result<ChunkPiece, SynthesisError> {
    if audio.timepoints.len() != markup.expected.len() {
        // Fewer/more markers than words sent: do not guess alignment.
        return Err(SynthesisError::MarkMismatch {
            index,
            expected: markup.expected.len(),
            got: audio.timepoints.len(),
        });
    }

    let pcm = decode_wav(&audio.audio).map_err(|e| SynthesisError::InvalidAudio {
        index,
        message: e.to_string(),
    })?;

    match *sample_rate {
        None => *sample_rate = Some(pcm.sample_rate),
        Some(expected) if expected != pcm.sample_rate => {
            return Err(SynthesisError::SampleRateMismatch {
                index,
                expected,
                got: pcm.sample_rate,
            });
        }
        Some(_) => {}
    }

    // Word identity comes from the marks we sent, not the echoed names; the
    // backend is only trusted for offsets. A word slot is a word timepoint
    // even when the word text happens to equal the sentinel value.
    let timepoints: Vec<Timepoint> = markup
        .expected
        .iter()
        .zip(&audio.timepoints)
        .map(|(expected, mark)| match expected {
            ExpectedMark::ParagraphBreak => Timepoint::paragraph_break(mark.offset_seconds),
            ExpectedMark::Word(escaped) => {
                Timepoint::word(decode_mark_name(escaped), mark.offset_seconds)
            }
        })
        .collect();

    let duration = pcm.duration_seconds();
    if let Some(last) = timepoints.last() {
        let trailing = duration - last.time_seconds;
        if trailing > TRAILING_SILENCE_WARN_SECONDS {
            log::warn!(
                "chunk {}: {:.0}ms of trailing silence after the last mark",
                index,
                trailing * 1000.0
            );
        }
    }
    log::debug!(
        "chunk {}: {} marks, measured duration {:.3}s",
        index,
        timepoints.len(),
        duration
    );

    Ok(ChunkPiece { pcm, timepoints })
}

/// Concatenate chunk audio and re-base local offsets into one global,
/// non-decreasing timeline.
fn assemble(pieces: Vec<ChunkPiece>) -> Result<Option<AudioAsset>, SynthesisError> {
    let Some(sample_rate) = pieces.iter().map(|p| p.pcm.sample_rate).next() else {
        return Ok(None);
    };

    let mut samples: Vec<i16> = Vec::new();
    let mut timepoints: Vec<Timepoint> = Vec::new();
    let mut cumulative_seconds = 0.0f64;

    for piece in pieces {
        for tp in piece.timepoints {
            timepoints.push(Timepoint {
                mark_name: tp.mark_name,
                time_seconds: tp.time_seconds + cumulative_seconds,
            });
        }
        cumulative_seconds += piece.pcm.duration_seconds();
        samples.extend_from_slice(&piece.pcm.samples);
    }

    let sequence = TimepointSequence::new(timepoints);

    // Invariants: non-decreasing, and nothing points past the audio end.
    if let Some(bad) = sequence
        .as_slice()
        .windows(2)
        .position(|w| w[0].time_seconds > w[1].time_seconds)
    {
        return Err(SynthesisError::NonMonotonic(bad + 1));
    }
    if sequence.last_time_seconds() > cumulative_seconds + DURATION_SLACK_SECONDS {
        return Err(SynthesisError::TimepointPastEnd {
            last_time: sequence.last_time_seconds(),
            total: cumulative_seconds,
        });
    }

    let stitched = PcmAudio {
        samples,
        sample_rate,
    };
    log::debug!(
        "stitched {:.3}s of audio with {} timepoints",
        cumulative_seconds,
        sequence.len()
    );

    Ok(Some(AudioAsset::new(stitched.to_wav(), sequence)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tts::synth::MarkOffset;
    use async_trait::async_trait;
    use regex::Regex;

    /// Deterministic stand-in for the synthesis capability: one mark every
    /// half second, silence for audio, duration measured exactly from the
    /// mark count.
    struct MockBackend {
        sample_rate: u32,
        fail_on: Option<String>,
        drop_last_mark: bool,
    }

    impl MockBackend {
        fn new() -> Self {
            Self {
                sample_rate: 24000,
                fail_on: None,
                drop_last_mark: false,
            }
        }

        fn mark_names(markup: &str) -> Vec<String> {
            let re = Regex::new(r#"<mark name="([^"]*)"/>"#).unwrap();
            re.captures_iter(markup)
                .map(|c| c[1].to_string())
                .collect()
        }
    }

    #[async_trait]
    impl SynthesisBackend for MockBackend {
        async fn synthesize_chunk(
            &self,
            request: &ChunkRequest,
        ) -> Result<ChunkAudio, SynthesisError> {
            if let Some(ref needle) = self.fail_on {
                if request.markup.contains(needle.as_str()) {
                    return Err(SynthesisError::Backend("injected failure".into()));
                }
            }

            let names = Self::mark_names(&request.markup);
            let mut timepoints: Vec<MarkOffset> = names
                .iter()
                .enumerate()
                .map(|(i, name)| MarkOffset {
                    mark_name: name.clone(),
                    offset_seconds: i as f64 * 0.5,
                })
                .collect();
            if self.drop_last_mark {
                timepoints.pop();
            }

            let duration = names.len() as f64 * 0.5;
            let pcm = PcmAudio {
                samples: vec![0i16; (duration * self.sample_rate as f64) as usize],
                sample_rate: self.sample_rate,
            };
            Ok(ChunkAudio {
                audio: pcm.to_wav(),
                timepoints,
            })
        }
    }

    fn word_names(asset: &AudioAsset) -> Vec<String> {
        asset
            .timepoints
            .iter()
            .filter(|tp| !tp.is_paragraph_break())
            .map(|tp| tp.mark_name.clone())
            .collect()
    }

    #[tokio::test]
    async fn empty_input_produces_no_asset() {
        let backend = MockBackend::new();
        let asset = synthesize_document(&backend, "", &VoiceParams::default(), 100)
            .await
            .unwrap();
        assert!(asset.is_none());
    }

    #[tokio::test]
    async fn order_preserved_across_tiny_chunks() {
        let backend = MockBackend::new();
        let asset = synthesize_document(
            &backend,
            "Alpha beta. Gamma delta.",
            &VoiceParams::default(),
            12,
        )
        .await
        .unwrap()
        .expect("asset");

        assert_eq!(
            word_names(&asset),
            vec!["Alpha", "beta.", "Gamma", "delta."]
        );
        assert!(asset.timepoints.is_monotonic());
    }

    #[tokio::test]
    async fn rebasing_uses_measured_duration() {
        let backend = MockBackend::new();
        let asset = synthesize_document(
            &backend,
            "Alpha beta. Gamma delta.",
            &VoiceParams::default(),
            12,
        )
        .await
        .unwrap()
        .expect("asset");

        // Chunk one: 2 words + sentinel = 3 marks, measured 1.5s. Chunk two's
        // first mark has local offset 0.0, so global 1.5 exactly.
        let gamma = asset
            .timepoints
            .iter()
            .find(|tp| tp.mark_name == "Gamma")
            .unwrap();
        assert!((gamma.time_seconds - 1.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn monotonic_for_multi_paragraph_input() {
        let backend = MockBackend::new();
        let text = "One two three.\n\nFour five six seven.\n\nEight nine.";
        let asset = synthesize_document(&backend, text, &VoiceParams::default(), 20)
            .await
            .unwrap()
            .expect("asset");
        assert!(asset.timepoints.is_monotonic());
        assert!(
            asset.timepoints.last_time_seconds()
                <= wav_duration(&asset.audio) + DURATION_SLACK_SECONDS
        );
    }

    #[tokio::test]
    async fn chunk_failure_aborts_the_whole_stitch() {
        let backend = MockBackend {
            fail_on: Some("Gamma".to_string()),
            ..MockBackend::new()
        };
        let err = synthesize_document(
            &backend,
            "Alpha beta. Gamma delta.",
            &VoiceParams::default(),
            12,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, SynthesisError::ChunkFailed { index: 1, .. }));
    }

    #[tokio::test]
    async fn mark_count_mismatch_is_rejected() {
        let backend = MockBackend {
            drop_last_mark: true,
            ..MockBackend::new()
        };
        let err = synthesize_document(&backend, "Alpha beta.", &VoiceParams::default(), 100)
            .await
            .unwrap_err();
        assert!(matches!(err, SynthesisError::MarkMismatch { .. }));
    }

    /// Echoes plausible offsets but garbles every mark name.
    struct GarblingBackend;

    #[async_trait]
    impl SynthesisBackend for GarblingBackend {
        async fn synthesize_chunk(
            &self,
            request: &ChunkRequest,
        ) -> Result<ChunkAudio, SynthesisError> {
            let count = MockBackend::mark_names(&request.markup).len();
            let timepoints: Vec<MarkOffset> = (0..count)
                .map(|i| MarkOffset {
                    mark_name: format!("garbled-{}", i),
                    offset_seconds: i as f64 * 0.5,
                })
                .collect();
            let pcm = PcmAudio {
                samples: vec![0i16; (count as f64 * 0.5 * 24000.0) as usize],
                sample_rate: 24000,
            };
            Ok(ChunkAudio {
                audio: pcm.to_wav(),
                timepoints,
            })
        }
    }

    #[tokio::test]
    async fn word_text_comes_from_sent_marks_not_echo() {
        let backend = GarblingBackend;
        let asset = synthesize_document(&backend, "Alpha beta gamma", &VoiceParams::default(), 100)
            .await
            .unwrap()
            .expect("asset");
        assert_eq!(word_names(&asset), vec!["Alpha", "beta", "gamma"]);
    }

    #[tokio::test]
    async fn literal_sentinel_word_keeps_its_own_timepoint() {
        let backend = MockBackend::new();
        let asset = synthesize_document(
            &backend,
            "see PARAGRAPH_BREAK here",
            &VoiceParams::default(),
            100,
        )
        .await
        .unwrap()
        .expect("asset");

        // Three word slots plus the paragraph terminator, each with its own
        // offset; the middle word is not merged into a boundary entry.
        let names: Vec<&str> = asset
            .timepoints
            .iter()
            .map(|tp| tp.mark_name.as_str())
            .collect();
        assert_eq!(
            names,
            vec!["see", "PARAGRAPH_BREAK", "here", "PARAGRAPH_BREAK"]
        );
        let times: Vec<f64> = asset.timepoints.iter().map(|tp| tp.time_seconds).collect();
        assert!(times.windows(2).all(|w| w[0] < w[1]));
    }

    #[tokio::test]
    async fn escaped_words_come_back_decoded() {
        let backend = MockBackend::new();
        let asset = synthesize_document(&backend, "AT&T \"rocks\"", &VoiceParams::default(), 100)
            .await
            .unwrap()
            .expect("asset");
        assert_eq!(word_names(&asset), vec!["AT&T", "\"rocks\""]);
    }

    #[test]
    fn assemble_rebases_by_exact_chunk_duration() {
        let rate = 24000;
        let piece = |duration: f64, words: &[(&str, f64)]| ChunkPiece {
            pcm: PcmAudio {
                samples: vec![0i16; (duration * rate as f64).round() as usize],
                sample_rate: rate,
            },
            timepoints: words
                .iter()
                .map(|(w, t)| Timepoint::word(*w, *t))
                .collect(),
        };

        let asset = assemble(vec![
            piece(3.0, &[("one", 0.0), ("two", 1.2)]),
            piece(2.4, &[("three", 0.3), ("four", 2.0)]),
        ])
        .unwrap()
        .expect("asset");

        let times: Vec<f64> = asset.timepoints.iter().map(|tp| tp.time_seconds).collect();
        let expected = [0.0, 1.2, 3.0 + 0.3, 3.0 + 2.0];
        assert_eq!(times.len(), expected.len());
        for (got, want) in times.iter().zip(expected) {
            assert!((got - want).abs() < 1e-9, "{got} != {want}");
        }
    }

    #[test]
    fn assemble_rejects_regressing_timeline() {
        let rate = 24000;
        let bad = ChunkPiece {
            pcm: PcmAudio {
                samples: vec![0i16; rate as usize],
                sample_rate: rate,
            },
            timepoints: vec![Timepoint::word("a", 0.9), Timepoint::word("b", 0.1)],
        };
        let err = assemble(vec![bad]).unwrap_err();
        assert!(matches!(err, SynthesisError::NonMonotonic(1)));
    }

    fn wav_duration(wav: &[u8]) -> f64 {
        decode_wav(wav).unwrap().duration_seconds()
    }
}
