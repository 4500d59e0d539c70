//! Audio synthesis of debate turns.
//!
//! Text is split into short chunks, synthesized chunk by chunk, joined with
//! short pauses and written to a WAV file whose path is the artifact reference.

use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::error::DebateError;

/// Output sample rate of the synthesizer.
pub const SAMPLE_RATE: u32 = 24_000;

/// Longest chunk the synthesizer handles reliably.
pub const MAX_CHUNK_CHARS: usize = 200;

/// Pause between chunks, in seconds.
const CHUNK_GAP_SECONDS: f32 = 0.3;

/// Trailing silence so playback is not cut off, in seconds.
const TRAILING_PAD_SECONDS: f32 = 0.5;

/// Split text into chunks that are safe for synthesis.
///
/// Splits on sentence punctuation first, then on commas for overlong sentences.
pub fn split_into_chunks(text: &str, max_chars: usize) -> Vec<String> {
    fn flush(current: &mut String, chunks: &mut Vec<String>) {
        if !current.trim().is_empty() {
            chunks.push(current.trim().to_string());
        }
        current.clear();
    }

    let mut chunks = Vec::new();
    let mut current = String::new();

    for sentence in text.split_inclusive(&['.', '!', '?', ';'][..]) {
        let sentence = sentence.trim();
        if sentence.is_empty() {
            continue;
        }

        if current.len() + sentence.len() <= max_chars {
            current.push_str(sentence);
            current.push(' ');
            continue;
        }

        flush(&mut current, &mut chunks);

        if sentence.len() <= max_chars {
            current.push_str(sentence);
            current.push(' ');
            continue;
        }

        for part in sentence.split_inclusive(',') {
            let part = part.trim();
            if part.len() > max_chars {
                flush(&mut current, &mut chunks);
                split_words(part, max_chars, &mut current, &mut chunks);
                continue;
            }
            if current.len() + part.len() > max_chars {
                flush(&mut current, &mut chunks);
            }
            current.push_str(part);
            current.push(' ');
        }
    }

    flush(&mut current, &mut chunks);
    chunks
}

/// Pack an overlong piece word by word, cutting inside words that exceed the limit.
fn split_words(piece: &str, max_chars: usize, current: &mut String, chunks: &mut Vec<String>) {
    for mut word in piece.split_whitespace() {
        while word.len() > max_chars {
            if !current.trim().is_empty() {
                chunks.push(current.trim().to_string());
            }
            current.clear();

            let mut cut = max_chars;
            while cut > 0 && !word.is_char_boundary(cut) {
                cut -= 1;
            }
            if cut == 0 {
                cut = word.chars().next().map_or(word.len(), char::len_utf8);
            }
            chunks.push(word[..cut].to_string());
            word = &word[cut..];
        }

        if current.len() + word.len() > max_chars {
            if !current.trim().is_empty() {
                chunks.push(current.trim().to_string());
            }
            current.clear();
        }
        if !word.is_empty() {
            current.push_str(word);
            current.push(' ');
        }
    }
}

/// Combine multiple audio segments with silence gaps.
pub fn combine_audio_segments(segments: Vec<Vec<f32>>, gap_seconds: f32, sample_rate: u32) -> Vec<f32> {
    let gap_samples = (gap_seconds * sample_rate as f32) as usize;
    let silence = vec![0.0; gap_samples];

    let mut combined = Vec::new();
    for (i, segment) in segments.into_iter().enumerate() {
        if i > 0 {
            combined.extend(&silence);
        }
        combined.extend(segment);
    }
    combined
}

/// Append trailing silence so the last word is not clipped.
fn pad_tail(mut samples: Vec<f32>, sample_rate: u32) -> Vec<f32> {
    let pad = (TRAILING_PAD_SECONDS * sample_rate as f32) as usize;
    samples.extend(std::iter::repeat_n(0.0, pad));
    samples
}

/// Unique file name for one speaker's turn.
pub fn artifact_filename(speaker: &str) -> String {
    let sanitized: String = speaker
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .take(40)
        .collect();

    format!("{}-{}.wav", sanitized, Uuid::new_v4().simple())
}

/// Write mono samples as 16-bit PCM.
pub fn write_wav(path: &Path, samples: &[f32], sample_rate: u32) -> Result<(), DebateError> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = hound::WavWriter::create(path, spec)
        .map_err(|e| DebateError::Audio(format!("Failed to create WAV {}: {}", path.display(), e)))?;
    for sample in samples {
        let pcm = (sample.clamp(-1.0, 1.0) * f32::from(i16::MAX)) as i16;
        writer
            .write_sample(pcm)
            .map_err(|e| DebateError::Audio(format!("Failed to write WAV: {}", e)))?;
    }
    writer
        .finalize()
        .map_err(|e| DebateError::Audio(format!("Failed to finalize WAV: {}", e)))
}

/// Join synthesized chunks and write them under `output_dir`.
///
/// Returns the written path as the artifact reference.
#[cfg_attr(not(feature = "kokoro"), allow(dead_code))]
pub(crate) fn store_segments(
    output_dir: &Path,
    speaker: &str,
    segments: Vec<Vec<f32>>,
) -> Result<PathBuf, DebateError> {
    std::fs::create_dir_all(output_dir).map_err(|e| {
        DebateError::Audio(format!("Failed to create {}: {}", output_dir.display(), e))
    })?;

    let samples = pad_tail(
        combine_audio_segments(segments, CHUNK_GAP_SECONDS, SAMPLE_RATE),
        SAMPLE_RATE,
    );
    let path = output_dir.join(artifact_filename(speaker));
    write_wav(&path, &samples, SAMPLE_RATE)?;
    Ok(path)
}

/// Render every chunk on the blocking pool, then store the joined audio.
///
/// Keeps CPU-bound inference off the async workers that drive other debates.
#[cfg_attr(not(feature = "kokoro"), allow(dead_code))]
pub(crate) async fn render_blocking<F>(
    chunks: Vec<String>,
    output_dir: PathBuf,
    speaker: String,
    mut render: F,
) -> Result<PathBuf, DebateError>
where
    F: FnMut(&str) -> Result<Vec<f32>, DebateError> + Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let segments = chunks
            .iter()
            .map(|chunk| render(chunk))
            .collect::<Result<Vec<_>, _>>()?;
        store_segments(&output_dir, &speaker, segments)
    })
    .await
    .map_err(|e| DebateError::Audio(format!("Synthesis task failed: {}", e)))?
}

#[cfg(feature = "kokoro")]
pub use kokoro::KokoroSynthesizer;

#[cfg(feature = "kokoro")]
mod kokoro {
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::sync::Arc;

    use async_trait::async_trait;
    use kokoro_tiny::TtsEngine;
    use parking_lot::Mutex;
    use tracing::debug;

    use super::{MAX_CHUNK_CHARS, render_blocking, split_into_chunks};
    use crate::capability::AudioSynthesizer;
    use crate::config::Config;
    use crate::error::DebateError;

    /// Local kokoro-tiny synthesizer. Downloads its model on first run.
    ///
    /// Inference is CPU-bound and runs on the blocking pool.
    pub struct KokoroSynthesizer {
        engine: Arc<Mutex<TtsEngine>>,
        available_voices: Vec<String>,
        voices: HashMap<String, String>,
        default_voice: String,
        output_dir: PathBuf,
    }

    impl KokoroSynthesizer {
        pub async fn new(config: &Config) -> Result<Self, DebateError> {
            let engine = TtsEngine::new()
                .await
                .map_err(|e| DebateError::Audio(format!("Failed to initialize TTS: {}", e)))?;
            let available_voices = engine.voices();

            let synth = Self {
                engine: Arc::new(Mutex::new(engine)),
                available_voices,
                voices: config
                    .participants
                    .iter()
                    .map(|p| (p.name.clone(), config.get_voice(p).to_string()))
                    .collect(),
                default_voice: config.audio.default_voice.clone(),
                output_dir: config.audio.output_dir.clone(),
            };

            synth.validate_voice(&synth.default_voice)?;
            for voice in synth.voices.values() {
                synth.validate_voice(voice)?;
            }
            Ok(synth)
        }

        fn validate_voice(&self, voice_id: &str) -> Result<(), DebateError> {
            if self.available_voices.iter().any(|v| v == voice_id) {
                return Ok(());
            }
            let mut english: Vec<&str> = self
                .available_voices
                .iter()
                .map(String::as_str)
                .filter(|v| ["af_", "am_", "bf_", "bm_"].iter().any(|p| v.starts_with(p)))
                .collect();
            english.sort_unstable();
            Err(DebateError::Audio(format!(
                "Unknown voice '{}'. Available voices: {}",
                voice_id,
                english.join(", ")
            )))
        }

        fn voice_for(&self, speaker: &str) -> &str {
            self.voices
                .get(speaker)
                .map(String::as_str)
                .unwrap_or(&self.default_voice)
        }
    }

    #[async_trait]
    impl AudioSynthesizer for KokoroSynthesizer {
        async fn synthesize(&self, text: &str, speaker: &str) -> Result<String, DebateError> {
            let engine = Arc::clone(&self.engine);
            let voice = self.voice_for(speaker).to_string();
            let path = render_blocking(
                split_into_chunks(text, MAX_CHUNK_CHARS),
                self.output_dir.clone(),
                speaker.to_string(),
                move |chunk| {
                    engine
                        .lock()
                        .synthesize(chunk, Some(voice.as_str()))
                        .map_err(|e| DebateError::Audio(format!("Synthesis failed: {}", e)))
                },
            )
            .await?;

            debug!(speaker, path = %path.display(), "synthesized turn audio");
            Ok(path.display().to_string())
        }
    }
}
