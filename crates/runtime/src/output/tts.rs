//! TTS output provider.
//!
//! Synthesizes speech for `tts_text` and publishes the audio onto the
//! shared broadcast channel so playback and lip-sync consumers observe
//! the same stream. The in-core synthesizer is a deterministic placeholder
//! (silence shaped to the text length at the configured sample rate);
//! real voice engines are leaf collaborators that replace `synthesize`.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use kg_domain::params::ExpressionParameters;
use kg_domain::{Error, Result};

use crate::audio::{AudioBroadcast, AudioFrame};
use crate::context::ProviderContext;
use crate::traits::OutputProvider;

/// Bytes of PCM emitted per chunk.
const CHUNK_BYTES: usize = 3200;

pub struct TtsOutput {
    sample_rate: u32,
    /// Synthetic speaking rate: seconds of audio per character.
    secs_per_char: f64,
    audio: Mutex<Option<Arc<AudioBroadcast>>>,
}

impl TtsOutput {
    pub fn from_config(config: &toml::Value) -> Result<Self> {
        let sample_rate = config
            .get("sample_rate")
            .and_then(|v| v.as_integer())
            .unwrap_or(16_000) as u32;
        let secs_per_char = config
            .get("secs_per_char")
            .and_then(|v| v.as_float())
            .unwrap_or(0.06);
        Ok(Self {
            sample_rate,
            secs_per_char,
            audio: Mutex::new(None),
        })
    }

    /// 16-bit mono PCM sized to the utterance length.
    fn synthesize(&self, text: &str) -> Vec<u8> {
        let seconds = text.chars().count() as f64 * self.secs_per_char;
        let samples = (seconds * f64::from(self.sample_rate)) as usize;
        vec![0u8; samples * 2]
    }
}

#[async_trait]
impl OutputProvider for TtsOutput {
    fn name(&self) -> &str {
        "tts"
    }

    async fn setup(&self, ctx: &ProviderContext) -> Result<()> {
        *self.audio.lock() = Some(ctx.audio.clone());
        Ok(())
    }

    async fn render(&self, params: &ExpressionParameters) -> Result<()> {
        if !params.tts_enabled || params.tts_text.is_empty() {
            return Ok(());
        }
        let audio = self
            .audio
            .lock()
            .clone()
            .ok_or_else(|| Error::Other("setup was not called".into()))?;

        let pcm = self.synthesize(&params.tts_text);
        tracing::debug!(
            text = %params.tts_text,
            bytes = pcm.len(),
            "tts synthesis complete"
        );

        audio.publish(AudioFrame::Start {
            sample_rate: self.sample_rate,
            channels: 1,
        });
        for chunk in pcm.chunks(CHUNK_BYTES) {
            audio.publish(AudioFrame::Chunk(Arc::new(chunk.to_vec())));
            // Pace roughly like real synthesis so consumers see a stream,
            // not a burst.
            tokio::task::yield_now().await;
        }
        audio.publish(AudioFrame::End);
        Ok(())
    }

    async fn cleanup(&self) -> Result<()> {
        self.audio.lock().take();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::AudioSink;
    use std::time::Duration;

    struct Counter {
        frames: Arc<Mutex<(u32, u32, u32)>>,
    }

    #[async_trait]
    impl AudioSink for Counter {
        async fn on_start(&self, _: u32, _: u16) {
            self.frames.lock().0 += 1;
        }
        async fn on_chunk(&self, _: &[u8]) {
            self.frames.lock().1 += 1;
        }
        async fn on_end(&self) {
            self.frames.lock().2 += 1;
        }
    }

    #[tokio::test]
    async fn speech_is_framed_start_chunks_end() {
        let audio = Arc::new(AudioBroadcast::new(256));
        let frames = Arc::new(Mutex::new((0, 0, 0)));
        audio.subscribe("counter", Arc::new(Counter { frames: frames.clone() }));

        let output = TtsOutput::from_config(&toml::Value::Table(Default::default())).unwrap();
        *output.audio.lock() = Some(audio);

        let params = ExpressionParameters::new("hello out there", "x");
        output.render(&params).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let (starts, chunks, ends) = *frames.lock();
        assert_eq!(starts, 1);
        assert!(chunks >= 1);
        assert_eq!(ends, 1);
    }

    #[tokio::test]
    async fn disabled_tts_publishes_nothing() {
        let audio = Arc::new(AudioBroadcast::new(256));
        let frames = Arc::new(Mutex::new((0, 0, 0)));
        audio.subscribe("counter", Arc::new(Counter { frames: frames.clone() }));

        let output = TtsOutput::from_config(&toml::Value::Table(Default::default())).unwrap();
        *output.audio.lock() = Some(audio);

        let mut params = ExpressionParameters::new("hello", "x");
        params.tts_enabled = false;
        output.render(&params).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(*frames.lock(), (0, 0, 0));
    }
}
