//! Truncates overlong speech and subtitle text.

use async_trait::async_trait;

use kg_domain::config::PipelineConfig;
use kg_domain::params::ExpressionParameters;
use kg_domain::Result;

use crate::Pipeline;

/// Clamps `tts_text` and `subtitle_text` to a maximum character count,
/// appending an ellipsis when something was cut. TTS engines and subtitle
/// overlays both degrade badly on unbounded input.
pub struct TextLengthPipeline {
    max_chars: usize,
}

impl TextLengthPipeline {
    pub fn new(max_chars: usize) -> Self {
        Self { max_chars }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.opt::<usize>("max_chars").unwrap_or(220))
    }

    fn truncate(&self, text: &str) -> String {
        if text.chars().count() <= self.max_chars {
            return text.to_string();
        }
        let kept: String = text.chars().take(self.max_chars).collect();
        format!("{}…", kept.trim_end())
    }
}

#[async_trait]
impl Pipeline<ExpressionParameters> for TextLengthPipeline {
    fn name(&self) -> &str {
        "length_limit"
    }

    fn default_priority(&self) -> i32 {
        200
    }

    async fn process(
        &self,
        mut params: ExpressionParameters,
    ) -> Result<Option<ExpressionParameters>> {
        params.tts_text = self.truncate(&params.tts_text);
        params.subtitle_text = self.truncate(&params.subtitle_text);
        Ok(Some(params))
    }
}
