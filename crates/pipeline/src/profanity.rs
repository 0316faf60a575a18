//! Word-list substitution on outgoing speech and subtitles.

use async_trait::async_trait;
use regex::Regex;

use kg_domain::config::PipelineConfig;
use kg_domain::params::ExpressionParameters;
use kg_domain::{Error, Result};

use crate::Pipeline;

/// Replaces configured words (and optional extra regex patterns) in
/// `tts_text` and `subtitle_text`.
pub struct ProfanityPipeline {
    patterns: Vec<Regex>,
    replacement: String,
}

impl ProfanityPipeline {
    pub fn new(words: &[String], patterns: &[String], replacement: String) -> Result<Self> {
        let mut compiled = Vec::new();

        if !words.is_empty() {
            let escaped: Vec<String> = words.iter().map(|w| regex::escape(w)).collect();
            let joined = format!(r"(?i)\b(?:{})\b", escaped.join("|"));
            compiled.push(Regex::new(&joined).map_err(|e| Error::Config(e.to_string()))?);
        }
        for pattern in patterns {
            compiled.push(
                Regex::new(pattern)
                    .map_err(|e| Error::Config(format!("bad profanity pattern {pattern}: {e}")))?,
            );
        }

        Ok(Self {
            patterns: compiled,
            replacement,
        })
    }

    pub fn from_config(config: &PipelineConfig) -> Result<Self> {
        Self::new(
            &config.opt::<Vec<String>>("words").unwrap_or_default(),
            &config.opt::<Vec<String>>("patterns").unwrap_or_default(),
            config
                .opt::<String>("replacement")
                .unwrap_or_else(|| "***".into()),
        )
    }

    fn clean(&self, text: &str) -> String {
        let mut cleaned = text.to_string();
        for pattern in &self.patterns {
            cleaned = pattern
                .replace_all(&cleaned, self.replacement.as_str())
                .into_owned();
        }
        cleaned
    }
}

#[async_trait]
impl Pipeline<ExpressionParameters> for ProfanityPipeline {
    fn name(&self) -> &str {
        "profanity"
    }

    fn default_priority(&self) -> i32 {
        100
    }

    async fn process(
        &self,
        mut params: ExpressionParameters,
    ) -> Result<Option<ExpressionParameters>> {
        params.tts_text = self.clean(&params.tts_text);
        params.subtitle_text = self.clean(&params.subtitle_text);
        Ok(Some(params))
    }
}
