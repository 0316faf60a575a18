//! Chain executor: ordered stages with per-stage error policy + timeout.

use std::sync::Arc;
use std::time::Duration;

use kg_domain::config::{PipelineConfig, PipelineErrorPolicy};
use kg_domain::Error;

use crate::Pipeline;

struct Stage<T> {
    pipeline: Arc<dyn Pipeline<T>>,
    priority: i32,
    error_handling: PipelineErrorPolicy,
    timeout: Duration,
}

/// An ordered chain of pipelines. Stages run one after another in
/// ascending priority order; the first stage to drop wins.
pub struct Chain<T> {
    stages: Vec<Stage<T>>,
}

impl<T: Clone + Send + 'static> Default for Chain<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Send + 'static> Chain<T> {
    pub fn new() -> Self {
        Self { stages: Vec::new() }
    }

    /// Add a stage, positioned by the config's `priority` (falling back to
    /// the pipeline's default).
    pub fn add(&mut self, pipeline: Arc<dyn Pipeline<T>>, config: &PipelineConfig) {
        let priority = config.priority.unwrap_or(pipeline.default_priority());
        self.stages.push(Stage {
            pipeline,
            priority,
            error_handling: config.error_handling,
            timeout: Duration::from_secs_f64(config.timeout_secs),
        });
        self.stages.sort_by_key(|s| s.priority);
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Run the value through every stage. `None` means the value was
    /// dropped; the responsible stage has already logged why.
    pub async fn run(&self, value: T) -> Option<T> {
        let mut current = value;

        for stage in &self.stages {
            let name = stage.pipeline.name();
            let before = current.clone();

            let outcome = tokio::time::timeout(
                stage.timeout,
                stage.pipeline.process(current),
            )
            .await
            .unwrap_or_else(|_| {
                Err(Error::Timeout(format!(
                    "pipeline {name} exceeded {}ms",
                    stage.timeout.as_millis()
                )))
            });

            current = match outcome {
                Ok(Some(next)) => next,
                Ok(None) => {
                    tracing::debug!(pipeline = %name, "stage dropped the value");
                    return None;
                }
                Err(e) => match stage.error_handling {
                    PipelineErrorPolicy::Continue => {
                        tracing::warn!(
                            pipeline = %name,
                            error = %e,
                            "stage failed; passing pre-stage value forward"
                        );
                        before
                    }
                    PipelineErrorPolicy::Drop => {
                        tracing::debug!(pipeline = %name, error = %e, "stage failed; dropping");
                        return None;
                    }
                    PipelineErrorPolicy::Stop => {
                        tracing::error!(
                            pipeline = %name,
                            error = %e,
                            "stage failed; aborting chain"
                        );
                        return None;
                    }
                },
            };
        }

        Some(current)
    }
}
