use crate::config::LlmConfig;
use crate::error::Result;
use crate::llm::client::TextGenerator;
use crate::models::SampleRecord;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::debug;

/// Builds the cluster prompt and asks the generator for a summary
#[derive(Clone)]
pub struct ClusterSummarizer {
    generator: Arc<dyn TextGenerator>,
    pause: Duration,
}

impl ClusterSummarizer {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self {
            generator,
            pause: Duration::ZERO,
        }
    }

    pub fn from_config(generator: Arc<dyn TextGenerator>, config: &LlmConfig) -> Self {
        Self::new(generator).with_pause(Duration::from_millis(config.sleep_between_calls_ms))
    }

    /// Pause after every call, successful or not
    pub fn with_pause(mut self, pause: Duration) -> Self {
        self.pause = pause;
        self
    }

    pub fn generator_name(&self) -> &str {
        self.generator.name()
    }

    /// Summarize one cluster from its sampled incidents
    pub async fn summarize(&self, cluster_id: usize, samples: &[SampleRecord]) -> Result<String> {
        let prompt = build_prompt(cluster_id, samples)?;
        debug!(cluster_id, samples = samples.len(), "Requesting cluster summary");

        let result = self.generator.generate(&prompt).await;
        if !self.pause.is_zero() {
            sleep(self.pause).await;
        }
        result.map(|text| text.trim().to_string())
    }
}

/// Prompt sent for one cluster, samples embedded as JSON
pub fn build_prompt(cluster_id: usize, samples: &[SampleRecord]) -> Result<String> {
    let samples_json = serde_json::to_string_pretty(samples)?;

    Ok(format!(
        "You are an EMS incident analysis expert.\n\
         \n\
         Below are example incidents from cluster {cluster_id}.\n\
         Each contains time metrics (turnout, response, scene, cycle),\n\
         protocol used, primary impression, age group and disposition.\n\
         \n\
         Your tasks:\n\
         1. Describe the type of incidents generally in this cluster.\n\
         2. Identify dominant operational patterns (fast/slow response, delays).\n\
         3. Identify clinical severity patterns (ALS/BLS, protocol severity).\n\
         4. Assign a final risk label: HIGH / MEDIUM / LOW.\n\
         5. Provide a concise explanation for the risk label.\n\
         \n\
         Samples:\n\
         {samples_json}\n\
         \n\
         Return a clean, human-readable summary. No code, no markdown fences.\n"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::models::Incident;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct EchoGenerator {
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl TextGenerator for EchoGenerator {
        async fn generate(&self, prompt: &str) -> Result<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            Ok("  Minor lift assist calls.  \n".to_string())
        }

        fn name(&self) -> &str {
            "echo"
        }
    }

    struct FailingGenerator;

    #[async_trait]
    impl TextGenerator for FailingGenerator {
        async fn generate(&self, _prompt: &str) -> Result<String> {
            Err(AppError::Collaborator {
                collaborator: "failing".to_string(),
                message: "unreachable".to_string(),
            })
        }

        fn name(&self) -> &str {
            "failing"
        }
    }

    #[test]
    fn test_prompt_embeds_samples() {
        let samples = vec![SampleRecord::from(
            &Incident::new("E-1").with_impression("Cardiac Arrest"),
        )];
        let prompt = build_prompt(4, &samples).unwrap();

        assert!(prompt.contains("cluster 4"));
        assert!(prompt.contains("HIGH / MEDIUM / LOW"));
        assert!(prompt.contains("\"impression\": \"Cardiac Arrest\""));
        assert!(prompt.contains("\"incident_id\": \"E-1\""));
    }

    #[tokio::test]
    async fn test_summary_is_trimmed() {
        let generator = Arc::new(EchoGenerator {
            prompts: Mutex::new(Vec::new()),
        });
        let summarizer = ClusterSummarizer::new(generator.clone());
        let summary = summarizer.summarize(0, &[]).await.unwrap();

        assert_eq!(summary, "Minor lift assist calls.");
        assert_eq!(generator.prompts.lock().unwrap().len(), 1);
        assert_eq!(summarizer.generator_name(), "echo");
    }

    #[tokio::test]
    async fn test_failure_is_propagated() {
        let summarizer = ClusterSummarizer::new(Arc::new(FailingGenerator));
        let err = summarizer.summarize(1, &[]).await.unwrap_err();
        assert_eq!(err.error_code(), "COLLABORATOR_ERROR");
    }
}
