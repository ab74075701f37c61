use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::debug;

use crate::data::{CompletionService, ModelParams};
use crate::error::PipelineError;

/// Errors that can occur while turning an agent template into a prompt
#[derive(Debug, Error)]
pub enum PopulateError {
    #[error("Required placeholder '{0}' could not be resolved")]
    MissingMandatoryPlaceholder(String),

    #[error("Invalid path '{0}' in placeholder")]
    InvalidPlaceholderPath(String),

    #[error("Agent '{0}' not found in registry")]
    AgentNotFound(String),

    #[error("Agent specification is invalid: {0}")]
    InvalidSpecification(String),

    #[error("Agent model registry is invalid: {0}")]
    InvalidRegistry(String),
}

/// Prompt pair loaded from an agent file, still carrying placeholders
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentTemplate {
    pub system_prompt: String,
    pub user_prompt: String,
}

/// Trait for loading agent templates by name
pub trait AgentRegistry: Send + Sync {
    fn get_specification(&self, agent_name: &str) -> Result<AgentTemplate, PopulateError>;
}

/// Trait for resolving model settings by agent name
pub trait AgentModelRegistry: Send + Sync {
    fn get_model(&self, agent_name: &str) -> Result<ModelParams, PopulateError>;

    /// Whether several requests for this agent may be in flight at once
    fn can_run_parallel(&self, _agent_name: &str) -> bool {
        false
    }
}

/// Agent Runner context: fills an agent template from typed input and sends
/// it through a completion service under a timeout.
pub struct AgentRunner<'a, T, R, M>
where
    T: Serialize,
    R: AgentRegistry + ?Sized,
    M: AgentModelRegistry + ?Sized,
{
    /// The agent name (role player)
    agent: String,
    /// Input data for template population
    input: T,
    agent_registry: &'a R,
    agent_model_registry: &'a M,
}

impl<'a, T, R, M> AgentRunner<'a, T, R, M>
where
    T: Serialize,
    R: AgentRegistry + ?Sized,
    M: AgentModelRegistry + ?Sized,
{
    pub fn new(
        agent: impl Into<String>,
        input: T,
        agent_registry: &'a R,
        agent_model_registry: &'a M,
    ) -> Self {
        Self {
            agent: agent.into(),
            input,
            agent_registry,
            agent_model_registry,
        }
    }

    /// Role method: agent.populate
    ///
    /// Loads the template from the registry and replaces every placeholder in
    /// both prompts with values from the input.
    pub fn populate(&self) -> Result<AgentTemplate, PopulateError> {
        let template = self.agent_registry.get_specification(&self.agent)?;
        Ok(AgentTemplate {
            system_prompt: self.replace_placeholders(&template.system_prompt)?,
            user_prompt: self.replace_placeholders(&template.user_prompt)?,
        })
    }

    /// Helper: Replace placeholders in a template
    ///
    /// Supports:
    /// - Mandatory: {{input.prop_name}}
    /// - Optional: {{input.prop_name?}}
    /// - Nested: {{input.prop1.prop2}}
    fn replace_placeholders(&self, template: &str) -> Result<String, PopulateError> {
        let input_json = serde_json::to_value(&self.input)
            .map_err(|e| PopulateError::InvalidSpecification(e.to_string()))?;

        let mut result = template.to_string();
        let mut offset = 0;

        while let Some(start) = result[offset..].find("{{") {
            let start = offset + start;
            let Some(end_pos) = result[start..].find("}}") else {
                break;
            };
            let end = start + end_pos;

            let placeholder = result[start + 2..end].trim();
            let (path, is_optional) = match placeholder.strip_suffix('?') {
                Some(path) => (path, true),
                None => (placeholder, false),
            };

            match resolve_path(&input_json, path)? {
                Some(v) => {
                    let replacement = match v {
                        serde_json::Value::String(s) => s.clone(),
                        serde_json::Value::Number(n) => n.to_string(),
                        serde_json::Value::Bool(b) => b.to_string(),
                        serde_json::Value::Null => String::new(),
                        _ => serde_json::to_string(v)
                            .map_err(|e| PopulateError::InvalidSpecification(e.to_string()))?,
                    };
                    result.replace_range(start..end + 2, &replacement);
                    offset = start + replacement.len();
                }
                None if is_optional => {
                    result.replace_range(start..end + 2, "");
                    offset = start;
                }
                None => {
                    return Err(PopulateError::MissingMandatoryPlaceholder(path.to_string()));
                }
            }
        }

        Ok(result)
    }

    /// Public function: run
    ///
    /// Resolves the model, populates the prompts and awaits one completion.
    /// Exceeding `timeout` yields `UpstreamTimeout` whatever the service does.
    pub async fn run(
        self,
        service: &dyn CompletionService,
        timeout: Duration,
    ) -> Result<String, PipelineError> {
        let params = self.agent_model_registry.get_model(&self.agent)?;
        let prompt = self.populate()?;

        debug!(
            agent = %self.agent,
            model = %params.model,
            prompt_bytes = prompt.system_prompt.len() + prompt.user_prompt.len(),
            "running agent"
        );
        let started = Instant::now();

        let output = tokio::time::timeout(
            timeout,
            service.complete(&prompt.system_prompt, &prompt.user_prompt, &params),
        )
        .await
        .map_err(|_| PipelineError::UpstreamTimeout(timeout))??;

        debug!(
            agent = %self.agent,
            elapsed_ms = started.elapsed().as_millis() as u64,
            output_bytes = output.len(),
            "agent finished"
        );
        Ok(output)
    }
}

/// Shared handles every agent call needs. Cheap to clone into spawned tasks.
#[derive(Clone)]
pub struct AgentServices {
    pub agent_registry: Arc<dyn AgentRegistry>,
    pub agent_model_registry: Arc<dyn AgentModelRegistry>,
    pub completion: Arc<dyn CompletionService>,
    pub timeout: Duration,
}

impl AgentServices {
    pub async fn run<T>(&self, agent: &str, input: T) -> Result<String, PipelineError>
    where
        T: Serialize + Send,
    {
        AgentRunner::new(
            agent,
            input,
            self.agent_registry.as_ref(),
            self.agent_model_registry.as_ref(),
        )
        .run(self.completion.as_ref(), self.timeout)
        .await
    }

    /// Whether the registry allows fan-out for `agent`.
    pub fn can_run_parallel(&self, agent: &str) -> bool {
        self.agent_model_registry.can_run_parallel(agent)
    }
}

/// Helper: Resolve a dotted path in a JSON value
///
/// Supports paths like "input.prop1.prop2"
fn resolve_path<'v>(
    value: &'v serde_json::Value,
    path: &str,
) -> Result<Option<&'v serde_json::Value>, PopulateError> {
    let mut parts = path.split('.');
    if parts.next() != Some("input") {
        return Err(PopulateError::InvalidPlaceholderPath(path.to_string()));
    }

    let mut current = value;
    for part in parts {
        match current.get(part) {
            Some(v) => current = v,
            None => return Ok(None),
        }
    }
    Ok(Some(current))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::CompletionError;
    use async_trait::async_trait;
    use serde::Serialize;
    use std::sync::Mutex;

    #[derive(Serialize)]
    struct TestInput {
        name: String,
        value: i32,
    }

    #[derive(Serialize)]
    struct NestedData {
        city: String,
        country: String,
    }

    #[derive(Serialize)]
    struct NestedTestInput {
        name: String,
        location: NestedData,
    }

    struct TestRegistry;

    impl AgentRegistry for TestRegistry {
        fn get_specification(&self, agent_name: &str) -> Result<AgentTemplate, PopulateError> {
            Ok(AgentTemplate {
                system_prompt: format!("You are {}", agent_name),
                user_prompt: "Hello {{input.name}}".to_string(),
            })
        }
    }

    struct TestModelRegistry;

    impl AgentModelRegistry for TestModelRegistry {
        fn get_model(&self, _agent_name: &str) -> Result<ModelParams, PopulateError> {
            Ok(ModelParams {
                model: "test-model".to_string(),
                ..ModelParams::default()
            })
        }
    }

    #[derive(Default)]
    struct RecordingService {
        seen: Mutex<Vec<(String, String, String)>>,
    }

    #[async_trait]
    impl CompletionService for RecordingService {
        async fn complete(
            &self,
            system_prompt: &str,
            user_prompt: &str,
            params: &ModelParams,
        ) -> Result<String, CompletionError> {
            self.seen.lock().unwrap().push((
                system_prompt.to_string(),
                user_prompt.to_string(),
                params.model.clone(),
            ));
            Ok("done".to_string())
        }
    }

    struct SlowService;

    #[async_trait]
    impl CompletionService for SlowService {
        async fn complete(
            &self,
            _system_prompt: &str,
            _user_prompt: &str,
            _params: &ModelParams,
        ) -> Result<String, CompletionError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok("late".to_string())
        }
    }

    fn runner<T: Serialize>(input: T) -> AgentRunner<'static, T, TestRegistry, TestModelRegistry> {
        AgentRunner::new("test_agent", input, &TestRegistry, &TestModelRegistry)
    }

    fn alice() -> TestInput {
        TestInput {
            name: "Alice".to_string(),
            value: 100,
        }
    }

    #[tokio::test]
    async fn test_run_sends_populated_prompts() {
        let service = RecordingService::default();
        let output = runner(alice())
            .run(&service, Duration::from_secs(1))
            .await
            .unwrap();

        assert_eq!(output, "done");
        let seen = service.seen.lock().unwrap();
        assert_eq!(
            seen[0],
            (
                "You are test_agent".to_string(),
                "Hello Alice".to_string(),
                "test-model".to_string()
            )
        );
    }

    #[tokio::test]
    async fn test_run_times_out() {
        let result = runner(alice())
            .run(&SlowService, Duration::from_millis(50))
            .await;
        assert!(matches!(result, Err(PipelineError::UpstreamTimeout(_))));
    }

    #[test]
    fn test_placeholder_replacement_mandatory() {
        let result = runner(alice())
            .replace_placeholders("Hello {{input.name}}, your value is {{input.value}}!");
        assert_eq!(result.unwrap(), "Hello Alice, your value is 100!");
    }

    #[test]
    fn test_placeholder_replacement_optional_present() {
        let result = runner(alice()).replace_placeholders("Name: {{input.name?}}");
        assert_eq!(result.unwrap(), "Name: Alice");
    }

    #[test]
    fn test_placeholder_replacement_optional_missing() {
        let result = runner(alice()).replace_placeholders("Age: {{input.age?}}");
        assert_eq!(result.unwrap(), "Age: ");
    }

    #[test]
    fn test_placeholder_replacement_mandatory_missing() {
        match runner(alice()).replace_placeholders("Missing: {{input.missing_field}}") {
            Err(PopulateError::MissingMandatoryPlaceholder(field)) => {
                assert_eq!(field, "input.missing_field");
            }
            other => panic!("Expected MissingMandatoryPlaceholder error, got {other:?}"),
        }
    }

    #[test]
    fn test_placeholder_replacement_invalid_path() {
        match runner(alice()).replace_placeholders("Invalid: {{output.field}}") {
            Err(PopulateError::InvalidPlaceholderPath(path)) => assert_eq!(path, "output.field"),
            other => panic!("Expected InvalidPlaceholderPath error, got {other:?}"),
        }
    }

    #[test]
    fn test_placeholder_replacement_nested() {
        let input = NestedTestInput {
            name: "Frank".to_string(),
            location: NestedData {
                city: "Paris".to_string(),
                country: "France".to_string(),
            },
        };
        let result = runner(input).replace_placeholders(
            "{{input.name}} lives in {{input.location.city}}, {{input.location.country}}",
        );
        assert_eq!(result.unwrap(), "Frank lives in Paris, France");
    }

    #[test]
    fn test_replacement_text_is_not_rescanned() {
        let input = TestInput {
            name: "{{input.value}}".to_string(),
            value: 1,
        };
        let result = runner(input).replace_placeholders("{{input.name}}");
        assert_eq!(result.unwrap(), "{{input.value}}");
    }
}
