use crate::contexts::{AgentModelRegistry, PopulateError};
use crate::data::ModelParams;
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use yaml_rust::Yaml;

use super::BUILTIN_MODEL_REGISTRY;

/// Agent configuration from the registry
#[derive(Clone, Debug, PartialEq)]
pub struct AgentConfig {
    pub params: ModelParams,
    pub parallel: bool,
}

/// File-based implementation of AgentModelRegistry
/// Loads agent-to-model settings from a YAML file, or from the built-in
/// registry when the project has none
#[derive(Clone)]
pub struct FileAgentModelRegistry {
    registry_path: PathBuf,
    defaults: AgentConfig,
}

impl FileAgentModelRegistry {
    /// Creates a new FileAgentModelRegistry
    ///
    /// # Arguments
    /// * `registry_path` - Optional path to registry file (defaults to "agents/agent_model_registry.yml")
    /// * `default_model` - Model used for agents missing from the registry
    /// * `default_parallel` - Parallel setting for agents missing from the registry
    pub fn new(
        registry_path: Option<PathBuf>,
        default_model: Option<String>,
        default_parallel: Option<bool>,
    ) -> Self {
        let mut params = ModelParams::default();
        if let Some(model) = default_model {
            params.model = model;
        }
        Self {
            registry_path: registry_path
                .unwrap_or_else(|| PathBuf::from("agents/agent_model_registry.yml")),
            defaults: AgentConfig {
                params,
                parallel: default_parallel.unwrap_or(false),
            },
        }
    }

    /// Loads the registry from the file
    fn load_registry(&self) -> Result<HashMap<String, AgentConfig>, PopulateError> {
        if !self.registry_path.exists() {
            return parse_registry(BUILTIN_MODEL_REGISTRY, &self.defaults);
        }

        let content = fs::read_to_string(&self.registry_path).map_err(|e| {
            PopulateError::InvalidRegistry(format!("Failed to read agent model registry: {}", e))
        })?;

        parse_registry(&content, &self.defaults)
    }

    pub fn get_config(&self, agent_name: &str) -> Result<AgentConfig, PopulateError> {
        let registry = self.load_registry()?;
        Ok(registry
            .get(agent_name)
            .or_else(|| registry.get("default"))
            .cloned()
            .unwrap_or_else(|| self.defaults.clone()))
    }
}

impl AgentModelRegistry for FileAgentModelRegistry {
    fn get_model(&self, agent_name: &str) -> Result<ModelParams, PopulateError> {
        self.get_config(agent_name).map(|config| config.params)
    }

    fn can_run_parallel(&self, agent_name: &str) -> bool {
        self.get_config(agent_name)
            .map(|config| config.parallel)
            .unwrap_or(self.defaults.parallel)
    }
}

/// Parses the YAML registry file into a HashMap
/// Supports both the short format (model name only) and the long format
/// (object with model, temperature, max_steps, max_tokens, parallel).
/// A top-level `default` entry replaces the built-in defaults for every
/// agent without an entry of its own.
fn parse_registry(
    yaml_content: &str,
    defaults: &AgentConfig,
) -> Result<HashMap<String, AgentConfig>, PopulateError> {
    use yaml_rust::YamlLoader;

    let docs = YamlLoader::load_from_str(yaml_content)
        .map_err(|e| PopulateError::InvalidRegistry(format!("Invalid registry YAML: {}", e)))?;

    let Some(hash) = docs.first().and_then(|doc| doc.as_hash()) else {
        return Ok(HashMap::new());
    };

    let base = match hash.get(&Yaml::String("default".to_string())) {
        Some(value) => parse_entry("default", value, defaults)?,
        None => defaults.clone(),
    };

    let mut registry = HashMap::new();
    for (key, value) in hash {
        let Some(name) = key.as_str() else {
            continue;
        };
        registry.insert(name.to_string(), parse_entry(name, value, &base)?);
    }

    Ok(registry)
}

fn parse_entry(name: &str, value: &Yaml, base: &AgentConfig) -> Result<AgentConfig, PopulateError> {
    if let Some(model) = value.as_str() {
        let mut config = base.clone();
        config.params.model = model.to_string();
        return Ok(config);
    }

    let Some(fields) = value.as_hash() else {
        return Ok(base.clone());
    };
    let get = |field: &str| fields.get(&Yaml::String(field.to_string()));

    let mut config = base.clone();
    if let Some(model) = get("model").and_then(Yaml::as_str) {
        config.params.model = model.to_string();
    }
    if let Some(value) = get("temperature") {
        config.params.temperature = match value {
            Yaml::Real(_) => value.as_f64(),
            Yaml::Integer(i) => Some(*i as f64),
            _ => None,
        }
        .ok_or_else(|| invalid(name, "temperature must be a number"))? as f32;
    }
    if let Some(value) = get("max_steps") {
        config.params.max_steps = value
            .as_i64()
            .and_then(|v| u32::try_from(v).ok())
            .ok_or_else(|| invalid(name, "max_steps must be a non-negative integer"))?;
    }
    if let Some(value) = get("max_tokens") {
        config.params.max_tokens = match value {
            Yaml::Null => None,
            other => Some(
                other
                    .as_i64()
                    .and_then(|v| u32::try_from(v).ok())
                    .ok_or_else(|| invalid(name, "max_tokens must be a non-negative integer"))?,
            ),
        };
    }
    if let Some(parallel) = get("parallel").and_then(Yaml::as_bool) {
        config.parallel = parallel;
    }

    Ok(config)
}

fn invalid(agent: &str, reason: &str) -> PopulateError {
    PopulateError::InvalidRegistry(format!("{}: {}", agent, reason))
}
