use crate::contexts::{AgentRegistry, AgentTemplate, PopulateError};
use std::fs;
use std::path::PathBuf;
use tracing::debug;

use super::builtin_agent;

/// File-based implementation of AgentRegistry
/// Loads agent templates from YAML files in the agents/ directory, falling
/// back to the copies compiled into the binary
#[derive(Clone)]
pub struct FileAgentRegistry {
    agents_dir: PathBuf,
}

impl FileAgentRegistry {
    /// Creates a new FileAgentRegistry
    ///
    /// # Arguments
    /// * `agents_dir` - Optional path to agents directory (defaults to "agents")
    pub fn new(agents_dir: Option<PathBuf>) -> Self {
        Self {
            agents_dir: agents_dir.unwrap_or_else(|| PathBuf::from("agents")),
        }
    }
}

impl AgentRegistry for FileAgentRegistry {
    fn get_specification(&self, agent_name: &str) -> Result<AgentTemplate, PopulateError> {
        let agent_path = self.agents_dir.join(format!("{}.yml", agent_name));

        if agent_path.exists() {
            debug!(agent = agent_name, path = %agent_path.display(), "using project agent file");
            let content = fs::read_to_string(&agent_path).map_err(|e| {
                PopulateError::InvalidSpecification(format!(
                    "Failed to read agent specification {}: {}",
                    agent_path.display(),
                    e
                ))
            })?;
            return extract_template(&content);
        }

        match builtin_agent(agent_name) {
            Some(content) => extract_template(content),
            None => Err(PopulateError::AgentNotFound(agent_name.to_string())),
        }
    }
}

/// Extracts the system_prompt and user_prompt fields from a YAML agent file
fn extract_template(yaml_content: &str) -> Result<AgentTemplate, PopulateError> {
    use yaml_rust::YamlLoader;

    let docs = YamlLoader::load_from_str(yaml_content)
        .map_err(|e| PopulateError::InvalidSpecification(format!("Invalid YAML: {}", e)))?;

    let Some(doc) = docs.first() else {
        return Err(PopulateError::InvalidSpecification(
            "Empty YAML document".to_string(),
        ));
    };

    let field = |name: &str| {
        doc[name].as_str().map(str::to_string).ok_or_else(|| {
            PopulateError::InvalidSpecification(format!(
                "No {} field found in agent specification",
                name
            ))
        })
    };

    Ok(AgentTemplate {
        system_prompt: field("system_prompt")?,
        user_prompt: field("user_prompt")?,
    })
}
