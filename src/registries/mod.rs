mod agent_model_registry;
mod agent_registry;

pub use agent_model_registry::{AgentConfig, FileAgentModelRegistry};
pub use agent_registry::FileAgentRegistry;

pub const HUMAN_READABLE_SPEC_AGENT: &str = "human_readable_spec";
pub const OPENAPI_SPEC_AGENT: &str = "openapi_spec";
pub const UNIFY_SPEC_AGENT: &str = "unify_spec";
pub const SPEC_SUGGESTIONS_AGENT: &str = "spec_suggestions";
pub const SPEC_UPDATE_AGENT: &str = "spec_update";
pub const TEST_CASE_AGENT: &str = "test_case_generation";
pub const SCRIPT_GENERATION_AGENT: &str = "k6_script_generation";
pub const SCRIPT_COMBINE_AGENT: &str = "k6_script_combine";

pub const MODEL_REGISTRY_FILE: &str = "agent_model_registry.yml";

/// Prompt templates compiled into the binary, used when the project's
/// agents directory has no file of the same name.
pub const BUILTIN_AGENTS: &[(&str, &str)] = &[
    (
        HUMAN_READABLE_SPEC_AGENT,
        include_str!("../../agents/human_readable_spec.yml"),
    ),
    (
        OPENAPI_SPEC_AGENT,
        include_str!("../../agents/openapi_spec.yml"),
    ),
    (UNIFY_SPEC_AGENT, include_str!("../../agents/unify_spec.yml")),
    (
        SPEC_SUGGESTIONS_AGENT,
        include_str!("../../agents/spec_suggestions.yml"),
    ),
    (SPEC_UPDATE_AGENT, include_str!("../../agents/spec_update.yml")),
    (
        TEST_CASE_AGENT,
        include_str!("../../agents/test_case_generation.yml"),
    ),
    (
        SCRIPT_GENERATION_AGENT,
        include_str!("../../agents/k6_script_generation.yml"),
    ),
    (
        SCRIPT_COMBINE_AGENT,
        include_str!("../../agents/k6_script_combine.yml"),
    ),
];

pub const BUILTIN_MODEL_REGISTRY: &str = include_str!("../../agents/agent_model_registry.yml");

pub fn builtin_agent(name: &str) -> Option<&'static str> {
    BUILTIN_AGENTS
        .iter()
        .find(|(agent, _)| *agent == name)
        .map(|(_, content)| *content)
}
