//! Store key layout shared by all components.

use crate::ids::AgentId;

/// Set of every registered agent id.
pub const AGENTS: &str = "agents";
/// Set of agent ids holding a health record.
pub const HEALTH_INDEX: &str = "health-index";
/// Set of agent ids holding a breaker record.
pub const BREAKER_INDEX: &str = "breaker-index";

pub fn agent(agent_id: &AgentId) -> String {
    format!("agent:{}", sanitize_key(agent_id.as_str()))
}

pub fn capability(capability: &str) -> String {
    format!("capability:{}", sanitize_key(capability))
}

pub fn tag(tag: &str) -> String {
    format!("tag:{}", sanitize_key(tag))
}

pub fn agent_type(agent_type: &str) -> String {
    format!("type:{}", sanitize_key(agent_type))
}

pub fn health(agent_id: &AgentId) -> String {
    format!("health:{}", sanitize_key(agent_id.as_str()))
}

pub fn breaker(agent_id: &AgentId) -> String {
    format!("breaker:{}", sanitize_key(agent_id.as_str()))
}

pub fn errors(agent_id: &AgentId) -> String {
    format!("errors:{}", sanitize_key(agent_id.as_str()))
}

/// Strip characters that would collide with the `prefix:` separator.
pub fn sanitize_key(key: &str) -> String {
    key.chars()
        .map(|c| match c {
            ':' | ' ' | '\n' | '\t' => '_',
            _ => c,
        })
        .collect()
}
