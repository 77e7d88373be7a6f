//! Agent types.

use crate::ids::AgentId;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// A running agent instance as seen by the discovery registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentRecord {
    pub agent_id: AgentId,
    /// Pipeline role, e.g. "spec", "design", "code".
    pub agent_type: String,
    pub agent_class: String,
    pub capabilities: BTreeSet<String>,
    /// Soft preference labels.
    pub tags: BTreeSet<String>,
    pub version: String,
    pub max_concurrent_tasks: u32,
    /// Higher is preferred.
    pub priority: i32,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    pub registered_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

impl AgentRecord {
    /// Build a record from a validated registration.
    pub fn from_registration(registration: AgentRegistration, now: DateTime<Utc>) -> Self {
        Self {
            agent_id: registration.agent_id,
            agent_type: registration.agent_type,
            agent_class: registration.agent_class,
            capabilities: registration.capabilities,
            tags: registration.tags,
            version: registration.version,
            max_concurrent_tasks: registration.max_concurrent_tasks,
            priority: registration.priority,
            metadata: registration.metadata,
            registered_at: now,
            last_seen: now,
        }
    }

    pub fn has_capabilities<'a>(&self, required: impl IntoIterator<Item = &'a String>) -> bool {
        required
            .into_iter()
            .all(|cap| self.capabilities.contains(cap))
    }

    /// Number of the given tags this agent carries.
    pub fn matching_tags<'a>(&self, preferred: impl IntoIterator<Item = &'a String>) -> usize {
        preferred
            .into_iter()
            .filter(|tag| self.tags.contains(*tag))
            .count()
    }
}

/// Registration call payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRegistration {
    pub agent_id: AgentId,
    pub agent_type: String,
    #[serde(default)]
    pub agent_class: String,
    #[serde(default)]
    pub capabilities: BTreeSet<String>,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_tasks: u32,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

fn default_version() -> String {
    "0.0.0".to_string()
}

fn default_max_concurrent() -> u32 {
    1
}

impl AgentRegistration {
    pub fn new(agent_id: impl Into<AgentId>, agent_type: impl Into<String>) -> Self {
        let agent_type = agent_type.into();
        Self {
            agent_id: agent_id.into(),
            agent_class: format!("{}_agent", agent_type),
            agent_type,
            capabilities: BTreeSet::new(),
            version: default_version(),
            max_concurrent_tasks: default_max_concurrent(),
            priority: 0,
            tags: BTreeSet::new(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_capabilities<I, S>(mut self, capabilities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.capabilities = capabilities.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_max_concurrent_tasks(mut self, max: u32) -> Self {
        self.max_concurrent_tasks = max;
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Reject registrations the registry cannot index.
    pub fn validate(&self) -> Result<()> {
        if self.agent_id.is_empty() {
            return Err(Error::InvalidRegistration("agent_id is empty".to_string()));
        }
        if self
            .agent_id
            .as_str()
            .chars()
            .any(|c| c == ':' || c.is_whitespace())
        {
            return Err(Error::InvalidRegistration(format!(
                "agent_id {:?} contains ':' or whitespace",
                self.agent_id.as_str()
            )));
        }
        if self.agent_type.trim().is_empty() {
            return Err(Error::InvalidRegistration(format!(
                "agent {} has no agent_type",
                self.agent_id
            )));
        }
        if self.max_concurrent_tasks == 0 {
            return Err(Error::InvalidRegistration(format!(
                "agent {} must accept at least one concurrent task",
                self.agent_id
            )));
        }
        if self.capabilities.iter().any(|c| c.trim().is_empty()) {
            return Err(Error::InvalidRegistration(format!(
                "agent {} declares an empty capability",
                self.agent_id
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_rejects_zero_capacity() {
        let reg = AgentRegistration::new("a", "code").with_max_concurrent_tasks(0);
        assert!(matches!(reg.validate(), Err(Error::InvalidRegistration(_))));
    }

    #[test]
    fn test_validate_rejects_empty_id() {
        let reg = AgentRegistration::new("", "code");
        assert!(reg.validate().is_err());
    }

    #[test]
    fn test_capability_and_tag_matching() {
        let reg = AgentRegistration::new("a", "code")
            .with_capabilities(["code", "review"])
            .with_tags(["rust", "fast"]);
        let record = AgentRecord::from_registration(reg, Utc::now());

        let both = vec!["code".to_string(), "review".to_string()];
        let missing = vec!["code".to_string(), "test".to_string()];
        assert!(record.has_capabilities(&both));
        assert!(!record.has_capabilities(&missing));

        let preferred = vec!["rust".to_string(), "python".to_string()];
        assert_eq!(record.matching_tags(&preferred), 1);
    }
}
