//! Capability queries and candidate ranking.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use switchyard_core::agent::AgentRecord;
use switchyard_core::{Error, Result};

/// Which agents a lookup should return.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AgentQuery {
    /// Every one of these must be declared by a returned agent.
    pub required_capabilities: BTreeSet<String>,
    /// Ranking boost only.
    pub preferred_tags: BTreeSet<String>,
    pub agent_type: Option<String>,
}

impl AgentQuery {
    pub fn new<I, S>(required_capabilities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            required_capabilities: required_capabilities.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    /// Query matching every agent of one type.
    pub fn of_type(agent_type: impl Into<String>) -> Self {
        Self {
            agent_type: Some(agent_type.into()),
            ..Default::default()
        }
    }

    pub fn with_preferred_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.preferred_tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_agent_type(mut self, agent_type: impl Into<String>) -> Self {
        self.agent_type = Some(agent_type.into());
        self
    }

    /// A query must name at least one capability or an agent type.
    pub fn validate(&self) -> Result<()> {
        if self.required_capabilities.is_empty() && self.agent_type.is_none() {
            return Err(Error::InvalidRequest(
                "at least one capability or an agent type is required".to_string(),
            ));
        }
        Ok(())
    }

    /// Whether a record satisfies the hard constraints.
    pub fn matches(&self, record: &AgentRecord) -> bool {
        record.has_capabilities(&self.required_capabilities)
            && self
                .agent_type
                .as_ref()
                .is_none_or(|t| record.agent_type == *t)
    }
}

/// Order candidates best first: most matching preferred tags, then highest
/// priority, then newest registration, then agent id.
pub fn rank(records: &mut [AgentRecord], preferred_tags: &BTreeSet<String>) {
    records.sort_by(|a, b| compare(a, b, preferred_tags));
}

fn compare(a: &AgentRecord, b: &AgentRecord, preferred_tags: &BTreeSet<String>) -> Ordering {
    b.matching_tags(preferred_tags)
        .cmp(&a.matching_tags(preferred_tags))
        .then_with(|| b.priority.cmp(&a.priority))
        .then_with(|| b.registered_at.cmp(&a.registered_at))
        .then_with(|| a.agent_id.cmp(&b.agent_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeDelta, Utc};
    use switchyard_core::agent::AgentRegistration;

    fn record(id: &str, priority: i32, tags: &[&str], age_secs: i64) -> AgentRecord {
        let reg = AgentRegistration::new(id, "code")
            .with_capabilities(["code"])
            .with_tags(tags.iter().copied())
            .with_priority(priority);
        AgentRecord::from_registration(reg, Utc::now() - TimeDelta::seconds(age_secs))
    }

    fn ids(records: &[AgentRecord]) -> Vec<&str> {
        records.iter().map(|r| r.agent_id.as_str()).collect()
    }

    #[test]
    fn test_tags_outrank_priority() {
        let mut records = vec![
            record("high", 10, &[], 0),
            record("tagged", 1, &["rust"], 0),
        ];
        let preferred: BTreeSet<String> = ["rust".to_string()].into();
        rank(&mut records, &preferred);
        assert_eq!(ids(&records), vec!["tagged", "high"]);
    }

    #[test]
    fn test_priority_then_recency_then_id() {
        let mut records = vec![
            record("old", 5, &[], 100),
            record("b", 5, &[], 0),
            record("top", 9, &[], 500),
        ];
        records[1].registered_at = records[1].registered_at + TimeDelta::seconds(1);
        let mut twin = records[1].clone();
        twin.agent_id = "a".into();
        records.push(twin);

        rank(&mut records, &BTreeSet::new());
        assert_eq!(ids(&records), vec!["top", "a", "b", "old"]);
    }

    #[test]
    fn test_empty_query_rejected() {
        assert!(matches!(
            AgentQuery::default().validate(),
            Err(Error::InvalidRequest(_))
        ));
        assert!(AgentQuery::of_type("code").validate().is_ok());
        assert!(AgentQuery::new(["code"]).validate().is_ok());
    }
}
