use serde::{Deserialize, Serialize};

/// Closed set of agent kinds. Assigned at construction, never duplicated
/// within a live coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentIdentity {
    ResourceManager,
    HrModel,
    CommunicationHub,
    Executive,
    HumanCollaboration,
}

impl AgentIdentity {
    /// Every identity, in registration order.
    pub const ALL: [AgentIdentity; 5] = [
        AgentIdentity::ResourceManager,
        AgentIdentity::HrModel,
        AgentIdentity::CommunicationHub,
        AgentIdentity::Executive,
        AgentIdentity::HumanCollaboration,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentIdentity::ResourceManager => "resource_manager",
            AgentIdentity::HrModel => "hr_model",
            AgentIdentity::CommunicationHub => "communication_hub",
            AgentIdentity::Executive => "executive",
            AgentIdentity::HumanCollaboration => "human_collaboration",
        }
    }
}

impl std::fmt::Display for AgentIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of an agent.
///
/// Valid transitions: `Initializing -> Active`, `Initializing -> Error`,
/// `Active -> Shutdown`. `Error` and `Shutdown` are terminal; a crashed
/// agent stays in `Error` until the whole coordinator is restarted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Initializing,
    Active,
    Error,
    Shutdown,
}

impl std::fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentStatus::Initializing => write!(f, "initializing"),
            AgentStatus::Active => write!(f, "active"),
            AgentStatus::Error => write!(f, "error"),
            AgentStatus::Shutdown => write!(f, "shutdown"),
        }
    }
}

/// Priority shared by messages and tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
    Urgent,
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Medium
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_roundtrip() {
        for id in AgentIdentity::ALL {
            let json = serde_json::to_string(&id).unwrap();
            let back: AgentIdentity = serde_json::from_str(&json).unwrap();
            assert_eq!(id, back);
        }
    }

    #[test]
    fn priority_ordering() {
        assert!(Priority::Urgent > Priority::High);
        assert!(Priority::High > Priority::Medium);
        assert!(Priority::Medium > Priority::Low);
    }
}
