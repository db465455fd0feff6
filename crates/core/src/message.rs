use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{AgentIdentity, Priority};

/// String-keyed heterogeneous metadata carried by messages and tasks.
pub type Metadata = HashMap<String, serde_json::Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Query,
    Command,
    Notification,
    StatusUpdate,
    Alert,
    DataSync,
    Response,
    Acknowledgment,
    Error,
}

/// Typed, immutable unit of inter-agent communication.
///
/// A reply is always a new message carrying `correlation_id = original.id`;
/// the original is never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentMessage {
    pub id: String,
    pub from_agent: AgentIdentity,
    pub to_agent: AgentIdentity,
    pub message_type: MessageType,
    pub content: String,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default)]
    pub priority: Priority,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl AgentMessage {
    pub fn new(
        from_agent: AgentIdentity,
        to_agent: AgentIdentity,
        message_type: MessageType,
        content: &str,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            from_agent,
            to_agent,
            message_type,
            content: content.to_string(),
            metadata: Metadata::new(),
            priority: Priority::Medium,
            correlation_id: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_metadata(mut self, key: &str, value: serde_json::Value) -> Self {
        self.metadata.insert(key.to_string(), value);
        self
    }

    /// Build a reply of the given type, correlated to this message.
    pub fn reply_with(&self, message_type: MessageType, content: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            from_agent: self.to_agent,
            to_agent: self.from_agent,
            message_type,
            content: content.to_string(),
            metadata: Metadata::new(),
            priority: self.priority,
            correlation_id: Some(self.id.clone()),
            timestamp: Utc::now(),
        }
    }

    /// Acknowledgment reply.
    pub fn ack(&self, content: &str) -> Self {
        self.reply_with(MessageType::Acknowledgment, content)
    }

    /// Error-typed reply. Used for expected routing failures that must not
    /// tear down the caller.
    pub fn error_reply(&self, content: &str) -> Self {
        self.reply_with(MessageType::Error, content)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Paused,
    Cancelled,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Pending => write!(f, "pending"),
            TaskStatus::InProgress => write!(f, "in_progress"),
            TaskStatus::Completed => write!(f, "completed"),
            TaskStatus::Failed => write!(f, "failed"),
            TaskStatus::Paused => write!(f, "paused"),
            TaskStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// A unit of assigned work. Metadata accumulates: execution only adds keys,
/// it never overwrites unrelated entries. Only the assigned agent moves a
/// task to `Completed` or `Failed`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentTask {
    pub id: String,
    pub title: String,
    pub assigned_agent: AgentIdentity,
    #[serde(default)]
    pub priority: Priority,
    pub status: TaskStatus,
    #[serde(default)]
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub dependencies: Vec<String>,
}

impl AgentTask {
    pub fn new(title: &str, assigned_agent: AgentIdentity) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            title: title.to_string(),
            assigned_agent,
            priority: Priority::Medium,
            status: TaskStatus::Pending,
            metadata: Metadata::new(),
            created_at: now,
            updated_at: now,
            due_date: None,
            dependencies: Vec::new(),
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_metadata(mut self, key: &str, value: serde_json::Value) -> Self {
        self.metadata.insert(key.to_string(), value);
        self
    }

    /// Terminal success: merge the result payload under `result` and refresh
    /// `updated_at`.
    pub fn completed(mut self, result: serde_json::Value) -> Self {
        self.status = TaskStatus::Completed;
        self.metadata.insert("result".to_string(), result);
        self.updated_at = Utc::now();
        self
    }

    /// Terminal failure: the error text lands in `metadata["error"]` so the
    /// task stays an inspectable value instead of becoming control flow.
    pub fn failed(mut self, error: &str) -> Self {
        self.status = TaskStatus::Failed;
        self.metadata
            .insert("error".to_string(), serde_json::Value::String(error.to_string()));
        self.updated_at = Utc::now();
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    Supervised,
    Reinforcement,
    Online,
    Transfer,
}

/// Input/feedback pair fed into an agent's parameter-adaptation path.
/// Consumed on ingestion, never persisted verbatim.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearningSignal {
    pub kind: SignalKind,
    pub input: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_output: Option<serde_json::Value>,
    pub feedback: f64,
}

impl LearningSignal {
    pub fn new(kind: SignalKind, input: serde_json::Value, feedback: f64) -> Self {
        Self {
            kind,
            input,
            expected_output: None,
            feedback,
        }
    }
}

/// Routing-table entry describing how to reach a given agent identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteDescriptor {
    pub target: AgentIdentity,
    pub transport: String,
    /// 0.0..=1.0
    pub reliability: f64,
    pub priority_weight: u32,
}

impl RouteDescriptor {
    pub fn direct(target: AgentIdentity) -> Self {
        Self {
            target,
            transport: "direct".to_string(),
            reliability: 1.0,
            priority_weight: 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reply_is_correlated() {
        let msg = AgentMessage::new(
            AgentIdentity::Executive,
            AgentIdentity::ResourceManager,
            MessageType::Query,
            "current allocation?",
        );
        let reply = msg.reply_with(MessageType::Response, "72%");
        assert_eq!(reply.correlation_id.as_deref(), Some(msg.id.as_str()));
        assert_eq!(reply.to_agent, msg.from_agent);
        assert_eq!(reply.from_agent, msg.to_agent);
        assert_ne!(reply.id, msg.id);
    }

    #[test]
    fn task_failure_is_data() {
        let task = AgentTask::new("allocate resources", AgentIdentity::ResourceManager);
        let created = task.created_at;
        let failed = task.failed("no crews available");
        assert_eq!(failed.status, TaskStatus::Failed);
        assert_eq!(
            failed.metadata.get("error").and_then(|v| v.as_str()),
            Some("no crews available")
        );
        assert!(failed.updated_at >= created);
    }

    #[test]
    fn task_completion_keeps_existing_metadata() {
        let task = AgentTask::new("forecast utilization", AgentIdentity::ResourceManager)
            .with_metadata("site", serde_json::json!("northside"));
        let done = task.completed(serde_json::json!({"utilization": 0.8}));
        assert_eq!(done.status, TaskStatus::Completed);
        assert!(done.metadata.contains_key("site"));
        assert!(done.metadata.contains_key("result"));
    }
}
