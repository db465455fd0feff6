use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::json;
use tracing::warn;

use sitecrew_core::config::CollaborationConfig;
use sitecrew_core::{
    AgentIdentity, AgentMessage, AgentTask, Error, LearningSignal, MessageType, Result, SignalKind,
};

use crate::cell::{AgentCell, AgentState, Behavior};
use crate::knowledge::ParameterGuard;

/// Open assistance requests and completed handoffs.
#[derive(Debug, Default)]
pub struct CollaborationDesk {
    /// request id -> topic
    pub open_requests: HashMap<String, String>,
    pub handoff_log: Vec<String>,
    pub feedback_ratings: Vec<f64>,
}

/// Human-collaboration agent: assistance requests from field staff, handoff
/// tracking, and feedback collection.
pub struct CollaborationBehavior {
    config: CollaborationConfig,
    guard: ParameterGuard,
}

impl CollaborationBehavior {
    pub fn new(config: CollaborationConfig) -> Self {
        let guard = ParameterGuard::new()
            .declare("response_sla_secs", 30.0, 86_400.0)
            .declare("escalation_threshold", 1.0, 20.0);
        Self { config, guard }
    }
}

#[async_trait]
impl Behavior for CollaborationBehavior {
    type Ext = CollaborationDesk;

    fn identity(&self) -> AgentIdentity {
        AgentIdentity::HumanCollaboration
    }

    fn guard(&self) -> &ParameterGuard {
        &self.guard
    }

    async fn setup(&self, state: &mut AgentState<CollaborationDesk>) -> Result<()> {
        state
            .knowledge
            .set_number("response_sla_secs", self.config.response_sla_secs);
        state
            .knowledge
            .set_number("escalation_threshold", self.config.escalation_threshold);
        state.knowledge.set_number("average_feedback", 0.0);
        Ok(())
    }

    async fn on_message(
        &self,
        state: &mut AgentState<CollaborationDesk>,
        message: &AgentMessage,
    ) -> Result<Option<AgentMessage>> {
        match message.message_type {
            MessageType::Query => {
                let body = json!({
                    "open_requests": state.ext.open_requests.len(),
                    "handoffs_resolved": state.ext.handoff_log.len(),
                    "average_feedback": state.knowledge.get_f64("average_feedback").unwrap_or(0.0),
                });
                Ok(Some(message.reply_with(MessageType::Response, &body.to_string())))
            }
            MessageType::Alert => {
                let threshold = state.knowledge.get_f64("escalation_threshold").unwrap_or(3.0);
                state.knowledge.increment("alerts_received", 1.0);
                let count = state.knowledge.get_f64("alerts_received").unwrap_or(0.0);
                let note = if count >= threshold {
                    "alert recorded, escalating to site supervisor"
                } else {
                    "alert recorded"
                };
                Ok(Some(message.ack(note)))
            }
            MessageType::Command => Ok(Some(
                message.error_reply(&format!("unsupported command: {}", message.content)),
            )),
            MessageType::DataSync => {
                for (key, value) in &message.metadata {
                    state.knowledge.set(&format!("sync_{key}"), value.clone());
                }
                Ok(Some(message.ack("collaboration data synchronized")))
            }
            MessageType::StatusUpdate | MessageType::Notification => Ok(None),
            MessageType::Response | MessageType::Acknowledgment | MessageType::Error => Ok(None),
        }
    }

    async fn on_task(
        &self,
        state: &mut AgentState<CollaborationDesk>,
        task: &AgentTask,
    ) -> Result<serde_json::Value> {
        match task.title.to_lowercase().as_str() {
            "request assistance" => {
                let topic = task
                    .metadata
                    .get("topic")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| Error::Task("missing topic".to_string()))?;
                state
                    .ext
                    .open_requests
                    .insert(task.id.clone(), topic.to_string());
                Ok(json!({
                    "request_id": task.id,
                    "topic": topic,
                    "open_requests": state.ext.open_requests.len(),
                }))
            }
            "resolve handoff" => {
                let request_id = task
                    .metadata
                    .get("request_id")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| Error::Task("missing request_id".to_string()))?;
                let topic = state
                    .ext
                    .open_requests
                    .remove(request_id)
                    .ok_or_else(|| Error::Task(format!("unknown request: {request_id}")))?;
                state.ext.handoff_log.push(topic.clone());
                Ok(json!({
                    "request_id": request_id,
                    "topic": topic,
                    "open_requests": state.ext.open_requests.len(),
                }))
            }
            "collect feedback" => {
                let rating = task
                    .metadata
                    .get("rating")
                    .and_then(|v| v.as_f64())
                    .ok_or_else(|| Error::Task("missing rating".to_string()))?;
                if !(0.0..=5.0).contains(&rating) {
                    return Err(Error::Task(format!("rating {rating} outside 0..5")));
                }
                state.ext.feedback_ratings.push(rating);
                let average = state.ext.feedback_ratings.iter().sum::<f64>()
                    / state.ext.feedback_ratings.len() as f64;
                state.knowledge.set_number("average_feedback", average);
                Ok(json!({"rating": rating, "average": average}))
            }
            other => Err(Error::Task(format!("unknown operation: {other}"))),
        }
    }

    async fn on_signal(
        &self,
        state: &mut AgentState<CollaborationDesk>,
        signal: &LearningSignal,
    ) -> Result<()> {
        match signal.kind {
            SignalKind::Online => {
                let prev = state.knowledge.get_f64("responsiveness_estimate").unwrap_or(0.5);
                let next = (prev * 0.9 + signal.feedback * 0.1).clamp(0.0, 1.0);
                state.knowledge.set_number("responsiveness_estimate", next);
            }
            SignalKind::Supervised => {
                state.knowledge.set_number("last_supervised_error", signal.feedback);
            }
            kind => {
                warn!(agent = %self.identity(), kind = ?kind, "Unsupported learning signal, ignored");
            }
        }
        Ok(())
    }
}

pub fn human_collaboration(config: CollaborationConfig) -> AgentCell<CollaborationBehavior> {
    AgentCell::new(
        CollaborationBehavior::new(config),
        CollaborationDesk::default(),
    )
}
