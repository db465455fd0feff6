use async_trait::async_trait;
use serde_json::json;
use tracing::warn;

use sitecrew_core::config::ExecutiveConfig;
use sitecrew_core::{
    AgentIdentity, AgentMessage, AgentTask, Error, LearningSignal, MessageType, Result, SignalKind,
};

use crate::cell::{AgentCell, AgentState, Behavior};
use crate::knowledge::ParameterGuard;

#[derive(Debug, Clone)]
pub struct GovernanceRule {
    pub name: String,
    pub active: bool,
}

/// Governance rule set and directive log.
#[derive(Debug, Default)]
pub struct GovernanceDesk {
    pub rules: Vec<GovernanceRule>,
    pub directives: Vec<String>,
}

/// Governance agent: budget approvals against a threshold, compliance
/// reviews against a target, and directive issuance.
pub struct ExecutiveBehavior {
    config: ExecutiveConfig,
    guard: ParameterGuard,
}

impl ExecutiveBehavior {
    pub fn new(config: ExecutiveConfig) -> Self {
        let guard = ParameterGuard::new()
            .declare("approval_threshold", 0.0, 10_000_000.0)
            .declare("compliance_target", 0.0, 1.0);
        Self { config, guard }
    }
}

#[async_trait]
impl Behavior for ExecutiveBehavior {
    type Ext = GovernanceDesk;

    fn identity(&self) -> AgentIdentity {
        AgentIdentity::Executive
    }

    fn guard(&self) -> &ParameterGuard {
        &self.guard
    }

    async fn setup(&self, state: &mut AgentState<GovernanceDesk>) -> Result<()> {
        state
            .knowledge
            .set_number("approval_threshold", self.config.approval_threshold);
        state
            .knowledge
            .set_number("compliance_target", self.config.compliance_target);
        state.knowledge.set_number("open_incidents", 0.0);

        for name in [
            "dual signoff above approval threshold",
            "weekly safety review",
            "subcontractor vetting before site access",
        ] {
            state.ext.rules.push(GovernanceRule {
                name: name.to_string(),
                active: true,
            });
        }
        Ok(())
    }

    async fn on_message(
        &self,
        state: &mut AgentState<GovernanceDesk>,
        message: &AgentMessage,
    ) -> Result<Option<AgentMessage>> {
        match message.message_type {
            MessageType::Query => {
                let body = json!({
                    "rules_active": state.ext.rules.iter().filter(|r| r.active).count(),
                    "directives_issued": state.ext.directives.len(),
                    "open_incidents": state.knowledge.get_f64("open_incidents").unwrap_or(0.0),
                });
                Ok(Some(message.reply_with(MessageType::Response, &body.to_string())))
            }
            MessageType::Alert => {
                state.knowledge.increment("open_incidents", 1.0);
                Ok(Some(message.ack("incident escalated to governance review")))
            }
            MessageType::Command => match message.content.to_lowercase().as_str() {
                "audit" => {
                    let rules: Vec<&str> =
                        state.ext.rules.iter().map(|r| r.name.as_str()).collect();
                    Ok(Some(
                        message.reply_with(MessageType::Response, &json!(rules).to_string()),
                    ))
                }
                "close incidents" => {
                    state.knowledge.set_number("open_incidents", 0.0);
                    Ok(Some(message.ack("incident counter cleared")))
                }
                other => Ok(Some(
                    message.error_reply(&format!("unsupported command: {other}")),
                )),
            },
            MessageType::DataSync => {
                for (key, value) in &message.metadata {
                    state.knowledge.set(&format!("sync_{key}"), value.clone());
                }
                Ok(Some(message.ack("governance data synchronized")))
            }
            MessageType::StatusUpdate | MessageType::Notification => Ok(None),
            MessageType::Response | MessageType::Acknowledgment | MessageType::Error => Ok(None),
        }
    }

    async fn on_task(
        &self,
        state: &mut AgentState<GovernanceDesk>,
        task: &AgentTask,
    ) -> Result<serde_json::Value> {
        match task.title.to_lowercase().as_str() {
            "approve budget" => {
                let amount = task
                    .metadata
                    .get("amount")
                    .and_then(|v| v.as_f64())
                    .ok_or_else(|| Error::Task("missing amount".to_string()))?;
                if amount <= 0.0 {
                    return Err(Error::Task(format!("invalid amount {amount}")));
                }
                let threshold = state.knowledge.get_f64("approval_threshold").unwrap_or(0.0);
                let approved = amount <= threshold;
                Ok(json!({
                    "amount": amount,
                    "approved": approved,
                    "requires_dual_signoff": !approved,
                }))
            }
            "review compliance" => {
                let observed = task
                    .metadata
                    .get("observed_rate")
                    .and_then(|v| v.as_f64())
                    .ok_or_else(|| Error::Task("missing observed_rate".to_string()))?;
                let target = state.knowledge.get_f64("compliance_target").unwrap_or(0.95);
                state.knowledge.set_number("last_compliance_rate", observed);
                Ok(json!({
                    "observed": observed,
                    "target": target,
                    "compliant": observed >= target,
                }))
            }
            "issue directive" => {
                let directive = task
                    .metadata
                    .get("directive")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| Error::Task("missing directive".to_string()))?;
                state.ext.directives.push(directive.to_string());
                Ok(json!({
                    "directive": directive,
                    "total_issued": state.ext.directives.len(),
                }))
            }
            other => Err(Error::Task(format!("unknown operation: {other}"))),
        }
    }

    async fn on_signal(
        &self,
        state: &mut AgentState<GovernanceDesk>,
        signal: &LearningSignal,
    ) -> Result<()> {
        match signal.kind {
            SignalKind::Reinforcement => {
                // positive feedback relaxes the compliance target slightly,
                // negative tightens it
                let target = state.knowledge.get_f64("compliance_target").unwrap_or(0.95);
                let next = (target - 0.005 * signal.feedback).clamp(0.5, 1.0);
                state.knowledge.set_number("compliance_target", next);
            }
            SignalKind::Online => {
                state.knowledge.set_number("last_feedback", signal.feedback);
            }
            kind => {
                warn!(agent = %self.identity(), kind = ?kind, "Unsupported learning signal, ignored");
            }
        }
        Ok(())
    }
}

pub fn executive(config: ExecutiveConfig) -> AgentCell<ExecutiveBehavior> {
    AgentCell::new(ExecutiveBehavior::new(config), GovernanceDesk::default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::Agent;
    use sitecrew_core::TaskStatus;

    async fn active_agent() -> AgentCell<ExecutiveBehavior> {
        let cell = executive(ExecutiveConfig::default());
        cell.initialize().await.unwrap();
        cell
    }

    #[tokio::test]
    async fn budget_approval_respects_threshold() {
        let agent = active_agent().await;

        let small = AgentTask::new("approve budget", AgentIdentity::Executive)
            .with_metadata("amount", json!(20_000.0));
        let done = agent.execute_task(small).await.unwrap();
        assert_eq!(done.metadata["result"]["approved"], json!(true));

        let large = AgentTask::new("APPROVE BUDGET", AgentIdentity::Executive)
            .with_metadata("amount", json!(90_000.0));
        let done = agent.execute_task(large).await.unwrap();
        assert_eq!(done.status, TaskStatus::Completed);
        assert_eq!(done.metadata["result"]["requires_dual_signoff"], json!(true));
    }

    #[tokio::test]
    async fn missing_amount_fails_task() {
        let agent = active_agent().await;
        let done = agent
            .execute_task(AgentTask::new("approve budget", AgentIdentity::Executive))
            .await
            .unwrap();
        assert_eq!(done.status, TaskStatus::Failed);
    }

    #[tokio::test]
    async fn alerts_escalate_into_incident_counter() {
        let agent = active_agent().await;
        for _ in 0..3 {
            let alert = AgentMessage::new(
                AgentIdentity::CommunicationHub,
                AgentIdentity::Executive,
                MessageType::Alert,
                "scaffold failure reported",
            );
            agent.handle_message(alert).await.unwrap();
        }
        let snapshot = agent.knowledge_snapshot().await;
        assert_eq!(snapshot["open_incidents"].as_f64(), Some(3.0));
    }
}
