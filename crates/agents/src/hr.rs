use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::json;
use tracing::warn;

use sitecrew_core::config::HrModelConfig;
use sitecrew_core::{
    AgentIdentity, AgentMessage, AgentTask, Error, LearningSignal, MessageType, Result, SignalKind,
};

use crate::cell::{AgentCell, AgentState, Behavior};
use crate::knowledge::ParameterGuard;

/// Workforce ledger: training catalog, per-worker performance scores, and
/// recorded certifications.
#[derive(Debug, Default)]
pub struct WorkforceLedger {
    /// program name -> required hours
    pub training_catalog: HashMap<String, f64>,
    pub performance: HashMap<String, f64>,
    pub certifications: Vec<(String, String)>,
    pub training_hours_planned: f64,
}

/// Tracks workforce performance, plans training against a budget, and
/// records certifications.
pub struct HrModelBehavior {
    config: HrModelConfig,
    guard: ParameterGuard,
}

impl HrModelBehavior {
    pub fn new(config: HrModelConfig) -> Self {
        let guard = ParameterGuard::new()
            .declare("performance_baseline", 0.0, 1.0)
            .declare("learning_rate", 0.001, 0.1)
            .declare("training_budget_hours", 0.0, 2000.0);
        Self { config, guard }
    }
}

#[async_trait]
impl Behavior for HrModelBehavior {
    type Ext = WorkforceLedger;

    fn identity(&self) -> AgentIdentity {
        AgentIdentity::HrModel
    }

    fn guard(&self) -> &ParameterGuard {
        &self.guard
    }

    async fn setup(&self, state: &mut AgentState<WorkforceLedger>) -> Result<()> {
        state
            .knowledge
            .set_number("performance_baseline", self.config.performance_baseline);
        state.knowledge.set_number("learning_rate", self.config.learning_rate);
        state
            .knowledge
            .set_number("training_budget_hours", self.config.training_budget_hours);

        for (program, hours) in [
            ("safety induction", 8.0),
            ("crane operation", 24.0),
            ("first aid", 6.0),
            ("site supervision", 16.0),
        ] {
            state.ext.training_catalog.insert(program.to_string(), hours);
        }
        Ok(())
    }

    async fn on_message(
        &self,
        state: &mut AgentState<WorkforceLedger>,
        message: &AgentMessage,
    ) -> Result<Option<AgentMessage>> {
        match message.message_type {
            MessageType::Query => {
                let above_baseline = {
                    let baseline = state.knowledge.get_f64("performance_baseline").unwrap_or(0.7);
                    state
                        .ext
                        .performance
                        .values()
                        .filter(|score| **score >= baseline)
                        .count()
                };
                let body = json!({
                    "workers_tracked": state.ext.performance.len(),
                    "above_baseline": above_baseline,
                    "certifications": state.ext.certifications.len(),
                    "catalog_programs": state.ext.training_catalog.len(),
                });
                Ok(Some(message.reply_with(MessageType::Response, &body.to_string())))
            }
            MessageType::Alert => {
                // safety incidents feed the incident counter reviewed at audit time
                state.knowledge.increment("safety_incidents", 1.0);
                Ok(Some(message.ack("incident logged")))
            }
            MessageType::DataSync => {
                for (key, value) in &message.metadata {
                    if let Some(score) = value.as_f64() {
                        state.ext.performance.insert(key.clone(), score);
                    }
                }
                Ok(Some(message.ack("performance data synchronized")))
            }
            MessageType::Command => Ok(Some(
                message.error_reply(&format!("unsupported command: {}", message.content)),
            )),
            MessageType::StatusUpdate | MessageType::Notification => Ok(None),
            MessageType::Response | MessageType::Acknowledgment | MessageType::Error => Ok(None),
        }
    }

    async fn on_task(
        &self,
        state: &mut AgentState<WorkforceLedger>,
        task: &AgentTask,
    ) -> Result<serde_json::Value> {
        match task.title.to_lowercase().as_str() {
            "evaluate performance" => {
                let worker = task
                    .metadata
                    .get("worker")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| Error::Task("missing worker".to_string()))?
                    .to_string();
                let score = task
                    .metadata
                    .get("score")
                    .and_then(|v| v.as_f64())
                    .ok_or_else(|| Error::Task("missing score".to_string()))?;
                if !(0.0..=1.0).contains(&score) {
                    return Err(Error::Task(format!("score {score} outside 0..1")));
                }
                let baseline = state.knowledge.get_f64("performance_baseline").unwrap_or(0.7);
                state.ext.performance.insert(worker.clone(), score);
                Ok(json!({
                    "worker": worker,
                    "score": score,
                    "meets_baseline": score >= baseline,
                }))
            }
            "plan training" => {
                let program = task
                    .metadata
                    .get("program")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| Error::Task("missing program".to_string()))?
                    .to_lowercase();
                let hours = *state
                    .ext
                    .training_catalog
                    .get(&program)
                    .ok_or_else(|| Error::Task(format!("program not in catalog: {program}")))?;
                let budget = state.knowledge.get_f64("training_budget_hours").unwrap_or(0.0);
                if state.ext.training_hours_planned + hours > budget {
                    return Err(Error::Task(format!(
                        "training budget exceeded: planned {} + {hours} > {budget}",
                        state.ext.training_hours_planned
                    )));
                }
                state.ext.training_hours_planned += hours;
                Ok(json!({
                    "program": program,
                    "hours": hours,
                    "hours_planned_total": state.ext.training_hours_planned,
                }))
            }
            "record certification" => {
                let worker = task
                    .metadata
                    .get("worker")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| Error::Task("missing worker".to_string()))?;
                let certification = task
                    .metadata
                    .get("certification")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| Error::Task("missing certification".to_string()))?;
                state
                    .ext
                    .certifications
                    .push((worker.to_string(), certification.to_string()));
                Ok(json!({
                    "worker": worker,
                    "certification": certification,
                    "total_recorded": state.ext.certifications.len(),
                }))
            }
            other => Err(Error::Task(format!("unknown operation: {other}"))),
        }
    }

    async fn on_signal(
        &self,
        state: &mut AgentState<WorkforceLedger>,
        signal: &LearningSignal,
    ) -> Result<()> {
        let rate = state.knowledge.get_f64("learning_rate").unwrap_or(0.01);
        match signal.kind {
            SignalKind::Supervised => {
                // feedback is the observed error against expected output;
                // nudge the baseline toward fewer surprises
                let baseline = state.knowledge.get_f64("performance_baseline").unwrap_or(0.7);
                let next = (baseline - rate * signal.feedback).clamp(0.0, 1.0);
                state.knowledge.set_number("performance_baseline", next);
            }
            SignalKind::Transfer => {
                if let Some(object) = signal.input.as_object() {
                    for (key, value) in object {
                        state.knowledge.set(&format!("transfer_{key}"), value.clone());
                    }
                }
            }
            kind => {
                warn!(agent = %self.identity(), kind = ?kind, "Unsupported learning signal, ignored");
            }
        }
        Ok(())
    }
}

pub fn hr_model(config: HrModelConfig) -> AgentCell<HrModelBehavior> {
    AgentCell::new(HrModelBehavior::new(config), WorkforceLedger::default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::Agent;
    use sitecrew_core::TaskStatus;

    async fn active_agent() -> AgentCell<HrModelBehavior> {
        let cell = hr_model(HrModelConfig::default());
        cell.initialize().await.unwrap();
        cell
    }

    #[tokio::test]
    async fn evaluate_performance_against_baseline() {
        let agent = active_agent().await;
        let task = AgentTask::new("Evaluate Performance", AgentIdentity::HrModel)
            .with_metadata("worker", json!("r.alvarez"))
            .with_metadata("score", json!(0.82));
        let done = agent.execute_task(task).await.unwrap();
        assert_eq!(done.status, TaskStatus::Completed);
        assert_eq!(done.metadata["result"]["meets_baseline"], json!(true));
    }

    #[tokio::test]
    async fn training_budget_is_enforced() {
        let agent = active_agent().await;
        // default budget is 40h; crane operation is 24h, twice overruns it
        for expected in [TaskStatus::Completed, TaskStatus::Failed] {
            let task = AgentTask::new("plan training", AgentIdentity::HrModel)
                .with_metadata("program", json!("crane operation"));
            let done = agent.execute_task(task).await.unwrap();
            assert_eq!(done.status, expected);
        }
    }

    #[tokio::test]
    async fn unknown_program_fails() {
        let agent = active_agent().await;
        let task = AgentTask::new("plan training", AgentIdentity::HrModel)
            .with_metadata("program", json!("underwater welding"));
        let done = agent.execute_task(task).await.unwrap();
        assert_eq!(done.status, TaskStatus::Failed);
    }

    #[tokio::test]
    async fn supervised_signal_lowers_baseline() {
        let agent = active_agent().await;
        agent
            .ingest_signal(LearningSignal::new(SignalKind::Supervised, json!({}), 1.0))
            .await
            .unwrap();
        let snapshot = agent.knowledge_snapshot().await;
        assert!(snapshot["performance_baseline"].as_f64().unwrap() < 0.7);
    }

    #[tokio::test]
    async fn data_sync_imports_scores() {
        let agent = active_agent().await;
        let msg = AgentMessage::new(
            AgentIdentity::CommunicationHub,
            AgentIdentity::HrModel,
            MessageType::DataSync,
            "weekly scores",
        )
        .with_metadata("j.okafor", json!(0.9));
        let reply = agent.handle_message(msg).await.unwrap().unwrap();
        assert_eq!(reply.message_type, MessageType::Acknowledgment);
    }
}
