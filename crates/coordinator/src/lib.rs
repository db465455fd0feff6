//! External-facing facade over the agent set.
//!
//! The coordinator owns the five live agents, dispatches inbound messages
//! and tasks by identity, and is the only thing the UI/telecom/persistence
//! layers talk to. Agents are registered once at construction and never
//! added or removed afterwards; the registry itself needs no locking.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::watch;
use tracing::{info, warn};

use sitecrew_agents::{
    executive, hr_model, human_collaboration, resource_manager, Agent, HubAgent,
};
use sitecrew_core::{
    AgentIdentity, AgentMessage, AgentStatus, AgentTask, CoreConfig, Error, LearningSignal,
    Metadata, Result,
};

/// Outcome of `start_all`: which agents came up and which landed in `Error`.
#[derive(Debug, Default)]
pub struct StartReport {
    pub started: Vec<AgentIdentity>,
    pub failed: Vec<(AgentIdentity, String)>,
}

impl StartReport {
    pub fn all_started(&self) -> bool {
        self.failed.is_empty()
    }
}

pub struct Coordinator {
    agents: HashMap<AgentIdentity, Arc<dyn Agent>>,
    hub: HubAgent,
}

impl Coordinator {
    /// Build the full agent set from configuration. Construction does not
    /// initialize anything; call [`Coordinator::start_all`].
    pub fn from_config(config: CoreConfig) -> Self {
        let hub = HubAgent::new(config.hub.clone());

        let mut agents: HashMap<AgentIdentity, Arc<dyn Agent>> = HashMap::new();
        agents.insert(
            AgentIdentity::ResourceManager,
            Arc::new(resource_manager(config.resource_manager.clone())),
        );
        agents.insert(
            AgentIdentity::HrModel,
            Arc::new(hr_model(config.hr_model.clone())),
        );
        agents.insert(AgentIdentity::CommunicationHub, hub.agent());
        agents.insert(
            AgentIdentity::Executive,
            Arc::new(executive(config.executive.clone())),
        );
        agents.insert(
            AgentIdentity::HumanCollaboration,
            Arc::new(human_collaboration(config.collaboration.clone())),
        );

        Self { agents, hub }
    }

    fn agent(&self, identity: AgentIdentity) -> Result<&Arc<dyn Agent>> {
        self.agents
            .get(&identity)
            .ok_or_else(|| Error::NotFound(format!("unknown agent: {identity}")))
    }

    /// The hub's routing surface, for collaborators that forward or
    /// broadcast through the hub directly.
    pub fn hub(&self) -> &HubAgent {
        &self.hub
    }

    /// Initialize every registered agent. One agent failing into `Error`
    /// does not keep the others from reaching `Active`; the report says who
    /// failed instead of aborting the startup.
    pub async fn start_all(&self) -> StartReport {
        let results = join_all(self.agents.iter().map(|(identity, agent)| async move {
            (*identity, agent.initialize().await)
        }))
        .await;

        let mut report = StartReport::default();
        for (identity, result) in results {
            match result {
                Ok(()) => report.started.push(identity),
                Err(e) => {
                    warn!(agent = %identity, error = %e, "Agent failed to start");
                    report.failed.push((identity, e.to_string()));
                }
            }
        }
        info!(
            started = report.started.len(),
            failed = report.failed.len(),
            "Coordinator startup complete"
        );
        report
    }

    /// Shut down every agent that reached `Active`. Agents in `Error` are
    /// left alone; their state is terminal.
    pub async fn stop_all(&self) {
        for (identity, agent) in &self.agents {
            if agent.status() != AgentStatus::Active {
                continue;
            }
            if let Err(e) = agent.shutdown().await {
                warn!(agent = %identity, error = %e, "Agent shutdown failed");
            }
        }
    }

    /// Fire a message at the agent named by `to_agent`.
    pub async fn submit_message(&self, message: AgentMessage) -> Result<Option<AgentMessage>> {
        self.agent(message.to_agent)?.handle_message(message).await
    }

    /// Run a named operation on the agent named by `assigned_agent`. The
    /// returned task is always terminal, with result data in its metadata.
    pub async fn submit_task(&self, task: AgentTask) -> Result<AgentTask> {
        self.agent(task.assigned_agent)?.execute_task(task).await
    }

    pub async fn submit_learning_signal(
        &self,
        identity: AgentIdentity,
        signal: LearningSignal,
    ) -> Result<()> {
        self.agent(identity)?.ingest_signal(signal).await
    }

    pub async fn update_agent_parameters(
        &self,
        identity: AgentIdentity,
        params: Metadata,
    ) -> Result<()> {
        self.agent(identity)?.update_parameters(params).await
    }

    /// Deliver the same signal to every agent independently; one agent's
    /// failure never blocks delivery to the others.
    pub async fn broadcast_learning_signal(
        &self,
        signal: LearningSignal,
    ) -> Vec<(AgentIdentity, Error)> {
        let results = join_all(self.agents.iter().map(|(identity, agent)| {
            let signal = signal.clone();
            async move { (*identity, agent.ingest_signal(signal).await) }
        }))
        .await;
        results
            .into_iter()
            .filter_map(|(identity, result)| result.err().map(|e| (identity, e)))
            .collect()
    }

    /// Apply the same parameter map to every agent independently.
    pub async fn update_all_parameters(&self, params: Metadata) -> Vec<(AgentIdentity, Error)> {
        let results = join_all(self.agents.iter().map(|(identity, agent)| {
            let params = params.clone();
            async move { (*identity, agent.update_parameters(params).await) }
        }))
        .await;
        results
            .into_iter()
            .filter_map(|(identity, result)| result.err().map(|e| (identity, e)))
            .collect()
    }

    pub fn agent_status(&self, identity: AgentIdentity) -> Result<AgentStatus> {
        Ok(self.agent(identity)?.status())
    }

    pub fn watch_agent_status(
        &self,
        identity: AgentIdentity,
    ) -> Result<watch::Receiver<AgentStatus>> {
        Ok(self.agent(identity)?.watch_status())
    }

    pub async fn knowledge_snapshot(&self, identity: AgentIdentity) -> Result<Metadata> {
        Ok(self.agent(identity)?.knowledge_snapshot().await)
    }

    /// Drain the hub's delivery queue and hand each queued message to its
    /// target agent. Delivery stays best-effort: an unreachable target is
    /// logged and skipped, replies are collected for the caller.
    pub async fn deliver_queued(&self) -> Result<Vec<Option<AgentMessage>>> {
        let queued = self.hub.drain_queue().await?;
        let mut replies = Vec::with_capacity(queued.len());
        for message in queued {
            match self.submit_message(message).await {
                Ok(reply) => replies.push(reply),
                Err(e) => warn!(error = %e, "Queued message could not be delivered"),
            }
        }
        Ok(replies)
    }

    pub fn identities(&self) -> Vec<AgentIdentity> {
        let mut out: Vec<AgentIdentity> = self.agents.keys().copied().collect();
        out.sort_by_key(|identity| identity.as_str());
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use sitecrew_core::{MessageType, SignalKind, TaskStatus};

    async fn running() -> Coordinator {
        let coordinator = Coordinator::from_config(CoreConfig::default());
        let report = coordinator.start_all().await;
        assert!(report.all_started());
        coordinator
    }

    #[tokio::test]
    async fn dispatches_message_by_identity() {
        let coordinator = running().await;
        let message = AgentMessage::new(
            AgentIdentity::Executive,
            AgentIdentity::ResourceManager,
            MessageType::Query,
            "utilization",
        );
        let reply = coordinator.submit_message(message).await.unwrap().unwrap();
        assert_eq!(reply.message_type, MessageType::Response);
        coordinator.stop_all().await;
    }

    #[tokio::test]
    async fn dispatches_task_by_assignee() {
        let coordinator = running().await;
        let task = AgentTask::new("approve budget", AgentIdentity::Executive)
            .with_metadata("amount", json!(10_000.0));
        let done = coordinator.submit_task(task).await.unwrap();
        assert_eq!(done.status, TaskStatus::Completed);
    }

    #[tokio::test]
    async fn partial_startup_failure_reported() {
        let mut config = CoreConfig::default();
        config.hub.queue_capacity = 0; // hub setup will fail
        let coordinator = Coordinator::from_config(config);

        let report = coordinator.start_all().await;
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, AgentIdentity::CommunicationHub);
        assert_eq!(report.started.len(), 4);

        assert_eq!(
            coordinator.agent_status(AgentIdentity::CommunicationHub).unwrap(),
            AgentStatus::Error
        );
        assert_eq!(
            coordinator.agent_status(AgentIdentity::Executive).unwrap(),
            AgentStatus::Active
        );
    }

    #[tokio::test]
    async fn fanout_failure_does_not_block_others() {
        let mut config = CoreConfig::default();
        config.hub.queue_capacity = 0;
        let coordinator = Coordinator::from_config(config);
        coordinator.start_all().await;

        let failures = coordinator
            .broadcast_learning_signal(LearningSignal::new(
                SignalKind::Online,
                json!({"load": 0.4}),
                0.4,
            ))
            .await;
        // only the dead hub rejects
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].0, AgentIdentity::CommunicationHub);
    }

    #[tokio::test]
    async fn update_all_parameters_applies_everywhere() {
        let coordinator = running().await;
        let mut params = Metadata::new();
        params.insert("region".to_string(), json!("northwest"));
        let failures = coordinator.update_all_parameters(params).await;
        assert!(failures.is_empty());

        for identity in coordinator.identities() {
            let snapshot = coordinator.knowledge_snapshot(identity).await.unwrap();
            assert_eq!(snapshot.get("region"), Some(&json!("northwest")));
        }
    }

    #[tokio::test]
    async fn queued_messages_reach_their_targets() {
        let coordinator = running().await;
        let message = AgentMessage::new(
            AgentIdentity::Executive,
            AgentIdentity::ResourceManager,
            MessageType::Query,
            "utilization",
        );
        coordinator.hub().route(message).await.unwrap();

        let replies = coordinator.deliver_queued().await.unwrap();
        assert_eq!(replies.len(), 1);
        assert_eq!(
            replies[0].as_ref().unwrap().message_type,
            MessageType::Response
        );
    }

    #[tokio::test]
    async fn status_watch_sees_shutdown() {
        let coordinator = running().await;
        let mut watcher = coordinator
            .watch_agent_status(AgentIdentity::HrModel)
            .unwrap();
        assert_eq!(*watcher.borrow_and_update(), AgentStatus::Active);

        coordinator.stop_all().await;
        watcher.changed().await.unwrap();
        assert_eq!(*watcher.borrow_and_update(), AgentStatus::Shutdown);
    }
}
