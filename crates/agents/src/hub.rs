use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::{debug, info, warn};

use sitecrew_core::{
    AgentIdentity, AgentMessage, AgentTask, Error, HubConfig, LearningSignal, MessageType,
    Metadata, Result, RouteDescriptor, SignalKind,
};

use crate::cell::{Agent, AgentCell, AgentState, Behavior};
use crate::knowledge::ParameterGuard;

/// Pure content translator registered per protocol name.
pub type ProtocolFn = fn(&str, &Metadata) -> String;

/// Compact record kept for every message the hub processes.
#[derive(Debug, Clone)]
pub struct HistoryRecord {
    pub message_id: String,
    pub from_agent: AgentIdentity,
    pub to_agent: AgentIdentity,
    pub message_type: MessageType,
    pub timestamp: DateTime<Utc>,
}

impl HistoryRecord {
    fn of(message: &AgentMessage) -> Self {
        Self {
            message_id: message.id.clone(),
            from_agent: message.from_agent,
            to_agent: message.to_agent,
            message_type: message.message_type,
            timestamp: message.timestamp,
        }
    }
}

/// All hub-owned mutable collections, guarded by the hub's single lock.
pub struct HubState {
    pub routes: HashMap<AgentIdentity, RouteDescriptor>,
    queue: VecDeque<AgentMessage>,
    queue_capacity: usize,
    history: VecDeque<HistoryRecord>,
    history_limit: usize,
    protocols: HashMap<String, ProtocolFn>,
}

impl HubState {
    fn new(queue_capacity: usize, history_limit: usize) -> Self {
        Self {
            routes: HashMap::new(),
            queue: VecDeque::new(),
            queue_capacity,
            history: VecDeque::new(),
            history_limit,
            protocols: HashMap::new(),
        }
    }

    /// Strict FIFO eviction once the retention limit is exceeded.
    fn record(&mut self, message: &AgentMessage) {
        self.history.push_back(HistoryRecord::of(message));
        while self.history.len() > self.history_limit {
            self.history.pop_front();
        }
    }

    /// Best-effort enqueue; the sender treats delivery as best-effort and a
    /// full queue drops the message.
    fn enqueue(&mut self, message: AgentMessage) -> bool {
        if self.queue.len() >= self.queue_capacity {
            warn!(
                message_id = %message.id,
                to = %message.to_agent,
                capacity = self.queue_capacity,
                "Hub queue full, message dropped"
            );
            return false;
        }
        self.queue.push_back(message);
        true
    }

    /// Reply issued by the hub itself, correlated to the routed message.
    fn hub_reply(
        original: &AgentMessage,
        message_type: MessageType,
        content: &str,
    ) -> AgentMessage {
        AgentMessage {
            id: uuid::Uuid::new_v4().to_string(),
            from_agent: AgentIdentity::CommunicationHub,
            to_agent: original.from_agent,
            message_type,
            content: content.to_string(),
            metadata: Metadata::new(),
            priority: original.priority,
            correlation_id: Some(original.id.clone()),
            timestamp: Utc::now(),
        }
    }

    /// Direct single-hop lookup and enqueue. Routing failures come back as
    /// error-typed messages, never as `Err`: the caller is typically another
    /// agent that must keep running.
    fn route_message(&mut self, message: AgentMessage) -> AgentMessage {
        self.record(&message);
        let Some(route) = self.routes.get(&message.to_agent) else {
            return Self::hub_reply(
                &message,
                MessageType::Error,
                &format!("no route available to {}", message.to_agent),
            );
        };
        let transport = route.transport.clone();
        let original_id = message.id.clone();
        let reply_target = message.from_agent;
        if self.enqueue(message) {
            let mut ack = AgentMessage {
                id: uuid::Uuid::new_v4().to_string(),
                from_agent: AgentIdentity::CommunicationHub,
                to_agent: reply_target,
                message_type: MessageType::Acknowledgment,
                content: format!("queued for delivery via {transport}"),
                metadata: Metadata::new(),
                priority: sitecrew_core::Priority::Medium,
                correlation_id: Some(original_id),
                timestamp: Utc::now(),
            };
            ack.metadata.insert("transport".to_string(), json!(transport));
            ack
        } else {
            AgentMessage {
                id: uuid::Uuid::new_v4().to_string(),
                from_agent: AgentIdentity::CommunicationHub,
                to_agent: reply_target,
                message_type: MessageType::Error,
                content: "message queue full, delivery dropped".to_string(),
                metadata: Metadata::new(),
                priority: sitecrew_core::Priority::Medium,
                correlation_id: Some(original_id),
                timestamp: Utc::now(),
            }
        }
    }

    /// Per-recipient copies with fresh ids; partial failures surface as
    /// error replies in the aggregate, never as a failed broadcast.
    fn broadcast_message(&mut self, message: &AgentMessage) -> Vec<AgentMessage> {
        let mut recipients: Vec<AgentIdentity> = self
            .routes
            .keys()
            .copied()
            .filter(|identity| *identity != message.from_agent)
            .collect();
        recipients.sort_by_key(|identity| identity.as_str());

        let mut replies = Vec::with_capacity(recipients.len());
        for recipient in recipients {
            let mut copy = message.clone();
            copy.id = uuid::Uuid::new_v4().to_string();
            copy.to_agent = recipient;
            copy.timestamp = Utc::now();
            replies.push(self.route_message(copy));
        }
        replies
    }

    fn translate_message(&self, message: &AgentMessage, protocol: &str) -> Result<AgentMessage> {
        let translate = self
            .protocols
            .get(protocol)
            .ok_or_else(|| Error::Routing(format!("unknown protocol: {protocol}")))?;
        let mut out = message.clone();
        out.content = translate(&message.content, &message.metadata);
        out.metadata.insert("protocol".to_string(), json!(protocol));
        Ok(out)
    }

    fn stats(&self) -> serde_json::Value {
        json!({
            "routes_known": self.routes.len(),
            "queue_depth": self.queue.len(),
            "queue_capacity": self.queue_capacity,
            "history_retained": self.history.len(),
            "protocols": self.protocols.keys().collect::<Vec<_>>(),
        })
    }
}

fn translate_json(content: &str, _metadata: &Metadata) -> String {
    json!({ "payload": content }).to_string()
}

fn translate_xml(content: &str, _metadata: &Metadata) -> String {
    let escaped = content
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;");
    format!("<message><content>{escaped}</content></message>")
}

fn translate_binary(content: &str, _metadata: &Metadata) -> String {
    base64::engine::general_purpose::STANDARD.encode(content.as_bytes())
}

fn translate_rest(content: &str, _metadata: &Metadata) -> String {
    json!({ "method": "POST", "path": "/messages", "body": content }).to_string()
}

fn translate_websocket(content: &str, _metadata: &Metadata) -> String {
    json!({ "frame": "text", "data": content }).to_string()
}

fn builtin_translator(name: &str) -> Option<ProtocolFn> {
    match name {
        "json" => Some(translate_json),
        "xml" => Some(translate_xml),
        "binary" => Some(translate_binary),
        "rest" => Some(translate_rest),
        "websocket" => Some(translate_websocket),
        _ => None,
    }
}

/// Central hub behavior: owns the routing table, the bounded delivery queue,
/// the protocol registry, and the communication history.
pub struct HubBehavior {
    config: HubConfig,
    guard: ParameterGuard,
}

impl HubBehavior {
    pub fn new(config: HubConfig) -> Self {
        let guard = ParameterGuard::new()
            .declare("routing_bias", 0.0, 1.0)
            .declare("load_estimate", 0.0, 1.0);
        Self { config, guard }
    }
}

#[async_trait]
impl Behavior for HubBehavior {
    type Ext = HubState;

    fn identity(&self) -> AgentIdentity {
        AgentIdentity::CommunicationHub
    }

    fn guard(&self) -> &ParameterGuard {
        &self.guard
    }

    async fn setup(&self, state: &mut AgentState<HubState>) -> Result<()> {
        if self.config.queue_capacity == 0 {
            return Err(Error::Config(
                "hub queue capacity must be greater than zero".to_string(),
            ));
        }

        for identity in AgentIdentity::ALL {
            if identity == AgentIdentity::CommunicationHub {
                continue;
            }
            state
                .ext
                .routes
                .insert(identity, RouteDescriptor::direct(identity));
        }

        for name in &self.config.protocols {
            match builtin_translator(name) {
                Some(translate) => {
                    state.ext.protocols.insert(name.clone(), translate);
                }
                None => warn!(protocol = %name, "No translator for configured protocol, skipped"),
            }
        }

        state.knowledge.set_number("messages_processed", 0.0);
        state.knowledge.set_number("routing_bias", 0.5);
        Ok(())
    }

    async fn on_message(
        &self,
        state: &mut AgentState<HubState>,
        message: &AgentMessage,
    ) -> Result<Option<AgentMessage>> {
        state.ext.record(message);
        state.knowledge.increment("messages_processed", 1.0);
        match message.message_type {
            MessageType::Query => {
                let body = state.ext.stats();
                Ok(Some(message.reply_with(MessageType::Response, &body.to_string())))
            }
            MessageType::Command => match message.content.to_lowercase().as_str() {
                "flush queue" => {
                    let dropped = state.ext.queue.len();
                    state.ext.queue.clear();
                    Ok(Some(message.reply_with(
                        MessageType::Response,
                        &json!({ "flushed": dropped }).to_string(),
                    )))
                }
                other => Ok(Some(
                    message.error_reply(&format!("unsupported command: {other}")),
                )),
            },
            MessageType::Alert => {
                state.knowledge.increment("alerts_relayed", 1.0);
                Ok(Some(message.ack("alert relayed")))
            }
            MessageType::DataSync => Ok(Some(message.ack("sync noted"))),
            MessageType::StatusUpdate | MessageType::Notification => Ok(None),
            MessageType::Response | MessageType::Acknowledgment | MessageType::Error => Ok(None),
        }
    }

    async fn on_task(
        &self,
        state: &mut AgentState<HubState>,
        task: &AgentTask,
    ) -> Result<serde_json::Value> {
        match task.title.to_lowercase().as_str() {
            "report traffic" => Ok(state.ext.stats()),
            "flush queue" => {
                let dropped = state.ext.queue.len();
                state.ext.queue.clear();
                Ok(json!({ "flushed": dropped }))
            }
            "register route" => {
                let target: AgentIdentity = task
                    .metadata
                    .get("target")
                    .cloned()
                    .and_then(|v| serde_json::from_value(v).ok())
                    .ok_or_else(|| Error::Task("missing or invalid target".to_string()))?;
                let transport = task
                    .metadata
                    .get("transport")
                    .and_then(|v| v.as_str())
                    .unwrap_or("direct")
                    .to_string();
                let reliability = task
                    .metadata
                    .get("reliability")
                    .and_then(|v| v.as_f64())
                    .unwrap_or(1.0);
                if !(0.0..=1.0).contains(&reliability) {
                    return Err(Error::Task(format!("reliability {reliability} outside 0..1")));
                }
                let descriptor = RouteDescriptor {
                    target,
                    transport,
                    reliability,
                    priority_weight: task
                        .metadata
                        .get("priority_weight")
                        .and_then(|v| v.as_u64())
                        .unwrap_or(1) as u32,
                };
                // last write wins, no merge
                state.ext.routes.insert(target, descriptor);
                Ok(json!({ "target": target, "routes_known": state.ext.routes.len() }))
            }
            other => Err(Error::Task(format!("unknown operation: {other}"))),
        }
    }

    async fn on_signal(
        &self,
        state: &mut AgentState<HubState>,
        signal: &LearningSignal,
    ) -> Result<()> {
        match signal.kind {
            SignalKind::Online => {
                let prev = state.knowledge.get_f64("load_estimate").unwrap_or(0.0);
                let next = (prev * 0.9 + signal.feedback * 0.1).clamp(0.0, 1.0);
                state.knowledge.set_number("load_estimate", next);
            }
            SignalKind::Reinforcement => {
                let prev = state.knowledge.get_f64("routing_bias").unwrap_or(0.5);
                let next = (prev + 0.01 * signal.feedback).clamp(0.0, 1.0);
                state.knowledge.set_number("routing_bias", next);
            }
            kind => {
                warn!(agent = %self.identity(), kind = ?kind, "Unsupported learning signal, ignored");
            }
        }
        Ok(())
    }

    async fn on_shutdown(&self, state: &mut AgentState<HubState>) -> Result<()> {
        let retained = state.ext.history.len();
        let undelivered = state.ext.queue.len();
        state.knowledge.set_number("history_archived", retained as f64);
        state.knowledge.set_number("queue_dropped", undelivered as f64);
        state.ext.queue.clear();
        info!(retained, undelivered, "Hub shut down, communication history archived");
        Ok(())
    }
}

/// Handle to the communication hub. Implements the common agent contract via
/// [`Agent`] (through [`HubAgent::agent`]) and exposes the routing surface on
/// top of the same per-agent lock.
#[derive(Clone)]
pub struct HubAgent {
    cell: Arc<AgentCell<HubBehavior>>,
}

impl HubAgent {
    pub fn new(config: HubConfig) -> Self {
        let state = HubState::new(config.queue_capacity, config.history_limit);
        Self {
            cell: Arc::new(AgentCell::new(HubBehavior::new(config), state)),
        }
    }

    /// The hub as a plain agent, for the coordinator's registry.
    pub fn agent(&self) -> Arc<dyn Agent> {
        self.cell.clone()
    }

    /// Overwrites any existing entry for the identity; last write wins.
    pub async fn register_route(
        &self,
        identity: AgentIdentity,
        descriptor: RouteDescriptor,
    ) -> Result<()> {
        let mut state = self.cell.state.lock().await;
        self.cell.ensure_active()?;
        state.ext.routes.insert(identity, descriptor);
        Ok(())
    }

    pub async fn resolve_route(&self, to: AgentIdentity) -> Result<Option<RouteDescriptor>> {
        let state = self.cell.state.lock().await;
        self.cell.ensure_active()?;
        Ok(state.ext.routes.get(&to).cloned())
    }

    /// Route one message: direct single-hop lookup, then best-effort
    /// enqueue. Always returns a reply message describing the outcome.
    pub async fn route(&self, message: AgentMessage) -> Result<Option<AgentMessage>> {
        // status checked under the lock so an in-flight shutdown is observed
        let mut state = self.cell.state.lock().await;
        self.cell.ensure_active()?;
        debug!(message_id = %message.id, to = %message.to_agent, "Routing message");
        let reply = state.ext.route_message(message);
        Ok(Some(reply))
    }

    /// Fan a message out to every routed identity except the sender.
    pub async fn broadcast(&self, message: AgentMessage) -> Result<Vec<AgentMessage>> {
        let mut state = self.cell.state.lock().await;
        self.cell.ensure_active()?;
        Ok(state.ext.broadcast_message(&message))
    }

    /// Translate a message into a registered protocol's wire shape. Unknown
    /// protocols fail; the input message is never mutated.
    pub async fn translate(
        &self,
        message: &AgentMessage,
        protocol: &str,
    ) -> Result<AgentMessage> {
        let state = self.cell.state.lock().await;
        self.cell.ensure_active()?;
        state.ext.translate_message(message, protocol)
    }

    /// Take everything currently queued; the coordinator delivers the
    /// drained messages to their targets.
    pub async fn drain_queue(&self) -> Result<Vec<AgentMessage>> {
        let mut state = self.cell.state.lock().await;
        self.cell.ensure_active()?;
        Ok(state.ext.queue.drain(..).collect())
    }

    /// Retained communication history, oldest first. Gated on Active like
    /// the rest of the routing surface.
    pub async fn communication_history(&self) -> Result<Vec<HistoryRecord>> {
        let state = self.cell.state.lock().await;
        self.cell.ensure_active()?;
        Ok(state.ext.history.iter().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sitecrew_core::Priority;

    fn hub_with(queue_capacity: usize, history_limit: usize) -> HubAgent {
        HubAgent::new(HubConfig {
            queue_capacity,
            history_limit,
            ..HubConfig::default()
        })
    }

    async fn active_hub() -> HubAgent {
        let hub = hub_with(100, 500);
        hub.agent().initialize().await.unwrap();
        hub
    }

    fn query_to(to: AgentIdentity) -> AgentMessage {
        AgentMessage::new(
            AgentIdentity::Executive,
            to,
            MessageType::Notification,
            "site update",
        )
    }

    #[tokio::test]
    async fn routing_round_trip() {
        let hub = active_hub().await;
        let message = query_to(AgentIdentity::ResourceManager);
        let original_id = message.id.clone();

        let ack = hub.route(message).await.unwrap().unwrap();
        assert_eq!(ack.message_type, MessageType::Acknowledgment);
        assert_eq!(ack.correlation_id.as_deref(), Some(original_id.as_str()));

        let queued = hub.drain_queue().await.unwrap();
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].to_agent, AgentIdentity::ResourceManager);
        assert_eq!(queued[0].id, original_id);
    }

    #[tokio::test]
    async fn no_route_yields_error_message_not_err() {
        let hub = active_hub().await;
        // the hub has no route to itself
        let message = query_to(AgentIdentity::CommunicationHub);
        let reply = hub.route(message).await.unwrap().unwrap();
        assert_eq!(reply.message_type, MessageType::Error);
        assert!(reply.content.contains("no route available"));
    }

    #[tokio::test]
    async fn bounded_queue_rejects_overflow() {
        let hub = hub_with(3, 500);
        hub.agent().initialize().await.unwrap();

        let mut outcomes = Vec::new();
        for _ in 0..4 {
            let reply = hub
                .route(query_to(AgentIdentity::HrModel))
                .await
                .unwrap()
                .unwrap();
            outcomes.push(reply.message_type);
        }
        let acks = outcomes
            .iter()
            .filter(|t| **t == MessageType::Acknowledgment)
            .count();
        let errors = outcomes.iter().filter(|t| **t == MessageType::Error).count();
        assert_eq!(acks, 3);
        assert_eq!(errors, 1);
        assert_eq!(outcomes[3], MessageType::Error);
        assert_eq!(hub.drain_queue().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn broadcast_excludes_sender() {
        let hub = active_hub().await;
        let message = AgentMessage::new(
            AgentIdentity::ResourceManager,
            AgentIdentity::CommunicationHub,
            MessageType::Notification,
            "crane inspection at noon",
        )
        .with_priority(Priority::High);

        let replies = hub.broadcast(message).await.unwrap();
        // hr_model, executive, human_collaboration
        assert_eq!(replies.len(), 3);

        let queued = hub.drain_queue().await.unwrap();
        assert_eq!(queued.len(), 3);
        let mut recipients: Vec<AgentIdentity> = queued.iter().map(|m| m.to_agent).collect();
        recipients.sort_by_key(|i| i.as_str());
        recipients.dedup();
        assert_eq!(recipients.len(), 3);
        assert!(!recipients.contains(&AgentIdentity::ResourceManager));
        for copy in &queued {
            assert_eq!(copy.content, "crane inspection at noon");
            assert_eq!(copy.priority, Priority::High);
        }
    }

    #[tokio::test]
    async fn translate_known_and_unknown() {
        let hub = active_hub().await;
        let message = query_to(AgentIdentity::HrModel);

        let translated = hub.translate(&message, "json").await.unwrap();
        assert_eq!(
            translated.metadata.get("protocol"),
            Some(&serde_json::json!("json"))
        );
        let body: serde_json::Value = serde_json::from_str(&translated.content).unwrap();
        assert_eq!(body["payload"], serde_json::json!("site update"));

        // unknown protocol fails uniformly and leaves the original untouched
        for _ in 0..2 {
            let err = hub.translate(&message, "carrier-pigeon").await.unwrap_err();
            assert!(matches!(err, Error::Routing(_)));
        }
        assert!(!message.metadata.contains_key("protocol"));
    }

    #[tokio::test]
    async fn history_evicts_fifo() {
        let hub = hub_with(100, 2);
        hub.agent().initialize().await.unwrap();

        let first = query_to(AgentIdentity::HrModel);
        let first_id = first.id.clone();
        hub.route(first).await.unwrap();
        hub.route(query_to(AgentIdentity::HrModel)).await.unwrap();
        hub.route(query_to(AgentIdentity::HrModel)).await.unwrap();

        let history = hub.communication_history().await.unwrap();
        assert_eq!(history.len(), 2);
        assert!(history.iter().all(|r| r.message_id != first_id));
    }

    #[tokio::test]
    async fn shutdown_archives_history_counts() {
        let hub = active_hub().await;
        hub.route(query_to(AgentIdentity::HrModel)).await.unwrap();

        hub.agent().shutdown().await.unwrap();

        let snapshot = hub.agent().knowledge_snapshot().await;
        assert_eq!(snapshot["history_archived"].as_f64(), Some(1.0));
        assert_eq!(snapshot["queue_dropped"].as_f64(), Some(1.0));
        // the routing surface, history included, is closed after shutdown
        assert!(hub.communication_history().await.is_err());
        assert!(hub.drain_queue().await.is_err());
    }

    #[tokio::test]
    async fn register_route_is_last_write_wins() {
        let hub = active_hub().await;
        let slow = RouteDescriptor {
            target: AgentIdentity::HrModel,
            transport: "relay".to_string(),
            reliability: 0.5,
            priority_weight: 2,
        };
        hub.register_route(AgentIdentity::HrModel, slow).await.unwrap();
        let resolved = hub.resolve_route(AgentIdentity::HrModel).await.unwrap().unwrap();
        assert_eq!(resolved.transport, "relay");
        assert!((resolved.reliability - 0.5).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn zero_capacity_setup_fails_into_error() {
        let hub = hub_with(0, 10);
        assert!(hub.agent().initialize().await.is_err());
        assert_eq!(hub.agent().status(), sitecrew_core::AgentStatus::Error);
        assert!(hub.route(query_to(AgentIdentity::HrModel)).await.is_err());
    }

    #[tokio::test]
    async fn hub_task_reports_traffic() {
        let hub = active_hub().await;
        let task = AgentTask::new("report traffic", AgentIdentity::CommunicationHub);
        let done = hub.agent().execute_task(task).await.unwrap();
        assert_eq!(done.status, sitecrew_core::TaskStatus::Completed);
        assert_eq!(done.metadata["result"]["routes_known"], serde_json::json!(4));
    }
}
