use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, warn};

use sitecrew_core::config::ResourceManagerConfig;
use sitecrew_core::{
    AgentIdentity, AgentMessage, AgentTask, Error, LearningSignal, MessageType, Result, SignalKind,
};

use crate::cell::{AgentCell, AgentState, Behavior};
use crate::knowledge::ParameterGuard;

/// Crew and equipment pools tracked by the resource manager.
#[derive(Debug, Default)]
pub struct ResourcePool {
    pub available: HashMap<String, f64>,
    pub allocated: HashMap<String, f64>,
}

impl ResourcePool {
    fn total(&self, resource: &str) -> f64 {
        self.available.get(resource).copied().unwrap_or(0.0)
            + self.allocated.get(resource).copied().unwrap_or(0.0)
    }

    fn utilization(&self) -> serde_json::Value {
        let mut out = serde_json::Map::new();
        let mut names: Vec<&String> = self
            .available
            .keys()
            .chain(self.allocated.keys())
            .collect();
        names.sort();
        names.dedup();
        for name in names {
            let total = self.total(name);
            let used = self.allocated.get(name).copied().unwrap_or(0.0);
            let ratio = if total > 0.0 { used / total } else { 0.0 };
            out.insert(name.clone(), json!({"allocated": used, "total": total, "ratio": ratio}));
        }
        serde_json::Value::Object(out)
    }
}

/// Allocates crews and equipment across sites and keeps a running
/// utilization picture.
pub struct ResourceManagerBehavior {
    config: ResourceManagerConfig,
    guard: ParameterGuard,
}

impl ResourceManagerBehavior {
    pub fn new(config: ResourceManagerConfig) -> Self {
        let guard = ParameterGuard::new()
            .declare("optimization_threshold", 0.0, 1.0)
            .declare("learning_rate", 0.001, 0.1)
            .declare("utilization_target", 0.0, 1.0);
        Self { config, guard }
    }

    fn allocate(
        &self,
        pool: &mut ResourcePool,
        resource: &str,
        quantity: f64,
        site: &str,
    ) -> Result<serde_json::Value> {
        let available = pool.available.get(resource).copied().unwrap_or(0.0);
        if quantity <= 0.0 {
            return Err(Error::Task(format!("invalid quantity {quantity}")));
        }
        if available < quantity {
            return Err(Error::Task(format!(
                "insufficient {resource}: requested {quantity}, available {available}"
            )));
        }
        pool.available.insert(resource.to_string(), available - quantity);
        *pool.allocated.entry(resource.to_string()).or_insert(0.0) += quantity;
        debug!(resource = %resource, quantity, site = %site, "Resources allocated");
        Ok(json!({
            "resource": resource,
            "allocated": quantity,
            "site": site,
            "remaining": available - quantity,
        }))
    }

    fn release(
        &self,
        pool: &mut ResourcePool,
        resource: &str,
        quantity: f64,
    ) -> Result<serde_json::Value> {
        let allocated = pool.allocated.get(resource).copied().unwrap_or(0.0);
        if quantity <= 0.0 || quantity > allocated {
            return Err(Error::Task(format!(
                "cannot release {quantity} of {resource}, allocated {allocated}"
            )));
        }
        pool.allocated.insert(resource.to_string(), allocated - quantity);
        *pool.available.entry(resource.to_string()).or_insert(0.0) += quantity;
        Ok(json!({"resource": resource, "released": quantity}))
    }
}

fn meta_str<'a>(task: &'a AgentTask, key: &str, default: &'a str) -> &'a str {
    task.metadata
        .get(key)
        .and_then(|v| v.as_str())
        .unwrap_or(default)
}

fn meta_f64(task: &AgentTask, key: &str, default: f64) -> f64 {
    task.metadata.get(key).and_then(|v| v.as_f64()).unwrap_or(default)
}

#[async_trait]
impl Behavior for ResourceManagerBehavior {
    type Ext = ResourcePool;

    fn identity(&self) -> AgentIdentity {
        AgentIdentity::ResourceManager
    }

    fn guard(&self) -> &ParameterGuard {
        &self.guard
    }

    async fn setup(&self, state: &mut AgentState<ResourcePool>) -> Result<()> {
        state
            .knowledge
            .set_number("optimization_threshold", self.config.optimization_threshold);
        state.knowledge.set_number("learning_rate", self.config.learning_rate);
        state
            .knowledge
            .set_number("utilization_target", self.config.utilization_target);
        state.knowledge.set_number("allocations_made", 0.0);

        // default pools; real deployments overwrite via update_parameters
        for (name, count) in [("crew", 12.0), ("excavator", 3.0), ("crane", 2.0), ("truck", 6.0)] {
            state.ext.available.insert(name.to_string(), count);
        }
        Ok(())
    }

    async fn on_message(
        &self,
        state: &mut AgentState<ResourcePool>,
        message: &AgentMessage,
    ) -> Result<Option<AgentMessage>> {
        match message.message_type {
            MessageType::Query => {
                let body = state.ext.utilization();
                Ok(Some(
                    message
                        .reply_with(MessageType::Response, &body.to_string()),
                ))
            }
            MessageType::Command => match message.content.to_lowercase().as_str() {
                "rebalance" => {
                    // pull everything back to the pool; allocations restart clean
                    let allocated: Vec<(String, f64)> = state
                        .ext
                        .allocated
                        .iter()
                        .map(|(k, v)| (k.clone(), *v))
                        .collect();
                    for (resource, quantity) in allocated {
                        *state.ext.available.entry(resource.clone()).or_insert(0.0) += quantity;
                        state.ext.allocated.insert(resource, 0.0);
                    }
                    Ok(Some(message.ack("pools rebalanced")))
                }
                other => Ok(Some(
                    message.error_reply(&format!("unsupported command: {other}")),
                )),
            },
            MessageType::Alert => {
                state.knowledge.increment("alerts_received", 1.0);
                Ok(Some(message.ack("alert recorded")))
            }
            MessageType::DataSync => {
                for (key, value) in &message.metadata {
                    state.knowledge.set(&format!("sync_{key}"), value.clone());
                }
                Ok(Some(message.ack("data synchronized")))
            }
            MessageType::StatusUpdate | MessageType::Notification => {
                state
                    .knowledge
                    .set("last_notification", json!(message.content));
                Ok(None)
            }
            MessageType::Response | MessageType::Acknowledgment | MessageType::Error => Ok(None),
        }
    }

    async fn on_task(
        &self,
        state: &mut AgentState<ResourcePool>,
        task: &AgentTask,
    ) -> Result<serde_json::Value> {
        match task.title.to_lowercase().as_str() {
            "allocate resources" => {
                let resource = meta_str(task, "resource", "crew").to_string();
                let quantity = meta_f64(task, "quantity", 1.0);
                let site = meta_str(task, "site", "unassigned").to_string();
                let result = self.allocate(&mut state.ext, &resource, quantity, &site)?;
                state.knowledge.increment("allocations_made", 1.0);
                Ok(result)
            }
            "release resources" => {
                let resource = meta_str(task, "resource", "crew").to_string();
                let quantity = meta_f64(task, "quantity", 1.0);
                self.release(&mut state.ext, &resource, quantity)
            }
            "forecast utilization" => {
                let target = state.knowledge.get_f64("utilization_target").unwrap_or(0.85);
                Ok(json!({
                    "utilization": state.ext.utilization(),
                    "target": target,
                }))
            }
            other => Err(Error::Task(format!("unknown operation: {other}"))),
        }
    }

    async fn on_signal(
        &self,
        state: &mut AgentState<ResourcePool>,
        signal: &LearningSignal,
    ) -> Result<()> {
        let rate = state.knowledge.get_f64("learning_rate").unwrap_or(0.01);
        match signal.kind {
            SignalKind::Reinforcement => {
                let current = state.knowledge.get_f64("optimization_threshold").unwrap_or(0.75);
                let next = (current + rate * signal.feedback).clamp(0.0, 1.0);
                state.knowledge.set_number("optimization_threshold", next);
            }
            SignalKind::Online => {
                let prev = state.knowledge.get_f64("observed_utilization").unwrap_or(0.0);
                let next = prev * (1.0 - rate) + signal.feedback * rate;
                state.knowledge.set_number("observed_utilization", next);
            }
            kind => {
                warn!(agent = %self.identity(), kind = ?kind, "Unsupported learning signal, ignored");
            }
        }
        Ok(())
    }
}

/// Convenience constructor used by the coordinator.
pub fn resource_manager(config: ResourceManagerConfig) -> AgentCell<ResourceManagerBehavior> {
    AgentCell::new(ResourceManagerBehavior::new(config), ResourcePool::default())
}
