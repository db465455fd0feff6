use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Error, Result};

/// Numeric defaults seeded into the resource manager's knowledge base.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceManagerConfig {
    #[serde(default = "default_optimization_threshold")]
    pub optimization_threshold: f64,
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,
    #[serde(default = "default_utilization_target")]
    pub utilization_target: f64,
}

fn default_optimization_threshold() -> f64 {
    0.75
}

fn default_learning_rate() -> f64 {
    0.01
}

fn default_utilization_target() -> f64 {
    0.85
}

impl Default for ResourceManagerConfig {
    fn default() -> Self {
        Self {
            optimization_threshold: default_optimization_threshold(),
            learning_rate: default_learning_rate(),
            utilization_target: default_utilization_target(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HrModelConfig {
    #[serde(default = "default_performance_baseline")]
    pub performance_baseline: f64,
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,
    #[serde(default = "default_training_budget_hours")]
    pub training_budget_hours: f64,
}

fn default_performance_baseline() -> f64 {
    0.7
}

fn default_training_budget_hours() -> f64 {
    40.0
}

impl Default for HrModelConfig {
    fn default() -> Self {
        Self {
            performance_baseline: default_performance_baseline(),
            learning_rate: default_learning_rate(),
            training_budget_hours: default_training_budget_hours(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutiveConfig {
    #[serde(default = "default_approval_threshold")]
    pub approval_threshold: f64,
    #[serde(default = "default_compliance_target")]
    pub compliance_target: f64,
}

fn default_approval_threshold() -> f64 {
    50_000.0
}

fn default_compliance_target() -> f64 {
    0.95
}

impl Default for ExecutiveConfig {
    fn default() -> Self {
        Self {
            approval_threshold: default_approval_threshold(),
            compliance_target: default_compliance_target(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollaborationConfig {
    #[serde(default = "default_response_sla_secs")]
    pub response_sla_secs: f64,
    #[serde(default = "default_escalation_threshold")]
    pub escalation_threshold: f64,
}

fn default_response_sla_secs() -> f64 {
    900.0
}

fn default_escalation_threshold() -> f64 {
    3.0
}

impl Default for CollaborationConfig {
    fn default() -> Self {
        Self {
            response_sla_secs: default_response_sla_secs(),
            escalation_threshold: default_escalation_threshold(),
        }
    }
}

/// Communication hub knobs: bounded queue capacity, history retention, and
/// the protocols the translation registry recognizes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HubConfig {
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
    #[serde(default = "default_protocols")]
    pub protocols: Vec<String>,
}

fn default_queue_capacity() -> usize {
    100
}

fn default_history_limit() -> usize {
    500
}

fn default_protocols() -> Vec<String> {
    ["json", "xml", "binary", "rest", "websocket"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            history_limit: default_history_limit(),
            protocols: default_protocols(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct CoreConfig {
    #[serde(default)]
    pub resource_manager: ResourceManagerConfig,
    #[serde(default)]
    pub hr_model: HrModelConfig,
    #[serde(default)]
    pub executive: ExecutiveConfig,
    #[serde(default)]
    pub collaboration: CollaborationConfig,
    #[serde(default)]
    pub hub: HubConfig,
}

impl CoreConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: CoreConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.hub.queue_capacity == 0 {
            return Err(Error::Config(
                "hub.queueCapacity must be greater than zero".to_string(),
            ));
        }
        if self.hub.history_limit == 0 {
            return Err(Error::Config(
                "hub.historyLimit must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
