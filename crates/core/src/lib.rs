pub mod config;
pub mod error;
pub mod message;
pub mod types;

pub use config::{CoreConfig, HubConfig};
pub use error::{Error, Result};
pub use message::{
    AgentMessage, AgentTask, LearningSignal, MessageType, Metadata, RouteDescriptor, SignalKind,
    TaskStatus,
};
pub use types::{AgentIdentity, AgentStatus, Priority};
