pub mod cell;
pub mod collaboration;
pub mod executive;
pub mod hr;
pub mod hub;
pub mod knowledge;
pub mod resource;

pub use cell::{Agent, AgentCell, AgentState, Behavior};
pub use collaboration::{human_collaboration, CollaborationBehavior};
pub use executive::{executive, ExecutiveBehavior};
pub use hr::{hr_model, HrModelBehavior};
pub use hub::{HubAgent, HubBehavior, HistoryRecord};
pub use knowledge::{AppliedReport, KnowledgeBase, ParameterGuard, ParameterRange};
pub use resource::{resource_manager, ResourceManagerBehavior};
