use async_trait::async_trait;
use tokio::sync::{watch, Mutex};
use tracing::{debug, error, info, warn};

use sitecrew_core::{
    AgentIdentity, AgentMessage, AgentStatus, AgentTask, Error, LearningSignal, Metadata, Result,
};

use crate::knowledge::{KnowledgeBase, ParameterGuard};

/// Everything behind a single agent's lock: the knowledge base plus any
/// variant-specific mutable collections (queues, histories, registries).
pub struct AgentState<Ext> {
    pub knowledge: KnowledgeBase,
    pub ext: Ext,
}

/// Variant-specific policy. Implementations only see state that is already
/// locked; the cell owns all lifecycle and locking plumbing.
#[async_trait]
pub trait Behavior: Send + Sync + 'static {
    type Ext: Send + 'static;

    fn identity(&self) -> AgentIdentity;

    /// Declared numeric ranges for external parameter updates.
    fn guard(&self) -> &ParameterGuard;

    /// Seed knowledge-base defaults and variant state. A failure here puts
    /// the agent into `Error` for good.
    async fn setup(&self, state: &mut AgentState<Self::Ext>) -> Result<()>;

    /// Dispatch on message type. `None` means no reply is warranted.
    async fn on_message(
        &self,
        state: &mut AgentState<Self::Ext>,
        message: &AgentMessage,
    ) -> Result<Option<AgentMessage>>;

    /// Dispatch on task title (case-insensitive). Returns the result payload;
    /// an `Err` becomes a `Failed` task, never a propagated error.
    async fn on_task(
        &self,
        state: &mut AgentState<Self::Ext>,
        task: &AgentTask,
    ) -> Result<serde_json::Value>;

    /// Fold a learning signal into the knowledge base. Unsupported kinds are
    /// logged and ignored by the implementation, never fatal.
    async fn on_signal(
        &self,
        state: &mut AgentState<Self::Ext>,
        signal: &LearningSignal,
    ) -> Result<()>;

    /// Flush/archive accumulated history before the terminal transition.
    async fn on_shutdown(&self, _state: &mut AgentState<Self::Ext>) -> Result<()> {
        Ok(())
    }
}

/// Object-safe agent contract consumed by the coordinator.
#[async_trait]
pub trait Agent: Send + Sync {
    fn identity(&self) -> AgentIdentity;
    fn status(&self) -> AgentStatus;
    /// Live status cell; observers react to transitions without polling.
    fn watch_status(&self) -> watch::Receiver<AgentStatus>;

    async fn initialize(&self) -> Result<()>;
    async fn handle_message(&self, message: AgentMessage) -> Result<Option<AgentMessage>>;
    async fn execute_task(&self, task: AgentTask) -> Result<AgentTask>;
    async fn ingest_signal(&self, signal: LearningSignal) -> Result<()>;
    async fn update_parameters(&self, params: Metadata) -> Result<()>;
    async fn knowledge_snapshot(&self) -> Metadata;
    async fn shutdown(&self) -> Result<()>;
}

/// Generic agent shell: one per variant, instantiated with that variant's
/// [`Behavior`]. Owns the single per-agent mutex and the status watch
/// channel, and turns behavior failures into `Result` values instead of
/// letting them cross the public boundary.
pub struct AgentCell<B: Behavior> {
    behavior: B,
    pub(crate) state: Mutex<AgentState<B::Ext>>,
    status_tx: watch::Sender<AgentStatus>,
}

impl<B: Behavior> AgentCell<B> {
    pub fn new(behavior: B, ext: B::Ext) -> Self {
        let (status_tx, _) = watch::channel(AgentStatus::Initializing);
        Self {
            behavior,
            state: Mutex::new(AgentState {
                knowledge: KnowledgeBase::new(),
                ext,
            }),
            status_tx,
        }
    }

    pub(crate) fn current_status(&self) -> AgentStatus {
        *self.status_tx.borrow()
    }

    fn set_status(&self, status: AgentStatus) {
        // send only fails with no receivers; the cell keeps the value either way
        self.status_tx.send_replace(status);
    }

    pub(crate) fn ensure_active(&self) -> Result<()> {
        let status = self.current_status();
        if status != AgentStatus::Active {
            return Err(Error::Lifecycle(format!(
                "agent {} is {}, not active",
                self.behavior.identity(),
                status
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl<B: Behavior> Agent for AgentCell<B> {
    fn identity(&self) -> AgentIdentity {
        self.behavior.identity()
    }

    fn status(&self) -> AgentStatus {
        self.current_status()
    }

    fn watch_status(&self) -> watch::Receiver<AgentStatus> {
        self.status_tx.subscribe()
    }

    async fn initialize(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        if self.current_status() != AgentStatus::Initializing {
            return Err(Error::Lifecycle(format!(
                "agent {} already initialized ({})",
                self.identity(),
                self.current_status()
            )));
        }
        match self.behavior.setup(&mut state).await {
            Ok(()) => {
                self.set_status(AgentStatus::Active);
                info!(agent = %self.identity(), "Agent initialized");
                Ok(())
            }
            Err(e) => {
                self.set_status(AgentStatus::Error);
                error!(agent = %self.identity(), error = %e, "Agent initialization failed");
                Err(e)
            }
        }
    }

    async fn handle_message(&self, message: AgentMessage) -> Result<Option<AgentMessage>> {
        // status is checked under the lock: a concurrent shutdown that holds
        // the lock must be observed once it releases
        let mut state = self.state.lock().await;
        self.ensure_active()?;
        debug!(
            agent = %self.identity(),
            message_id = %message.id,
            message_type = ?message.message_type,
            "Handling message"
        );
        self.behavior.on_message(&mut state, &message).await
    }

    async fn execute_task(&self, task: AgentTask) -> Result<AgentTask> {
        let mut state = self.state.lock().await;
        self.ensure_active()?;
        debug!(agent = %self.identity(), task_id = %task.id, title = %task.title, "Executing task");
        match self.behavior.on_task(&mut state, &task).await {
            Ok(result) => Ok(task.completed(result)),
            Err(e) => {
                warn!(agent = %self.identity(), task_id = %task.id, error = %e, "Task failed");
                Ok(task.failed(&e.to_string()))
            }
        }
    }

    async fn ingest_signal(&self, signal: LearningSignal) -> Result<()> {
        let mut state = self.state.lock().await;
        self.ensure_active()?;
        self.behavior.on_signal(&mut state, &signal).await
    }

    async fn update_parameters(&self, params: Metadata) -> Result<()> {
        let mut state = self.state.lock().await;
        self.ensure_active()?;
        let report = self
            .behavior
            .guard()
            .apply(&mut state.knowledge, &params);
        debug!(
            agent = %self.identity(),
            applied = report.applied.len(),
            rejected = report.rejected.len(),
            "Parameters updated"
        );
        Ok(())
    }

    async fn knowledge_snapshot(&self) -> Metadata {
        let state = self.state.lock().await;
        state.knowledge.snapshot()
    }

    async fn shutdown(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        if self.current_status() != AgentStatus::Active {
            return Err(Error::Lifecycle(format!(
                "agent {} is {}, cannot shut down",
                self.identity(),
                self.current_status()
            )));
        }
        self.behavior.on_shutdown(&mut state).await?;
        self.set_status(AgentStatus::Shutdown);
        info!(agent = %self.identity(), "Agent shut down");
        Ok(())
    }
}
