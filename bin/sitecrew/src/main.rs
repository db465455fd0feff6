use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use sitecrew_coordinator::Coordinator;
use sitecrew_core::{
    AgentIdentity, AgentMessage, AgentTask, CoreConfig, MessageType, Priority,
};

#[derive(Parser)]
#[command(name = "sitecrew")]
#[command(about = "Construction-management agent coordination core", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to a JSON config file (defaults are used if omitted)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum AgentArg {
    ResourceManager,
    HrModel,
    CommunicationHub,
    Executive,
    HumanCollaboration,
}

impl From<AgentArg> for AgentIdentity {
    fn from(value: AgentArg) -> Self {
        match value {
            AgentArg::ResourceManager => AgentIdentity::ResourceManager,
            AgentArg::HrModel => AgentIdentity::HrModel,
            AgentArg::CommunicationHub => AgentIdentity::CommunicationHub,
            AgentArg::Executive => AgentIdentity::Executive,
            AgentArg::HumanCollaboration => AgentIdentity::HumanCollaboration,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum TypeArg {
    Query,
    Command,
    Notification,
    Alert,
    DataSync,
}

impl From<TypeArg> for MessageType {
    fn from(value: TypeArg) -> Self {
        match value {
            TypeArg::Query => MessageType::Query,
            TypeArg::Command => MessageType::Command,
            TypeArg::Notification => MessageType::Notification,
            TypeArg::Alert => MessageType::Alert,
            TypeArg::DataSync => MessageType::DataSync,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Start all agents and print their statuses
    Status,

    /// Send a message to a named agent and print the reply
    Send {
        /// Target agent
        #[arg(value_enum)]
        to: AgentArg,

        /// Message type
        #[arg(short = 't', long, value_enum, default_value = "query")]
        message_type: TypeArg,

        /// Message content
        content: String,

        /// Mark the message urgent
        #[arg(long)]
        urgent: bool,
    },

    /// Run a named operation on a named agent
    Task {
        /// Assigned agent
        #[arg(value_enum)]
        agent: AgentArg,

        /// Operation title (e.g. "allocate resources")
        title: String,

        /// Task metadata as a JSON object
        #[arg(short, long, default_value = "{}")]
        metadata: String,
    },

    /// Print a knowledge-base snapshot for a named agent
    Knowledge {
        #[arg(value_enum)]
        agent: AgentArg,
    },
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<CoreConfig> {
    match path {
        Some(path) => Ok(CoreConfig::load(path)?),
        None => Ok(CoreConfig::default()),
    }
}

async fn start(config: CoreConfig) -> Coordinator {
    let coordinator = Coordinator::from_config(config);
    let report = coordinator.start_all().await;
    for (identity, error) in &report.failed {
        eprintln!("agent {identity} failed to start: {error}");
    }
    coordinator
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    let config = load_config(cli.config.as_ref())?;

    match cli.command {
        Commands::Status => {
            let coordinator = start(config).await;
            for identity in coordinator.identities() {
                let status = coordinator.agent_status(identity)?;
                println!("{:<22} {}", identity.as_str(), status);
            }
            coordinator.stop_all().await;
        }
        Commands::Send {
            to,
            message_type,
            content,
            urgent,
        } => {
            let coordinator = start(config).await;
            let mut message = AgentMessage::new(
                AgentIdentity::HumanCollaboration,
                to.into(),
                message_type.into(),
                &content,
            );
            if urgent {
                message = message.with_priority(Priority::Urgent);
            }
            match coordinator.submit_message(message).await? {
                Some(reply) => println!("[{:?}] {}", reply.message_type, reply.content),
                None => println!("(no reply)"),
            }
            coordinator.stop_all().await;
        }
        Commands::Task {
            agent,
            title,
            metadata,
        } => {
            let coordinator = start(config).await;
            let mut task = AgentTask::new(&title, agent.into());
            let parsed: serde_json::Value = serde_json::from_str(&metadata)?;
            if let Some(object) = parsed.as_object() {
                for (key, value) in object {
                    task = task.with_metadata(key, value.clone());
                }
            }
            let done = coordinator.submit_task(task).await?;
            println!("{}", serde_json::to_string_pretty(&done)?);
            coordinator.stop_all().await;
        }
        Commands::Knowledge { agent } => {
            let coordinator = start(config).await;
            let snapshot = coordinator.knowledge_snapshot(agent.into()).await?;
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
            coordinator.stop_all().await;
        }
    }

    Ok(())
}
