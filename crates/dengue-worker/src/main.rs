// Dengue workflow runner
//
// Design Decision: Use clap derive with env fallbacks for every path.
// Design Decision: Results are printed as JSON so the output can be piped into other tools.
// Design Decision: Stream events go to the tracing log, never to stdout.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use dengue_core::{
    register_builtin_factories, validate_workflow, AgentRegistry, Callbacks, JsonDirWorkflowStore,
    Metadata, ProcessRequest, StreamEvent, WorkflowManager, WorkflowManagerConfig, WorkflowStore,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "dengue-worker")]
#[command(about = "Run and inspect dengue RAG agent workflows")]
#[command(version)]
struct Cli {
    /// Directory of workflow definitions, one `<WORKFLOW_ID>.json` per workflow
    #[arg(long, env = "DENGUE_WORKFLOWS_DIR", default_value = "config/workflows")]
    workflows_dir: PathBuf,

    /// Agent registry file
    #[arg(long, env = "DENGUE_AGENTS_FILE", default_value = "config/agents.json")]
    agents_file: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a message through a workflow and print the result as JSON
    Run {
        /// Message text
        message: String,

        /// Workflow ID (defaults to DENGUE_DEFAULT_WORKFLOW)
        #[arg(long, short)]
        workflow: Option<String>,

        /// Session ID to continue
        #[arg(long, short)]
        session: Option<String>,

        /// User ID recorded on new sessions
        #[arg(long, short)]
        user: Option<String>,

        /// Initial metadata as a JSON object
        #[arg(long)]
        metadata: Option<String>,
    },

    /// Send a message straight to one agent, bypassing workflows
    Ask {
        /// Agent ID
        agent: String,

        /// Message text
        message: String,
    },

    /// Check workflows against the agent registry
    Validate {
        /// Only check this workflow
        workflow: Option<String>,
    },

    /// List agent definitions
    Agents {
        /// Include inactive agents
        #[arg(long)]
        all: bool,
    },

    /// List workflows with their flattened step count
    Workflows,
}

struct Runtime {
    manager: WorkflowManager,
    workflows: Arc<JsonDirWorkflowStore>,
    registry: Arc<AgentRegistry>,
}

async fn build_runtime(cli: &Cli) -> Result<Runtime> {
    let config = WorkflowManagerConfig::from_env().context("Invalid DENGUE_* configuration")?;

    let registry = Arc::new(register_builtin_factories(AgentRegistry::builder()).build());
    registry
        .load_file(&cli.agents_file)
        .await
        .with_context(|| format!("Failed to load agents from {}", cli.agents_file.display()))?;

    let workflows = Arc::new(
        JsonDirWorkflowStore::load(&cli.workflows_dir)
            .await
            .with_context(|| {
                format!("Failed to load workflows from {}", cli.workflows_dir.display())
            })?,
    );

    tracing::info!(
        default_workflow = %config.default_workflow_id,
        step_timeout = ?config.step_timeout,
        "Workflow manager configured"
    );
    let manager = WorkflowManager::new(config, workflows.clone(), registry.clone());

    Ok(Runtime {
        manager,
        workflows,
        registry,
    })
}

fn log_stream_event(event: StreamEvent) {
    tracing::debug!(
        agent_id = %event.agent_id,
        message_type = %event.message_type,
        content = %event.content,
        "stream"
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dengue_worker=debug,dengue_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let runtime = build_runtime(&cli).await?;

    match cli.command {
        Commands::Run {
            message,
            workflow,
            session,
            user,
            metadata,
        } => {
            let mut request = ProcessRequest::new(message)
                .with_callbacks(Callbacks::new().on_stream_sync(log_stream_event));
            if let Some(workflow) = workflow {
                request = request.with_workflow(workflow);
            }
            if let Some(session) = session {
                request = request.with_session(session);
            }
            if let Some(user) = user {
                request = request.with_user(user);
            }
            if let Some(raw) = metadata {
                let value: serde_json::Value =
                    serde_json::from_str(&raw).context("--metadata is not valid JSON")?;
                let metadata =
                    Metadata::try_from(value).context("--metadata must be a JSON object")?;
                request = request.with_metadata(metadata);
            }

            let result = runtime.manager.process_message(request).await;
            println!("{}", serde_json::to_string_pretty(&result)?);
            if let Some(error) = result.error() {
                bail!("{error}");
            }
        }

        Commands::Ask { agent, message } => {
            let reply = runtime
                .manager
                .process_direct_agent_message(&agent, &message, None)
                .await;
            println!("{reply}");
        }

        Commands::Validate { workflow } => {
            let ids = match workflow {
                Some(id) => vec![id],
                None => runtime.workflows.workflow_ids().await,
            };

            let mut failed = 0;
            for id in &ids {
                let problems =
                    validate_workflow(runtime.workflows.as_ref(), runtime.registry.as_ref(), id)
                        .await;
                if problems.is_empty() {
                    println!("{id}: ok");
                } else {
                    failed += 1;
                    println!("{id}:");
                    for problem in problems {
                        println!("  - {problem}");
                    }
                }
            }
            if failed > 0 {
                bail!("{failed} of {} workflow(s) failed validation", ids.len());
            }
        }

        Commands::Agents { all } => {
            for definition in runtime.registry.list_agents(!all).await {
                let state = if definition.active { "" } else { " (inactive)" };
                println!(
                    "{:<32} {:<16} {}{state}",
                    definition.id, definition.kind, definition.agent_type
                );
            }
        }

        Commands::Workflows => {
            for id in runtime.manager.workflow_ids().await {
                match runtime.manager.flatten_steps(&id).await {
                    Ok(steps) => println!("{id:<40} {} step(s)", steps.len()),
                    Err(e) => println!("{id:<40} error: {e}"),
                }
            }
        }
    }

    Ok(())
}
