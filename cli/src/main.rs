// Sage CLI - Command Line Interface Entry Point

mod logging;
mod render;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sage_config::loader::parse_cli_override;
use sage_config::{Config, ConfigLoader};
use sage_core::knowledge::{KnowledgeRetriever, LocalKnowledgeBase};
use sage_core::mcp::McpConnectionManager;
use sage_core::sandbox::{DockerCliBackend, SandboxSupervisor};
use sage_core::{Sage, SessionContext};
use sage_rmcp_client::RmcpConnector;
use sage_state::SessionStore;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::info;

/// Sage - chat assistant with tools and a code sandbox
#[derive(Parser, Debug)]
#[command(name = "sage")]
#[command(version, about, long_about = None)]
struct TopCli {
    #[clap(flatten)]
    config_overrides: CliConfigOverrides,

    #[clap(subcommand)]
    command: Option<Commands>,
}

/// CLI configuration overrides
#[derive(Debug, clap::Args)]
struct CliConfigOverrides {
    /// Configuration override in key=value format
    #[arg(short = 'c', long = "config", value_name = "KEY=VALUE")]
    overrides: Vec<String>,
}

impl CliConfigOverrides {
    fn parse(&self) -> Result<Vec<(String, String)>> {
        self.overrides
            .iter()
            .map(|raw| parse_cli_override(raw).with_context(|| format!("bad override '{raw}'")))
            .collect()
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Start an interactive chat (default)
    Chat {
        /// File the conversation is about
        #[arg(short = 'f', long = "file")]
        file: Option<PathBuf>,

        /// Resume a stored session
        #[arg(short = 's', long = "session")]
        session: Option<String>,
    },

    /// Answer a single prompt and exit
    Run {
        prompt: String,

        #[arg(short = 'f', long = "file")]
        file: Option<PathBuf>,
    },

    /// Inspect MCP servers
    Mcp {
        #[command(subcommand)]
        mcp_command: McpCommands,
    },

    /// Manage the knowledge base
    Kb {
        #[command(subcommand)]
        kb_command: KbCommands,
    },

    /// Browse stored sessions
    History {
        #[command(subcommand)]
        history_command: HistoryCommands,
    },

    /// Manage sandbox environments
    Sandbox {
        #[command(subcommand)]
        sandbox_command: SandboxCommands,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        config_command: ConfigCommands,
    },

    /// List models served by the configured provider
    Models,
}

#[derive(Debug, Subcommand)]
enum McpCommands {
    /// List tools per enabled server
    List {
        /// Ignore cached listings
        #[arg(long)]
        refresh: bool,
    },
}

#[derive(Debug, Subcommand)]
enum KbCommands {
    /// Index a document
    Add { path: PathBuf },
    /// List indexed documents
    List,
    /// Remove a document
    Delete { name: String },
    /// Query the knowledge base
    Search { query: String },
}

#[derive(Debug, Subcommand)]
enum HistoryCommands {
    /// List stored sessions, newest first
    List,
    /// Print a stored session
    Show { id: String },
    /// Delete a stored session
    Delete { id: String },
}

#[derive(Debug, Subcommand)]
enum SandboxCommands {
    /// Remove the environment of a session
    Stop { session: String },
}

#[derive(Debug, Subcommand)]
enum ConfigCommands {
    /// Show the resolved configuration
    Show,

    /// Set a value in the global configuration file
    Set { key: String, value: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = TopCli::parse();

    let cwd = std::env::current_dir().context("failed to read working directory")?;
    let loader = ConfigLoader::new().with_project_dir(cwd);
    let config = loader
        .load_with_cli_overrides(cli.config_overrides.parse()?)
        .context("failed to load configuration")?;
    let _log_guard = logging::init(&config.logging);

    info!("Sage CLI starting...");

    match cli.command.unwrap_or(Commands::Chat {
        file: None,
        session: None,
    }) {
        Commands::Chat { file, session } => run_chat(config, file, session).await,
        Commands::Run { prompt, file } => run_prompt(config, prompt, file).await,
        Commands::Mcp { mcp_command } => handle_mcp_command(config, mcp_command).await,
        Commands::Kb { kb_command } => handle_kb_command(config, kb_command).await,
        Commands::History { history_command } => {
            handle_history_command(config, history_command).await
        }
        Commands::Sandbox { sandbox_command } => {
            handle_sandbox_command(config, sandbox_command).await
        }
        Commands::Config { config_command } => handle_config_command(&loader, &config, config_command),
        Commands::Models => list_models(config).await,
    }
}

/// Runs one turn with a live renderer attached.
async fn turn(sage: &Sage, session: &mut SessionContext, prompt: &str) -> Result<()> {
    let (tx, rx) = mpsc::channel(256);
    let renderer = tokio::spawn(render::render_events(rx));
    let outcome = sage.run_turn(session, prompt, tx).await;
    renderer.await.context("event renderer stopped")?;
    outcome.map(|_| ())
}

async fn run_prompt(config: Config, prompt: String, file: Option<PathBuf>) -> Result<()> {
    let sage = Sage::new(config).await?;
    let mut session = SessionContext::new().with_current_file(file);
    turn(&sage, &mut session, &prompt).await?;
    if let Some(id) = &session.persisted_id {
        info!(session_id = %id, "session saved");
    }
    Ok(())
}

async fn run_chat(config: Config, file: Option<PathBuf>, resume: Option<String>) -> Result<()> {
    let sage = Sage::new(config).await?;
    let mut session = match resume {
        Some(id) => sage.resume_session(&id).await?,
        None => SessionContext::new(),
    }
    .with_current_file(file);

    println!("Sage interactive mode");
    println!("Type 'help' for commands, 'exit' to quit");
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        eprint!("sage> ");
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();

        match line {
            "" => continue,
            "exit" | "quit" => break,
            "help" => {
                println!("Commands:");
                println!("  help          - Show this help");
                println!("  file <path>   - Set the file the conversation is about");
                println!("  file          - Clear the current file");
                println!("  session       - Show the session id");
                println!("  exit, quit    - Leave");
                println!();
                println!("Anything else is sent to the assistant.");
            }
            "session" => println!(
                "runtime: {}  stored: {}",
                session.runtime_id,
                session.persisted_id.as_deref().unwrap_or("(not saved yet)")
            ),
            "file" => session.current_file = None,
            _ if line.starts_with("file ") => {
                let path = PathBuf::from(line.trim_start_matches("file ").trim());
                println!("Current file: {}", path.display());
                session.current_file = Some(path);
            }
            prompt => {
                if let Err(e) = turn(&sage, &mut session, prompt).await {
                    eprintln!("Turn failed: {e:#}");
                }
            }
        }
    }

    println!("Goodbye!");
    Ok(())
}

async fn handle_mcp_command(config: Config, cmd: McpCommands) -> Result<()> {
    match cmd {
        McpCommands::List { refresh } => {
            if config.mcp.enabled_servers().next().is_none() {
                println!("No MCP servers enabled.");
                return Ok(());
            }
            let manager = McpConnectionManager::new(config.mcp, Arc::new(RmcpConnector::new()));
            manager.list_tools(refresh).await;
            for (server, tools) in manager.tools_by_server().await {
                println!("{server}:");
                for tool in tools {
                    println!("  {:<24} {}", tool.name, tool.description);
                }
            }
        }
    }
    Ok(())
}

async fn handle_kb_command(config: Config, cmd: KbCommands) -> Result<()> {
    let kb = LocalKnowledgeBase::new(&config.knowledge.store_dir);
    let model = config.knowledge.embed_model.as_str();
    match cmd {
        KbCommands::Add { path } => println!("{}", kb.add_document(&path, model).await?),
        KbCommands::List => {
            let files = kb.list_files(model).await?;
            if files.is_empty() {
                println!("Knowledge base is empty.");
            }
            for file in files {
                println!("{file}");
            }
        }
        KbCommands::Delete { name } => {
            kb.delete_file(&name, model).await?;
            println!("Removed {name}");
        }
        KbCommands::Search { query } => {
            let rerank = config
                .knowledge
                .rerank_model
                .as_deref()
                .filter(|_| config.features.rerank);
            println!("{}", kb.search(&query, model, rerank).await?);
        }
    }
    Ok(())
}

async fn handle_history_command(config: Config, cmd: HistoryCommands) -> Result<()> {
    let store = SessionStore::new(config.history.dir);
    match cmd {
        HistoryCommands::List => {
            for summary in store.list().await? {
                println!("{}", summary.id);
            }
        }
        HistoryCommands::Show { id } => {
            for message in store.load(&id).await? {
                let role = format!("{:?}", message.role).to_lowercase();
                match &message.tool_calls {
                    Some(calls) if !calls.is_empty() => {
                        for call in calls {
                            println!("[{role}] -> {}({})", call.function.name, call.function.arguments);
                        }
                    }
                    _ => println!("[{role}] {}", message.text_without_context_file()),
                }
            }
        }
        HistoryCommands::Delete { id } => {
            store.delete(&id).await?;
            println!("Deleted {id}");
        }
    }
    Ok(())
}

async fn handle_sandbox_command(config: Config, cmd: SandboxCommands) -> Result<()> {
    match cmd {
        SandboxCommands::Stop { session } => {
            let backend = Arc::new(DockerCliBackend::new(
                config.sandbox.docker_bin.clone(),
                config.sandbox.workdir.clone(),
            ));
            SandboxSupervisor::new(backend, config.sandbox)
                .stop(&session)
                .await
                .with_context(|| format!("failed to stop sandbox for {session}"))?;
            println!("Stopped sandbox for {session}");
        }
    }
    Ok(())
}

fn handle_config_command(loader: &ConfigLoader, config: &Config, cmd: ConfigCommands) -> Result<()> {
    match cmd {
        ConfigCommands::Show => {
            print!("{}", toml::to_string_pretty(config).context("failed to render configuration")?);
        }
        ConfigCommands::Set { key, value } => {
            let path = loader.set_global_value(&key, &value)?;
            println!("Set {key} = {value} in {}", path.display());
        }
    }
    Ok(())
}

async fn list_models(config: Config) -> Result<()> {
    let client = sage_core::model::init_model_layer(&config)?;
    let models = client.list_models().await?;
    println!("Models from {}:", client.provider_id());
    for model in models.data {
        println!("  {}", model.id);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn overrides_and_subcommands_parse() {
        let cli = TopCli::parse_from([
            "sage",
            "-c",
            "agent.max_tool_steps=3",
            "run",
            "plot sales",
            "--file",
            "uploads/sales.xlsx",
        ]);
        assert_eq!(
            cli.config_overrides.parse().expect("overrides"),
            vec![("agent.max_tool_steps".to_string(), "3".to_string())]
        );
        match cli.command {
            Some(Commands::Run { prompt, file }) => {
                assert_eq!(prompt, "plot sales");
                assert_eq!(file, Some(PathBuf::from("uploads/sales.xlsx")));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn kb_search_takes_query() {
        let cli = TopCli::parse_from(["sage", "kb", "search", "refund policy"]);
        assert!(matches!(
            cli.command,
            Some(Commands::Kb {
                kb_command: KbCommands::Search { .. }
            })
        ));
    }
}
