//! RDSSH connection manager.
//!
//! Threads:
//! - Main thread: the UI thread (OLE apartment, message loop, session host)
//! - Tokio worker threads: launches, storage and the host-process bridge

mod activation;
mod commands;
mod config;
mod instance;
mod shell;
mod state;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use rdssh_domain::{ConnectionProfile, Protocol};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;
use zeroize::Zeroizing;

use crate::config::AppConfig;
use crate::instance::Instance;
use crate::state::AppState;

#[derive(Parser)]
#[command(name = "rdssh", version, about = "RDP and SSH connection manager")]
#[command(args_conflicts_with_subcommands = true)]
struct Cli {
    /// Deep link to open once the window is up, e.g. rdssh://connect?id=<uuid>
    uri: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// List stored connections
    List,
    /// Add an RDP connection
    AddRdp(AddRdpArgs),
    /// Add an SSH connection
    AddSsh(AddSshArgs),
    /// Remove a connection
    Remove { id: Uuid },
    /// Store a credential in the vault
    CredentialAdd(CredentialAddArgs),
    /// List stored credentials (never their secrets)
    CredentialList,
    /// Delete a credential from the vault
    CredentialRemove { id: Uuid },
    /// Rewrite the connection search index
    Index,
}

#[derive(Args)]
struct AddRdpArgs {
    host: String,
    #[arg(long)]
    port: Option<u16>,
    #[arg(long)]
    name: Option<String>,
    #[arg(long)]
    user: Option<String>,
    #[arg(long)]
    domain: Option<String>,
    /// Id of a stored credential
    #[arg(long)]
    credential: Option<Uuid>,
    /// Connect to the administrative session
    #[arg(long)]
    admin: bool,
    /// Accept any server certificate
    #[arg(long)]
    ignore_cert: bool,
    /// Extra `name=value` advanced settings, space separated
    #[arg(long)]
    extra: Option<String>,
}

#[derive(Args)]
struct AddSshArgs {
    host: String,
    #[arg(long)]
    port: Option<u16>,
    #[arg(long)]
    name: Option<String>,
    #[arg(long)]
    user: Option<String>,
}

#[derive(Args)]
struct CredentialAddArgs {
    user: String,
    #[arg(long)]
    domain: Option<String>,
    #[arg(long)]
    password: String,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let data_dir = config::data_dir()?;
    let settings_path = data_dir.join(config::SETTINGS_FILE);
    let (app_config, config_error) = match AppConfig::read(&settings_path) {
        Ok(loaded) => (loaded.unwrap_or_default(), None),
        Err(error) => (AppConfig::default(), Some(error)),
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&app_config.logging.level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .compact()
        .init();

    if let Some(error) = config_error {
        tracing::warn!(error = %format!("{error:#}"), "using default settings");
    }
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("building tokio runtime")?;
    let Some(command) = cli.command else {
        return run_shell(runtime, data_dir, app_config, cli.uri);
    };
    let state = runtime.block_on(AppState::new(data_dir, app_config))?;
    runtime.block_on(run_command(&state, command))
}

/// Hands `uri` to an already running shell, or becomes the shell.
fn run_shell(
    runtime: tokio::runtime::Runtime,
    data_dir: std::path::PathBuf,
    app_config: AppConfig,
    uri: Option<String>,
) -> Result<()> {
    let listener = match runtime.block_on(instance::claim(&instance::pipe_name(), uri.clone()))? {
        Instance::Primary(listener) => listener,
        Instance::Forwarded => {
            tracing::info!("activation handed to the running instance");
            return Ok(());
        }
    };

    let state = runtime.block_on(AppState::new(data_dir, app_config))?;
    tracing::info!(data_dir = %state.data_dir.display(), "starting rdssh");
    shell::run(state, runtime, listener, uri)
}

async fn run_command(state: &AppState, command: Command) -> Result<()> {
    match command {
        Command::List => {
            for profile in commands::connection_list(state).await {
                println!(
                    "{}  {:<4} {}:{}  {}",
                    profile.id,
                    profile.protocol.as_str(),
                    profile.hostname,
                    profile.effective_port(),
                    profile.title(),
                );
            }
        }
        Command::AddRdp(args) => {
            let mut profile = ConnectionProfile::new(Protocol::Rdp, args.host);
            profile.port = args.port;
            profile.display_name = args.name.unwrap_or_default();
            profile.username = args.user;
            profile.domain = args.domain;
            profile.credential_id = args.credential;
            profile.rdp.admin_mode = args.admin;
            profile.rdp.ignore_cert = args.ignore_cert;
            profile.rdp.extra_args = args.extra;
            add_profile(state, profile).await?;
        }
        Command::AddSsh(args) => {
            let mut profile = ConnectionProfile::new(Protocol::Ssh, args.host);
            profile.port = args.port;
            profile.display_name = args.name.unwrap_or_default();
            profile.username = args.user;
            add_profile(state, profile).await?;
        }
        Command::Remove { id } => {
            if !commands::connection_remove(state, id).await? {
                anyhow::bail!("connection {id} not found");
            }
        }
        Command::CredentialAdd(args) => {
            let password = Zeroizing::new(args.password);
            let stored =
                commands::credential_add(state, &args.user, args.domain.as_deref(), &password)?;
            println!("{}", stored.id);
        }
        Command::CredentialList => {
            for credential in commands::credential_list(state)? {
                match credential.domain {
                    Some(domain) => println!("{}  {domain}\\{}", credential.id, credential.username),
                    None => println!("{}  {}", credential.id, credential.username),
                }
            }
        }
        Command::CredentialRemove { id } => {
            if !commands::credential_remove(state, id)? {
                anyhow::bail!("credential {id} not found");
            }
        }
        Command::Index => {
            commands::index_write(state).await?;
            println!("{}", state.store.index_path().display());
        }
    }
    Ok(())
}

async fn add_profile(state: &AppState, profile: ConnectionProfile) -> Result<()> {
    let id = profile.id;
    commands::connection_upsert(state, profile).await?;
    println!("{id}");
    Ok(())
}
