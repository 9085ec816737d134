mod config;
mod render;
mod session_cmds;

use clap::{Parser, Subcommand};

use attune_core::config::ServiceConfig;
use attune_model::PlanType;

use config::AttuneConfig;
use session_cmds::Session;

#[derive(Parser)]
#[command(name = "attune", about = "Adaptive therapeutic plan client")]
struct Cli {
    /// Plan service base URL (overrides ATTUNE_BASE_URL env var)
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// User whose plan to operate on (overrides ATTUNE_USER_ID env var)
    #[arg(long, global = true)]
    user: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write an attune config file
    Init {
        /// Per-request timeout in seconds
        #[arg(long, default_value_t = ServiceConfig::DEFAULT_TIMEOUT_SECS)]
        timeout_secs: u64,
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
    /// Show the current plan
    Show,
    /// Generate a new plan
    Generate {
        /// Plan cadence: daily, weekly or monthly
        #[arg(long = "type", default_value = "weekly")]
        plan_type: PlanType,
    },
    /// Mark an activity of the current plan completed
    Complete {
        /// Activity ID to complete
        activity_id: String,
    },
    /// Ask for an adapted revision of the current plan
    Adapt {
        /// Free-form feedback as a JSON document
        #[arg(long)]
        feedback: Option<String>,
    },
}

/// Execute the `attune init` command: write config file.
fn cmd_init(
    base_url: Option<&str>,
    user: Option<&str>,
    timeout_secs: u64,
    force: bool,
) -> anyhow::Result<()> {
    let path = config::config_path();

    if path.exists() && !force {
        anyhow::bail!(
            "config file already exists at {}\nUse --force to overwrite.",
            path.display()
        );
    }
    if timeout_secs == 0 {
        anyhow::bail!("--timeout-secs must be at least 1");
    }

    let base_url = base_url.unwrap_or(ServiceConfig::DEFAULT_BASE_URL);
    let cfg = config::ConfigFile {
        service: config::ServiceSection {
            base_url: base_url.to_string(),
            timeout_secs,
        },
        session: config::SessionSection {
            user_id: user.map(str::to_string),
        },
    };

    config::save_config(&cfg)?;

    println!("Config written to {}", path.display());
    println!("  service.base_url = {base_url}");
    println!("  service.timeout_secs = {timeout_secs}");
    match user {
        Some(user) => println!("  session.user_id = {user}"),
        None => {
            println!();
            println!("No user set: pass --user or set ATTUNE_USER_ID when running commands.");
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let base_url = cli.base_url.as_deref();
    let user = cli.user.as_deref();

    match cli.command {
        Commands::Init {
            timeout_secs,
            force,
        } => {
            cmd_init(base_url, user, timeout_secs, force)?;
        }
        Commands::Show => {
            let session = open_session(base_url, user)?;
            session_cmds::run_show(&session).await?;
        }
        Commands::Generate { plan_type } => {
            let session = open_session(base_url, user)?;
            session_cmds::run_generate(&session, plan_type).await?;
        }
        Commands::Complete { activity_id } => {
            let session = open_session(base_url, user)?;
            session_cmds::run_complete(&session, &activity_id).await?;
        }
        Commands::Adapt { feedback } => {
            let session = open_session(base_url, user)?;
            session_cmds::run_adapt(&session, feedback.as_deref()).await?;
        }
    }

    Ok(())
}

/// Resolve configuration and connect a session to the plan service.
fn open_session(base_url: Option<&str>, user: Option<&str>) -> anyhow::Result<Session> {
    let resolved = AttuneConfig::resolve(base_url, user)?;
    tracing::debug!(
        base_url = %resolved.service.base_url,
        user_id = %resolved.user_id,
        "configuration resolved"
    );
    Session::connect(&resolved)
}
