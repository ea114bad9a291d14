mod config;
mod events;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Result, bail};
use clap::Parser;
use tether::persist::{FileSchemaStore, MemorySchemaStore, SchemaStore};
use tether::session::SessionError;
use tether::{ConnectionState, ServerAddress, SessionConfig, SessionController, TcpConnector};
use tokio::time::MissedTickBehavior;

const MAX_RELOGIN_ATTEMPTS: u32 = 3;

#[derive(Parser)]
#[command(name = "tether-client")]
#[command(about = "Headless client for a two-tier game server")]
struct Args {
    #[arg(short, long, help = "Login tier address (e.g., 127.0.0.1:20013)")]
    address: Option<ServerAddress>,

    #[arg(short, long)]
    user: String,

    #[arg(short, long, default_value = "")]
    password: String,

    #[arg(long, help = "Create the account instead of logging in")]
    create_account: bool,

    #[arg(
        long,
        conflicts_with = "create_account",
        help = "Request a password reset instead of logging in"
    )]
    reset_password: bool,

    #[arg(short, long, help = "JSON file overlaid on the session defaults")]
    config: Option<PathBuf>,

    #[arg(long, help = "Schema cache directory (defaults to the user cache dir)")]
    cache_dir: Option<PathBuf>,

    #[arg(long, help = "Never read or write the schema cache")]
    no_cache: bool,

    #[arg(long, default_value_t = 50, help = "Network poll period in ms")]
    poll_ms: u64,

    #[arg(long, help = "Re-login to the gameplay tier after a dropped connection")]
    relogin: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = session_config(&args)?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(run(args, config))
}

fn session_config(args: &Args) -> Result<SessionConfig> {
    let mut config = match &args.config {
        Some(path) => config::load(path)?,
        None => SessionConfig::default(),
    };
    if let Some(address) = &args.address {
        config.auth_address = address.clone();
    }
    if args.no_cache {
        config.persist_schema = false;
    }
    Ok(config)
}

fn schema_store(args: &Args) -> Box<dyn SchemaStore> {
    if args.no_cache {
        return Box::new(MemorySchemaStore::new());
    }
    match args.cache_dir.clone().or_else(config::default_cache_dir) {
        Some(dir) => {
            log::info!("Schema cache at {}", dir.display());
            Box::new(FileSchemaStore::new(dir))
        }
        None => {
            log::warn!("No cache directory available, schema will not be cached");
            Box::new(MemorySchemaStore::new())
        }
    }
}

async fn run(args: Args, config: SessionConfig) -> Result<()> {
    let mut session =
        SessionController::initialize(config, Box::new(TcpConnector::new()), schema_store(&args));

    if args.create_account {
        session.create_account(&args.user, &args.password, &[])?;
    } else if args.reset_password {
        session.reset_password(&args.user)?;
    } else {
        session.login(&args.user, &args.password, &[])?;
    }

    let mut ticker = tokio::time::interval(Duration::from_millis(args.poll_ms.max(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    let mut relogins = 0;
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            result = &mut shutdown => {
                result?;
                log::info!("Interrupted, shutting down");
                session.destroy();
                return Ok(());
            }
        }

        session.process();
        for event in session.take_events() {
            events::log_event(&session, &event);
        }
        if session.state() != ConnectionState::Disconnected {
            continue;
        }

        let resumable = matches!(
            session.last_failure(),
            Some(SessionError::ConnectionFailure { .. } | SessionError::LivenessTimeout)
        );
        if args.relogin && resumable && relogins < MAX_RELOGIN_ATTEMPTS {
            relogins += 1;
            log::info!("Re-login attempt {relogins}/{MAX_RELOGIN_ATTEMPTS}");
            if let Err(e) = session.relogin_gameplay_tier() {
                log::warn!("Re-login not possible: {e}");
            }
            continue;
        }
        break;
    }

    let failure = session.last_failure().cloned();
    session.destroy();
    match failure {
        Some(err) => bail!(err),
        None => Ok(()),
    }
}
