use clap::{Parser, Subcommand};
use kernelius::channels::kernelius::{
    delete_account, describe_account, list_account_ids, resolve_account, set_account_enabled,
    KerneliusChannel,
};
use kernelius::channels::InboundMessage;
use kernelius::config::{self, Config};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;

#[derive(Parser)]
#[command(name = "kernelius")]
#[command(about = "Kernelius Forge channel CLI", long_about = None)]
struct Cli {
    /// Config file path (default: KERNELIUS_CONFIG_PATH or ~/.kernelius/config.json)
    #[arg(long, short, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Run the gateway (Forge webhook listener and /actions endpoint). Accepted messages are printed as JSON lines on stdout.
    Gateway {
        /// HTTP port (default from config or 15152)
        #[arg(long, short)]
        port: Option<u16>,
    },

    /// Post a comment on an issue or pull request.
    Send {
        /// Target, e.g. repo:owner/name:issue:42 or repo:owner/name:pr:10
        #[arg(long)]
        to: String,

        /// Comment body (markdown)
        #[arg(long, short)]
        message: String,

        /// Account id (default account when omitted)
        #[arg(long)]
        account: Option<String>,
    },

    /// Add a reaction to an issue, pull request or comment.
    React {
        /// Message id, e.g. issue:5, pr:3, issue_comment:17, pr_comment:9
        #[arg(long)]
        message_id: String,

        /// Emoji code, e.g. +1
        #[arg(long)]
        emoji: String,

        /// Account id (default account when omitted)
        #[arg(long)]
        account: Option<String>,
    },

    /// Inspect or change configured accounts.
    Accounts {
        #[command(subcommand)]
        command: AccountsCommand,
    },

    /// Print the webhook path an account listens on.
    WebhookPath {
        /// Account id (default account when omitted)
        #[arg(long)]
        account: Option<String>,
    },
}

#[derive(Subcommand)]
enum AccountsCommand {
    /// List accounts with their resolved settings.
    List,
    /// Enable an account (default account when omitted).
    Enable { account: Option<String> },
    /// Disable an account (default account when omitted).
    Disable { account: Option<String> },
    /// Delete a named account. The default account cannot be deleted.
    Delete { account: String },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    let result = match cli.command {
        Some(Commands::Version) => {
            println!("kernelius {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Some(Commands::Gateway { port }) => run_gateway(cli.config, port).await,
        Some(Commands::Send {
            to,
            message,
            account,
        }) => run_send(cli.config, &to, &message, account.as_deref()).await,
        Some(Commands::React {
            message_id,
            emoji,
            account,
        }) => run_react(cli.config, &message_id, &emoji, account.as_deref()).await,
        Some(Commands::Accounts { command }) => run_accounts(cli.config, command),
        Some(Commands::WebhookPath { account }) => run_webhook_path(cli.config, account.as_deref()),
        None => {
            println!("Run with --help for usage");
            Ok(())
        }
    };
    if let Err(e) = result {
        log::error!("{:#}", e);
        std::process::exit(1);
    }
}

fn load(config_path: Option<PathBuf>) -> anyhow::Result<(Config, PathBuf)> {
    config::load_config(config_path)
}

async fn run_gateway(config_path: Option<PathBuf>, port: Option<u16>) -> anyhow::Result<()> {
    let (mut config, _) = load(config_path)?;
    if let Some(p) = port {
        config.gateway.port = p;
    }
    let (tx, mut rx) = mpsc::channel::<InboundMessage>(64);
    tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            match serde_json::to_string(&msg) {
                Ok(line) => println!("{}", line),
                Err(e) => log::warn!("failed to serialize inbound message: {}", e),
            }
        }
    });
    kernelius::gateway::run_gateway(config, tx).await
}

async fn run_send(
    config_path: Option<PathBuf>,
    to: &str,
    message: &str,
    account: Option<&str>,
) -> anyhow::Result<()> {
    let (config, _) = load(config_path)?;
    let channel = KerneliusChannel::new(Arc::new(config));
    let sent = channel.send(to, message, account).await?;
    println!("{}", serde_json::to_string(&sent)?);
    Ok(())
}

async fn run_react(
    config_path: Option<PathBuf>,
    message_id: &str,
    emoji: &str,
    account: Option<&str>,
) -> anyhow::Result<()> {
    let (config, _) = load(config_path)?;
    let channel = KerneliusChannel::new(Arc::new(config));
    let result = channel.react(message_id, emoji, account).await?;
    println!("{}", serde_json::to_string(&result)?);
    Ok(())
}

fn run_accounts(config_path: Option<PathBuf>, command: AccountsCommand) -> anyhow::Result<()> {
    let (mut config, path) = load(config_path)?;
    match command {
        AccountsCommand::List => {
            for id in list_account_ids(&config) {
                let description = describe_account(&resolve_account(&config, Some(id.as_str())));
                println!("{}", serde_json::to_string(&description)?);
            }
            return Ok(());
        }
        AccountsCommand::Enable { account } => {
            set_account_enabled(&mut config, account.as_deref(), true);
        }
        AccountsCommand::Disable { account } => {
            set_account_enabled(&mut config, account.as_deref(), false);
        }
        AccountsCommand::Delete { account } => {
            delete_account(&mut config, Some(account.as_str()));
        }
    }
    config::save_config(&config, &path)
}

fn run_webhook_path(config_path: Option<PathBuf>, account: Option<&str>) -> anyhow::Result<()> {
    let (config, _) = load(config_path)?;
    println!("{}", resolve_account(&config, account).webhook_path());
    Ok(())
}
