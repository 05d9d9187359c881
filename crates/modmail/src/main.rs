//! `modmail` - command-line mail client.
//!
//! Accounts live in the per-user config file, passwords in the system
//! keyring. Every command opens its own connection and closes it again.

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use clap::{Args, Parser, Subcommand};
use modmail_core::{
    Account, AttachmentPayload, EngineConfig, MailEngine, MessageDetail, MessageSummary,
    SyncScheduler, Timeouts,
};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Environment variable consulted for the account password.
const PASSWORD_ENV: &str = "MODMAIL_PASSWORD";

#[derive(Parser)]
#[command(name = "modmail", version, about = "List, read and send mail from the terminal")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Settings file (defaults to the per-user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Seconds allowed to connect
    #[arg(long, global = true, default_value = "30")]
    connect_timeout: u64,

    /// Seconds allowed per command
    #[arg(long, global = true, default_value = "60")]
    io_timeout: u64,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Command {
    /// List configured accounts
    Accounts,

    /// Add an account, or replace an existing one
    ///
    /// The password is read from MODMAIL_PASSWORD, or from the first line
    /// of standard input.
    Add(AddArgs),

    /// Remove an account and its stored password
    Remove {
        /// Account address
        address: String,
    },

    /// List the newest inbox messages
    Refresh {
        /// Account address
        address: String,
    },

    /// Show one message
    View {
        /// Account address
        address: String,

        /// Sequence number from the latest refresh
        #[arg(long, conflicts_with = "uid", required_unless_present = "uid")]
        id: Option<u32>,

        /// Persistent UID
        #[arg(long)]
        uid: Option<u32>,
    },

    /// Send a message
    Send(SendArgs),

    /// Refresh periodically and print each result
    Watch {
        /// Account address
        address: String,

        /// Seconds between refreshes
        #[arg(long, default_value = "300", value_parser = clap::value_parser!(u64).range(1..))]
        interval: u64,
    },
}

#[derive(Args)]
struct AddArgs {
    /// Account address, also the login name
    address: String,

    /// SMTP server (defaults to the provider's)
    #[arg(long)]
    smtp_server: Option<String>,

    /// SMTP port
    #[arg(long)]
    smtp_port: Option<u16>,

    /// IMAP server (defaults to the provider's)
    #[arg(long)]
    imap_server: Option<String>,

    /// IMAP port
    #[arg(long)]
    imap_port: Option<u16>,
}

#[derive(Args)]
struct SendArgs {
    /// Sending account address
    address: String,

    /// Comma-separated recipients
    #[arg(long)]
    to: String,

    /// Subject line
    #[arg(long, default_value = "")]
    subject: String,

    /// Message text
    #[arg(long, conflicts_with = "body_file")]
    body: Option<String>,

    /// Read the message text from a file
    #[arg(long)]
    body_file: Option<PathBuf>,

    /// Files to attach
    #[arg(long = "attach")]
    attachments: Vec<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "modmail=info,modmail_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => EngineConfig::new(path),
        None => EngineConfig::default(),
    };
    config.timeouts = Timeouts {
        connect: Duration::from_secs(cli.connect_timeout),
        io: Duration::from_secs(cli.io_timeout),
    };
    let engine = MailEngine::new(&config);

    match cli.command {
        Command::Accounts => list_accounts(&engine, cli.json)?,
        Command::Add(args) => add_account(&engine, args).await?,
        Command::Remove { address } => {
            engine.remove_account(&address).await?;
            println!("Removed {address}");
        }
        Command::Refresh { address } => {
            let summaries = engine.refresh(&address).await?;
            print_summaries(&summaries, cli.json)?;
        }
        Command::View { address, id, uid } => {
            let detail = match (uid, id) {
                (Some(uid), _) => engine.view_message_by_uid(&address, uid).await?,
                (None, Some(id)) => engine.view_message(&address, id).await?,
                (None, None) => bail!("either --id or --uid is required"),
            };
            print_detail(&detail, cli.json)?;
        }
        Command::Send(args) => send(&engine, args).await?,
        Command::Watch { address, interval } => {
            watch(engine, address, Duration::from_secs(interval), cli.json).await?;
        }
    }

    Ok(())
}

fn list_accounts(engine: &MailEngine, json: bool) -> anyhow::Result<()> {
    let accounts = engine.list_accounts()?;
    if json {
        let value: serde_json::Map<String, serde_json::Value> = accounts
            .iter()
            .map(|a| -> serde_json::Result<(String, serde_json::Value)> {
                Ok((a.address.clone(), serde_json::to_value(&a.settings)?))
            })
            .collect::<serde_json::Result<_>>()?;
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    if accounts.is_empty() {
        println!("No accounts configured");
    }
    for Account { address, settings } in accounts {
        println!(
            "{address}\n  IMAP {}:{}\n  SMTP {}:{}",
            settings.imap_server, settings.imap_port, settings.smtp_server, settings.smtp_port
        );
    }
    Ok(())
}

async fn add_account(engine: &MailEngine, args: AddArgs) -> anyhow::Result<()> {
    let mut settings = Account::with_provider_defaults(&args.address).settings;
    if let Some(host) = args.smtp_server {
        settings.smtp_server = host;
    }
    if let Some(port) = args.smtp_port {
        settings.smtp_port = port;
    }
    if let Some(host) = args.imap_server {
        settings.imap_server = host;
    }
    if let Some(port) = args.imap_port {
        settings.imap_port = port;
    }

    let secret = read_secret()?;
    engine.add_account(&args.address, settings, &secret).await?;
    println!("Saved {}", args.address.trim());
    Ok(())
}

async fn send(engine: &MailEngine, args: SendArgs) -> anyhow::Result<()> {
    let body = match (args.body, args.body_file) {
        (Some(body), _) => body,
        (None, Some(path)) => std::fs::read_to_string(&path)
            .with_context(|| format!("reading {}", path.display()))?,
        (None, None) => String::new(),
    };

    let mut attachments = Vec::with_capacity(args.attachments.len());
    for path in &args.attachments {
        let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .with_context(|| format!("{} has no file name", path.display()))?;
        attachments.push(AttachmentPayload::new(filename, bytes));
    }

    engine
        .send_message(&args.address, &args.to, &args.subject, &body, attachments)
        .await?;
    println!("Sent");
    Ok(())
}

async fn watch(
    engine: MailEngine,
    address: String,
    interval: Duration,
    json: bool,
) -> anyhow::Result<()> {
    engine.account(&address)?;

    let (handle, mut events) = SyncScheduler::spawn(Arc::new(engine), interval);
    handle.set_active_account(Some(address)).await;
    info!("watching, press Ctrl-C to stop");

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                match event.outcome {
                    Ok(summaries) => {
                        if !json {
                            println!("-- {} ({:?}) --", event.address, event.trigger);
                        }
                        print_summaries(&summaries, json)?;
                    }
                    Err(err) => eprintln!("{}: refresh failed: {err}", event.address),
                }
            }
            result = tokio::signal::ctrl_c() => {
                result.context("waiting for Ctrl-C")?;
                break;
            }
        }
    }

    handle.shutdown().await;
    Ok(())
}

/// Reads the password from the environment or the first line of stdin.
fn read_secret() -> anyhow::Result<String> {
    if let Ok(secret) = std::env::var(PASSWORD_ENV) {
        return Ok(secret);
    }

    eprintln!("Password (one line on stdin):");
    let mut line = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .context("reading password from stdin")?;
    let secret = line.trim_end_matches(['\r', '\n']).to_string();
    if secret.is_empty() {
        bail!("no password given; set {PASSWORD_ENV} or pipe it on stdin");
    }
    Ok(secret)
}

fn print_summaries(summaries: &[MessageSummary], json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(summaries)?);
        return Ok(());
    }

    if summaries.is_empty() {
        println!("Inbox is empty");
    }
    for summary in summaries {
        let date = summary
            .date
            .map(|d| d.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_default();
        let marker = if summary.read { ' ' } else { '*' };
        println!(
            "{marker} {:>5}  {date:<16}  {:<30}  {}",
            summary.id,
            truncate(&summary.from, 30),
            summary.subject
        );
    }
    Ok(())
}

fn print_detail(detail: &MessageDetail, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(detail)?);
        return Ok(());
    }

    for name in ["from", "to", "cc", "date", "subject"] {
        if let Some(value) = detail.headers.get(name) {
            println!("{name}: {value}");
        }
    }
    println!();
    println!("{}", detail.body);
    if !detail.attachment_filenames.is_empty() {
        println!();
        println!("Attachments:");
        for name in &detail.attachment_filenames {
            println!("  {name}");
        }
    }
    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
        out.push('…');
        out
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;

    #[test]
    fn test_watch_rejects_zero_interval() {
        let result = Cli::try_parse_from(["modmail", "watch", "a@example.com", "--interval", "0"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_watch_interval_default() {
        let cli = Cli::try_parse_from(["modmail", "watch", "a@example.com"]).unwrap();
        assert!(matches!(cli.command, Command::Watch { interval: 300, .. }));
    }
}
