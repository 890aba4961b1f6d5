//! mordu command line client
//!
//! Asks for readings through the server and keeps working offline: anything
//! the server cannot take right now is queued locally and uploaded later.

use anyhow::{Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use mordu::client::{default_data_dir, Client, EntrySource, QueueFlusher};
use mordu::models::{Sex, Subject, Topic};
use mordu::SyncConfig;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(name = "mordu", version, about = "Ask the oracle, online or offline")]
struct Cli {
    /// Server root URL
    #[arg(long, env = "MORDU_SERVER", default_value = "http://localhost:3001")]
    server: String,

    /// Directory for the offline queue and history cache
    #[arg(long, env = "MORDU_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Print JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Clone, Debug)]
enum Command {
    /// Ask for a reading
    Ask {
        #[arg(long)]
        name: String,
        /// Birth date as dd/mm/yyyy
        #[arg(long)]
        birthdate: String,
        #[arg(long, value_parser = parse_sex)]
        sex: Sex,
        #[arg(long, value_parser = parse_topic, default_value = "overall")]
        topic: Topic,
        question: String,
    },
    /// Show reconciled history: server, queued and cached entries
    History,
    /// Upload queued readings once
    Flush,
    /// Keep uploading queued readings until interrupted
    Watch,
    /// Server reachability and queue size
    Status,
}

fn parse_lowercase<T: serde::de::DeserializeOwned>(s: &str) -> Result<T, String> {
    serde_json::from_value(serde_json::Value::String(s.to_lowercase()))
        .map_err(|_| format!("unknown value '{}'", s))
}

fn parse_sex(s: &str) -> Result<Sex, String> {
    parse_lowercase(s)
}

fn parse_topic(s: &str) -> Result<Topic, String> {
    parse_lowercase(s)
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mordu=warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let data_dir = cli.data_dir.clone().unwrap_or_else(default_data_dir);
    let client = Client::open(&cli.server, &data_dir)
        .await
        .with_context(|| format!("Failed to open client data in {}", data_dir.display()))?;

    match cli.command {
        Command::Ask {
            name,
            birthdate,
            sex,
            topic,
            question,
        } => {
            let subject = Subject {
                name,
                birthdate,
                sex,
                topic,
            };
            subject.validate()?;
            let outcome = client.submit(subject, &question).await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
            } else {
                println!("{}", outcome.prediction);
                if let Some(notice) = &outcome.notice {
                    eprintln!("({})", notice);
                }
            }
        }
        Command::History => {
            let view = client.history().await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&view)?);
            } else {
                for entry in &view {
                    let marker = match entry.source {
                        EntrySource::Pending => "[Local] ",
                        _ => "",
                    };
                    println!(
                        "{}{} {}  {}",
                        marker,
                        entry.title(),
                        entry.last_activity.with_timezone(&Local).format("%d/%m/%Y %H:%M"),
                        entry.id
                    );
                }
            }
        }
        Command::Flush => {
            let report = client.flush_once().await?;
            if !report.reachable {
                println!("Server not reachable; {} queued", client.queue().len().await);
            } else {
                for (pending, server) in &report.created {
                    println!("{} -> {}", pending, server);
                }
                for pending in &report.rejected {
                    println!("{} rejected by the server, removed", pending);
                }
                println!("{} uploaded, {} still queued", report.created.len(), report.failed);
            }
        }
        Command::Watch => {
            let config = SyncConfig::default();
            let client = Arc::new(client);
            let flusher = QueueFlusher::start(client, config.initial_delay(), config.interval());
            info!("Watching offline queue; press ctrl-c to stop");
            tokio::signal::ctrl_c().await?;
            flusher.shutdown().await;
        }
        Command::Status => {
            let reachable = client.api().health().await.unwrap_or(false);
            let queued = client.queue().len().await;
            if cli.json {
                println!(
                    "{}",
                    serde_json::json!({
                        "server": client.api().base_url(),
                        "reachable": reachable,
                        "queued": queued,
                        "active": client.cache().active().await,
                    })
                );
            } else {
                println!(
                    "{} is {}",
                    client.api().base_url(),
                    if reachable { "reachable" } else { "unreachable" }
                );
                println!("{} reading(s) queued", queued);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_enums() {
        assert_eq!(parse_sex("Female").unwrap(), Sex::Female);
        assert_eq!(parse_topic("LOVE").unwrap(), Topic::Love);
        assert!(parse_topic("weather").is_err());
    }

    #[test]
    fn test_cli_parses_ask() {
        let cli = Cli::try_parse_from([
            "mordu",
            "ask",
            "--name",
            "Ploy",
            "--birthdate",
            "03/04/1995",
            "--sex",
            "female",
            "will it rain?",
        ])
        .unwrap();
        match cli.command {
            Command::Ask { topic, question, .. } => {
                assert_eq!(topic, Topic::Overall);
                assert_eq!(question, "will it rain?");
            }
            _ => panic!("expected ask"),
        }
    }
}
