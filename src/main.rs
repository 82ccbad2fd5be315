mod analysis;
mod archive;
mod config;
mod error;
mod extract;
mod quarters;
mod server;
mod timeline;

use std::time::Instant;

use anyhow::Context;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

use crate::analysis::AnthropicClient;
use crate::archive::WaybackClient;
use crate::config::Config;

#[derive(Parser)]
#[command(
    name = "wayback_timeline",
    about = "Quarter-by-quarter business timeline from Wayback Machine snapshots"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API and static UI (default)
    Serve {
        /// Interface to bind
        #[arg(long)]
        host: Option<String>,
        /// Port to listen on (overrides PORT)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Build the full timeline for one domain and print it as JSON
    Analyze {
        domain: String,
    },
    /// List the snapshot chosen for each quarter, without fetching pages
    Quarters {
        domain: String,
    },
    /// Send one short request to verify the API key works
    CheckKey,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let mut config = Config::from_env()?;

    let result = match cli.command.unwrap_or(Commands::Serve { host: None, port: None }) {
        Commands::Serve { host, port } => {
            if let Some(host) = host {
                config.host = host;
            }
            if let Some(port) = port {
                config.port = port;
            }
            server::serve(&config).await
        }
        Commands::Analyze { domain } => {
            let client = WaybackClient::new(&config.archive)?;
            let analyzer = AnthropicClient::new(&config.anthropic);
            if !config.api_key_configured() {
                eprintln!("ANTHROPIC_API_KEY not set; analyses will be placeholders.");
            }

            let pb = ProgressBar::new(0);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("[{elapsed_precise}] {bar:40} {pos}/{len} {msg}")?
                    .progress_chars("=> "),
            );

            let timeline = timeline::build_timeline(&client, &analyzer, &domain, &pb).await;
            pb.finish_and_clear();

            let timeline = timeline?;
            println!("{}", serde_json::to_string_pretty(&timeline)?);
            println!(
                "{} of {} quarters analyzed.",
                timeline.timeline.len(),
                timeline.total_quarters
            );
            Ok(())
        }
        Commands::Quarters { domain } => {
            let client = WaybackClient::new(&config.archive)?;
            let domain = archive::normalize_domain(&domain);
            let snapshots = archive::collect_snapshots(&client, &domain).await;
            if snapshots.is_empty() {
                println!("No snapshots found for {}.", domain);
                return Ok(());
            }

            let unique = quarters::dedup_by_timestamp(snapshots);
            let quarterly = quarters::bucket_by_quarter(&unique);

            println!("{:<8} | {:<14} | {:<10} | {}", "Quarter", "Timestamp", "Date", "URL");
            println!("{}", "-".repeat(72));
            for (quarter, s) in &quarterly {
                println!(
                    "{:<8} | {:<14} | {:<10} | {}",
                    quarter,
                    s.timestamp,
                    s.date,
                    truncate(&s.url, 40)
                );
            }
            println!(
                "\n{} unique snapshots in {} quarters",
                unique.len(),
                quarterly.len()
            );
            Ok(())
        }
        Commands::CheckKey => {
            let client = AnthropicClient::new(&config.anthropic);
            let reply = client
                .complete("Say 'Hello, I'm working!' in exactly those words.", 100)
                .await
                .context("API check failed")?;
            println!("Model: {}", config.anthropic.model);
            println!("Response: {}", reply.trim());
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        eprintln!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max).collect();
        format!("{}...", truncated)
    }
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn durations_render_by_magnitude() {
        assert_eq!(format_duration(Duration::from_millis(2500)), "2.5s");
        assert_eq!(format_duration(Duration::from_secs(125)), "2m 5s");
        assert_eq!(format_duration(Duration::from_secs(3725)), "1h 2m 5s");
    }

    #[test]
    fn truncate_adds_ellipsis() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdefghij", 4), "abcd...");
    }

    #[test]
    fn cli_defaults_to_serve() {
        let cli = Cli::try_parse_from(["wayback_timeline"]).unwrap();
        assert!(cli.command.is_none());
        let cli = Cli::try_parse_from(["wayback_timeline", "serve", "--port", "8081"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::Serve { port: Some(8081), .. })));
    }
}
