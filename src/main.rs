use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use tg_sweeper::config;
use tg_sweeper::db::{self, JobStore};
use tg_sweeper::model::JobStats;

#[derive(Debug, Parser)]
#[command(author, version, about = "Inspect batch cleanup job history")]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List the most recent jobs, newest first
    Jobs {
        /// Maximum number of jobs to print (defaults to the retention count)
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Print one job with its per-item results
    Job {
        /// Job id as returned by execute
        id: String,
    },
    /// Print counters over the recent job window
    Stats,
    /// Print an example config file
    ExampleConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    match args.command {
        Command::ExampleConfig => print!("{}", config::example()),
        Command::Jobs { limit } => {
            let store = open_store(&args.config).await?;
            let limit = limit.unwrap_or_else(|| store.retention());
            let jobs = store.list_recent(limit).await?;
            info!(count = jobs.len(), "loaded recent jobs");
            print_json(&jobs)?;
        }
        Command::Job { id } => {
            let store = open_store(&args.config).await?;
            let job = store
                .get_by_id(&id)
                .await?
                .ok_or_else(|| anyhow!("job {} does not exist", id))?;
            print_json(&job)?;
        }
        Command::Stats => {
            let store = open_store(&args.config).await?;
            let jobs = store.list_recent(store.retention()).await?;
            print_json(&JobStats::from_jobs(&jobs))?;
        }
    }
    Ok(())
}

async fn open_store(config_path: &Path) -> Result<Arc<dyn JobStore>> {
    let cfg = config::load(Some(config_path))?;
    cfg.ensure_dirs()?;
    db::open_job_store(&cfg).await
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_store_commands() {
        let args = Args::try_parse_from(["tg-sweeper", "jobs", "--limit", "3"]).unwrap();
        assert!(matches!(args.command, Command::Jobs { limit: Some(3) }));
        assert_eq!(args.config, PathBuf::from("config.yaml"));

        let args =
            Args::try_parse_from(["tg-sweeper", "--config", "alt.yaml", "job", "abc"]).unwrap();
        assert!(matches!(args.command, Command::Job { ref id } if id == "abc"));
        assert_eq!(args.config, PathBuf::from("alt.yaml"));
    }

    #[test]
    fn example_config_needs_no_config_file() {
        let args = Args::try_parse_from([
            "tg-sweeper",
            "--config",
            "/nonexistent/config.yaml",
            "example-config",
        ])
        .unwrap();
        assert!(matches!(args.command, Command::ExampleConfig));
        assert!(config::load(Some(&args.config)).is_err());
        let cfg: config::Config = serde_yaml::from_str(config::example()).unwrap();
        config::validate(&cfg).unwrap();
    }

    #[test]
    fn job_requires_an_id() {
        assert!(Args::try_parse_from(["tg-sweeper", "job"]).is_err());
    }
}
