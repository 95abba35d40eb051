//! Command-line interface

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::cache::EntityCache;
use crate::client::HubSpotClient;
use crate::config::{self, Config};
use crate::error::{HubSpotError, Result};
use crate::export;
use crate::ingest::{EmailIngestor, IngestOptions, IngestStats};
use crate::models::{ContactInfo, ENGAGEMENT_KINDS};
use crate::rate_limiter::SlidingWindowLimiter;
use crate::summarizer::{self, OpenAiSummarizer, Summarizer, SummaryStats};

#[derive(Parser, Debug)]
#[command(name = "hubspot-archiver")]
#[command(version = "0.3.1")]
#[command(about = "Archive HubSpot contacts, engagements, and email bodies", long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: PathBuf,

    /// Verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the harvest: contacts, engagements, then email bodies
    Run {
        /// Rewrite email files that already exist on disk
        #[arg(long)]
        force: bool,

        /// Directory for archived email bodies (overrides the config value)
        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// Skip the contact download phase
        #[arg(long)]
        skip_contacts: bool,

        /// Skip the engagement download phases
        #[arg(long)]
        skip_engagements: bool,

        /// Skip the email body download phase
        #[arg(long)]
        skip_emails: bool,

        /// Write a JSON summary next to each archived email
        #[arg(long)]
        summarize: bool,
    },

    /// Summarize already-archived emails without touching the API
    Summarize {
        /// Directory holding archived email bodies (overrides the config value)
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },

    /// Generate an example configuration file
    InitConfig {
        /// Output path for the config file
        #[arg(short, long, default_value = "config.toml")]
        output: PathBuf,

        /// Overwrite existing file
        #[arg(long)]
        force: bool,
    },
}

/// Progress reporting helper
pub struct ProgressReporter {
    multi: MultiProgress,
    spinner_style: ProgressStyle,
    bar_style: ProgressStyle,
}

impl ProgressReporter {
    pub fn new() -> Self {
        Self::with_multi_progress(MultiProgress::new())
    }

    /// Create a reporter that draws through an existing MultiProgress,
    /// so log lines and bars share one terminal region
    pub fn with_multi_progress(multi: MultiProgress) -> Self {
        let spinner_style = ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed:>6}] {msg}")
            .unwrap()
            .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ");

        let bar_style = ProgressStyle::default_bar()
            .template("[{elapsed:>6}] {bar:40.cyan/blue} {pos:>7}/{len:7} {msg}")
            .unwrap()
            .progress_chars("##-");

        Self {
            multi,
            spinner_style,
            bar_style,
        }
    }

    pub fn multi_progress(&self) -> &MultiProgress {
        &self.multi
    }

    /// Add a spinner for indeterminate operations
    pub fn add_spinner(&self, msg: &str) -> ProgressBar {
        let spinner = self.multi.add(ProgressBar::new_spinner());
        spinner.set_style(self.spinner_style.clone());
        spinner.set_message(msg.to_string());
        spinner.enable_steady_tick(std::time::Duration::from_millis(100));
        spinner
    }

    /// Add a progress bar for operations with known totals
    pub fn add_progress_bar(&self, len: u64, msg: &str) -> ProgressBar {
        let bar = self.multi.add(ProgressBar::new(len));
        bar.set_style(self.bar_style.clone());
        bar.set_message(msg.to_string());
        bar
    }

    /// Finish a spinner with a completion message
    pub fn finish_spinner(&self, spinner: &ProgressBar, msg: &str) {
        spinner.finish_and_clear();
        let _ = self.multi.println(format!("  ✓ {}", msg));
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

/// Flags for the `run` subcommand
#[derive(Debug, Clone, Default)]
pub struct RunFlags {
    pub force: bool,
    pub output_dir: Option<PathBuf>,
    pub skip_contacts: bool,
    pub skip_engagements: bool,
    pub skip_emails: bool,
    pub summarize: bool,
}

/// Outcome of one pipeline run
#[derive(Debug)]
pub struct RunReport {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_seconds: i64,
    /// Contacts downloaded, None when the phase was skipped
    pub contacts_downloaded: Option<usize>,
    /// Records downloaded per engagement kind
    pub engagements_downloaded: Vec<(String, usize)>,
    /// Ingestion tallies, None when the phase was skipped
    pub ingest: Option<IngestStats>,
    pub export_dir: PathBuf,
    pub output_dir: PathBuf,
    /// API requests admitted through the rate limiter
    pub requests_admitted: u64,
    /// Total time spent blocked on the rate limiter
    pub rate_limited_for: std::time::Duration,
}

/// Run the complete harvest pipeline
///
/// Phases run in order: contacts to CSV, each engagement kind to CSV, then
/// email bodies onto disk. The ingestion phase always reloads the contact
/// and email CSVs from the export directory, so earlier phases can be
/// skipped and the run still picks up the last harvest.
pub async fn run_pipeline(
    cli: &Cli,
    flags: RunFlags,
    multi_progress: MultiProgress,
) -> Result<RunReport> {
    let reporter = ProgressReporter::with_multi_progress(multi_progress);
    let run_id = Uuid::new_v4().to_string();
    let started_at = Utc::now();

    // Phase 0: Configuration and client setup
    let config_spinner = reporter.add_spinner("Loading configuration...");
    let mut config = Config::load(&cli.config).await?;
    if let Some(dir) = &flags.output_dir {
        config.emails.output_dir = dir.clone();
    }
    reporter.finish_spinner(
        &config_spinner,
        &format!("Configuration loaded from {:?}", cli.config),
    );

    let token = config::api_token_from_env()?;
    let limiter = SlidingWindowLimiter::with_config(
        config.rate_limit.max_requests,
        config.rate_limit.window(),
    );
    let client = HubSpotClient::new(token, &config.api, limiter)?;

    info!("Starting run {}", run_id);
    info!(
        "Holding to {} requests per {}s window",
        config.rate_limit.max_requests, config.rate_limit.window_secs
    );

    tokio::fs::create_dir_all(&config.export.dir).await?;

    // Phase 1: Contacts
    let contacts_downloaded = if flags.skip_contacts {
        info!("Skipping contact download");
        None
    } else {
        let spinner = reporter.add_spinner("Downloading contacts...");
        let records = client.contacts().await?;
        export::write_records(&export::csv_path(&config.export.dir, "contacts"), &records)?;
        reporter.finish_spinner(&spinner, &format!("Downloaded {} contacts", records.len()));
        Some(records.len())
    };

    // Phase 2: Engagements, one CSV per kind
    let mut engagements_downloaded = Vec::new();
    if flags.skip_engagements {
        info!("Skipping engagement download");
    } else {
        for kind in ENGAGEMENT_KINDS {
            let spinner = reporter.add_spinner(&format!("Downloading {}...", kind));
            let records = client.engagements(kind).await?;
            export::write_records(&export::csv_path(&config.export.dir, kind), &records)?;
            reporter.finish_spinner(&spinner, &format!("Downloaded {} {}", records.len(), kind));
            engagements_downloaded.push((kind.to_string(), records.len()));
        }
    }

    // Phase 3: Email bodies
    let ingest = if flags.skip_emails {
        info!("Skipping email body download");
        None
    } else {
        let contacts_path = export::csv_path(&config.export.dir, "contacts");
        let emails_path = export::csv_path(&config.export.dir, "emails");

        let load_spinner = reporter.add_spinner("Loading harvested contacts and emails...");
        let contact_records = export::read_records(&contacts_path).map_err(|e| {
            HubSpotError::ConfigError(format!(
                "Cannot load {:?}: {} (run without --skip-contacts first)",
                contacts_path, e
            ))
        })?;
        let email_records = export::read_records(&emails_path).map_err(|e| {
            HubSpotError::ConfigError(format!(
                "Cannot load {:?}: {} (run without --skip-engagements first)",
                emails_path, e
            ))
        })?;
        let contacts: Vec<ContactInfo> = contact_records
            .iter()
            .map(ContactInfo::from_record)
            .collect();
        reporter.finish_spinner(
            &load_spinner,
            &format!(
                "Loaded {} contacts and {} email records",
                contacts.len(),
                email_records.len()
            ),
        );

        let cache = EntityCache::on_disk(&config.cache.dir);
        let summarizer = build_summarizer(flags.summarize, &config);
        let options = IngestOptions {
            output_dir: config.emails.output_dir.clone(),
            force: flags.force,
            summarize: flags.summarize,
        };

        let company_spinner = reporter.add_spinner("Resolving companies...");
        let ingestor = EmailIngestor::prepare(
            &client,
            &cache,
            contacts,
            config.emails.override_domain.clone(),
            options,
            summarizer,
        )
        .await;
        reporter.finish_spinner(&company_spinner, "Companies resolved");

        let bar =
            reporter.add_progress_bar(email_records.len() as u64, "Downloading email bodies...");
        let stats = ingestor.run(&email_records, &bar).await;
        bar.finish_with_message(format!(
            "{} written, {} skipped, {} failed",
            stats.written,
            stats.skipped(),
            stats.failed
        ));
        Some(stats)
    };

    let window = client.limiter().stats().await;
    let completed_at = Utc::now();
    let duration_seconds = (completed_at - started_at).num_seconds();
    info!("Run {} completed in {}s", run_id, duration_seconds);

    Ok(RunReport {
        run_id,
        started_at,
        completed_at,
        duration_seconds,
        contacts_downloaded,
        engagements_downloaded,
        ingest,
        export_dir: config.export.dir.clone(),
        output_dir: config.emails.output_dir.clone(),
        requests_admitted: window.total_admitted,
        rate_limited_for: window.total_waited,
    })
}

/// Build the optional summarizer for ingestion-time summaries
///
/// A missing key downgrades to no summarizer; each skipped summary is
/// then logged by the ingestor rather than failing the run.
fn build_summarizer(enabled: bool, config: &Config) -> Option<Arc<dyn Summarizer>> {
    if !enabled {
        return None;
    }
    match config::openai_key_from_env() {
        Some(key) => Some(Arc::new(OpenAiSummarizer::new(key, &config.summarizer))),
        None => {
            warn!(
                "{} is not set; emails will be archived without summaries",
                config::OPENAI_KEY_ENV
            );
            None
        }
    }
}

/// Run the standalone summarization sweep over archived emails
pub async fn run_summarize(cli: &Cli, output_dir: Option<PathBuf>) -> Result<SummaryStats> {
    let config = Config::load(&cli.config).await?;
    let directory = output_dir.unwrap_or_else(|| config.emails.output_dir.clone());

    let key = config::openai_key_from_env().ok_or_else(|| {
        HubSpotError::ConfigError(format!(
            "{} is not set; export an OpenAI key to generate summaries",
            config::OPENAI_KEY_ENV
        ))
    })?;
    let summarizer = OpenAiSummarizer::new(key, &config.summarizer);

    info!("Summarizing archived emails under {:?}", directory);
    summarizer::process_directory(&summarizer, &directory).await
}

/// Write an example configuration file
pub async fn run_init_config(output: &Path, force: bool) -> Result<()> {
    if output.exists() && !force {
        return Err(HubSpotError::ConfigError(format!(
            "Configuration file already exists at {:?}. Use --force to overwrite.",
            output
        )));
    }
    Config::create_example(output).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use tempfile::tempdir;

    #[test]
    fn test_cli_structure_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_run_flags_parse() {
        let cli = Cli::parse_from([
            "hubspot-archiver",
            "--verbose",
            "run",
            "--force",
            "--skip-contacts",
            "--summarize",
        ]);

        assert!(cli.verbose);
        assert_eq!(cli.config, PathBuf::from("config.toml"));
        match cli.command {
            Commands::Run {
                force,
                output_dir,
                skip_contacts,
                skip_engagements,
                skip_emails,
                summarize,
            } => {
                assert!(force);
                assert!(output_dir.is_none());
                assert!(skip_contacts);
                assert!(!skip_engagements);
                assert!(!skip_emails);
                assert!(summarize);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_output_dir_override_parses() {
        let cli = Cli::parse_from(["hubspot-archiver", "run", "--output-dir", "/tmp/archive"]);

        match cli.command {
            Commands::Run { output_dir, .. } => {
                assert_eq!(output_dir, Some(PathBuf::from("/tmp/archive")));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_summarize_command_parses() {
        let cli = Cli::parse_from(["hubspot-archiver", "summarize"]);
        match cli.command {
            Commands::Summarize { output_dir } => assert!(output_dir.is_none()),
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_init_config_writes_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");

        run_init_config(&path, false).await.unwrap();
        assert!(path.exists());

        let config = Config::load(&path).await.unwrap();
        assert_eq!(config.rate_limit.max_requests, 110);
    }

    #[tokio::test]
    async fn test_init_config_refuses_overwrite() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        tokio::fs::write(&path, "# existing").await.unwrap();

        let result = run_init_config(&path, false).await;
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("already exists"));

        // Untouched without --force
        let content = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(content, "# existing");
    }

    #[tokio::test]
    async fn test_init_config_force_overwrites() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        tokio::fs::write(&path, "# existing").await.unwrap();

        run_init_config(&path, true).await.unwrap();

        let config = Config::load(&path).await.unwrap();
        assert_eq!(config.api.base_url, "https://api.hubapi.com");
    }

    #[test]
    fn test_progress_reporter_creates_bars() {
        let reporter = ProgressReporter::new();
        let bar = reporter.add_progress_bar(10, "testing");
        assert_eq!(bar.length(), Some(10));
        bar.finish_and_clear();
    }
}
