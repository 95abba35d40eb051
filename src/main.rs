use anyhow::Result;
use clap::Parser;
use hubspot_archiver::cli::{self, Cli, Commands};
use hubspot_archiver::config;
use hubspot_archiver::error::HubSpotError;
use indicatif::MultiProgress;
use std::io::Write;
use std::process;
use std::sync::Arc;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

/// A writer that prints through MultiProgress to avoid progress bar conflicts
#[derive(Clone)]
struct MultiProgressWriter {
    multi: Arc<MultiProgress>,
    buffer: Arc<std::sync::Mutex<Vec<u8>>>,
}

impl MultiProgressWriter {
    fn new(multi: Arc<MultiProgress>) -> Self {
        Self {
            multi,
            buffer: Arc::new(std::sync::Mutex::new(Vec::new())),
        }
    }
}

impl Write for MultiProgressWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut buffer = self.buffer.lock().unwrap();
        buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        let mut buffer = self.buffer.lock().unwrap();
        if !buffer.is_empty() {
            let msg = String::from_utf8_lossy(&buffer);
            // Remove trailing newline for cleaner output
            let msg = msg.trim_end_matches('\n');
            if !msg.is_empty() {
                let _ = self.multi.println(msg);
            }
            buffer.clear();
        }
        Ok(())
    }
}

impl Drop for MultiProgressWriter {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}

/// MakeWriter implementation for tracing
#[derive(Clone)]
struct MultiProgressMakeWriter {
    multi: Arc<MultiProgress>,
}

impl MultiProgressMakeWriter {
    fn new(multi: Arc<MultiProgress>) -> Self {
        Self { multi }
    }
}

impl<'a> MakeWriter<'a> for MultiProgressMakeWriter {
    type Writer = MultiProgressWriter;

    fn make_writer(&'a self) -> Self::Writer {
        MultiProgressWriter::new(Arc::clone(&self.multi))
    }
}

#[tokio::main]
async fn main() {
    // Exit with proper code on error
    if let Err(e) = run().await {
        display_error(&e);
        process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Initialize tracing with level based on verbose flag
    let filter = if cli.verbose {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("hubspot_archiver=debug,info"))
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("hubspot_archiver=info,warn,error"))
    };

    // Create shared MultiProgress for coordinated progress bar + logging
    let multi_progress = Arc::new(MultiProgress::new());
    let make_writer = MultiProgressMakeWriter::new(Arc::clone(&multi_progress));

    // Set up tracing with MultiProgress writer - logs will print above progress bars
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(make_writer)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    tracing::info!("HubSpot archiver starting...");

    // Execute command
    match &cli.command {
        Commands::Run {
            force,
            output_dir,
            skip_contacts,
            skip_engagements,
            skip_emails,
            summarize,
        } => {
            tracing::info!("Starting harvest run");
            let flags = cli::RunFlags {
                force: *force,
                output_dir: output_dir.clone(),
                skip_contacts: *skip_contacts,
                skip_engagements: *skip_engagements,
                skip_emails: *skip_emails,
                summarize: *summarize,
            };

            // Run the complete pipeline (clone the inner MultiProgress, not the Arc)
            let report = cli::run_pipeline(&cli, flags, (*multi_progress).clone()).await?;

            // Display summary
            println!("\n========================================");
            println!("Harvest Run Summary");
            println!("========================================");
            println!("Run ID: {}", report.run_id);
            println!("Duration: {} seconds", report.duration_seconds);
            if let Some(contacts) = report.contacts_downloaded {
                println!("Contacts downloaded: {}", contacts);
            }
            for (kind, count) in &report.engagements_downloaded {
                println!("Engagements ({}): {}", kind, count);
            }
            if let Some(stats) = &report.ingest {
                println!("Emails written: {}", stats.written);
                println!("Emails skipped: {}", stats.skipped());
                println!("Emails failed: {}", stats.failed);
                println!("Email archive: {:?}", report.output_dir);
            }
            println!("CSV exports: {:?}", report.export_dir);
            println!(
                "API requests: {} ({:.1}s spent rate limited)",
                report.requests_admitted,
                report.rate_limited_for.as_secs_f64()
            );
            println!("========================================");

            Ok(())
        }

        Commands::Summarize { output_dir } => {
            tracing::info!("Starting summarization sweep");
            let stats = cli::run_summarize(&cli, output_dir.clone()).await?;

            println!("\n========================================");
            println!("Summarization Summary");
            println!("========================================");
            println!("Emails found: {}", stats.total);
            println!("Summaries written: {}", stats.processed);
            println!("Already summarized: {}", stats.skipped);
            println!("Errors: {}", stats.errors);
            println!("========================================");

            Ok(())
        }

        Commands::InitConfig { output, force } => {
            tracing::info!("Generating example configuration file");
            cli::run_init_config(output, *force).await?;

            println!("Created example configuration file at: {:?}", output);
            println!("\nPlease edit this file to customize your settings.");
            println!("Key settings to review:");
            println!("  - rate_limit.max_requests: API requests allowed per window");
            println!("  - emails.output_dir: where archived email bodies land");
            println!("  - emails.override_domain: sender domain filed under the recipient instead");
            println!("\nSet {} in the environment before running.", config::API_KEY_ENV);

            Ok(())
        }
    }
}

/// Display error with context
fn display_error(error: &anyhow::Error) {
    eprintln!("Error: {}", error);

    // Display error chain
    let mut cause = error.source();
    while let Some(e) = cause {
        eprintln!("  Caused by: {}", e);
        cause = e.source();
    }

    // Display helpful hints based on error type
    if let Some(hubspot_err) = error.downcast_ref::<HubSpotError>() {
        match hubspot_err {
            HubSpotError::ConfigError(_) => {
                eprintln!("\nHint: check your configuration file and environment.");
                eprintln!("      Run: hubspot-archiver init-config --force");
            }
            HubSpotError::HttpError { status: 401, .. } => {
                eprintln!("\nHint: the API rejected the credential.");
                eprintln!(
                    "      Check that {} holds a valid private app token.",
                    config::API_KEY_ENV
                );
            }
            HubSpotError::RateLimitExceeded { .. } => {
                eprintln!("\nHint: the API rate limit held through every retry.");
                eprintln!("      Lower rate_limit.max_requests in the config and try again.");
            }
            HubSpotError::NetworkError(_) => {
                eprintln!("\nHint: this may be a temporary network problem.");
                eprintln!("      Try running the command again.");
            }
            _ => {}
        }
    }

    eprintln!("\nFor help, run: hubspot-archiver --help");
}
