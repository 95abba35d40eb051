//! Email body ingestion
//!
//! Walks the harvested email records, resolves each one to a contact and
//! company, fetches the full body, and writes it under the output tree.
//! Every record reaches exactly one terminal outcome; per-record failures
//! are logged and tallied without aborting the batch.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use indicatif::ProgressBar;
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info, warn};

use crate::cache::EntityCache;
use crate::client::HubSpotClient;
use crate::error::Result;
use crate::ids;
use crate::models::{ContactInfo, EntityKind, EntityRecord};
use crate::placement;
use crate::summarizer::{self, Summarizer};

const SEPARATOR_WIDTH: usize = 50;
const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Terminal state of one email record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Body written to disk
    Written,
    /// Target file already present and force-overwrite off
    SkippedExisting,
    /// The fetched record carries no text body
    SkippedNoContent,
    /// Invalid id, unusable content response, or a per-record error
    Failed,
}

/// Running tallies for one ingestion batch
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IngestStats {
    pub total: usize,
    pub written: usize,
    pub skipped_existing: usize,
    pub skipped_no_content: usize,
    pub failed: usize,
}

impl IngestStats {
    fn record(&mut self, outcome: IngestOutcome) {
        self.total += 1;
        match outcome {
            IngestOutcome::Written => self.written += 1,
            IngestOutcome::SkippedExisting => self.skipped_existing += 1,
            IngestOutcome::SkippedNoContent => self.skipped_no_content += 1,
            IngestOutcome::Failed => self.failed += 1,
        }
    }

    pub fn skipped(&self) -> usize {
        self.skipped_existing + self.skipped_no_content
    }
}

/// Knobs for one ingestion run
#[derive(Debug, Clone)]
pub struct IngestOptions {
    pub output_dir: PathBuf,
    pub force: bool,
    pub summarize: bool,
}

/// Drives harvested email records to their terminal outcome
pub struct EmailIngestor<'a> {
    client: &'a HubSpotClient,
    contacts: Vec<ContactInfo>,
    companies: HashMap<String, EntityRecord>,
    override_domain: String,
    options: IngestOptions,
    summarizer: Option<Arc<dyn Summarizer>>,
}

impl<'a> EmailIngestor<'a> {
    /// Build an ingestor, resolving each contact's company through the cache
    pub async fn prepare(
        client: &'a HubSpotClient,
        cache: &EntityCache,
        contacts: Vec<ContactInfo>,
        override_domain: impl Into<String>,
        options: IngestOptions,
        summarizer: Option<Arc<dyn Summarizer>>,
    ) -> Self {
        let companies = preload_companies(client, cache, &contacts).await;
        Self {
            client,
            contacts,
            companies,
            override_domain: override_domain.into(),
            options,
            summarizer,
        }
    }

    /// Process every record, returning the final tallies
    pub async fn run(&self, emails: &[EntityRecord], progress: &ProgressBar) -> IngestStats {
        let total = emails.len();
        info!(
            "Starting ingestion of {} email bodies into {:?}",
            total, self.options.output_dir
        );

        let mut stats = IngestStats::default();
        for (index, record) in emails.iter().enumerate() {
            if index % 10 == 0 {
                info!("Processing email {} of {}", index + 1, total);
            }

            let outcome = match self.ingest_one(record).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!("Error processing email record {}: {}", index + 1, e);
                    IngestOutcome::Failed
                }
            };
            stats.record(outcome);
            progress.inc(1);

            if (index + 1) % 20 == 0 || (index + 1) == total {
                info!(
                    "Progress {}/{}: {} written, {} skipped, {} failed",
                    index + 1,
                    total,
                    stats.written,
                    stats.skipped(),
                    stats.failed
                );
            }
        }

        info!("Email ingestion completed:");
        info!("- Total email records: {}", stats.total);
        info!("- New emails written: {}", stats.written);
        info!("- Existing emails skipped: {}", stats.skipped_existing);
        info!("- Emails without text content: {}", stats.skipped_no_content);
        info!("- Emails with errors: {}", stats.failed);
        stats
    }

    /// Take one record through resolve, fetch, and write
    async fn ingest_one(&self, record: &EntityRecord) -> Result<IngestOutcome> {
        // Reloaded CSV rows carry the id in properties.hs_object_id; fresh
        // API records carry it at the top level
        let raw_id = record
            .prop("hs_object_id")
            .cloned()
            .or_else(|| record.id.clone().map(Value::String))
            .unwrap_or(Value::Null);

        let email_id = match ids::normalize(&raw_id) {
            Ok(id) => id,
            Err(_) => {
                debug!("Skipping email with invalid id: {:?}", raw_id);
                return Ok(IngestOutcome::Failed);
            }
        };

        let contact = self.resolve_contact(record);
        let company = self.resolve_company(&contact);

        let content = self.client.email_content(&email_id).await?;
        if content.is_empty() {
            warn!("No content returned for email {}", email_id);
            return Ok(IngestOutcome::Failed);
        }

        let target = placement::resolve_placement(
            &content,
            &email_id,
            &contact,
            &company,
            &self.override_domain,
        )
        .full_path(&self.options.output_dir);

        if target.exists() && !self.options.force {
            debug!("Email {} already exists at {:?}, skipping", email_id, target);
            if self.options.summarize {
                self.summarize_file(&target).await;
            }
            return Ok(IngestOutcome::SkippedExisting);
        }

        let Some(body) = content.prop_str("hs_email_text").filter(|text| !text.is_empty())
        else {
            warn!("Email {} has no text content", email_id);
            return Ok(IngestOutcome::SkippedNoContent);
        };

        self.write_email(&target, &content, &email_id, body).await?;
        info!("Saved email {} to {:?}", email_id, target);

        if self.options.summarize {
            self.summarize_file(&target).await;
        }
        Ok(IngestOutcome::Written)
    }

    /// Match the record's recipient against the loaded contacts, or
    /// synthesize a placeholder carrying just the address
    fn resolve_contact(&self, record: &EntityRecord) -> ContactInfo {
        let to_address = record
            .prop_str("hs_email_to_email")
            .unwrap_or_default()
            .to_lowercase();

        self.contacts
            .iter()
            .find(|contact| contact.email.to_lowercase() == to_address)
            .cloned()
            .unwrap_or_else(|| ContactInfo::synthetic(&to_address))
    }

    fn resolve_company(&self, contact: &ContactInfo) -> EntityRecord {
        ids::normalize(&contact.company_id)
            .ok()
            .and_then(|id| self.companies.get(id.as_str()))
            .cloned()
            .unwrap_or_default()
    }

    async fn write_email(
        &self,
        path: &Path,
        content: &EntityRecord,
        email_id: &ids::RecordId,
        body: &str,
    ) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let header = format!(
            "Subject: {}\nFrom: {}\nTo: {}\nDate: {}\nEmail ID: {}\n\n{}\n\n",
            content.prop_str("hs_email_subject").unwrap_or_default(),
            content.prop_str("hs_email_from_email").unwrap_or_default(),
            content.prop_str("hs_email_to_email").unwrap_or_default(),
            format_date(content.prop("hs_timestamp")),
            email_id,
            "=".repeat(SEPARATOR_WIDTH),
        );

        let mut file = tokio::fs::File::create(path).await?;
        file.write_all(header.as_bytes()).await?;
        file.write_all(body.as_bytes()).await?;
        file.flush().await?;
        file.sync_all().await?;
        Ok(())
    }

    async fn summarize_file(&self, path: &Path) {
        let Some(summarizer) = self.summarizer.as_deref() else {
            warn!("Summarization requested but no summarizer is available");
            return;
        };
        if let Err(e) = summarizer::process_email_file(summarizer, path).await {
            warn!("Failed to summarize {:?}: {}", path, e);
        }
    }
}

/// Resolve every distinct associated company once, through the disk cache
async fn preload_companies(
    client: &HubSpotClient,
    cache: &EntityCache,
    contacts: &[ContactInfo],
) -> HashMap<String, EntityRecord> {
    let mut companies = HashMap::new();
    for contact in contacts {
        let Ok(id) = ids::normalize(&contact.company_id) else {
            continue;
        };
        if companies.contains_key(id.as_str()) {
            continue;
        }

        match cache
            .lookup_or_fetch(EntityKind::Company, &contact.company_id, |company_id| {
                async move { client.company(&company_id).await }
            })
            .await
        {
            Ok(record) if !record.is_empty() => {
                companies.insert(id.as_str().to_string(), record);
            }
            Ok(_) => {}
            Err(e) => {
                error!("Failed to load company {}: {}", id, e);
            }
        }
    }
    info!(
        "Loaded {} companies for {} contacts",
        companies.len(),
        contacts.len()
    );
    companies
}

/// Parsed form of an email timestamp property
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedDate {
    /// Resolved to a concrete instant
    Timestamp(DateTime<Utc>),
    /// Unparseable; carries the raw rendering of the value
    Raw(String),
    /// Property absent or null
    Missing,
}

/// Interpret a timestamp property from the API or a reloaded CSV row
///
/// Date-looking strings (containing 'T' or '-') get an ISO-8601 parse
/// first. Anything numeric is read as a Unix epoch, with values above
/// 1e12 taken as milliseconds. Values neither stage understands come
/// back as [`ParsedDate::Raw`] so the caller picks the rendering.
pub fn parse_date(value: Option<&Value>) -> ParsedDate {
    let Some(value) = value else {
        return ParsedDate::Missing;
    };

    match value {
        Value::Null => ParsedDate::Missing,
        Value::String(text) => {
            if text.contains('T') || text.contains('-') {
                if let Some(instant) = parse_iso(text) {
                    return ParsedDate::Timestamp(instant);
                }
            }
            if let Some(instant) = text.trim().parse::<f64>().ok().and_then(epoch_to_datetime) {
                return ParsedDate::Timestamp(instant);
            }
            ParsedDate::Raw(text.clone())
        }
        Value::Number(number) => match number.as_f64().and_then(epoch_to_datetime) {
            Some(instant) => ParsedDate::Timestamp(instant),
            None => ParsedDate::Raw(number.to_string()),
        },
        other => ParsedDate::Raw(other.to_string()),
    }
}

/// Render a timestamp property for the email header
pub fn format_date(value: Option<&Value>) -> String {
    match parse_date(value) {
        ParsedDate::Timestamp(instant) => instant.format(DATE_FORMAT).to_string(),
        ParsedDate::Raw(raw) => raw,
        ParsedDate::Missing => "Unknown".to_string(),
    }
}

fn parse_iso(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(instant) = DateTime::parse_from_rfc3339(text) {
        return Some(instant.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Some(naive.and_utc());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|naive| naive.and_utc());
    }
    None
}

fn epoch_to_datetime(raw: f64) -> Option<DateTime<Utc>> {
    if !raw.is_finite() {
        return None;
    }
    let mut seconds = raw.trunc() as i64;
    if seconds > 1_000_000_000_000 {
        seconds /= 1000;
    }
    DateTime::from_timestamp(seconds, 0)
}
