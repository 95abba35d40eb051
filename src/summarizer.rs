//! Email summarization
//!
//! Optional post-write hook: each archived email can be condensed by a
//! chat-completions model, with the result stored as a JSON sidecar next
//! to the email file. An existing sidecar is never regenerated, and a
//! summarization failure never changes the ingestion outcome of the
//! underlying email.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, error, info};

use crate::config::SummarizerConfig;
use crate::error::{HubSpotError, Result};

const DEFAULT_OPENAI_BASE: &str = "https://api.openai.com/v1";

const SYSTEM_PROMPT: &str = "You are an assistant specialized in summarizing emails.";

/// Produces a condensed summary of one email's text
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, text: &str) -> Result<String>;

    /// Model identifier recorded in each sidecar
    fn model_id(&self) -> &str;
}

/// Summarizer backed by an OpenAI-compatible chat-completions endpoint
pub struct OpenAiSummarizer {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
    max_input_chars: usize,
}

impl OpenAiSummarizer {
    pub fn new(api_key: impl Into<String>, config: &SummarizerConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url: DEFAULT_OPENAI_BASE.to_string(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            max_input_chars: config.max_input_chars,
        }
    }

    /// Point at a different OpenAI-compatible endpoint
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl Summarizer for OpenAiSummarizer {
    async fn summarize(&self, text: &str) -> Result<String> {
        let content = truncate_chars(text, self.max_input_chars);
        let request = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": user_prompt(content)},
            ],
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
        });

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| HubSpotError::SummarizationError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(HubSpotError::SummarizationError(format!(
                "HTTP {} - {}",
                status.as_u16(),
                body
            )));
        }

        let document: serde_json::Value = response
            .json()
            .await
            .map_err(|e| HubSpotError::SummarizationError(e.to_string()))?;

        document["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| {
                HubSpotError::SummarizationError(
                    "Response carries no message content".to_string(),
                )
            })
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

fn user_prompt(content: &str) -> String {
    format!(
        "An email follows. Please produce a detailed summary covering:\n\
         \n\
         1. The main subject of the email\n\
         2. The key points discussed\n\
         3. Any required action or deadline mentioned\n\
         4. The overall tone of the email (formal, informal, urgent, etc.)\n\
         5. Any important information such as numbers, dates, or relevant data\n\
         \n\
         Email:\n\
         {}\n\
         \n\
         Provide a detailed and structured summary.",
        content
    )
}

/// First `max_chars` characters, respecting char boundaries
fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_offset, _)) => &text[..byte_offset],
        None => text,
    }
}

/// Sidecar document stored next to each summarized email
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryRecord {
    pub summary: String,
    pub model: String,
    pub timestamp: DateTime<Utc>,
}

/// Sidecar path for an email file (`123.txt` becomes `123.summary.json`)
pub fn sidecar_path(email_path: &Path) -> PathBuf {
    email_path.with_extension("summary.json")
}

/// What happened to one email file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SidecarOutcome {
    /// Summary generated and written
    Written,
    /// A sidecar already exists; nothing was regenerated
    AlreadyPresent,
}

/// Summarize one email file into its JSON sidecar
pub async fn process_email_file(
    summarizer: &dyn Summarizer,
    email_path: &Path,
) -> Result<SidecarOutcome> {
    let sidecar = sidecar_path(email_path);
    if sidecar.exists() {
        debug!("Summary already exists for {:?}, skipping", email_path);
        return Ok(SidecarOutcome::AlreadyPresent);
    }

    let content = tokio::fs::read_to_string(email_path).await?;
    let summary = summarizer.summarize(&content).await?;

    let record = SummaryRecord {
        summary,
        model: summarizer.model_id().to_string(),
        timestamp: Utc::now(),
    };
    tokio::fs::write(&sidecar, serde_json::to_string_pretty(&record)?).await?;

    debug!("Summary saved for {:?}", email_path);
    Ok(SidecarOutcome::Written)
}

/// Tallies for one directory sweep
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SummaryStats {
    pub total: usize,
    pub processed: usize,
    pub skipped: usize,
    pub errors: usize,
}

/// Summarize every email file under a directory tree
///
/// Per-file failures are logged and counted; the sweep keeps going.
pub async fn process_directory(
    summarizer: &dyn Summarizer,
    directory: &Path,
) -> Result<SummaryStats> {
    let mut stats = SummaryStats::default();
    if !directory.is_dir() {
        error!(
            "Directory {:?} does not exist or is not a directory",
            directory
        );
        return Ok(stats);
    }

    let email_files = collect_email_files(directory).await?;
    stats.total = email_files.len();
    info!("Processing {} emails for summarization...", stats.total);

    for (index, email_path) in email_files.iter().enumerate() {
        if index % 10 == 0 {
            info!("Processing email {} of {}", index + 1, stats.total);
        }

        match process_email_file(summarizer, email_path).await {
            Ok(SidecarOutcome::Written) => stats.processed += 1,
            Ok(SidecarOutcome::AlreadyPresent) => stats.skipped += 1,
            Err(e) => {
                error!("Failed to summarize {:?}: {}", email_path, e);
                stats.errors += 1;
            }
        }
    }

    info!("Summarization completed:");
    info!("- Total emails: {}", stats.total);
    info!("- Summaries written: {}", stats.processed);
    info!("- Already summarized: {}", stats.skipped);
    info!("- Emails with errors: {}", stats.errors);
    Ok(stats)
}

/// Every `.txt` file under the root, in sorted order
async fn collect_email_files(root: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if entry.file_type().await?.is_dir() {
                pending.push(path);
            } else if path.extension().map_or(false, |ext| ext == "txt") {
                files.push(path);
            }
        }
    }

    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tempfile::tempdir;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct StubSummarizer {
        calls: AtomicU32,
        fail: bool,
    }

    impl StubSummarizer {
        fn new() -> Self {
            Self {
                calls: AtomicU32::new(0),
                fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                calls: AtomicU32::new(0),
                fail: true,
            }
        }
    }

    #[async_trait]
    impl Summarizer for StubSummarizer {
        async fn summarize(&self, text: &str) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(HubSpotError::SummarizationError("stub failure".to_string()));
            }
            Ok(format!("summary of {} chars", text.len()))
        }

        fn model_id(&self) -> &str {
            "stub-model"
        }
    }

    fn test_config() -> SummarizerConfig {
        SummarizerConfig {
            model: "gpt-3.5-turbo".to_string(),
            max_tokens: 500,
            temperature: 0.3,
            max_input_chars: 4000,
        }
    }

    #[test]
    fn test_sidecar_path_replaces_extension() {
        assert_eq!(
            sidecar_path(Path::new("/out/acme/a@x.com/123.txt")),
            PathBuf::from("/out/acme/a@x.com/123.summary.json")
        );
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate_chars("hello", 10), "hello");
        assert_eq!(truncate_chars("hello", 3), "hel");
        // Multibyte characters count as one
        assert_eq!(truncate_chars("ééééé", 3), "ééé");
    }

    #[tokio::test]
    async fn test_process_email_file_writes_sidecar() {
        let dir = tempdir().unwrap();
        let email = dir.path().join("1.txt");
        tokio::fs::write(&email, "Subject: hi\n\nbody").await.unwrap();

        let stub = StubSummarizer::new();
        let outcome = process_email_file(&stub, &email).await.unwrap();
        assert_eq!(outcome, SidecarOutcome::Written);

        let sidecar = sidecar_path(&email);
        let record: SummaryRecord =
            serde_json::from_str(&tokio::fs::read_to_string(&sidecar).await.unwrap()).unwrap();
        assert!(record.summary.starts_with("summary of"));
        assert_eq!(record.model, "stub-model");
    }

    #[tokio::test]
    async fn test_existing_sidecar_is_never_regenerated() {
        let dir = tempdir().unwrap();
        let email = dir.path().join("1.txt");
        tokio::fs::write(&email, "body").await.unwrap();

        let stub = StubSummarizer::new();
        process_email_file(&stub, &email).await.unwrap();
        let outcome = process_email_file(&stub, &email).await.unwrap();

        assert_eq!(outcome, SidecarOutcome::AlreadyPresent);
        assert_eq!(stub.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_summary_leaves_no_sidecar() {
        let dir = tempdir().unwrap();
        let email = dir.path().join("1.txt");
        tokio::fs::write(&email, "body").await.unwrap();

        let stub = StubSummarizer::failing();
        let result = process_email_file(&stub, &email).await;

        assert!(result.is_err());
        assert!(!sidecar_path(&email).exists());
    }

    #[tokio::test]
    async fn test_directory_sweep_finds_nested_emails() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("acme").join("a@x.com");
        tokio::fs::create_dir_all(&nested).await.unwrap();
        tokio::fs::write(nested.join("1.txt"), "one").await.unwrap();
        tokio::fs::write(nested.join("2.txt"), "two").await.unwrap();
        tokio::fs::write(nested.join("notes.md"), "ignored").await.unwrap();

        let stub = StubSummarizer::new();
        let stats = process_directory(&stub, dir.path()).await.unwrap();

        assert_eq!(stats.total, 2);
        assert_eq!(stats.processed, 2);
        assert_eq!(stats.skipped, 0);
        assert_eq!(stats.errors, 0);

        // Second sweep skips everything
        let stats = process_directory(&stub, dir.path()).await.unwrap();
        assert_eq!(stats.skipped, 2);
        assert_eq!(stats.processed, 0);
    }

    #[tokio::test]
    async fn test_sweep_counts_failures_and_continues() {
        let dir = tempdir().unwrap();
        tokio::fs::write(dir.path().join("1.txt"), "one").await.unwrap();
        tokio::fs::write(dir.path().join("2.txt"), "two").await.unwrap();

        let stub = StubSummarizer::failing();
        let stats = process_directory(&stub, dir.path()).await.unwrap();

        assert_eq!(stats.total, 2);
        assert_eq!(stats.errors, 2);
        assert_eq!(stub.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_missing_directory_is_empty_stats() {
        let stub = StubSummarizer::new();
        let stats = process_directory(&stub, Path::new("/nonexistent/nowhere"))
            .await
            .unwrap();
        assert_eq!(stats, SummaryStats::default());
    }

    #[tokio::test]
    async fn test_openai_summarizer_calls_chat_completions() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"role": "assistant", "content": "the summary"}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let summarizer = OpenAiSummarizer::new("sk-test", &test_config()).with_base_url(server.uri());
        let summary = summarizer.summarize("email body").await.unwrap();
        assert_eq!(summary, "the summary");

        let requests = server.received_requests().await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(body["model"], "gpt-3.5-turbo");
        assert_eq!(body["max_tokens"], 500);
        assert!(body["messages"][1]["content"]
            .as_str()
            .unwrap()
            .contains("email body"));
    }

    #[tokio::test]
    async fn test_openai_summarizer_truncates_long_input() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"content": "ok"}}]
            })))
            .mount(&server)
            .await;

        let mut config = test_config();
        config.max_input_chars = 10;
        let summarizer = OpenAiSummarizer::new("sk-test", &config).with_base_url(server.uri());
        summarizer.summarize(&"x".repeat(500)).await.unwrap();

        let requests = server.received_requests().await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        let content = body["messages"][1]["content"].as_str().unwrap();
        assert!(content.contains(&"x".repeat(10)));
        assert!(!content.contains(&"x".repeat(11)));
    }

    #[tokio::test]
    async fn test_openai_error_response_is_summarization_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid key"))
            .mount(&server)
            .await;

        let summarizer = OpenAiSummarizer::new("bad", &test_config()).with_base_url(server.uri());
        let result = summarizer.summarize("body").await;

        match result {
            Err(HubSpotError::SummarizationError(message)) => {
                assert!(message.contains("401"));
            }
            other => panic!("expected SummarizationError, got {:?}", other),
        }
    }
}
