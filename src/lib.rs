//! HubSpot Archiver
//!
//! A rate-limited harvester that downloads a HubSpot portal's contacts and
//! engagements into CSV exports, then files each email body on disk under
//! its company and contact, with optional LLM summaries alongside.
//!
//! # Overview
//!
//! This library provides a complete solution for archiving a CRM portal:
//! - **Rate limiting**: A sliding-window limiter shared by every API call
//! - **Harvesting**: Cursor-paginated downloads of contacts and engagements
//! - **Caching**: Durable per-entity company cache to avoid refetching
//! - **Placement**: Deterministic company/contact folder layout for emails
//! - **Ingestion**: Email body downloads with skip and overwrite semantics
//! - **Summarization**: Optional JSON summary sidecars via a chat model
//!
//! # Example Usage
//!
//! ```no_run
//! use hubspot_archiver::client::HubSpotClient;
//! use hubspot_archiver::config::{self, Config};
//! use hubspot_archiver::rate_limiter::SlidingWindowLimiter;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     // Load configuration
//!     let config = Config::load("config.toml".as_ref()).await?;
//!
//!     // Create rate-limited client
//!     let limiter = SlidingWindowLimiter::with_config(
//!         config.rate_limit.max_requests,
//!         config.rate_limit.window(),
//!     );
//!     let client = HubSpotClient::new(config::api_token_from_env()?, &config.api, limiter)?;
//!
//!     // Download every contact in the portal
//!     let contacts = client.contacts().await?;
//!     println!("{} contacts", contacts.len());
//!
//!     Ok(())
//! }
//! ```
//!
//! # Module Organization
//!
//! - [`cache`] - Durable entity cache keyed by kind and record id
//! - [`cli`] - Command-line interface and pipeline orchestration
//! - [`client`] - Rate-limited HubSpot API client with retry logic
//! - [`config`] - Configuration management
//! - [`error`] - Error types and result aliases
//! - [`export`] - CSV flattening and reloading of harvested records
//! - [`ids`] - Record id validation and normalization
//! - [`ingest`] - Email body download, placement, and writing
//! - [`models`] - Core data structures
//! - [`placement`] - Folder layout rules for archived emails
//! - [`rate_limiter`] - Sliding-window admission control
//! - [`summarizer`] - LLM summaries and sidecar files

pub mod cache;
pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod export;
pub mod ids;
pub mod ingest;
pub mod models;
pub mod placement;
pub mod rate_limiter;
pub mod summarizer;

// Re-export commonly used types for convenience
pub use error::{HubSpotError, Result};

// Core data models
pub use models::{ContactInfo, EntityKind, EntityRecord, PageResponse, ENGAGEMENT_KINDS};

// Record ids
pub use ids::RecordId;

// Rate limiting
pub use rate_limiter::{SlidingWindowLimiter, WindowStats};

// Client
pub use client::HubSpotClient;

// Caching
pub use cache::{DiskStore, EntityCache, EntityStore, MemoryStore};

// Config types
pub use config::{ApiConfig, Config, EmailConfig, RateLimitConfig, SummarizerConfig};

// Ingestion types
pub use ingest::{EmailIngestor, IngestOptions, IngestStats};

// Placement
pub use placement::EmailPlacement;

// Summarization
pub use summarizer::{OpenAiSummarizer, Summarizer, SummaryStats};

// CLI types (for binary usage)
pub use cli::{Cli, Commands, ProgressReporter, RunReport};
