//! End-to-end pipeline tests against a mock CRM API
//!
//! Each test drives the real `run_pipeline` orchestration: harvest to CSV,
//! reload from CSV, then email body ingestion onto disk.

mod common;

use hubspot_archiver::cli::{self, Cli, Commands, RunFlags};
use hubspot_archiver::config;
use indicatif::MultiProgress;
use serial_test::serial;
use tempfile::tempdir;
use uuid::Uuid;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn run_cli(config_path: std::path::PathBuf) -> Cli {
    Cli {
        config: config_path,
        verbose: false,
        command: Commands::Run {
            force: false,
            output_dir: None,
            skip_contacts: false,
            skip_engagements: false,
            skip_emails: false,
            summarize: false,
        },
    }
}

#[tokio::test]
#[serial]
async fn test_full_pipeline_archives_email_bodies() {
    let server = MockServer::start().await;

    // One contact with no associated company
    Mock::given(method("GET"))
        .and(path("/crm/v3/objects/contacts"))
        .respond_with(ResponseTemplate::new(200).set_body_json(common::page(vec![
            common::contact_record("1", "a@x.com", "Ann", "Xu", None),
        ])))
        .expect(1)
        .mount(&server)
        .await;

    for kind in ["notes", "calls", "meetings", "tasks"] {
        Mock::given(method("GET"))
            .and(path(format!("/crm/v3/objects/{}", kind)))
            .respond_with(ResponseTemplate::new(200).set_body_json(common::page(vec![])))
            .expect(1)
            .mount(&server)
            .await;
    }

    Mock::given(method("GET"))
        .and(path("/crm/v3/objects/emails"))
        .respond_with(ResponseTemplate::new(200).set_body_json(common::page(vec![
            common::email_stub("9001"),
            common::email_stub("9002"),
        ])))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/crm/v3/objects/emails/9001"))
        .respond_with(ResponseTemplate::new(200).set_body_json(common::email_content(
            "9001",
            "Hello",
            "someone@elsewhere.com",
            "a@x.com",
            Some("hi"),
            1616432400000,
        )))
        .expect(1)
        .mount(&server)
        .await;

    // 9002 carries no text content and must leave no file behind
    Mock::given(method("GET"))
        .and(path("/crm/v3/objects/emails/9002"))
        .respond_with(ResponseTemplate::new(200).set_body_json(common::email_content(
            "9002",
            "Empty",
            "someone@elsewhere.com",
            "a@x.com",
            None,
            1616432400000,
        )))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempdir().unwrap();
    let config_path = common::write_config(dir.path(), &server.uri()).await;
    std::env::set_var(config::API_KEY_ENV, "pat-e2e-test");

    let cli = run_cli(config_path);
    let report = cli::run_pipeline(&cli, RunFlags::default(), MultiProgress::new())
        .await
        .unwrap();

    assert!(Uuid::parse_str(&report.run_id).is_ok());
    assert!(report.duration_seconds >= 0);
    assert_eq!(report.contacts_downloaded, Some(1));
    assert_eq!(report.engagements_downloaded.len(), 5);
    assert!(report
        .engagements_downloaded
        .contains(&("emails".to_string(), 2)));
    assert!(report
        .engagements_downloaded
        .contains(&("notes".to_string(), 0)));

    let stats = report.ingest.unwrap();
    assert_eq!(stats.total, 2);
    assert_eq!(stats.written, 1);
    assert_eq!(stats.skipped_no_content, 1);
    assert_eq!(stats.skipped_existing, 0);
    assert_eq!(stats.failed, 0);

    // Contacts and emails were exported; empty kinds produced no CSV
    let exports = dir.path().join("exports");
    assert!(exports.join("hubspot_contacts.csv").exists());
    assert!(exports.join("hubspot_emails.csv").exists());
    assert!(!exports.join("hubspot_notes.csv").exists());

    // The archived body lands under unknown_company and the recipient address
    let email_path = dir
        .path()
        .join("email_contents/unknown_company/a@x.com/9001.txt");
    let content = tokio::fs::read_to_string(&email_path).await.unwrap();
    let expected = format!(
        "Subject: Hello\nFrom: someone@elsewhere.com\nTo: a@x.com\n\
         Date: 2021-03-22 17:00:00\nEmail ID: 9001\n\n{}\n\nhi",
        "=".repeat(50)
    );
    assert_eq!(content, expected);

    let skipped_path = dir
        .path()
        .join("email_contents/unknown_company/a@x.com/9002.txt");
    assert!(!skipped_path.exists());

    // 1 contact page + 5 engagement pages + 2 email bodies
    assert_eq!(report.requests_admitted, 8);
}

#[tokio::test]
#[serial]
async fn test_second_run_uses_cache_and_skips_existing_files() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/crm/v3/objects/contacts"))
        .respond_with(ResponseTemplate::new(200).set_body_json(common::page(vec![
            common::contact_record("1", "a@x.com", "Ann", "Xu", Some("7")),
        ])))
        .expect(1)
        .mount(&server)
        .await;

    for kind in ["notes", "calls", "meetings", "tasks"] {
        Mock::given(method("GET"))
            .and(path(format!("/crm/v3/objects/{}", kind)))
            .respond_with(ResponseTemplate::new(200).set_body_json(common::page(vec![])))
            .expect(1)
            .mount(&server)
            .await;
    }

    Mock::given(method("GET"))
        .and(path("/crm/v3/objects/emails"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(common::page(vec![common::email_stub("9001")])),
        )
        .expect(1)
        .mount(&server)
        .await;

    // The company document may only ever be fetched once; later runs must
    // come out of the disk cache
    Mock::given(method("GET"))
        .and(path("/crm/v3/objects/companies/7"))
        .respond_with(ResponseTemplate::new(200).set_body_json(common::company_record(
            "7",
            "Acme Inc",
            "acme.example",
        )))
        .expect(1)
        .mount(&server)
        .await;

    // Fetched once per run: the body fetch precedes the exists check
    Mock::given(method("GET"))
        .and(path("/crm/v3/objects/emails/9001"))
        .respond_with(ResponseTemplate::new(200).set_body_json(common::email_content(
            "9001",
            "Quarterly numbers",
            "cfo@acme.example",
            "a@x.com",
            Some("See attached."),
            1616432400000,
        )))
        .expect(3)
        .mount(&server)
        .await;

    let dir = tempdir().unwrap();
    let config_path = common::write_config(dir.path(), &server.uri()).await;
    std::env::set_var(config::API_KEY_ENV, "pat-e2e-test");

    let cli = run_cli(config_path);
    let email_path = dir
        .path()
        .join("email_contents/Acme Inc/a@x.com/9001.txt");

    // First run: harvest everything and write the body
    let report = cli::run_pipeline(&cli, RunFlags::default(), MultiProgress::new())
        .await
        .unwrap();
    let stats = report.ingest.unwrap();
    assert_eq!(stats.written, 1);
    assert!(email_path.exists());
    assert!(dir
        .path()
        .join("companies_cache/company_7.json")
        .exists());

    // Second run: reload the CSVs, resolve the company from cache, skip the file
    let rerun_flags = RunFlags {
        skip_contacts: true,
        skip_engagements: true,
        ..RunFlags::default()
    };
    let report = cli::run_pipeline(&cli, rerun_flags.clone(), MultiProgress::new())
        .await
        .unwrap();
    assert_eq!(report.contacts_downloaded, None);
    assert!(report.engagements_downloaded.is_empty());
    let stats = report.ingest.unwrap();
    assert_eq!(stats.written, 0);
    assert_eq!(stats.skipped_existing, 1);
    assert_eq!(report.requests_admitted, 1);

    // Third run with --force rewrites the existing file
    let force_flags = RunFlags {
        force: true,
        ..rerun_flags
    };
    let report = cli::run_pipeline(&cli, force_flags, MultiProgress::new())
        .await
        .unwrap();
    let stats = report.ingest.unwrap();
    assert_eq!(stats.written, 1);
    assert_eq!(stats.skipped_existing, 0);

    let content = tokio::fs::read_to_string(&email_path).await.unwrap();
    assert!(content.starts_with("Subject: Quarterly numbers\n"));
    assert!(content.ends_with("See attached."));
}

#[tokio::test]
#[serial]
async fn test_pipeline_fails_fast_without_api_token() {
    let dir = tempdir().unwrap();
    let config_path = common::write_config(dir.path(), "http://127.0.0.1:9").await;
    std::env::remove_var(config::API_KEY_ENV);

    let cli = run_cli(config_path);
    let result = cli::run_pipeline(&cli, RunFlags::default(), MultiProgress::new()).await;

    let err = result.unwrap_err().to_string();
    assert!(err.contains(config::API_KEY_ENV));
}
