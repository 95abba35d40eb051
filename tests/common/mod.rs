//! Common test utilities and fixtures

use serde_json::{json, Value};
use std::path::{Path, PathBuf};

/// Create a contact record shaped like the CRM list endpoint returns it
pub fn contact_record(
    id: &str,
    email: &str,
    first: &str,
    last: &str,
    company_id: Option<&str>,
) -> Value {
    let mut properties = json!({
        "hs_object_id": id,
        "email": email,
        "firstname": first,
        "lastname": last,
    });
    if let Some(company) = company_id {
        properties["associatedcompanyid"] = json!(company);
    }

    json!({
        "id": id,
        "properties": properties,
        "createdAt": "2021-03-01T09:00:00.000Z",
        "archived": false
    })
}

/// Create an email engagement stub as the list endpoint returns it
pub fn email_stub(id: &str) -> Value {
    json!({
        "id": id,
        "properties": { "hs_object_id": id },
        "archived": false
    })
}

/// Create a full email document as the single-object endpoint returns it
pub fn email_content(
    id: &str,
    subject: &str,
    from: &str,
    to: &str,
    text: Option<&str>,
    timestamp: i64,
) -> Value {
    let mut properties = json!({
        "hs_object_id": id,
        "hs_email_subject": subject,
        "hs_email_from_email": from,
        "hs_email_to_email": to,
        "hs_timestamp": timestamp,
    });
    if let Some(body) = text {
        properties["hs_email_text"] = json!(body);
    }

    json!({
        "id": id,
        "properties": properties,
        "archived": false
    })
}

/// Create a company document
pub fn company_record(id: &str, name: &str, domain: &str) -> Value {
    json!({
        "id": id,
        "properties": {
            "hs_object_id": id,
            "name": name,
            "domain": domain,
        },
        "archived": false
    })
}

/// One page of list results with no continuation cursor
pub fn page(results: Vec<Value>) -> Value {
    json!({ "results": results })
}

/// Write a config file pointing every path into the test directory
pub async fn write_config(dir: &Path, base_url: &str) -> PathBuf {
    let content = format!(
        r#"[api]
base_url = "{base}"
request_timeout_secs = 5

[cache]
dir = "{root}/companies_cache"

[export]
dir = "{root}/exports"

[emails]
output_dir = "{root}/email_contents"
override_domain = "bondo.es"
"#,
        base = base_url,
        root = dir.display(),
    );

    let path = dir.join("config.toml");
    tokio::fs::write(&path, content).await.unwrap();
    path
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contact_record_shape() {
        let record = contact_record("1", "a@x.com", "Ann", "Xu", Some("7"));
        assert_eq!(record["id"], "1");
        assert_eq!(record["properties"]["email"], "a@x.com");
        assert_eq!(record["properties"]["associatedcompanyid"], "7");

        let bare = contact_record("2", "b@y.com", "Bo", "Yin", None);
        assert!(bare["properties"].get("associatedcompanyid").is_none());
    }

    #[test]
    fn test_email_content_without_text() {
        let record = email_content("9", "Subj", "f@a.com", "t@b.com", None, 0);
        assert!(record["properties"].get("hs_email_text").is_none());
        assert_eq!(record["properties"]["hs_email_subject"], "Subj");
    }

    #[test]
    fn test_page_shape() {
        let body = page(vec![email_stub("1"), email_stub("2")]);
        assert_eq!(body["results"].as_array().unwrap().len(), 2);
        assert!(body.get("paging").is_none());
    }
}
