//! Filesystem placement for archived emails
//!
//! Every email lands at a deterministic path derived from the resolved
//! contact and company, so a re-run finds the existing file instead of
//! writing a duplicate. Path components are sanitized for portability
//! before they touch the filesystem.

use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;

use crate::ids::RecordId;
use crate::models::{ContactInfo, EntityRecord};

/// Characters rejected by at least one mainstream filesystem
static UNSAFE_CHARS: Lazy<Regex> = Lazy::new(|| Regex::new(r#"[<>:"/\\|?*']"#).unwrap());

/// Placeholder for names that sanitize down to nothing
pub const UNKNOWN_PLACEHOLDER: &str = "unknown";

/// Folder for emails whose contact has no resolvable company
pub const UNKNOWN_COMPANY: &str = "unknown_company";

/// Make a name safe to use as a single path component
///
/// Unsafe characters become `_`, surrounding whitespace is trimmed, and an
/// empty result is replaced with "unknown" so it can still name a folder.
pub fn sanitize(name: &str) -> String {
    let cleaned = UNSAFE_CHARS.replace_all(name, "_");
    let trimmed = cleaned.trim();
    if trimmed.is_empty() {
        UNKNOWN_PLACEHOLDER.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Target location of one email file, relative to the output root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailPlacement {
    pub directory: PathBuf,
    pub filename: String,
}

impl EmailPlacement {
    pub fn full_path(&self, root: &Path) -> PathBuf {
        root.join(&self.directory).join(&self.filename)
    }
}

/// Decide where an email belongs under the output root
///
/// Emails sent from the override domain are grouped by recipient address
/// alone. Everything else gets the two-level company/contact layout, with
/// the recipient address preferred over the contact's name for the inner
/// folder. The recipient is the email's own to-address, falling back to
/// the resolved contact's address when the record carries none.
pub fn resolve_placement(
    email: &EntityRecord,
    email_id: &RecordId,
    contact: &ContactInfo,
    company: &EntityRecord,
    override_domain: &str,
) -> EmailPlacement {
    let from_address = email.prop_str("hs_email_from_email").unwrap_or_default();
    let to_address = email
        .prop_str("hs_email_to_email")
        .filter(|to| !to.is_empty())
        .unwrap_or(&contact.email);

    let directory = if from_override_domain(from_address, override_domain) && !to_address.is_empty()
    {
        PathBuf::from(sanitize(to_address))
    } else {
        let company_name = company.prop_str("name").unwrap_or(UNKNOWN_COMPANY);
        let contact_folder = if to_address.trim().is_empty() {
            sanitize(&contact.full_name())
        } else {
            sanitize(to_address)
        };
        PathBuf::from(sanitize(company_name)).join(contact_folder)
    };

    EmailPlacement {
        directory,
        filename: format!("{email_id}.txt"),
    }
}

fn from_override_domain(from_address: &str, override_domain: &str) -> bool {
    if override_domain.is_empty() {
        return false;
    }
    address_domain(from_address)
        .map_or(false, |domain| domain.eq_ignore_ascii_case(override_domain))
}

/// Domain part after the last `@`, if any
fn address_domain(address: &str) -> Option<&str> {
    address
        .trim()
        .rsplit_once('@')
        .map(|(_, domain)| domain)
        .filter(|domain| !domain.is_empty())
}
