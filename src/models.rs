use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Entity kinds served by the CRM object endpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Contact,
    Company,
    Engagement,
    Email,
}

impl EntityKind {
    /// Stable lowercase name, used to namespace cache keys
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Contact => "contact",
            EntityKind::Company => "company",
            EntityKind::Engagement => "engagement",
            EntityKind::Email => "email",
        }
    }
}

/// Engagement object types harvested by the pipeline, in download order
pub const ENGAGEMENT_KINDS: [&str; 5] = ["notes", "emails", "calls", "meetings", "tasks"];

/// One CRM document as the API returns it: an id, a property map, and
/// whatever extra top-level fields the endpoint includes (createdAt,
/// updatedAt, archived). Kept lossless so cache files and CSV exports
/// round-trip.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    #[serde(
        default,
        deserialize_with = "deserializers::deserialize_loose_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub properties: Map<String, Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl EntityRecord {
    /// True when the record carries no data at all (the empty record that
    /// stands in for unresolvable entities)
    pub fn is_empty(&self) -> bool {
        self.id.is_none() && self.properties.is_empty() && self.extra.is_empty()
    }

    /// Raw property value
    pub fn prop(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }

    /// String property value; non-string and null properties read as absent
    pub fn prop_str(&self, name: &str) -> Option<&str> {
        match self.properties.get(name) {
            Some(Value::String(text)) => Some(text),
            _ => None,
        }
    }
}

/// Per-contact summary consulted during email placement
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContactInfo {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    /// Raw associated-company id, validated only when a lookup happens
    pub company_id: Value,
}

impl ContactInfo {
    /// Build from a harvested contact record; missing properties become
    /// empty strings
    pub fn from_record(record: &EntityRecord) -> Self {
        Self {
            email: record.prop_str("email").unwrap_or_default().to_string(),
            first_name: record.prop_str("firstname").unwrap_or_default().to_string(),
            last_name: record.prop_str("lastname").unwrap_or_default().to_string(),
            company_id: record
                .prop("associatedcompanyid")
                .cloned()
                .unwrap_or(Value::Null),
        }
    }

    /// Stand-in for a recipient address with no matching contact
    pub fn synthetic(address: &str) -> Self {
        Self {
            email: address.to_string(),
            first_name: String::new(),
            last_name: String::new(),
            company_id: Value::Null,
        }
    }

    /// "firstname lastname" with surrounding whitespace trimmed
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }
}

/// One page from a paginated list endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct PageResponse {
    #[serde(default)]
    pub results: Vec<EntityRecord>,
    #[serde(default)]
    pub paging: Option<Paging>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Paging {
    #[serde(default)]
    pub next: Option<PageCursor>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PageCursor {
    pub after: String,
}

impl PageResponse {
    /// Continuation cursor, if the API signalled another page
    pub fn next_after(&self) -> Option<&str> {
        self.paging
            .as_ref()
            .and_then(|paging| paging.next.as_ref())
            .map(|cursor| cursor.after.as_str())
    }
}

/// Custom deserializers for CRM API types
pub mod deserializers {
    use serde::de::{self, Deserializer};
    use serde::Deserialize;
    use serde_json::Value;

    /// Deserialize a document id that may arrive as a JSON string or number
    pub fn deserialize_loose_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let opt: Option<Value> = Option::deserialize(deserializer)?;
        match opt {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(text)) => Ok(Some(text)),
            Some(Value::Number(number)) => Ok(Some(number.to_string())),
            Some(other) => Err(de::Error::custom(format!(
                "id must be a string or number, got {}",
                other
            ))),
        }
    }
}
