//! Tabular export of harvested records
//!
//! Records are flattened into dot-separated columns (`id`,
//! `properties.email`, ...) and written one row each; the reader inverts
//! the flattening so a later phase can run from the CSV instead of the
//! API. Cells come back as strings, which downstream consumers already
//! tolerate.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{info, warn};

use crate::error::Result;
use crate::models::EntityRecord;

/// Export file for one harvested collection (`hubspot_<name>.csv`)
pub fn csv_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("hubspot_{}.csv", name))
}

/// Write records as one CSV row each
///
/// The column set is the union of every record's flattened keys, ordered
/// by first appearance; cells a record does not carry stay empty.
pub fn write_records(path: &Path, records: &[EntityRecord]) -> Result<usize> {
    if records.is_empty() {
        warn!("No data to save for {:?}", path);
        return Ok(0);
    }

    let rows: Vec<Vec<(String, String)>> = records.iter().map(flatten).collect();

    let mut columns: Vec<String> = Vec::new();
    let mut seen: HashSet<&str> = HashSet::new();
    for row in &rows {
        for (key, _) in row {
            if seen.insert(key) {
                columns.push(key.clone());
            }
        }
    }

    let mut writer = csv::Writer::from_path(path)?;
    if !columns.is_empty() {
        writer.write_record(&columns)?;
        for row in &rows {
            let cells: HashMap<&str, &str> = row
                .iter()
                .map(|(key, value)| (key.as_str(), value.as_str()))
                .collect();
            let line: Vec<&str> = columns
                .iter()
                .map(|column| cells.get(column.as_str()).copied().unwrap_or(""))
                .collect();
            writer.write_record(&line)?;
        }
    }
    writer.flush()?;

    info!("Wrote {} records to {:?}", records.len(), path);
    Ok(records.len())
}

/// Reload previously exported records
///
/// Inverse of the flattening: `id` and `properties.*` columns land back
/// in their fields, anything else in the extra map. Empty cells read as
/// absent rather than empty strings.
pub fn read_records(path: &Path) -> Result<Vec<EntityRecord>> {
    let mut reader = csv::Reader::from_path(path)?;
    let headers = reader.headers()?.clone();

    let mut records = Vec::new();
    for row in reader.records() {
        let row = row?;
        let mut record = EntityRecord::default();
        for (column, cell) in headers.iter().zip(row.iter()) {
            if cell.is_empty() {
                continue;
            }
            if column == "id" {
                record.id = Some(cell.to_string());
            } else if let Some(name) = column.strip_prefix("properties.") {
                record
                    .properties
                    .insert(name.to_string(), Value::String(cell.to_string()));
            } else {
                record
                    .extra
                    .insert(column.to_string(), Value::String(cell.to_string()));
            }
        }
        records.push(record);
    }

    info!("Loaded {} records from {:?}", records.len(), path);
    Ok(records)
}

/// Flattened (column, cell) pairs in the record's own key order
fn flatten(record: &EntityRecord) -> Vec<(String, String)> {
    let mut cells = Vec::new();
    if let Some(id) = &record.id {
        cells.push(("id".to_string(), id.clone()));
    }
    for (key, value) in &record.properties {
        flatten_value(&format!("properties.{}", key), value, &mut cells);
    }
    for (key, value) in &record.extra {
        flatten_value(key, value, &mut cells);
    }
    cells
}

fn flatten_value(key: &str, value: &Value, cells: &mut Vec<(String, String)>) {
    match value {
        Value::Object(map) => {
            for (child_key, child) in map {
                flatten_value(&format!("{}.{}", key, child_key), child, cells);
            }
        }
        other => cells.push((key.to_string(), render_cell(other))),
    }
}

fn render_cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
