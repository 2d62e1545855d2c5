use chrono::{DateTime, FixedOffset, Utc};
use std::collections::BTreeMap;

use crate::error::{Error, Result};

const FLUX_DURATION_UNITS: &[&str] = &["ns", "us", "ms", "s", "m", "h", "d", "w", "mo", "y"];

/// Validates a Flux duration literal such as `1000d` or `30m` before it is
/// spliced into query source. A typo fails here as `InvalidDuration` instead
/// of as an opaque store-side parse error.
pub fn validate_duration(raw: &str) -> Result<()> {
    let trimmed = raw.trim();
    let digits: String = trimmed.chars().take_while(|c| c.is_ascii_digit()).collect();
    let unit = &trimmed[digits.len()..];
    if digits.is_empty() || !FLUX_DURATION_UNITS.contains(&unit) {
        return Err(Error::InvalidDuration(raw.to_string()));
    }
    Ok(())
}

/// `from(bucket:"…") |> range(start: -<duration>)`
pub fn range_query(bucket: &str, duration: &str) -> String {
    format!(
        "from(bucket:\"{}\") |> range(start: -{})",
        escape_string(bucket),
        duration.trim()
    )
}

/// `from(bucket:"…") |> range(start: <start>, stop: <stop>)`
pub fn bounded_range_query(bucket: &str, start: DateTime<Utc>, stop: DateTime<Utc>) -> String {
    format!(
        "from(bucket:\"{}\") |> range(start: {}, stop: {})",
        escape_string(bucket),
        start.format("%Y-%m-%dT%H:%M:%SZ"),
        stop.format("%Y-%m-%dT%H:%M:%SZ")
    )
}

fn escape_string(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Column datatypes announced by the `#datatype` annotation row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    String,
    Double,
    Long,
    UnsignedLong,
    Boolean,
    DateTimeRfc3339,
    Duration,
    Base64Binary,
}

impl DataType {
    fn parse(raw: &str) -> Self {
        match raw {
            "double" => DataType::Double,
            "long" => DataType::Long,
            "unsignedLong" => DataType::UnsignedLong,
            "boolean" => DataType::Boolean,
            "duration" => DataType::Duration,
            "base64Binary" => DataType::Base64Binary,
            raw if raw.starts_with("dateTime") => DataType::DateTimeRfc3339,
            _ => DataType::String,
        }
    }
}

/// One decoded cell value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    Double(f64),
    Long(i64),
    UnsignedLong(u64),
    Boolean(bool),
    Time(DateTime<FixedOffset>),
}

impl Value {
    fn decode(data_type: DataType, raw: &str) -> Self {
        match data_type {
            DataType::Double => match raw.parse::<f64>() {
                Ok(v) => Value::Double(v),
                Err(_) => Value::String(raw.to_string()),
            },
            DataType::Long => match raw.parse::<i64>() {
                Ok(v) => Value::Long(v),
                Err(_) => Value::String(raw.to_string()),
            },
            DataType::UnsignedLong => match raw.parse::<u64>() {
                Ok(v) => Value::UnsignedLong(v),
                Err(_) => Value::String(raw.to_string()),
            },
            DataType::Boolean => match raw {
                "true" => Value::Boolean(true),
                "false" => Value::Boolean(false),
                _ => Value::String(raw.to_string()),
            },
            DataType::DateTimeRfc3339 => match DateTime::parse_from_rfc3339(raw) {
                Ok(v) => Value::Time(v),
                Err(_) => Value::String(raw.to_string()),
            },
            DataType::String | DataType::Duration | DataType::Base64Binary => {
                Value::String(raw.to_string())
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct FluxColumn {
    pub name: String,
    pub data_type: DataType,
    pub group: bool,
    pub default: String,
}

#[derive(Debug, Clone)]
pub struct FluxRecord {
    pub values: BTreeMap<String, Value>,
}

impl FluxRecord {
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.values.get(column)
    }

    pub fn measurement(&self) -> Option<&str> {
        self.get_str("_measurement")
    }

    pub fn field(&self) -> Option<&str> {
        self.get_str("_field")
    }

    pub fn value(&self) -> Option<&Value> {
        self.get("_value")
    }

    pub fn time(&self) -> Option<DateTime<FixedOffset>> {
        match self.get("_time") {
            Some(Value::Time(at)) => Some(*at),
            _ => None,
        }
    }

    fn get_str(&self, column: &str) -> Option<&str> {
        match self.get(column) {
            Some(Value::String(v)) => Some(v.as_str()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FluxTable {
    pub columns: Vec<FluxColumn>,
    pub records: Vec<FluxRecord>,
}

#[derive(Default)]
struct Annotations {
    datatypes: Vec<String>,
    groups: Vec<String>,
    defaults: Vec<String>,
}

/// Decodes an annotated CSV query response into tables.
///
/// The stream interleaves `#datatype` / `#group` / `#default` annotation rows
/// with one header row per schema and then data rows. A new table starts
/// whenever the `table` column changes or a fresh annotation block begins. An
/// empty body decodes to no tables.
pub fn parse_annotated_csv(body: &str) -> Result<Vec<FluxTable>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(body.as_bytes());

    let mut tables: Vec<FluxTable> = Vec::new();
    let mut pending = Annotations::default();
    let mut columns: Option<Vec<FluxColumn>> = None;
    let mut table_column: Option<usize> = None;
    let mut current_table_id: Option<String> = None;

    for record in reader.records() {
        let record = record?;
        let cells: Vec<&str> = record.iter().collect();
        if cells.iter().all(|cell| cell.is_empty()) {
            continue;
        }

        let first = cells.first().copied().unwrap_or_default();
        if let Some(annotation) = first.strip_prefix('#') {
            // A fresh annotation block after data rows means a new schema.
            if columns.is_some() {
                columns = None;
                table_column = None;
                current_table_id = None;
                pending = Annotations::default();
            }
            let values: Vec<String> = cells.iter().map(|cell| cell.to_string()).collect();
            match annotation {
                "datatype" => pending.datatypes = values,
                "group" => pending.groups = values,
                "default" => pending.defaults = values,
                _ => {}
            }
            continue;
        }

        if columns.is_none() {
            let built: Vec<FluxColumn> = cells
                .iter()
                .enumerate()
                .map(|(index, name)| FluxColumn {
                    name: name.to_string(),
                    data_type: DataType::parse(
                        pending.datatypes.get(index).map(String::as_str).unwrap_or(""),
                    ),
                    group: pending.groups.get(index).map(String::as_str) == Some("true"),
                    default: pending
                        .defaults
                        .get(index)
                        .cloned()
                        .unwrap_or_default(),
                })
                .collect();
            table_column = built.iter().position(|column| column.name == "table");
            columns = Some(built);
            continue;
        }

        let Some(columns_ref) = columns.as_ref() else {
            continue;
        };
        let table_id = table_column
            .and_then(|index| cells.get(index))
            .unwrap_or(&"")
            .to_string();
        if current_table_id.as_deref() != Some(table_id.as_str()) || tables.is_empty() {
            tables.push(FluxTable {
                columns: columns_ref.clone(),
                records: Vec::new(),
            });
            current_table_id = Some(table_id);
        }

        let mut values = BTreeMap::new();
        for (index, column) in columns_ref.iter().enumerate() {
            if column.name.is_empty() {
                continue;
            }
            let raw = cells.get(index).copied().unwrap_or("");
            let raw = if raw.is_empty() {
                column.default.as_str()
            } else {
                raw
            };
            values.insert(column.name.clone(), Value::decode(column.data_type, raw));
        }
        if let Some(table) = tables.last_mut() {
            table.records.push(FluxRecord { values });
        }
    }

    Ok(tables)
}
