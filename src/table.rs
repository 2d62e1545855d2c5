use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use std::path::Path;

use crate::error::{Error, Result};
use crate::line_protocol::{FieldValue, Point};

pub const SENSOR_TAG: &str = "sensor";
// Labels whether a sample still needs review; the front end hides rows where
// the resolved tag is set.
pub const REVIEW_TAG: &str = "proceed to review";
pub const RESOLVED_TAG: &str = "resolved";

#[derive(Debug, Clone)]
pub struct SampleRow {
    pub timestamp: String,
    pub value: String,
}

/// One batch of samples: ordered rows of {timestamp, value} as read from a
/// headerless two-column CSV file or built in memory. Values stay raw strings
/// until the write path parses them, so a malformed row fails inside
/// `write_table` (where the failure is swallowed to a zero count) rather than
/// at load time.
#[derive(Debug, Clone, Default)]
pub struct SampleTable {
    rows: Vec<SampleRow>,
}

impl SampleTable {
    pub fn from_rows(rows: Vec<SampleRow>) -> Self {
        Self { rows }
    }

    pub fn from_csv_path(path: &Path) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_path(path)?;

        let mut rows = Vec::new();
        for (index, record) in reader.records().enumerate() {
            let record = record?;
            if record.len() != 2 {
                return Err(Error::InvalidRow {
                    row: index,
                    columns: record.len(),
                });
            }
            rows.push(SampleRow {
                timestamp: record[0].to_string(),
                value: record[1].to_string(),
            });
        }
        Ok(Self { rows })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[SampleRow] {
        &self.rows
    }

    /// Converts every row into a tagged point. The value column is renamed to
    /// the measurement name (it becomes the field key) and the three batch
    /// tags are attached to every row. Row count in equals row count out.
    pub fn to_points(&self, measurement_name: &str, sensor_name: &str) -> Result<Vec<Point>> {
        self.rows
            .iter()
            .enumerate()
            .map(|(index, row)| {
                let at =
                    parse_timestamp(&row.timestamp).ok_or_else(|| Error::InvalidTimestamp {
                        row: index,
                        value: row.timestamp.clone(),
                    })?;
                let value: f64 = row.value.parse().map_err(|_| Error::InvalidValue {
                    row: index,
                    value: row.value.clone(),
                })?;
                Ok(Point::new(measurement_name)
                    .tag(SENSOR_TAG, sensor_name)
                    .tag(REVIEW_TAG, "false")
                    .tag(RESOLVED_TAG, "false")
                    .field(measurement_name, FieldValue::Float(value))
                    .timestamp(at))
            })
            .collect()
    }
}

/// Sensor identifier derived from a CSV file name: base name without the
/// extension.
pub fn sensor_name_from_path(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Parses a timestamp cell to an absolute UTC instant. RFC3339 first, then
/// the common unzoned spellings; naive values are taken as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        return Some(at.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive.and_utc());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(date.and_hms_opt(0, 0, 0)?.and_utc());
    }
    None
}
