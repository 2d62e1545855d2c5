use chrono::{DateTime, Utc};

/// One field value in a line protocol record.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Float(f64),
    Integer(i64),
    Boolean(bool),
    Text(String),
}

/// A single measurement sample, rendered to one line of InfluxDB line
/// protocol. Tags are sorted by key before rendering; timestamps are emitted
/// as nanoseconds since the epoch, matching the write endpoint's
/// `precision=ns`.
#[derive(Debug, Clone)]
pub struct Point {
    measurement: String,
    tags: Vec<(String, String)>,
    fields: Vec<(String, FieldValue)>,
    timestamp: Option<DateTime<Utc>>,
}

impl Point {
    pub fn new(measurement: &str) -> Self {
        Self {
            measurement: measurement.to_string(),
            tags: Vec::new(),
            fields: Vec::new(),
            timestamp: None,
        }
    }

    pub fn tag(mut self, key: &str, value: &str) -> Self {
        self.tags.push((key.to_string(), value.to_string()));
        self
    }

    pub fn field(mut self, key: &str, value: FieldValue) -> Self {
        self.fields.push((key.to_string(), value));
        self
    }

    pub fn timestamp(mut self, at: DateTime<Utc>) -> Self {
        self.timestamp = Some(at);
        self
    }

    pub fn to_line(&self) -> String {
        let mut line = escape_measurement(&self.measurement);

        let mut tags = self.tags.clone();
        tags.sort_by(|a, b| a.0.cmp(&b.0));
        for (key, value) in &tags {
            line.push(',');
            line.push_str(&escape_tag(key));
            line.push('=');
            line.push_str(&escape_tag(value));
        }

        line.push(' ');
        for (index, (key, value)) in self.fields.iter().enumerate() {
            if index > 0 {
                line.push(',');
            }
            line.push_str(&escape_tag(key));
            line.push('=');
            line.push_str(&render_field(value));
        }

        if let Some(at) = self.timestamp {
            line.push(' ');
            line.push_str(&at.timestamp_nanos_opt().unwrap_or_default().to_string());
        }
        line
    }
}

/// Renders a batch as the newline-delimited body of one write request.
pub fn encode_batch(points: &[Point]) -> String {
    points
        .iter()
        .map(Point::to_line)
        .collect::<Vec<_>>()
        .join("\n")
}

fn escape_measurement(value: &str) -> String {
    value.replace(',', "\\,").replace(' ', "\\ ")
}

// Tag keys, tag values and field keys share the same escape set.
fn escape_tag(value: &str) -> String {
    value
        .replace(',', "\\,")
        .replace('=', "\\=")
        .replace(' ', "\\ ")
}

fn render_field(value: &FieldValue) -> String {
    match value {
        FieldValue::Float(v) => format!("{v}"),
        FieldValue::Integer(v) => format!("{v}i"),
        FieldValue::Boolean(v) => format!("{v}"),
        FieldValue::Text(v) => format!("\"{}\"", v.replace('\\', "\\\\").replace('"', "\\\"")),
    }
}
