use reqwest::StatusCode;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to read config {path}: {source}")]
    ConfigRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    ConfigParse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid store url {url}: {source}")]
    ConfigUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("row {row}: unparseable timestamp {value:?}")]
    InvalidTimestamp { row: usize, value: String },

    #[error("row {row}: non-numeric value {value:?}")]
    InvalidValue { row: usize, value: String },

    #[error("row {row}: expected 2 columns, got {columns}")]
    InvalidRow { row: usize, columns: usize },

    #[error("invalid range duration {0:?}")]
    InvalidDuration(String),

    #[error("http transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("store rejected request ({status}): {message}")]
    Api { status: StatusCode, message: String },

    #[error("query for measurement {measurement:?} returned no tables")]
    EmptyQueryResult { measurement: String },

    #[error("client handle already released")]
    Closed,
}
