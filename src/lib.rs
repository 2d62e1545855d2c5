//! Thin bridge between sensor sample data (CSV files or in-memory tables)
//! and an InfluxDB 2.x bucket: synchronous write, range query, and
//! measurement-scoped delete, all forwarded through one blocking client
//! handle.

pub mod config;
pub mod error;
pub mod flux;
pub mod influx;
pub mod line_protocol;
pub mod manager;
pub mod table;

pub use config::BridgeConfig;
pub use error::{Error, Result};
pub use manager::DataManager;
pub use table::{SampleRow, SampleTable};
