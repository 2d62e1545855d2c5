use chrono::{DateTime, Utc};
use std::path::Path;
use tracing::{debug, info, warn};

use crate::config::BridgeConfig;
use crate::error::{Error, Result};
use crate::flux::{self, FluxTable};
use crate::influx::InfluxClient;
use crate::line_protocol::{encode_batch, FieldValue, Point};
use crate::table::{sensor_name_from_path, SampleTable, RESOLVED_TAG, REVIEW_TAG};

/// Facade over the store: forwards CSV/table content as write batches, issues
/// range queries, and issues measurement-scoped deletes. Stateless apart from
/// the held client handle and the loaded credentials.
pub struct DataManager {
    config: BridgeConfig,
    client: Option<InfluxClient>,
}

impl DataManager {
    /// Loads credentials from a YAML file and opens the client handle. The
    /// store is not probed for reachability here.
    pub fn from_file(config_path: &Path) -> Result<Self> {
        Self::from_config(BridgeConfig::from_file(config_path)?)
    }

    pub fn from_config(config: BridgeConfig) -> Result<Self> {
        let client = InfluxClient::connect(&config)?;
        Ok(Self {
            config,
            client: Some(client),
        })
    }

    fn client(&self) -> Result<&InfluxClient> {
        self.client.as_ref().ok_or(Error::Closed)
    }

    /// Writes one fixed diagnostic record (measurement `spikes`, integer
    /// field `acc4=2`, server-assigned timestamp).
    pub fn write_single_sample(&self) -> Result<()> {
        let point = Point::new("spikes")
            .tag(REVIEW_TAG, "false")
            .tag(RESOLVED_TAG, "false")
            .field("acc4", FieldValue::Integer(2));
        self.client()?
            .write(&self.config.org, &self.config.bucket, &point.to_line())
    }

    /// Uploads a sample table as one batch tagged by the sensor name and the
    /// review flags. Returns the number of rows written; any transform or
    /// write failure is logged and reported as 0, never raised. Callers that
    /// treat 0 as "nothing imported" rely on this.
    pub fn write_table(
        &self,
        table: &SampleTable,
        measurement_name: &str,
        sensor_name: &str,
        debug: bool,
    ) -> usize {
        match self.write_table_inner(table, measurement_name, sensor_name, debug) {
            Ok(count) => count,
            Err(err) => {
                warn!(
                    error = %err,
                    measurement = measurement_name,
                    sensor = sensor_name,
                    "cannot write the given table to the store"
                );
                0
            }
        }
    }

    fn write_table_inner(
        &self,
        table: &SampleTable,
        measurement_name: &str,
        sensor_name: &str,
        debug: bool,
    ) -> Result<usize> {
        let points = table.to_points(measurement_name, sensor_name)?;
        if !points.is_empty() {
            self.client()?
                .write(&self.config.org, &self.config.bucket, &encode_batch(&points))?;
        }
        if debug {
            info!(
                rows = points.len(),
                measurement = measurement_name,
                "imported rows into the store"
            );
        }
        Ok(points.len())
    }

    /// Uploads a headerless two-column CSV file. The sensor name is the file's
    /// base name without extension. Same zero-on-failure policy as
    /// `write_table`.
    pub fn write_csv(&self, csv_path: &Path, measurement_name: &str, debug: bool) -> usize {
        match SampleTable::from_csv_path(csv_path) {
            Ok(table) => {
                let sensor_name = sensor_name_from_path(csv_path);
                self.write_table(&table, measurement_name, &sensor_name, debug)
            }
            Err(err) => {
                warn!(
                    error = %err,
                    path = %csv_path.display(),
                    "cannot write the given csv file to the store"
                );
                0
            }
        }
    }

    /// Queries the configured bucket over `[now - duration, now]` and returns
    /// the record count of the first table. An empty result is a valid zero
    /// count. With `debug`, every table and record is emitted to the tracing
    /// sink.
    pub fn query_range(&self, duration: &str, debug: bool) -> Result<usize> {
        flux::validate_duration(duration)?;
        let source = flux::range_query(&self.config.bucket, duration);
        let tables = self.client()?.query(&self.config.org, &source)?;
        match tables.first() {
            None => {
                if debug {
                    info!("nothing to display");
                }
                Ok(0)
            }
            Some(first) => {
                if debug {
                    emit_tables(&tables);
                }
                Ok(first.records.len())
            }
        }
    }

    /// Deletes every record of the measurement over the full historical range
    /// and returns the record count of the first table of a query taken just
    /// before the delete. The count is a pre-deletion snapshot, not a
    /// confirmed deletion count.
    ///
    /// If the snapshot query returns no tables the delete request is still
    /// issued and the call then fails with `EmptyQueryResult`. The empty case
    /// is graceful in `query_range` and loud here; the divergence is kept for
    /// compatibility with existing callers.
    pub fn delete_measurement(&self, measurement_name: &str) -> Result<usize> {
        let start = DateTime::<Utc>::UNIX_EPOCH;
        let stop = Utc::now();

        let source = flux::bounded_range_query(&self.config.bucket, start, stop);
        let tables = self.client()?.query(&self.config.org, &source)?;

        let predicate = format!("_measurement=\"{measurement_name}\"");
        self.client()?.delete(
            &self.config.org,
            &self.config.bucket,
            &predicate,
            start,
            stop,
        )?;

        let first = tables.first().ok_or_else(|| Error::EmptyQueryResult {
            measurement: measurement_name.to_string(),
        })?;
        Ok(first.records.len())
    }

    /// Releases the client handle. Safe to call more than once; operations
    /// after shutdown fail with `Closed`.
    pub fn shutdown(&mut self) {
        if self.client.take().is_some() {
            debug!("store client handle released");
        }
    }
}

impl Drop for DataManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn emit_tables(tables: &[FluxTable]) {
    for (index, table) in tables.iter().enumerate() {
        info!(
            table = index,
            records = table.records.len(),
            "query result table"
        );
        for record in &table.records {
            info!(table = index, values = ?record.values, "query result record");
        }
    }
}
