use chrono::{DateTime, Utc};
use reqwest::blocking::{Client, Response};
use serde::Serialize;

use crate::config::BridgeConfig;
use crate::error::{Error, Result};
use crate::flux::{parse_annotated_csv, FluxTable};

const WRITE_PATH: &str = "/api/v2/write";
const QUERY_PATH: &str = "/api/v2/query";
const DELETE_PATH: &str = "/api/v2/delete";

/// Blocking handle to the InfluxDB 2.x HTTP API. One instance is created at
/// manager construction and reused for every call; building it does not probe
/// reachability.
pub struct InfluxClient {
    base_url: String,
    token: String,
    http: Client,
}

#[derive(Serialize)]
struct QueryBody<'a> {
    query: &'a str,
    #[serde(rename = "type")]
    kind: &'a str,
    dialect: Dialect,
}

#[derive(Serialize)]
struct Dialect {
    header: bool,
    annotations: &'static [&'static str],
}

#[derive(Serialize)]
struct DeleteBody<'a> {
    start: String,
    stop: String,
    predicate: &'a str,
}

impl InfluxClient {
    pub fn connect(config: &BridgeConfig) -> Result<Self> {
        // This layer sets no deadline; a hang in the store propagates to the
        // caller.
        let http = Client::builder().timeout(None).build()?;
        Ok(Self {
            base_url: config.url.clone(),
            token: config.token.clone(),
            http,
        })
    }

    /// Writes a line protocol batch with nanosecond precision.
    pub fn write(&self, org: &str, bucket: &str, lines: &str) -> Result<()> {
        let response = self
            .http
            .post(format!("{}{}", self.base_url, WRITE_PATH))
            .query(&[("org", org), ("bucket", bucket), ("precision", "ns")])
            .header("Authorization", self.auth_header())
            .header("Content-Type", "text/plain; charset=utf-8")
            .body(lines.to_string())
            .send()?;
        self.check(response)?;
        Ok(())
    }

    /// Runs a Flux query and decodes the annotated CSV response.
    pub fn query(&self, org: &str, flux: &str) -> Result<Vec<FluxTable>> {
        let body = QueryBody {
            query: flux,
            kind: "flux",
            dialect: Dialect {
                header: true,
                annotations: &["datatype", "group", "default"],
            },
        };
        let response = self
            .http
            .post(format!("{}{}", self.base_url, QUERY_PATH))
            .query(&[("org", org)])
            .header("Authorization", self.auth_header())
            .header("Accept", "application/csv")
            .json(&body)
            .send()?;
        let response = self.check(response)?;
        parse_annotated_csv(&response.text()?)
    }

    /// Deletes records matching `predicate` within `[start, stop]`.
    pub fn delete(
        &self,
        org: &str,
        bucket: &str,
        predicate: &str,
        start: DateTime<Utc>,
        stop: DateTime<Utc>,
    ) -> Result<()> {
        let body = DeleteBody {
            start: start.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
            stop: stop.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
            predicate,
        };
        let response = self
            .http
            .post(format!("{}{}", self.base_url, DELETE_PATH))
            .query(&[("org", org), ("bucket", bucket)])
            .header("Authorization", self.auth_header())
            .json(&body)
            .send()?;
        self.check(response)?;
        Ok(())
    }

    fn auth_header(&self) -> String {
        format!("Token {}", self.token)
    }

    fn check(&self, response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().unwrap_or_default();
        Err(Error::Api { status, message })
    }
}
