use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::error::{IngestError, Result};
use crate::writer::SensorOutput;

/// Time-series store the collector writes into.
///
/// Implementations must be safe for concurrent use: one instance is shared
/// by every in-flight write task.
#[async_trait]
pub trait SensorStore: Send + Sync {
    /// Create the database if it does not already exist. Idempotent.
    async fn ensure_database(&self, database: &str) -> Result<()>;

    /// Persist records under the given measurement.
    async fn write_records(
        &self,
        database: &str,
        measurement: &str,
        records: &[SensorOutput],
    ) -> Result<()>;
}

/// InfluxDB 1.x HTTP client.
pub struct InfluxStore {
    http: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct InfluxErrorBody {
    error: String,
}

impl InfluxStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            http: reqwest::Client::new(),
            base_url,
        }
    }

    /// Maps a non-success response to a store error, pulling the detail
    /// out of InfluxDB's JSON error body when there is one.
    async fn check(resp: reqwest::Response) -> Result<()> {
        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }
        let body = resp.text().await.unwrap_or_default();
        let detail = serde_json::from_str::<InfluxErrorBody>(&body)
            .map(|b| b.error)
            .unwrap_or(body);
        Err(IngestError::StoreApi(format!("{status}: {detail}")))
    }
}

#[async_trait]
impl SensorStore for InfluxStore {
    async fn ensure_database(&self, database: &str) -> Result<()> {
        let url = format!("{}/query", self.base_url);
        let statement = format!("CREATE DATABASE \"{database}\"");
        let resp = self
            .http
            .post(&url)
            .form(&[("q", statement.as_str())])
            .send()
            .await?;
        Self::check(resp).await?;
        debug!("database {database} ensured");
        Ok(())
    }

    async fn write_records(
        &self,
        database: &str,
        measurement: &str,
        records: &[SensorOutput],
    ) -> Result<()> {
        let url = format!("{}/write", self.base_url);
        let body = records
            .iter()
            .map(|r| to_line(measurement, r))
            .collect::<Vec<_>>()
            .join("\n");
        let resp = self
            .http
            .post(&url)
            .query(&[("db", database), ("precision", "ns")])
            .body(body)
            .send()
            .await?;
        Self::check(resp).await
    }
}

/// Renders one record as an InfluxDB line-protocol point with a
/// nanosecond timestamp. Sender ip/port are tags, the payload is a
/// string field.
fn to_line(measurement: &str, record: &SensorOutput) -> String {
    let ts = record.timestamp.timestamp_nanos_opt().unwrap_or_default();
    format!(
        "{},sensor_ip={},sensor_port={} payload=\"{}\" {}",
        escape_measurement(measurement),
        escape_tag(&record.sensor_ip),
        record.sensor_port,
        escape_field(&record.payload),
        ts,
    )
}

// Line-protocol escaping rules: measurements escape commas and spaces,
// tag values additionally escape equals signs, string field values
// escape backslashes and double quotes.

fn escape_measurement(s: &str) -> String {
    s.replace(',', "\\,").replace(' ', "\\ ")
}

fn escape_tag(s: &str) -> String {
    s.replace(',', "\\,").replace('=', "\\=").replace(' ', "\\ ")
}

fn escape_field(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}
