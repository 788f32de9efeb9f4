use crate::config::{InfluxConfig, HTTP_TIMEOUT};
use crate::error::Result;
use crate::extract::{Extraction, FieldSet, SourceKind};
use tracing::info;

/// Measurement name shared by every point we write.
pub const MEASUREMENT: &str = "pac2200-monitoring";

/// One point ready to be serialized. Constructed, written and dropped per
/// fetch; nothing is buffered.
#[derive(Debug, Clone)]
pub struct Measurement {
    pub source: SourceKind,
    pub fields: FieldSet,
    /// Event time reported by the device, if it sent one.
    pub event_time: Option<i64>,
    /// Wall-clock time the write was prepared, whole seconds.
    pub ingest_time: i64,
}

impl Measurement {
    pub fn new(source: SourceKind, extraction: Extraction, ingest_time: i64) -> Self {
        Self {
            source,
            fields: extraction.fields,
            event_time: extraction.timestamp,
            ingest_time,
        }
    }

    /// Device time wins; ingest time stands in when the device sent none.
    pub fn resolved_timestamp(&self) -> i64 {
        self.event_time.unwrap_or(self.ingest_time)
    }

    /// Line protocol, second precision. Field order is FieldSet insertion
    /// order with `ingest_time` appended last.
    pub fn to_line(&self) -> String {
        let mut parts: Vec<String> = self
            .fields
            .iter()
            .map(|(name, value)| format!("{}={}", name, value))
            .collect();
        parts.push(format!("ingest_time={}", self.ingest_time));
        format!(
            "{},source={} {} {}",
            MEASUREMENT,
            self.source,
            parts.join(","),
            self.resolved_timestamp()
        )
    }
}

/// Join a batch into one write body, one point per line.
pub fn batch_body(measurements: &[Measurement]) -> String {
    measurements
        .iter()
        .map(Measurement::to_line)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Ships line-protocol points to the InfluxDB v2 write endpoint. Delivery is
/// best effort: the response status is logged but not acted upon, and a
/// failed write drops the measurement.
pub struct InfluxWriter {
    client: reqwest::Client,
    write_url: String,
    token: String,
    bucket: String,
    org: String,
}

impl InfluxWriter {
    pub fn new(cfg: &InfluxConfig) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(HTTP_TIMEOUT).build()?;
        Ok(Self {
            client,
            write_url: format!("{}/api/v2/write", cfg.url.trim_end_matches('/')),
            token: cfg.token.clone(),
            bucket: cfg.bucket.clone(),
            org: cfg.org.clone(),
        })
    }

    pub async fn write(&self, measurement: &Measurement) -> Result<()> {
        self.send(measurement.to_line(), 1).await
    }

    /// Preferred during warm-up: one POST amortizes HTTP and auth overhead
    /// across all sources.
    pub async fn write_batch(&self, measurements: &[Measurement]) -> Result<()> {
        if measurements.is_empty() {
            return Ok(());
        }
        self.send(batch_body(measurements), measurements.len()).await
    }

    async fn send(&self, body: String, points: usize) -> Result<()> {
        let response = self
            .client
            .post(&self.write_url)
            .query(&[
                ("bucket", self.bucket.as_str()),
                ("org", self.org.as_str()),
                ("precision", "s"),
            ])
            .header("Authorization", format!("Token {}", self.token))
            .header("Content-Type", "text/plain")
            .body(body)
            .send()
            .await?;
        info!(status = %response.status(), points, "influx write status");
        Ok(())
    }
}
