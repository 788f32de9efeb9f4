use crate::config::{Source, HTTP_TIMEOUT};
use crate::error::Result;
use crate::influx::{InfluxWriter, Measurement};
use crate::schedule::Schedule;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Drives fetch -> extract -> write across all sources. One task, sources
/// evaluated sequentially within a tick; a failure in one source never
/// aborts the tick for the others.
pub struct Poller {
    sources: Vec<Source>,
    writer: InfluxWriter,
    client: reqwest::Client,
    schedule: Schedule,
    poll_interval: Duration,
}

impl Poller {
    pub fn new(sources: Vec<Source>, writer: InfluxWriter, poll_interval_secs: u64) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(HTTP_TIMEOUT).build()?;
        Ok(Self {
            sources,
            writer,
            client,
            schedule: Schedule::new(),
            poll_interval: Duration::from_secs(poll_interval_secs),
        })
    }

    /// Warm-up plus the endless poll loop. Returns only if the runtime is
    /// torn down around it; shutdown is handled by the caller's select.
    pub async fn run(&mut self) {
        self.warm_up().await;
        let mut ticker = tokio::time::interval(self.poll_interval);
        // interval fires immediately; the warm-up already covered that tick
        ticker.tick().await;
        loop {
            ticker.tick().await;
            self.tick(Utc::now()).await;
        }
    }

    /// One unconditional fetch per source at startup, written as a single
    /// batch. Seeds the schedule so the first tick does not re-fire at once.
    pub async fn warm_up(&mut self) {
        let mut batch = Vec::new();
        for source in self.sources.clone() {
            info!(source = %source.kind, url = %source.url, "initial fetch");
            match self.collect(&source).await {
                Ok(Some(measurement)) => batch.push(measurement),
                Ok(None) => warn!(source = %source.kind, "no matching fields in response"),
                Err(e) => error!(source = %source.kind, error = %e, "initial fetch failed"),
            }
            self.schedule.record_attempt(source.kind, Utc::now());
        }
        if batch.is_empty() {
            return;
        }
        info!(points = batch.len(), "writing warm-up batch");
        if let Err(e) = self.writer.write_batch(&batch).await {
            error!(error = %e, "influx batch write failed; dropping measurements");
        }
    }

    /// One pass over all sources: fetch the due ones, record every attempt.
    pub async fn tick(&mut self, now: DateTime<Utc>) {
        let due: Vec<Source> = self
            .sources
            .iter()
            .filter(|s| self.schedule.is_due(s, now))
            .cloned()
            .collect();

        for source in due {
            match self.collect(&source).await {
                Ok(Some(measurement)) => {
                    let fields = measurement.fields.len();
                    match self.writer.write(&measurement).await {
                        Ok(()) => info!(source = %source.kind, fields, "write complete"),
                        Err(e) => {
                            error!(source = %source.kind, error = %e, "influx write failed; dropping measurement")
                        }
                    }
                }
                Ok(None) => warn!(source = %source.kind, "no matching fields in response"),
                Err(e) => error!(source = %source.kind, error = %e, "fetch or extraction failed"),
            }
            // Advance even on failure so a broken endpoint backs off to its
            // normal interval.
            self.schedule.record_attempt(source.kind, now);
            debug!(
                source = %source.kind,
                interval_secs = source.interval_secs,
                "next fetch earliest after interval"
            );
        }
    }

    /// The fallible pipeline step: GET, status check, parse, extract. Ok(None)
    /// means the document held nothing from the field vocabulary.
    async fn collect(&self, source: &Source) -> Result<Option<Measurement>> {
        let response = self
            .client
            .get(&source.url)
            .send()
            .await?
            .error_for_status()?;
        let raw: Value = response.json().await?;
        debug!(source = %source.kind, "data fetched");

        let extraction = source.kind.extract(&raw)?;
        if extraction.fields.is_empty() {
            return Ok(None);
        }
        Ok(Some(Measurement::new(
            source.kind,
            extraction,
            Utc::now().timestamp(),
        )))
    }
}
