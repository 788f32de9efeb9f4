use crate::error::{AppError, Result};
use crate::extract::SourceKind;
use std::env;
use std::time::Duration;

/// Timeout applied to device GETs and Influx POSTs.
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;

#[derive(Debug, Clone)]
pub struct Config {
    pub influx: InfluxConfig,
    /// Base URL of the PAC2200 device; endpoint suffixes are appended to it.
    pub device_base_url: String,
    /// Outer tick of the poll loop.
    pub poll_interval_secs: u64,
}

#[derive(Debug, Clone)]
pub struct InfluxConfig {
    pub url: String,
    pub token: String,
    pub bucket: String,
    pub org: String,
}

/// One device endpoint with its own polling interval.
#[derive(Debug, Clone)]
pub struct Source {
    pub kind: SourceKind,
    pub url: String,
    pub interval_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Config {
            influx: InfluxConfig {
                url: required("INFLUX_URL")?,
                token: required("INFLUX_TOKEN")?,
                bucket: required("INFLUX_BUCKET")?,
                org: required("INFLUX_ORG")?,
            },
            device_base_url: required("PAC2200_URL")?,
            poll_interval_secs: poll_interval_from_env()?,
        })
    }

    /// The fixed endpoint table of the device. Intervals reflect how often
    /// each document changes on the meter.
    pub fn sources(&self) -> Vec<Source> {
        SourceKind::ALL
            .iter()
            .map(|&kind| Source {
                kind,
                url: format!("{}{}", self.device_base_url, kind.tag()),
                interval_secs: default_interval(kind),
            })
            .collect()
    }
}

fn default_interval(kind: SourceKind) -> u64 {
    match kind {
        SourceKind::Inst => 5,
        SourceKind::Avg1 => 10,
        SourceKind::Avg2 => 900,
        SourceKind::Counter => 5,
        SourceKind::Extreme => 900,
    }
}

fn required(name: &str) -> Result<String> {
    match env::var(name) {
        Ok(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(AppError::Config(format!(
            "missing required environment variable: {}",
            name
        ))),
    }
}

fn poll_interval_from_env() -> Result<u64> {
    let raw = match env::var("POLL_INTERVAL_SECONDS") {
        Ok(v) if !v.trim().is_empty() => v,
        _ => return Ok(DEFAULT_POLL_INTERVAL_SECS),
    };
    match raw.trim().parse::<i64>() {
        Ok(n) if n > 0 => Ok(n as u64),
        _ => Err(AppError::Config(
            "POLL_INTERVAL_SECONDS must be a positive integer".into(),
        )),
    }
}
