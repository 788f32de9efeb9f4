pub mod config;
pub mod error;
pub mod extract;
pub mod influx;
pub mod poller;
pub mod schedule;

// Re-export commonly used items
pub use config::{Config, InfluxConfig, Source};
pub use error::{AppError, Result};
pub use extract::{Extraction, FieldSet, FieldValue, SourceKind};
pub use influx::{InfluxWriter, Measurement};
pub use poller::Poller;
pub use schedule::Schedule;
