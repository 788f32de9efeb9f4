use crate::error::{AppError, Result};
use chrono::{DateTime, Local, NaiveDateTime, TimeZone};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::fmt;

/// Instantaneous and derived electrical fields reported by the PAC2200.
pub const FIELDS: [&str; 26] = [
    // Voltages
    "V_L1", "V_L2", "V_L3", "V_L12", "V_L23", "V_L31",
    // Currents
    "I_L1", "I_L2", "I_L3",
    // Active power
    "P_L1", "P_L2", "P_L3", "P_SUM",
    // Apparent power
    "VA_L1", "VA_L2", "VA_L3", "VA_SUM",
    // Reactive power
    "VARQ1_L1", "VARQ1_L2", "VARQ1_L3", "VARQ1_SUM",
    // Power factor
    "PF_L1", "PF_L2", "PF_L3", "PF_SUM",
    // Frequency
    "FREQ",
];

/// Energy counters, keyed in the device response by phase name.
pub const COUNTER_FIELDS: [(&str, &str); 4] = [
    ("ACT_ENERGY_IMPORT_T1_L1", "L1"),
    ("ACT_ENERGY_IMPORT_T1_L2", "L2"),
    ("ACT_ENERGY_IMPORT_T1_L3", "L3"),
    ("ACT_ENERGY_IMPORT_T1_TOTAL", "total"),
];

/// The device endpoints we poll. Each kind knows its URL suffix and how its
/// JSON document nests the payload and timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    Inst,
    Avg1,
    Avg2,
    Counter,
    Extreme,
}

impl SourceKind {
    pub const ALL: [SourceKind; 5] = [
        SourceKind::Inst,
        SourceKind::Avg1,
        SourceKind::Avg2,
        SourceKind::Counter,
        SourceKind::Extreme,
    ];

    /// Endpoint suffix on the device, also used as the `source` tag.
    pub fn tag(&self) -> &'static str {
        match self {
            SourceKind::Inst => "INST",
            SourceKind::Avg1 => "AVG1",
            SourceKind::Avg2 => "AVG2",
            SourceKind::Counter => "COUNTER",
            SourceKind::Extreme => "EXTREME",
        }
    }

    /// Normalize this kind's raw JSON document into fields + event timestamp.
    pub fn extract(&self, raw: &Value) -> Result<Extraction> {
        match self {
            SourceKind::Inst => {
                let doc = InstDocument::deserialize(raw)?;
                let ts_str = doc.values.get("LOCAL_TIME").and_then(Value::as_str);
                let timestamp = parse_opt_local_time(ts_str)?;
                Ok(Extraction {
                    fields: collect_known(&doc.values),
                    timestamp,
                })
            }
            SourceKind::Avg1 | SourceKind::Avg2 => {
                let doc = AvgDocument::deserialize(raw)?;
                let stage = match self {
                    SourceKind::Avg1 => &doc.stages.stage1,
                    _ => &doc.stages.stage2,
                };
                let ts_str = stage.get("TS").and_then(Value::as_str);
                let timestamp = parse_opt_local_time(ts_str)?;
                Ok(Extraction {
                    fields: collect_known(stage),
                    timestamp,
                })
            }
            SourceKind::Counter => {
                let doc = CounterDocument::deserialize(raw)?;
                let timestamp = parse_opt_local_time(doc.counter.local_time.as_deref())?;
                let tariff = &doc.counter.active_energy.import.tariff1;
                let mut fields = FieldSet::default();
                for (field, phase) in COUNTER_FIELDS {
                    if let Some(value) = tariff.get(phase).and_then(scalar_value) {
                        fields.insert(field, value);
                    }
                }
                Ok(Extraction { fields, timestamp })
            }
            // Polled for scheduling parity; no fields mapped from it today.
            SourceKind::Extreme => Ok(Extraction::default()),
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Result of normalizing one raw device document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extraction {
    pub fields: FieldSet,
    /// Event time reported by the device, whole seconds since epoch.
    pub timestamp: Option<i64>,
}

/// Insertion-ordered field name to value mapping. Names always come from the
/// fixed vocabulary above, so insertion order is vocabulary order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldSet {
    entries: Vec<(&'static str, FieldValue)>,
}

impl FieldSet {
    pub fn insert(&mut self, name: &'static str, value: FieldValue) {
        self.entries.push((name, value));
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.entries.iter().find(|(n, _)| *n == name).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = &(&'static str, FieldValue)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    F64(f64),
    I64(i64),
    Bool(bool),
    Text(String),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            // {:?} is shortest round-trip for f64 and keeps the trailing .0
            // on integral values; {} would turn 50.0 into "50".
            FieldValue::F64(v) => write!(f, "{:?}", v),
            FieldValue::I64(v) => write!(f, "{}", v),
            FieldValue::Bool(v) => write!(f, "{}", v),
            FieldValue::Text(v) => f.write_str(v),
        }
    }
}

// Envelope shapes of the device documents. Leaves stay dynamic maps because
// the set of present fields varies per firmware and configuration.

#[derive(Debug, Deserialize)]
struct InstDocument {
    #[serde(rename = "INST_VALUES", default)]
    values: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct AvgDocument {
    #[serde(rename = "AVERAGE_VALUES", default)]
    stages: AvgStages,
}

#[derive(Debug, Default, Deserialize)]
struct AvgStages {
    #[serde(rename = "STAGE1", default)]
    stage1: Map<String, Value>,
    #[serde(rename = "STAGE2", default)]
    stage2: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct CounterDocument {
    #[serde(rename = "COUNTER", default)]
    counter: CounterSection,
}

#[derive(Debug, Default, Deserialize)]
struct CounterSection {
    #[serde(rename = "LOCAL_TIME")]
    local_time: Option<String>,
    #[serde(rename = "ACTIVE_ENERGY", default)]
    active_energy: ActiveEnergy,
}

#[derive(Debug, Default, Deserialize)]
struct ActiveEnergy {
    #[serde(rename = "IMPORT", default)]
    import: EnergyImport,
}

#[derive(Debug, Default, Deserialize)]
struct EnergyImport {
    #[serde(rename = "T1", default)]
    tariff1: Map<String, Value>,
}

/// Keep only vocabulary fields whose `{"value": ...}` wrapper actually holds
/// a usable scalar. The device returns placeholder entries for measurements
/// that are disabled or not yet sampled.
fn collect_known(values: &Map<String, Value>) -> FieldSet {
    let mut fields = FieldSet::default();
    for name in FIELDS {
        if let Some(value) = values.get(name).and_then(wrapped_scalar) {
            fields.insert(name, value);
        }
    }
    fields
}

fn wrapped_scalar(entry: &Value) -> Option<FieldValue> {
    entry.as_object()?.get("value").and_then(scalar_value)
}

fn scalar_value(value: &Value) -> Option<FieldValue> {
    match value {
        Value::Number(n) if n.is_i64() => n.as_i64().map(FieldValue::I64),
        Value::Number(n) => n.as_f64().map(FieldValue::F64),
        Value::Bool(b) => Some(FieldValue::Bool(*b)),
        Value::String(s) => Some(FieldValue::Text(s.clone())),
        _ => None,
    }
}

fn parse_opt_local_time(ts_str: Option<&str>) -> Result<Option<i64>> {
    match ts_str {
        Some(s) => parse_local_time(s).map(Some),
        None => Ok(None),
    }
}

/// Parse an ISO-8601 timestamp to whole-second Unix time. The device reports
/// local time without an offset; an explicit offset is honored when present.
pub fn parse_local_time(s: &str) -> Result<i64> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.timestamp());
    }
    let naive = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .map_err(|e| AppError::Time(format!("invalid device timestamp {:?}: {}", s, e)))?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.timestamp())
        .ok_or_else(|| AppError::Time(format!("device timestamp {:?} skipped by DST", s)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn local_unix(s: &str) -> i64 {
        let naive = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S").unwrap();
        Local
            .from_local_datetime(&naive)
            .earliest()
            .unwrap()
            .timestamp()
    }

    #[test]
    fn inst_extracts_fields_and_local_time() {
        let raw = json!({
            "INST_VALUES": {
                "LOCAL_TIME": "2024-01-01T00:00:00",
                "V_L1": {"value": 229.9}
            }
        });
        let out = SourceKind::Inst.extract(&raw).unwrap();
        assert_eq!(out.fields.get("V_L1"), Some(&FieldValue::F64(229.9)));
        assert_eq!(out.fields.len(), 1);
        assert_eq!(out.timestamp, Some(local_unix("2024-01-01T00:00:00")));
    }

    #[test]
    fn inst_keeps_vocabulary_order() {
        let raw = json!({
            "INST_VALUES": {
                "FREQ": {"value": 50.0},
                "V_L1": {"value": 230.1}
            }
        });
        let out = SourceKind::Inst.extract(&raw).unwrap();
        let names: Vec<&str> = out.fields.iter().map(|(n, _)| *n).collect();
        assert_eq!(names, vec!["V_L1", "FREQ"]);
    }

    #[test]
    fn inst_skips_unknown_and_placeholder_entries() {
        let raw = json!({
            "INST_VALUES": {
                "V_L1": {"value": 230.0},
                "V_L2": {},
                "V_L3": {"value": null},
                "I_L1": 3.2,
                "NOT_A_FIELD": {"value": 1.0}
            }
        });
        let out = SourceKind::Inst.extract(&raw).unwrap();
        assert_eq!(out.fields.get("V_L1"), Some(&FieldValue::F64(230.0)));
        assert_eq!(out.fields.len(), 1);
        assert_eq!(out.timestamp, None);
    }

    #[test]
    fn avg_stages_are_kept_apart() {
        let raw = json!({
            "AVERAGE_VALUES": {
                "STAGE1": {"TS": "2024-01-01T12:00:00", "P_SUM": {"value": 1500.5}},
                "STAGE2": {"TS": "2024-01-01T12:15:00", "P_SUM": {"value": 1400.0}}
            }
        });
        let avg1 = SourceKind::Avg1.extract(&raw).unwrap();
        let avg2 = SourceKind::Avg2.extract(&raw).unwrap();
        assert_eq!(avg1.fields.get("P_SUM"), Some(&FieldValue::F64(1500.5)));
        assert_eq!(avg1.timestamp, Some(local_unix("2024-01-01T12:00:00")));
        assert_eq!(avg2.fields.get("P_SUM"), Some(&FieldValue::F64(1400.0)));
        assert_eq!(avg2.timestamp, Some(local_unix("2024-01-01T12:15:00")));
    }

    #[test]
    fn counter_relabels_phases_and_skips_missing() {
        let raw = json!({
            "COUNTER": {
                "LOCAL_TIME": "2024-01-01T06:30:00",
                "ACTIVE_ENERGY": {
                    "IMPORT": {
                        "T1": {"L1": 1200, "L2": 1300, "total": 3800, "L3": null}
                    }
                }
            }
        });
        let out = SourceKind::Counter.extract(&raw).unwrap();
        let names: Vec<&str> = out.fields.iter().map(|(n, _)| *n).collect();
        assert_eq!(
            names,
            vec![
                "ACT_ENERGY_IMPORT_T1_L1",
                "ACT_ENERGY_IMPORT_T1_L2",
                "ACT_ENERGY_IMPORT_T1_TOTAL"
            ]
        );
        assert_eq!(
            out.fields.get("ACT_ENERGY_IMPORT_T1_TOTAL"),
            Some(&FieldValue::I64(3800))
        );
        assert_eq!(out.timestamp, Some(local_unix("2024-01-01T06:30:00")));
    }

    #[test]
    fn extreme_maps_no_fields() {
        let raw = json!({"EXTREME_VALUES": {"V_L1_MAX": {"value": 245.0}}});
        let out = SourceKind::Extreme.extract(&raw).unwrap();
        assert!(out.fields.is_empty());
        assert_eq!(out.timestamp, None);
    }

    #[test]
    fn malformed_timestamp_is_an_error() {
        let raw = json!({
            "INST_VALUES": {
                "LOCAL_TIME": "yesterday-ish",
                "V_L1": {"value": 230.0}
            }
        });
        let err = SourceKind::Inst.extract(&raw).unwrap_err();
        assert!(matches!(err, AppError::Time(_)));
    }

    #[test]
    fn timestamp_with_explicit_offset_is_honored() {
        assert_eq!(
            parse_local_time("2023-11-14T22:13:20+00:00").unwrap(),
            1700000000
        );
    }

    #[test]
    fn extraction_is_deterministic() {
        let raw = json!({
            "INST_VALUES": {
                "LOCAL_TIME": "2024-06-01T10:00:00",
                "V_L1": {"value": 231.2},
                "FREQ": {"value": 49.98}
            }
        });
        let first = SourceKind::Inst.extract(&raw).unwrap();
        let second = SourceKind::Inst.extract(&raw).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn empty_document_yields_empty_fieldset() {
        let out = SourceKind::Inst.extract(&json!({})).unwrap();
        assert!(out.fields.is_empty());
        assert_eq!(out.timestamp, None);
    }
}
