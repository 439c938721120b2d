//! Compatibility report: a read-only snapshot of a classified record.

use crate::diagnosis::classifier::Verdict;
use crate::diagnosis::record::{Anomaly, ObservationRecord};
use crate::sensors::ftms::CommandKind;
use crate::sensors::types::{Capability, RangeKind, SupportRange};
use crate::telemetry::decoder::FieldKind;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Report format version.
pub const REPORT_VERSION: &str = "1";

/// Serializable view of a finished session.
#[derive(Debug, Clone, Serialize)]
pub struct CompatibilityReport {
    pub device_name: String,
    pub device_address: String,
    pub connected: bool,
    pub protocol: String,
    pub supported_protocols: Vec<String>,
    pub capabilities: BTreeSet<Capability>,
    pub support_ranges: BTreeMap<RangeKind, SupportRange>,
    pub detected_fields: BTreeMap<FieldKind, f64>,
    pub command_results: BTreeMap<CommandKind, bool>,
    pub resistance_control: bool,
    pub sim_mode_support: bool,
    pub anomalies: Vec<Anomaly>,
    pub verdict: Option<Verdict>,
    pub reasons: Vec<String>,
    pub generated_at: DateTime<Utc>,
    pub report_version: String,
}

impl CompatibilityReport {
    /// Snapshot a record.
    pub fn from_record(record: &ObservationRecord) -> Self {
        let (device_name, device_address) = record
            .device
            .as_ref()
            .map(|d| (d.name.clone(), d.address.clone()))
            .unwrap_or_default();

        Self {
            device_name,
            device_address,
            connected: record.connected,
            protocol: record
                .protocol
                .map(|p| p.to_string())
                .unwrap_or_else(|| "Unknown".to_string()),
            supported_protocols: record
                .supported_protocols
                .iter()
                .map(|p| p.to_string())
                .collect(),
            capabilities: record.capabilities.clone(),
            support_ranges: record.support_ranges.clone(),
            detected_fields: record.detected_fields.clone(),
            command_results: record.command_results.clone(),
            resistance_control: record.resistance_control,
            sim_mode_support: record.sim_mode_support,
            anomalies: record.anomalies.clone(),
            verdict: record.verdict(),
            reasons: record.reasons.clone(),
            generated_at: Utc::now(),
            report_version: REPORT_VERSION.to_string(),
        }
    }

    /// Pretty-printed JSON.
    pub fn to_json(&self) -> Result<String, ReportError> {
        serde_json::to_string_pretty(self).map_err(|e| ReportError::SerializationFailed(e.to_string()))
    }

    /// Write the JSON report to `path`, creating parent directories.
    pub fn write_json(&self, path: &Path) -> Result<(), ReportError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ReportError::WriteFailed(e.to_string()))?;
        }

        let content = self.to_json()?;
        std::fs::write(path, content).map_err(|e| ReportError::WriteFailed(e.to_string()))?;

        tracing::info!(path = %path.display(), "Report written");
        Ok(())
    }

    /// Default file name: device name and timestamp.
    pub fn default_file_name(&self) -> PathBuf {
        let name: String = self
            .device_name
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect();
        let name = if name.is_empty() { "device".to_string() } else { name };
        PathBuf::from(format!(
            "{}_{}.json",
            name,
            self.generated_at.format("%Y%m%d_%H%M%S")
        ))
    }

    /// Console summary, one line per entry.
    pub fn summary_lines(&self) -> Vec<String> {
        let mut lines = vec![
            format!("Device: {} ({})", self.device_name, self.device_address),
            format!("Protocol: {}", self.protocol),
            format!(
                "Verdict: {}",
                self.verdict
                    .map(|v| v.to_string())
                    .unwrap_or_else(|| "not classified".to_string())
            ),
        ];

        lines.extend(self.reasons.iter().map(|r| format!("  - {r}")));

        if !self.detected_fields.is_empty() {
            let fields: Vec<String> = self
                .detected_fields
                .iter()
                .map(|(kind, value)| format!("{kind}={value}"))
                .collect();
            lines.push(format!("Fields: {}", fields.join(", ")));
        }

        for (range, limits) in &self.support_ranges {
            lines.push(format!(
                "Range {range}: {} - {} (step {})",
                limits.min, limits.max, limits.increment
            ));
        }

        for (command, ok) in &self.command_results {
            lines.push(format!("{command}: {}", if *ok { "OK" } else { "FAILED" }));
        }

        lines.push(format!(
            "Resistance control: {}, simulation mode: {}",
            self.resistance_control, self.sim_mode_support
        ));

        lines.extend(self.anomalies.iter().map(|a| format!("! {a}")));
        lines
    }
}

/// Report errors.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Serialization failed: {0}")]
    SerializationFailed(String),

    #[error("Write failed: {0}")]
    WriteFailed(String),
}
