//! Encodings of the durable resolution log.
//!
//! The structured-text form is the only one import accepts. A compressed
//! export is gzip behind a `data:` prefix, or the run-length form when gzip
//! fails; [`decompress`] turns either back into structured text.

use std::collections::BTreeMap;
use std::io::{Read, Write};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, SecondsFormat, Utc};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::error::EngineError;
use crate::history::ResolutionSession;
use crate::resolve::ResolutionStrategy;

pub const EXPORT_VERSION: &str = "1.0";
pub const GZIP_DATA_PREFIX: &str = "data:application/gzip;base64,";
pub const CSV_HEADER: &str = "Session ID,Start Time,End Time,Total Steps,Conflicts Resolved,Success Rate,Applied Strategies,Average Confidence";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Json,
    Csv,
    Compressed,
}

impl ExportFormat {
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Json => "application/json",
            Self::Csv => "text/csv",
            Self::Compressed => "application/octet-stream",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedHistory {
    pub format: ExportFormat,
    pub data: String,
}

impl ExportedHistory {
    pub fn mime_type(&self) -> &'static str {
        self.format.mime_type()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategyUsage {
    pub strategy_id: ResolutionStrategy,
    pub count: usize,
    pub success_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportMetadata {
    pub total_sessions: usize,
    /// Mean of the per-session success rates.
    pub success_rate: f64,
    pub most_used_strategies: Vec<StrategyUsage>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportDocument {
    pub version: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp: u64,
    pub sessions: Vec<ResolutionSession>,
    pub metadata: ExportMetadata,
}

impl ExportDocument {
    pub fn new(sessions: Vec<ResolutionSession>, timestamp: u64) -> Self {
        let metadata = ExportMetadata {
            total_sessions: sessions.len(),
            success_rate: mean(sessions.iter().map(|s| s.summary.success_rate)),
            most_used_strategies: strategy_usage(&sessions),
        };
        Self {
            version: EXPORT_VERSION.to_string(),
            timestamp,
            sessions,
            metadata,
        }
    }
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, n) = values.fold((0.0, 0usize), |(sum, n), v| (sum + v, n + 1));
    if n == 0 { 0.0 } else { sum / n as f64 }
}

/// Step counts per strategy, most used first. A use succeeds when its step
/// resolved at least one conflict.
fn strategy_usage(sessions: &[ResolutionSession]) -> Vec<StrategyUsage> {
    let mut counts: BTreeMap<ResolutionStrategy, (usize, usize)> = BTreeMap::new();
    for step in sessions.iter().flat_map(|s| &s.steps) {
        let entry = counts.entry(step.strategy).or_default();
        entry.0 += 1;
        if !step.resolved_conflicts.is_empty() {
            entry.1 += 1;
        }
    }
    let mut usage: Vec<_> = counts
        .into_iter()
        .map(|(strategy_id, (count, successes))| StrategyUsage {
            strategy_id,
            count,
            success_rate: successes as f64 / count as f64,
        })
        .collect();
    usage.sort_by(|a, b| b.count.cmp(&a.count));
    usage
}

pub fn encode(document: &ExportDocument, format: ExportFormat) -> Result<ExportedHistory, EngineError> {
    let data = match format {
        ExportFormat::Json => serde_json::to_string_pretty(document)?,
        ExportFormat::Csv => to_csv(&document.sessions),
        ExportFormat::Compressed => compress(&serde_json::to_string_pretty(document)?),
    };
    Ok(ExportedHistory { format, data })
}

fn iso_millis(ms: u64) -> String {
    i64::try_from(ms)
        .ok()
        .and_then(DateTime::<Utc>::from_timestamp_millis)
        .map(|t| t.to_rfc3339_opts(SecondsFormat::Millis, true))
        .unwrap_or_default()
}

/// Header plus one row per session.
pub fn to_csv(sessions: &[ResolutionSession]) -> String {
    let mut lines = vec![CSV_HEADER.to_string()];
    for session in sessions {
        let strategies: Vec<&str> = session.steps.iter().map(|s| s.strategy.id()).collect();
        lines.push(format!(
            "{},{},{},{},{},{:.2},\"{}\",{:.2}",
            session.id,
            iso_millis(session.start_time),
            session.end_time.map(iso_millis).unwrap_or_default(),
            session.steps.len(),
            session.summary.total_conflicts_resolved,
            session.summary.success_rate,
            strategies.join(";"),
            session.summary.average_confidence,
        ));
    }
    lines.join("\n")
}

/// Gzip + base64 behind [`GZIP_DATA_PREFIX`]; run-length + base64 if gzip fails.
pub fn compress(text: &str) -> String {
    match gzip(text.as_bytes()) {
        Ok(bytes) => format!("{GZIP_DATA_PREFIX}{}", STANDARD.encode(bytes)),
        Err(e) => {
            warn!(error = %e, "gzip failed, falling back to run-length encoding");
            run_length_encode(text)
        }
    }
}

fn gzip(bytes: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(bytes)?;
    encoder.finish()
}

pub fn decompress(data: &str) -> Result<String, EngineError> {
    match data.strip_prefix(GZIP_DATA_PREFIX) {
        Some(armored) => {
            let bytes = STANDARD
                .decode(armored)
                .map_err(|e| EngineError::Decode(format!("base64: {e}")))?;
            let mut text = String::new();
            GzDecoder::new(bytes.as_slice())
                .read_to_string(&mut text)
                .map_err(|e| EngineError::Decode(format!("gzip: {e}")))?;
            Ok(text)
        }
        None => run_length_decode(data),
    }
}

/// `(count, byte)` pairs with runs capped at 255, base64 armored.
pub fn run_length_encode(text: &str) -> String {
    let mut out = Vec::new();
    let mut bytes = text.bytes().peekable();
    while let Some(byte) = bytes.next() {
        let mut run: u8 = 1;
        while run < u8::MAX && bytes.peek() == Some(&byte) {
            bytes.next();
            run += 1;
        }
        out.push(run);
        out.push(byte);
    }
    STANDARD.encode(out)
}

pub fn run_length_decode(data: &str) -> Result<String, EngineError> {
    let pairs = STANDARD
        .decode(data.trim())
        .map_err(|e| EngineError::Decode(format!("base64: {e}")))?;
    if pairs.len() % 2 != 0 {
        return Err(EngineError::Decode("run-length data has odd length".to_string()));
    }
    let mut bytes = Vec::new();
    for pair in pairs.chunks_exact(2) {
        bytes.extend(std::iter::repeat_n(pair[1], usize::from(pair[0])));
    }
    String::from_utf8(bytes).map_err(|e| EngineError::Decode(format!("utf-8: {e}")))
}

/// Parse structured text into a document, checking the shape first so a
/// rejection names the missing piece.
pub fn parse_document(data: &str) -> Result<ExportDocument, EngineError> {
    let value: Value = serde_json::from_str(data).map_err(|e| EngineError::Decode(e.to_string()))?;
    check_shape(&value).map_err(EngineError::InvalidImport)?;
    serde_json::from_value(value).map_err(|e| EngineError::InvalidImport(e.to_string()))
}

fn check_shape(value: &Value) -> Result<(), String> {
    let root = value.as_object().ok_or("document is not an object")?;
    for field in ["version", "timestamp", "sessions"] {
        if root.get(field).is_none_or(Value::is_null) {
            return Err(format!("missing field `{field}`"));
        }
    }
    let sessions = root
        .get("sessions")
        .and_then(Value::as_array)
        .ok_or("`sessions` is not an array")?;
    for (i, session) in sessions.iter().enumerate() {
        let session = session
            .as_object()
            .ok_or_else(|| format!("session {i} is not an object"))?;
        for field in ["id", "startTime", "summary"] {
            if session.get(field).is_none_or(Value::is_null) {
                return Err(format!("session {i}: missing field `{field}`"));
            }
        }
        if !session.get("steps").is_some_and(Value::is_array) {
            return Err(format!("session {i}: `steps` is not an array"));
        }
    }
    Ok(())
}
