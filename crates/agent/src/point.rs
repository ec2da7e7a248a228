// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! [`Point`]: the universal telemetry record. Immutable once constructed.

use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::value::Value;

/// Timestamps at or below this threshold are interpreted as Unix seconds and
/// rescaled to milliseconds. A timestamp of exactly `10^12` is milliseconds,
/// not seconds (see spec boundary case).
const SECONDS_THRESHOLD: i64 = 1_000_000_000_000;

/// An immutable telemetry record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub metric: String,
    pub value: Value,
    pub timestamp_ms: i64,
    pub source_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

/// Maximum tags entries (§3 Data model invariant).
pub const MAX_TAGS: usize = 32;
/// Maximum metric name length in bytes (§3 Data model invariant).
pub const MAX_METRIC_BYTES: usize = 255;

impl Point {
    /// Construct a Point, normalizing the timestamp and clamping tags to the
    /// documented cap. `timestamp_ms` here is the *raw* value as supplied by
    /// the caller (may be seconds or milliseconds, see [`normalize_ts_ms`]).
    pub fn new(
        metric: impl Into<String>,
        value: impl Into<Value>,
        timestamp_raw: i64,
        source_id: impl Into<String>,
    ) -> Self {
        let mut metric = metric.into();
        if metric.len() > MAX_METRIC_BYTES {
            metric.truncate(MAX_METRIC_BYTES);
        }
        Point {
            metric,
            value: value.into(),
            timestamp_ms: normalize_ts_ms(timestamp_raw),
            source_id: source_id.into(),
            tags: None,
            session_id: None,
        }
    }

    /// Construct a Point stamped with the current wall-clock time.
    pub fn now(metric: impl Into<String>, value: impl Into<Value>, source_id: impl Into<String>) -> Self {
        Self::new(metric, value, current_millis(), source_id)
    }

    pub fn with_tags(mut self, tags: BTreeMap<String, String>) -> Self {
        let mut tags = tags;
        if tags.len() > MAX_TAGS {
            // Deterministic truncation: BTreeMap is sorted by key, so this
            // drops the lexicographically-last entries.
            let keep: Vec<String> = tags.keys().take(MAX_TAGS).cloned().collect();
            tags.retain(|k, _| keep.contains(k));
        }
        self.tags = Some(tags);
        self
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }
}

/// Normalize a raw timestamp to integer milliseconds.
///
/// Values `<= 10^12` are interpreted as Unix seconds and rescaled; this means
/// a timestamp of exactly `10^12` is treated as milliseconds (it is *not*
/// `<=` the threshold... see boundary note below).
pub fn normalize_ts_ms(raw: i64) -> i64 {
    // Spec boundary case: exactly 10^12 must be treated as milliseconds, so
    // the seconds branch is strictly-less-than, not less-than-or-equal.
    if raw != 0 && raw.abs() < SECONDS_THRESHOLD {
        raw.saturating_mul(1000)
    } else {
        raw
    }
}

pub fn current_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
#[path = "point_tests.rs"]
mod tests;
