//! Filtering, statistics and bulk deletion over past detections.
//!
//! The store only hands out the full record list; everything here runs in
//! memory on that list.

use std::collections::BTreeMap;

use time::Date;

use crate::core::db::{DetectionRecord, RecordRepository};
use crate::models::Severity;

#[derive(Debug, Clone, Default)]
pub struct HistoryFilter {
    /// First day to include (UTC)
    pub from: Option<Date>,
    /// Last day to include (UTC)
    pub to: Option<Date>,
    pub severity: Option<Severity>,
    /// Case-insensitive substring of the patient name
    pub name_contains: Option<String>,
}

impl HistoryFilter {
    pub fn matches(&self, record: &DetectionRecord) -> bool {
        if self.from.is_some() || self.to.is_some() {
            // Records without a timestamp cannot satisfy a date range
            let Some(day) = record.detection_time.map(|t| t.date()) else {
                return false;
            };
            if self.from.is_some_and(|from| day < from) || self.to.is_some_and(|to| day > to) {
                return false;
            }
        }

        if let Some(severity) = self.severity {
            if record.severity != Some(severity) {
                return false;
            }
        }

        if let Some(needle) = &self.name_contains {
            let needle = needle.to_lowercase();
            if !record.patient_name.to_lowercase().contains(&needle) {
                return false;
            }
        }

        true
    }

    /// Keep matching records, preserving their order.
    pub fn apply<'a>(&self, records: &'a [DetectionRecord]) -> Vec<&'a DetectionRecord> {
        records.iter().filter(|r| self.matches(r)).collect()
    }
}

/// Earliest and latest detection day in a record list.
pub fn date_bounds(records: &[DetectionRecord]) -> Option<(Date, Date)> {
    let mut days = records.iter().filter_map(|r| r.detection_time.map(|t| t.date()));
    let first = days.next()?;
    Some(days.fold((first, first), |(lo, hi), d| (lo.min(d), hi.max(d))))
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct HistoryStats {
    pub total: usize,
    pub average_tumor_count: f64,
    pub high_severity: usize,
    pub by_severity: BTreeMap<Severity, usize>,
    /// Detections per `YYYY-MM`
    pub by_month: BTreeMap<String, usize>,
}

impl HistoryStats {
    pub fn compute<'a, I>(records: I) -> Self
    where
        I: IntoIterator<Item = &'a DetectionRecord>,
    {
        let mut stats = HistoryStats::default();
        let mut tumor_total = 0usize;

        for record in records {
            stats.total += 1;
            tumor_total += record.tumor_count();

            if let Some(severity) = record.severity {
                *stats.by_severity.entry(severity).or_default() += 1;
            }
            if let Some(time) = record.detection_time {
                let month = format!("{:04}-{:02}", time.year(), u8::from(time.month()));
                *stats.by_month.entry(month).or_default() += 1;
            }
        }

        stats.high_severity = stats.by_severity.get(&Severity::High).copied().unwrap_or(0);
        if stats.total > 0 {
            stats.average_tumor_count = tumor_total as f64 / stats.total as f64;
        }
        stats
    }
}

/// First half of the two-step "clear all history" action.
///
/// Holding a request does nothing; records are only removed once it is
/// explicitly confirmed.
#[derive(Debug)]
#[must_use = "history is only cleared when the request is confirmed"]
pub struct ClearRequest {
    _guard: (),
}

impl ClearRequest {
    pub const WARNING: &'static str = "Are you sure? This action cannot be undone.";

    pub fn new() -> Self {
        Self { _guard: () }
    }

    /// Delete every record. Returns how many were removed.
    pub async fn confirm<R: RecordRepository>(self, store: &R) -> anyhow::Result<u64> {
        store.clear_all().await
    }

    /// Back out without touching the store.
    pub fn cancel(self) {}
}

impl Default for ClearRequest {
    fn default() -> Self {
        Self::new()
    }
}
