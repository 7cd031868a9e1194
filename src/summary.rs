use crate::models::Device;
use crate::period::{format_interval, TimePeriod};
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Label used for the long tail of rare device types.
pub const OTHER_TYPE: &str = "Other";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeCount {
    pub kind: String,
    pub count: usize,
}

/// Counts devices per type, largest first. Types below 1% of the total are
/// folded into a single [`OTHER_TYPE`] entry.
pub fn type_breakdown<'a>(devices: impl IntoIterator<Item = &'a Device>) -> Vec<TypeCount> {
    let mut counts: Vec<TypeCount> = Vec::new();
    let mut total = 0usize;
    for device in devices {
        total += 1;
        match counts.iter_mut().find(|entry| entry.kind == device.kind) {
            Some(entry) => entry.count += 1,
            None => counts.push(TypeCount {
                kind: device.kind.clone(),
                count: 1,
            }),
        }
    }
    counts.sort_by(|a, b| b.count.cmp(&a.count));

    let rare = |entry: &TypeCount| (entry.count as f64) < 0.01 * total as f64;
    if let Some(first_rare) = counts.iter().position(rare) {
        let other: usize = counts[first_rare..].iter().map(|entry| entry.count).sum();
        counts.truncate(first_rare);
        counts.push(TypeCount {
            kind: OTHER_TYPE.to_string(),
            count: other,
        });
    }
    counts
}

/// Case-insensitive match against the fields shown on a device card.
pub fn matches_query(device: &Device, query: &str) -> bool {
    let query = query.trim().to_lowercase();
    if query.is_empty() {
        return true;
    }
    [
        &device.name,
        &device.ip,
        &device.mac,
        &device.hostname,
        &device.vendor,
        &device.kind,
    ]
    .iter()
    .any(|field| field.to_lowercase().contains(&query))
}

pub fn filter_devices<'a>(devices: &'a [Device], query: &str) -> Vec<&'a Device> {
    devices
        .iter()
        .filter(|device| matches_query(device, query))
        .collect()
}

/// Where the scan service is in its cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanProgress {
    /// Share of the interval elapsed since the last scan, in `0.0..=1.0`.
    pub fraction: f32,
    pub next_scan: DateTime<Utc>,
    pub overdue: bool,
}

impl ScanProgress {
    pub fn new(last_scan: DateTime<Utc>, interval: Duration, now: DateTime<Utc>) -> Self {
        let interval = chrono::Duration::from_std(interval).unwrap_or(chrono::Duration::zero());
        let next_scan = last_scan + interval;
        let elapsed = (now - last_scan).num_milliseconds().max(0) as f64;
        let fraction = match interval.num_milliseconds() {
            0 => 1.0,
            total => (elapsed / total as f64).clamp(0.0, 1.0) as f32,
        };
        Self {
            fraction,
            next_scan,
            overdue: next_scan <= now,
        }
    }

    pub fn label(&self, now: DateTime<Utc>) -> String {
        if self.overdue {
            return "Waiting for scan results".to_string();
        }
        let remaining = (self.next_scan - now).num_seconds();
        match format_interval(TimePeriod::Day, remaining) {
            Ok(text) => format!("Next scan occurs in {text}"),
            Err(_) => "Next scan pending".to_string(),
        }
    }
}
