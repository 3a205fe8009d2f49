use std::collections::HashMap;
use std::fmt;

use crate::models::{Report, Status};

pub const ALERT_SYMPTOMS: [&str; 2] = ["diarrhea", "fever"];
pub const HOTSPOT_THRESHOLD: u64 = 5;

pub const NO_ALERTS: &str = "No current alerts";
pub const NO_HOTSPOTS: &str = "No hotspots detected";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Kpis {
    pub total_reports: usize,
    pub active_cases: u64,
    pub water_issues: usize,
    pub solved_count: usize,
    pub response_rate: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alert {
    pub symptoms: Vec<String>,
    pub village: String,
    pub status: Status,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hotspot {
    pub village: String,
    pub active_cases: u64,
}

/// Everything the dashboard shows, derived from one snapshot of reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dashboard {
    pub kpis: Kpis,
    pub alerts: Vec<Alert>,
    pub hotspots: Vec<Hotspot>,
}

impl Dashboard {
    pub fn from_reports(reports: &[Report]) -> Self {
        Self {
            kpis: compute_kpis(reports),
            alerts: find_alerts(reports),
            hotspots: find_hotspots(reports),
        }
    }

    pub fn alert_lines(&self) -> Vec<String> {
        placeholder_or(&self.alerts, NO_ALERTS)
    }

    pub fn hotspot_lines(&self) -> Vec<String> {
        placeholder_or(&self.hotspots, NO_HOTSPOTS)
    }
}

fn placeholder_or<T: fmt::Display>(items: &[T], placeholder: &str) -> Vec<String> {
    if items.is_empty() {
        vec![placeholder.to_string()]
    } else {
        items.iter().map(ToString::to_string).collect()
    }
}

impl fmt::Display for Alert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "High {} cases reported in {} - Status: {}",
            self.symptoms.join(", "),
            self.village,
            self.status
        )
    }
}

impl fmt::Display for Hotspot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} - {} active cases (Priority: High)",
            self.village, self.active_cases
        )
    }
}

pub fn compute_kpis(reports: &[Report]) -> Kpis {
    let total_reports = reports.len();
    let active_cases = reports
        .iter()
        .filter(|r| r.status.is_active())
        .map(|r| u64::from(r.count))
        .sum();
    let water_issues = reports.iter().filter(|r| r.has_water_issue()).count();
    let solved_count = reports.iter().filter(|r| !r.status.is_active()).count();

    Kpis {
        total_reports,
        active_cases,
        water_issues,
        solved_count,
        response_rate: response_rate(solved_count, total_reports),
    }
}

pub fn response_rate(solved: usize, total: usize) -> u32 {
    if total == 0 {
        return 0;
    }
    ((solved as f64 / total as f64) * 100.0).round() as u32
}

pub fn find_alerts(reports: &[Report]) -> Vec<Alert> {
    reports
        .iter()
        .filter(|r| r.status.is_active())
        .filter_map(|r| {
            let symptoms: Vec<String> = r
                .symptom
                .iter()
                .filter(|s| ALERT_SYMPTOMS.contains(&s.as_str()))
                .cloned()
                .collect();
            if symptoms.is_empty() {
                return None;
            }
            Some(Alert {
                symptoms,
                village: r.village.clone(),
                status: r.status.clone(),
            })
        })
        .collect()
}

/// Villages whose active case count exceeds [`HOTSPOT_THRESHOLD`], in the
/// order each village first appears.
pub fn find_hotspots(reports: &[Report]) -> Vec<Hotspot> {
    let mut order: Vec<Hotspot> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();

    for report in reports.iter().filter(|r| r.status.is_active()) {
        let slot = *index.entry(report.village.as_str()).or_insert_with(|| {
            order.push(Hotspot {
                village: report.village.clone(),
                active_cases: 0,
            });
            order.len() - 1
        });
        order[slot].active_cases += u64::from(report.count);
    }

    order
        .into_iter()
        .filter(|h| h.active_cases > HOTSPOT_THRESHOLD)
        .collect()
}

/// Reports in display order, newest first, paired with their display position.
pub fn newest_first(reports: &[Report]) -> impl Iterator<Item = (usize, &Report)> {
    reports.iter().rev().enumerate()
}
