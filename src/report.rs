use std::fmt::Write;

use chrono::{DateTime, Local};

use crate::aggregate::{self, Dashboard};
use crate::models::Report;

const RECENT_LIMIT: usize = 5;

pub fn format_timestamp(report: &Report) -> String {
    report
        .created_at()
        .map(|t| DateTime::<Local>::from(t).format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "unknown time".to_string())
}

/// One line of the report list: village, symptoms, people and status icon.
pub fn format_entry(report: &Report) -> String {
    format!(
        "{} ({}) - {} people {}",
        report.village,
        report.symptom.join(", "),
        report.count,
        report.status.class().icon()
    )
}

pub fn render_list(reports: &[Report]) -> String {
    let mut output = String::new();

    if reports.is_empty() {
        let _ = writeln!(output, "No reports submitted yet.");
        return output;
    }

    for (index, report) in aggregate::newest_first(reports) {
        let _ = writeln!(output, "[{index}] {}", format_entry(report));
        let _ = writeln!(
            output,
            "    {} | status: {} ({}) | id: {}",
            format_timestamp(report),
            report.status,
            report.status.class().color(),
            report.id
        );
    }

    output
}

pub fn render_dashboard(dashboard: &Dashboard) -> String {
    let kpis = &dashboard.kpis;
    let mut output = String::new();

    let _ = writeln!(output, "Total reports:  {}", kpis.total_reports);
    let _ = writeln!(output, "Active cases:   {}", kpis.active_cases);
    let _ = writeln!(output, "Water issues:   {}", kpis.water_issues);
    let _ = writeln!(
        output,
        "Response rate:  {}% ({} solved)",
        kpis.response_rate, kpis.solved_count
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "Alerts:");
    for line in dashboard.alert_lines() {
        let _ = writeln!(output, "  - {line}");
    }
    let _ = writeln!(output);
    let _ = writeln!(output, "Hotspots:");
    for line in dashboard.hotspot_lines() {
        let _ = writeln!(output, "  - {line}");
    }

    output
}

pub fn build_report(slot: &str, reports: &[Report]) -> String {
    let dashboard = Dashboard::from_reports(reports);
    let kpis = &dashboard.kpis;
    let mut output = String::new();

    let _ = writeln!(output, "# Community Health Report");
    let _ = writeln!(
        output,
        "Generated {} from {}",
        Local::now().format("%Y-%m-%d %H:%M"),
        slot
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Key Figures");
    let _ = writeln!(output, "| Metric | Value |");
    let _ = writeln!(output, "| --- | --- |");
    let _ = writeln!(output, "| Total reports | {} |", kpis.total_reports);
    let _ = writeln!(output, "| Active cases | {} |", kpis.active_cases);
    let _ = writeln!(output, "| Water issues | {} |", kpis.water_issues);
    let _ = writeln!(output, "| Response rate | {}% |", kpis.response_rate);

    let _ = writeln!(output);
    let _ = writeln!(output, "## Alerts");
    for line in dashboard.alert_lines() {
        let _ = writeln!(output, "- {line}");
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Hotspots");
    for line in dashboard.hotspot_lines() {
        let _ = writeln!(output, "- {line}");
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Recent Reports");

    if reports.is_empty() {
        let _ = writeln!(output, "No reports submitted yet.");
    } else {
        for (_, report) in aggregate::newest_first(reports).take(RECENT_LIMIT) {
            let _ = writeln!(
                output,
                "- {} on {} ({})",
                format_entry(report),
                format_timestamp(report),
                report.status
            );
            if !report.comments.is_empty() {
                let _ = writeln!(output, "  > {}", report.comments);
            }
        }
    }

    output
}
