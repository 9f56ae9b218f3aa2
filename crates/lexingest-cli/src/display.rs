//! Terminal rendering for the status dashboard and the missing-court report.

use comfy_table::presets::UTF8_FULL_CONDENSED;
use comfy_table::{Cell, Color, ContentArrangement, Table};
use lexingest_core::RunStatus;
use lexingest_run::{CourtRecord, MissingCourt, SourceHealth, StatusReport, format_duration};

const HEADERS: [&str; 9] = [
    "Provider", "Command", "Last Run", "Duration", "Status", "Created", "Skipped", "Errors",
    "Stale",
];

pub fn status_table(report: &StatusReport) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(HEADERS.iter().map(|h| Cell::new(h).fg(Color::Cyan)));
    for source in &report.sources {
        table.add_row(row(source));
    }
    table
}

fn row(source: &SourceHealth) -> Vec<Cell> {
    let stale = if source.stale {
        Cell::new("YES").fg(Color::Red)
    } else {
        Cell::new("")
    };
    let Some(run) = &source.last_run else {
        return vec![
            Cell::new(&source.provider),
            Cell::new(&source.command),
            Cell::new("(never)"),
            Cell::new("-"),
            Cell::new("-"),
            Cell::new("-"),
            Cell::new("-"),
            Cell::new("-"),
            stale,
        ];
    };
    let status_color = match run.status {
        RunStatus::Ok => Color::Green,
        RunStatus::Partial => Color::Yellow,
        RunStatus::Error => Color::Red,
    };
    vec![
        Cell::new(&source.provider),
        Cell::new(&source.command),
        Cell::new(run.finished_at.format("%Y-%m-%d %H:%M")),
        Cell::new(format_duration(run.duration_seconds)),
        Cell::new(run.status.as_str()).fg(status_color),
        Cell::new(run.created),
        Cell::new(run.skipped),
        Cell::new(run.errors),
        stale,
    ]
}

/// One line under the table, e.g. `2/3 monitored sources healthy (stale after 72h)`.
pub fn summary(report: &StatusReport) -> String {
    let healthy = report.monitored().filter(|s| s.is_healthy()).count();
    format!(
        "{healthy}/{} monitored sources healthy (stale after {}h)",
        report.monitored().count(),
        report.stale_hours
    )
}

fn or_unknown(s: &str) -> &str {
    if s.is_empty() { "?" } else { s }
}

fn court_line(court: &CourtRecord) -> String {
    format!(
        "      - {} [{}] type={}",
        or_unknown(&court.name),
        or_unknown(&court.code),
        or_unknown(&court.court_type)
    )
}

/// Grouped, human-readable report of unresolved court names.
pub fn missing_courts_report(analyses: &[MissingCourt]) -> String {
    let total: u64 = analyses.iter().map(|a| a.count).sum();
    let mut lines = vec![
        format!(
            "Missing Courts Analysis: {} unique court name(s) from {total} error(s)",
            analyses.len()
        ),
        "=".repeat(80),
    ];

    let mut groups: Vec<(&str, Vec<&MissingCourt>)> = Vec::new();
    for analysis in analyses {
        let location = if analysis.location.is_empty() {
            "(unknown)"
        } else {
            analysis.location.as_str()
        };
        match groups.iter_mut().find(|(l, _)| *l == location) {
            Some((_, group)) => group.push(analysis),
            None => groups.push((location, vec![analysis])),
        }
    }

    for (location, group) in groups {
        lines.push(String::new());
        lines.push(format!("--- Location: {location} ---"));
        for a in group {
            lines.push(String::new());
            lines.push(format!("  MISSING: {}  (x{})", a.name, a.count));

            let mut parts = Vec::new();
            if let Some(code) = a.type_code {
                parts.push(format!("Type: {code} ({})", a.type_label));
            }
            if !a.location.is_empty() {
                parts.push(format!("Location: {}", a.location));
            }
            if !parts.is_empty() {
                lines.push(format!("    {}", parts.join(" | ")));
            }

            if !a.city_courts.is_empty() {
                lines.push("    Existing courts at this location:".into());
                lines.extend(a.city_courts.iter().map(court_line));
            } else if !a.state_courts.is_empty() {
                lines.push("    Existing courts in this state:".into());
                lines.extend(a.state_courts.iter().map(court_line));
            } else {
                lines.push("    No matching existing courts found.".into());
            }
        }
    }
    lines.join("\n")
}

/// Tab-separated rows with a header, one per unresolved name.
pub fn missing_courts_tsv(analyses: &[MissingCourt]) -> String {
    let names = |courts: &[CourtRecord]| {
        courts
            .iter()
            .map(|c| c.name.as_str())
            .collect::<Vec<_>>()
            .join("; ")
    };
    let mut rows =
        vec!["name\tcount\ttype_code\ttype_label\tlocation\tcity_matches\tstate_matches".to_string()];
    for a in analyses {
        rows.push(
            [
                a.name.clone(),
                a.count.to_string(),
                a.type_code.unwrap_or_default().to_string(),
                a.type_label.to_string(),
                a.location.clone(),
                names(&a.city_courts),
                names(&a.state_courts),
            ]
            .join("\t"),
        );
    }
    rows.join("\n")
}
