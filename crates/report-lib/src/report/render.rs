//! HTML and plain-text rendering of the utilization report

use super::ReportRow;
use crate::job::UtilizationReport;
use tabled::{settings::Style, Table, Tabled};

/// Escape text for inclusion in HTML element content or attributes
pub fn escape_html(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

fn summary_line(report: &UtilizationReport) -> String {
    format!(
        "{} of {} task families outside the {:.0}%-{:.0}% utilization band ({} to {}, clusters: {}).",
        report.table.len(),
        report.families_enumerated,
        report.band.lower * 100.0,
        report.band.upper * 100.0,
        report.window.start.format("%Y-%m-%d"),
        report.window.end.format("%Y-%m-%d"),
        if report.clusters.is_empty() {
            "none".to_string()
        } else {
            report.clusters.join(", ")
        },
    )
}

/// Render the report as an HTML document for email
pub fn render_html(report: &UtilizationReport) -> String {
    let mut html = String::new();

    html.push_str("<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n");
    html.push_str("<style>\n");
    html.push_str("table { border-collapse: collapse; font-family: Arial, sans-serif; font-size: 13px; }\n");
    html.push_str("th, td { border: 1px solid #999; padding: 4px 8px; text-align: right; }\n");
    html.push_str("th { background-color: #dde4ee; }\n");
    html.push_str("td:first-child, th:first-child { text-align: left; }\n");
    html.push_str("</style>\n</head>\n<body>\n");

    html.push_str("<h2>ECS Task Utilization Report</h2>\n");
    html.push_str(&format!("<p>{}</p>\n", escape_html(&summary_line(report))));

    if report.table.is_empty() {
        html.push_str("<p>No task families need attention this week.</p>\n");
    } else {
        html.push_str("<table>\n<thead>\n<tr>");
        for header in ReportRow::headers() {
            html.push_str(&format!("<th>{}</th>", escape_html(&header)));
        }
        html.push_str("</tr>\n</thead>\n<tbody>\n");

        for row in report.rows() {
            html.push_str("<tr>");
            for field in row.fields() {
                html.push_str(&format!("<td>{}</td>", escape_html(&field)));
            }
            html.push_str("</tr>\n");
        }
        html.push_str("</tbody>\n</table>\n");
    }

    if !report.skipped.is_empty() {
        html.push_str(&format!(
            "<p>{} family samples were excluded for incomplete or anomalous metrics.</p>\n",
            report.skipped.len()
        ));
    }

    html.push_str("</body>\n</html>\n");
    html
}

/// Render the report as a plain-text table
pub fn render_text(report: &UtilizationReport) -> String {
    let mut text = String::new();
    text.push_str("ECS Task Utilization Report\n\n");
    text.push_str(&summary_line(report));
    text.push_str("\n\n");

    let rows = report.rows();
    if rows.is_empty() {
        text.push_str("No task families need attention this week.\n");
    } else {
        text.push_str(&Table::new(&rows).with(Style::rounded()).to_string());
        text.push('\n');
    }
    text
}
