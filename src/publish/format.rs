//! Markdown rendering of a period report for chat

use super::report::{MetricLine, PeriodReport};

/// Metrics shown in the chat block, in display order, with their labels
const DISPLAY: &[(&str, &str)] = &[
    ("attendance_930", "9:30"),
    ("attendance_1100", "11:00"),
    ("attendance_1630", "4:30"),
    ("total_attendance", "Total"),
    ("email_count", "Emails"),
    ("avg_open_rate", "Open rate"),
    ("avg_click_rate", "Click rate"),
    ("total_views", "Views"),
    ("avg_watch_duration", "Avg watch (s)"),
    ("net_subscribers", "Net subscribers"),
    ("livestream_count", "Streams"),
    ("number_of_groups", "Groups"),
    ("total_groups_attendance", "In groups"),
    ("group_leaders", "Leaders"),
    ("coaches", "Coaches"),
    ("tasks_closed", "Closed"),
];

/// Metrics that carry a YoY suffix
const YOY_METRICS: &[&str] = &[
    "total_attendance",
    "total_views",
    "number_of_groups",
    "tasks_closed",
];

fn source_label(source: &str) -> &str {
    match source {
        "attendance" => "Attendance",
        "mailchimp" => "Email",
        "checkins" => "Check-ins",
        "groups" => "Groups",
        "youtube" => "YouTube",
        "livestreams" => "Livestreams",
        "clickup" => "Tasks",
        other => other,
    }
}

/// Integer with thousands separators, or two decimals for fractional values
pub fn format_number(value: f64) -> String {
    if value.fract() != 0.0 {
        return format!("{:.2}", value);
    }

    let digits = format!("{}", value.abs() as i64);
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    if value < 0.0 {
        out.insert(0, '-');
    }
    out
}

fn format_metric(line: &MetricLine, label: &str) -> String {
    let value = if line.metric_name.ends_with("_rate") {
        format!("{}%", format_number(line.value))
    } else {
        format_number(line.value)
    };

    match line.yoy_percent {
        Some(yoy) if YOY_METRICS.contains(&line.metric_name.as_str()) => {
            format!("{} = {} ({:+.1}% YoY)", label, value, yoy)
        }
        _ => format!("{} = {}", label, value),
    }
}

/// Render the chat message for `report`
pub fn render(report: &PeriodReport, dashboard_url: Option<&str>) -> String {
    let header = format!(
        "📊 *Snapshot for* week of {} - {}",
        report.period.start.format("%b %d"),
        report.period.end.format("%b %d, %Y")
    );

    let mut lines = Vec::new();
    for section in &report.sections {
        let parts: Vec<String> = DISPLAY
            .iter()
            .filter_map(|(name, label)| {
                section
                    .metrics
                    .iter()
                    .find(|m| m.metric_name == *name)
                    .map(|m| format_metric(m, label))
            })
            .collect();
        if parts.is_empty() {
            continue;
        }
        lines.push(format!(
            "- *{}: {}*: {}",
            source_label(&section.source),
            section.dimension,
            parts.join(", ")
        ));
    }

    let mut out = header;
    if !lines.is_empty() {
        out.push('\n');
        out.push_str(&lines.join("\n"));
    }
    if let Some(url) = dashboard_url {
        out.push_str(&format!("\n\n🔗 Full dashboard: {}", url));
    }
    out
}
