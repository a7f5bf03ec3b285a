use chrono::{DateTime, NaiveDate, Utc};

use crate::board::TimelineEntry;
use crate::entities::task;

const ONGOING: &str = "Ongoing";

fn has_text(value: &str) -> bool {
    !value.trim().is_empty()
}

pub fn format_datetime(dt: DateTime<Utc>) -> String {
    dt.format("%Y-%m-%d %H:%M").to_string()
}

pub fn format_due(due: Option<NaiveDate>) -> String {
    due.map(|date| date.to_string())
        .unwrap_or_else(|| ONGOING.to_string())
}

/// Rounds to whole units and groups thousands: 1234567.8 -> "1,234,568".
pub fn format_amount(value: f64) -> String {
    let rounded = value.round();
    let negative = rounded < 0.0;
    let digits = format!("{:.0}", rounded.abs());
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    for (idx, ch) in digits.chars().enumerate() {
        if idx > 0 && (digits.len() - idx) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    if negative {
        format!("-{grouped}")
    } else {
        grouped
    }
}

pub fn format_percent(value: f64) -> String {
    format!("{value:.1}%")
}

fn push_notes(output: &mut String, heading: &str, text: &str) {
    output.push_str(&format!("{heading}:\n"));
    if has_text(text) {
        for line in text.lines() {
            output.push_str(&format!("  {line}\n"));
        }
    } else {
        output.push_str("  None\n");
    }
}

pub fn format_task_detail(task: &task::Model, timeline: &[TimelineEntry]) -> String {
    let mut output = String::new();
    output.push_str(&format!("Task ID: {}\n", task.id));
    output.push_str(&format!("Task Name: {}\n", task.task_name));
    output.push_str(&format!("Assigned Unit: {}\n", task.assigned_unit));
    output.push_str(&format!("Status: {}\n", task.status));
    output.push_str(&format!("Start Date: {}\n", task.start_date));
    output.push_str(&format!("Due Date: {}\n", format_due(task.due_date)));
    output.push_str(&format!(
        "Last Updated: {}\n",
        format_datetime(task.last_updated)
    ));
    output.push('\n');
    push_notes(&mut output, "Completed Activities", &task.completed_activities);
    push_notes(&mut output, "Pending Activities", &task.pending_activities);
    if has_text(&task.follow_up) {
        push_notes(&mut output, "Follow Up", &task.follow_up);
    }
    if !timeline.is_empty() {
        output.push_str("\nTimeline:\n");
        for entry in timeline {
            output.push_str(&format!(
                "- {} {} .. {} ({} days)\n",
                entry.label, entry.start_date, entry.end_date, entry.days
            ));
        }
    }
    output.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn amounts_group_thousands() {
        assert_eq!(format_amount(0.0), "0");
        assert_eq!(format_amount(999.4), "999");
        assert_eq!(format_amount(1000.0), "1,000");
        assert_eq!(format_amount(1234567.8), "1,234,568");
        assert_eq!(format_amount(-38670.0), "-38,670");
    }

    #[test]
    fn percent_has_one_decimal() {
        assert_eq!(format_percent(66.666), "66.7%");
        assert_eq!(format_percent(0.0), "0.0%");
    }

    #[test]
    fn detail_shows_none_for_empty_notes_and_ongoing_due() {
        let task = task::Model {
            id: 3,
            task_name: "Audit".to_string(),
            assigned_unit: "Finance".to_string(),
            start_date: NaiveDate::from_ymd_opt(2025, 1, 1).expect("date"),
            due_date: None,
            status: "In Progress".to_string(),
            completed_activities: "Scoping\nInterviews".to_string(),
            pending_activities: String::new(),
            follow_up: String::new(),
            last_updated: Utc::now(),
        };
        let detail = format_task_detail(&task, &[]);
        assert!(detail.contains("Due Date: Ongoing"));
        assert!(detail.contains("Completed Activities:\n  Scoping\n  Interviews"));
        assert!(detail.contains("Pending Activities:\n  None"));
        assert!(!detail.contains("Follow Up"));
        assert!(!detail.contains("Timeline"));
    }
}
