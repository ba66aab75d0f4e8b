//! Human-readable plan rendering

use colored::Colorize;
use serde_json::Value;
use similar::{ChangeTag, TextDiff};

use crate::diff::{Event, EventOp};
use crate::output::Masker;
use crate::solver::StatsSnapshot;

fn pretty(value: &Value, masker: &Masker) -> String {
    serde_json::to_string_pretty(&masker.mask_value(value)).unwrap_or_default()
}

fn indent(text: &str) -> String {
    text.lines()
        .map(|line| format!("  {}", line))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Line-level diff between the old and new JSON renderings.
fn line_diff(old: &str, new: &str) -> String {
    let diff = TextDiff::from_lines(old, new);
    let mut out = String::new();
    for change in diff.iter_all_changes() {
        let line = change.value().trim_end_matches('\n');
        let rendered = match change.tag() {
            ChangeTag::Delete => format!("-{}", line).red().to_string(),
            ChangeTag::Insert => format!("+{}", line).green().to_string(),
            ChangeTag::Equal => format!(" {}", line),
        };
        out.push_str(&rendered);
        out.push('\n');
    }
    out
}

/// One event as plan text: creates show the full body, updates a line diff,
/// deletes just the headline.
pub fn render_event(event: &Event, masker: &Masker) -> String {
    let name = event.obj.display_name();
    match event.op {
        EventOp::Create => {
            let body = pretty(&event.obj.to_value(), masker);
            format!("{} {}\n{}\n", "creating".green().bold(), name, indent(&body))
        }
        EventOp::Update => {
            let old = event
                .old_obj
                .as_ref()
                .map(|o| pretty(&o.to_value(), masker))
                .unwrap_or_default();
            let new = pretty(&event.obj.to_value(), masker);
            format!(
                "{} {}\n{}",
                "updating".yellow().bold(),
                name,
                indent(&line_diff(&old, &new))
            )
        }
        EventOp::Delete => format!("{} {}\n", "deleting".red().bold(), name),
    }
}

pub fn render_plan(events: &[Event], masker: &Masker) -> String {
    if events.is_empty() {
        return "no changes\n".to_string();
    }
    events
        .iter()
        .map(|event| render_event(event, masker))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn render_summary(stats: &StatsSnapshot) -> String {
    format!(
        "Summary:\n  created: {}\n  updated: {}\n  deleted: {}\n",
        stats.creates, stats.updates, stats.deletes
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::types::{Kind, Service};

    fn no_color() {
        colored::control::set_override(false);
    }

    #[test]
    fn test_update_renders_changed_lines() {
        no_color();
        let old = Service {
            name: "web".to_string(),
            port: Some(80),
            ..Default::default()
        };
        let new = Service {
            name: "web".to_string(),
            port: Some(443),
            ..Default::default()
        };
        let event = Event {
            op: EventOp::Update,
            kind: Kind::Service,
            obj: new.into(),
            old_obj: Some(old.into()),
        };
        let rendered = render_event(&event, &Masker::disabled());
        assert!(rendered.contains("updating service 'web'"));
        assert!(rendered.contains("-"));
        assert!(rendered.contains("443"));
        assert!(rendered.contains("80"));
    }

    #[test]
    fn test_empty_plan() {
        no_color();
        assert_eq!(render_plan(&[], &Masker::disabled()), "no changes\n");
    }

    #[test]
    fn test_create_masks_secrets() {
        no_color();
        let event = Event {
            op: EventOp::Create,
            kind: Kind::Service,
            obj: Service {
                name: "web".to_string(),
                host: Some("hunter2.example".to_string()),
                ..Default::default()
            }
            .into(),
            old_obj: None,
        };
        let masker = Masker::with_secrets(vec!["hunter2".to_string()]);
        let rendered = render_event(&event, &masker);
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("[masked]"));
    }
}
