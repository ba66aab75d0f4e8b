//! Machine-readable change report

use serde::Serialize;
use serde_json::Value;

use crate::diff::{Event, EventOp};
use crate::output::Masker;
use crate::state::types::Kind;

#[derive(Debug, Serialize)]
pub struct ChangeEntry {
    pub kind: Kind,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new: Option<Value>,
}

#[derive(Debug, Default, Serialize)]
pub struct Summary {
    pub creating: u64,
    pub updating: u64,
    pub deleting: u64,
    pub total: u64,
}

/// The `--json` rendering of a plan.
#[derive(Debug, Default, Serialize)]
pub struct ChangeReport {
    pub creating: Vec<ChangeEntry>,
    pub updating: Vec<ChangeEntry>,
    pub deleting: Vec<ChangeEntry>,
    pub summary: Summary,
    pub warnings: Vec<String>,
}

impl ChangeReport {
    pub fn from_events(events: &[Event], masker: &Masker, warnings: Vec<String>) -> Self {
        let mut report = ChangeReport {
            warnings,
            ..Default::default()
        };
        for event in events {
            let entry = ChangeEntry {
                kind: event.kind,
                name: event.obj.natural_key(),
                old: event.old_obj.as_ref().map(|o| masker.mask_value(&o.to_value())),
                new: Some(masker.mask_value(&event.obj.to_value())),
            };
            match event.op {
                EventOp::Create => {
                    let entry = ChangeEntry { old: None, ..entry };
                    report.creating.push(entry);
                }
                EventOp::Update => report.updating.push(entry),
                EventOp::Delete => {
                    let entry = ChangeEntry {
                        old: entry.new,
                        new: None,
                        ..entry
                    };
                    report.deleting.push(entry);
                }
            }
        }
        report.summary = Summary {
            creating: report.creating.len() as u64,
            updating: report.updating.len() as u64,
            deleting: report.deleting.len() as u64,
            total: events.len() as u64,
        };
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::types::Service;

    #[test]
    fn test_report_sections_and_summary() {
        let create = Event {
            op: EventOp::Create,
            kind: Kind::Service,
            obj: Service {
                name: "web".to_string(),
                ..Default::default()
            }
            .into(),
            old_obj: None,
        };
        let delete = Event {
            op: EventOp::Delete,
            kind: Kind::Service,
            obj: Service {
                id: Some("s2".to_string()),
                name: "legacy".to_string(),
                ..Default::default()
            }
            .into(),
            old_obj: None,
        };

        let report = ChangeReport::from_events(
            &[create, delete],
            &Masker::disabled(),
            vec!["careful".to_string()],
        );
        assert_eq!(report.summary.creating, 1);
        assert_eq!(report.summary.deleting, 1);
        assert_eq!(report.summary.total, 2);
        assert!(report.creating[0].old.is_none());
        assert!(report.deleting[0].new.is_none());
        assert!(report.deleting[0].old.is_some());
        assert_eq!(report.warnings, vec!["careful".to_string()]);

        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["summary"]["total"], 2);
        assert_eq!(value["creating"][0]["kind"], "service");
    }
}
