//! Workflow states and actions, and the business service built from them

use serde_json::{json, Map, Value};

use crate::core::record::{MasterRecord, RecordKind};
use crate::core::workbook::{Sheet, WorkbookError};
use crate::reader::{split_list, ParsedSheet};

pub const STATES_SHEET: &str = "Workflow_States";
pub const ACTIONS_SHEET: &str = "Workflow_Actions";

pub const COL_STATE_CODE: &str = "State Code";
pub const COL_START: &str = "Is Start State";
pub const COL_END: &str = "Is End State";

pub const DEFAULT_BUSINESS: &str = "pgr-services";

/// Overall business-service SLA: five days
pub const BUSINESS_SERVICE_SLA_MS: i64 = 432_000_000;

const DAY_MS: f64 = 24.0 * 60.0 * 60.0 * 1000.0;

pub fn read_states(sheet: &Sheet, tenant_id: &str) -> Result<ParsedSheet, WorkbookError> {
    sheet.require_columns(&[COL_STATE_CODE, "State Name", COL_START, COL_END])?;

    let mut parsed = ParsedSheet::new();
    for row in sheet.rows() {
        let Some(code) = row.text(COL_STATE_CODE) else {
            parsed.skipped += 1;
            continue;
        };
        let mut data = Map::new();
        data.insert("state".into(), json!(code));
        data.insert("applicationStatus".into(), json!(row.text("State Name")));
        data.insert("isStartState".into(), json!(row.is_true(COL_START)));
        data.insert("isTerminateState".into(), json!(row.is_true(COL_END)));
        if let Some(days) = row.f64("SLA Days") {
            data.insert("sla".into(), json!((days * DAY_MS) as i64));
        }
        parsed.records.push(
            MasterRecord::new(RecordKind::WorkflowState, tenant_id, data).with_source_row(row.index()),
        );
    }
    Ok(parsed)
}

pub fn read_actions(sheet: &Sheet, tenant_id: &str) -> Result<ParsedSheet, WorkbookError> {
    sheet.require_columns(&["From State", "To State", "Action Name", "Role Required"])?;

    let mut parsed = ParsedSheet::new();
    for row in sheet.rows() {
        let (Some(from), Some(action)) = (row.text("From State"), row.text("Action Name")) else {
            parsed.skipped += 1;
            continue;
        };
        let mut data = Map::new();
        data.insert("fromState".into(), json!(from));
        data.insert("toState".into(), json!(row.text("To State")));
        data.insert("actionName".into(), json!(action));
        data.insert(
            "roleRequired".into(),
            json!(row.text("Role Required").map(|r| split_list(&r)).unwrap_or_default()),
        );
        data.insert("commentRequired".into(), json!(row.is_true("Comment Required")));
        parsed.records.push(
            MasterRecord::new(RecordKind::WorkflowAction, tenant_id, data).with_source_row(row.index()),
        );
    }
    Ok(parsed)
}

/// Attach each action to the state it leaves from and wrap the states in a
/// business service definition
///
/// Actions whose `fromState` matches no state are dropped with a warning.
pub fn build_business_service(
    states: &[MasterRecord],
    actions: &[MasterRecord],
    tenant_id: &str,
    business_service: &str,
) -> Value {
    let mut built: Vec<Map<String, Value>> = states
        .iter()
        .map(|s| {
            let mut state = s.data.clone();
            state.insert("actions".into(), json!([]));
            state
        })
        .collect();

    for action in actions {
        let from = action.str_field("fromState").unwrap_or_default();
        let Some(state) = built
            .iter_mut()
            .find(|s| s.get("state").and_then(Value::as_str) == Some(from.as_str()))
        else {
            tracing::warn!(from_state = %from, "workflow action references unknown state");
            continue;
        };

        let mut entry = Map::new();
        entry.insert("action".into(), action.data.get("actionName").cloned().unwrap_or(Value::Null));
        entry.insert("nextState".into(), action.data.get("toState").cloned().unwrap_or(Value::Null));
        entry.insert("roles".into(), action.data.get("roleRequired").cloned().unwrap_or(json!([])));
        if action.data.get("commentRequired") == Some(&Value::Bool(true)) {
            entry.insert("isCommentRequired".into(), json!(true));
        }
        if let Some(Value::Array(list)) = state.get_mut("actions") {
            list.push(Value::Object(entry));
        }
    }

    json!({
        "tenantId": tenant_id,
        "businessService": business_service,
        "business": DEFAULT_BUSINESS,
        "businessServiceSla": BUSINESS_SERVICE_SLA_MS,
        "states": built,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn states() -> Sheet {
        Sheet::from_strings(
            STATES_SHEET,
            &[COL_STATE_CODE, "State Name", COL_START, COL_END, "SLA Days"],
            &[
                vec!["", "", "TRUE", "FALSE", ""],
                vec!["PENDINGFORASSIGNMENT", "PENDINGFORASSIGNMENT", "FALSE", "FALSE", "1.5"],
                vec!["RESOLVED", "RESOLVED", "false", "TRUE", ""],
            ],
        )
    }

    fn actions() -> Sheet {
        Sheet::from_strings(
            ACTIONS_SHEET,
            &["From State", "To State", "Action Name", "Role Required", "Comment Required"],
            &[
                vec!["PENDINGFORASSIGNMENT", "RESOLVED", "RESOLVE", "GRO, PGR_LME", "TRUE"],
                vec!["NOWHERE", "RESOLVED", "JUMP", "GRO", ""],
            ],
        )
    }

    #[test]
    fn test_read_states() {
        let parsed = read_states(&states(), "pg").unwrap();
        assert_eq!(parsed.records.len(), 2);
        assert_eq!(parsed.records[0].data["sla"], 129_600_000i64);
        assert_eq!(parsed.records[1].data["isTerminateState"], true);
        assert!(parsed.records[1].data.get("sla").is_none());
    }

    #[test]
    fn test_build_business_service() {
        let s = read_states(&states(), "pg").unwrap();
        let a = read_actions(&actions(), "pg").unwrap();
        let service = build_business_service(&s.records, &a.records, "pg", "PGR");

        assert_eq!(service["businessServiceSla"], 432_000_000i64);
        assert_eq!(service["business"], "pgr-services");
        let first = &service["states"][0];
        assert_eq!(first["actions"][0]["action"], "RESOLVE");
        assert_eq!(first["actions"][0]["roles"], json!(["GRO", "PGR_LME"]));
        assert_eq!(first["actions"][0]["isCommentRequired"], true);
        // Unknown fromState is dropped
        assert_eq!(service["states"][1]["actions"], json!([]));
    }
}
