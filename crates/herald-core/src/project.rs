//! Project-record derivations shared by the resolver and payload builder.
//!
//! Projects carry their description either at the top level
//! (`projectDescription`) or divided per schedule
//! (`projectSchedules[].projectDescription`) when
//! `projectSchedulesDividedDescription` is set. Category managers are keyed
//! on the category tags of whichever form is in effect.

use serde_json::Value;

use crate::error::EngineError;
use crate::record::RecordSnapshot;

/// Permission prefix granting inbox visibility of unassigned projects in a
/// description category.
pub const CATEGORY_PERMISSION_PREFIX: &str = "Inbox-show-unassigned-";

/// Renders the project's one-line summary: `"<site line 1> > Project <n>"`.
///
/// # Errors
///
/// Returns a configuration error when the site address or project number is
/// absent or malformed.
pub fn summary(record: &RecordSnapshot) -> Result<String, EngineError> {
    let line1 = record
        .get("siteAddress")
        .and_then(|address| address.get("line1"))
        .and_then(Value::as_str)
        .ok_or_else(|| EngineError::MalformedColumn {
            column: "siteAddress".into(),
            detail: "expected an object with a string line1".into(),
        })?;
    let number = match record.get("projectNumber") {
        Some(Value::Number(number)) => number.to_string(),
        Some(Value::String(number)) => number.clone(),
        _ => {
            return Err(EngineError::MalformedColumn {
                column: "projectNumber".into(),
                detail: "expected a number".into(),
            })
        }
    };
    Ok(format!("{line1} > Project {number}"))
}

/// Returns the project's description category tags, deduplicated in first-seen
/// order.
///
/// # Errors
///
/// Returns a configuration error when the description columns are absent or
/// malformed.
pub fn description_categories(record: &RecordSnapshot) -> Result<Vec<String>, EngineError> {
    let divided = matches!(
        record.get("projectSchedulesDividedDescription"),
        Some(Value::Bool(true))
    );

    if divided {
        let schedules = match record.get("projectSchedules") {
            Some(Value::Array(schedules)) => schedules,
            Some(other) => {
                return Err(EngineError::MalformedColumn {
                    column: "projectSchedules".into(),
                    detail: format!("expected list, got {other}"),
                })
            }
            None => {
                return Err(EngineError::MissingColumn {
                    column: "projectSchedules".into(),
                })
            }
        };
        let mut categories: Vec<String> = Vec::new();
        for schedule in schedules {
            let category = schedule
                .get("projectDescription")
                .and_then(|description| description.get("category"))
                .and_then(Value::as_str)
                .ok_or_else(|| EngineError::MalformedColumn {
                    column: "projectSchedules".into(),
                    detail: "schedule entry lacks a description category".into(),
                })?;
            if !categories.iter().any(|seen| seen == category) {
                categories.push(category.to_owned());
            }
        }
        Ok(categories)
    } else {
        let category = record
            .get("projectDescription")
            .and_then(|description| description.get("category"))
            .and_then(Value::as_str)
            .ok_or_else(|| EngineError::MalformedColumn {
                column: "projectDescription".into(),
                detail: "expected an object with a string category".into(),
            })?;
        Ok(vec![category.to_owned()])
    }
}

/// Maps each description category to its category-manager permission.
///
/// # Errors
///
/// Propagates [`description_categories`] errors.
pub fn category_permissions(record: &RecordSnapshot) -> Result<Vec<String>, EngineError> {
    Ok(description_categories(record)?
        .into_iter()
        .map(|category| format!("{CATEGORY_PERMISSION_PREFIX}{category}"))
        .collect())
}
