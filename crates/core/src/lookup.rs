//! Ordered candidate-field lookups.
//!
//! The platform is inconsistent about where it puts a step's command text
//! or screenshot link. Each concern has a fixed, priority-ordered list of
//! field names; the first one holding a non-empty string wins.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

/// Fields that may hold the executed command of a step, highest priority first.
pub const COMMAND_FIELDS: &[&str] = &[
    "command",
    "action",
    "instruction",
    "testCommand",
    "scriptLine",
    "commandText",
];

/// Fields on a step that may hold a screenshot link.
pub const STEP_SCREENSHOT_FIELDS: &[&str] = &[
    "screenshot",
    "screenshotUrl",
    "screenshotLink",
    "image",
    "imageUrl",
    "screenshotPath",
];

/// Fields on a step's nested error objects that may hold a screenshot link.
pub const ERROR_SCREENSHOT_FIELDS: &[&str] = &["screenshot", "screenshotUrl", "image"];

/// Fields on a test case that may carry an inline failure message.
pub const INLINE_MESSAGE_FIELDS: &[&str] = &["errorMessage", "message", "failureMessage"];

/// Copy every candidate field holding a non-empty string out of `obj`.
pub fn collect_fields(obj: &Map<String, Value>, candidates: &[&str]) -> BTreeMap<String, String> {
    candidates
        .iter()
        .filter_map(|name| {
            non_empty_str(obj.get(*name)).map(|value| (name.to_string(), value.to_string()))
        })
        .collect()
}

/// First candidate (in priority order) present in `fields`.
pub fn first_present<'a>(fields: &'a BTreeMap<String, String>, candidates: &[&str]) -> Option<&'a str> {
    candidates
        .iter()
        .find_map(|name| fields.get(*name).map(String::as_str))
}

/// First candidate (in priority order) holding a non-empty string in a raw JSON object.
pub fn first_string<'a>(obj: &'a Map<String, Value>, candidates: &[&str]) -> Option<&'a str> {
    candidates
        .iter()
        .find_map(|name| non_empty_str(obj.get(*name)))
}

fn non_empty_str(value: Option<&Value>) -> Option<&str> {
    value.and_then(Value::as_str).filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obj(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn priority_order_wins_over_map_order() {
        let fields = collect_fields(
            &obj(json!({"scriptLine": "click login", "action": "type name"})),
            COMMAND_FIELDS,
        );
        assert_eq!(first_present(&fields, COMMAND_FIELDS), Some("type name"));
    }

    #[test]
    fn empty_and_non_string_values_are_absent() {
        let fields = collect_fields(
            &obj(json!({"command": "", "action": 7, "instruction": "open page"})),
            COMMAND_FIELDS,
        );
        assert_eq!(fields.len(), 1);
        assert_eq!(first_present(&fields, COMMAND_FIELDS), Some("open page"));
    }

    #[test]
    fn first_string_on_raw_object() {
        let raw = obj(json!({"message": "Timeout", "failureMessage": "other"}));
        assert_eq!(first_string(&raw, INLINE_MESSAGE_FIELDS), Some("Timeout"));
        assert_eq!(first_string(&raw, COMMAND_FIELDS), None);
    }
}
