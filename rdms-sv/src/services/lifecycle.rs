//! RDMP lifecycle rules
//!
//! Project governance status is derived from the version collection on
//! every read, never cached. The guarded state transitions themselves live
//! in `db::rdmp` so they can run inside a single transaction; this module
//! holds the pure rules they rely on.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use crate::error::ApiError;

/// Status of a single RDMP version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RdmpStatus {
    Draft,
    Active,
    Superseded,
}

impl fmt::Display for RdmpStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RdmpStatus::Draft => "DRAFT",
            RdmpStatus::Active => "ACTIVE",
            RdmpStatus::Superseded => "SUPERSEDED",
        };
        f.write_str(s)
    }
}

impl FromStr for RdmpStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DRAFT" => Ok(RdmpStatus::Draft),
            "ACTIVE" => Ok(RdmpStatus::Active),
            "SUPERSEDED" => Ok(RdmpStatus::Superseded),
            other => Err(format!("Unknown RDMP status: {}", other)),
        }
    }
}

/// Governance status a project reports, derived from its version set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProjectRdmpStatus {
    Active,
    Draft,
    Superseded,
    None,
}

impl ProjectRdmpStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ProjectRdmpStatus::Active => "ACTIVE",
            ProjectRdmpStatus::Draft => "DRAFT",
            ProjectRdmpStatus::Superseded => "SUPERSEDED",
            ProjectRdmpStatus::None => "NONE",
        }
    }
}

/// Derive a project's governance status from its RDMP versions.
///
/// ACTIVE dominates DRAFT dominates SUPERSEDED: a project holding one
/// superseded and one draft version reports DRAFT, never SUPERSEDED.
pub fn project_status(versions: &[RdmpStatus]) -> ProjectRdmpStatus {
    if versions.iter().any(|s| *s == RdmpStatus::Active) {
        ProjectRdmpStatus::Active
    } else if versions.iter().any(|s| *s == RdmpStatus::Draft) {
        ProjectRdmpStatus::Draft
    } else if !versions.is_empty() {
        ProjectRdmpStatus::Superseded
    } else {
        ProjectRdmpStatus::None
    }
}

/// Validate an RDMP content document before any write.
///
/// The scheme recognizes top-level `fields` and `roles`; unrecognized
/// top-level keys are preserved opaquely since the schema is
/// project-extensible.
pub fn validate_content(content: &Value) -> Result<(), ApiError> {
    let Some(obj) = content.as_object() else {
        return Err(ApiError::Validation(
            "RDMP content must be a JSON object".to_string(),
        ));
    };

    if let Some(fields) = obj.get("fields") {
        let Some(fields) = fields.as_array() else {
            return Err(ApiError::Validation(
                "RDMP content key 'fields' must be an array".to_string(),
            ));
        };

        for (i, field) in fields.iter().enumerate() {
            let Some(field) = field.as_object() else {
                return Err(ApiError::Validation(format!(
                    "RDMP field entry {} must be an object",
                    i
                )));
            };

            match field.get("key").and_then(|v| v.as_str()) {
                Some(key) if !key.is_empty() => {}
                _ => {
                    return Err(ApiError::Validation(format!(
                        "RDMP field entry {} requires a non-empty string 'key'",
                        i
                    )));
                }
            }

            if field.get("type").and_then(|v| v.as_str()).is_none() {
                return Err(ApiError::Validation(format!(
                    "RDMP field entry {} requires a string 'type'",
                    i
                )));
            }

            if let Some(required) = field.get("required") {
                if !required.is_boolean() {
                    return Err(ApiError::Validation(format!(
                        "RDMP field entry {}: 'required' must be a boolean",
                        i
                    )));
                }
            }

            if let Some(allowed) = field.get("allowed_values") {
                if !allowed.is_array() {
                    return Err(ApiError::Validation(format!(
                        "RDMP field entry {}: 'allowed_values' must be an array",
                        i
                    )));
                }
            }
        }
    }

    if let Some(roles) = obj.get("roles") {
        let Some(roles) = roles.as_array() else {
            return Err(ApiError::Validation(
                "RDMP content key 'roles' must be an array".to_string(),
            ));
        };
        if roles.iter().any(|r| !r.is_object()) {
            return Err(ApiError::Validation(
                "RDMP content key 'roles' entries must be objects".to_string(),
            ));
        }
    }

    Ok(())
}

/// Keys of required fields declared by an RDMP content document
pub fn required_field_keys(content: &Value) -> Vec<String> {
    content
        .get("fields")
        .and_then(|f| f.as_array())
        .map(|fields| {
            fields
                .iter()
                .filter(|f| {
                    f.get("required")
                        .and_then(|r| r.as_bool())
                        .unwrap_or(false)
                })
                .filter_map(|f| f.get("key").and_then(|k| k.as_str()))
                .map(String::from)
                .collect()
        })
        .unwrap_or_default()
}

/// Look up a field definition by key in an RDMP content document
pub fn find_field<'a>(content: &'a Value, field_key: &str) -> Option<&'a Value> {
    content
        .get("fields")
        .and_then(|f| f.as_array())?
        .iter()
        .find(|f| f.get("key").and_then(|k| k.as_str()) == Some(field_key))
}
