// Member payload schema
//
// Payloads sent to the create and update endpoints must match this schema
// exactly: every declared key present (`misc3` excepted), no undeclared keys,
// `preferredLanguage` fixed to "NP" and `relationship` fixed to "18".

use jsonschema::Validator;
use once_cell::sync::Lazy;
use serde_json::Value;

use crate::api::{ApiError, ApiResult};

/// Raw JSON schema for a primary member payload
pub const PRIMARY_MEMBER_SCHEMA: &str = include_str!("../../data/member_schema.json");

static PRIMARY_MEMBER_VALIDATOR: Lazy<Validator> = Lazy::new(|| {
    let schema: Value =
        serde_json::from_str(PRIMARY_MEMBER_SCHEMA).expect("data/member_schema.json must parse");
    jsonschema::validator_for(&schema).expect("primary member schema must be valid")
});

/// Validate a member payload, listing every violated constraint
pub fn validate_member(payload: &Value) -> ApiResult<()> {
    let issues = PRIMARY_MEMBER_VALIDATOR
        .iter_errors(payload)
        .map(|e| e.to_string())
        .collect::<Vec<_>>();
    if !issues.is_empty() {
        tracing::debug!("Member payload rejected: {}", issues.join("; "));
        return Err(ApiError::Validation(issues));
    }
    Ok(())
}

/// Whether a payload passes validation
pub fn is_valid_member(payload: &Value) -> bool {
    PRIMARY_MEMBER_VALIDATOR.is_valid(payload)
}
