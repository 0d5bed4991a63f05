// Member and policy types
//
// Wire shapes for member records and policy rows returned by the MEMD API,
// the payloads sent when creating or terminating policies, and the result
// types reported by the lifecycle operations.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::utils::dates;
use crate::utils::serde_helpers::null_as_default;

/// Upper bound on reload-and-terminate rounds when deactivating policies
pub const MAX_DEACTIVATION_ATTEMPTS: usize = 10;

/// Snapshot keys that are never sent back in a full update
pub const SNAPSHOT_ONLY_KEYS: [&str; 3] = ["policies", "dependents", "dependants"];

/// Member name; accepts both `First` and `first` spellings on input
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberName {
    #[serde(default, alias = "First")]
    pub first: Option<String>,
    #[serde(default, alias = "Middle")]
    pub middle: Option<String>,
    #[serde(default, alias = "Last")]
    pub last: Option<String>,
}

impl MemberName {
    pub fn new(first: impl Into<String>, last: impl Into<String>) -> Self {
        Self {
            first: Some(first.into()),
            middle: None,
            last: Some(last.into()),
        }
    }

    /// `first_last` in lower case, used to name local payload files
    pub fn file_stem(&self) -> Option<String> {
        match (&self.first, &self.last) {
            (Some(first), Some(last)) => Some(format!(
                "{}_{}",
                first.to_lowercase(),
                last.to_lowercase()
            )),
            _ => None,
        }
    }
}

/// A policy row attached to a member
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Policy {
    #[serde(default, deserialize_with = "null_as_default")]
    pub plancode: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub isactive: bool,
    #[serde(default)]
    pub benefitstart: Option<String>,
    #[serde(default)]
    pub benefitend: Option<String>,
    #[serde(rename = "policyId", default, skip_serializing_if = "Option::is_none")]
    pub policy_id: Option<Value>,
    /// Any other fields the server returns, kept verbatim
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Typed view over a member record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberRecord {
    #[serde(rename = "externalID")]
    pub external_id: String,
    #[serde(default)]
    pub name: Option<MemberName>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub dob: Option<String>,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub address: Option<Value>,
    #[serde(default)]
    pub misc3: Option<String>,
    #[serde(default)]
    pub plancode: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub policies: Vec<Policy>,
}

impl MemberRecord {
    /// Policies whose `isactive` flag is set
    pub fn active_policies(&self) -> Vec<Policy> {
        self.policies.iter().filter(|p| p.isactive).cloned().collect()
    }

    pub fn has_active_plancode(&self, plancode: &str) -> bool {
        self.policies
            .iter()
            .any(|p| p.isactive && p.plancode == plancode)
    }
}

/// Member fields that may be changed through an update or a save
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ChangeableField {
    Name,
    Email,
    Phone,
    Dob,
    Gender,
    Address,
    Misc3,
}

impl ChangeableField {
    pub const ALL: [ChangeableField; 7] = [
        ChangeableField::Name,
        ChangeableField::Email,
        ChangeableField::Phone,
        ChangeableField::Dob,
        ChangeableField::Gender,
        ChangeableField::Address,
        ChangeableField::Misc3,
    ];

    /// Key used in member payloads
    pub fn as_key(&self) -> &'static str {
        match self {
            ChangeableField::Name => "name",
            ChangeableField::Email => "email",
            ChangeableField::Phone => "phone",
            ChangeableField::Dob => "dob",
            ChangeableField::Gender => "gender",
            ChangeableField::Address => "address",
            ChangeableField::Misc3 => "misc3",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|field| field.as_key() == key)
    }
}

/// Body of a create-policy request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyPayload {
    pub benefitstart: String,
    pub benefitend: Option<String>,
    pub plancode: String,
}

/// Body of a terminate-policy request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminationPayload {
    pub termdate: String,
}

impl TerminationPayload {
    /// Terminate as of today at midnight
    pub fn today() -> Self {
        Self {
            termdate: dates::today_midnight_iso(),
        }
    }
}

/// Response to a terminate-policy request: either a list of updated rows or a single object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TerminationResponse {
    Updates(Vec<Value>),
    Single(Value),
}

impl TerminationResponse {
    /// Updated rows, whichever shape the server used
    pub fn rows(&self) -> Vec<&Value> {
        match self {
            TerminationResponse::Updates(rows) => rows.iter().collect(),
            TerminationResponse::Single(Value::Null) => Vec::new(),
            TerminationResponse::Single(row) => vec![row],
        }
    }
}

impl From<Value> for TerminationResponse {
    fn from(value: Value) -> Self {
        match value {
            Value::Array(rows) => TerminationResponse::Updates(rows),
            other => TerminationResponse::Single(other),
        }
    }
}

/// What happened to a single policy termination
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TerminationOutcome {
    /// The server accepted the termination
    Terminated { response: TerminationResponse },
    /// The server had no such policy; treated as already terminated
    NotFound,
    /// Nothing was sent
    DryRun { payload: TerminationPayload },
}

/// A policy that was (or in dry-run, would be) terminated
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TerminatedPolicy {
    pub policy: Policy,
    pub outcome: TerminationOutcome,
}

/// The new policy entry in a policy change
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CreatedPolicy {
    /// Server response to the create call
    Created(Value),
    /// Payload that would have been sent in dry-run
    Planned(PolicyPayload),
}

/// Result of replacing a member's active policies with a new plan code
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PolicyChange {
    pub terminated: Vec<TerminatedPolicy>,
    pub created: CreatedPolicy,
}

/// Result of reconciling a member against a plan code
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum EnsureOutcome {
    AlreadyActive { plancode: String },
    Changed(PolicyChange),
}

impl EnsureOutcome {
    pub fn is_noop(&self) -> bool {
        matches!(self, EnsureOutcome::AlreadyActive { .. })
    }
}
