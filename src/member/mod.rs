// Member/policy lifecycle module for the MEMD client
//
// This module models primary members and their policies, and implements the
// policy reconciliation, termination and rollback sequences.

pub mod lifecycle;
pub mod types;

// Re-export commonly used types
pub use lifecycle::PrimaryMember;
pub use types::{
    ChangeableField, CreatedPolicy, EnsureOutcome, MemberName, MemberRecord, Policy, PolicyChange,
    PolicyPayload, TerminatedPolicy, TerminationOutcome, TerminationPayload, TerminationResponse,
    MAX_DEACTIVATION_ATTEMPTS,
};
