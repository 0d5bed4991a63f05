// Shared helpers for the MEMD client

pub mod dates;
pub mod serde_helpers;

pub use serde_helpers::duration_serde;
