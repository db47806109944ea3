//! CLI command layer. Thin async wrappers binding the exposed operations
//! (check, start update, status, history) to the orchestration core.

pub mod check;
pub mod history;
pub mod status;
pub mod upgrade;
