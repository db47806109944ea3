//! Persistent state: version catalog, current-operation snapshot, and the
//! append-only history ledger.

pub mod actor;
pub mod db;
pub mod history;

pub use actor::DbHandle;
