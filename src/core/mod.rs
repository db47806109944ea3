//! Version catalog and compatibility evaluation.

pub mod catalog;
pub mod compat;
