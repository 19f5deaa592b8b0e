//! Data models for LabStock

mod alert;
mod part;

pub use alert::*;
pub use part::*;
