pub mod access;
pub mod approvals;
pub mod core;
