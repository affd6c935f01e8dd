pub mod eligibility;
pub mod receipt;
pub mod setup;
pub mod transactions;
pub mod ui;
