#![deny(warnings)]

//! Economic engines of the nation simulation.
//!
//! - [`economy`]: monthly GDP, revenue, debt, inflation, trade and reserves
//! - [`budget`]: allocation changes, taxation and borrowing
//! - [`sectors`]: sector investment and infrastructure construction
//! - [`demographics`]: yearly population and expertise pool updates
//!
//! Every function takes the snapshot by reference; nothing here caches state
//! between calls.

pub mod budget;
pub mod demographics;
pub mod economy;
pub mod sectors;

pub use budget::{adjust_allocation, adjust_tax, repay_debt, take_debt, FundingSource};
pub use economy::{monthly_update, project, MonthlyReport};
pub use sectors::{advance_projects, invest, start_infrastructure_project};
