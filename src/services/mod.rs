pub mod accounts;

pub use accounts::{AccountError, AccountService};
