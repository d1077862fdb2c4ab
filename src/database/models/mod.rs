pub mod customer;
pub mod team;
pub mod user;

pub use customer::{Customer, Invoice, LineItem};
pub use team::{Player, Team};
pub use user::User;
