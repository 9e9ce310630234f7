pub mod check;
pub mod clock;
pub mod filter;
pub mod inspiration;
pub mod store;
