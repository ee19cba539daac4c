pub mod admin;
pub mod error;
