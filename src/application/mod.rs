//! Application services layer.

pub mod error;
pub mod questions;
pub mod repos;
