//! Managed containers

pub mod docker;
pub mod engine;
pub mod inventory;
pub mod naming;
