//! File-backed stores

pub mod history;
pub mod layout;
pub mod settings;
