//! Data models shared by the pipeline, the stores and the HTTP API

pub mod app;
pub mod deployment;
pub mod history;
pub mod settings;
