//! Motion Deployer Library
//!
//! Clones a repository, builds it with Node, and serves the output from an
//! nginx container, streaming progress over HTTP.

pub mod app;
pub mod containers;
pub mod deploy;
pub mod errors;
pub mod filesys;
pub mod logs;
pub mod models;
pub mod server;
pub mod storage;
pub mod utils;
