//! Deployment module

pub mod builder;
pub mod fsm;
pub mod git;
pub mod orchestrator;
pub mod process;
pub mod publish;
pub mod session;
pub mod sink;
pub mod workspace;
