pub mod cli;
pub mod config;
pub mod ledger;
pub mod orchestrator;
pub mod resolver;
pub mod source;
pub mod split;
pub mod tools;
