pub mod cli;
pub mod commands;
pub mod config;
pub mod disk;
pub mod error;
pub mod model;
pub mod paths;
pub mod process;
pub mod provision;
pub mod resolve;
pub mod seed;
pub mod store;
pub mod template;
