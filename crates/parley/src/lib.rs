#![forbid(unsafe_code)]

pub mod cli;
pub mod config;
pub mod extract;
pub mod ingest;
pub mod loader;
pub mod markup;
pub mod models;
pub mod normalize;
pub mod report;
pub mod store;
pub mod utils;

pub use cli::app::{Cli, Command};
