// genguard - Request governance for AI content generation
// Author: kelexine (https://github.com/kelexine)

pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod governance;
pub mod metrics;
pub mod rate_limit;
pub mod server;
pub mod store;
pub mod upstream;
pub mod usage;
pub mod utils;
