pub mod client;
pub mod command;
pub mod config;
pub mod context;
pub mod prober;
pub mod report;
pub mod scheduler;
pub mod util;
