pub mod cli;
pub mod config;
pub mod error;
pub mod model;
pub mod paths;
pub mod pdf;
pub mod pipeline;
pub mod providers;
pub mod server;
pub mod services;
pub mod stores;
