pub mod cli;
pub mod config;
pub mod error;
pub mod plugin;
pub mod storage;
pub mod utils;

pub use msp_plugin_catalog as catalog;
