//! Storage infrastructure: the TOML config file and the saved hub address.

pub mod config;
