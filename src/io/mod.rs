//! IO module - run configuration.

mod config;

pub use config::{read_run_config, MuffinTinConfig, RunConfig};
