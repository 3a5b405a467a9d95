pub mod archive;
pub mod cli;
pub mod load_config;
pub mod logging;
pub mod remote;
pub mod store;

pub use cli::{run, Cli, Commands};
