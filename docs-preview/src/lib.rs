pub mod cli;
pub mod git;
pub mod github;
pub mod load_config;

pub use cli::{preview, run, ArtifactLocation, Cli, Commands};
