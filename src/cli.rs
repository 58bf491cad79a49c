//! Command-line interface definitions.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// The simplest way to preview UI component stories
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None, arg_required_else_help = true)]
pub struct Cli {
    /// subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Discover stories in a project and serve the preview workspace
    Render {
        /// Project directory to preview
        path: PathBuf,

        /// Port to bind the preview backend on
        #[arg(short, long, default_value_t = 3210)]
        port: u16,

        /// enable watch and hot reload
        #[arg(short, long, action = clap::ArgAction::Set, num_args = 0..=1, default_missing_value = "true", require_equals = false)]
        watch: Option<bool>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_defaults() {
        let cli = Cli::parse_from(["vignette", "render", "./demo"]);
        let Commands::Render { path, port, watch } = cli.command;
        assert_eq!(path, PathBuf::from("./demo"));
        assert_eq!(port, 3210);
        assert!(watch.is_none());
    }

    #[test]
    fn test_watch_flag_toggles() {
        let cli = Cli::parse_from(["vignette", "render", ".", "--watch", "false"]);
        let Commands::Render { watch, .. } = cli.command;
        assert_eq!(watch, Some(false));
    }

    #[test]
    fn test_port_override() {
        let cli = Cli::parse_from(["vignette", "render", ".", "--port", "4000"]);
        let Commands::Render { port, .. } = cli.command;
        assert_eq!(port, 4000);
    }
}
