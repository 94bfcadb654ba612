//! Command-line argument parsing.

use std::path::PathBuf;

use clap::Parser;

use crate::Config;

/// Skyweave command-line arguments.
///
/// CLI values override settings loaded from `config.ron`.
#[derive(Parser, Debug, Default)]
#[command(name = "skyweave", about = "Adaptive sky and planet tile renderer")]
pub struct CliArgs {
    /// Number of frames to run.
    #[arg(long)]
    pub frames: Option<u64>,

    /// Vertical field of view in degrees.
    #[arg(long)]
    pub fov: Option<f64>,

    /// Maximum concurrent tile fetches.
    #[arg(long)]
    pub max_fetches: Option<usize>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Path to config directory (overrides default location).
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl Config {
    /// Apply CLI overrides to a loaded config.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(frames) = args.frames {
            self.view.frames = frames;
        }
        if let Some(fov) = args.fov {
            self.view.fov_degrees = fov;
        }
        if let Some(max) = args.max_fetches {
            self.tiles.max_concurrent_fetches = max;
        }
        if let Some(ref level) = args.log_level {
            self.debug.log_level = level.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_override() {
        let mut config = Config::default();
        let args = CliArgs::parse_from(["skyweave", "--frames", "10", "--max-fetches", "2"]);
        config.apply_cli_overrides(&args);
        assert_eq!(config.view.frames, 10);
        assert_eq!(config.tiles.max_concurrent_fetches, 2);
        // Non-overridden fields retain defaults
        assert_eq!(config.view.fov_degrees, 60.0);
        assert_eq!(config.debug.log_level, "info");
    }

    #[test]
    fn test_cli_no_override() {
        let original = Config::default();
        let mut config = Config::default();
        config.apply_cli_overrides(&CliArgs::default());
        assert_eq!(config, original);
    }

    #[test]
    fn test_cli_config_path() {
        let args = CliArgs::parse_from(["skyweave", "--config", "/tmp/sky", "--fov", "1.5"]);
        assert_eq!(args.config, Some(PathBuf::from("/tmp/sky")));
        assert_eq!(args.fov, Some(1.5));
    }
}
