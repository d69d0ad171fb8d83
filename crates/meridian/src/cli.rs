//! Command-line interface handling for the Meridian entity server.
//!
//! Arguments override the matching settings of the configuration file.

use crate::config::AppConfig;
use clap::{Arg, ArgMatches, Command};
use std::path::PathBuf;

pub const DEFAULT_CONFIG_PATH: &str = "meridian.toml";

/// Command line arguments parsed from user input.
#[derive(Debug, Clone, PartialEq)]
pub struct CliArgs {
    /// Path to the configuration file
    pub config_path: PathBuf,
    /// Optional override for bind address
    pub bind_address: Option<String>,
    /// Optional override for log level
    pub log_level: Option<String>,
    /// Whether to force JSON log output
    pub json_logs: bool,
    /// Optional override for the snapshot file
    pub data_file: Option<PathBuf>,
}

/// Builds the clap command describing every supported option.
pub fn command() -> Command {
    Command::new("Meridian Entity Server")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Authoritative server for a replicated octree of entities")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path")
                .default_value(DEFAULT_CONFIG_PATH),
        )
        .arg(
            Arg::new("bind")
                .short('b')
                .long("bind")
                .value_name("ADDRESS")
                .help("UDP bind address (e.g., 0.0.0.0:40107)"),
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .value_name("LEVEL")
                .help("Log level (trace, debug, info, warn, error)"),
        )
        .arg(
            Arg::new("json-logs")
                .long("json-logs")
                .help("Output logs in JSON format")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("data-file")
                .short('d')
                .long("data-file")
                .value_name("FILE")
                .help("Entity snapshot file"),
        )
}

impl CliArgs {
    /// Parses the process arguments, exiting with usage on error.
    pub fn parse() -> Self {
        Self::from_matches(&command().get_matches())
    }

    pub fn from_matches(matches: &ArgMatches) -> Self {
        Self {
            config_path: matches
                .get_one::<String>("config")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH)),
            bind_address: matches.get_one::<String>("bind").cloned(),
            log_level: matches.get_one::<String>("log-level").cloned(),
            json_logs: matches.get_flag("json-logs"),
            data_file: matches.get_one::<String>("data-file").map(PathBuf::from),
        }
    }

    /// Applies every override given on the command line to `config`.
    pub fn apply_to(&self, config: &mut AppConfig) {
        if let Some(bind_address) = &self.bind_address {
            config.server.bind_address = bind_address.clone();
        }
        if let Some(log_level) = &self.log_level {
            config.logging.level = log_level.clone();
        }
        if self.json_logs {
            config.logging.json_format = true;
        }
        if let Some(data_file) = &self.data_file {
            config.persist.path = data_file.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> CliArgs {
        let matches = command()
            .try_get_matches_from(std::iter::once("meridian").chain(args.iter().copied()))
            .unwrap();
        CliArgs::from_matches(&matches)
    }

    #[test]
    fn test_defaults() {
        let args = parse(&[]);
        assert_eq!(args.config_path, PathBuf::from(DEFAULT_CONFIG_PATH));
        assert_eq!(args.bind_address, None);
        assert_eq!(args.log_level, None);
        assert!(!args.json_logs);
        assert_eq!(args.data_file, None);
    }

    #[test]
    fn test_overrides_apply_to_config() {
        let args = parse(&[
            "--config",
            "prod.toml",
            "--bind",
            "0.0.0.0:9000",
            "-l",
            "debug",
            "--json-logs",
            "--data-file",
            "/var/lib/meridian/world.mrdn",
        ]);
        assert_eq!(args.config_path, PathBuf::from("prod.toml"));

        let mut config = AppConfig::default();
        args.apply_to(&mut config);
        assert_eq!(config.server.bind_address, "0.0.0.0:9000");
        assert_eq!(config.logging.level, "debug");
        assert!(config.logging.json_format);
        assert_eq!(config.persist.path, PathBuf::from("/var/lib/meridian/world.mrdn"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unknown_flag_is_rejected() {
        assert!(command()
            .try_get_matches_from(["meridian", "--workers", "4"])
            .is_err());
    }
}
