//! CLI argument parsing and validation module
//!
//! Handles command-line interface using clap, including:
//! - Replay input and configuration file selection
//! - Mute rule overrides
//! - Output format selection (human/JSON) and quiet mode
//! - Informational listings (event kinds, effective mute rules)

use anyhow::{anyhow, Result};
use clap::{Arg, ArgAction, ArgMatches, Command};
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Settings taken from the command line; `None` means "use the config file"
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CliConfig {
    /// JSON lines replay file, `None` reads stdin
    pub input: Option<PathBuf>,
    pub config_path: Option<PathBuf>,
    pub mute_rules_path: Option<PathBuf>,
    pub no_default_mutes: bool,
    pub json_output: bool,
    pub quiet_mode: bool,
    pub show_stats: bool,
    pub verbose: bool,
    pub list_events: bool,
    pub print_mute_rules: bool,
}

fn command() -> Command {
    Command::new("esmonitor")
        .version(env!("ESMONITOR_VERSION"))
        .long_version(concat!(env!("ESMONITOR_VERSION"), " (", env!("GIT_HASH"), ")"))
        .about("Filter, classify and persist Endpoint Security notifications")
        .long_about(
            "Replays raw Endpoint Security notifications (one JSON message per line), \
             applies path mute rules, classifies admitted messages into typed events \
             and writes them at an adaptive flush cadence.",
        )
        .arg(
            Arg::new("input")
                .short('i')
                .long("input")
                .value_name("FILE")
                .help("JSON lines file of raw messages (default: stdin)")
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file (default: user config directory)")
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("mute-rules")
                .short('m')
                .long("mute-rules")
                .value_name("FILE")
                .help("JSON file of additional mute rule records")
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("no-default-mutes")
                .long("no-default-mutes")
                .help("Do not start from the built-in mute rule set")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("json")
                .short('j')
                .long("json")
                .help("Output events in JSON format")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("quiet")
                .short('q')
                .long("quiet")
                .help("Do not print events, only warnings and the summary")
                .action(ArgAction::SetTrue)
                .conflicts_with("verbose"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Log admission and throttle decisions")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("stats")
                .short('s')
                .long("stats")
                .help("Print a run summary when the input is exhausted")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("list-events")
                .long("list-events")
                .help("List supported event kinds and exit")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("print-mute-rules")
                .long("print-mute-rules")
                .help("Print the effective mute rules as JSON and exit")
                .action(ArgAction::SetTrue),
        )
}

/// Parse command line arguments and return configuration
pub fn parse_args() -> Result<CliConfig> {
    from_matches(&command().get_matches())
}

/// Parse an explicit argument list
pub fn parse_from<I, T>(args: I) -> Result<CliConfig>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let matches = command().try_get_matches_from(args)?;
    from_matches(&matches)
}

fn existing_path(matches: &ArgMatches, id: &str) -> Result<Option<PathBuf>> {
    match matches.get_one::<String>(id) {
        Some(path_str) => {
            let path = Path::new(path_str);
            if !path.exists() {
                return Err(anyhow!("Path does not exist: {}", path_str));
            }
            Ok(Some(path.to_path_buf()))
        }
        None => Ok(None),
    }
}

fn from_matches(matches: &ArgMatches) -> Result<CliConfig> {
    Ok(CliConfig {
        input: existing_path(matches, "input")?,
        config_path: existing_path(matches, "config")?,
        mute_rules_path: existing_path(matches, "mute-rules")?,
        no_default_mutes: matches.get_flag("no-default-mutes"),
        json_output: matches.get_flag("json"),
        quiet_mode: matches.get_flag("quiet"),
        show_stats: matches.get_flag("stats"),
        verbose: matches.get_flag("verbose"),
        list_events: matches.get_flag("list-events"),
        print_mute_rules: matches.get_flag("print-mute-rules"),
    })
}
