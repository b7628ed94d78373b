//! Parsing Options.
//! `pn [OPTIONS] <NET>...`，额外参数可以放在 `PN_FLAGS` 中。

use clap::{Arg, ArgAction, Command, value_parser};
use std::error::Error;
use std::path::PathBuf;

use crate::export::StateIdScheme;

fn make_options_parser() -> clap::Command {
    Command::new("pn")
        .no_binary_name(true)
        .version(env!("CARGO_PKG_VERSION"))
        .about("Builds the reachability graph of P/T Petri nets")
        .arg(
            Arg::new("inputs")
                .value_name("NET")
                .help("Net files (.pnml, .json or .ron)")
                .required(true)
                .num_args(1..)
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .value_name("PATH")
                .help("Output file for a single net, or directory for several")
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("state-limit")
                .short('l')
                .long("state-limit")
                .value_name("N")
                .help("Maximum number of states to explore (0 = unlimited)")
                .value_parser(value_parser!(usize)),
        )
        .arg(
            Arg::new("state-ids")
                .short('s')
                .long("state-ids")
                .help("State id scheme in the exported graph")
                .value_parser(["sequential", "marking"]),
        )
        .arg(
            Arg::new("dot")
                .long("dot")
                .value_name("DIR")
                .help("Also write Graphviz files for nets and graphs into DIR")
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file (defaults to pn.toml)")
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("report")
                .long("report")
                .help("Write a terminal-state report for each net next to its JSON output (stdout for a single net without -o)")
                .action(ArgAction::SetTrue),
        )
}

#[derive(Debug, Default)]
pub struct Options {
    pub inputs: Vec<PathBuf>,
    pub output: Option<PathBuf>,
    pub state_limit: Option<usize>,
    pub state_ids: Option<StateIdScheme>,
    pub dot_dir: Option<PathBuf>,
    pub config: Option<PathBuf>,
    pub report: bool,
}

impl Options {
    pub fn parse_from_str(s: &str) -> Result<Self, Box<dyn Error>> {
        let flags = shellwords::split(s)?;
        Self::parse_from_args(&flags)
    }

    pub fn parse_from_args(flags: &[String]) -> Result<Self, Box<dyn Error>> {
        let app = make_options_parser();
        let matches = app.try_get_matches_from(flags.iter())?;

        let inputs = matches
            .get_many::<PathBuf>("inputs")
            .map(|values| values.cloned().collect())
            .unwrap_or_default();
        let state_ids = matches
            .get_one::<String>("state-ids")
            .map(|s| s.parse::<StateIdScheme>())
            .transpose()?;

        Ok(Options {
            inputs,
            output: matches.get_one::<PathBuf>("output").cloned(),
            state_limit: matches.get_one::<usize>("state-limit").copied(),
            state_ids,
            dot_dir: matches.get_one::<PathBuf>("dot").cloned(),
            config: matches.get_one::<PathBuf>("config").cloned(),
            report: matches.get_flag("report"),
        })
    }
}
