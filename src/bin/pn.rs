//! `pn`：为一个或多个网文件构造可达图并导出 JSON。
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result, bail};
use rayon::prelude::*;

use pn_reach::analysis::{ExplorationConfig, Explorer};
use pn_reach::config::{DEFAULT_CONFIG_FILE, PnConfig, limit_to_config};
use pn_reach::export::{Exporter, StateIdScheme};
use pn_reach::net::io::write_json;
use pn_reach::net::read_net;
use pn_reach::options::Options;
use pn_reach::report::DeadlockReport;

fn main() {
    let env = env_logger::Env::new()
        .filter_or("PN_LOG", "warn")
        .write_style("PN_LOG_STYLE");
    env_logger::init_from_env(env);

    let mut flags = shellwords::split(&std::env::var("PN_FLAGS").unwrap_or_default())
        .unwrap_or_else(|err| {
            log::warn!("ignoring malformed PN_FLAGS: {}", err);
            Vec::new()
        });
    flags.extend(std::env::args().skip(1));

    let options = match Options::parse_from_args(&flags) {
        Ok(options) => options,
        Err(err) => {
            if let Some(clap_err) = err.downcast_ref::<clap::Error>() {
                clap_err.exit();
            }
            eprintln!("error: {}", err);
            std::process::exit(2);
        }
    };
    log::debug!("PN options: {:?}", options);

    if let Err(err) = run(&options) {
        eprintln!("error: {:#}", err);
        std::process::exit(1);
    }
}

struct Job<'a> {
    options: &'a Options,
    exploration: ExplorationConfig,
    scheme: StateIdScheme,
    generated_with: String,
    multiple: bool,
}

fn run(options: &Options) -> Result<()> {
    let config_path = options
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
    let config = PnConfig::load_from_file(&config_path)?;

    let job = Job {
        options,
        exploration: options
            .state_limit
            .map(limit_to_config)
            .unwrap_or_else(|| config.exploration.exploration_config()),
        scheme: options.state_ids.unwrap_or(config.export.state_ids),
        generated_with: config.export.generated_with.clone(),
        multiple: options.inputs.len() > 1,
    };

    let failures = options
        .inputs
        .par_iter()
        .map(|input| {
            process(input, &job).inspect_err(|err| log::error!("{:?}: {:#}", input, err))
        })
        .filter(Result::is_err)
        .count();

    if failures > 0 {
        bail!("{} of {} nets failed", failures, options.inputs.len());
    }
    Ok(())
}

fn process(input: &Path, job: &Job<'_>) -> Result<()> {
    let started = Instant::now();
    let parsed = read_net(input).with_context(|| format!("failed to load net {:?}", input))?;
    let net = &parsed.net;
    net.log_diagnostics(Some(&parsed.initial_marking));

    let graph = Explorer::new(net)
        .with_config(job.exploration.clone())
        .explore(&parsed.initial_marking)
        .with_context(|| format!("failed to explore {:?}", input))?;
    if let Some(limit) = graph.truncation() {
        log::warn!("{:?}: {}", input, limit);
    }

    let export = Exporter::new(net)
        .with_scheme(job.scheme)
        .with_generated_with(job.generated_with.clone())
        .export(&graph)?;

    let stem = input
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("net");
    match (&job.options.output, job.multiple) {
        (None, false) => println!("{}", export.to_json_pretty()?),
        (None, true) => write_json(format!("{}.reachability.json", stem), &export)?,
        (Some(dir), true) => write_json(dir.join(format!("{}.json", stem)), &export)?,
        (Some(file), false) => write_json(file, &export)?,
    }

    if let Some(dir) = &job.options.dot_dir {
        net.write_dot(dir.join(format!("{}.net.dot", stem)), Some(&parsed.initial_marking))?;
        graph.write_dot(net, dir.join(format!("{}.reachability.dot", stem)))?;
    }

    if job.options.report {
        let report = DeadlockReport::from_graph(stem, net, &graph, started.elapsed());
        let report_path = match (&job.options.output, job.multiple) {
            (None, false) => None,
            (None, true) => Some(PathBuf::from(format!("{}.report.txt", stem))),
            (Some(dir), true) => Some(dir.join(format!("{}.report.txt", stem))),
            (Some(file), false) => Some(file.with_extension("report.txt")),
        };
        match report_path {
            Some(path) => report
                .save_to_file(&path)
                .with_context(|| format!("failed to write report {:?}", path))?,
            None => print!("{}", report),
        }
    }

    log::info!(
        "{:?}: {} states, {} edges in {:?}",
        input,
        export.stats.total_states,
        export.stats.total_transitions,
        started.elapsed()
    );
    Ok(())
}
