#![forbid(unsafe_code)]

use anyhow::{Context, Result};
use log::LevelFilter;
use signal_hook::consts::{SIGHUP, SIGINT, SIGTERM};
use std::io::{self, BufReader};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use esmonitor::cli::{self, CliConfig};
use esmonitor::config::PipelineConfiguration;
use esmonitor::logging::{self, LogLevel, PipelineLogger};
use esmonitor::models::PipelineSummary;
use esmonitor::mute::{AdmissionFilter, RuleTable};
use esmonitor::output::{self, HumanSink};
use esmonitor::pipeline::{
    DiscardSink, EventSource, JsonLinesSink, JsonLinesSource, JsonStyle, PersistenceSink, Pipeline,
};
use esmonitor::{Classifier, ThrottleController};

fn main() -> Result<()> {
    let cli = cli::parse_args()?;

    let level = if cli.verbose {
        LevelFilter::Debug
    } else if cli.quiet_mode {
        LevelFilter::Warn
    } else {
        LevelFilter::Info
    };
    logging::init_logger(level)?;

    let mut config = PipelineConfiguration::load(cli.config_path.as_deref())?;
    if let Some(rules) = &cli.mute_rules_path {
        config.pipeline.mute_rules_path = Some(rules.clone());
    }
    if cli.no_default_mutes {
        config.pipeline.use_default_mute_set = false;
    }

    if cli.list_events {
        print!("{}", output::format_event_list(cli.json_output)?);
        return Ok(());
    }

    let table = config.build_rule_table()?;
    if cli.print_mute_rules {
        println!("{}", output::format_rule_records(&table)?);
        return Ok(());
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;
    let summary = runtime.block_on(run(&cli, config, table))?;

    if cli.show_stats {
        output::print_summary(&summary, cli.json_output)?;
    }
    Ok(())
}

async fn run(cli: &CliConfig, config: PipelineConfiguration, table: RuleTable) -> Result<PipelineSummary> {
    // Second SIGINT/SIGTERM exits immediately instead of waiting for the drain
    let shutdown = Arc::new(AtomicBool::new(false));
    for signal in [SIGINT, SIGTERM] {
        signal_hook::flag::register_conditional_shutdown(signal, 1, Arc::clone(&shutdown))
            .context("Failed to register signal handler")?;
        signal_hook::flag::register(signal, Arc::clone(&shutdown))
            .context("Failed to register signal handler")?;
    }
    let reload = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(SIGHUP, Arc::clone(&reload))
        .context("Failed to register SIGHUP handler")?;

    let deadline = config.processing_deadline();
    let source: Box<dyn EventSource> = match &cli.input {
        Some(path) => Box::new(JsonLinesSource::open(path, deadline)?),
        None => Box::new(JsonLinesSource::new(BufReader::new(io::stdin()), deadline)),
    };

    let sink: Box<dyn PersistenceSink> = if cli.quiet_mode {
        Box::new(DiscardSink)
    } else if cli.json_output {
        Box::new(JsonLinesSink::new(io::stdout(), JsonStyle::Compact))
    } else {
        Box::new(HumanSink::new(io::stdout()))
    };

    let logger = PipelineLogger::new(if cli.quiet_mode { LogLevel::Warn } else { LogLevel::Info });
    let subscriptions = config.subscriptions()?;
    let classifier = Classifier::new(config.build_enrichment());
    let rebuild_config = config.clone();

    let pipeline = Pipeline::new(
        AdmissionFilter::with_table(table),
        classifier,
        ThrottleController::system(),
    )
    .with_subscriptions(subscriptions)
    .with_shutdown(shutdown)
    .with_reload(reload, Box::new(move || rebuild_config.build_rule_table()))
    .with_logger(logger);

    pipeline.run(source, sink).await
}
