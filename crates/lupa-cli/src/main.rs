// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

mod config;
mod runtime;
mod watcher;

use anyhow::{Context, Result};
use config::Config;
use lupa_app::AppState;
use lupa_store::Store;
use runtime::QueryRuntime;
use std::env;
use std::path::PathBuf;
use std::sync::mpsc;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() {
    if let Err(error) = run() {
        eprintln!("{error:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let options = parse_cli_args(env::args().skip(1), Config::default_path()?)?;
    if options.show_help {
        print_help();
        return Ok(());
    }

    if options.print_config_path {
        println!("{}", options.config_path.display());
        return Ok(());
    }

    if options.print_example {
        print!("{}", Config::example_config(&options.config_path));
        return Ok(());
    }

    let config = Config::load(&options.config_path).with_context(|| {
        format!(
            "load config {}; run `lupa --print-example-config` to generate a template",
            options.config_path.display()
        )
    })?;

    let data_path = config.data_path()?;
    if options.print_data_path {
        println!("{}", data_path.display());
        return Ok(());
    }

    let history_dir = config.history_dir()?;
    let store = Store::open(&history_dir, config.history_max_entries()).with_context(|| {
        format!(
            "open history directory {} -- if this path is wrong, set [history].dir or LUPA_HISTORY_DIR",
            history_dir.display()
        )
    })?;

    let client = if config.backend_enabled() {
        lupa_query::Client::from_env(config.backend_base_url(), config.backend_timeout()?)
            .with_context(|| {
                format!(
                    "invalid [backend] config in {}; fix base_url/timeout values",
                    options.config_path.display()
                )
            })?
    } else {
        None
    };
    if options.check_only {
        return Ok(());
    }

    let _log_guard = init_logging(&history_dir)?;
    info!(
        data_path = %data_path.display(),
        history_dir = %history_dir.display(),
        drill_down = client.is_some(),
        "lupa starting"
    );
    if client.is_none() {
        info!(
            "drill-down disabled; export {} to enable it",
            lupa_query::TOKEN_ENV
        );
    }

    let (internal_tx, internal_rx) = mpsc::channel();
    watcher::spawn_data_watcher(data_path.clone(), internal_tx.clone());
    watcher::spawn_history_watcher(store.root().to_path_buf(), internal_tx.clone());

    let mut state = AppState::default();
    let mut runtime = QueryRuntime::new(&store, client, data_path);
    lupa_tui::run_app(&mut state, &mut runtime, internal_tx, internal_rx)
}

fn init_logging(history_dir: &std::path::Path) -> Result<tracing_appender::non_blocking::WorkerGuard> {
    let log_dir = history_dir
        .parent()
        .map(std::path::Path::to_path_buf)
        .unwrap_or_else(|| history_dir.to_path_buf());
    let appender = tracing_appender::rolling::never(&log_dir, "lupa.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .init();
    Ok(guard)
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct CliOptions {
    config_path: PathBuf,
    print_config_path: bool,
    print_data_path: bool,
    print_example: bool,
    check_only: bool,
    show_help: bool,
}

fn parse_cli_args<I, S>(args: I, default_config_path: PathBuf) -> Result<CliOptions>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut options = CliOptions {
        config_path: default_config_path,
        print_config_path: false,
        print_data_path: false,
        print_example: false,
        check_only: false,
        show_help: false,
    };

    let mut iter = args.into_iter();
    while let Some(arg) = iter.next() {
        match arg.as_ref() {
            "--config" => {
                let value = iter
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("--config requires a file path"))?;
                options.config_path = PathBuf::from(value.as_ref());
            }
            "--print-config-path" => {
                options.print_config_path = true;
            }
            "--print-data-path" => {
                options.print_data_path = true;
            }
            "--print-example-config" => {
                options.print_example = true;
            }
            "--check" => {
                options.check_only = true;
            }
            "--help" | "-h" => {
                options.show_help = true;
            }
            unknown => {
                return Err(anyhow::anyhow!(
                    "unknown argument {unknown:?}; run with --help to see supported options"
                ));
            }
        }
    }

    Ok(options)
}

fn print_help() {
    println!("lupa");
    println!("  --config <path>          Use a specific config path");
    println!("  --print-config-path      Print resolved config path");
    println!("  --print-data-path        Print resolved data file path");
    println!("  --print-example-config   Print a config template");
    println!("  --check                  Validate config + history dir + backend settings");
    println!("  --help                   Show this help");
}
