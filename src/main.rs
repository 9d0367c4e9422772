//! conf-resolver command-line tool
//!
//! Resolves hierarchical prototxt configs against the built-in schema.

use anyhow::Result;
use clap::Parser;
use conf_resolver::cli::resolve::{self, ResolveArgs};
use conf_resolver::cli::schema::describe;
use conf_resolver::cli::{Cli, Command};
use conf_resolver::config::{ConfigResolver, WatcherConfig, parse_overrides, watch};
use conf_resolver::error::ErrorReport;
use conf_resolver::format::{OutputFormat, render_config, render_error};
use conf_resolver::logging::{self, LogTarget};
use conf_resolver::schema::builtin;
use conf_resolver::settings::{Settings, SettingsLoader, SettingsPaths};
use std::ops::ControlFlow;
use std::process::ExitCode;
use tracing::{debug, info};

/// Exit status for configs that fail to resolve or validate.
const EXIT_INVALID: u8 = 2;

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(&cli) {
        Ok(code) => code,
        Err(err) => {
            let format = cli.format.unwrap_or_default();
            eprintln!("{}", render_error(&ErrorReport::from(&err), format));
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<ExitCode> {
    let target: LogTarget = cli.log.parse()?;
    logging::init(&target, cli.verbose)?;

    let mut paths = SettingsPaths::discover();
    if let Some(path) = &cli.settings {
        paths = paths.with_explicit(path);
    }
    let loader = SettingsLoader::load_with_paths(paths)?;
    for (tier, path) in loader.loaded_from() {
        debug!("Settings tier {} loaded from {}", tier, path.display());
    }
    let mut settings = loader.into_settings();
    cli.apply(&mut settings);

    let schema = builtin();
    let resolver = settings.resolver(schema);
    let format = settings.output.format;

    match &cli.command {
        Command::Resolve(args) => match resolve::resolve(args, &resolver) {
            Ok(config) => {
                print!(
                    "{}",
                    render_config(&config, schema, format, settings.output.show_defaults)
                );
                if format == OutputFormat::Json {
                    println!();
                }
                Ok(ExitCode::SUCCESS)
            }
            Err(err) => Ok(report_failure(&ErrorReport::from(&err), format)),
        },
        Command::Validate(args) => match resolve::resolve(args, &resolver) {
            Ok(config) => {
                println!("{}", resolve::validation_summary(&config, format));
                Ok(ExitCode::SUCCESS)
            }
            Err(err) => Ok(report_failure(&ErrorReport::from(&err), format)),
        },
        Command::Schema(args) => match describe(schema, args.message.as_deref(), format) {
            Ok(text) => {
                println!("{}", text.trim_end());
                Ok(ExitCode::SUCCESS)
            }
            Err(message) => anyhow::bail!(message),
        },
        Command::Watch(args) => run_watch(args, &resolver, &settings),
    }
}

fn report_failure(report: &ErrorReport, format: OutputFormat) -> ExitCode {
    eprintln!("{}", render_error(report, format));
    ExitCode::from(EXIT_INVALID)
}

fn run_watch(
    args: &ResolveArgs,
    resolver: &ConfigResolver<'_>,
    settings: &Settings,
) -> Result<ExitCode> {
    let overrides = match parse_overrides(&args.overrides) {
        Ok(overrides) => overrides,
        Err(err) => {
            return Ok(report_failure(
                &ErrorReport::from(&err),
                settings.output.format,
            ));
        }
    };
    info!("Watching {} for changes", args.config.display());

    watch(
        resolver,
        &args.config,
        &overrides,
        WatcherConfig::default(),
        |result| {
            match result {
                Ok(config) => print!(
                    "{}",
                    render_config(
                        config,
                        resolver.schema(),
                        settings.output.format,
                        settings.output.show_defaults
                    )
                ),
                Err(err) => {
                    eprintln!("{}", render_error(&ErrorReport::from(err), settings.output.format));
                }
            }
            ControlFlow::Continue(())
        },
    )?;
    Ok(ExitCode::SUCCESS)
}
