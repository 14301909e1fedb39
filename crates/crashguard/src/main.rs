//! `crashlog` - CLI for crashguard
//!
//! This binary reads, clears and exercises the crash report file written by
//! crashguard panic handlers.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use std::sync::Arc;

use clap::Parser;

use crashguard::cli::{
    Cli, Command, ConfigCommand, OutputFormat, ShowCommand, SimulateCommand, WipeCommand,
};
use crashguard::{init_logging, Config, CrashRecord, CrashStore, PanicHandler};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    init_logging(cli.verbosity());

    // Load configuration, letting --file override the report path
    let mut config = Config::load_from(cli.config.clone())?;
    if let Some(file) = cli.file.clone() {
        config.reports.file_path = Some(file);
    }

    match cli.command {
        Command::Show(show_cmd) => handle_show(&config.store(), &show_cmd),
        Command::Count => {
            println!("{}", config.store().count()?);
            Ok(())
        }
        Command::Wipe(wipe_cmd) => handle_wipe(&config.store(), &wipe_cmd),
        Command::Simulate(simulate_cmd) => handle_simulate(&config, &simulate_cmd),
        Command::Config(config_cmd) => handle_config(&config, config_cmd),
    }
}

fn handle_show(store: &CrashStore, cmd: &ShowCommand) -> Result<(), Box<dyn std::error::Error>> {
    let records = store.tail(cmd.last)?;

    match cmd.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&records)?),
        OutputFormat::Plain => {
            if records.is_empty() {
                println!("No crash reports in {}", store.path().display());
            }
            for record in &records {
                print_record(record, cmd.stack);
            }
        }
    }
    Ok(())
}

fn print_record(record: &CrashRecord, with_stack: bool) {
    println!("[{}] {}", record.timestamp.to_rfc3339(), record.message);
    if let Some(info) = &record.system_info {
        println!(
            "  System:   {} {} ({})",
            info.os, info.architecture, info.rust_version
        );
    }
    for (key, value) in &record.metadata {
        println!("  {key}: {value}");
    }
    if with_stack {
        println!("{}", record.stack_trace);
    }
}

fn handle_wipe(store: &CrashStore, cmd: &WipeCommand) -> Result<(), Box<dyn std::error::Error>> {
    if !cmd.yes {
        println!(
            "This will remove all crash reports in {}.",
            store.path().display()
        );
        println!("Use --yes to confirm.");
        return Ok(());
    }

    store.wipe()?;
    println!("Crash reports cleared: {}", store.path().display());
    Ok(())
}

fn handle_simulate(config: &Config, cmd: &SimulateCommand) -> Result<(), Box<dyn std::error::Error>> {
    // A simulated panic must never take the CLI down with it.
    let options = config.handler_options().exit_on_panic(false);
    let handler = Arc::new(PanicHandler::new(options));
    let message = cmd.message.clone();

    if cmd.background {
        let handle = handler.spawn_guarded(move || panic!("{message}"))?;
        let _ = handle.join();
    } else {
        handler.guard(|| panic!("{message}"));
    }

    if config.reports.dump_to_file {
        println!("Crash recorded in {}", handler.store().path().display());
    }
    Ok(())
}

fn handle_config(config: &Config, cmd: ConfigCommand) -> Result<(), Box<dyn std::error::Error>> {
    match cmd {
        ConfigCommand::Show { json } => {
            if json {
                println!("{}", serde_json::to_string_pretty(config)?);
            } else {
                println!("Current Configuration");
                println!("=====================");
                println!();
                println!("[Reports]");
                println!("  File path:          {}", config.report_path().display());
                println!("  Dump to file:       {}", config.reports.dump_to_file);
                println!("  Wipe on start:      {}", config.reports.wipe_on_start);
                println!("  Corrupt policy:     {:?}", config.reports.corrupt_policy);
                println!();
                println!("[Handler]");
                println!("  Exit on panic:      {}", config.handler.exit_on_panic);
                println!(
                    "  System info:        {}",
                    config.handler.include_system_info
                );
                println!("  Metadata entries:   {}", config.handler.metadata.len());
            }
        }
        ConfigCommand::Path => {
            println!("{}", Config::default_config_path().display());
        }
        ConfigCommand::Validate { path } => {
            let path = path.unwrap_or_else(Config::default_config_path);
            println!("Validating configuration: {}", path.display());
            match Config::load_from(Some(path)) {
                Ok(_) => println!("Configuration is valid."),
                Err(e) => println!("Configuration error: {e}"),
            }
        }
    }
    Ok(())
}
