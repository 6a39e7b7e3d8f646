use anyhow::{bail, Context as _, Result};

use devicelog::config::{self, Config};
use devicelog::logging::{self, LogEngine, LogLevel, LogOptions, RecordFilter};

const USAGE: &str = "\
Usage: devicelog <command>

Commands:
  init                    Write a default config file if none exists
  health                  Print a health report as JSON
  recent                  Print buffered error and critical records as JSON
  stats                   Print statistics over buffered records as JSON
  export-json             Export buffered records as JSON
  export-csv              Export buffered records as CSV
  prune                   Delete archived log files past retention
  clear                   Delete all log files and empty the buffer
  archive                 Archive the active log file and empty the buffer
  emit <level> <message>  Log a message at the given level";

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first() else {
        println!("{}", USAGE);
        return Ok(());
    };

    if command == "init" {
        return init_config();
    }

    let config = Config::load()?;
    config::ensure_directories(&config)?;

    // Console logging goes to stderr so stdout stays clean for exports
    logging::init_console_logging("devicelog=info")?;

    let engine = LogEngine::from_config(&config).await;

    match command.as_str() {
        "health" => {
            let report = engine.check_health().await;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if !report.is_healthy() {
                std::process::exit(1);
            }
        }
        "recent" => {
            let records = engine.recent_records().await;
            println!("{}", serde_json::to_string_pretty(&records)?);
        }
        "stats" => {
            let report = engine.statistics(None).await;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        "export-json" => println!("{}", engine.export_json(&RecordFilter::all()).await),
        "export-csv" => print!("{}", engine.export_csv(&RecordFilter::all()).await),
        "prune" => {
            let count = engine.prune_archives().await;
            println!("Deleted {} archived log file(s)", count);
        }
        "clear" => engine.clear_all().await,
        "archive" => engine.archive_and_clear().await,
        "emit" => {
            let level_name = args.get(1).context("emit requires a level")?;
            let Some(level) = LogLevel::parse(level_name) else {
                bail!("Unknown level '{}'", level_name);
            };
            let message = args[2..].join(" ");
            if message.is_empty() {
                bail!("emit requires a message");
            }
            engine.log(message, level, LogOptions::default()).await;
        }
        other => {
            eprintln!("Unknown command '{}'\n\n{}", other, USAGE);
            std::process::exit(2);
        }
    }

    Ok(())
}

fn init_config() -> Result<()> {
    let path = config::config_file_path();
    if path.exists() {
        println!("Config already exists at {}", path.display());
        return Ok(());
    }

    let config = Config::default();
    config::ensure_directories(&config)?;
    config.save()?;
    println!("Wrote default config to {}", path.display());
    Ok(())
}
