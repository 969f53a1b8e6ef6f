use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Arg, ArgAction, ArgMatches, Command, value_parser};
use collector::{RunOptions, parse_filters, run_collection};
use common::config::Settings;
use common::logging::init_tracing;
use std::process;

fn cli() -> Command {
    Command::new("Metadata Collector")
        .version("1.0")
        .about("Profiles the metadata side-car files stored in an S3 bucket")
        .subcommand(
            Command::new("collect")
                .about("Collect metadata files for a date window and print a JSON report")
                .arg(
                    Arg::new("config")
                        .short('c')
                        .long("config")
                        .value_name("FILE")
                        .default_value("config/collector.toml")
                        .help("Sets a custom config file"),
                )
                .arg(
                    Arg::new("start")
                        .long("start")
                        .value_name("RFC3339")
                        .value_parser(parse_timestamp)
                        .help("Inclusive window start (defaults to end minus lookback_hours)"),
                )
                .arg(
                    Arg::new("end")
                        .long("end")
                        .value_name("RFC3339")
                        .value_parser(parse_timestamp)
                        .help("Inclusive window end (defaults to now)"),
                )
                .arg(
                    Arg::new("prefix")
                        .long("prefix")
                        .value_name("PREFIX")
                        .help("Only list keys under this prefix"),
                )
                .arg(
                    Arg::new("filter")
                        .long("filter")
                        .value_name("FIELD=V1,V2")
                        .action(ArgAction::Append)
                        .help("Only aggregate records whose FIELD is one of the values"),
                )
                .arg(
                    Arg::new("concurrency")
                        .long("concurrency")
                        .value_name("N")
                        .value_parser(value_parser!(usize))
                        .help("Maximum concurrent downloads"),
                )
                .arg(
                    Arg::new("include-records")
                        .long("include-records")
                        .action(ArgAction::SetTrue)
                        .help("Include every collected record in the report"),
                ),
        )
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(value)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| format!("invalid RFC3339 timestamp: {}", e))
}

fn run_options(matches: &ArgMatches) -> Result<RunOptions> {
    let clauses = matches
        .get_many::<String>("filter")
        .into_iter()
        .flatten()
        .map(String::as_str);

    Ok(RunOptions {
        start: matches.get_one::<DateTime<Utc>>("start").copied(),
        end: matches.get_one::<DateTime<Utc>>("end").copied(),
        prefix: matches.get_one::<String>("prefix").cloned(),
        filters: parse_filters(clauses)?,
        concurrency: matches.get_one::<usize>("concurrency").copied(),
        include_records: matches.get_flag("include-records"),
    })
}

async fn collect(matches: &ArgMatches) -> Result<()> {
    let config_path = matches
        .get_one::<String>("config")
        .map(|s| s.as_str())
        .unwrap_or("config/collector.toml");

    let settings = Settings::new(config_path)
        .with_context(|| format!("failed to load settings from {}", config_path))?;
    init_tracing(&settings.logging)?;

    let options = run_options(matches)?;
    let report = run_collection(&settings, &options).await?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

#[tokio::main]
async fn main() {
    let matches = cli().get_matches();

    match matches.subcommand() {
        Some(("collect", collect_matches)) => {
            if let Err(e) = collect(collect_matches).await {
                eprintln!("Metadata collection error: {:#}", e);
                process::exit(1);
            }
        }
        _ => {
            eprintln!("No subcommand specified. Use --help for usage information.");
            process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_is_well_formed() {
        cli().debug_assert();
    }

    #[test]
    fn test_collect_arguments() {
        let matches = cli()
            .try_get_matches_from([
                "metadata-collector",
                "collect",
                "--start",
                "2024-05-01T00:00:00Z",
                "--filter",
                "dept=Sales,HR",
                "--filter",
                "type=report",
                "--concurrency",
                "4",
                "--include-records",
            ])
            .unwrap();
        let (_, collect_matches) = matches.subcommand().unwrap();
        let options = run_options(collect_matches).unwrap();

        assert_eq!(options.start.unwrap().to_rfc3339(), "2024-05-01T00:00:00+00:00");
        assert!(options.end.is_none());
        assert_eq!(options.concurrency, Some(4));
        assert!(options.include_records);
        assert_eq!(
            options.filters,
            vec![
                ("dept".to_string(), vec!["Sales".to_string(), "HR".to_string()]),
                ("type".to_string(), vec!["report".to_string()]),
            ]
        );
    }

    #[test]
    fn test_rejects_bad_timestamp() {
        let result = cli().try_get_matches_from(["metadata-collector", "collect", "--end", "yesterday"]);
        assert!(result.is_err());
    }
}
