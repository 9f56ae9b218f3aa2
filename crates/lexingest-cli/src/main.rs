use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context;
use chrono::{NaiveDate, Utc};
use clap::{Args, Parser, Subcommand, ValueEnum};
use lexingest_core::{Command, Normalizer};
use lexingest_net::TransportConfig;
use lexingest_run::{
    ResultStore, StatusReporter, analyze_missing_courts, execute, fetch_court_data, ingest_cases,
    ingest_laws, parse_missing_courts,
};
use lexingest_sinks::{ApiSettings, DestinationClient, SinkTarget, open_sink};
use lexingest_sources::{SourceOptions, SourceRegistry};
use tracing::{Level, error};

mod display;

/// Exit code for failures outside a run (bad configuration, unreachable API).
const EXIT_FAILURE: u8 = 2;

/// Ten years.
const MAX_STALE_HOURS: i64 = 24 * 365 * 10;

#[derive(Parser, Debug)]
#[command(
    name = "lexingest",
    version,
    about = "Ingest legal texts and court decisions into Open Legal Data"
)]
struct Cli {
    /// Enable debug logging
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    /// Directory holding one result file per (command, provider)
    #[arg(
        long,
        global = true,
        env = "LEXINGEST_RESULTS_DIR",
        default_value = "results"
    )]
    results_dir: PathBuf,

    #[command(flatten)]
    api: ApiArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug)]
struct ApiArgs {
    /// Destination API base URL
    #[arg(long, global = true, env = "OLDP_API_URL")]
    api_url: Option<String>,

    /// Destination API token
    #[arg(long, global = true, env = "OLDP_API_TOKEN", hide_env_values = true)]
    api_token: Option<String>,

    /// HTTP basic auth in front of the API, as user:password
    #[arg(long, global = true, env = "OLDP_API_HTTP_AUTH", hide_env_values = true)]
    http_auth: Option<String>,
}

impl ApiArgs {
    fn settings(&self) -> ApiSettings {
        ApiSettings {
            url: self.api_url.clone().unwrap_or_default(),
            token: self.api_token.clone(),
            http_auth: self.http_auth.clone(),
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the destination API root document
    Info,

    /// Ingest law books and their articles
    Laws {
        /// Provider name (e.g. ris, dummy)
        provider: String,

        /// Free-text filter passed to the provider
        #[arg(long)]
        search_term: Option<String>,

        #[command(flatten)]
        source: SourceArgs,

        #[command(flatten)]
        delivery: DeliveryArgs,
    },

    /// Ingest court decisions
    Cases {
        /// Provider name (e.g. ris, dummy)
        provider: String,

        /// Court type filter (e.g. BGH)
        #[arg(long)]
        court: Option<String>,

        #[command(flatten)]
        source: SourceArgs,

        #[command(flatten)]
        delivery: DeliveryArgs,
    },

    /// Show the last run of every provider and whether it is stale
    Status {
        /// Hours after which a run counts as stale
        #[arg(
            long,
            default_value_t = lexingest_run::DEFAULT_STALE_HOURS,
            value_parser = clap::value_parser!(u32).range(1..=MAX_STALE_HOURS)
        )]
        stale_hours: u32,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Match court names the destination could not resolve against its known courts
    AnalyzeCourts {
        /// Log file to scan, or - for stdin
        #[arg(long, short)]
        input: PathBuf,

        /// Output format
        #[arg(long, value_enum, default_value_t = ReportFormat::Table)]
        format: ReportFormat,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum ReportFormat {
    Table,
    Tsv,
}

#[derive(Args, Debug)]
struct SourceArgs {
    /// Fixture file (dummy provider)
    #[arg(long)]
    path: Option<PathBuf>,

    /// Earliest date, YYYY-MM-DD
    #[arg(long)]
    date_from: Option<NaiveDate>,

    /// Latest date, YYYY-MM-DD
    #[arg(long)]
    date_to: Option<NaiveDate>,

    /// Stop after this many records (law books for `laws`)
    #[arg(long)]
    limit: Option<usize>,

    /// Seconds between source requests
    #[arg(long, value_parser = parse_seconds, default_value = "0.2")]
    request_delay: Duration,
}

#[derive(Args, Debug)]
struct DeliveryArgs {
    /// Where records are delivered
    #[arg(long, value_enum, default_value_t = SinkKind::Api)]
    sink: SinkKind,

    /// Output directory for the json-file sink
    #[arg(long)]
    output_dir: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum SinkKind {
    Api,
    JsonFile,
}

impl DeliveryArgs {
    fn target(&self, api: &ApiArgs) -> SinkTarget {
        match self.sink {
            SinkKind::Api => SinkTarget::Api(api.settings()),
            SinkKind::JsonFile => SinkTarget::JsonFile {
                output_dir: self.output_dir.clone(),
            },
        }
    }
}

fn parse_seconds(s: &str) -> Result<Duration, String> {
    let secs: f64 = s
        .parse()
        .map_err(|_| format!("'{s}' is not a number of seconds"))?;
    Duration::try_from_secs_f64(secs).map_err(|_| format!("'{s}' is not a valid delay"))
}

impl SourceArgs {
    fn options(&self) -> SourceOptions {
        SourceOptions {
            path: self.path.clone(),
            date_from: self.date_from,
            date_to: self.date_to,
            transport: TransportConfig::default().with_request_delay(self.request_delay),
            ..SourceOptions::default()
        }
    }
}

fn init_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let registry = SourceRegistry::builtin();
    let store = ResultStore::new(&cli.results_dir);

    let outcome = match &cli.command {
        Commands::Info => cmd_info(&cli.api),
        Commands::Laws {
            provider,
            search_term,
            source,
            delivery,
        } => {
            let options = SourceOptions {
                search_term: search_term.clone(),
                ..source.options()
            };
            let target = delivery.target(&cli.api);
            let result = execute(provider, Command::Laws, Some(&store), |recorder| {
                let adapter = registry
                    .law_source(provider, &options)
                    .with_context(|| format!("failed to open laws provider '{provider}'"))?;
                let mut sink = open_sink(&target).context("failed to open sink")?;
                ingest_laws(
                    adapter.as_ref(),
                    &Normalizer::default(),
                    sink.as_mut(),
                    source.limit,
                    recorder,
                )?;
                Ok(())
            });
            Ok(ExitCode::from(result.exit_code()))
        }
        Commands::Cases {
            provider,
            court,
            source,
            delivery,
        } => {
            let options = SourceOptions {
                court: court.clone(),
                ..source.options()
            };
            let target = delivery.target(&cli.api);
            let result = execute(provider, Command::Cases, Some(&store), |recorder| {
                let adapter = registry
                    .case_source(provider, &options)
                    .with_context(|| format!("failed to open cases provider '{provider}'"))?;
                let mut sink = open_sink(&target).context("failed to open sink")?;
                ingest_cases(
                    adapter.as_ref(),
                    &Normalizer::default(),
                    sink.as_mut(),
                    source.limit,
                    recorder,
                )?;
                Ok(())
            });
            Ok(ExitCode::from(result.exit_code()))
        }
        Commands::Status { stale_hours, json } => {
            cmd_status(&registry, &store, *stale_hours, *json)
        }
        Commands::AnalyzeCourts { input, format } => cmd_analyze_courts(&cli.api, input, *format),
    };

    match outcome {
        Ok(code) => code,
        Err(e) => {
            error!("{e:#}");
            ExitCode::from(EXIT_FAILURE)
        }
    }
}

fn cmd_info(api: &ApiArgs) -> anyhow::Result<ExitCode> {
    let client = DestinationClient::connect(&api.settings())?;
    let info = client
        .info()
        .context("failed to fetch the destination API root")?;
    println!("{}", serde_json::to_string_pretty(&info)?);
    Ok(ExitCode::SUCCESS)
}

fn cmd_status(
    registry: &SourceRegistry,
    store: &ResultStore,
    stale_hours: u32,
    json: bool,
) -> anyhow::Result<ExitCode> {
    let results = store.read_all();
    let report = StatusReporter::new(registry.monitored())
        .with_stale_hours(stale_hours)
        .report(&results, Utc::now());

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", display::status_table(&report));
        println!("{}", display::summary(&report));
    }
    Ok(ExitCode::from(report.exit_code()))
}

fn read_input(input: &Path) -> anyhow::Result<String> {
    let mut bytes = Vec::new();
    if input.as_os_str() == "-" {
        std::io::stdin()
            .read_to_end(&mut bytes)
            .context("failed to read stdin")?;
    } else {
        bytes = std::fs::read(input)
            .with_context(|| format!("failed to read {}", input.display()))?;
    }
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn cmd_analyze_courts(
    api: &ApiArgs,
    input: &Path,
    format: ReportFormat,
) -> anyhow::Result<ExitCode> {
    let text = read_input(input)?;
    let missing = parse_missing_courts(text.lines());
    if missing.is_empty() {
        println!("No 'court_not_found' errors found in input.");
        return Ok(ExitCode::SUCCESS);
    }

    let client = DestinationClient::connect(&api.settings())?;
    let (courts, states) =
        fetch_court_data(&client).context("failed to fetch courts from the destination API")?;
    let analyses = analyze_missing_courts(&missing, &courts, &states);
    match format {
        ReportFormat::Table => println!("{}", display::missing_courts_report(&analyses)),
        ReportFormat::Tsv => println!("{}", display::missing_courts_tsv(&analyses)),
    }
    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_laws_with_json_file_sink() {
        let cli = Cli::try_parse_from([
            "lexingest",
            "laws",
            "ris",
            "--search-term",
            "Bürgerliches",
            "--date-from",
            "2024-01-01",
            "--limit",
            "3",
            "--sink",
            "json-file",
            "--output-dir",
            "/tmp/out",
        ])
        .unwrap();
        let Commands::Laws {
            provider,
            search_term,
            source,
            delivery,
        } = &cli.command
        else {
            panic!("expected laws");
        };
        assert_eq!(provider, "ris");
        assert_eq!(search_term.as_deref(), Some("Bürgerliches"));
        assert_eq!(source.date_from, NaiveDate::from_ymd_opt(2024, 1, 1));
        assert_eq!(source.limit, Some(3));
        assert_eq!(source.request_delay, Duration::from_millis(200));
        assert_eq!(
            delivery.target(&cli.api),
            SinkTarget::JsonFile {
                output_dir: Some(PathBuf::from("/tmp/out"))
            }
        );
    }

    #[test]
    fn rejects_malformed_dates_and_delays() {
        assert!(Cli::try_parse_from(["lexingest", "cases", "ris", "--date-to", "04.03.2021"]).is_err());
        assert!(Cli::try_parse_from(["lexingest", "cases", "ris", "--request-delay", "-1"]).is_err());
        assert!(Cli::try_parse_from(["lexingest", "cases", "ris", "--request-delay", "x"]).is_err());
    }

    #[test]
    fn api_flags_reach_the_api_sink() {
        let cli = Cli::try_parse_from([
            "lexingest",
            "cases",
            "dummy",
            "--api-url",
            "https://de.openlegaldata.io",
            "--api-token",
            "secret",
            "--request-delay",
            "0",
        ])
        .unwrap();
        let Commands::Cases {
            source, delivery, ..
        } = &cli.command
        else {
            panic!("expected cases");
        };
        assert_eq!(source.request_delay, Duration::ZERO);
        let SinkTarget::Api(settings) = delivery.target(&cli.api) else {
            panic!("expected the api sink");
        };
        assert_eq!(settings.url, "https://de.openlegaldata.io");
        assert_eq!(settings.token.as_deref(), Some("secret"));
    }

    #[test]
    fn status_defaults() {
        let cli = Cli::try_parse_from(["lexingest", "status"]).unwrap();
        assert_eq!(cli.results_dir, PathBuf::from("results"));
        let Commands::Status { stale_hours, json } = cli.command else {
            panic!("expected status");
        };
        assert_eq!(stale_hours, 72);
        assert!(!json);
    }

    #[test]
    fn analyze_courts_reads_a_file_or_stdin() {
        let cli = Cli::try_parse_from(["lexingest", "analyze-courts", "--input", "-", "--format", "tsv"])
            .unwrap();
        let Commands::AnalyzeCourts { input, format } = cli.command else {
            panic!("expected analyze-courts");
        };
        assert_eq!(input, PathBuf::from("-"));
        assert_eq!(format, ReportFormat::Tsv);

        let cli = Cli::try_parse_from(["lexingest", "analyze-courts", "-i", "ingest.log"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::AnalyzeCourts {
                format: ReportFormat::Table,
                ..
            }
        ));
        assert!(Cli::try_parse_from(["lexingest", "analyze-courts"]).is_err());
        assert!(Cli::try_parse_from(["lexingest", "analyze-courts", "-i", "x", "--format", "csv"]).is_err());
    }

    #[test]
    fn logs_without_court_errors_need_no_api() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("ingest.log");
        std::fs::write(&log, "INFO everything is fine\n").unwrap();
        // No API URL configured: reaching the client would fail.
        let api = ApiArgs {
            api_url: None,
            api_token: None,
            http_auth: None,
        };
        let code = cmd_analyze_courts(&api, &log, ReportFormat::Table).unwrap();
        assert_eq!(code, ExitCode::SUCCESS);

        assert!(cmd_analyze_courts(&api, &dir.path().join("missing.log"), ReportFormat::Table).is_err());
    }

    #[test]
    fn stale_hours_must_be_in_range() {
        for bad in ["0", "-5", "9223372036854775807", "87601"] {
            assert!(
                Cli::try_parse_from(["lexingest", "status", "--stale-hours", bad]).is_err(),
                "accepted {bad}"
            );
        }
        let cli = Cli::try_parse_from(["lexingest", "status", "--stale-hours", "87600"]).unwrap();
        assert!(matches!(cli.command, Commands::Status { stale_hours: 87_600, .. }));
    }
}
