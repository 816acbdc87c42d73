use std::io;
use std::path::{Path, PathBuf};

#[macro_use]
extern crate lazy_static;

use chrono::{Local, NaiveDate};
use clap::{App, Arg, ArgMatches};
use rpassword::prompt_password_stdout;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod catalog;
mod clock;
mod common;
mod config;
mod fetch;
mod fred;
mod orchestrator;
mod status;
mod store;

use catalog::parse::{parse_h41, parse_h8};
use catalog::{read_catalog_file, Catalog, CatalogError, CatalogNode, Family};
use clock::SystemClock;
use config::{api_key_from_secret, load_secret_config, AcquisitionConfig, ConfigError};
use fetch::{FetchClient, RateLimiter};
use fred::FredApi;
use orchestrator::DownloadSettings;
use store::{FileSeriesWriter, FlatFileIndex, StoreError};

#[derive(Debug, thiserror::Error)]
enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("failed to read API key: {0}")]
    Prompt(io::Error),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("nothing to do, pass --h8, --h41 or --status")]
    NothingToDo,
}

lazy_static! {
    static ref MAX_AGE_DAYS_ARG: String = status::DEFAULT_MAX_AGE_DAYS.to_string();
}

fn command_usage<'a, 'b>() -> App<'a, 'b> {
    const HTTP_CONNECT_TIMEOUT: &str = "10000";
    const HTTP_RECEIVE_TIMEOUT: &str = "60000";

    App::new("fred-acquisition")
    .author("Matthew Scheffel <matt@dataheck.com>")
    .about("Downloads H.8 and H.4.1 series from FRED into flat files")
    .arg(
        Arg::with_name("h8")
            .long("h8")
            .takes_value(false)
            .help("Download every series named in the H8 catalog")
    )
    .arg(
        Arg::with_name("h41")
            .long("h41")
            .takes_value(false)
            .help("Download every series named in the H41 catalog")
    )
    .arg(
        Arg::with_name("table")
            .long("table")
            .takes_value(true)
            .requires("h41")
            .help("Only download one H41 table, e.g. table1")
    )
    .arg(
        Arg::with_name("start")
            .long("start")
            .takes_value(true)
            .help("First observation date to request (YYYY-MM-DD)")
    )
    .arg(
        Arg::with_name("end")
            .long("end")
            .takes_value(true)
            .help("Last observation date to request (YYYY-MM-DD)")
    )
    .arg(
        Arg::with_name("status")
            .long("status")
            .takes_value(false)
            .help("Report how recent the downloaded series are and which files are missing from the indexes")
    )
    .arg(
        Arg::with_name("max-age-days")
            .long("max-age-days")
            .takes_value(true)
            .default_value(MAX_AGE_DAYS_ARG.as_str())
            .help("A series whose last observation is older than this many days is reported as stale")
    )
    .arg(
        Arg::with_name("root")
            .long("root")
            .takes_value(true)
            .help("Data directory, overrides `data_root` from the configuration")
    )
    .arg(
        Arg::with_name("config")
            .takes_value(true)
            .help("Location of acquisition configuration")
            .default_value("config/acquisition.toml")
    )
    .arg(
        Arg::with_name("secret-config")
            .takes_value(true)
            .help("Location of private configuration (api keys)")
            .default_value("config/secret.toml")
    )
    .arg(
        Arg::with_name("http-connect-timeout")
            .long("http-connect-timeout")
            .takes_value(true)
            .default_value(HTTP_CONNECT_TIMEOUT)
            .help("HTTP connection timeout in milliseconds")
    )
    .arg(
        Arg::with_name("http-receive-timeout")
            .long("http-receive-timeout")
            .takes_value(true)
            .default_value(HTTP_RECEIVE_TIMEOUT)
            .help("HTTP receive timeout in milliseconds")
    )
}

fn init_tracing() {
    let json_format = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("fred_acquisition=info"));

    if json_format {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn parse_number<T: std::str::FromStr>(matches: &ArgMatches, name: &str) -> Result<T, AppError> {
    let raw = matches.value_of(name).unwrap_or_default();
    raw.parse::<T>().map_err(|_| AppError::InvalidArgument(format!("--{} expects a number, got `{}`", name, raw)))
}

fn parse_optional_date(matches: &ArgMatches, name: &str) -> Result<Option<NaiveDate>, AppError> {
    match matches.value_of(name) {
        Some(raw) => {
            common::parse_date(raw).map(Some).map_err(|e| AppError::InvalidArgument(format!("--{}: {}", name, e)))
        },
        None => { Ok(None) }
    }
}

fn obtain_api_key(secret_path: &Path) -> Result<String, AppError> {
    let secret = load_secret_config(secret_path)?;
    if let Some(key) = api_key_from_secret(secret.as_ref()) {
        return Ok(key);
    }

    info!("No FRED key in {}, asking for one.", secret_path.display());
    let key = prompt_password_stdout("FRED API key: ").map_err(AppError::Prompt)?;
    let key = key.trim().to_owned();
    if key.is_empty() {
        return Err(ConfigError::MissingApiKey.into());
    }
    Ok(key)
}

fn select_table(tree: CatalogNode, table: Option<&str>) -> Result<CatalogNode, AppError> {
    match table {
        Some(name) => {
            match tree.child(name) {
                Some(node) => { Ok(CatalogNode::group().with_child(name, node.clone())) },
                None => { Err(AppError::InvalidArgument(format!("table `{}` is not in the H41 catalog", name))) }
            }
        },
        None => { Ok(tree) }
    }
}

fn download(matches: &ArgMatches, config: &AcquisitionConfig, data_root: &Path) -> Result<(), AppError> {
    let start = parse_optional_date(matches, "start")?;
    let end = parse_optional_date(matches, "end")?;
    if let (Some(s), Some(e)) = (start, end) {
        if s > e {
            return Err(AppError::InvalidArgument(format!("--start {} is after --end {}", s, e)));
        }
    }

    // read catalogs before asking for a key so a typo in a path fails fast
    let mut jobs = Vec::new();
    if matches.is_present("h8") {
        let text = read_catalog_file(&config.h8_catalog())?;
        jobs.push((Family::H8, Catalog::Flat(parse_h8(&text, data_root))));
    }
    if matches.is_present("h41") {
        let text = read_catalog_file(&config.h41_catalog())?;
        let tree = select_table(parse_h41(&text, data_root), matches.value_of("table"))?;
        jobs.push((Family::H41, Catalog::Tree(tree)));
    }

    let api_key = obtain_api_key(Path::new(matches.value_of("secret-config").unwrap_or_default()))?;
    let http_connect_timeout = parse_number::<u64>(matches, "http-connect-timeout")?;
    let http_receive_timeout = parse_number::<u64>(matches, "http-receive-timeout")?;

    let limiter = RateLimiter::new(SystemClock, config.rate_limit.max_requests, config.rate_window());
    let mut client = FetchClient::new(
        FredApi::new(api_key, http_connect_timeout, http_receive_timeout),
        limiter,
        SystemClock,
        config.retry_delay(),
    );
    let mut writer = FileSeriesWriter::new();
    let mut index = FlatFileIndex::new(data_root);

    for (family, catalog) in jobs {
        let settings = DownloadSettings::from_config(family, config).with_range(start, end);
        orchestrator::run(&catalog, &mut client, &mut writer, &mut index, &settings);
    }

    info!("{} requests sent to FRED.", client.attempts_made());
    Ok(())
}

fn report_status(matches: &ArgMatches, data_root: &Path) -> Result<(), AppError> {
    let max_age_days = parse_number::<u64>(matches, "max-age-days")?;
    let today = Local::now().naive_local().date();
    let cutoff = status::stale_cutoff(today, max_age_days)
        .ok_or_else(|| AppError::InvalidArgument(format!("--max-age-days {} reaches past the earliest supported date", max_age_days)))?;
    let index = FlatFileIndex::new(data_root);

    for family in Family::all().iter() {
        let report = status::family_status(&index, data_root, *family, cutoff)?;
        status::log_report(*family, &report);
    }

    Ok(())
}

fn run(matches: &ArgMatches) -> Result<(), AppError> {
    let config = AcquisitionConfig::load(Path::new(matches.value_of("config").unwrap_or_default()))?;
    let data_root = match matches.value_of("root") {
        Some(r) => { PathBuf::from(r) },
        None => { config.data_root.clone() }
    };

    let wants_download = matches.is_present("h8") || matches.is_present("h41");
    if !wants_download && !matches.is_present("status") {
        return Err(AppError::NothingToDo);
    }

    if wants_download {
        download(matches, &config, &data_root)?;
    }

    if matches.is_present("status") {
        report_status(matches, &data_root)?;
    }

    Ok(())
}

fn main() {
    init_tracing();

    let matches = command_usage().get_matches();

    if let Err(e) = run(&matches) {
        error!("{}", e);
        std::process::exit(1);
    }
}

#[test]
fn test_command_usage_parses_download_flags() {
    let matches = command_usage()
        .get_matches_from_safe(vec!["fred-acquisition", "--h41", "--table", "table1", "--start", "2024-01-01"])
        .unwrap();

    assert!(matches.is_present("h41"));
    assert!(!matches.is_present("h8"));
    assert_eq!(matches.value_of("table"), Some("table1"));
    assert_eq!(parse_optional_date(&matches, "start").unwrap(), NaiveDate::from_ymd_opt(2024, 1, 1));
    assert_eq!(parse_optional_date(&matches, "end").unwrap(), None);
    assert_eq!(matches.value_of("config"), Some("config/acquisition.toml"));
    assert_eq!(parse_number::<u64>(&matches, "max-age-days").unwrap(), status::DEFAULT_MAX_AGE_DAYS);
}

#[test]
fn test_table_requires_h41() {
    assert!(command_usage().get_matches_from_safe(vec!["fred-acquisition", "--table", "table1"]).is_err());
}

#[test]
fn test_invalid_date_argument() {
    let matches = command_usage().get_matches_from_safe(vec!["fred-acquisition", "--h8", "--end", "01/31/2024"]).unwrap();
    assert!(matches!(parse_optional_date(&matches, "end"), Err(AppError::InvalidArgument(_))));
}

#[test]
fn test_select_table() {
    use crate::catalog::LeafEntry;

    let tree = CatalogNode::group()
        .with_child("table1", CatalogNode::leaf(LeafEntry::new("A", "a.txt")))
        .with_child("table2", CatalogNode::leaf(LeafEntry::new("B", "b.txt")));

    let only = select_table(tree.clone(), Some("table2")).unwrap();
    assert_eq!(only.children.len(), 1);
    assert_eq!(only.leaf_count(), 1);
    assert!(only.child("table2").is_some());

    assert!(select_table(tree.clone(), Some("table9")).is_err());
    assert_eq!(select_table(tree.clone(), None).unwrap(), tree);
}

#[test]
fn test_huge_max_age_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().to_str().unwrap();
    let config = dir.path().join("absent.toml");
    let matches = command_usage()
        .get_matches_from_safe(vec!["fred-acquisition", "--status", "--max-age-days", "99999999999", "--root", root, config.to_str().unwrap()])
        .unwrap();

    assert!(matches!(run(&matches), Err(AppError::InvalidArgument(_))));
}

#[test]
fn test_negative_max_age_is_rejected() {
    let matches = command_usage()
        .get_matches_from_safe(vec!["fred-acquisition", "--status", "--max-age-days=-3"])
        .unwrap();

    assert!(matches!(report_status(&matches, Path::new("/nonexistent")), Err(AppError::InvalidArgument(_))));
}

#[test]
fn test_nothing_to_do() {
    let matches = command_usage().get_matches_from_safe(vec!["fred-acquisition", "--root", "/nonexistent"]).unwrap();
    assert!(matches!(run(&matches), Err(AppError::NothingToDo)));
}
