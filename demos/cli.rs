//! Fetch readings for a date range and print per-station totals.
//!
//! ```text
//! cargo run --example cli -- --start 2024-01-01 --end 2024-01-07 \
//!     --station E7050 --station E7090 --parameter rainfall --output rainfall.csv
//! ```
//!
//! `EA_*` environment variables configure the client; flags override them.
//! Environment Agency data is published under the Open Government Licence.

use std::io;
use std::path::PathBuf;

use chrono::Utc;
use clap::Parser;
use ea_readings::{ClientOptions, MeasurementType, Pipeline, ReadingsQuery, Result, export};
use tracing::{debug, info};

#[derive(Parser, Debug)]
#[command(name = "ea-readings")]
#[command(version, about)]
struct Args {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Built-in source (ea-flood, ea-hydrology) or a base URL
    #[arg(long)]
    source: Option<String>,

    /// First day: YYYY-MM-DD, YYYYMMDD or a relative day such as -1
    #[arg(long, default_value = "-1")]
    start: String,

    /// Last day, inclusive. Defaults to the start day
    #[arg(long)]
    end: Option<String>,

    /// Station reference; repeat for several stations
    #[arg(long = "station")]
    stations: Vec<String>,

    /// Measurement type, e.g. rainfall or level
    #[arg(long, default_value = "rainfall")]
    parameter: String,

    /// Maximum pages per station
    #[arg(long)]
    max_pages: Option<usize>,

    /// Write the dataset here; `.json` selects JSON, anything else CSV
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let default_level = match args.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    debug!(?args, "arguments parsed");

    let mut opts = ClientOptions::from_env()?;
    if let Some(source) = args.source {
        opts = opts.source(source);
    }
    if let Some(max_pages) = args.max_pages {
        opts = opts.max_pages(max_pages);
    }

    let mut pairs = vec![
        ("startdate".to_string(), args.start),
        ("parameter".to_string(), args.parameter),
    ];
    if let Some(end) = args.end {
        pairs.push(("enddate".to_string(), end));
    }
    if !args.stations.is_empty() {
        pairs.push(("stationReference".to_string(), args.stations.join(",")));
    }
    let query = ReadingsQuery::from_str_pairs(pairs, Utc::now())?;
    let parameter = query
        .parameter_filter()
        .cloned()
        .unwrap_or(MeasurementType::Rainfall);

    let pipeline = Pipeline::new(opts)?;
    info!(source = pipeline.client().base_url(), "fetching readings");
    let dataset = pipeline.run(&query).await?;

    let summary = dataset.summary();
    println!(
        "{} records from {} pages ({} rejected, {} duplicates)",
        dataset.len(),
        summary.pages,
        summary.rejected,
        summary.duplicates
    );
    for total in dataset.totals_by_station(&parameter) {
        println!(
            "{:<12} {:>10.2} {} over {} readings",
            total.station_id, total.total, parameter, total.count
        );
    }

    match args.output {
        Some(path) if path.extension().is_some_and(|e| e == "json") => {
            export::write_json(&dataset, std::fs::File::create(&path)?)?;
            info!(path = %path.display(), "wrote json");
        }
        Some(path) => export::write_csv_file(&dataset, &path)?,
        None if dataset.len() <= 20 => export::write_csv(&dataset, io::stdout().lock())?,
        None => {}
    }

    Ok(())
}
