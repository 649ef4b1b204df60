extern crate log;
pub mod cancel;
pub mod clean;
pub mod config;
pub mod error;
pub mod geofile;
pub mod osm;
pub mod pipeline;
pub mod query;
pub mod schema;
pub mod source;
pub mod xform;
use crate::cancel::CancellationToken;
use crate::clean::IdentityCleaner;
use crate::config::{Config, DatabaseConfig};
use crate::error::ExtractError;
use crate::geofile::boundary::Boundary;
use crate::osm::download::OverpassClient;
use crate::schema::category::Category;
use crate::source::file::FileSource;
use crate::source::postgres::LocalQueryEngine;
use crate::source::snapshot::RemoteSnapshotClient;
use crate::source::FeatureSource;
use crate::xform::output_name_from_xform;
use clap::{ArgGroup, Parser};
use log::LevelFilter;
use std::path::PathBuf;
use std::time::Duration;

/// Database name that selects the remote snapshot service instead of a local
/// PostGIS database.
const UNDERPASS: &str = "underpass";

/// Extract OSM features of one category inside a boundary for field mapping.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(group(
    ArgGroup::new("source")
        .required(true)
        .args(["postgres", "overpass", "infile"]),
))]
struct Args {
    /// Query a PostGIS database, or the remote snapshot service when the
    /// database is "underpass" or cannot be reached.
    #[arg(short, long)]
    postgres: bool,

    /// Query buildings from the Overpass API.
    #[arg(short, long)]
    overpass: bool,

    /// Read features from a GeoJSON file.
    #[arg(short, long)]
    infile: Option<PathBuf>,

    /// GeoJSON file with the boundary polygon, or a "minx,miny,maxx,maxy" BBOX.
    #[arg(short, long)]
    boundary: String,

    #[arg(short, long, value_enum, default_value_t = Category::Buildings)]
    category: Category,

    /// Output GeoJSON file. Defaults to the file the category's XForm loads.
    #[arg(short, long)]
    geojson: Option<PathBuf>,

    #[arg(short = 'n', long)]
    dbname: Option<String>,

    #[arg(short = 'H', long)]
    dbhost: Option<String>,

    /// Log at debug level.
    #[arg(short, long)]
    verbose: bool,

    /// Path to the YAML config file.
    #[arg(long)]
    config: Option<PathBuf>,
}

fn init_logging(config: &Config, verbose: bool) -> anyhow::Result<()> {
    let level = if verbose {
        LevelFilter::Debug
    } else {
        config.log_level_filter()?
    };
    let mut builder = env_logger::Builder::new();
    builder.filter_level(level);
    if std::env::var("RUST_LOG").is_ok() {
        builder.parse_default_env();
    }
    builder.try_init()?;
    Ok(())
}

fn snapshot_source(config: &Config) -> anyhow::Result<FeatureSource> {
    log::info!("Using the snapshot service at {}", config.snapshot.base_url);
    Ok(FeatureSource::Snapshot(RemoteSnapshotClient::new(
        &config.snapshot,
    )?))
}

fn database_source(database: &DatabaseConfig, config: &Config) -> anyhow::Result<FeatureSource> {
    if database.dbname.as_deref() == Some(UNDERPASS) {
        return snapshot_source(config);
    }
    match LocalQueryEngine::connect(database) {
        Ok(engine) => Ok(FeatureSource::Postgres {
            engine,
            tag_join: config.tag_join,
        }),
        Err(ExtractError::Connection { message }) => {
            log::warn!("No local database ({}), falling back to snapshots", message);
            snapshot_source(config)
        }
        Err(err) => Err(err.into()),
    }
}

fn select_source(args: &Args, config: &Config) -> anyhow::Result<FeatureSource> {
    if let Some(infile) = &args.infile {
        return Ok(FeatureSource::File(FileSource::new(infile.clone())));
    }
    if args.overpass {
        return Ok(FeatureSource::Overpass(OverpassClient::new(
            &config.overpass.url,
            config.overpass.request_timeout(),
            config.overpass.retry_policy(),
        )?));
    }
    let mut database = config.database.clone();
    if let Some(dbname) = &args.dbname {
        database.dbname = Some(dbname.clone());
    }
    if let Some(dbhost) = &args.dbhost {
        database.host = Some(dbhost.clone());
    }
    database_source(&database, config)
}

fn output_filepath(args: &Args, config: &Config) -> anyhow::Result<PathBuf> {
    if let Some(geojson) = &args.geojson {
        return Ok(geojson.clone());
    }
    let xform_filepath = config
        .xlsforms_dir
        .join(format!("{}.xml", args.category.name()));
    Ok(PathBuf::from(output_name_from_xform(&xform_filepath)?))
}

fn try_main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = match &args.config {
        Some(config_filepath) => Config::load(config_filepath)?,
        None => Config::default(),
    };
    init_logging(&config, args.verbose)?;
    log::debug!("{:?}", config);

    let boundary = Boundary::load(&args.boundary)?;
    let output_filepath = output_filepath(&args, &config)?;
    let cancel = match config.snapshot.timeout_secs {
        Some(timeout_secs) => CancellationToken::with_timeout(Duration::from_secs(timeout_secs)),
        None => CancellationToken::new(),
    };

    let mut source = select_source(&args, &config)?;
    let collection = pipeline::extract(
        &mut source,
        &boundary,
        args.category,
        &config,
        &IdentityCleaner,
        &output_filepath,
        &cancel,
    )?;
    log::info!(
        "Extracted {} {} features to {:?}",
        collection.features.len(),
        args.category,
        output_filepath
    );
    Ok(())
}

fn main() {
    if let Err(e) = try_main() {
        eprintln!("Error: {:?}", e);
        std::process::exit(1)
    }
}
