use std::path::{Path, PathBuf};

use anyhow::anyhow;
use clap::Parser as ClapParser;
use clap::Subcommand;
use indexmap::IndexMap;
use serde::Serialize;
use sqlineage::config::{Config, StoreBackend};
use sqlineage::dialect::Dialect;
use sqlineage::extractor::{BatchExtractor, StaticQuerySource};
use sqlineage::lineage::{Catalog, LineageParser, classify_sql_expression, sql_hash};
use sqlineage::openlineage::{RunEvent, build_run_event};
use sqlineage::store::{LineageStore, check_sql_processed, ingest_openlineage_event};
use sqlineage::traversal::{ImpactAnalyzer, TraversalError};
use std::time::Instant;

#[derive(clap::Parser)]
#[command(name = "sqlineage")]
#[command(about = "SQL column lineage extractor and lineage graph", long_about = None)]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// SQL dialect, overrides the configured one.
    #[arg(long, global = true)]
    dialect: Option<Dialect>,
    /// SQLite database holding the lineage graph, overrides the configured store.
    #[arg(long, global = true)]
    db: Option<PathBuf>,
    /// Pretty-print the JSON output.
    #[arg(long, global = true)]
    pretty: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract column lineage from one or more SQL files.
    Parse(ParseCommand),
    /// Extract the sources of a single output column.
    Column(ColumnCommand),
    /// Classify an expression.
    Classify {
        /// Expression text, e.g. `sum(amount)`.
        expression: String,
    },
    /// Extract lineage from SQL files and store it in the lineage graph.
    Ingest(IngestCommand),
    /// Store the column lineage of an OpenLineage event.
    IngestEvent {
        /// Path to the JSON event.
        event: PathBuf,
    },
    /// Columns affected by a change of the given column.
    Impact(TraversalCommand),
    /// Columns the given column is derived from.
    Upstream(TraversalCommand),
    /// Whether lineage of a statement is already stored.
    Processed(ProcessedCommand),
    /// Build an OpenLineage event from a SQL file.
    Event(EventCommand),
}

#[derive(clap::Args)]
struct ParseCommand {
    /// Path to a JSON file containing schema objects.
    #[arg(short, long)]
    catalog: Option<PathBuf>,
    /// Namespace reported for source columns.
    #[arg(short, long)]
    namespace: Option<String>,
    /// Path to the SQL file or directory containing SQL files.
    #[arg(value_name = "SQL_[FILE|DIR]")]
    sql: PathBuf,
}

#[derive(clap::Args)]
struct ColumnCommand {
    /// Path to a JSON file containing schema objects.
    #[arg(short, long)]
    catalog: Option<PathBuf>,
    /// Output column to look up.
    #[arg(long)]
    column: String,
    #[arg(value_name = "SQL_FILE")]
    sql: PathBuf,
}

#[derive(clap::Args)]
struct IngestCommand {
    /// Path to a JSON file containing schema objects.
    #[arg(short, long)]
    catalog: Option<PathBuf>,
    /// Namespace of the ingested datasets.
    #[arg(short, long)]
    namespace: Option<String>,
    /// Re-ingest statements already stored.
    #[arg(long)]
    force: bool,
    #[arg(value_name = "SQL_[FILE|DIR]")]
    sql: PathBuf,
}

#[derive(clap::Args)]
struct TraversalCommand {
    #[arg(long)]
    namespace: String,
    #[arg(long)]
    table: String,
    #[arg(long)]
    column: String,
    /// Maximum number of hops, overrides the configured one.
    #[arg(long)]
    max_depth: Option<usize>,
}

#[derive(clap::Args)]
struct ProcessedCommand {
    /// Hash of the statement.
    #[arg(long, conflicts_with = "sql", required_unless_present = "sql")]
    hash: Option<String>,
    /// SQL file whose hash is checked.
    #[arg(long)]
    sql: Option<PathBuf>,
}

#[derive(clap::Args)]
struct EventCommand {
    /// Name of the job in the event.
    #[arg(long)]
    job_name: String,
    /// Namespace of the event datasets.
    #[arg(short, long)]
    namespace: Option<String>,
    #[arg(value_name = "SQL_FILE")]
    sql: PathBuf,
}

#[derive(Serialize)]
struct ErrorOutput {
    error: String,
}

fn to_json<T: Serialize>(value: &T, pretty: bool) -> anyhow::Result<String> {
    Ok(if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    })
}

fn read_sql(sql_file_path: &Path) -> anyhow::Result<String> {
    std::fs::read_to_string(sql_file_path).map_err(|_| {
        anyhow!(
            "Failed to read sql file {}",
            sql_file_path.display().to_string()
        )
    })
}

fn sql_files(sql_file_or_dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    if !sql_file_or_dir.is_dir() {
        return Ok(vec![sql_file_or_dir.to_path_buf()]);
    }
    let mut sql_in_dir: Vec<_> = std::fs::read_dir(sql_file_or_dir)?
        .filter_map(|res| res.ok())
        .map(|entry| entry.path())
        .filter(|file| file.extension().is_some_and(|ext| ext == "sql"))
        .collect();
    sql_in_dir.sort();
    Ok(sql_in_dir)
}

fn load_catalog(catalog_path: Option<&PathBuf>) -> anyhow::Result<Option<Catalog>> {
    let Some(catalog_path) = catalog_path else {
        return Ok(None);
    };
    let catalog: Catalog = serde_json::from_str(
        &std::fs::read_to_string(catalog_path).map_err(|_| {
            anyhow!(
                "Failed to read catalog file: {}",
                catalog_path.display().to_string()
            )
        })?,
    )
    .map_err(|err| {
        anyhow!(
            "Failed to parse JSON catalog in file {} due to error: {}",
            catalog_path.display().to_string(),
            err
        )
    })?;
    catalog.validate()?;
    Ok(Some(catalog))
}

fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    if let Some(dialect) = cli.dialect {
        config.parser.dialect = dialect;
    }
    if let Some(db) = &cli.db {
        config.store.backend = StoreBackend::Sqlite;
        config.store.path = Some(db.clone());
    }
    Ok(config)
}

fn parser<'a>(
    config: &Config,
    namespace: Option<&str>,
    catalog: Option<&'a Catalog>,
) -> LineageParser<'a> {
    let parser = LineageParser::new(config.parser.dialect)
        .with_namespace(namespace.unwrap_or(&config.parser.namespace));
    match catalog {
        Some(catalog) => parser.with_catalog(catalog),
        None => parser,
    }
}

fn traverse(
    store: &dyn LineageStore,
    command: &TraversalCommand,
    config: &Config,
    upstream: bool,
    pretty: bool,
) -> anyhow::Result<String> {
    let analyzer = ImpactAnalyzer::new(store);
    let max_depth = command.max_depth.unwrap_or(config.traversal.max_depth);
    let column = match analyzer.find_column_by_name(
        &command.namespace,
        &command.table,
        &command.column,
    ) {
        Ok(column) => column,
        Err(TraversalError::NotFound(failure)) => {
            return to_json(
                &ErrorOutput {
                    error: failure.to_string(),
                },
                pretty,
            );
        }
        Err(err) => return Err(err.into()),
    };
    let result = if upstream {
        analyzer.upstream(&column.id, max_depth)?
    } else {
        analyzer.downstream(&column.id, max_depth)?
    };
    to_json(&result, pretty)
}

fn main() -> anyhow::Result<()> {
    let now = Instant::now();

    env_logger::init();
    let cli = Cli::parse();
    let config = load_config(&cli)?;
    let pretty = cli.pretty;

    let out_str = match &cli.command {
        Commands::Parse(parse_command) => {
            let catalog = load_catalog(parse_command.catalog.as_ref())?;
            let parser = parser(&config, parse_command.namespace.as_deref(), catalog.as_ref());
            if parse_command.sql.is_dir() {
                let mut file_lineages = IndexMap::new();
                for sql_file in sql_files(&parse_command.sql)? {
                    let result = parser.parse(&read_sql(&sql_file)?);
                    file_lineages.insert(
                        std::path::absolute(sql_file)?.display().to_string(),
                        result,
                    );
                }
                to_json(&file_lineages, pretty)?
            } else {
                to_json(&parser.parse(&read_sql(&parse_command.sql)?), pretty)?
            }
        }
        Commands::Column(column_command) => {
            let catalog = load_catalog(column_command.catalog.as_ref())?;
            let parser = parser(&config, None, catalog.as_ref());
            let dependencies = parser
                .column_dependencies(&read_sql(&column_command.sql)?, &column_command.column);
            to_json(&dependencies, pretty)?
        }
        Commands::Classify { expression } => {
            to_json(&classify_sql_expression(expression, config.parser.dialect), pretty)?
        }
        Commands::Ingest(ingest_command) => {
            let catalog = load_catalog(ingest_command.catalog.as_ref())?;
            let store = config.store.open()?;
            let namespace = ingest_command
                .namespace
                .as_deref()
                .unwrap_or(&config.parser.namespace);
            let source = StaticQuerySource::from_files(
                &sql_files(&ingest_command.sql)?,
                namespace,
                config.parser.dialect,
            )?;
            let extractor = BatchExtractor::new(store.as_ref())
                .skip_processed(config.extractor.skip_processed && !ingest_command.force)
                .parallel(config.extractor.parallel);
            let run = match &catalog {
                Some(catalog) => extractor.with_catalog(catalog).run(&source),
                None => extractor.run(&source),
            };
            to_json(&run, pretty)?
        }
        Commands::IngestEvent { event } => {
            let event: RunEvent = serde_json::from_str(
                &std::fs::read_to_string(event).map_err(|_| {
                    anyhow!("Failed to read event file {}", event.display().to_string())
                })?,
            )
            .map_err(|err| {
                anyhow!(
                    "Failed to parse JSON event in file {} due to error: {}",
                    event.display().to_string(),
                    err
                )
            })?;
            let store = config.store.open()?;
            to_json(&ingest_openlineage_event(store.as_ref(), &event)?, pretty)?
        }
        Commands::Impact(traversal_command) => {
            let store = config.store.open()?;
            traverse(store.as_ref(), traversal_command, &config, false, pretty)?
        }
        Commands::Upstream(traversal_command) => {
            let store = config.store.open()?;
            traverse(store.as_ref(), traversal_command, &config, true, pretty)?
        }
        Commands::Processed(processed_command) => {
            let hash = match (&processed_command.hash, &processed_command.sql) {
                (Some(hash), _) => hash.clone(),
                (None, Some(sql_file)) => sql_hash(&read_sql(sql_file)?),
                (None, None) => return Err(anyhow!("Either --hash or --sql is required")),
            };
            let store = config.store.open()?;
            to_json(&check_sql_processed(store.as_ref(), &hash)?, pretty)?
        }
        Commands::Event(event_command) => {
            let namespace = event_command
                .namespace
                .as_deref()
                .unwrap_or(&config.parser.namespace);
            let result =
                parser(&config, Some(namespace), None).parse(&read_sql(&event_command.sql)?);
            to_json(
                &build_run_event(&event_command.job_name, namespace, &result),
                pretty,
            )?
        }
    };
    println!("{}", out_str);

    let elapsed = now.elapsed();
    log::info!("Elapsed: {:.2?}", elapsed);

    Ok(())
}
