//! Mantis Metrics CLI - compile and run metrics queries
//!
//! Usage:
//!   mantis-metrics compile --view <views.toml> --query <query.json> [--dialect <dialect>]
//!   mantis-metrics run --view <views.toml> --query <query.json> [--db <sqlite file>]
//!   mantis-metrics buckets --start <rfc3339> --end <rfc3339> --grain <grain> [--tz <zone>]
//!
//! Examples:
//!   mantis-metrics compile --view views.toml --query toplist.json --dialect postgres
//!   mantis-metrics run --view views.toml --query toplist.json --db shop.db
//!   mantis-metrics buckets --start 2024-03-01T00:00:00Z --end 2024-04-01T00:00:00Z --grain week --tz Europe/Oslo

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use mantis_metrics::config::Settings;
use mantis_metrics::engine::{CatalogProvider, Identity, InMemoryCatalog, SqliteEngine};
use mantis_metrics::model::{format_instant, MetricsQuery};
use mantis_metrics::query::{compile_statement, CompileOptions, QueryContext};
use mantis_metrics::service::{ExecuteOptions, MetricsService};
use mantis_metrics::sql::{Dialect, SqlDialect};
use mantis_metrics::telemetry;
use mantis_metrics::timegrain::{Calendar, TimeGrain};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "mantis-metrics")]
#[command(about = "Compile and run metrics view queries")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a query against a metrics view and print the SQL
    Compile {
        /// TOML file with a [[views]] array
        #[arg(long)]
        view: PathBuf,

        /// JSON file with the query
        #[arg(long)]
        query: PathBuf,

        /// SQL dialect to generate (defaults to the configured storage dialect)
        #[arg(short, long)]
        dialect: Option<DialectArg>,
    },

    /// Run a query on a SQLite database and print the result as JSON
    Run {
        /// TOML file with a [[views]] array
        #[arg(long)]
        view: PathBuf,

        /// JSON file with the query
        #[arg(long)]
        query: PathBuf,

        /// SQLite database file (defaults to storage.path)
        #[arg(long)]
        db: Option<PathBuf>,

        /// Subject to run the query as
        #[arg(long, default_value = "cli")]
        subject: String,

        /// Groups of the subject
        #[arg(long = "group")]
        groups: Vec<String>,
    },

    /// Print the bucket starts of a time range
    Buckets {
        #[arg(long)]
        start: DateTime<Utc>,

        #[arg(long)]
        end: DateTime<Utc>,

        #[arg(long)]
        grain: String,

        /// IANA time zone
        #[arg(long, default_value = "UTC")]
        tz: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum DialectArg {
    Duckdb,
    Postgres,
    Mysql,
    Sqlite,
}

impl From<DialectArg> for Dialect {
    fn from(arg: DialectArg) -> Self {
        match arg {
            DialectArg::Duckdb => Dialect::DuckDb,
            DialectArg::Postgres => Dialect::Postgres,
            DialectArg::Mysql => Dialect::MySql,
            DialectArg::Sqlite => Dialect::Sqlite,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let settings = match Settings::load() {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error loading settings: {}", e);
            return ExitCode::FAILURE;
        }
    };
    if let Err(e) = telemetry::init(&settings.logging) {
        eprintln!("Error initializing logging: {}", e);
        return ExitCode::FAILURE;
    }

    match cli.command {
        Commands::Compile {
            view,
            query,
            dialect,
        } => {
            let dialect = dialect.map(Dialect::from).unwrap_or(settings.storage.dialect);
            cmd_compile(&settings, view, query, dialect).await
        }
        Commands::Run {
            view,
            query,
            db,
            subject,
            groups,
        } => {
            let identity = Identity::new(&subject).with_groups(groups);
            cmd_run(&settings, view, query, db, identity).await
        }
        Commands::Buckets {
            start,
            end,
            grain,
            tz,
        } => cmd_buckets(&settings, start, end, &grain, &tz),
    }
}

/// Load the view catalog and the query, printing any error.
fn load_inputs(view_file: &Path, query_file: &Path) -> Option<(InMemoryCatalog, MetricsQuery)> {
    let catalog = match InMemoryCatalog::from_file(view_file) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading views: {}", e);
            return None;
        }
    };

    let source = match fs::read_to_string(query_file) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error reading {}: {}", query_file.display(), e);
            return None;
        }
    };
    match serde_json::from_str(&source) {
        Ok(q) => Some((catalog, q)),
        Err(e) => {
            eprintln!("Error parsing query: {}", e);
            None
        }
    }
}

async fn cmd_compile(
    settings: &Settings,
    view_file: PathBuf,
    query_file: PathBuf,
    dialect: Dialect,
) -> ExitCode {
    let Some((catalog, query)) = load_inputs(&view_file, &query_file) else {
        return ExitCode::FAILURE;
    };

    let view = match catalog.metrics_view(query.view()).await {
        Ok(v) => v,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let ctx = QueryContext::new(&view, dialect).with_options(CompileOptions::from(settings));
    match compile_statement(&ctx, &query) {
        Ok(statement) => {
            let (sql, args) = statement.to_sql_with_args(dialect);
            println!("-- {} on {} ({})", query.kind(), view.name, dialect.name());
            println!("{};", sql);
            if !args.is_empty() {
                println!();
                for (i, arg) in args.iter().enumerate() {
                    println!("-- ${} = {}", i + 1, arg);
                }
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn cmd_run(
    settings: &Settings,
    view_file: PathBuf,
    query_file: PathBuf,
    db: Option<PathBuf>,
    identity: Identity,
) -> ExitCode {
    let Some((catalog, query)) = load_inputs(&view_file, &query_file) else {
        return ExitCode::FAILURE;
    };

    let path = match db {
        Some(p) => Some(p),
        None => match settings.storage.resolved_path() {
            Ok(p) => p,
            Err(e) => {
                eprintln!("Error: {}", e);
                return ExitCode::FAILURE;
            }
        },
    };
    let engine = match &path {
        Some(p) => SqliteEngine::open(p),
        None => SqliteEngine::open_in_memory(),
    };
    let engine = match engine {
        Ok(e) => e,
        Err(e) => {
            eprintln!("Error opening database: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let service = match MetricsService::new(Arc::new(catalog), Arc::new(engine)).with_settings(settings)
    {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    // Ctrl-C cancels the running statement.
    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let result = service
        .execute(&identity, query, ExecuteOptions::default(), cancel)
        .await;
    match result {
        Ok(result) => match serde_json::to_string_pretty(&result) {
            Ok(json) => {
                println!("{}", json);
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("Error: {}", e);
                ExitCode::FAILURE
            }
        },
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn cmd_buckets(
    settings: &Settings,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    grain: &str,
    tz: &str,
) -> ExitCode {
    let Some(grain) = TimeGrain::parse(grain) else {
        eprintln!("Error: unknown time grain '{}'", grain);
        return ExitCode::FAILURE;
    };
    let calendar = match Calendar::parse(
        tz,
        settings.calendar.first_day_of_week,
        settings.calendar.first_month_of_year,
    ) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match calendar.bucket_series(start, end, grain, settings.query.max_buckets) {
        Ok(buckets) => {
            for bucket in &buckets {
                println!("{}", format_instant(bucket));
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
