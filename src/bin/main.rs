//! cubist CLI - run MDX against a SQLite star schema
//!
//! Usage:
//!   cubist dialect <product>
//!   cubist query --schema <schema.toml> --db <file.db> "<mdx>"
//!   cubist drillthrough --schema <schema.toml> --db <file.db> "<DRILLTHROUGH ...>"
//!   cubist sql --schema <schema.toml> --db <file.db> "<mdx>" [--cell 0,1] [--extended]
//!
//! `--schema` and `--db` fall back to the `[connection]` section of the
//! config file. Logging is controlled with `CUBIST_LOG` (e.g. `cubist=debug`).

use clap::{Parser, Subcommand};
use cubist::config::Settings;
use cubist::connection::{SqlConnection, SqliteConnection};
use cubist::olap::Session;
use cubist::schema::Schema;
use cubist::sql::{DatabaseProduct, Dialect, SqlDialect};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "cubist")]
#[command(about = "cubist - an MDX engine over relational star schemas")]
#[command(version)]
struct Cli {
    /// Config file (defaults to $CUBIST_CONFIG, ./cubist.toml, then the user config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args)]
struct Target {
    /// Schema TOML file
    #[arg(short, long)]
    schema: Option<PathBuf>,

    /// SQLite database file
    #[arg(long)]
    db: Option<PathBuf>,

    /// Dialect override (skips detection)
    #[arg(short, long)]
    dialect: Option<DatabaseProduct>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the capabilities of a database product
    Dialect {
        /// Product name, e.g. postgresql, mysql, sqlite
        product: DatabaseProduct,
    },

    /// Run an MDX SELECT and print the result grid
    Query {
        #[command(flatten)]
        target: Target,

        mdx: String,
    },

    /// Run an MDX DRILLTHROUGH statement and print its rows as JSON
    Drillthrough {
        #[command(flatten)]
        target: Target,

        mdx: String,
    },

    /// Print the drill-through SQL of one cell of an MDX SELECT
    Sql {
        #[command(flatten)]
        target: Target,

        mdx: String,

        /// Cell coordinates, one per axis
        #[arg(long, value_delimiter = ',', default_value = "0")]
        cell: Vec<usize>,

        /// Add every level of the cube as a column
        #[arg(long)]
        extended: bool,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_env("CUBIST_LOG"))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Dialect { product } => cmd_dialect(product),
        Commands::Query { target, mdx } => {
            open(cli.config, target).and_then(|session| cmd_query(&session, &mdx))
        }
        Commands::Drillthrough { target, mdx } => {
            open(cli.config, target).and_then(|session| cmd_drillthrough(&session, &mdx))
        }
        Commands::Sql {
            target,
            mdx,
            cell,
            extended,
        } => open(cli.config, target).and_then(|session| cmd_sql(&session, &mdx, &cell, extended)),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

fn open(config: Option<PathBuf>, target: Target) -> CliResult<Session> {
    let settings = match config {
        Some(path) => Settings::from_file(path)?,
        None => Settings::load()?,
    };
    let schema_path = match target.schema {
        Some(path) => path,
        None => settings
            .connection
            .resolved_schema()?
            .ok_or("no schema given (use --schema or connection.schema)")?,
    };
    let db_path = match target.db {
        Some(path) => path,
        None => settings
            .connection
            .resolved_database()?
            .ok_or("no database given (use --db or connection.database)")?,
    };

    let schema = Schema::from_file(&schema_path)?;
    let connection: Arc<dyn SqlConnection> = Arc::new(SqliteConnection::open(&db_path)?);
    let mut builder = Session::builder(schema, connection).settings(settings);
    if let Some(product) = target.dialect {
        builder = builder.dialect(Dialect::for_product(product));
    }
    Ok(builder.build()?)
}

fn cmd_dialect(product: DatabaseProduct) -> CliResult<()> {
    let dialect = Dialect::for_product(product);
    println!("{}", serde_json::to_string_pretty(dialect.capabilities())?);
    Ok(())
}

fn cmd_query(session: &Session, mdx: &str) -> CliResult<()> {
    let result = session.execute(mdx)?;
    print!("{}", result);
    Ok(())
}

fn cmd_drillthrough(session: &Session, mdx: &str) -> CliResult<()> {
    let result = session.execute_drill_through(mdx)?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

fn cmd_sql(session: &Session, mdx: &str, cell: &[usize], extended: bool) -> CliResult<()> {
    let result = session.execute(mdx)?;
    let axes = result.axes();
    if cell.len() != axes.len()
        || cell
            .iter()
            .zip(axes)
            .any(|(i, axis)| *i >= axis.positions.len())
    {
        return Err(format!("cell {:?} is outside the result", cell).into());
    }
    match result.cell(cell).drill_through_sql(extended)? {
        Some(sql) => println!("{}", sql),
        None => return Err(format!("cell {:?} is not drillable", cell).into()),
    }
    Ok(())
}
