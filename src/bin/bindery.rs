//! bindery — run declarative SELECTs from the command line
//!
//! # Usage
//!
//! ```bash
//! # Show the SQL and bindings only
//! bindery select --from users --where 'age>=18' --where 'name~^A,^B' --dry-run
//!
//! # Execute against the configured store
//! bindery select --from users --where 'status=new,open' --limit 10
//!
//! # Column names of a (prefixed) table
//! bindery columns users
//! ```

use std::path::PathBuf;

use anyhow::Context;
use bindery::prelude::*;
use clap::{Args, Parser, Subcommand, ValueEnum};
use colored::*;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "bindery")]
#[command(version)]
#[command(about = "Declarative search specs to parameterized SQL", long_about = None)]
#[command(after_help = "EXAMPLES:
    bindery select --from users --where 'age>=18' --dry-run
    bindery select --from users --where 'name~^A,^B' --order 'name ASC' --limit 10
    bindery select --from hosts --where 'env=prod' --column hostname
    bindery --replica columns users")]
struct Cli {
    /// Config file (TOML); defaults to the user config dir
    #[arg(long, env = "BINDERY_CONFIG")]
    config: Option<PathBuf>,

    /// Use read-replica scoped settings (ro_*)
    #[arg(long)]
    replica: bool,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    format: OutputFormat,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Build and run a SELECT
    Select(SelectArgs),
    /// List the columns of a table
    Columns {
        /// Table name (the configured prefix is applied)
        table: String,
    },
    /// Show the resolved connection settings
    Config,
}

#[derive(Args)]
struct SelectArgs {
    /// FROM clause
    #[arg(long)]
    from: String,

    /// Select list (defaults to *)
    #[arg(long)]
    select: Option<String>,

    /// Filter expression: field>=v, field<v, field~re1,re2, field=v1,v2
    #[arg(short = 'w', long = "where")]
    filters: Vec<String>,

    #[arg(long)]
    group: Option<String>,

    #[arg(long)]
    having: Option<String>,

    #[arg(long)]
    order: Option<String>,

    /// Maximum number of rows
    #[arg(short, long)]
    limit: Option<u64>,

    /// Rows to skip; only meaningful with --limit
    #[arg(long, requires = "limit")]
    offset: Option<u64>,

    /// Return only the first record
    #[arg(long, conflicts_with = "column")]
    one: bool,

    /// Return only this column's values
    #[arg(long)]
    column: Option<String>,

    /// Print the number of matching rows instead of the rows
    #[arg(long)]
    count: bool,

    /// Don't execute, just show the generated SQL
    #[arg(short, long)]
    dry_run: bool,
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(&cli) {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    let resolver = ConfigResolver::new(load_config(cli)?, cli.replica);

    match &cli.command {
        Commands::Select(args) => run_select(args, &resolver, &cli.format),
        Commands::Columns { table } => {
            let mut driver = bindery::mysql::connect_driver(&resolver)?;
            let columns = driver.columns(table)?;
            if columns.is_empty() {
                println!("{}", "(no rows; columns unknown)".dimmed());
            }
            for column in columns {
                println!("{}", column.white());
            }
            Ok(())
        }
        Commands::Config => {
            let settings = ConnectSettings::resolve(&resolver)?;
            show_settings(&settings);
            Ok(())
        }
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<ConnectionConfig> {
    let file = match &cli.config {
        Some(path) => Some(path.clone()),
        None => ConnectionConfig::default_path().filter(|p| p.exists()),
    };

    let base = match file {
        Some(path) => ConnectionConfig::load_file(&path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => ConnectionConfig::default(),
    };

    Ok(base.merge(ConnectionConfig::from_env()))
}

fn build_spec(args: &SelectArgs) -> anyhow::Result<StatementSpec> {
    let search = parse_filters(&args.filters)?;

    let mut spec = StatementSpec::new()
        .from_table(args.from.clone())
        .filter(search.compile());
    spec.select = args.select.clone();
    spec.group = args.group.clone();
    spec.having = args.having.clone();
    spec.order = args.order.clone();
    if args.limit.is_some() {
        spec.limit = Some(Limit {
            offset: args.offset,
            count: args.limit,
        });
    }
    if args.one {
        spec = spec.one();
    } else if let Some(column) = &args.column {
        spec = spec.column(column.clone());
    }
    Ok(spec)
}

fn run_select(args: &SelectArgs, resolver: &ConfigResolver, format: &OutputFormat) -> anyhow::Result<()> {
    let spec = build_spec(args)?;
    let sql = if args.count { spec.to_count_sql() } else { spec.to_sql() };

    if args.dry_run {
        println!("{}", "Generated SQL:".green().bold());
        println!("{}", sql.white());

        if !spec.filter.params.is_empty() {
            println!();
            println!("{} {}", "Bindings:".cyan(), spec.filter.type_string().dimmed());
            for (i, param) in spec.filter.params.iter().enumerate() {
                println!("  ?{} = {}", i + 1, param.value.to_string().yellow());
            }
        }
        return Ok(());
    }

    let mut driver = bindery::mysql::connect_driver(resolver)?;

    if args.count {
        let total = driver.count_matching(&spec)?;
        println!("{} {}", total.to_string().cyan(), "matching row(s)");
        return Ok(());
    }

    let result = driver.select(&spec)?;
    format_output(&result, format)
}

fn format_output(result: &QueryResult, format: &OutputFormat) -> anyhow::Result<()> {
    if result.is_empty() {
        println!("{}", "(no results)".dimmed());
        return Ok(());
    }

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(result)?);
        }
        OutputFormat::Table => match result {
            QueryResult::Records(records) => print_table(records),
            QueryResult::One(Some(record)) => print_table(std::slice::from_ref(record)),
            QueryResult::One(None) => {}
            QueryResult::Column(values) => {
                for value in values {
                    println!("{}", value);
                }
                println!();
                println!("{} value(s) returned", values.len().to_string().cyan());
            }
        },
    }
    Ok(())
}

fn print_table(records: &[Record]) {
    let Some(first) = records.first() else {
        return;
    };
    let columns: Vec<&str> = first.columns().collect();

    let mut widths: Vec<usize> = columns.iter().map(|c| c.len()).collect();
    for record in records {
        for (i, column) in columns.iter().enumerate() {
            let len = record.get(column).map(|v| v.to_string().len()).unwrap_or(0);
            widths[i] = widths[i].max(len);
        }
    }

    let header: Vec<String> = columns
        .iter()
        .zip(&widths)
        .map(|(c, w)| format!("{:width$}", c, width = *w))
        .collect();
    println!("{}", header.join(" │ ").white().bold());

    let sep: Vec<String> = widths.iter().map(|w| "─".repeat(*w)).collect();
    println!("{}", sep.join("─┼─").dimmed());

    for record in records {
        let cells: Vec<String> = columns
            .iter()
            .zip(&widths)
            .map(|(c, w)| {
                let val = record.get(c).map(|v| v.to_string()).unwrap_or_default();
                format!("{:width$}", val, width = *w)
            })
            .collect();
        println!("{}", cells.join(" │ "));
    }

    println!();
    println!("{} row(s) returned", records.len().to_string().cyan());
}

fn show_settings(settings: &ConnectSettings) {
    println!("{}", "Resolved settings".cyan().bold());
    let mode = if settings.replica_only { "replica (ro_*)" } else { "primary (rw_*)" };
    let rows = [
        ("mode", mode.to_string()),
        ("host", settings.host.clone()),
        ("port", settings.port.to_string()),
        ("socket", settings.socket.clone().unwrap_or_default()),
        ("database", settings.database.clone()),
        ("user", settings.user.clone()),
        ("password", if settings.password.is_empty() { String::new() } else { "***".to_string() }),
        ("prefix", settings.prefix.clone()),
        ("query_on_error", settings.query_on_error.to_string()),
    ];
    for (name, value) in rows {
        println!("  {:16} {}", name.dimmed(), value.white());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn select_args(argv: &[&str]) -> SelectArgs {
        let cli = Cli::try_parse_from(argv).unwrap();
        match cli.command {
            Commands::Select(args) => args,
            _ => panic!("expected select"),
        }
    }

    #[test]
    fn test_offset_requires_limit() {
        let err = Cli::try_parse_from(["bindery", "select", "--from", "users", "--offset", "20"]);
        assert!(err.is_err());
    }

    #[test]
    fn test_offset_with_limit_builds_range() {
        let args = select_args(&["bindery", "select", "--from", "users", "--limit", "10", "--offset", "20"]);
        let spec = build_spec(&args).unwrap();
        assert_eq!(spec.to_sql(), "SELECT * FROM users LIMIT 20, 10");
    }

    #[test]
    fn test_filters_become_where_clause() {
        let args = select_args(&["bindery", "select", "--from", "users", "-w", "age>=18", "--one"]);
        let spec = build_spec(&args).unwrap();
        assert_eq!(spec.to_sql(), "SELECT * FROM users WHERE `age` >= ?");
        assert_eq!(spec.projection, Projection::One);
    }
}
