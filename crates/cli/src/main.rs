mod session;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use config::Config;
use querybuilder::{MetricAggregation, SpaceAggregation, TimeAggregation};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use session::{load_catalog, parse_aggregation, Mode, Session};
use std::path::PathBuf;
use tracing::{error, warn};

/// Filter expression compiler
#[derive(Parser, Debug)]
#[command(name = "filterql")]
#[command(about = "Compile filter, aggregation and Having expressions", long_about = None)]
struct Args {
    /// Compile a single expression and exit
    #[arg(short, long)]
    exec: Option<String>,

    /// Path to TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// JSON file with the field key catalogue
    #[arg(long)]
    catalog: Option<PathBuf>,

    #[arg(short, long, value_enum, default_value_t = Mode::Where)]
    mode: Mode,

    /// Aggregation a `Having` expression may reference, e.g. "count() AS total"
    #[arg(short, long = "aggregation")]
    aggregations: Vec<String>,

    /// Metric a `Having` expression is checked against (metrics signal)
    #[arg(long)]
    metric: Option<String>,

    #[arg(long, default_value = "")]
    time_aggregation: String,

    #[arg(long, default_value = "")]
    space_aggregation: String,

    /// Print results as JSON
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    // RUST_LOG controls the level, e.g. RUST_LOG=debug
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
                .add_directive("rustyline=error".parse()?),
        )
        .init();

    let args = Args::parse();
    let config = Config::load(args.config.as_deref())?;

    let catalog = args.catalog.clone().or_else(|| config.catalog.path.clone());
    let keys = match &catalog {
        Some(path) => load_catalog(path)?,
        None => Default::default(),
    };

    let mut session = Session::new(config.compiler.clone(), keys)
        .with_aggregations(args.aggregations.iter().map(|a| parse_aggregation(a)).collect())
        .with_metric(metric_aggregation(&args)?);
    session.json = args.json;

    if let Some(expression) = args.exec {
        let result = session.run(args.mode, &expression)?;
        println!("{}", result);
        return Ok(());
    }

    repl(&session, args.mode)
}

fn metric_aggregation(args: &Args) -> Result<Option<MetricAggregation>> {
    let Some(metric_name) = &args.metric else {
        return Ok(None);
    };
    let time_aggregation = match args.time_aggregation.as_str() {
        "" => TimeAggregation::Unspecified,
        name => TimeAggregation::from_name(name)
            .with_context(|| format!("unknown time aggregation `{}`", name))?,
    };
    let space_aggregation = match args.space_aggregation.as_str() {
        "" => SpaceAggregation::Unspecified,
        name => SpaceAggregation::from_name(name)
            .with_context(|| format!("unknown space aggregation `{}`", name))?,
    };
    Ok(Some(MetricAggregation {
        metric_name: metric_name.clone(),
        time_aggregation,
        space_aggregation,
    }))
}

fn repl(session: &Session, mut mode: Mode) -> Result<()> {
    println!("filterql REPL");
    println!("Type 'exit' or 'quit' to exit, '\\h' for help\n");

    let history_file = get_history_file_path();
    let mut rl = DefaultEditor::new().context("Failed to create readline editor")?;
    if history_file.exists() {
        rl.load_history(&history_file)
            .context("Failed to load history file")?;
    }

    loop {
        match rl.readline(&format!("{}> ", mode)) {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let _ = rl.add_history_entry(line);

                if line.eq_ignore_ascii_case("exit") || line.eq_ignore_ascii_case("quit") {
                    save_history(&mut rl, &history_file);
                    println!("Goodbye!");
                    break;
                }

                if line == "\\h" {
                    print_help();
                    continue;
                }

                if line == "\\keys" {
                    for key in session.keys() {
                        println!("  {}", key);
                    }
                    continue;
                }

                if let Some(name) = line.strip_prefix("\\mode") {
                    match Mode::from_str(name.trim(), true) {
                        Ok(m) => mode = m,
                        Err(_) => eprintln!(
                            "Unknown mode `{}`; expected where, tree, contradictions, aggregate or having",
                            name.trim()
                        ),
                    }
                    continue;
                }

                match session.run(mode, line) {
                    Ok(result) => println!("{}", result),
                    Err(e) => {
                        error!("Compilation failed: {}", e);
                        eprintln!("Error: {:#}", e);
                    }
                }
            }
            Err(ReadlineError::Interrupted) => {
                save_history(&mut rl, &history_file);
                println!("CTRL-C");
                break;
            }
            Err(ReadlineError::Eof) => {
                save_history(&mut rl, &history_file);
                println!("CTRL-D");
                break;
            }
            Err(err) => {
                save_history(&mut rl, &history_file);
                error!("Readline error: {:?}", err);
                eprintln!("Error: {:?}", err);
                break;
            }
        }
    }

    Ok(())
}

fn get_history_file_path() -> PathBuf {
    if let Some(home) = dirs::home_dir() {
        home.join(".filterql_history")
    } else {
        PathBuf::from(".filterql_history")
    }
}

fn save_history(rl: &mut DefaultEditor, history_file: &PathBuf) {
    rl.save_history(history_file)
        .context("Failed to save history file")
        .unwrap_or_else(|e| {
            warn!("Could not save history: {}", e);
            eprintln!("Warning: Could not save history: {}", e);
        });
}

fn print_help() {
    println!("filterql REPL Help:");
    println!("  exit, quit    - Exit the REPL");
    println!("  \\h            - Show this help message");
    println!("  \\mode <m>     - Switch mode: where, tree, contradictions, aggregate, having");
    println!("  \\keys         - List the field key catalogue");
    println!("  <expression>  - Compile an expression in the current mode");
    println!("\nExamples:");
    println!("  service.name = 'redis' AND http.status_code >= 500");
    println!("  \\mode aggregate");
    println!("  countIf(http.status_code >= 500) / count()");
    println!("  \\mode having");
    println!("  total > 100");
}
