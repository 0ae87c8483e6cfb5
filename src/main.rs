use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use rubriq::{
    api,
    config::GatewayConfig,
    csv_import, db,
    gateway::GroqGateway,
    grading::{self, AssignmentManager, BatchOptions},
    models::EvaluationMode,
    scoring,
};

#[derive(Parser)]
#[command(name = "rubriq")]
#[command(about = "Rubric-based grading backed by an LLM evaluator")]
struct Cli {
    /// SQLite database file (defaults to $RUBRIQ_DB, then the platform data dir)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API
    Serve {
        /// Port for HTTP API
        #[arg(short, long, default_value = "3000")]
        port: u16,
    },
    /// Import an assignment from CSV
    Import {
        file: PathBuf,

        /// Assignment name (defaults to the file stem)
        #[arg(short, long)]
        name: Option<String>,
    },
    /// List assignments
    List,
    /// Evaluate the answers of an assignment
    Evaluate {
        assignment: Uuid,

        #[arg(short, long, default_value = "moderate", value_parser = parse_mode)]
        mode: EvaluationMode,

        /// Evaluate answers that already have a result
        #[arg(long)]
        reevaluate: bool,
    },
    /// Export current results as CSV
    Export {
        assignment: Uuid,

        /// Output file (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Print a CSV import template
    Template,
}

fn parse_mode(s: &str) -> Result<EvaluationMode, String> {
    EvaluationMode::from_str(s)
        .ok_or_else(|| format!("unknown mode '{}' (strict, moderate, lenient)", s))
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| "rubriq=debug,tower_http=debug".into()),
    );

    // Logs go to stderr so command output on stdout stays pipeable.
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn open_database(path: Option<PathBuf>) -> anyhow::Result<db::Database> {
    let path = path.or_else(|| std::env::var_os("RUBRIQ_DB").map(PathBuf::from));
    let db = match path {
        Some(path) => db::Database::open(path)?,
        None => db::Database::open_default()?,
    };
    db.migrate()?;
    Ok(db)
}

fn gateway() -> anyhow::Result<Arc<GroqGateway>> {
    let config = GatewayConfig::from_env()?;
    tracing::debug!(?config, "Loaded gateway configuration");
    Ok(Arc::new(GroqGateway::new(config)))
}

async fn serve(db: db::Database, port: u16) -> anyhow::Result<()> {
    let state = api::AppState::new(db, gateway()?);
    let app = api::create_router_with_config(state, api::SecurityConfig::from_env());

    let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{}", port)).await?;
    tracing::info!("Rubriq listening on http://127.0.0.1:{}", port);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .await?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing();

    match cli.command.unwrap_or(Commands::Serve { port: 3000 }) {
        Commands::Serve { port } => {
            let db = open_database(cli.db)?;
            serve(db, port).await?;
        }
        Commands::Import { file, name } => {
            let db = open_database(cli.db)?;
            let content = std::fs::read_to_string(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            let name = match name {
                Some(name) => name,
                None => file
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .context("cannot derive an assignment name from the file; pass --name")?,
            };

            let outcome = grading::import_csv(&db, &content, &name)?;
            println!(
                "Imported '{}' ({}): {} questions, {} students, {} answers",
                outcome.assignment.name,
                outcome.assignment.id,
                outcome.assignment.questions.len(),
                outcome.students,
                outcome.submissions,
            );
        }
        Commands::List => {
            let db = open_database(cli.db)?;
            let assignments = db.list_assignments()?;
            if assignments.is_empty() {
                println!("No assignments.");
            }
            for a in assignments {
                println!(
                    "{}  {}  ({} questions, {} marks, created {})",
                    a.id,
                    a.name,
                    a.question_count,
                    a.total_marks,
                    a.created_at.format("%Y-%m-%d")
                );
            }
        }
        Commands::Evaluate {
            assignment,
            mode,
            reevaluate,
        } => {
            let db = open_database(cli.db)?;
            let manager = AssignmentManager::new(db, gateway()?);
            let report = manager
                .evaluate_all(assignment, BatchOptions { mode, reevaluate })
                .await?;

            println!(
                "Evaluated {}, skipped {}, failed {}",
                report.evaluated.len(),
                report.skipped,
                report.failures.len()
            );
            for failure in &report.failures {
                println!(
                    "  FAILED {} Q{}: {} ({})",
                    failure.student_name, failure.question_number, failure.message, failure.kind
                );
            }
            for total in &report.student_totals {
                println!(
                    "  {:<24} {}  {:.2}%  {}",
                    total.student_name,
                    scoring::format_score(total.total_score, total.max_score),
                    total.percentage,
                    total.grade.label()
                );
            }
        }
        Commands::Export { assignment, output } => {
            let db = open_database(cli.db)?;
            let csv = db.export_csv(assignment)?;
            match output {
                Some(path) => {
                    std::fs::write(&path, csv)
                        .with_context(|| format!("writing {}", path.display()))?;
                    println!("Wrote {}", path.display());
                }
                None => {
                    use std::io::Write;
                    std::io::stdout().write_all(&csv)?;
                }
            }
        }
        Commands::Template => print!("{}", csv_import::template()),
    }

    Ok(())
}
