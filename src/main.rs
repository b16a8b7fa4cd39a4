//! catalog-store command line.
//!
//! Thin administrative front end over the lesson repository: schema init,
//! list, add, move, remove. It plays the role of the application screens,
//! which talk to the same repository API.

use catalog_store::config::{DEFAULT_POOL_SIZE, StoreConfig};
use catalog_store::db::{ConnectionPool, LessonRepository, ensure_schema};
use catalog_store::models::{Lesson, NewLesson};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser)]
#[command(name = "catalog-store", version, about = "Course catalog lesson store")]
struct Cli {
    /// SQLite database URL
    #[arg(
        long,
        env = "CATALOG_DATABASE_URL",
        global = true,
        default_value = "sqlite:catalog.db"
    )]
    database: String,

    /// Initial connection pool size
    #[arg(long, global = true, default_value_t = DEFAULT_POOL_SIZE)]
    pool_size: u32,

    /// Log filter (overridden by RUST_LOG)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create the schema if it does not exist
    Init,
    /// List the lessons of a course in position order
    List {
        /// Course id; omit to list unparented lessons
        #[arg(long)]
        course: Option<i64>,
        /// Print the lessons as JSON
        #[arg(long)]
        json: bool,
    },
    /// Add a lesson (appended unless --position is given)
    Add {
        #[arg(long)]
        course: Option<i64>,
        #[arg(long)]
        title: String,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long)]
        video: Option<String>,
        #[arg(long)]
        position: Option<i64>,
    },
    /// Move a lesson to a new position within its course
    Move {
        id: i64,
        position: i64,
    },
    /// Remove a lesson, compacting its course's positions
    Remove {
        id: i64,
    },
}

/// Initialize the tracing subscriber for logging.
fn init_tracing(log_level: &str, json_logs: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if json_logs {
        subscriber.with(fmt::layer().json()).init();
    } else {
        subscriber
            .with(fmt::layer().with_target(true).with_thread_ids(false))
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level, cli.json_logs);

    let config = StoreConfig::new(cli.database.clone()).with_pool_size(cli.pool_size);
    let pool = ConnectionPool::connect(&config).await?;
    let repository = LessonRepository::new(Arc::clone(&pool));

    let result = run(&cli.command, &pool, &repository).await;

    // Explicit shutdown; connections lent out above have all been released.
    pool.shutdown().await;
    result
}

async fn run(
    command: &Command,
    pool: &Arc<ConnectionPool>,
    repository: &LessonRepository,
) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Command::Init => {
            let mut guard = pool.acquire().await?;
            let result = ensure_schema(guard.conn()).await;
            guard.release().await;
            result?;
            info!("Schema ready");
        }
        Command::List { course, json } => {
            let lessons = repository.list_by_course(*course).await?;
            if *json {
                println!("{}", serde_json::to_string_pretty(&lessons)?);
            } else {
                for lesson in &lessons {
                    println!("{:>3}. [{}] {}", lesson.position, lesson.id, lesson.title);
                }
            }
        }
        Command::Add {
            course,
            title,
            description,
            video,
            position,
        } => {
            let id = repository
                .insert(&NewLesson {
                    course_id: *course,
                    title: title.clone(),
                    description: description.clone(),
                    video_reference: video.clone(),
                    position: *position,
                })
                .await?;
            println!("{}", id);
        }
        Command::Move { id, position } => {
            let lesson = repository.get(*id).await?;
            let previous_position = lesson.position;
            let moved = Lesson {
                position: *position,
                ..lesson
            };
            repository.update(&moved, previous_position).await?;
        }
        Command::Remove { id } => {
            repository.delete(*id).await?;
        }
    }
    Ok(())
}
