//! fitlevel - Workout progression engine

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use fitlevel::config::{Config, DEFAULT_COLLECTION, DEFAULT_DB_PATH};
use fitlevel::exercises::{WorkoutCategory, WorkoutSession, CALORIES_PER_EXERCISE};
use fitlevel::progress::Inventory;
use fitlevel::user::UserId;
use fitlevel::{PlayerProgress, ProgressUpdate, ProgressionEngine};

#[derive(Parser)]
#[command(name = "fitlevel")]
#[command(author, version, about = "Workout progression: levels, XP, muscles, coins")]
struct Cli {
    /// Signed-in user id
    #[arg(short, long, env = "FITLEVEL_USER", global = true)]
    user: Option<String>,

    /// SQLite database file
    #[arg(long, env = "FITLEVEL_DB", default_value = DEFAULT_DB_PATH, global = true)]
    db: PathBuf,

    /// Keep progress in memory only
    #[arg(long, global = true)]
    memory: bool,

    /// Document collection
    #[arg(long, env = "FITLEVEL_COLLECTION", default_value = DEFAULT_COLLECTION, global = true)]
    collection: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show progress (creates the record on first use)
    Show,

    /// Record a finished workout
    Workout {
        /// Exercise names (e.g. "PUSH UPS" "PLANK")
        #[arg(required = true)]
        exercises: Vec<String>,

        /// Workout program: chest, abs, arms, legs, back, "full body"
        #[arg(short, long)]
        category: Option<WorkoutCategory>,

        /// Calories per exercise
        #[arg(long, default_value_t = CALORIES_PER_EXERCISE)]
        calories: f64,

        /// Stamina spent on the workout
        #[arg(short, long, default_value = "0")]
        stamina_cost: f64,
    },

    /// Apply a raw JSON update payload
    Update {
        /// e.g. '{"type":"WORKOUT","exercises":3,"legs":1}'
        payload: String,
    },

    /// Set the coin balance
    Coins { amount: u64 },

    /// Set an inventory item count
    Item { name: String, count: u64 },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let user = UserId::from_session(cli.user.as_deref())
        .context("no user signed in (pass --user or set FITLEVEL_USER)")?;

    let config = Config {
        db_path: (!cli.memory).then_some(cli.db),
        collection: cli.collection,
    };
    let engine = ProgressionEngine::open(&config).context("opening progress store")?;
    let uid = user.as_str();

    let progress = match cli.command {
        Commands::Show => engine.get_or_init_progress(uid).await?,

        Commands::Workout { exercises, category, calories, stamina_cost } => {
            let session = WorkoutSession::new(category, exercises)
                .with_calories_per_exercise(calories)
                .with_stamina_cost(stamina_cost);
            engine
                .apply_update(uid, &ProgressUpdate::workout(session.to_update()))
                .await?
        }

        Commands::Update { payload } => {
            let payload = serde_json::from_str(&payload).context("payload is not valid JSON")?;
            engine.apply_json(uid, payload).await?
        }

        Commands::Coins { amount } => {
            engine
                .apply_update(uid, &ProgressUpdate::generic().with_coins(amount))
                .await?
        }

        Commands::Item { name, count } => {
            let items = Inventory::from([(name, count)]);
            engine
                .apply_update(uid, &ProgressUpdate::generic().with_inventory(items))
                .await?
        }
    };

    print_progress(&user, &progress)?;
    Ok(())
}

fn print_progress(user: &UserId, p: &PlayerProgress) -> Result<()> {
    println!("Progress for {}", user);
    println!("{:-<40}", "");
    println!("Level {} | XP {}/{} | Stamina {:.0}/{:.0}", p.level, p.xp, p.xp_max, p.stamina, p.stamina_max);
    println!("Coins {} | Streak {} | Exercises {} | Calories {:.1}", p.coins, p.streak, p.total_exercises, p.total_calories);
    println!("{}", serde_json::to_string_pretty(&p.to_document())?);
    Ok(())
}
