mod commands;
mod config;
mod server;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::process;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::commands::{
    cmd_cache_invalidate, cmd_meal_add, cmd_meal_delete, cmd_meal_list, cmd_meal_update,
    cmd_report, cmd_user_delete, cmd_user_goals, cmd_user_register, cmd_user_show,
    cmd_weight_delete, cmd_weight_list, cmd_weight_log, cmd_weight_update, cmd_workout_add,
    cmd_workout_delete, cmd_workout_list, cmd_workout_update,
};
use crate::config::Config;
use fittrack_core::service::FitService;

#[derive(Parser)]
#[command(
    name = "fittrack",
    version,
    about = "Track workouts, meals and weight, and get cached progress reports"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage user accounts and fitness goals
    User {
        #[command(subcommand)]
        command: UserCommands,
    },
    /// Log and manage workouts
    Workout {
        #[command(subcommand)]
        command: WorkoutCommands,
    },
    /// Log and manage meals
    Meal {
        #[command(subcommand)]
        command: MealCommands,
    },
    /// Log and manage weight entries
    Weight {
        #[command(subcommand)]
        command: WeightCommands,
    },
    /// Show a progress report for a date range
    Report {
        /// Username or identity
        user: String,
        /// Start date (YYYY-MM-DD, default: six days before --to)
        #[arg(long)]
        from: Option<String>,
        /// End date (YYYY-MM-DD, default: today)
        #[arg(long)]
        to: Option<String>,
        /// Recompute without reading or writing the report cache
        #[arg(long)]
        no_cache: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Manage the report cache
    Cache {
        #[command(subcommand)]
        command: CacheCommands,
    },
    /// Start the REST API server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "8080")]
        port: u16,
        /// Address to bind to (default: 127.0.0.1, use 0.0.0.0 to expose to network)
        #[arg(short, long, default_value = "127.0.0.1")]
        bind: String,
        /// Disable API key authentication (for development/testing)
        #[arg(long)]
        no_auth: bool,
    },
}

#[derive(Subcommand)]
enum UserCommands {
    /// Register a new user
    Register {
        username: String,
        email: String,
        #[arg(long)]
        full_name: Option<String>,
        /// Date of birth (YYYY-MM-DD)
        #[arg(long)]
        dob: Option<String>,
        /// Target weight in kg
        #[arg(long)]
        target_weight: Option<f64>,
        /// Weekly workout goal in minutes
        #[arg(long)]
        weekly_minutes: Option<i64>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show a user's profile and goals
    Show {
        /// Username or identity
        user: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Update fitness goals
    Goals {
        /// Username or identity
        user: String,
        /// Target weight in kg
        #[arg(long)]
        target_weight: Option<f64>,
        /// Weekly workout goal in minutes
        #[arg(long)]
        weekly_minutes: Option<i64>,
        /// Remove all goals
        #[arg(long, conflicts_with_all = ["target_weight", "weekly_minutes"])]
        clear: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete a user and all of their records
    Delete {
        /// Username or identity
        username: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum WorkoutCommands {
    /// Log a workout
    Add {
        /// Username or identity
        user: String,
        /// Activity type (e.g. running, cycling)
        activity: String,
        /// Duration in minutes
        minutes: i64,
        /// Intensity: low, medium, high
        #[arg(short, long, default_value = "medium")]
        intensity: String,
        /// Date (YYYY-MM-DD or today/yesterday, default: today)
        #[arg(long)]
        date: Option<String>,
        #[arg(long)]
        notes: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List workouts, newest first
    List {
        /// Username or identity
        user: String,
        #[arg(long)]
        from: Option<String>,
        #[arg(long)]
        to: Option<String>,
        #[arg(short, long)]
        limit: Option<u32>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Update a workout by ID
    Update {
        id: i64,
        #[arg(long)]
        activity: Option<String>,
        #[arg(long)]
        minutes: Option<i64>,
        #[arg(long)]
        intensity: Option<String>,
        #[arg(long)]
        date: Option<String>,
        #[arg(long)]
        notes: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete a workout by ID
    Delete {
        id: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum MealCommands {
    /// Log a meal
    Add {
        /// Username or identity
        user: String,
        name: String,
        /// Calories (kcal)
        calories: i64,
        /// Protein in grams
        #[arg(long, default_value = "0")]
        protein: f64,
        /// Carbs in grams
        #[arg(long, default_value = "0")]
        carbs: f64,
        /// Fat in grams
        #[arg(long, default_value = "0")]
        fat: f64,
        /// When it was eaten (YYYY-MM-DD HH:MM, default: now)
        #[arg(long)]
        time: Option<String>,
        #[arg(long)]
        notes: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List meals, newest first
    List {
        /// Username or identity
        user: String,
        #[arg(long)]
        from: Option<String>,
        #[arg(long)]
        to: Option<String>,
        #[arg(short, long)]
        limit: Option<u32>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Update a meal by ID
    Update {
        id: i64,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        calories: Option<i64>,
        #[arg(long)]
        protein: Option<f64>,
        #[arg(long)]
        carbs: Option<f64>,
        #[arg(long)]
        fat: Option<f64>,
        #[arg(long)]
        time: Option<String>,
        #[arg(long)]
        notes: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete a meal by ID
    Delete {
        id: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum WeightCommands {
    /// Log a weight entry
    Log {
        /// Username or identity
        user: String,
        /// Weight value (number)
        value: f64,
        /// Unit: kg or lbs (default: kg)
        #[arg(short, long, default_value = "kg")]
        unit: String,
        /// Date (YYYY-MM-DD or today/yesterday, default: today)
        #[arg(long)]
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show weight history, newest first
    List {
        /// Username or identity
        user: String,
        #[arg(long)]
        from: Option<String>,
        #[arg(long)]
        to: Option<String>,
        #[arg(short, long)]
        limit: Option<u32>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Correct a weight entry by ID
    Update {
        id: i64,
        value: f64,
        #[arg(short, long, default_value = "kg")]
        unit: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete a weight entry by ID
    Delete {
        id: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum CacheCommands {
    /// Drop every cached report for a user
    Invalidate {
        /// Username or identity
        user: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fittrack=info,fittrack_core=info".into()),
        )
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

#[allow(clippy::too_many_lines)]
async fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;
    let cache = config.cache.build_cache();
    let svc = FitService::open(&config.db_path, cache, config.cache.ttl)?;

    match cli.command {
        Commands::User { command } => match command {
            UserCommands::Register {
                username,
                email,
                full_name,
                dob,
                target_weight,
                weekly_minutes,
                json,
            } => cmd_user_register(
                &svc,
                &username,
                &email,
                full_name,
                dob,
                target_weight,
                weekly_minutes,
                json,
            ),
            UserCommands::Show { user, json } => cmd_user_show(&svc, &user, json),
            UserCommands::Goals {
                user,
                target_weight,
                weekly_minutes,
                clear,
                json,
            } => cmd_user_goals(&svc, &user, target_weight, weekly_minutes, clear, json),
            UserCommands::Delete { username, json } => cmd_user_delete(&svc, &username, json),
        },
        Commands::Workout { command } => match command {
            WorkoutCommands::Add {
                user,
                activity,
                minutes,
                intensity,
                date,
                notes,
                json,
            } => cmd_workout_add(&svc, &user, &activity, minutes, &intensity, date, notes, json),
            WorkoutCommands::List {
                user,
                from,
                to,
                limit,
                json,
            } => cmd_workout_list(&svc, &user, from, to, limit, json),
            WorkoutCommands::Update {
                id,
                activity,
                minutes,
                intensity,
                date,
                notes,
                json,
            } => cmd_workout_update(&svc, id, activity, minutes, intensity, date, notes, json),
            WorkoutCommands::Delete { id, json } => cmd_workout_delete(&svc, id, json),
        },
        Commands::Meal { command } => match command {
            MealCommands::Add {
                user,
                name,
                calories,
                protein,
                carbs,
                fat,
                time,
                notes,
                json,
            } => cmd_meal_add(
                &svc, &user, &name, calories, protein, carbs, fat, time, notes, json,
            ),
            MealCommands::List {
                user,
                from,
                to,
                limit,
                json,
            } => cmd_meal_list(&svc, &user, from, to, limit, json),
            MealCommands::Update {
                id,
                name,
                calories,
                protein,
                carbs,
                fat,
                time,
                notes,
                json,
            } => cmd_meal_update(
                &svc, id, name, calories, protein, carbs, fat, time, notes, json,
            ),
            MealCommands::Delete { id, json } => cmd_meal_delete(&svc, id, json),
        },
        Commands::Weight { command } => match command {
            WeightCommands::Log {
                user,
                value,
                unit,
                date,
                json,
            } => cmd_weight_log(&svc, &user, value, &unit, date, json),
            WeightCommands::List {
                user,
                from,
                to,
                limit,
                json,
            } => cmd_weight_list(&svc, &user, from, to, limit, json),
            WeightCommands::Update {
                id,
                value,
                unit,
                json,
            } => cmd_weight_update(&svc, id, value, &unit, json),
            WeightCommands::Delete { id, json } => cmd_weight_delete(&svc, id, json),
        },
        Commands::Report {
            user,
            from,
            to,
            no_cache,
            json,
        } => cmd_report(&svc, &user, from, to, no_cache, json),
        Commands::Cache { command } => match command {
            CacheCommands::Invalidate { user, json } => cmd_cache_invalidate(&svc, &user, json),
        },
        Commands::Serve {
            port,
            bind,
            no_auth,
        } => {
            let api_key = if no_auth {
                None
            } else {
                Some(config.load_or_create_api_key()?)
            };
            server::start_server(svc, port, &bind, api_key).await
        }
    }
}
