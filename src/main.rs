use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use fitsync::types::WeightLogEntry;
use fitsync::{Config, FitClient};

#[derive(Parser, Debug)]
#[command(name = "fitsync")]
#[command(about = "Offline-first sync client for personal fitness data")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/fitsync/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Treat the device as offline (no remote access is attempted)
  #[arg(long)]
  offline: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Show a user's profile
  Profile { uid: String },
  /// Log a body-weight measurement
  LogWeight {
    user: String,
    /// Calendar date, YYYY-MM-DD
    date: String,
    /// Weight in kilograms
    weight: f64,
  },
  /// Print the weight log, oldest first
  Weights { user: String },
  /// List workouts, newest first
  Workouts { user: String },
  /// Reconcile workouts and plans with the remote store
  Sync { user: String },
  /// List friends
  Friends { uid: String },
  /// List pending incoming friend requests
  Requests { uid: String },
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let config = Config::load(args.config.as_deref())?;
  init_logging(&config)?;

  let client = FitClient::connect(&config).await?;
  let online = !args.offline;

  match args.command {
    Command::Profile { uid } => {
      match client.get_profile(&uid, online).await.map_err(to_eyre)? {
        Some(profile) => println!("{}", serde_json::to_string_pretty(&profile)?),
        None => println!("No profile for {}", uid),
      }
    }
    Command::LogWeight { user, date, weight } => {
      let entry = WeightLogEntry {
        user_id: user,
        date,
        weight,
        ..WeightLogEntry::default()
      };
      let saved = client.log_weight(entry, online).await.map_err(to_eyre)?;
      println!(
        "Logged {} kg on {} (change {:+.1})",
        saved.weight, saved.date, saved.change
      );
    }
    Command::Weights { user } => {
      let entries = client.get_weight_log(&user, online).await.map_err(to_eyre)?;
      for entry in entries {
        println!("{}  {:6.1} kg  {:+.1}", entry.date, entry.weight, entry.change);
      }
    }
    Command::Workouts { user } => {
      let workouts = client.get_workouts(&user, online).await.map_err(to_eyre)?;
      for workout in workouts {
        println!(
          "{}  {}  ({} exercises)",
          workout.performed_at,
          workout.name,
          workout.exercises.len()
        );
      }
    }
    Command::Sync { user } => {
      let workouts = client.sync_workouts(&user, online).await.map_err(to_eyre)?;
      let plans = client.sync_workout_plans(&user, online).await.map_err(to_eyre)?;
      println!("workouts: {}", serde_json::to_string(&workouts)?);
      println!("plans:    {}", serde_json::to_string(&plans)?);
    }
    Command::Friends { uid } => {
      let friends = client.get_friends(&uid, online).await.map_err(to_eyre)?;
      for friend in friends {
        println!("{}  (since {})", friend.uid, friend.since);
      }
    }
    Command::Requests { uid } => {
      let requests = client
        .list_friend_requests(&uid, online)
        .await
        .map_err(to_eyre)?;
      for request in requests {
        println!("{}  from {}", request.id, request.from_uid);
      }
    }
  }

  Ok(())
}

fn to_eyre(e: fitsync::ApiError) -> color_eyre::Report {
  eyre!("{}", e.message)
}

fn init_logging(config: &Config) -> Result<()> {
  let log_dir = config.resolve_data_dir()?.join("logs");
  std::fs::create_dir_all(&log_dir)
    .map_err(|e| eyre!("Failed to create log directory: {}", e))?;

  let file_appender = tracing_appender::rolling::daily(log_dir, "fitsync.log");
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("fitsync=info")),
    )
    .with_writer(file_appender)
    .with_ansi(false)
    .init();

  Ok(())
}
