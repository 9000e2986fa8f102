//! hearthctl - offline maintenance for the hearth time-series database.
//!
//! Runs against the database file directly, so it also works while
//! `hearthd` is up: reads ride the WAL snapshot and writes contend on the
//! SQLite lock, with a bounded busy retry instead of failing outright.

use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context};
use chrono::DateTime;
use clap::{Parser, Subcommand};

use hearth_store::TimeseriesStore;

/// Retry budget for SQLITE_BUSY on the maintenance path. Waits grow
/// linearly: 200ms, 400ms, 600ms, 800ms.
const BUSY_ATTEMPTS: u32 = 5;
const BUSY_BACKOFF_STEP: Duration = Duration::from_millis(200);

#[derive(Parser)]
#[command(name = "hearthctl")]
#[command(about = "Hearth database maintenance")]
#[command(version)]
struct Cli {
    /// Path of the database file.
    #[arg(long, default_value = "timeseries.db")]
    db: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List every series with row count and time bounds
    List,

    /// Delete all data and metadata for the given series, then vacuum
    Clear {
        /// Series ids to clear
        #[arg(required = true)]
        ids: Vec<String>,

        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },

    /// Delete points beyond a value threshold
    Trim {
        /// Series id to trim
        id: String,

        /// Delete points with value greater than this
        #[arg(long, conflicts_with = "below")]
        above: Option<f64>,

        /// Delete points with value less than this
        #[arg(long, conflicts_with = "above")]
        below: Option<f64>,
    },

    /// Compact the database file
    Vacuum,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let store = TimeseriesStore::open(&cli.db)
        .with_context(|| format!("cannot open database '{}'", cli.db.display()))?;

    match cli.command {
        Commands::List => list(&store),
        Commands::Clear { ids, yes } => clear(&store, &ids, yes),
        Commands::Trim { id, above, below } => trim(&store, &id, above, below),
        Commands::Vacuum => vacuum(&store),
    }
}

fn list(store: &TimeseriesStore) -> anyhow::Result<()> {
    let summaries = with_busy_retry(|| store.series_summaries())?;

    if summaries.is_empty() {
        println!("No series stored");
        return Ok(());
    }

    println!("{:<40} {:>10}  {:<20} {:<20}", "SERIES", "POINTS", "OLDEST", "NEWEST");
    for s in &summaries {
        println!(
            "{:<40} {:>10}  {:<20} {:<20}",
            s.id,
            s.count,
            format_ts(s.oldest),
            format_ts(s.newest)
        );
    }
    println!();
    println!("Database size: {}", format_size(store.database_size()));

    Ok(())
}

fn clear(store: &TimeseriesStore, ids: &[String], yes: bool) -> anyhow::Result<()> {
    if !yes && !confirm(&format!("Delete {} series and all their data?", ids.len()))? {
        println!("Aborted");
        return Ok(());
    }

    let mut total = 0;
    for id in ids {
        let deleted = with_busy_retry(|| store.delete_series(id))?;
        println!("{id}: {deleted} points deleted");
        total += deleted;
    }

    if total > 0 {
        with_busy_retry(|| store.vacuum())?;
        println!("Vacuum done, database size now {}", format_size(store.database_size()));
    }

    Ok(())
}

fn trim(
    store: &TimeseriesStore,
    id: &str,
    above: Option<f64>,
    below: Option<f64>,
) -> anyhow::Result<()> {
    let deleted = match (above, below) {
        (Some(threshold), None) => with_busy_retry(|| store.delete_above(id, threshold))?,
        (None, Some(threshold)) => with_busy_retry(|| store.delete_below(id, threshold))?,
        _ => bail!("exactly one of --above or --below is required"),
    };

    println!("{id}: {deleted} points deleted");
    Ok(())
}

fn vacuum(store: &TimeseriesStore) -> anyhow::Result<()> {
    let before = store.database_size();
    with_busy_retry(|| store.vacuum())?;
    let after = store.database_size();

    println!(
        "Vacuum done: {} -> {}",
        format_size(before),
        format_size(after)
    );
    Ok(())
}

/// Retries a store operation while it fails with SQLITE_BUSY, with a
/// linearly growing wait between attempts.
fn with_busy_retry<T>(
    mut op: impl FnMut() -> hearth_store::Result<T>,
) -> hearth_store::Result<T> {
    let mut attempt = 1;
    loop {
        match op() {
            Err(e) if e.is_busy() && attempt < BUSY_ATTEMPTS => {
                let wait = BUSY_BACKOFF_STEP * attempt;
                eprintln!("database busy, retrying in {}ms", wait.as_millis());
                std::thread::sleep(wait);
                attempt += 1;
            }
            other => return other,
        }
    }
}

fn confirm(prompt: &str) -> anyhow::Result<bool> {
    print!("{prompt} [y/N] ");
    std::io::stdout().flush()?;

    let mut answer = String::new();
    std::io::stdin().read_line(&mut answer)?;
    Ok(matches!(answer.trim(), "y" | "Y" | "yes"))
}

fn format_ts(epoch_secs: f64) -> String {
    DateTime::from_timestamp(epoch_secs as i64, 0)
        .map_or_else(|| "-".to_string(), |dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
}

fn format_size(bytes: u64) -> String {
    const KIB: f64 = 1024.0;
    let bytes = bytes as f64;
    if bytes >= KIB * KIB {
        format!("{:.1} MiB", bytes / (KIB * KIB))
    } else if bytes >= KIB {
        format!("{:.1} KiB", bytes / KIB)
    } else {
        format!("{bytes:.0} B")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hearth_store::StoreError;

    fn busy_error() -> StoreError {
        // 5 is SQLITE_BUSY.
        StoreError::Sqlite(rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(5),
            None,
        ))
    }

    mod retry_tests {
        use super::*;

        #[test]
        fn succeeds_after_transient_busy() {
            let mut calls = 0;
            let result = with_busy_retry(|| {
                calls += 1;
                if calls < 3 {
                    Err(busy_error())
                } else {
                    Ok(calls)
                }
            });

            assert_eq!(result.unwrap(), 3);
        }

        #[test]
        fn gives_up_after_budget() {
            let mut calls = 0;
            let result: hearth_store::Result<()> = with_busy_retry(|| {
                calls += 1;
                Err(busy_error())
            });

            assert!(result.is_err());
            assert_eq!(calls, BUSY_ATTEMPTS);
        }

        #[test]
        fn non_busy_errors_are_not_retried() {
            let mut calls = 0;
            let result: hearth_store::Result<()> = with_busy_retry(|| {
                calls += 1;
                Err(StoreError::BuiltinConflict {
                    id: "x".to_string(),
                })
            });

            assert!(result.is_err());
            assert_eq!(calls, 1);
        }
    }

    mod format_tests {
        use super::*;

        #[test]
        fn timestamps_render_as_utc() {
            assert_eq!(format_ts(0.0), "1970-01-01 00:00:00");
            assert_eq!(format_ts(1_700_000_000.0), "2023-11-14 22:13:20");
        }

        #[test]
        fn sizes_pick_sensible_units() {
            assert_eq!(format_size(512), "512 B");
            assert_eq!(format_size(4096), "4.0 KiB");
            assert_eq!(format_size(5 * 1024 * 1024), "5.0 MiB");
        }
    }

    mod command_tests {
        use super::*;

        fn test_store() -> (tempfile::TempDir, TimeseriesStore) {
            let dir = tempfile::tempdir().unwrap();
            let store = TimeseriesStore::open(dir.path().join("test.db")).unwrap();
            (dir, store)
        }

        #[test]
        fn clear_with_yes_removes_series() {
            let (_dir, store) = test_store();
            store.insert("s1", Some(1.0), Some(100.0)).unwrap();
            store.insert("s1", Some(2.0), Some(200.0)).unwrap();

            clear(&store, &["s1".to_string()], true).unwrap();

            assert!(store.series_summaries().unwrap().is_empty());
        }

        #[test]
        fn trim_requires_exactly_one_threshold() {
            let (_dir, store) = test_store();
            assert!(trim(&store, "s1", None, None).is_err());
            assert!(trim(&store, "s1", Some(1.0), None).is_ok());
            assert!(trim(&store, "s1", None, Some(1.0)).is_ok());
        }

        #[test]
        fn trim_above_deletes_spikes() {
            let (_dir, store) = test_store();
            store.insert("s1", Some(50.0), Some(100.0)).unwrap();
            store.insert("s1", Some(9999.0), Some(200.0)).unwrap();

            trim(&store, "s1", Some(100.0), None).unwrap();

            let rows = store.query_range("s1", 0.0, 300.0, None).unwrap();
            assert_eq!(rows.len(), 1);
            assert_eq!(rows[0].value, Some(50.0));
        }
    }
}
