//! Inspect command implementation.

use super::{CliResult, StoreArgs};
use boundkv_core::{StatsSnapshot, StoreInfo};
use serde::Serialize;

/// Store inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Data directory, or `memory`.
    pub location: String,
    /// Store name.
    pub name: String,
    /// Version the store is open at.
    pub version: u32,
    /// Container names.
    pub containers: Vec<String>,
    /// Last recorded update, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_update: Option<String>,
    /// Operation counters of this run.
    pub stats: StatsReport,
}

/// Serializable copy of the store counters.
#[derive(Debug, Serialize)]
pub struct StatsReport {
    /// Open requests issued.
    pub open_attempts: u64,
    /// Opens that produced a connection.
    pub opens_succeeded: u64,
    /// Opens that failed, were blocked or timed out.
    pub opens_failed: u64,
    /// Transactions committed.
    pub transactions_started: u64,
    /// Operations that completed.
    pub transactions_completed: u64,
    /// Operations that failed.
    pub transactions_failed: u64,
    /// Operations that timed out.
    pub transactions_timed_out: u64,
}

impl From<StatsSnapshot> for StatsReport {
    fn from(snap: StatsSnapshot) -> Self {
        Self {
            open_attempts: snap.open_attempts,
            opens_succeeded: snap.opens_succeeded,
            opens_failed: snap.opens_failed,
            transactions_started: snap.transactions_started,
            transactions_completed: snap.transactions_completed,
            transactions_failed: snap.transactions_failed,
            transactions_timed_out: snap.transactions_timed_out,
        }
    }
}

/// Runs the inspect command.
pub async fn run(args: &StoreArgs, format: &str) -> CliResult<()> {
    let store = args.open()?;
    let info = store.inspect().await?;
    let last_update = store.get_last_update().await?;

    let location = args
        .path
        .as_ref()
        .map_or_else(|| "memory".to_string(), |p| p.display().to_string());
    let result = build_result(location, info, last_update, store.stats());

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            print_text_output(&result);
        }
    }

    Ok(())
}

fn build_result(
    location: String,
    info: StoreInfo,
    last_update: Option<String>,
    stats: StatsSnapshot,
) -> InspectResult {
    InspectResult {
        location,
        name: info.name,
        version: info.version,
        containers: info.containers,
        last_update,
        stats: stats.into(),
    }
}

fn print_text_output(result: &InspectResult) {
    println!("boundkv Store Inspection");
    println!("========================");
    println!();
    println!("Location: {}", result.location);
    println!("Name:     {}", result.name);
    println!("Version:  {}", result.version);
    println!();
    println!("Containers:");
    for name in &result.containers {
        println!("  {name}");
    }
    println!();
    match &result.last_update {
        Some(stamp) => println!("Last update: {stamp}"),
        None => println!("Last update: (never)"),
    }
    println!();
    println!("Operations:");
    println!("  Open attempts: {}", result.stats.open_attempts);
    println!("  Completed:     {}", result.stats.transactions_completed);
    println!("  Failed:        {}", result.stats.transactions_failed);
    println!("  Timed out:     {}", result.stats.transactions_timed_out);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::memory_args;

    #[tokio::test]
    async fn result_reflects_open_store() {
        let store = memory_args().open().unwrap();
        let stamp = store.mark_update().await.unwrap();
        let info = store.inspect().await.unwrap();

        let result = build_result("memory".into(), info, Some(stamp.clone()), store.stats());
        assert_eq!(result.name, "cli-test");
        assert_eq!(result.containers, vec!["state".to_string()]);
        assert_eq!(result.last_update, Some(stamp));
        assert_eq!(result.stats.open_attempts, 1);
        assert_eq!(result.stats.transactions_completed, 1);
    }
}
