//! Single key-value commands.

use super::{CliResult, StoreArgs};
use boundkv_core::LAST_UPDATE_KEY;
use serde::Serialize;

/// A key and its value, if any.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct Entry {
    /// The key looked up.
    pub key: String,
    /// The stored value; `None` if absent.
    pub value: Option<String>,
}

/// Records the current time as the last update.
pub async fn mark(args: &StoreArgs) -> CliResult<()> {
    let store = args.open()?;
    let stamp = store.mark_update().await?;
    println!("{stamp}");
    Ok(())
}

/// Prints the last recorded update.
pub async fn last(args: &StoreArgs, format: &str) -> CliResult<()> {
    let store = args.open()?;
    let value = store.get_last_update().await?;
    print_entry(
        &Entry {
            key: LAST_UPDATE_KEY.to_string(),
            value,
        },
        format,
    )
}

/// Prints the value stored at `key`.
pub async fn get(args: &StoreArgs, key: &str, format: &str) -> CliResult<()> {
    let store = args.open()?;
    let value = store.get(key).await?;
    print_entry(
        &Entry {
            key: key.to_string(),
            value,
        },
        format,
    )
}

/// Stores `value` at `key`.
pub async fn put(args: &StoreArgs, key: &str, value: &str) -> CliResult<()> {
    let store = args.open()?;
    store.put(key, value).await?;
    tracing::info!(key, "value stored");
    Ok(())
}

/// Removes every entry.
pub async fn clear(args: &StoreArgs) -> CliResult<()> {
    let store = args.open()?;
    store.clear_all().await?;
    tracing::info!(store = %args.name, "store cleared");
    Ok(())
}

fn print_entry(entry: &Entry, format: &str) -> CliResult<()> {
    println!("{}", render_entry(entry, format)?);
    Ok(())
}

fn render_entry(entry: &Entry, format: &str) -> CliResult<String> {
    match format {
        "json" => Ok(serde_json::to_string_pretty(entry)?),
        _ => Ok(entry
            .value
            .clone()
            .unwrap_or_else(|| format!("(no value at {:?})", entry.key))),
    }
}
