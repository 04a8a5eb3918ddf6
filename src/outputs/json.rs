//! The intermediate JSON file between `scrape` and `build`.
//!
//! Raw items are stored exactly as the collectors produced them so the build
//! step can run, and rerun, without network access to the sources. The file
//! is a pretty-printed JSON array; non-ASCII text is written as-is.

use crate::models::RawItem;
use crate::utils::ensure_parent_dir;
use std::error::Error;
use std::path::Path;
use tokio::fs;
use tracing::{error, info, instrument};

/// Write raw items to `path`, creating parent directories as needed.
#[instrument(level = "info", skip_all, fields(path = %path.display(), count = items.len()))]
pub async fn write_items(items: &[RawItem], path: &Path) -> Result<(), Box<dyn Error>> {
    let json = serde_json::to_string_pretty(items)?;
    ensure_parent_dir(path).await?;
    if let Err(e) = fs::write(path, json).await {
        error!(error = %e, "Failed to write items");
        return Err(e.into());
    }
    info!("Wrote items");
    Ok(())
}

/// Read raw items previously written by [`write_items`].
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn read_items(path: &Path) -> Result<Vec<RawItem>, Box<dyn Error>> {
    let bytes = fs::read(path).await?;
    let items: Vec<RawItem> = serde_json::from_slice(&bytes)?;
    info!(count = items.len(), "Loaded items");
    Ok(items)
}
