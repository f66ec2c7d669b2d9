use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::cli::StatusArgs;
use crate::model::PageInventoryManifest;

pub fn run(args: StatusArgs) -> Result<()> {
    let manifest_dir = args.cache_root.join("manifests");
    let inventory_path = manifest_dir.join("page_inventory.json");
    let output_path = args.cache_root.join("mot_defect_rules.csv");

    info!(cache_root = %args.cache_root.display(), "status requested");

    if inventory_path.exists() {
        let raw = fs::read(&inventory_path)
            .with_context(|| format!("failed to read {}", inventory_path.display()))?;
        let inventory: PageInventoryManifest = serde_json::from_slice(&raw)
            .with_context(|| format!("failed to parse {}", inventory_path.display()))?;

        let fetched_pages = inventory
            .pages
            .iter()
            .filter(|page| page.url.is_some())
            .count();

        info!(
            generated_at = %inventory.generated_at,
            source = %inventory.source,
            page_count = inventory.page_count,
            fetched_pages = fetched_pages,
            "loaded inventory manifest"
        );
    } else {
        warn!(path = %inventory_path.display(), "inventory manifest missing");
    }

    if output_path.exists() {
        let rows = count_output_rows(&output_path)?;
        info!(path = %output_path.display(), rows = rows, "defect table present");
    } else {
        warn!(path = %output_path.display(), "defect table not written yet");
    }

    Ok(())
}

fn count_output_rows(path: &Path) -> Result<usize> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("failed to open {}", path.display()))?;

    let mut count = 0;
    for record in reader.records() {
        record.with_context(|| format!("failed to read record from {}", path.display()))?;
        count += 1;
    }

    Ok(count)
}
