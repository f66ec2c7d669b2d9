use std::collections::HashSet;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use chrono::Utc;
use scraper::Html;
use tracing::{info, warn};

use crate::cli::ExtractArgs;
use crate::commands::inventory;
use crate::model::{ExtractCounts, ExtractPaths, ExtractRunManifest, PageInventoryManifest};
use crate::util::{ensure_directory, now_utc_string, utc_compact_string, write_json_pretty};

use super::normalize::{ExtractStats, NormalizedRow, TableNormalizer};
use super::outline::gather_page;

pub fn run(args: ExtractArgs) -> Result<()> {
    let started_ts = Utc::now();
    let started_at = now_utc_string();
    let run_id = format!("run-{}", utc_compact_string(started_ts));

    let cache_root = args.cache_root.clone();
    let manifest_dir = cache_root.join("manifests");
    ensure_directory(&manifest_dir)?;

    let inventory_manifest_path = args
        .inventory_manifest_path
        .clone()
        .unwrap_or_else(|| manifest_dir.join("page_inventory.json"));
    let extract_manifest_path = args.extract_manifest_path.clone().unwrap_or_else(|| {
        manifest_dir.join(format!(
            "extract_run_{}.json",
            utc_compact_string(started_ts)
        ))
    });
    let output_path = args
        .output_path
        .clone()
        .unwrap_or_else(|| cache_root.join("mot_defect_rules.csv"));

    info!(cache_root = %cache_root.display(), run_id = %run_id, "starting extract");

    let inventory = load_or_refresh_inventory(
        &cache_root,
        &inventory_manifest_path,
        args.refresh_inventory,
    )?;

    let target_set: HashSet<u32> = args.target_sections.iter().copied().collect();
    let normalizer = TableNormalizer::new()?;
    let mut stats = ExtractStats::default();
    let mut rows: Vec<NormalizedRow> = Vec::new();

    for page in &inventory.pages {
        if !target_set.is_empty() && !page.section.is_some_and(|s| target_set.contains(&s)) {
            continue;
        }

        let page_path = cache_root.join("pages").join(&page.filename);
        if !page_path.exists() {
            let warning = format!("missing cached page: {}", page_path.display());
            warn!(warning = %warning, "page skipped");
            stats.warnings.push(warning);
            continue;
        }

        let html = fs::read_to_string(&page_path)
            .with_context(|| format!("failed to read {}", page_path.display()))?;
        let document = Html::parse_document(&html);
        let (outline, tables) = gather_page(&document)?;

        stats.processed_page_count += 1;
        if tables.is_empty() {
            stats.pages_without_tables += 1;
        }

        let before = rows.len();
        for table in &tables {
            rows.extend(normalizer.normalize(&outline, table, &mut stats));
        }

        let page_rows = rows.len() - before;
        if page_rows == 0 {
            let warning = format!(
                "page {} yielded no defect rows; the source structure may have changed",
                page.slug
            );
            warn!(warning = %warning, "empty page");
            stats.warnings.push(warning);
        } else {
            info!(slug = %page.slug, tables = tables.len(), rows = page_rows, "page extracted");
        }
    }

    if rows.is_empty() {
        bail!(
            "no defect rows extracted from {} pages; the source document structure may have changed",
            stats.processed_page_count
        );
    }

    write_rows(&output_path, &rows)?;
    info!(path = %output_path.display(), rows = rows.len(), "wrote defect table");

    let updated_at = now_utc_string();
    let manifest = ExtractRunManifest {
        manifest_version: 1,
        run_id,
        status: "completed".to_string(),
        started_at,
        updated_at,
        command: render_extract_command(&args),
        paths: ExtractPaths {
            cache_root: cache_root.display().to_string(),
            manifest_dir: manifest_dir.display().to_string(),
            inventory_manifest_path: inventory_manifest_path.display().to_string(),
            output_path: output_path.display().to_string(),
        },
        counts: ExtractCounts {
            page_count: inventory.page_count,
            processed_page_count: stats.processed_page_count,
            pages_without_tables: stats.pages_without_tables,
            tables_seen: stats.tables_seen,
            tables_accepted: stats.tables_accepted,
            tables_skipped_header: stats.tables_skipped_header,
            tables_skipped_heading: stats.tables_skipped_heading,
            topic_resolved_tables: stats.topic_resolved_tables,
            sub_topic_resolved_tables: stats.sub_topic_resolved_tables,
            rows_seen: stats.rows_seen,
            rows_not_in_use: stats.rows_not_in_use,
            rows_skipped_shape: stats.rows_skipped_shape,
            clauses_without_point: stats.clauses_without_point,
            clauses_without_category: stats.clauses_without_category,
            clauses_emitted: stats.clauses_emitted,
        },
        source_hashes: inventory.pages,
        warnings: stats.warnings,
        notes: vec![
            "Extract command completed against locally cached section pages.".to_string(),
            "Heading chains are resolved by numeric parent validation over preceding headings, not raw document order.".to_string(),
        ],
    };

    write_json_pretty(&extract_manifest_path, &manifest)?;
    info!(path = %extract_manifest_path.display(), "wrote extract run manifest");

    Ok(())
}

fn load_or_refresh_inventory(
    cache_root: &Path,
    inventory_manifest_path: &Path,
    refresh_inventory: bool,
) -> Result<PageInventoryManifest> {
    if refresh_inventory || !inventory_manifest_path.exists() {
        let manifest = inventory::build_manifest(cache_root)?;
        write_json_pretty(inventory_manifest_path, &manifest)?;
        info!(
            path = %inventory_manifest_path.display(),
            page_count = manifest.page_count,
            "refreshed inventory manifest"
        );
        return Ok(manifest);
    }

    let raw = fs::read(inventory_manifest_path)
        .with_context(|| format!("failed to read {}", inventory_manifest_path.display()))?;
    let manifest: PageInventoryManifest = serde_json::from_slice(&raw)
        .with_context(|| format!("failed to parse {}", inventory_manifest_path.display()))?;

    info!(
        path = %inventory_manifest_path.display(),
        page_count = manifest.page_count,
        "loaded existing inventory manifest"
    );

    Ok(manifest)
}

fn write_rows(path: &Path, rows: &[NormalizedRow]) -> Result<()> {
    if let Some(parent) = path.parent() {
        ensure_directory(parent)?;
    }

    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("failed to create {}", path.display()))?;

    for row in rows {
        writer
            .serialize(row)
            .with_context(|| format!("failed to write row {}", row.full_reference_code))?;
    }

    writer
        .flush()
        .with_context(|| format!("failed to flush {}", path.display()))?;

    Ok(())
}

fn render_extract_command(args: &ExtractArgs) -> String {
    let mut command = format!("motmanual extract --cache-root {}", args.cache_root.display());

    if let Some(path) = &args.inventory_manifest_path {
        command.push_str(&format!(" --inventory-manifest-path {}", path.display()));
    }
    if let Some(path) = &args.extract_manifest_path {
        command.push_str(&format!(" --extract-manifest-path {}", path.display()));
    }
    if let Some(path) = &args.output_path {
        command.push_str(&format!(" --output-path {}", path.display()));
    }
    if args.refresh_inventory {
        command.push_str(" --refresh-inventory");
    }
    for section in &args.target_sections {
        command.push_str(&format!(" --target-section {section}"));
    }

    command
}
