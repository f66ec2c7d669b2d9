use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use regex::Regex;
use tracing::{info, warn};

use crate::cli::InventoryArgs;
use crate::model::{PageEntry, PageInventoryManifest};
use crate::util::{now_utc_string, sha256_file, write_json_pretty};

pub fn run(args: InventoryArgs) -> Result<()> {
    let manifest = build_manifest(&args.cache_root)?;

    if args.dry_run {
        info!(
            page_count = manifest.page_count,
            source = %manifest.source,
            "inventory dry-run complete"
        );
        return Ok(());
    }

    let manifest_path = args
        .manifest_path
        .unwrap_or_else(|| args.cache_root.join("manifests").join("page_inventory.json"));

    write_json_pretty(&manifest_path, &manifest)?;
    info!(path = %manifest_path.display(), "wrote inventory manifest");
    info!(page_count = manifest.page_count, "inventory completed");

    Ok(())
}

/// Rebuild the page inventory from whatever HTML is cached locally. Pages
/// fetched out-of-band carry no source URL; the section number comes from the
/// `<number>-<name>` slug convention of the manual's section pages.
pub fn build_manifest(cache_root: &Path) -> Result<PageInventoryManifest> {
    let pattern = Regex::new(r"^(\d+)-").context("failed to compile page slug regex")?;

    let pages_dir = cache_root.join("pages");
    let mut page_paths = discover_pages(&pages_dir)?;
    page_paths.sort();

    if page_paths.is_empty() {
        bail!("no cached pages found in {}", pages_dir.display());
    }

    let mut pages = Vec::with_capacity(page_paths.len());
    for path in page_paths {
        let filename = path
            .file_name()
            .and_then(|name| name.to_str())
            .map(ToOwned::to_owned)
            .with_context(|| format!("invalid UTF-8 filename: {}", path.display()))?;

        let slug = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .map(ToOwned::to_owned)
            .unwrap_or_else(|| filename.clone());

        let section = parse_section_from_slug(&slug, &pattern);
        if section.is_none() {
            warn!(slug = %slug, "page slug carries no section number");
        }

        let sha256 = sha256_file(&path)?;

        pages.push(PageEntry {
            filename,
            slug,
            section,
            url: None,
            sha256,
        });
    }

    pages.sort_by(|a, b| a.section.cmp(&b.section).then(a.filename.cmp(&b.filename)));

    Ok(PageInventoryManifest {
        manifest_version: 1,
        generated_at: now_utc_string(),
        source: pages_dir.display().to_string(),
        page_count: pages.len(),
        pages,
    })
}

pub fn parse_section_from_slug(slug: &str, pattern: &Regex) -> Option<u32> {
    pattern
        .captures(slug)
        .and_then(|captures| captures.get(1))
        .and_then(|m| m.as_str().parse::<u32>().ok())
}

fn discover_pages(pages_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut pages = Vec::new();

    if !pages_dir.exists() {
        return Ok(pages);
    }

    let entries = fs::read_dir(pages_dir)
        .with_context(|| format!("failed to read {}", pages_dir.display()))?;

    for entry in entries {
        let entry =
            entry.with_context(|| format!("failed to read entry in {}", pages_dir.display()))?;
        let path = entry.path();

        if !entry
            .file_type()
            .with_context(|| format!("failed to inspect file type: {}", path.display()))?
            .is_file()
        {
            continue;
        }

        let is_html = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("html"))
            .unwrap_or(false);

        if is_html {
            pages.push(path);
        }
    }

    Ok(pages)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_section_from_slug_reads_leading_number() {
        let pattern = Regex::new(r"^(\d+)-").expect("slug regex compiles");

        assert_eq!(parse_section_from_slug("1-brakes", &pattern), Some(1));
        assert_eq!(
            parse_section_from_slug("10-supplementary", &pattern),
            Some(10)
        );
        assert_eq!(parse_section_from_slug("introduction", &pattern), None);
    }
}
