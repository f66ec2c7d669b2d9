use std::collections::HashSet;
use std::fs;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use regex::Regex;
use scraper::Html;
use tracing::info;

use crate::cli::FetchArgs;
use crate::commands::extract::outline::{element_text, selector};
use crate::commands::inventory::parse_section_from_slug;
use crate::model::{PageEntry, PageInventoryManifest};
use crate::util::{ensure_directory, now_utc_string, sha256_bytes, write_json_pretty};

#[derive(Debug, Clone)]
struct SectionLink {
    slug: String,
    url: String,
    title: String,
}

pub fn run(args: FetchArgs) -> Result<()> {
    let agent = build_agent(args.timeout_secs);

    info!(base_url = %args.base_url, "fetching manual base page");
    let base_html = fetch_page(&agent, &args.base_url)?;

    let links = discover_section_links(&args.base_url, &base_html)?;
    if links.is_empty() {
        bail!("no section links discovered on {}", args.base_url);
    }

    if args.dry_run {
        for link in &links {
            info!(slug = %link.slug, title = %link.title, url = %link.url, "discovered section");
        }
        info!(link_count = links.len(), "fetch dry-run complete");
        return Ok(());
    }

    let pages_dir = args.cache_root.join("pages");
    ensure_directory(&pages_dir)?;

    let slug_pattern = Regex::new(r"^(\d+)-").context("failed to compile page slug regex")?;

    let mut pages = Vec::with_capacity(links.len());
    for link in &links {
        let body = fetch_page(&agent, &link.url)?;
        let filename = format!("{}.html", link.slug);
        let page_path = pages_dir.join(&filename);

        fs::write(&page_path, &body)
            .with_context(|| format!("failed to write {}", page_path.display()))?;
        info!(slug = %link.slug, bytes = body.len(), "cached section page");

        pages.push(PageEntry {
            filename,
            slug: link.slug.clone(),
            section: parse_section_from_slug(&link.slug, &slug_pattern),
            url: Some(link.url.clone()),
            sha256: sha256_bytes(body.as_bytes()),
        });
    }

    let manifest = PageInventoryManifest {
        manifest_version: 1,
        generated_at: now_utc_string(),
        source: args.base_url.clone(),
        page_count: pages.len(),
        pages,
    };

    let manifest_path = args
        .manifest_path
        .unwrap_or_else(|| args.cache_root.join("manifests").join("page_inventory.json"));

    write_json_pretty(&manifest_path, &manifest)?;
    info!(
        path = %manifest_path.display(),
        page_count = manifest.page_count,
        "wrote inventory manifest"
    );

    Ok(())
}

fn build_agent(timeout_secs: u64) -> ureq::Agent {
    ureq::AgentBuilder::new()
        .timeout_connect(Duration::from_secs(timeout_secs))
        .timeout_read(Duration::from_secs(timeout_secs))
        .timeout_write(Duration::from_secs(timeout_secs))
        .build()
}

fn fetch_page(agent: &ureq::Agent, url: &str) -> Result<String> {
    match agent.get(url).call() {
        Ok(response) => response
            .into_string()
            .with_context(|| format!("failed to read response body from {url}")),
        Err(ureq::Error::Status(code, response)) => {
            let body = response.into_string().unwrap_or_default();
            let preview: String = body.chars().take(200).collect();
            bail!("request to {url} returned status {code}: {}", preview.trim());
        }
        Err(err) => Err(err).with_context(|| format!("request to {url} failed")),
    }
}

/// Section pages are listed on the base page as document-list items; only the
/// numbered entries are manual sections. The slug is the href's last path
/// segment and the section URL hangs off the base URL, matching how the
/// manual publishes its pages.
fn discover_section_links(base_url: &str, html: &str) -> Result<Vec<SectionLink>> {
    let document = Html::parse_document(html);
    let item_selector = selector("li.gem-c-document-list__item")?;
    let anchor_selector = selector("a")?;

    let mut links = Vec::new();
    let mut seen_slugs = HashSet::<String>::new();

    for item in document.select(&item_selector) {
        let title = element_text(item);
        if !title.chars().next().is_some_and(|ch| ch.is_ascii_digit()) {
            continue;
        }

        let Some(anchor) = item.select(&anchor_selector).next() else {
            continue;
        };
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };

        let slug = href
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or_default()
            .to_string();
        if slug.is_empty() || !seen_slugs.insert(slug.clone()) {
            continue;
        }

        let url = format!("{}/{}", base_url.trim_end_matches('/'), slug);
        links.push(SectionLink { slug, url, title });
    }

    Ok(links)
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE_URL: &str = "https://example.test/guidance/mot-inspection-manual";

    #[test]
    fn discover_section_links_keeps_numbered_entries_only() {
        let html = r#"
            <ul>
              <li class="gem-c-document-list__item">
                <div><a href="/guidance/mot-inspection-manual/introduction">Introduction</a></div>
              </li>
              <li class="gem-c-document-list__item">
                <div><a href="/guidance/mot-inspection-manual/1-brakes">1. Brakes</a></div>
              </li>
              <li class="gem-c-document-list__item">
                <div><a href="/guidance/mot-inspection-manual/2-steering">2. Steering</a></div>
              </li>
            </ul>
        "#;

        let links = discover_section_links(BASE_URL, html).expect("discovery succeeds");

        assert_eq!(links.len(), 2);
        assert_eq!(links[0].slug, "1-brakes");
        assert_eq!(
            links[0].url,
            "https://example.test/guidance/mot-inspection-manual/1-brakes"
        );
        assert_eq!(links[1].slug, "2-steering");
    }

    #[test]
    fn discover_section_links_deduplicates_repeated_hrefs() {
        let html = r#"
            <li class="gem-c-document-list__item">
              <div><a href="/m/3-lamps">3. Lamps</a></div>
            </li>
            <li class="gem-c-document-list__item">
              <div><a href="/m/3-lamps">3. Lamps</a></div>
            </li>
        "#;

        let links = discover_section_links(BASE_URL, html).expect("discovery succeeds");
        assert_eq!(links.len(), 1);
    }
}
