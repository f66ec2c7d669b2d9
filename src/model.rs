use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageEntry {
    pub filename: String,
    pub slug: String,
    pub section: Option<u32>,
    pub url: Option<String>,
    pub sha256: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageInventoryManifest {
    pub manifest_version: u32,
    pub generated_at: String,
    pub source: String,
    pub page_count: usize,
    pub pages: Vec<PageEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExtractPaths {
    pub cache_root: String,
    pub manifest_dir: String,
    pub inventory_manifest_path: String,
    pub output_path: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExtractCounts {
    pub page_count: usize,
    pub processed_page_count: usize,
    pub pages_without_tables: usize,
    pub tables_seen: usize,
    pub tables_accepted: usize,
    pub tables_skipped_header: usize,
    pub tables_skipped_heading: usize,
    pub topic_resolved_tables: usize,
    pub sub_topic_resolved_tables: usize,
    pub rows_seen: usize,
    pub rows_not_in_use: usize,
    pub rows_skipped_shape: usize,
    pub clauses_without_point: usize,
    pub clauses_without_category: usize,
    pub clauses_emitted: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExtractRunManifest {
    pub manifest_version: u32,
    pub run_id: String,
    pub status: String,
    pub started_at: String,
    pub updated_at: String,
    pub command: String,
    pub paths: ExtractPaths,
    pub counts: ExtractCounts,
    pub source_hashes: Vec<PageEntry>,
    pub warnings: Vec<String>,
    pub notes: Vec<String>,
}
