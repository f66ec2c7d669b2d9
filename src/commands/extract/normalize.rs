use anyhow::{Context, Result};
use regex::Regex;
use serde::Serialize;
use tracing::{debug, warn};

use super::category::{Category, align_categories, category_for};
use super::outline::{PageOutline, RawTable};
use super::resolver;
use super::segment::DefectSegmenter;

/// Rows flagged with this marker are placeholders for withdrawn defect
/// numbers and never reach segmentation.
const NOT_IN_USE_MARKER: &str = "Not in use";

const DEFECT_HEADER: &str = "Defect";
const CATEGORY_HEADER: &str = "Category";

/// The numbering context resolved for one table. Deeper levels are only
/// populated when their numeric chain agrees with every enclosing level.
#[derive(Debug, Clone)]
pub struct SectionPath {
    pub section_number: u32,
    pub section_name: String,
    pub sub_section_number: u32,
    pub sub_section_name: String,
    pub topic_number: Option<u32>,
    pub topic_name: Option<String>,
    pub sub_topic_number: Option<u32>,
    pub sub_topic_name: Option<String>,
}

impl SectionPath {
    /// Dotted numbering at exactly the resolved depth: `1.1`, `1.1.3`, or
    /// `1.1.3.2`. Absent levels are never padded.
    pub fn reference_prefix(&self) -> String {
        let mut prefix = format!("{}.{}", self.section_number, self.sub_section_number);
        if let Some(topic) = self.topic_number {
            prefix.push('.');
            prefix.push_str(&topic.to_string());
            if let Some(sub_topic) = self.sub_topic_number {
                prefix.push('.');
                prefix.push_str(&sub_topic.to_string());
            }
        }
        prefix
    }
}

/// One atomic defect rule exploded out of a table row.
#[derive(Debug, Clone)]
pub struct DefectClause {
    pub text: String,
    pub point: String,
    pub category: Category,
}

/// Final output unit, one per clause. Serialized field order is the output
/// column order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedRow {
    pub section_name: String,
    pub section_number: u32,
    pub sub_section_name: String,
    pub sub_section_number: u32,
    pub topic_name: Option<String>,
    pub topic_number: Option<u32>,
    pub sub_topic_name: Option<String>,
    pub sub_topic_number: Option<u32>,
    pub full_reference_code: String,
    #[serde(rename = "Defect")]
    pub defect: String,
    #[serde(rename = "Category")]
    pub category: Category,
}

impl NormalizedRow {
    fn from_clause(path: &SectionPath, clause: DefectClause) -> Self {
        Self {
            section_name: path.section_name.clone(),
            section_number: path.section_number,
            sub_section_name: path.sub_section_name.clone(),
            sub_section_number: path.sub_section_number,
            topic_name: path.topic_name.clone(),
            topic_number: path.topic_number,
            sub_topic_name: path.sub_topic_name.clone(),
            sub_topic_number: path.sub_topic_number,
            full_reference_code: format!("{} {}", path.reference_prefix(), clause.point),
            defect: clause.text,
            category: clause.category,
        }
    }
}

#[derive(Debug, Default)]
pub struct ExtractStats {
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
    pub warnings: Vec<String>,
}

/// Per-table state machine: header validation, heading-chain resolution, row
/// explosion, reference-code synthesis, emission.
#[derive(Debug)]
pub struct TableNormalizer {
    topic_pattern: Regex,
    sub_topic_pattern: Regex,
    segmenter: DefectSegmenter,
}

impl TableNormalizer {
    pub fn new() -> Result<Self> {
        let topic_pattern = Regex::new(r"^(\d+)\.(\d+)\.(\d+)")
            .context("failed to compile topic heading regex")?;
        let sub_topic_pattern = Regex::new(r"^(\d+)\.(\d+)\.(\d+)\.(\d+)")
            .context("failed to compile sub-topic heading regex")?;

        Ok(Self {
            topic_pattern,
            sub_topic_pattern,
            segmenter: DefectSegmenter::new()?,
        })
    }

    /// Normalize one table into output rows. Skips are filters, not errors:
    /// the document interleaves unrelated tables and headings by design.
    pub fn normalize(
        &self,
        outline: &PageOutline,
        table: &RawTable,
        stats: &mut ExtractStats,
    ) -> Vec<NormalizedRow> {
        stats.tables_seen += 1;

        if !header_accepted(&table.headers) {
            stats.tables_skipped_header += 1;
            debug!(
                position = table.position,
                headers = ?table.headers,
                "skipping table with unexpected header shape"
            );
            return Vec::new();
        }

        let Some(path) = self.resolve_section_path(outline, table.position, stats) else {
            stats.tables_skipped_heading += 1;
            return Vec::new();
        };

        let mut rows = Vec::new();
        for cells in &table.rows {
            stats.rows_seen += 1;

            let [defect_cell, category_cell] = cells.as_slice() else {
                stats.rows_skipped_shape += 1;
                debug!(
                    position = table.position,
                    cell_count = cells.len(),
                    "skipping row with unexpected cell count"
                );
                continue;
            };

            if defect_cell.contains(NOT_IN_USE_MARKER) {
                stats.rows_not_in_use += 1;
                continue;
            }

            let categories = align_categories(category_cell);

            for (index, text) in self.segmenter.segment(defect_cell).into_iter().enumerate() {
                let Some(point) = self.segmenter.point(&text) else {
                    stats.clauses_without_point += 1;
                    debug!(position = table.position, clause = %text, "clause carries no point marker");
                    continue;
                };
                let Some(category) = category_for(&categories, index) else {
                    stats.clauses_without_category += 1;
                    continue;
                };

                let clause = DefectClause {
                    text,
                    point,
                    category,
                };
                rows.push(NormalizedRow::from_clause(&path, clause));
                stats.clauses_emitted += 1;
            }
        }

        if !rows.is_empty() {
            stats.tables_accepted += 1;
        }

        rows
    }

    /// Walk the heading chain for a table. Levels 1 and 2 are required and
    /// come from the nearest preceding headings; levels 3 and 4 go through
    /// the resolver and are kept only when their numeric parent chain agrees
    /// with the enclosing levels.
    fn resolve_section_path(
        &self,
        outline: &PageOutline,
        position: usize,
        stats: &mut ExtractStats,
    ) -> Option<SectionPath> {
        let Some(section_heading) = outline.nearest_preceding(1, position) else {
            let warning = format!("table at position {position} has no preceding section heading");
            warn!(warning = %warning, "table skipped");
            stats.warnings.push(warning);
            return None;
        };
        let Some(sub_section_heading) = outline.nearest_preceding(2, position) else {
            let warning =
                format!("table at position {position} has no preceding sub-section heading");
            warn!(warning = %warning, "table skipped");
            stats.warnings.push(warning);
            return None;
        };

        let Some((section_chain, section_name)) = split_heading(&section_heading.text) else {
            let warning = format!(
                "section heading {:?} carries no leading number",
                section_heading.text
            );
            warn!(warning = %warning, "table skipped");
            stats.warnings.push(warning);
            return None;
        };
        let section_number = section_chain[0];

        let Some((sub_chain, sub_section_name)) = split_heading(&sub_section_heading.text) else {
            let warning = format!(
                "sub-section heading {:?} carries no leading number",
                sub_section_heading.text
            );
            warn!(warning = %warning, "table skipped");
            stats.warnings.push(warning);
            return None;
        };
        if sub_chain.len() != 2 || sub_chain[0] != section_number {
            let warning = format!(
                "sub-section heading {:?} is inconsistent with section {section_number}",
                sub_section_heading.text
            );
            warn!(warning = %warning, "table skipped");
            stats.warnings.push(warning);
            return None;
        }
        let sub_section_number = sub_chain[1];

        let mut path = SectionPath {
            section_number,
            section_name,
            sub_section_number,
            sub_section_name,
            topic_number: None,
            topic_name: None,
            sub_topic_number: None,
            sub_topic_name: None,
        };

        let parent_prefix = format!("{section_number}.{sub_section_number}");
        let topic_candidates = outline.candidates_before(3, position);
        let Some(topic_text) =
            resolver::resolve(&topic_candidates, &self.topic_pattern, &parent_prefix)
        else {
            return Some(path);
        };
        let Some((topic_chain, topic_name)) = split_heading(topic_text) else {
            return Some(path);
        };
        if topic_chain.len() < 3
            || topic_chain[0] != section_number
            || topic_chain[1] != sub_section_number
        {
            debug!(
                heading = topic_text,
                "discarding topic heading with inconsistent parent chain"
            );
            return Some(path);
        }

        let topic_number = topic_chain[2];
        path.topic_number = Some(topic_number);
        path.topic_name = Some(topic_name);
        stats.topic_resolved_tables += 1;

        let topic_prefix = format!("{parent_prefix}.{topic_number}");
        let sub_topic_candidates = outline.candidates_before(4, position);
        if let Some(sub_topic_text) = resolver::resolve(
            &sub_topic_candidates,
            &self.sub_topic_pattern,
            &topic_prefix,
        ) {
            if let Some((sub_topic_chain, sub_topic_name)) = split_heading(sub_topic_text) {
                if sub_topic_chain.len() >= 4
                    && sub_topic_chain[0] == section_number
                    && sub_topic_chain[1] == sub_section_number
                    && sub_topic_chain[2] == topic_number
                {
                    path.sub_topic_number = Some(sub_topic_chain[3]);
                    path.sub_topic_name = Some(sub_topic_name);
                    stats.sub_topic_resolved_tables += 1;
                } else {
                    debug!(
                        heading = sub_topic_text,
                        "discarding sub-topic heading with inconsistent parent chain"
                    );
                }
            }
        }

        Some(path)
    }
}

fn header_accepted(headers: &[String]) -> bool {
    !headers.is_empty()
        && headers
            .iter()
            .all(|header| header == DEFECT_HEADER || header == CATEGORY_HEADER)
}

/// Split a heading into its dotted numeric chain and its name: `1.1.3 Brake
/// hoses` -> ([1, 1, 3], "Brake hoses"). `None` when the leading token is not
/// a dotted number.
pub(super) fn split_heading(text: &str) -> Option<(Vec<u32>, String)> {
    let trimmed = text.trim();
    let mut parts = trimmed.splitn(2, char::is_whitespace);
    let token = parts.next()?;
    let name = parts.next().unwrap_or("").trim().to_string();

    let chain = token
        .trim_end_matches('.')
        .split('.')
        .map(|part| part.parse::<u32>().ok())
        .collect::<Option<Vec<u32>>>()?;

    Some((chain, name))
}
