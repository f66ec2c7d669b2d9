use regex::Regex;
use scraper::Html;

use super::category::{Category, align_categories, category_for};
use super::normalize::{ExtractStats, TableNormalizer, split_heading};
use super::outline::{Heading, PageOutline, RawTable, gather_page};
use super::resolver::resolve;
use super::segment::DefectSegmenter;

fn topic_pattern() -> Regex {
    Regex::new(r"^(\d+)\.(\d+)\.(\d+)").expect("topic pattern compiles")
}

fn heading(level: u8, position: usize, text: &str) -> Heading {
    Heading {
        level,
        position,
        text: text.to_string(),
    }
}

fn outline_of(headings: Vec<Heading>) -> PageOutline {
    PageOutline { headings }
}

fn raw_table(position: usize, headers: &[&str], rows: &[&[&str]]) -> RawTable {
    RawTable {
        position,
        headers: headers.iter().map(ToString::to_string).collect(),
        rows: rows
            .iter()
            .map(|cells| cells.iter().map(ToString::to_string).collect())
            .collect(),
    }
}

fn footbrake_outline() -> PageOutline {
    outline_of(vec![
        heading(1, 0, "1. Brakes"),
        heading(2, 1, "1.1 Footbrake"),
    ])
}

#[test]
fn resolve_prefers_deepest_numbering_under_parent() {
    let candidates = vec!["1.1.1 Condition", "1.1.3 Brake hoses"];

    let resolved = resolve(&candidates, &topic_pattern(), "1.1");
    assert_eq!(resolved, Some("1.1.3 Brake hoses"));
}

#[test]
fn resolve_prunes_candidates_under_unrelated_parents() {
    // 4.1.2 carries the larger concatenated number but belongs elsewhere.
    let candidates = vec!["4.1.2 Suspension arms", "1.1.2 Brake pedal"];

    let resolved = resolve(&candidates, &topic_pattern(), "1.1");
    assert_eq!(resolved, Some("1.1.2 Brake pedal"));
}

#[test]
fn resolve_returns_none_when_nothing_matches() {
    assert_eq!(resolve(&[], &topic_pattern(), "1.1"), None);
    assert_eq!(
        resolve(&["1.1 Footbrake"], &topic_pattern(), "1.1"),
        None,
        "two-level heading must not satisfy the three-level pattern"
    );
    assert_eq!(
        resolve(&["Brake hoses and pipes"], &topic_pattern(), "1.1"),
        None
    );
}

#[test]
fn resolve_tie_break_is_unspecified_but_within_the_candidate_set() {
    let candidates = vec!["1.1.2 Brake pedal", "1.1.2 Brake pedal"];

    let resolved = resolve(&candidates, &topic_pattern(), "1.1");
    assert_eq!(resolved, Some("1.1.2 Brake pedal"));
}

#[test]
fn resolve_accepts_string_prefix_impostors_for_the_caller_to_reject() {
    // "1.10.4" survives the string-prefix filter; the numeric cross-check
    // downstream is what rejects it.
    let candidates = vec!["1.10.4 Trailer couplings"];

    let resolved = resolve(&candidates, &topic_pattern(), "1.1");
    assert_eq!(resolved, Some("1.10.4 Trailer couplings"));
}

#[test]
fn split_heading_reads_dotted_chains() {
    assert_eq!(split_heading("1. Brakes"), Some((vec![1], "Brakes".to_string())));
    assert_eq!(
        split_heading("1.1 Footbrake"),
        Some((vec![1, 1], "Footbrake".to_string()))
    );
    assert_eq!(
        split_heading("1.1.3 Brake hoses and pipes"),
        Some((vec![1, 1, 3], "Brake hoses and pipes".to_string()))
    );
    assert_eq!(split_heading("Introduction"), None);
}

#[test]
fn segment_returns_unsplit_cell_when_no_sub_marker_exists() {
    let segmenter = DefectSegmenter::new().expect("segmenter builds");

    let clauses = segmenter.segment("  (a) Tyre worn.  ");
    assert_eq!(clauses, vec!["(a) Tyre worn.".to_string()]);

    assert!(segmenter.segment("   ").is_empty());
}

#[test]
fn segment_prefixes_main_description_onto_every_sub_clause() {
    let segmenter = DefectSegmenter::new().expect("segmenter builds");

    let clauses = segmenter.segment("(a) Item loose: (i) slightly (ii) significantly");
    assert_eq!(
        clauses,
        vec![
            "(a) Item loose: (i) slightly".to_string(),
            "(a) Item loose: (ii) significantly".to_string(),
        ]
    );
}

#[test]
fn segment_keeps_sub_clauses_bare_when_main_description_is_absent() {
    let segmenter = DefectSegmenter::new().expect("segmenter builds");

    let clauses = segmenter.segment("(i) inoperative (ii) missing");
    assert_eq!(
        clauses,
        vec!["(i) inoperative".to_string(), "(ii) missing".to_string()]
    );
}

#[test]
fn point_extracts_first_marker_and_first_roman_follower() {
    let segmenter = DefectSegmenter::new().expect("segmenter builds");

    assert_eq!(segmenter.point("(a) Tyre worn."), Some("(a)".to_string()));
    assert_eq!(
        segmenter.point("(a) Item loose: (ii) significantly"),
        Some("(a) (ii)".to_string())
    );
    assert_eq!(segmenter.point("no markers at all"), None);
    assert_eq!(
        segmenter.point("(a) first (b) second"),
        Some("(a)".to_string()),
        "a non-Roman follower is not part of the point"
    );
}

#[test]
fn align_categories_keeps_severity_tokens_only() {
    assert_eq!(
        align_categories("Minor Major *"),
        vec![Category::Minor, Category::Major]
    );
    assert_eq!(align_categories("† Dangerous"), vec![Category::Dangerous]);
    assert!(align_categories("major MAJOR severity").is_empty());
}

#[test]
fn category_for_reuses_the_first_category_past_the_end() {
    let categories = vec![Category::Minor];

    assert_eq!(category_for(&categories, 0), Some(Category::Minor));
    assert_eq!(category_for(&categories, 2), Some(Category::Minor));
    assert_eq!(category_for(&[], 0), None);
}

#[test]
fn normalize_emits_single_clause_row() {
    let normalizer = TableNormalizer::new().expect("normalizer builds");
    let table = raw_table(5, &["Defect", "Category"], &[&["(a) Tyre worn.", "Major"]]);
    let mut stats = ExtractStats::default();

    let rows = normalizer.normalize(&footbrake_outline(), &table, &mut stats);

    assert_eq!(rows.len(), 1);
    let row = &rows[0];
    assert_eq!(row.section_number, 1);
    assert_eq!(row.section_name, "Brakes");
    assert_eq!(row.sub_section_number, 1);
    assert_eq!(row.sub_section_name, "Footbrake");
    assert_eq!(row.topic_number, None);
    assert_eq!(row.full_reference_code, "1.1 (a)");
    assert_eq!(row.defect, "(a) Tyre worn.");
    assert_eq!(row.category, Category::Major);
    assert_eq!(stats.clauses_emitted, 1);
}

#[test]
fn normalize_explodes_sub_points_with_aligned_categories() {
    let normalizer = TableNormalizer::new().expect("normalizer builds");
    let table = raw_table(
        5,
        &["Defect", "Category"],
        &[&[
            "(a) Item loose: (i) slightly (ii) significantly",
            "Minor Major",
        ]],
    );
    let mut stats = ExtractStats::default();

    let rows = normalizer.normalize(&footbrake_outline(), &table, &mut stats);

    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].full_reference_code, "1.1 (a) (i)");
    assert_eq!(rows[0].category, Category::Minor);
    assert_eq!(rows[1].full_reference_code, "1.1 (a) (ii)");
    assert_eq!(rows[1].category, Category::Major);
    assert!(rows.iter().all(|row| row.defect.contains("Item loose:")));
}

#[test]
fn normalize_skips_tables_with_unexpected_headers() {
    let normalizer = TableNormalizer::new().expect("normalizer builds");
    let table = raw_table(5, &["Defect", "Foo"], &[&["(a) Tyre worn.", "Major"]]);
    let mut stats = ExtractStats::default();

    let rows = normalizer.normalize(&footbrake_outline(), &table, &mut stats);

    assert!(rows.is_empty());
    assert_eq!(stats.tables_skipped_header, 1);

    let headerless = raw_table(6, &[], &[&["(a) Tyre worn.", "Major"]]);
    assert!(
        normalizer
            .normalize(&footbrake_outline(), &headerless, &mut stats)
            .is_empty()
    );
}

#[test]
fn normalize_discards_topic_with_inconsistent_parent_digit() {
    let normalizer = TableNormalizer::new().expect("normalizer builds");
    // Survives the resolver's string-prefix filter but 10 != 1.
    let outline = outline_of(vec![
        heading(1, 0, "1. Brakes"),
        heading(2, 1, "1.1 Footbrake"),
        heading(3, 2, "1.10.4 Trailer couplings"),
    ]);
    let table = raw_table(5, &["Defect", "Category"], &[&["(a) Tyre worn.", "Major"]]);
    let mut stats = ExtractStats::default();

    let rows = normalizer.normalize(&outline, &table, &mut stats);

    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].topic_number, None);
    assert_eq!(rows[0].topic_name, None);
    assert_eq!(rows[0].full_reference_code, "1.1 (a)");
    assert_eq!(stats.topic_resolved_tables, 0);
}

#[test]
fn normalize_resolves_topic_and_sub_topic_chains() {
    let normalizer = TableNormalizer::new().expect("normalizer builds");
    let outline = outline_of(vec![
        heading(1, 0, "1. Brakes"),
        heading(2, 1, "1.1 Footbrake"),
        heading(3, 2, "1.1.1 Condition"),
        heading(3, 4, "1.1.3 Brake hoses"),
        heading(4, 6, "1.1.3.2 Damage"),
    ]);
    let table = raw_table(
        10,
        &["Defect", "Category"],
        &[&["(a) Hose chafed: (ii) cord exposed", "Dangerous"]],
    );
    let mut stats = ExtractStats::default();

    let rows = normalizer.normalize(&outline, &table, &mut stats);

    assert_eq!(rows.len(), 1);
    let row = &rows[0];
    assert_eq!(row.topic_number, Some(3));
    assert_eq!(row.topic_name.as_deref(), Some("Brake hoses"));
    assert_eq!(row.sub_topic_number, Some(2));
    assert_eq!(row.sub_topic_name.as_deref(), Some("Damage"));
    assert_eq!(row.full_reference_code, "1.1.3.2 (a) (ii)");
    assert_eq!(stats.topic_resolved_tables, 1);
    assert_eq!(stats.sub_topic_resolved_tables, 1);
}

#[test]
fn normalize_skips_tables_with_inconsistent_sub_section() {
    let normalizer = TableNormalizer::new().expect("normalizer builds");
    let outline = outline_of(vec![
        heading(1, 0, "1. Brakes"),
        heading(2, 1, "2.1 Steering condition"),
    ]);
    let table = raw_table(5, &["Defect", "Category"], &[&["(a) Tyre worn.", "Major"]]);
    let mut stats = ExtractStats::default();

    let rows = normalizer.normalize(&outline, &table, &mut stats);

    assert!(rows.is_empty());
    assert_eq!(stats.tables_skipped_heading, 1);
    assert!(!stats.warnings.is_empty());
}

#[test]
fn normalize_drops_not_in_use_rows_and_malformed_rows() {
    let normalizer = TableNormalizer::new().expect("normalizer builds");
    let table = raw_table(
        5,
        &["Defect", "Category"],
        &[
            &["Not in use", "Major"],
            &["only one cell"],
            &["(a) Loose.", "*"],
            &["(a) Worn.", "Minor"],
        ],
    );
    let mut stats = ExtractStats::default();

    let rows = normalizer.normalize(&footbrake_outline(), &table, &mut stats);

    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].full_reference_code, "1.1 (a)");
    assert_eq!(rows[0].category, Category::Minor);
    assert_eq!(stats.rows_not_in_use, 1);
    assert_eq!(stats.rows_skipped_shape, 1);
    assert_eq!(stats.clauses_without_category, 1);
}

#[test]
fn normalize_reuses_single_category_across_sub_points() {
    let normalizer = TableNormalizer::new().expect("normalizer builds");
    let table = raw_table(
        5,
        &["Defect", "Category"],
        &[&["(a) Linkage worn: (i) slightly (ii) badly (iii) seized", "Minor"]],
    );
    let mut stats = ExtractStats::default();

    let rows = normalizer.normalize(&footbrake_outline(), &table, &mut stats);

    assert_eq!(rows.len(), 3);
    assert!(rows.iter().all(|row| row.category == Category::Minor));
}

#[test]
fn normalize_is_idempotent_over_unchanged_input() {
    let normalizer = TableNormalizer::new().expect("normalizer builds");
    let outline = outline_of(vec![
        heading(1, 0, "1. Brakes"),
        heading(2, 1, "1.1 Footbrake"),
        heading(3, 2, "1.1.2 Performance"),
    ]);
    let table = raw_table(
        10,
        &["Defect", "Category"],
        &[&["(a) Effort imbalanced: (i) left (ii) right", "Major"]],
    );

    let first = normalizer.normalize(&outline, &table, &mut ExtractStats::default());
    let second = normalizer.normalize(&outline, &table, &mut ExtractStats::default());

    assert_eq!(first, second);
}

#[test]
fn gather_page_collects_headings_and_tables_in_document_order() {
    let html = Html::parse_document(
        r#"
        <html><body>
          <h1>1. Brakes</h1>
          <h2>1.1 Footbrake</h2>
          <p>intro</p>
          <table>
            <thead><tr><th>Defect</th><th>Category</th></tr></thead>
            <tbody><tr><td>(a) Pedal worn.</td><td>Major</td></tr></tbody>
          </table>
        </body></html>
        "#,
    );

    let (outline, tables) = gather_page(&html).expect("gather succeeds");

    assert_eq!(outline.headings.len(), 2);
    assert_eq!(outline.headings[0].level, 1);
    assert_eq!(outline.headings[0].text, "1. Brakes");
    assert_eq!(outline.headings[1].level, 2);

    assert_eq!(tables.len(), 1);
    assert_eq!(tables[0].headers, vec!["Defect", "Category"]);
    assert_eq!(tables[0].rows, vec![vec!["(a) Pedal worn.", "Major"]]);
    assert!(tables[0].position > outline.headings[1].position);
}

#[test]
fn gather_and_normalize_extract_a_whole_page() {
    let html = Html::parse_document(
        r#"
        <html><body>
          <h1>1. Brakes</h1>
          <div>
            <h2>1.1 Footbrake</h2>
            <h3>1.1.1 Condition</h3>
            <table>
              <thead><tr><th>Defect</th><th>Category</th></tr></thead>
              <tbody>
                <tr><td>(a) Pedal worn.</td><td>Major</td></tr>
                <tr>
                  <td><p>(b) Travel excessive:</p><p>(i) slightly</p><p>(ii) to the floor</p></td>
                  <td><p>Minor</p><p>Dangerous</p></td>
                </tr>
              </tbody>
            </table>
            <h3>1.1.2 Performance</h3>
            <table>
              <thead><tr><th>Defect</th><th>Category</th></tr></thead>
              <tbody><tr><td>(a) Effort low.</td><td>Major</td></tr></tbody>
            </table>
          </div>
        </body></html>
        "#,
    );

    let normalizer = TableNormalizer::new().expect("normalizer builds");
    let (outline, tables) = gather_page(&html).expect("gather succeeds");
    let mut stats = ExtractStats::default();

    let rows: Vec<_> = tables
        .iter()
        .flat_map(|table| normalizer.normalize(&outline, table, &mut stats))
        .collect();

    let codes: Vec<&str> = rows
        .iter()
        .map(|row| row.full_reference_code.as_str())
        .collect();
    assert_eq!(
        codes,
        vec!["1.1.1 (a)", "1.1.1 (b) (i)", "1.1.1 (b) (ii)", "1.1.2 (a)"]
    );

    assert_eq!(rows[1].defect, "(b) Travel excessive: (i) slightly");
    assert_eq!(rows[1].category, Category::Minor);
    assert_eq!(rows[2].category, Category::Dangerous);
    assert_eq!(rows[3].topic_name.as_deref(), Some("Performance"));
    assert_eq!(stats.tables_accepted, 2);

    // Every emitted code extends its table's resolved numbering.
    assert!(
        rows.iter()
            .all(|row| row.full_reference_code.starts_with(&format!(
                "{}.{}",
                row.section_number, row.sub_section_number
            )))
    );
}
