use anyhow::{Result, anyhow};
use scraper::{ElementRef, Html, Selector};

/// One heading occurrence in document order. The numbering engine never
/// touches the markup again after the gather pass: level, position, and raw
/// text are all it needs.
#[derive(Debug, Clone)]
pub struct Heading {
    pub level: u8,
    pub position: usize,
    pub text: String,
}

/// A data-table candidate: header-cell texts plus the td texts of every body
/// row, keyed by the table's document position for preceding-heading queries.
#[derive(Debug, Clone)]
pub struct RawTable {
    pub position: usize,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

#[derive(Debug, Clone, Default)]
pub struct PageOutline {
    pub headings: Vec<Heading>,
}

impl PageOutline {
    /// Nearest heading of `level` strictly before `position` in document
    /// order. Headings are gathered in document order, so the last match is
    /// the nearest.
    pub fn nearest_preceding(&self, level: u8, position: usize) -> Option<&Heading> {
        self.headings
            .iter()
            .filter(|heading| heading.level == level && heading.position < position)
            .next_back()
    }

    /// All heading texts of `level` preceding `position`, in document order.
    /// This is the candidate set handed to the heading resolver.
    pub fn candidates_before(&self, level: u8, position: usize) -> Vec<&str> {
        self.headings
            .iter()
            .filter(|heading| heading.level == level && heading.position < position)
            .map(|heading| heading.text.as_str())
            .collect()
    }
}

/// Walk the parsed page once and flatten it into plain heading and table
/// records. Positions are indices into the same document-order traversal, so
/// "nearest preceding" comparisons work across the two collections.
pub fn gather_page(document: &Html) -> Result<(PageOutline, Vec<RawTable>)> {
    let th_selector = selector("th")?;
    let tr_selector = selector("tr")?;
    let td_selector = selector("td")?;

    let mut outline = PageOutline::default();
    let mut tables = Vec::new();

    for (position, node) in document.root_element().descendants().enumerate() {
        let Some(element) = ElementRef::wrap(node) else {
            continue;
        };

        match element.value().name() {
            "h1" | "h2" | "h3" | "h4" => {
                let level = element.value().name().as_bytes()[1] - b'0';
                outline.headings.push(Heading {
                    level,
                    position,
                    text: element_text(element),
                });
            }
            "table" => {
                let headers = element
                    .select(&th_selector)
                    .map(element_text)
                    .collect::<Vec<String>>();

                let mut rows = Vec::new();
                for row in element.select(&tr_selector) {
                    let cells = row
                        .select(&td_selector)
                        .map(element_text)
                        .collect::<Vec<String>>();
                    if !cells.is_empty() {
                        rows.push(cells);
                    }
                }

                tables.push(RawTable {
                    position,
                    headers,
                    rows,
                });
            }
            _ => {}
        }
    }

    Ok((outline, tables))
}

/// Text content with collapsed whitespace. Text chunks are joined with a
/// space so cell content split across child elements keeps its word breaks.
pub fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .collect::<Vec<&str>>()
        .join(" ")
        .split_whitespace()
        .collect::<Vec<&str>>()
        .join(" ")
}

pub fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|err| anyhow!("failed to compile selector {css}: {err}"))
}
