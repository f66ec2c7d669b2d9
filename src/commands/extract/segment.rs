use anyhow::{Context, Result};
use regex::Regex;

/// Splits a raw defect cell into atomic clauses and extracts the point
/// markers that identify them.
///
/// A cell reads like `(a) Item loose: (i) slightly (ii) significantly`: one
/// main description followed by Roman-numeral sub-points that inherit the
/// parent wording. Sub-markers double as split points; the main description
/// is re-attached to every sub-clause so each output row stands alone.
#[derive(Debug)]
pub struct DefectSegmenter {
    sub_marker: Regex,
    point_marker: Regex,
}

impl DefectSegmenter {
    pub fn new() -> Result<Self> {
        let sub_marker =
            Regex::new(r"\([ivx]+\)").context("failed to compile sub-point marker regex")?;
        let point_marker =
            Regex::new(r"\([a-z]+\)").context("failed to compile point marker regex")?;

        Ok(Self {
            sub_marker,
            point_marker,
        })
    }

    /// Split `raw` into clause strings, in source order. Cells without any
    /// sub-point marker come back as a single trimmed clause; whitespace-only
    /// segments are dropped.
    pub fn segment(&self, raw: &str) -> Vec<String> {
        let text = raw.trim();
        if text.is_empty() {
            return Vec::new();
        }

        let starts: Vec<usize> = self.sub_marker.find_iter(text).map(|m| m.start()).collect();
        if starts.is_empty() {
            return vec![text.to_string()];
        }

        // Slicing at match offsets keeps each marker attached to the clause
        // it introduces.
        let main = text[..starts[0]].trim();

        let mut bounds = starts;
        bounds.push(text.len());

        let mut clauses = Vec::new();
        for pair in bounds.windows(2) {
            let sub = text[pair[0]..pair[1]].trim();
            if sub.is_empty() {
                continue;
            }
            if main.is_empty() {
                clauses.push(sub.to_string());
            } else {
                clauses.push(format!("{main} {sub}"));
            }
        }

        clauses
    }

    /// The point marker(s) of a clause: its first parenthesized marker, plus
    /// the first later marker that is purely Roman, e.g. `(a) (ii)`. `None`
    /// when the clause carries no marker at all.
    pub fn point(&self, clause: &str) -> Option<String> {
        let mut markers = self.point_marker.find_iter(clause);
        let first = markers.next()?;

        let mut point = first.as_str().to_string();
        for marker in markers {
            let inner = &marker.as_str()[1..marker.as_str().len() - 1];
            if inner.chars().all(|ch| matches!(ch, 'i' | 'v' | 'x')) {
                point.push(' ');
                point.push_str(marker.as_str());
                break;
            }
        }

        Some(point)
    }
}
