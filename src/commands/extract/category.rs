use serde::Serialize;

/// The manual's fixed severity set. Anything else in a category cell is
/// annotation noise (footnote daggers, asterisks) and never reaches the
/// output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Category {
    Dangerous,
    Major,
    Minor,
}

impl Category {
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "Dangerous" => Some(Self::Dangerous),
            "Major" => Some(Self::Major),
            "Minor" => Some(Self::Minor),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Dangerous => "Dangerous",
            Self::Major => "Major",
            Self::Minor => "Minor",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Filter a raw category cell down to recognized severity tokens, in source
/// order.
pub fn align_categories(raw: &str) -> Vec<Category> {
    raw.split_whitespace()
        .filter_map(Category::from_token)
        .collect()
}

/// Category for clause `index`. A single stated category applies to every
/// sub-point unless a later token overrides it, so positions past the end of
/// the list reuse the first category. An empty list pairs with nothing.
pub fn category_for(categories: &[Category], index: usize) -> Option<Category> {
    categories
        .get(index)
        .copied()
        .or_else(|| categories.first().copied())
}
