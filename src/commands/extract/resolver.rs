use regex::Regex;

/// Pick the heading a table actually belongs to from a set of candidates at
/// one nesting level.
///
/// Candidates are pruned to those whose leading whitespace-delimited token
/// starts with `parent_prefix`; the document repeats heading text for
/// cross-referencing, and the prefix filter drops numerically plausible
/// candidates that hang off an unrelated parent. Among the survivors, each
/// match of `pattern` has its digit groups concatenated into one integer and
/// the maximum wins: under the same parent, a later numbering occurrence is
/// the one the current table sits beneath, while raw document order is
/// unreliable.
///
/// `None` means the level is absent for this table; callers fall back to the
/// next shallower level. Ties keep the last-computed maximum and are not a
/// contract.
pub fn resolve<'a>(candidates: &[&'a str], pattern: &Regex, parent_prefix: &str) -> Option<&'a str> {
    let mut best: Option<(&str, u64)> = None;

    for candidate in candidates {
        let text = candidate.trim();
        let leading_token = text.split_whitespace().next().unwrap_or_default();
        if !leading_token.starts_with(parent_prefix) {
            continue;
        }

        let Some(captures) = pattern.captures(text) else {
            continue;
        };
        let Some(weight) = numbering_weight(&captures) else {
            continue;
        };

        if best.is_none_or(|(_, max)| weight >= max) {
            best = Some((text, weight));
        }
    }

    best.map(|(text, _)| text)
}

/// Concatenate the digit groups of a numbering match into one integer, e.g.
/// `1.1.3` -> 113. This orders candidates sharing a parent by depth and
/// position in the numbering scheme.
fn numbering_weight(captures: &regex::Captures<'_>) -> Option<u64> {
    let mut digits = String::new();
    for group in captures.iter().skip(1).flatten() {
        digits.push_str(group.as_str());
    }

    if digits.is_empty() {
        return None;
    }

    digits.parse::<u64>().ok()
}
