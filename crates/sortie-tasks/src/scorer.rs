//! Answer equivalence scoring
//!
//! Compares a predicted answer with a gold answer using one of three rules,
//! chosen by the shape of the gold answer:
//!
//! 1. **Number**: the gold answer parses as a float. The prediction is parsed
//!    after removing `$`, `%` and `,`; anything unparsable becomes `+inf`.
//!    Equality is exact.
//! 2. **List**: the gold answer contains `,` or `;`. Both sides are split on
//!    those separators and compared element by element (numbers as above,
//!    everything else ignoring case and whitespace but not punctuation). Lists
//!    of different lengths never match.
//! 3. **String**: whitespace and ASCII punctuation are removed and the rest is
//!    compared case-insensitively.

use std::borrow::Cow;

use tracing::{debug, warn};

const LIST_SEPARATORS: [char; 2] = [',', ';'];
const NUMBER_NOISE: [char; 3] = ['$', '%', ','];

/// Decide whether `pred` answers the question whose expected answer is `gold`
pub fn score(pred: &str, gold: &str) -> bool {
    if let Some(gold_value) = parse_float(gold) {
        debug!(pred, gold, "scoring as number");
        return normalize_number(pred) == gold_value;
    }

    if gold.contains(LIST_SEPARATORS) {
        debug!(pred, gold, "scoring as list");
        let gold_elems = split_list(gold);
        let pred_elems = split_list(pred);

        if gold_elems.len() != pred_elems.len() {
            warn!(
                pred_len = pred_elems.len(),
                gold_len = gold_elems.len(),
                "answer lists have different lengths, scoring as incorrect"
            );
            return false;
        }

        return pred_elems
            .iter()
            .zip(gold_elems.iter())
            .all(|(p, g)| match parse_float(g) {
                Some(gold_value) => normalize_number(p) == gold_value,
                None => normalize_str(p, false) == normalize_str(g, false),
            });
    }

    debug!(pred, gold, "scoring as string");
    normalize_str(pred, true) == normalize_str(gold, true)
}

/// Parse a number the way a lenient float parser would: surrounding
/// whitespace is ignored and single underscores may separate digits.
pub fn parse_float(s: &str) -> Option<f64> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return None;
    }

    let cleaned: Cow<'_, str> = if trimmed.contains('_') {
        if !underscores_between_digits(trimmed) {
            return None;
        }
        Cow::Owned(trimmed.replace('_', ""))
    } else {
        Cow::Borrowed(trimmed)
    };

    cleaned.parse::<f64>().ok()
}

fn underscores_between_digits(s: &str) -> bool {
    let chars: Vec<char> = s.chars().collect();
    chars.iter().enumerate().all(|(i, c)| {
        *c != '_'
            || (i > 0
                && i + 1 < chars.len()
                && chars[i - 1].is_ascii_digit()
                && chars[i + 1].is_ascii_digit())
    })
}

/// Parse a predicted number, stripping currency, percent and thousands
/// separators. Unparsable input maps to `+inf`.
pub fn normalize_number(s: &str) -> f64 {
    let stripped: String = s.chars().filter(|c| !NUMBER_NOISE.contains(c)).collect();
    match parse_float(&stripped) {
        Some(value) => value,
        None => {
            debug!(value = %stripped, "cannot normalize to a number");
            f64::INFINITY
        }
    }
}

/// Remove whitespace, lowercase and optionally strip ASCII punctuation
pub fn normalize_str(s: &str, remove_punct: bool) -> String {
    let lowered = s
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_lowercase();

    if remove_punct {
        lowered.chars().filter(|c| !c.is_ascii_punctuation()).collect()
    } else {
        lowered
    }
}

fn split_list(s: &str) -> Vec<&str> {
    s.split(LIST_SEPARATORS).collect()
}
