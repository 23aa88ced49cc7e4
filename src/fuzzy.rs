//! Phrase matching for wake words
//!
//! Exact matching is a plain substring search. Fuzzy matching compares word
//! windows with Levenshtein distance to absorb recognition errors such as
//! "no gen" or "nogan".

/// Fuzzy match using Levenshtein distance, allows ~30% errors
pub fn fuzzy_match(expected: &str, actual: &str) -> bool {
    if expected == actual {
        return true;
    }
    let max_dist = (expected.len() / 3).max(1);
    levenshtein(expected, actual) <= max_dist
}

/// Calculate Levenshtein distance between two strings
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];

    for i in 1..=a.len() {
        curr[0] = i;
        for j in 1..=b.len() {
            let cost = if a[i - 1] == b[j - 1] { 0 } else { 1 };
            curr[j] = (prev[j] + 1).min(curr[j - 1] + 1).min(prev[j - 1] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

/// Keep only letters, lower-cased
fn clean_word(word: &str) -> String {
    word.chars()
        .filter(|c| c.is_alphabetic())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Whitespace-separated words of `text` with their byte ranges
fn words_with_spans(text: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut start = None;
    for (i, c) in text.char_indices() {
        match (c.is_whitespace(), start) {
            (true, Some(s)) => {
                spans.push((s, i));
                start = None;
            }
            (false, None) => start = Some(i),
            _ => {}
        }
    }
    if let Some(s) = start {
        spans.push((s, text.len()));
    }
    spans
}

/// Find `phrase` in `text`, returning the byte offset just past the match.
///
/// Both arguments are expected to be lower-cased already.
pub fn contains_phrase(text: &str, phrase: &str, fuzzy: bool) -> Option<usize> {
    if phrase.is_empty() {
        return None;
    }
    if let Some(pos) = text.find(phrase) {
        return Some(pos + phrase.len());
    }
    if !fuzzy {
        return None;
    }

    let phrase_words: Vec<String> = phrase.split_whitespace().map(clean_word).collect();
    let spans = words_with_spans(text);

    // Also try the phrase glued together ("no gen" -> "nogen")
    let glued: String = phrase_words.concat();
    for width in [phrase_words.len(), phrase_words.len() + 1] {
        if width == 0 || spans.len() < width {
            continue;
        }
        for window in spans.windows(width) {
            let spoken: Vec<String> = window.iter().map(|&(s, e)| clean_word(&text[s..e])).collect();
            let end = window[window.len() - 1].1;

            if width == phrase_words.len()
                && phrase_words
                    .iter()
                    .zip(&spoken)
                    .all(|(expected, actual)| fuzzy_match(expected, actual))
            {
                return Some(end);
            }
            if fuzzy_match(&glued, &spoken.concat()) && spoken.iter().all(|w| !w.is_empty()) {
                return Some(end);
            }
        }
    }
    None
}
