//! Sentence boundary segmentation for German text.
//!
//! A single left-to-right scan over whitespace-normalized text. A terminal
//! mark (`.`, `!`, `?`) closes a sentence when it ends the text, or when it is
//! followed by a space and an uppercase letter, unless the trailing token is a
//! known abbreviation or the period follows a digit.

use std::sync::OnceLock;

/// Known short forms whose trailing period does not end a sentence.
///
/// Matching is a substring test against the lowercased trailing token, so the
/// period-less stems also catch forms like `bzw,` or `z.b)`.
pub const GERMAN_ABBREVIATIONS: &[&str] = &[
    "z.b.", "d.h.", "u.a.", "u.u.", "vgl.", "usw.", "etc.", "bzw.", "evtl.", "ca.", "ggf.",
    "inkl.", "exkl.", "max.", "min.", "prof.", "dr.", "bzw", "u.a", "u.u", "z.b", "d.h",
];

static DEFAULT_SEGMENTER: OnceLock<Segmenter> = OnceLock::new();

/// Split `text` into sentences using the German abbreviation list.
///
/// Total over all inputs: empty or whitespace-only text yields an empty vector.
///
/// ```
/// use lerndeutsch::segmentation::segment;
///
/// let sentences = segment("Das ist Satz eins. Das ist Satz zwei.");
/// assert_eq!(sentences, vec!["Das ist Satz eins.", "Das ist Satz zwei."]);
/// ```
pub fn segment(text: &str) -> Vec<String> {
    DEFAULT_SEGMENTER.get_or_init(Segmenter::german).segment(text)
}

/// Trim and collapse every whitespace run to a single space.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Sentence segmenter with a configurable abbreviation list.
#[derive(Debug, Clone)]
pub struct Segmenter {
    abbreviations: Vec<String>,
}

impl Segmenter {
    /// Segmenter using [`GERMAN_ABBREVIATIONS`].
    pub fn german() -> Self {
        Self::with_abbreviations(GERMAN_ABBREVIATIONS.iter().copied())
    }

    /// Segmenter using a custom abbreviation list.
    ///
    /// Entries are lowercased; duplicates and blank entries are dropped while
    /// keeping the first-seen order.
    pub fn with_abbreviations<I, S>(abbreviations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut normalized: Vec<String> = Vec::new();
        for abbr in abbreviations {
            let abbr = abbr.as_ref().trim().to_lowercase();
            if !abbr.is_empty() && !normalized.contains(&abbr) {
                normalized.push(abbr);
            }
        }
        Self {
            abbreviations: normalized,
        }
    }

    pub fn abbreviations(&self) -> &[String] {
        &self.abbreviations
    }

    /// Split `text` into trimmed, non-empty sentences in source order.
    pub fn segment(&self, text: &str) -> Vec<String> {
        let cleaned = normalize_whitespace(text);
        if cleaned.is_empty() {
            return Vec::new();
        }

        let chars: Vec<char> = cleaned.chars().collect();
        let mut sentences = Vec::new();
        let mut current = String::new();

        for (i, &c) in chars.iter().enumerate() {
            current.push(c);

            if !is_terminal(c) {
                continue;
            }

            if i == chars.len() - 1 {
                close_sentence(&mut sentences, &mut current);
                continue;
            }

            // Punctuation glued to the next character ("3.5", "z.B") never splits.
            if chars[i + 1] != ' ' {
                continue;
            }

            match chars[i + 1..].iter().find(|&&next| next != ' ') {
                None => close_sentence(&mut sentences, &mut current),
                Some(&next) => {
                    if is_sentence_start(next)
                        && !self.ends_with_abbreviation(&current)
                        && !ends_with_decimal_point(&current)
                    {
                        close_sentence(&mut sentences, &mut current);
                    }
                }
            }
        }

        if !current.trim().is_empty() {
            close_sentence(&mut sentences, &mut current);
        }

        sentences.retain(|s| !s.is_empty());
        sentences
    }

    /// Whether the last whitespace-delimited token of `buffer` contains any
    /// abbreviation (substring containment, not exact match).
    fn ends_with_abbreviation(&self, buffer: &str) -> bool {
        let token = buffer
            .split_whitespace()
            .next_back()
            .unwrap_or_default()
            .to_lowercase();

        self.abbreviations
            .iter()
            .any(|abbr| token.contains(abbr.as_str()))
    }
}

impl Default for Segmenter {
    fn default() -> Self {
        Self::german()
    }
}

fn is_terminal(c: char) -> bool {
    matches!(c, '.' | '!' | '?')
}

/// Only ASCII capitals and the German umlaut capitals open a new sentence.
fn is_sentence_start(c: char) -> bool {
    c.is_ascii_uppercase() || matches!(c, 'Ä' | 'Ö' | 'Ü')
}

/// `true` when the trimmed buffer ends with an ASCII digit followed by `.`.
fn ends_with_decimal_point(buffer: &str) -> bool {
    let mut tail = buffer.trim_end().chars().rev();
    matches!(
        (tail.next(), tail.next()),
        (Some('.'), Some(d)) if d.is_ascii_digit()
    )
}

fn close_sentence(sentences: &mut Vec<String>, current: &mut String) {
    sentences.push(current.trim().to_string());
    current.clear();
}
