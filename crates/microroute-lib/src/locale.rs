//! Locale adaptation of instruction text.
//!
//! [`GermanLocale`] translates common English provider phrases and rewrites
//! movement verbs so they match the travel mode. All replacements match whole
//! words only, case-insensitively, and keep the capitalisation of the matched
//! text. Every rule produces text that no rule matches again, which makes
//! adapting an already adapted list a no-op.
//!
//! Movement verbs and the bare preposition "on" are only rewritten in
//! imperative position: at the start of a sentence or written in lower case.
//! A capitalised word inside a sentence is part of a place name ("Ocean
//! Drive", "Bike Lane") and is left alone.

use crate::instructions::Instruction;
use crate::routing::TravelMode;

/// Movement verbs of one travel mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeVerbs {
    /// Polite imperative, e.g. "Gehen Sie".
    pub imperative: &'static str,
    /// Infinitive used at the end of a phrase, e.g. "gehen".
    pub infinitive: &'static str,
}

/// German movement verbs for `mode`.
pub fn german_verbs(mode: TravelMode) -> ModeVerbs {
    match mode {
        TravelMode::Walking => ModeVerbs {
            imperative: "Gehen Sie",
            infinitive: "gehen",
        },
        TravelMode::Cycling => ModeVerbs {
            imperative: "Radeln Sie",
            infinitive: "radeln",
        },
        TravelMode::Driving => ModeVerbs {
            imperative: "Fahren Sie",
            infinitive: "fahren",
        },
    }
}

/// Verb forms per mode, in walking / cycling / driving order.
const VERB_FORMS: &[[&str; 3]] = &[
    ["gehen", "radeln", "fahren"],
    ["gehe", "radle", "fahre"],
    ["geht", "radelt", "fährt"],
    ["weitergehen", "weiterradeln", "weiterfahren"],
    ["gegangen", "geradelt", "gefahren"],
];

/// English phrases with a fixed German translation. Longer phrases first.
const PHRASES: &[(&str, &str)] = &[
    ("destination will be on the left", "Das Ziel befindet sich links"),
    ("destination will be on the right", "Das Ziel befindet sich rechts"),
    ("make a u-turn", "Wenden"),
    ("slight left", "Leicht links abbiegen"),
    ("slight right", "Leicht rechts abbiegen"),
    ("sharp left", "Scharf links abbiegen"),
    ("sharp right", "Scharf rechts abbiegen"),
    ("turn left", "Links abbiegen"),
    ("turn right", "Rechts abbiegen"),
    ("keep left", "Links halten"),
    ("keep right", "Rechts halten"),
    ("u-turn", "Wenden"),
    ("onto", "auf"),
    ("toward", "Richtung"),
    ("towards", "Richtung"),
];

/// Prepositions translated only outside place names, after [`PHRASES`].
const PREPOSITIONS: &[(&str, &str)] = &[("on", "auf")];

/// Compass directions used by "Head ..." phrases.
const HEADINGS: &[(&str, &str)] = &[
    ("northeast", "Nordosten"),
    ("northwest", "Nordwesten"),
    ("southeast", "Südosten"),
    ("southwest", "Südwesten"),
    ("north", "Norden"),
    ("south", "Süden"),
    ("east", "Osten"),
    ("west", "Westen"),
];

/// English movement verbs replaced by the mode imperative.
const ENGLISH_VERBS: &[&str] = &["walk", "drive", "cycle", "bike", "ride"];

/// Rewrites instruction text into a target locale.
///
/// Implementations must be idempotent.
pub trait LocaleAdapter: Send + Sync {
    /// BCP 47 language tag of the output.
    fn language(&self) -> &str;

    /// Adapt one instruction text for `mode`.
    fn adapt_text(&self, text: &str, mode: TravelMode) -> String;

    /// Adapt a whole instruction list; maneuvers and distances are kept.
    fn adapt(&self, instructions: &[Instruction], mode: TravelMode) -> Vec<Instruction> {
        instructions
            .iter()
            .map(|instruction| Instruction {
                text: self.adapt_text(&instruction.text, mode),
                ..instruction.clone()
            })
            .collect()
    }
}

/// German phrasing with mode-correct verbs.
#[derive(Debug, Clone, Copy, Default)]
pub struct GermanLocale;

impl LocaleAdapter for GermanLocale {
    fn language(&self) -> &str {
        "de"
    }

    fn adapt_text(&self, text: &str, mode: TravelMode) -> String {
        let verbs = german_verbs(mode);
        let mut adapted = text.to_string();

        for (heading, german) in HEADINGS {
            let phrase = format!("head {heading}");
            let replacement = format!("{} nach {german}", verbs.imperative);
            adapted = replace_whole_words(&adapted, &phrase, &replacement);
        }
        adapted = replace_whole_words(
            &adapted,
            "continue straight",
            &format!("{} geradeaus weiter", verbs.imperative),
        );
        adapted = replace_whole_words(
            &adapted,
            "continue",
            &format!("{} weiter", verbs.imperative),
        );
        for (english, german) in PHRASES {
            adapted = replace_whole_words(&adapted, english, german);
        }
        for (english, german) in PREPOSITIONS {
            adapted = replace_imperative_words(&adapted, english, german);
        }
        for english in ENGLISH_VERBS {
            adapted = replace_imperative_words(&adapted, english, verbs.imperative);
        }

        let target = mode_column(mode);
        for forms in VERB_FORMS {
            for (column, form) in forms.iter().enumerate() {
                if column != target {
                    adapted = replace_imperative_words(&adapted, form, forms[target]);
                }
            }
        }

        collapse_whitespace(&adapted)
    }
}

fn mode_column(mode: TravelMode) -> usize {
    match mode {
        TravelMode::Walking => 0,
        TravelMode::Cycling => 1,
        TravelMode::Driving => 2,
    }
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn char_eq_ignore_case(a: char, b: char) -> bool {
    a == b || a.to_lowercase().eq(b.to_lowercase())
}

/// Position of the first whole-word, case-insensitive match at or after `from`.
fn find_whole_word(haystack: &[char], needle: &[char], from: usize) -> Option<usize> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }
    (from..=haystack.len() - needle.len()).find(|&start| {
        let end = start + needle.len();
        haystack[start..end]
            .iter()
            .zip(needle)
            .all(|(a, b)| char_eq_ignore_case(*a, *b))
            && (start == 0 || !is_word_char(haystack[start - 1]))
            && (end == haystack.len() || !is_word_char(haystack[end]))
    })
}

/// Whether `text` contains `word` (or phrase) on word boundaries.
pub fn contains_whole_word(text: &str, word: &str) -> bool {
    let haystack: Vec<char> = text.chars().collect();
    let needle: Vec<char> = word.chars().collect();
    find_whole_word(&haystack, &needle, 0).is_some()
}

/// Replace every whole-word occurrence of `needle`.
///
/// The first letter of the replacement follows the case of the matched text.
pub fn replace_whole_words(text: &str, needle: &str, replacement: &str) -> String {
    replace_matching(text, needle, replacement, |_, _| true)
}

/// Replace whole-word occurrences of `needle` that are not part of a name.
///
/// A match qualifies when it starts a sentence or starts with a lower-case
/// letter.
pub fn replace_imperative_words(text: &str, needle: &str, replacement: &str) -> String {
    replace_matching(text, needle, replacement, |haystack, start| {
        !haystack[start].is_uppercase() || starts_sentence(haystack, start)
    })
}

/// Whether only whitespace and sentence punctuation precede `start`.
fn starts_sentence(haystack: &[char], start: usize) -> bool {
    haystack[..start]
        .iter()
        .rev()
        .find(|c| !c.is_whitespace())
        .map_or(true, |c| matches!(c, '.' | '!' | '?' | ':' | ';'))
}

fn replace_matching(
    text: &str,
    needle: &str,
    replacement: &str,
    qualifies: impl Fn(&[char], usize) -> bool,
) -> String {
    let haystack: Vec<char> = text.chars().collect();
    let needle: Vec<char> = needle.chars().collect();
    let mut output = String::with_capacity(text.len());
    let mut cursor = 0;

    while let Some(start) = find_whole_word(&haystack, &needle, cursor) {
        if !qualifies(&haystack, start) {
            output.extend(&haystack[cursor..start + needle.len()]);
            cursor = start + needle.len();
            continue;
        }
        output.extend(&haystack[cursor..start]);
        let upper = haystack[start].is_uppercase();
        let mut chars = replacement.chars();
        if let Some(first) = chars.next() {
            if upper {
                output.extend(first.to_uppercase());
            } else {
                output.extend(first.to_lowercase());
            }
            output.extend(chars);
        }
        cursor = start + needle.len();
    }
    output.extend(&haystack[cursor..]);
    output
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
