//! Instruction quality classification.
//!
//! Decides whether a locally generated instruction list is worth showing or
//! so generic that an external upgrade should be attempted. The keyword and
//! template sets live in [`KeywordQuality`] so another locale can supply its
//! own without touching the orchestrator.
//!
//! German rules ([`KeywordQuality::german`]):
//!
//! - navigational vocabulary, matched as whole words, case-insensitive:
//!   `links`, `rechts`, `abbiegen`, `geradeaus`, `wenden`, `halten`,
//!   plus any word ending in a street noun
//!   (`straße`, `strasse`, `str.`, `weg`, `allee`, `platz`, `pfad`, `gasse`, `damm`, `ring`)
//! - template: `<verb> <number>[ ]<unit> <destination>` where verb is one of
//!   `gehen sie`, `radeln sie`, `fahren sie`, `walk`, `cycle`, `drive`,
//!   unit one of `m`, `meter`, `km`, `kilometer`, and destination one of
//!   `zum ziel`, `to destination`, `to the destination`
//!
//! A list is generic when it is empty, or when it is exactly one instruction
//! that matches the template and carries no vocabulary. Anything else is
//! informative.

use serde::{Deserialize, Serialize};

use crate::instructions::Instruction;
use crate::locale::contains_whole_word;

/// Outcome of a quality assessment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityVerdict {
    Informative,
    Generic,
}

/// Scores an instruction list.
pub trait InstructionQuality: Send + Sync {
    fn assess(&self, instructions: &[Instruction]) -> QualityVerdict;

    fn is_generic(&self, instructions: &[Instruction]) -> bool {
        self.assess(instructions) == QualityVerdict::Generic
    }
}

/// Keyword and template based classifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordQuality {
    pub vocabulary: Vec<String>,
    pub street_suffixes: Vec<String>,
    pub template_verbs: Vec<String>,
    pub template_units: Vec<String>,
    pub template_destinations: Vec<String>,
}

impl Default for KeywordQuality {
    fn default() -> Self {
        Self::german()
    }
}

fn owned(words: &[&str]) -> Vec<String> {
    words.iter().map(|word| word.to_string()).collect()
}

impl KeywordQuality {
    pub fn german() -> Self {
        Self {
            vocabulary: owned(&["links", "rechts", "abbiegen", "geradeaus", "wenden", "halten"]),
            street_suffixes: owned(&[
                "straße", "strasse", "str.", "weg", "allee", "platz", "pfad", "gasse", "damm",
                "ring",
            ]),
            template_verbs: owned(&["gehen sie", "radeln sie", "fahren sie", "walk", "cycle", "drive"]),
            template_units: owned(&["m", "meter", "km", "kilometer"]),
            template_destinations: owned(&["zum ziel", "to destination", "to the destination"]),
        }
    }

    /// Whether `text` contains navigational vocabulary.
    pub fn has_vocabulary(&self, text: &str) -> bool {
        if self
            .vocabulary
            .iter()
            .any(|word| contains_whole_word(text, word))
        {
            return true;
        }
        text.split_whitespace().any(|token| {
            let token = token
                .trim_matches(|c: char| !c.is_alphanumeric() && c != '.')
                .to_lowercase();
            let bare = token.trim_end_matches('.');
            self.street_suffixes.iter().any(|suffix| {
                let suffix = suffix.as_str();
                (token.len() > suffix.len() && token.ends_with(suffix))
                    || (bare.len() > suffix.len() && bare.ends_with(suffix))
            })
        })
    }

    /// Whether `text` is the templated "move N m to destination" sentence.
    pub fn matches_template(&self, text: &str) -> bool {
        let normalized = text
            .trim()
            .trim_end_matches(['.', '!'])
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase();

        let Some(rest) = self
            .template_verbs
            .iter()
            .find_map(|verb| normalized.strip_prefix(verb.as_str()))
        else {
            return false;
        };
        let rest = rest.trim_start();

        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == ','))
            .unwrap_or(rest.len());
        if number_len == 0 {
            return false;
        }
        let rest = rest[number_len..].trim_start();

        let Some((unit, destination)) = rest.split_once(' ') else {
            return false;
        };
        self.template_units.iter().any(|u| u == unit)
            && self
                .template_destinations
                .iter()
                .any(|d| d == destination.trim())
    }
}

impl InstructionQuality for KeywordQuality {
    fn assess(&self, instructions: &[Instruction]) -> QualityVerdict {
        match instructions {
            [] => QualityVerdict::Generic,
            [only] if !self.has_vocabulary(&only.text) && self.matches_template(&only.text) => {
                QualityVerdict::Generic
            }
            _ => QualityVerdict::Informative,
        }
    }
}
