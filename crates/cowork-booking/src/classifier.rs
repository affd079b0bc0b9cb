// SPDX-FileCopyrightText: 2026 Cowork Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Yes/no classification of free-text confirmation replies.
//!
//! Rules are an ordered list of `(pattern, verdict)` pairs; the first rule
//! whose pattern matches the *whole* normalized message wins. Anchoring on
//! the whole message keeps "no" inside "no sé" from reading as a refusal.

use std::sync::LazyLock;

use cowork_core::CoworkError;
use regex::Regex;
use serde::Serialize;
use strum::Display;
use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

/// How a reply reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Positive,
    Negative,
    Ambiguous,
}

/// One classification rule.
#[derive(Debug, Clone)]
pub struct ClassifierRule {
    pattern: Regex,
    verdict: Verdict,
}

impl ClassifierRule {
    /// Compiles `pattern` anchored to the whole normalized message.
    pub fn new(pattern: &str, verdict: Verdict) -> Result<Self, CoworkError> {
        let anchored = format!("^(?:{pattern})$");
        let pattern = Regex::new(&anchored)
            .map_err(|e| CoworkError::Validation(format!("invalid classifier pattern: {e}")))?;
        Ok(Self { pattern, verdict })
    }

    pub fn verdict(&self) -> Verdict {
        self.verdict
    }

    pub fn is_match(&self, normalized: &str) -> bool {
        self.pattern.is_match(normalized)
    }
}

const POSITIVE_WORDS: &str = "si+|sip|yes|yep|yeah|ok|okay|okey|oki|dale|vale|va|listo|perfecto|\
    claro|confirmo|confirmado|confirmar|de acuerdo|correcto|afirmativo|por supuesto|adelante|sure";
const POSITIVE_TAIL: &str = "si|dale|claro|confirmo|perfecto|listo|gracias|por favor|de acuerdo";
const POSITIVE_EMOJI: &str = "👍|✅|✔|☑|👌|🙌|👏";
const NEGATIVE_WORDS: &str = "no+|nop|nope|nah|cancelar|cancela|cancelalo|cancelo|mejor no|\
    no gracias|para nada|negativo|no quiero|no confirmo|no por ahora|dejalo|olvidalo";
const NEGATIVE_EMOJI: &str = "👎|❌|✖|🚫|⛔";

static DEFAULT_RULES: LazyLock<Vec<ClassifierRule>> = LazyLock::new(|| {
    let negative = format!("(?:{NEGATIVE_WORDS})(?:[ ,]+(?:gracias|por favor|{NEGATIVE_EMOJI}))*");
    let negative_emoji = format!("(?:{NEGATIVE_EMOJI})(?: ?(?:{NEGATIVE_EMOJI}))*");
    let positive = format!("(?:{POSITIVE_WORDS})(?:[ ,]*(?:{POSITIVE_TAIL}|{POSITIVE_EMOJI}))*");
    let positive_emoji = format!("(?:{POSITIVE_EMOJI})(?: ?(?:{POSITIVE_EMOJI}))*");
    vec![
        ClassifierRule::new(&negative, Verdict::Negative).unwrap(),
        ClassifierRule::new(&negative_emoji, Verdict::Negative).unwrap(),
        ClassifierRule::new(&positive, Verdict::Positive).unwrap(),
        ClassifierRule::new(&positive_emoji, Verdict::Positive).unwrap(),
    ]
});

/// Lowercases, folds accents, collapses whitespace, drops emoji variation
/// selectors and skin tones, and strips surrounding punctuation.
pub fn normalize(message: &str) -> String {
    let folded: String = message
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .filter(|c| !is_emoji_modifier(*c))
        .flat_map(char::to_lowercase)
        .collect();
    let collapsed = folded.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed
        .trim_matches(|c: char| matches!(c, '.' | '!' | '?' | '¡' | '¿' | ',' | ';' | ':' | '…'))
        .trim()
        .to_string()
}

fn is_emoji_modifier(c: char) -> bool {
    matches!(c, '\u{FE0E}' | '\u{FE0F}' | '\u{200D}' | '\u{1F3FB}'..='\u{1F3FF}')
}

/// Ordered, extensible rule list.
#[derive(Debug, Clone)]
pub struct ConfirmationClassifier {
    rules: Vec<ClassifierRule>,
}

impl Default for ConfirmationClassifier {
    fn default() -> Self {
        Self {
            rules: DEFAULT_RULES.clone(),
        }
    }
}

impl ConfirmationClassifier {
    /// A classifier with no rules; everything is ambiguous.
    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    /// Appends a rule, consulted after the existing ones.
    pub fn with_rule(mut self, pattern: &str, verdict: Verdict) -> Result<Self, CoworkError> {
        self.rules.push(ClassifierRule::new(pattern, verdict)?);
        Ok(self)
    }

    /// Inserts a rule ahead of the existing ones.
    pub fn prepend_rule(mut self, pattern: &str, verdict: Verdict) -> Result<Self, CoworkError> {
        self.rules.insert(0, ClassifierRule::new(pattern, verdict)?);
        Ok(self)
    }

    pub fn rules(&self) -> &[ClassifierRule] {
        &self.rules
    }

    pub fn classify(&self, message: &str) -> Verdict {
        let normalized = normalize(message);
        if normalized.is_empty() {
            return Verdict::Ambiguous;
        }
        self.rules
            .iter()
            .find(|rule| rule.is_match(&normalized))
            .map_or(Verdict::Ambiguous, ClassifierRule::verdict)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_table() {
        let classifier = ConfirmationClassifier::default();
        let cases = [
            ("si", Verdict::Positive),
            ("SI", Verdict::Positive),
            ("sí", Verdict::Positive),
            ("Sí!", Verdict::Positive),
            ("  ok  ", Verdict::Positive),
            ("dale", Verdict::Positive),
            ("Confirmo.", Verdict::Positive),
            ("si, claro", Verdict::Positive),
            ("de acuerdo", Verdict::Positive),
            ("👍", Verdict::Positive),
            ("👍🏽", Verdict::Positive),
            ("✔️", Verdict::Positive),
            ("si 👍", Verdict::Positive),
            ("no", Verdict::Negative),
            ("NO!", Verdict::Negative),
            ("cancelar", Verdict::Negative),
            ("mejor no", Verdict::Negative),
            ("no, gracias", Verdict::Negative),
            ("👎", Verdict::Negative),
            ("❌", Verdict::Negative),
            ("tal vez", Verdict::Ambiguous),
            ("no sé", Verdict::Ambiguous),
            ("si pero a las 5", Verdict::Ambiguous),
            ("", Verdict::Ambiguous),
            ("?!", Verdict::Ambiguous),
        ];
        for (message, expected) in cases {
            assert_eq!(classifier.classify(message), expected, "{message:?}");
        }
    }

    #[test]
    fn normalization() {
        assert_eq!(normalize("  ¡Sí,   CLARO!  "), "si, claro");
        assert_eq!(normalize("Olvídalo"), "olvidalo");
        assert_eq!(normalize("✔️"), "✔");
    }

    #[test]
    fn rules_extend_without_touching_defaults() {
        let classifier = ConfirmationClassifier::default()
            .with_rule("obvio", Verdict::Positive)
            .unwrap()
            .prepend_rule("dale", Verdict::Ambiguous)
            .unwrap();
        assert_eq!(classifier.classify("Obvio"), Verdict::Positive);
        assert_eq!(classifier.classify("dale"), Verdict::Ambiguous);
        assert_eq!(classifier.classify("si"), Verdict::Positive);
    }

    #[test]
    fn empty_classifier_is_always_ambiguous() {
        assert_eq!(ConfirmationClassifier::empty().classify("si"), Verdict::Ambiguous);
    }

    #[test]
    fn bad_patterns_are_rejected() {
        assert!(ConfirmationClassifier::empty().with_rule("(", Verdict::Positive).is_err());
    }
}
