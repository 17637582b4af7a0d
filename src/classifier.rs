//! Interpretation of free-text model answers.

use crate::models::{AnswerLabel, ClassifiedAnswer, DecoyVariant};
use crate::prompt::AnswerLabelMapping;
use std::collections::BTreeMap;

/// Which labels a prompt offers and which outcome slot each one counts toward
#[derive(Debug, Clone, PartialEq)]
pub struct LabelPolicy {
    presented: Vec<AnswerLabel>,
    outcome_slots: Vec<AnswerLabel>,
    remap: BTreeMap<AnswerLabel, AnswerLabel>,
}

struct DecoyRule {
    variant: DecoyVariant,
    /// Options shown to the model, `None` for "as many as configured"
    presented: Option<usize>,
    /// Slots results are reported in
    outcome_slots: Option<usize>,
    remap: &'static [(AnswerLabel, AnswerLabel)],
}

const DECOY_RULES: &[DecoyRule] = &[
    DecoyRule {
        variant: DecoyVariant::Standard,
        presented: None,
        outcome_slots: None,
        remap: &[],
    },
    DecoyRule {
        variant: DecoyVariant::OptionRemoved,
        presented: Some(2),
        outcome_slots: Some(3),
        remap: &[(AnswerLabel::B, AnswerLabel::C)],
    },
    DecoyRule {
        variant: DecoyVariant::Renamed,
        presented: Some(3),
        outcome_slots: Some(3),
        remap: &[],
    },
    DecoyRule {
        variant: DecoyVariant::RenamedAndRemoved,
        presented: Some(2),
        outcome_slots: Some(3),
        remap: &[(AnswerLabel::B, AnswerLabel::C)],
    },
];

impl LabelPolicy {
    /// Every presented label counts toward itself
    pub fn identity(num_options: usize) -> Self {
        let labels = AnswerLabel::first(num_options).to_vec();
        Self {
            remap: labels.iter().map(|label| (*label, *label)).collect(),
            outcome_slots: labels.clone(),
            presented: labels,
        }
    }

    /// Policy for a decoy-effect presentation
    pub fn for_decoy(variant: DecoyVariant, num_options: usize) -> Self {
        let rule = DECOY_RULES
            .iter()
            .find(|rule| rule.variant == variant)
            .unwrap_or(&DECOY_RULES[0]);

        let presented = AnswerLabel::first(rule.presented.unwrap_or(num_options)).to_vec();
        let outcome_slots = AnswerLabel::first(rule.outcome_slots.unwrap_or(num_options)).to_vec();
        let mut remap: BTreeMap<AnswerLabel, AnswerLabel> =
            presented.iter().map(|label| (*label, *label)).collect();
        for (from, to) in rule.remap {
            remap.insert(*from, *to);
        }

        Self {
            presented,
            outcome_slots,
            remap,
        }
    }

    /// Policy for a shuffled presentation, counted in the original order
    pub fn for_shuffle(variant: &AnswerLabelMapping, original: &AnswerLabelMapping) -> Self {
        Self {
            remap: variant.relabel_into(original),
            ..Self::identity(original.len())
        }
    }

    /// Number of options shown to the model
    pub fn presented_count(&self) -> usize {
        self.presented.len()
    }

    pub fn outcome_slots(&self) -> &[AnswerLabel] {
        &self.outcome_slots
    }
}

/// Classify a multiple-choice answer
///
/// Valid only when the trimmed answer is exactly one of the presented labels.
pub fn classify_label(raw: &str, policy: &LabelPolicy) -> ClassifiedAnswer {
    let answer = raw.trim();
    match AnswerLabel::parse(answer) {
        Some(label) if policy.presented.contains(&label) => match policy.remap.get(&label) {
            Some(slot) => ClassifiedAnswer::Label(*slot),
            None => ClassifiedAnswer::Invalid,
        },
        _ => ClassifiedAnswer::Invalid,
    }
}

/// Classify a dollar-amount answer such as `$1,250.50`
pub fn classify_amount(raw: &str) -> ClassifiedAnswer {
    let answer = raw.trim();
    let Some(amount) = answer.strip_prefix('$') else {
        return ClassifiedAnswer::Invalid;
    };

    let digits: String = amount.chars().filter(|c| *c != ',').collect();
    let has_digit = digits.chars().any(|c| c.is_ascii_digit());
    let only_number_chars = digits.chars().all(|c| c.is_ascii_digit() || c == '.');
    let points = digits.chars().filter(|c| *c == '.').count();

    if !has_digit || !only_number_chars || points > 1 {
        return ClassifiedAnswer::Invalid;
    }

    match digits.parse::<f64>() {
        Ok(value) => ClassifiedAnswer::Amount(value),
        Err(_) => ClassifiedAnswer::Invalid,
    }
}
