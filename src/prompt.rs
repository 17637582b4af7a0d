//! Prompt assembly and answer-order shuffling.
//!
//! A multiple-choice prompt is the scenario text followed by one
//! `{label}: {answer}` line per option. In shuffle mode the same scenario
//! is presented several times with the options in different orders, and
//! each presentation remembers which label every answer text received.

use crate::error::ExperimentError;
use crate::models::AnswerLabel;
use rand::Rng;
use rand::seq::SliceRandom;
use std::collections::BTreeMap;

/// Most options a prompt can carry (labels A to F)
pub const MAX_OPTIONS: usize = 6;

/// Draws allowed per variant before giving up on finding a new order
pub const MAX_SHUFFLE_ATTEMPTS: usize = 100;

/// Build a multiple-choice prompt from a scenario template and its options
pub fn build_prompt(template: &str, answers: &[String]) -> String {
    let mut prompt = template.to_string();
    for (label, answer) in AnswerLabel::first(MAX_OPTIONS).iter().zip(answers) {
        prompt.push('\n');
        prompt.push_str(&format!("{}: {}", label, answer));
    }
    prompt
}

/// Number of presentations generated for one scenario in shuffle mode
pub fn variant_count(num_options: usize) -> usize {
    if num_options == 2 { 2 } else { 3 }
}

/// Bijection between answer texts and the labels they were shown under
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerLabelMapping {
    by_text: BTreeMap<String, AnswerLabel>,
}

impl AnswerLabelMapping {
    /// Assign labels to answers in list order
    pub fn from_order(answers: &[String]) -> Result<Self, ExperimentError> {
        if answers.len() > MAX_OPTIONS {
            return Err(ExperimentError::config(format!(
                "at most {} answer options are supported, got {}",
                MAX_OPTIONS,
                answers.len()
            )));
        }

        let mut by_text = BTreeMap::new();
        for (label, answer) in AnswerLabel::first(answers.len()).iter().zip(answers) {
            if by_text.insert(answer.clone(), *label).is_some() {
                return Err(ExperimentError::DegenerateShuffle(format!(
                    "answer option {:?} appears more than once",
                    answer
                )));
            }
        }

        Ok(Self { by_text })
    }

    pub fn label_for(&self, answer: &str) -> Option<AnswerLabel> {
        self.by_text.get(answer).copied()
    }

    pub fn len(&self) -> usize {
        self.by_text.len()
    }

    /// Translate labels of this presentation into labels of `original`
    ///
    /// The result maps each label shown here to the label the same answer
    /// text carries in the original ordering.
    pub fn relabel_into(&self, original: &AnswerLabelMapping) -> BTreeMap<AnswerLabel, AnswerLabel> {
        self.by_text
            .iter()
            .filter_map(|(answer, label)| original.label_for(answer).map(|canonical| (*label, canonical)))
            .collect()
    }
}

/// One presentation of a shuffled scenario
#[derive(Debug, Clone)]
pub struct ShuffleVariant {
    pub answers: Vec<String>,
    pub mapping: AnswerLabelMapping,
}

/// Generate the shuffle presentations for one scenario
///
/// The first variant keeps the supplied order. Every later variant is a
/// random permutation that differs from the one before it.
pub fn shuffle_variants<R: Rng + ?Sized>(
    answers: &[String],
    rng: &mut R,
) -> Result<Vec<ShuffleVariant>, ExperimentError> {
    let first = ShuffleVariant {
        answers: answers.to_vec(),
        mapping: AnswerLabelMapping::from_order(answers)?,
    };
    let count = variant_count(answers.len());
    let mut variants = Vec::with_capacity(count);
    variants.push(first);

    while variants.len() < count {
        let previous = &variants[variants.len() - 1].answers;
        let permutation = draw_distinct_permutation(previous, rng)?;
        let mapping = AnswerLabelMapping::from_order(&permutation)?;
        variants.push(ShuffleVariant {
            answers: permutation,
            mapping,
        });
    }

    Ok(variants)
}

fn draw_distinct_permutation<R: Rng + ?Sized>(
    previous: &[String],
    rng: &mut R,
) -> Result<Vec<String>, ExperimentError> {
    let mut candidate = previous.to_vec();
    for _ in 0..MAX_SHUFFLE_ATTEMPTS {
        candidate.shuffle(rng);
        if candidate != previous {
            return Ok(candidate);
        }
    }

    Err(ExperimentError::DegenerateShuffle(format!(
        "no new answer order found after {} attempts",
        MAX_SHUFFLE_ATTEMPTS
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::collections::BTreeSet;

    fn texts(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_build_prompt_layout() {
        let prompt = build_prompt(
            "Which do you choose?",
            &texts(&["Win $50", "Win $100", "Lose $50"]),
        );
        assert_eq!(
            prompt,
            "Which do you choose?\nA: Win $50\nB: Win $100\nC: Lose $50"
        );
    }

    #[test]
    fn test_build_prompt_has_one_line_per_option() {
        for k in 1..=MAX_OPTIONS {
            let answers: Vec<String> = (0..k).map(|i| format!("option {}", i)).collect();
            let prompt = build_prompt("Scenario", &answers);
            let option_lines: Vec<&str> = prompt.lines().skip(1).collect();
            assert_eq!(option_lines.len(), k);
            for (i, line) in option_lines.iter().enumerate() {
                assert_eq!(*line, format!("{}: option {}", AnswerLabel::ALL[i], i));
            }
        }
    }

    #[test]
    fn test_variant_count() {
        assert_eq!(variant_count(2), 2);
        assert_eq!(variant_count(3), 3);
        assert_eq!(variant_count(6), 3);
    }

    #[test]
    fn test_two_options_give_two_distinct_variants() {
        let mut rng = StdRng::seed_from_u64(7);
        let variants = shuffle_variants(&texts(&["X", "Y"]), &mut rng).unwrap();
        assert_eq!(variants.len(), 2);
        assert_eq!(variants[0].answers, texts(&["X", "Y"]));
        assert_eq!(variants[1].answers, texts(&["Y", "X"]));
    }

    #[test]
    fn test_consecutive_variants_differ_and_mappings_are_bijective() {
        let answers = texts(&["Win $50", "Win $100", "Lose $50", "Nothing"]);
        for seed in 0..50 {
            let mut rng = StdRng::seed_from_u64(seed);
            let variants = shuffle_variants(&answers, &mut rng).unwrap();
            assert_eq!(variants.len(), 3);

            for pair in variants.windows(2) {
                assert_ne!(pair[0].answers, pair[1].answers);
            }

            for variant in &variants {
                let labels: BTreeSet<AnswerLabel> = answers
                    .iter()
                    .map(|answer| variant.mapping.label_for(answer).unwrap())
                    .collect();
                assert_eq!(labels.len(), answers.len());
                assert_eq!(
                    labels.into_iter().collect::<Vec<_>>(),
                    AnswerLabel::first(answers.len())
                );
            }
        }
    }

    #[test]
    fn test_relabel_into_original_order() {
        let original = AnswerLabelMapping::from_order(&texts(&["X", "Y", "Z"])).unwrap();
        let shuffled = AnswerLabelMapping::from_order(&texts(&["Z", "X", "Y"])).unwrap();
        let relabel = shuffled.relabel_into(&original);
        assert_eq!(relabel[&AnswerLabel::A], AnswerLabel::C);
        assert_eq!(relabel[&AnswerLabel::B], AnswerLabel::A);
        assert_eq!(relabel[&AnswerLabel::C], AnswerLabel::B);
    }

    #[test]
    fn test_identical_answers_are_degenerate() {
        let mut rng = StdRng::seed_from_u64(1);
        let result = shuffle_variants(&texts(&["same", "same"]), &mut rng);
        assert!(matches!(result, Err(ExperimentError::DegenerateShuffle(_))));
    }

    #[test]
    fn test_draw_gives_up_when_no_new_order_exists() {
        let mut rng = StdRng::seed_from_u64(1);
        let result = draw_distinct_permutation(&texts(&["same", "same", "same"]), &mut rng);
        assert!(matches!(result, Err(ExperimentError::DegenerateShuffle(_))));
    }

    #[test]
    fn test_too_many_options_rejected() {
        let answers: Vec<String> = (0..7).map(|i| i.to_string()).collect();
        assert!(AnswerLabelMapping::from_order(&answers).is_err());
    }
}
