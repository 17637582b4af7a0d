use crate::models::{
    AnswerLabel, Baseline, BaselineComparison, ClassifiedAnswer, ExperimentType, ModelId,
    NumericSummary, ResultRow, RowOutcome,
};
use std::collections::BTreeMap;

/// Rows whose valid-answer ratio falls below this raise the run warning
pub const LOW_ANSWER_SHARE_THRESHOLD: f64 = 0.5;

/// Folds classified answers into result rows
pub struct ResultAggregator {
    experiment_type: ExperimentType,
    temperature: f64,
    iterations: usize,
}

impl ResultAggregator {
    pub fn new(experiment_type: ExperimentType, temperature: f64, iterations: usize) -> Self {
        Self {
            experiment_type,
            temperature,
            iterations,
        }
    }

    /// Build the row of one (model, scenario) pair
    pub fn aggregate(
        &self,
        model: ModelId,
        scenario: usize,
        answers: &[ClassifiedAnswer],
        outcome_slots: &[AnswerLabel],
    ) -> ResultRow {
        let correct_answer_count = answers.iter().filter(|a| a.is_valid()).count();
        let outcome = match self.experiment_type {
            ExperimentType::AnswerOptions => {
                RowOutcome::Shares(self.calculate_shares(answers, outcome_slots))
            }
            ExperimentType::Numeric => RowOutcome::Summary(self.summarize_amounts(answers)),
        };

        ResultRow {
            model,
            scenario,
            temperature: self.temperature,
            iterations: self.iterations,
            correct_answer_count,
            outcome,
        }
    }

    /// Share of each slot among the valid answers, NaN for all slots when none are valid
    fn calculate_shares(
        &self,
        answers: &[ClassifiedAnswer],
        outcome_slots: &[AnswerLabel],
    ) -> BTreeMap<AnswerLabel, f64> {
        let mut counts: BTreeMap<AnswerLabel, usize> =
            outcome_slots.iter().map(|slot| (*slot, 0)).collect();
        for answer in answers {
            if let ClassifiedAnswer::Label(label) = answer {
                if let Some(count) = counts.get_mut(label) {
                    *count += 1;
                }
            }
        }

        let total: usize = counts.values().sum();
        counts
            .into_iter()
            .map(|(slot, count)| {
                let share = if total > 0 {
                    count as f64 / total as f64
                } else {
                    f64::NAN
                };
                (slot, share)
            })
            .collect()
    }

    fn summarize_amounts(&self, answers: &[ClassifiedAnswer]) -> NumericSummary {
        let mut amounts: Vec<f64> = answers
            .iter()
            .filter_map(|answer| match answer {
                ClassifiedAnswer::Amount(value) => Some(*value),
                _ => None,
            })
            .collect();

        if amounts.is_empty() {
            return NumericSummary::default();
        }

        amounts.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        let (percentile_25, percentile_75) = if amounts.len() >= 2 {
            (
                Some(calculate_percentile(&amounts, 0.25)),
                Some(calculate_percentile(&amounts, 0.75)),
            )
        } else {
            (None, None)
        };

        NumericSummary {
            average: Some(calculate_mean(&amounts)),
            median: Some(calculate_median(&amounts)),
            percentile_25,
            percentile_75,
        }
    }
}

/// Calculate mean of values
fn calculate_mean(values: &[f64]) -> f64 {
    let sum: f64 = values.iter().sum();
    sum / values.len() as f64
}

/// Calculate median of already sorted values
fn calculate_median(sorted: &[f64]) -> f64 {
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Percentile of sorted values with linear interpolation between ranks
fn calculate_percentile(sorted: &[f64], q: f64) -> f64 {
    let position = q * (sorted.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    let fraction = position - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * fraction
}

/// True when any row has fewer than half of its iterations answered validly
pub fn low_answer_share(rows: &[ResultRow]) -> bool {
    rows.iter()
        .any(|row| row.iterations > 0 && row.valid_ratio() < LOW_ANSWER_SHARE_THRESHOLD)
}

/// Compare a row against human data, if the row kind matches the baseline kind
pub fn compare_to_baseline(row: &ResultRow, baseline: &Baseline) -> Option<BaselineComparison> {
    match (&row.outcome, baseline) {
        (RowOutcome::Shares(shares), Baseline::Shares(human)) => {
            let share_deltas: BTreeMap<AnswerLabel, f64> = shares
                .iter()
                .map(|(slot, share)| {
                    let human_share = human.get(slot).copied().unwrap_or(0.0);
                    (*slot, share - human_share)
                })
                .collect();
            let total_abs_deviation = if row.correct_answer_count > 0 {
                Some(share_deltas.values().map(|delta| delta.abs()).sum())
            } else {
                None
            };

            Some(BaselineComparison {
                model: row.model,
                scenario: row.scenario,
                share_deltas,
                total_abs_deviation,
                median_delta: None,
            })
        }
        (RowOutcome::Summary(summary), Baseline::Median(human_median)) => Some(BaselineComparison {
            model: row.model,
            scenario: row.scenario,
            share_deltas: BTreeMap::new(),
            total_abs_deviation: None,
            median_delta: summary.median.map(|median| median - human_median),
        }),
        _ => None,
    }
}
