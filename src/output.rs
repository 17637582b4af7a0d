use crate::models::{
    AnswerLabel, BaselineComparison, ExperimentOutcome, ExperimentReport, ExperimentResults,
    ExperimentType, ResultRow, RowOutcome,
};
use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt::{self, Write as _};
use std::path::Path;

/// Output format options
#[derive(Debug, Clone, Copy, ValueEnum, Serialize, Deserialize)]
pub enum OutputFormat {
    Plain,
    Json,
}

/// Print experiment reports in the specified format
pub fn print_results(reports: &[ExperimentReport], format: OutputFormat, verbose: bool) {
    match format {
        OutputFormat::Plain => match render_plain(reports, verbose) {
            Ok(text) => print!("{}", text),
            Err(e) => eprintln!("Error rendering results: {}", e),
        },
        OutputFormat::Json => print_json(reports),
    }
}

fn print_json(reports: &[ExperimentReport]) {
    match serde_json::to_string_pretty(reports) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Error serializing results to JSON: {}", e),
    }
}

/// Plain-text rendering; raw answers are included in verbose mode
pub fn render_plain(reports: &[ExperimentReport], verbose: bool) -> Result<String, fmt::Error> {
    let mut out = String::new();
    for (i, report) in reports.iter().enumerate() {
        writeln!(out, "=== Experiment {}: {} ===", i + 1, report.title)?;
        writeln!(out)?;

        match &report.outcome {
            ExperimentOutcome::Failed { error } => {
                writeln!(out, "⚠️  ALERT: experiment failed, no results recorded")?;
                writeln!(out, "{}", error)?;
                writeln!(out)?;
            }
            ExperimentOutcome::Completed(results) => render_results(&mut out, results, verbose)?,
        }

        if i + 1 < reports.len() {
            writeln!(out, "{}", "=".repeat(50))?;
            writeln!(out)?;
        }
    }
    Ok(out)
}

fn render_results(out: &mut String, results: &ExperimentResults, verbose: bool) -> fmt::Result {
    writeln!(out, "📊 RESULTS")?;
    writeln!(out, "----------")?;
    match results.experiment_type {
        ExperimentType::AnswerOptions => render_share_table(out, &results.rows)?,
        ExperimentType::Numeric => render_summary_table(out, &results.rows)?,
    }
    writeln!(out)?;

    if results.low_answers_share_warning {
        writeln!(
            out,
            "⚠️  WARNING: fewer than half of the answers were valid for at least one model and scenario"
        )?;
        writeln!(out)?;
    }

    if !results.baseline_comparisons.is_empty() {
        writeln!(out, "👥 COMPARED TO HUMAN SUBJECTS")?;
        writeln!(out, "-----------------------------")?;
        for comparison in &results.baseline_comparisons {
            render_comparison(out, comparison)?;
        }
        writeln!(out)?;
    }

    if verbose {
        writeln!(out, "📝 RAW ANSWERS")?;
        writeln!(out, "--------------")?;
        for (model, by_scenario) in &results.raw_model_answers {
            for (scenario, answers) in by_scenario {
                writeln!(out, "{} / scenario {}: {:?}", model, scenario, answers)?;
            }
        }
        writeln!(out)?;
    }
    Ok(())
}

fn render_share_table(out: &mut String, rows: &[ResultRow]) -> fmt::Result {
    let labels = share_labels(rows);
    write!(out, "{:<20} {:<9} {:<8} {:<8}", "Model", "Scenario", "Temp", "Valid")?;
    for label in &labels {
        write!(out, " {:<8}", label.as_str())?;
    }
    writeln!(out)?;
    writeln!(out, "{}", "-".repeat(48 + 9 * labels.len()))?;

    for row in rows {
        write!(
            out,
            "{:<20} {:<9} {:<8.2} {:<8}",
            row.model,
            row.scenario,
            row.temperature,
            format!("{}/{}", row.correct_answer_count, row.iterations)
        )?;
        for label in &labels {
            write!(out, " {:<8}", format_share(row.share(*label)))?;
        }
        writeln!(out)?;
    }
    Ok(())
}

fn render_summary_table(out: &mut String, rows: &[ResultRow]) -> fmt::Result {
    writeln!(
        out,
        "{:<20} {:<9} {:<8} {:<8} {:<9} {:<9} {:<9} {:<9}",
        "Model", "Scenario", "Temp", "Valid", "Average", "Median", "P25", "P75"
    )?;
    writeln!(out, "{}", "-".repeat(86))?;

    for row in rows {
        let RowOutcome::Summary(summary) = &row.outcome else {
            continue;
        };
        writeln!(
            out,
            "{:<20} {:<9} {:<8.2} {:<8} {:<9} {:<9} {:<9} {:<9}",
            row.model,
            row.scenario,
            row.temperature,
            format!("{}/{}", row.correct_answer_count, row.iterations),
            format_amount(summary.average),
            format_amount(summary.median),
            format_amount(summary.percentile_25),
            format_amount(summary.percentile_75)
        )?;
    }
    Ok(())
}

fn render_comparison(out: &mut String, comparison: &BaselineComparison) -> fmt::Result {
    write!(out, "{} / scenario {}:", comparison.model, comparison.scenario)?;
    for (label, delta) in &comparison.share_deltas {
        write!(out, " {} {:+.3}", label, delta)?;
    }
    if let Some(total) = comparison.total_abs_deviation {
        write!(out, " (total deviation {:.3})", total)?;
    }
    if let Some(delta) = comparison.median_delta {
        write!(out, " median {:+.2}", delta)?;
    }
    writeln!(out)?;
    Ok(())
}

fn format_share(share: Option<f64>) -> String {
    match share {
        Some(value) if value.is_nan() => "NaN".to_string(),
        Some(value) => format!("{:.3}", value),
        None => "-".to_string(),
    }
}

fn format_amount(amount: Option<f64>) -> String {
    amount.map(|value| format!("${:.2}", value)).unwrap_or_else(|| "-".to_string())
}

/// Every outcome slot used by any row, in label order
fn share_labels(rows: &[ResultRow]) -> Vec<AnswerLabel> {
    let labels: BTreeSet<AnswerLabel> = rows
        .iter()
        .filter_map(|row| match &row.outcome {
            RowOutcome::Shares(shares) => Some(shares.keys().copied()),
            RowOutcome::Summary(_) => None,
        })
        .flatten()
        .collect();
    labels.into_iter().collect()
}

/// Export the result rows as CSV, creating parent directories as needed
pub fn write_csv(path: &Path, results: &ExperimentResults) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create CSV file: {}", path.display()))?;

    let mut header: Vec<String> = ["model", "scenario", "temperature", "iterations", "correct_answer_count"]
        .iter()
        .map(|h| h.to_string())
        .collect();
    let labels = share_labels(&results.rows);
    match results.experiment_type {
        ExperimentType::AnswerOptions => {
            header.extend(labels.iter().map(|label| format!("share_{}", label)));
        }
        ExperimentType::Numeric => {
            header.extend(
                ["average", "median", "percentile_25", "percentile_75"]
                    .iter()
                    .map(|h| h.to_string()),
            );
        }
    }
    writer.write_record(&header)?;

    for row in &results.rows {
        let mut record = vec![
            row.model.to_string(),
            row.scenario.to_string(),
            row.temperature.to_string(),
            row.iterations.to_string(),
            row.correct_answer_count.to_string(),
        ];
        match &row.outcome {
            RowOutcome::Shares(_) => {
                record.extend(labels.iter().map(|label| csv_value(row.share(*label))));
            }
            RowOutcome::Summary(summary) => {
                record.extend(
                    [
                        summary.average,
                        summary.median,
                        summary.percentile_25,
                        summary.percentile_75,
                    ]
                    .into_iter()
                    .map(csv_value),
                );
            }
        }
        writer.write_record(&record)?;
    }

    writer
        .flush()
        .with_context(|| format!("Failed to write results to: {}", path.display()))?;
    Ok(())
}

/// NaN stays "NaN"; missing values are empty cells
fn csv_value(value: Option<f64>) -> String {
    match value {
        Some(v) if v.is_nan() => "NaN".to_string(),
        Some(v) => v.to_string(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Baseline, ModelId, NumericSummary};
    use std::collections::BTreeMap;
    use tempfile::tempdir;

    fn share_row(model: ModelId, scenario: usize, shares: &[(AnswerLabel, f64)], correct: usize) -> ResultRow {
        ResultRow {
            model,
            scenario,
            temperature: 1.0,
            iterations: 10,
            correct_answer_count: correct,
            outcome: RowOutcome::Shares(shares.iter().copied().collect()),
        }
    }

    fn create_test_results() -> ExperimentResults {
        let rows = vec![
            share_row(
                ModelId::Gpt35Turbo,
                1,
                &[(AnswerLabel::A, 0.75), (AnswerLabel::B, 0.25), (AnswerLabel::C, 0.0)],
                8,
            ),
            share_row(
                ModelId::Llama2Chat70b,
                1,
                &[
                    (AnswerLabel::A, f64::NAN),
                    (AnswerLabel::B, f64::NAN),
                    (AnswerLabel::C, f64::NAN),
                ],
                0,
            ),
        ];

        let mut raw = BTreeMap::new();
        raw.insert(
            ModelId::Gpt35Turbo,
            BTreeMap::from([(1, vec!["A".to_string(), "Z".to_string()])]),
        );

        let baseline = Baseline::Shares(BTreeMap::from([
            (AnswerLabel::A, 0.16),
            (AnswerLabel::B, 0.0),
            (AnswerLabel::C, 0.84),
        ]));
        let baseline_comparisons = rows
            .iter()
            .filter_map(|row| crate::aggregator::compare_to_baseline(row, &baseline))
            .collect();

        ExperimentResults {
            experiment_type: ExperimentType::AnswerOptions,
            low_answers_share_warning: true,
            rows,
            raw_model_answers: raw,
            baseline_comparisons,
        }
    }

    fn create_numeric_results() -> ExperimentResults {
        ExperimentResults {
            experiment_type: ExperimentType::Numeric,
            rows: vec![ResultRow {
                model: ModelId::Gpt4Turbo,
                scenario: 1,
                temperature: 0.5,
                iterations: 4,
                correct_answer_count: 1,
                outcome: RowOutcome::Summary(NumericSummary {
                    average: Some(3.0),
                    median: Some(3.0),
                    percentile_25: None,
                    percentile_75: None,
                }),
            }],
            low_answers_share_warning: true,
            raw_model_answers: BTreeMap::new(),
            baseline_comparisons: vec![],
        }
    }

    fn reports() -> Vec<ExperimentReport> {
        vec![
            ExperimentReport {
                title: "Decoy".to_string(),
                outcome: ExperimentOutcome::Completed(create_test_results()),
            },
            ExperimentReport {
                title: "Broken".to_string(),
                outcome: ExperimentOutcome::Failed {
                    error: "Provider call for gpt-4-1106-preview failed".to_string(),
                },
            },
        ]
    }

    #[test]
    fn test_plain_output_shows_rows_and_warning() {
        let text = render_plain(&reports(), false).unwrap();
        assert!(text.contains("=== Experiment 1: Decoy ==="));
        assert!(text.contains("gpt-3.5-turbo"));
        assert!(text.contains("0.750"));
        assert!(text.contains("NaN"));
        assert!(text.contains("8/10"));
        assert!(text.contains("WARNING"));
        assert!(text.contains("COMPARED TO HUMAN SUBJECTS"));
        assert!(!text.contains("RAW ANSWERS"));
    }

    #[test]
    fn test_plain_output_alerts_on_failure() {
        let text = render_plain(&reports(), false).unwrap();
        let failed = text.split("=== Experiment 2: Broken ===").nth(1).unwrap();
        assert!(failed.contains("ALERT"));
        assert!(failed.contains("gpt-4-1106-preview"));
        assert!(!failed.contains("RESULTS"));
    }

    #[test]
    fn test_plain_output_verbose_shows_raw_answers() {
        let text = render_plain(&reports(), true).unwrap();
        assert!(text.contains("RAW ANSWERS"));
        assert!(text.contains(r#"gpt-3.5-turbo / scenario 1: ["A", "Z"]"#));
    }

    #[test]
    fn test_plain_output_numeric() {
        let report = ExperimentReport {
            title: "Beer".to_string(),
            outcome: ExperimentOutcome::Completed(create_numeric_results()),
        };
        let text = render_plain(&[report], false).unwrap();
        assert!(text.contains("Median"));
        assert!(text.contains("$3.00"));
    }

    #[test]
    fn test_json_report_shape() {
        let json = serde_json::to_value(reports()).unwrap();
        assert_eq!(json[0]["outcome"]["status"], "completed");
        assert_eq!(json[0]["outcome"]["low_answers_share_warning"], true);
        assert_eq!(json[0]["outcome"]["rows"][0]["model"], "gpt-3.5-turbo");
        assert_eq!(json[1]["outcome"]["status"], "failed");
    }

    #[test]
    fn test_print_results_formats() {
        print_results(&reports(), OutputFormat::Plain, true);
        print_results(&reports(), OutputFormat::Json, false);
    }

    #[test]
    fn test_write_csv_answer_options() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("nested").join("decoy.csv");
        write_csv(&path, &create_test_results()).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(
            lines[0],
            "model,scenario,temperature,iterations,correct_answer_count,share_A,share_B,share_C"
        );
        assert_eq!(lines[1], "gpt-3.5-turbo,1,1,10,8,0.75,0.25,0");
        assert_eq!(lines[2], "llama-2-70b,1,1,10,0,NaN,NaN,NaN");
    }

    #[test]
    fn test_write_csv_numeric() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("beer.csv");
        write_csv(&path, &create_numeric_results()).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(
            lines[0],
            "model,scenario,temperature,iterations,correct_answer_count,average,median,percentile_25,percentile_75"
        );
        assert_eq!(lines[1], "gpt-4-1106-preview,1,0.5,4,1,3,3,,");
    }

    #[test]
    fn test_write_csv_to_invalid_path() {
        let result = write_csv(Path::new("/dev/null/results.csv"), &create_numeric_results());
        assert!(result.is_err());
    }
}
