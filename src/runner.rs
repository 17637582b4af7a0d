use crate::aggregator::{ResultAggregator, compare_to_baseline, low_answer_share};
use crate::catalog::Catalog;
use crate::classifier::{classify_amount, classify_label};
use crate::config::{Config, ExperimentConfig};
use crate::error::ExperimentError;
use crate::experiment::{ExperimentSpec, ScenarioPrompt};
use crate::models::{
    ClassifiedAnswer, ExperimentOutcome, ExperimentReport, ExperimentResults, ModelId,
};
use crate::output;
use crate::provider::Providers;
use crate::rate_limit::RateLimiter;
use anyhow::{Context, Result};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::collections::BTreeMap;
use std::path::Path;

/// Where the runner is in the current experiment
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RunState {
    Configuring,
    Executing {
        model: ModelId,
        scenario: usize,
        iteration: usize,
    },
    Aggregating,
    Done,
    Failed,
}

/// Runs every experiment of a run file against the configured providers
pub struct Runner {
    config: Config,
    providers: Providers,
    catalog: Catalog,
    state: RunState,
}

impl Runner {
    pub fn new(config: Config, providers: Providers, catalog: Catalog) -> Self {
        Self {
            config,
            providers,
            catalog,
            state: RunState::Configuring,
        }
    }

    #[cfg(test)]
    pub fn state(&self) -> RunState {
        self.state
    }

    /// Run all experiments in order; a failed experiment does not stop the others
    pub async fn run_experiments(&mut self) -> Result<Vec<ExperimentReport>> {
        let mut reports = Vec::new();
        let experiments = self.config.experiments.clone();
        let total = experiments.len();

        for (index, experiment) in experiments.iter().enumerate() {
            let report = self.run_single_experiment(experiment, index + 1, total).await?;
            reports.push(report);
        }

        Ok(reports)
    }

    async fn run_single_experiment(
        &mut self,
        config: &ExperimentConfig,
        experiment_num: usize,
        total: usize,
    ) -> Result<ExperimentReport> {
        tracing::info!(
            "Running experiment {}/{}: {}",
            experiment_num,
            total,
            config.title
        );
        self.state = RunState::Configuring;

        let outcome = match self.run_experiment(config).await {
            Ok(results) => match self.store_results_if_configured(&results, config) {
                Ok(()) => {
                    self.state = RunState::Done;
                    ExperimentOutcome::Completed(results)
                }
                Err(err) => {
                    self.state = RunState::Failed;
                    tracing::error!("Experiment {:?} failed: {:#}", config.title, err);
                    ExperimentOutcome::Failed {
                        error: format!("{:#}", err),
                    }
                }
            },
            Err(err) => {
                let state = std::mem::replace(&mut self.state, RunState::Failed);
                tracing::error!(state = ?state, "Experiment {:?} failed: {}", config.title, err);
                ExperimentOutcome::Failed {
                    error: err.to_string(),
                }
            }
        };

        Ok(ExperimentReport {
            title: config.title.clone(),
            outcome,
        })
    }

    async fn run_experiment(
        &mut self,
        config: &ExperimentConfig,
    ) -> Result<ExperimentResults, ExperimentError> {
        let spec = ExperimentSpec::from_config(config, &self.catalog)?;
        self.execute(&spec).await
    }

    /// Query every model on every prompt, then classify and aggregate
    ///
    /// The first provider error ends the experiment and drops everything
    /// collected so far.
    pub async fn execute(&mut self, spec: &ExperimentSpec) -> Result<ExperimentResults, ExperimentError> {
        self.state = RunState::Configuring;
        spec.validate()?;
        self.ensure_clients(&spec.models)?;

        let mut rng = match spec.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let prompts = spec.prepare_scenarios(&mut rng)?;
        tracing::debug!(
            "{}: {} prompt(s) x {} model(s) x {} iteration(s)",
            spec.title,
            prompts.len(),
            spec.models.len(),
            spec.iterations
        );
        let mut rate_limiter = RateLimiter::new();

        let mut raw_model_answers: BTreeMap<ModelId, BTreeMap<usize, Vec<String>>> = BTreeMap::new();
        for model in &spec.models {
            let client = self
                .providers
                .client_for(*model)
                .ok_or_else(|| missing_client(*model))?;

            for prompt in &prompts {
                log_prompt_processing(*model, prompt.number, prompts.len());
                let mut answers = Vec::with_capacity(spec.iterations);

                for iteration in 1..=spec.iterations {
                    self.state = RunState::Executing {
                        model: *model,
                        scenario: prompt.number,
                        iteration,
                    };
                    rate_limiter.wait_for(model.tier()).await;

                    let answer = client
                        .call(
                            *model,
                            &prompt.prompt,
                            &prompt.instruction,
                            spec.temperature,
                            spec.max_tokens,
                        )
                        .await
                        .map_err(|source| ExperimentError::Provider {
                            model: model.to_string(),
                            source,
                        })?;
                    log_answer(iteration, spec.iterations, &answer);
                    answers.push(answer);
                }

                raw_model_answers
                    .entry(*model)
                    .or_default()
                    .insert(prompt.number, answers);
            }
        }

        self.state = RunState::Aggregating;
        Ok(aggregate_results(spec, &prompts, raw_model_answers))
    }

    /// Fail before the first call if any model has no client
    fn ensure_clients(&self, models: &[ModelId]) -> Result<(), ExperimentError> {
        match models.iter().find(|model| self.providers.client_for(**model).is_none()) {
            Some(model) => Err(missing_client(*model)),
            None => Ok(()),
        }
    }

    fn store_results_if_configured(
        &self,
        results: &ExperimentResults,
        config: &ExperimentConfig,
    ) -> Result<()> {
        if let Some(storage_path) = &config.storage_path {
            tracing::debug!("Storing results of {:?} to {}", config.title, storage_path);
            output::write_csv(Path::new(storage_path), results)
                .with_context(|| format!("Failed to store results of {:?}", config.title))?;
            tracing::info!("Results stored to: {}", storage_path);
        }
        Ok(())
    }
}

fn missing_client(model: ModelId) -> ExperimentError {
    ExperimentError::config(format!(
        "no credentials for {}, which is served by {:?}",
        model,
        model.provider()
    ))
}

fn aggregate_results(
    spec: &ExperimentSpec,
    prompts: &[ScenarioPrompt],
    raw_model_answers: BTreeMap<ModelId, BTreeMap<usize, Vec<String>>>,
) -> ExperimentResults {
    let aggregator = ResultAggregator::new(spec.experiment_type, spec.temperature, spec.iterations);
    let mut rows = Vec::new();

    for model in &spec.models {
        let Some(by_scenario) = raw_model_answers.get(model) else {
            continue;
        };
        for prompt in prompts {
            let raw = by_scenario.get(&prompt.number).map(Vec::as_slice).unwrap_or(&[]);
            let classified: Vec<ClassifiedAnswer> = raw
                .iter()
                .map(|answer| match &prompt.policy {
                    Some(policy) => classify_label(answer, policy),
                    None => classify_amount(answer),
                })
                .collect();
            let slots = prompt.policy.as_ref().map(|p| p.outcome_slots()).unwrap_or(&[]);
            rows.push(aggregator.aggregate(*model, prompt.number, &classified, slots));
        }
    }

    let baseline_comparisons = match &spec.baseline {
        Some(baseline) => rows
            .iter()
            .filter_map(|row| compare_to_baseline(row, baseline))
            .collect(),
        None => Vec::new(),
    };

    ExperimentResults {
        experiment_type: spec.experiment_type,
        low_answers_share_warning: low_answer_share(&rows),
        rows,
        raw_model_answers,
        baseline_comparisons,
    }
}

fn log_prompt_processing(model: ModelId, scenario: usize, total_scenarios: usize) {
    tracing::info!("Querying {} on scenario {}/{}", model, scenario, total_scenarios);
}

fn log_answer(iteration: usize, iterations: usize, answer: &str) {
    tracing::debug!("  → iteration {}/{}: {:?}", iteration, iterations, answer);
}
