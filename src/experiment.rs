//! Validated description of one experiment run and its prepared prompts.

use crate::catalog::{Catalog, CatalogKey};
use crate::classifier::LabelPolicy;
use crate::config::ExperimentConfig;
use crate::error::ExperimentError;
use crate::models::{Baseline, DecoyVariant, ExperimentType, ModelId};
use crate::prompt::{AnswerLabelMapping, MAX_OPTIONS, build_prompt, shuffle_variants};
use rand::Rng;

/// Everything needed to execute one experiment
#[derive(Debug, Clone)]
pub struct ExperimentSpec {
    pub title: String,
    pub experiment_type: ExperimentType,
    pub scenarios: Vec<String>,
    /// Flat answer options, `num_options` per scenario
    pub answer_texts: Vec<String>,
    pub num_options: usize,
    pub models: Vec<ModelId>,
    pub iterations: usize,
    pub temperature: f64,
    pub add_instruction: bool,
    pub instructions: Vec<String>,
    pub shuffle: bool,
    pub decoy_variant: DecoyVariant,
    pub max_tokens: u32,
    pub baseline: Option<Baseline>,
    pub seed: Option<u64>,
}

/// One prompt as it will be sent, with its classification rules
#[derive(Debug, Clone)]
pub struct ScenarioPrompt {
    /// 1-based scenario or shuffle-variant number
    pub number: usize,
    pub prompt: String,
    pub instruction: String,
    /// `None` for numeric experiments
    pub policy: Option<LabelPolicy>,
}

impl ExperimentSpec {
    /// Resolve a run-file entry, pulling scenario text from the catalog for presets
    pub fn from_config(config: &ExperimentConfig, catalog: &Catalog) -> Result<Self, ExperimentError> {
        let mut models = Vec::with_capacity(config.models.len());
        for model in &config.models {
            if !models.contains(model) {
                models.push(*model);
            }
        }

        let mut spec = Self {
            title: config.title.clone(),
            experiment_type: config.experiment_type,
            scenarios: config.scenarios.clone(),
            answer_texts: config.answer_texts.clone(),
            num_options: 0,
            models,
            iterations: config.iterations,
            temperature: config.temperature,
            add_instruction: config.add_instruction,
            instructions: config.instructions.clone(),
            shuffle: config.shuffle,
            decoy_variant: config.decoy_variant,
            max_tokens: 0,
            baseline: None,
            seed: config.seed,
        };

        if let Some(preset_ref) = &config.preset {
            let preset = catalog.lookup(CatalogKey {
                experiment: preset_ref.experiment,
                scenario: preset_ref.scenario,
                priming: preset_ref.priming,
            })?;
            spec.experiment_type = preset.experiment_type;
            spec.scenarios = vec![preset.scenario_text];
            spec.answer_texts = preset.answers;
            spec.decoy_variant = preset.decoy_variant;
            spec.baseline = preset.baseline;
            if config.instructions.is_empty() {
                spec.instructions = vec![preset.instruction];
            }
        }

        spec.num_options = match (spec.experiment_type, config.num_options) {
            (ExperimentType::Numeric, _) => 0,
            (ExperimentType::AnswerOptions, Some(n)) if config.preset.is_none() => n,
            (ExperimentType::AnswerOptions, _) => {
                if spec.scenarios.is_empty() || spec.answer_texts.len() % spec.scenarios.len() != 0 {
                    return Err(ExperimentError::config(format!(
                        "{} answer texts cannot be split evenly over {} scenarios",
                        spec.answer_texts.len(),
                        spec.scenarios.len()
                    )));
                }
                spec.answer_texts.len() / spec.scenarios.len()
            }
        };
        spec.max_tokens = config
            .max_tokens
            .unwrap_or_else(|| spec.experiment_type.default_max_tokens());

        spec.validate()?;
        Ok(spec)
    }

    /// Check the configuration before any provider is called
    pub fn validate(&self) -> Result<(), ExperimentError> {
        if self.models.is_empty() {
            return Err(ExperimentError::config("no models requested"));
        }
        if self.scenarios.is_empty() {
            return Err(ExperimentError::config("no scenarios given"));
        }
        if !self.temperature.is_finite() || self.temperature < 0.0 {
            return Err(ExperimentError::config(format!(
                "temperature must be a non-negative number, got {}",
                self.temperature
            )));
        }
        for model in &self.models {
            if self.temperature < model.min_temperature() {
                return Err(ExperimentError::config(format!(
                    "{} requires a temperature of at least {}, got {}",
                    model,
                    model.min_temperature(),
                    self.temperature
                )));
            }
        }
        if self.max_tokens == 0 {
            return Err(ExperimentError::config("max_tokens must be at least 1"));
        }
        if self.add_instruction && self.instructions.len() != self.scenarios.len() {
            return Err(ExperimentError::config(format!(
                "expected one instruction per scenario ({}), got {}",
                self.scenarios.len(),
                self.instructions.len()
            )));
        }

        match self.experiment_type {
            ExperimentType::Numeric => {
                if !self.answer_texts.is_empty() {
                    return Err(ExperimentError::config("numeric experiments take no answer texts"));
                }
                if self.shuffle {
                    return Err(ExperimentError::config("numeric experiments cannot be shuffled"));
                }
            }
            ExperimentType::AnswerOptions => self.validate_answer_options()?,
        }

        Ok(())
    }

    fn validate_answer_options(&self) -> Result<(), ExperimentError> {
        if !(2..=MAX_OPTIONS).contains(&self.num_options) {
            return Err(ExperimentError::config(format!(
                "num_options must be between 2 and {}, got {}",
                MAX_OPTIONS, self.num_options
            )));
        }
        if self.answer_texts.len() != self.scenarios.len() * self.num_options {
            return Err(ExperimentError::config(format!(
                "{} scenarios with {} options need {} answer texts, got {}",
                self.scenarios.len(),
                self.num_options,
                self.scenarios.len() * self.num_options,
                self.answer_texts.len()
            )));
        }

        let presented = LabelPolicy::for_decoy(self.decoy_variant, self.num_options).presented_count();
        if presented != self.num_options {
            return Err(ExperimentError::config(format!(
                "decoy variant {:?} presents {} options, but num_options is {}",
                self.decoy_variant, presented, self.num_options
            )));
        }

        if self.shuffle {
            if self.scenarios.len() != 1 {
                return Err(ExperimentError::config("shuffle mode takes exactly one scenario"));
            }
            if self.decoy_variant != DecoyVariant::Standard {
                return Err(ExperimentError::config(
                    "shuffle mode cannot be combined with a decoy variant",
                ));
            }
        }

        Ok(())
    }

    /// Instruction per scenario; all empty unless instructions are enabled
    pub fn resolved_instructions(&self) -> Vec<String> {
        if self.add_instruction {
            self.instructions.clone()
        } else {
            vec![String::new(); self.scenarios.len()]
        }
    }

    /// Build the prompts in the order they are run
    pub fn prepare_scenarios<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
    ) -> Result<Vec<ScenarioPrompt>, ExperimentError> {
        let instructions = self.resolved_instructions();

        match self.experiment_type {
            ExperimentType::Numeric => Ok(self
                .scenarios
                .iter()
                .zip(instructions)
                .enumerate()
                .map(|(i, (scenario, instruction))| ScenarioPrompt {
                    number: i + 1,
                    prompt: scenario.clone(),
                    instruction,
                    policy: None,
                })
                .collect()),
            ExperimentType::AnswerOptions if self.shuffle => {
                let original = AnswerLabelMapping::from_order(&self.answer_texts)?;
                let variants = shuffle_variants(&self.answer_texts, rng)?;
                Ok(variants
                    .iter()
                    .enumerate()
                    .map(|(i, variant)| ScenarioPrompt {
                        number: i + 1,
                        prompt: build_prompt(&self.scenarios[0], &variant.answers),
                        instruction: instructions[0].clone(),
                        policy: Some(LabelPolicy::for_shuffle(&variant.mapping, &original)),
                    })
                    .collect())
            }
            ExperimentType::AnswerOptions => Ok(self
                .scenarios
                .iter()
                .zip(self.answer_texts.chunks(self.num_options))
                .zip(instructions)
                .enumerate()
                .map(|(i, ((scenario, answers), instruction))| ScenarioPrompt {
                    number: i + 1,
                    prompt: build_prompt(scenario, answers),
                    instruction,
                    policy: Some(LabelPolicy::for_decoy(self.decoy_variant, self.num_options)),
                })
                .collect()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ExperimentKind;
    use crate::config::PresetRef;
    use crate::models::AnswerLabel;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn texts(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn base_config() -> ExperimentConfig {
        ExperimentConfig {
            title: "test".to_string(),
            models: vec![ModelId::Gpt35Turbo],
            iterations: 10,
            temperature: 1.0,
            preset: None,
            experiment_type: ExperimentType::AnswerOptions,
            scenarios: texts(&["First?", "Second?"]),
            answer_texts: texts(&["a1", "a2", "a3", "b1", "b2", "b3"]),
            num_options: None,
            shuffle: false,
            add_instruction: false,
            instructions: texts(&["Letter only.", "Letter only, please."]),
            decoy_variant: DecoyVariant::Standard,
            max_tokens: None,
            seed: None,
            storage_path: None,
        }
    }

    fn spec(config: &ExperimentConfig) -> Result<ExperimentSpec, ExperimentError> {
        ExperimentSpec::from_config(config, &Catalog::builtin().unwrap())
    }

    #[test]
    fn test_num_options_is_inferred() {
        let spec = spec(&base_config()).unwrap();
        assert_eq!(spec.num_options, 3);
        assert_eq!(spec.max_tokens, 1);
    }

    #[test]
    fn test_answer_count_must_match_options() {
        let mut config = base_config();
        config.num_options = Some(4);
        assert!(matches!(spec(&config), Err(ExperimentError::Configuration(_))));

        config.num_options = None;
        config.answer_texts.pop();
        assert!(matches!(spec(&config), Err(ExperimentError::Configuration(_))));
    }

    #[test]
    fn test_num_options_range() {
        let mut config = base_config();
        config.scenarios = texts(&["Only?"]);
        config.answer_texts = texts(&["x"]);
        assert!(spec(&config).is_err());

        config.answer_texts = (0..7).map(|i| i.to_string()).collect();
        assert!(spec(&config).is_err());
    }

    #[test]
    fn test_empty_models_rejected() {
        let mut config = base_config();
        config.models.clear();
        assert!(spec(&config).is_err());
    }

    #[test]
    fn test_duplicate_models_are_collapsed() {
        let mut config = base_config();
        config.models = vec![ModelId::Gpt4Turbo, ModelId::Gpt35Turbo, ModelId::Gpt4Turbo];
        let spec = spec(&config).unwrap();
        assert_eq!(spec.models, vec![ModelId::Gpt4Turbo, ModelId::Gpt35Turbo]);
    }

    #[test]
    fn test_zero_temperature_rejected_for_replicate() {
        let mut config = base_config();
        config.temperature = 0.0;
        assert!(spec(&config).is_ok());

        config.models.push(ModelId::Llama2Chat70b);
        let err = spec(&config).unwrap_err();
        assert!(err.to_string().contains("llama-2-70b"));

        config.temperature = 0.01;
        assert!(spec(&config).is_ok());
    }

    #[test]
    fn test_instructions_discarded_when_not_added() {
        let config = base_config();
        let spec = spec(&config).unwrap();
        assert_eq!(spec.resolved_instructions(), vec![String::new(), String::new()]);

        let prompts = spec.prepare_scenarios(&mut StdRng::seed_from_u64(0)).unwrap();
        assert!(prompts.iter().all(|p| p.instruction.is_empty()));
    }

    #[test]
    fn test_instructions_kept_when_added() {
        let mut config = base_config();
        config.add_instruction = true;
        let spec = spec(&config).unwrap();
        let prompts = spec.prepare_scenarios(&mut StdRng::seed_from_u64(0)).unwrap();
        assert_eq!(prompts[0].instruction, "Letter only.");
        assert_eq!(prompts[1].instruction, "Letter only, please.");

        let mut config = base_config();
        config.add_instruction = true;
        config.instructions.pop();
        assert!(ExperimentSpec::from_config(&config, &Catalog::builtin().unwrap()).is_err());
    }

    #[test]
    fn test_prompts_use_answer_chunks() {
        let spec = spec(&base_config()).unwrap();
        let prompts = spec.prepare_scenarios(&mut StdRng::seed_from_u64(0)).unwrap();
        assert_eq!(prompts.len(), 2);
        assert_eq!(prompts[0].number, 1);
        assert_eq!(prompts[0].prompt, "First?\nA: a1\nB: a2\nC: a3");
        assert_eq!(prompts[1].prompt, "Second?\nA: b1\nB: b2\nC: b3");
    }

    #[test]
    fn test_shuffle_expands_single_scenario() {
        let mut config = base_config();
        config.scenarios = texts(&["Pick one"]);
        config.answer_texts = texts(&["X", "Y"]);
        config.instructions = texts(&["Letter only."]);
        config.add_instruction = true;
        config.shuffle = true;
        let spec = spec(&config).unwrap();

        let prompts = spec.prepare_scenarios(&mut StdRng::seed_from_u64(3)).unwrap();
        assert_eq!(prompts.len(), 2);
        assert_eq!(prompts[0].prompt, "Pick one\nA: X\nB: Y");
        assert_eq!(prompts[1].prompt, "Pick one\nA: Y\nB: X");
        assert!(prompts.iter().all(|p| p.instruction == "Letter only."));
        assert_eq!(
            prompts[1].policy.as_ref().unwrap().outcome_slots(),
            &[AnswerLabel::A, AnswerLabel::B]
        );
    }

    #[test]
    fn test_shuffle_requires_one_scenario() {
        let mut config = base_config();
        config.shuffle = true;
        assert!(spec(&config).is_err());
    }

    #[test]
    fn test_numeric_prompts_are_verbatim() {
        let mut config = base_config();
        config.experiment_type = ExperimentType::Numeric;
        config.scenarios = texts(&["What would you pay?"]);
        config.answer_texts.clear();
        let spec = spec(&config).unwrap();
        assert_eq!(spec.max_tokens, 10);

        let prompts = spec.prepare_scenarios(&mut StdRng::seed_from_u64(0)).unwrap();
        assert_eq!(prompts[0].prompt, "What would you pay?");
        assert!(prompts[0].policy.is_none());
    }

    #[test]
    fn test_preset_resolves_from_catalog() {
        let mut config = base_config();
        config.scenarios.clear();
        config.answer_texts.clear();
        config.instructions.clear();
        config.add_instruction = true;
        config.preset = Some(PresetRef {
            experiment: ExperimentKind::DecoyEffect,
            scenario: 2,
            priming: false,
        });
        let spec = spec(&config).unwrap();

        assert_eq!(spec.num_options, 2);
        assert_eq!(spec.decoy_variant, DecoyVariant::OptionRemoved);
        assert_eq!(spec.instructions.len(), 1);
        assert!(matches!(spec.baseline, Some(Baseline::Shares(_))));

        let prompts = spec.prepare_scenarios(&mut StdRng::seed_from_u64(0)).unwrap();
        let policy = prompts[0].policy.as_ref().unwrap();
        assert_eq!(policy.outcome_slots().len(), 3);
    }

    #[test]
    fn test_unknown_preset() {
        let mut config = base_config();
        config.preset = Some(PresetRef {
            experiment: ExperimentKind::SunkCost,
            scenario: 42,
            priming: false,
        });
        assert!(matches!(spec(&config), Err(ExperimentError::UnknownPreset { .. })));
    }

    #[test]
    fn test_decoy_variant_must_match_option_count() {
        let mut config = base_config();
        config.decoy_variant = DecoyVariant::OptionRemoved;
        assert!(spec(&config).is_err());
    }
}
