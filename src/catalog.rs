//! Built-in experiment scenarios and their human reference results.
//!
//! The table lives in `data/catalog.toml` and is embedded at build time.
//! Entries are looked up by experiment, scenario number and priming flag.

use crate::error::ExperimentError;
use crate::models::{AnswerLabel, Baseline, DecoyVariant, ExperimentType};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

const BUILTIN_CATALOG: &str = include_str!("../data/catalog.toml");

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExperimentKind {
    DecoyEffect,
    ProspectTheory,
    SunkCost,
    LossAversion,
    TransactionUtility,
}

impl ExperimentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExperimentKind::DecoyEffect => "decoy_effect",
            ExperimentKind::ProspectTheory => "prospect_theory",
            ExperimentKind::SunkCost => "sunk_cost",
            ExperimentKind::LossAversion => "loss_aversion",
            ExperimentKind::TransactionUtility => "transaction_utility",
        }
    }
}

impl fmt::Display for ExperimentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Composite key of a catalog entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CatalogKey {
    pub experiment: ExperimentKind,
    pub scenario: usize,
    pub priming: bool,
}

#[derive(Debug, Clone, Deserialize)]
struct TemplateEntry {
    text: String,
    #[serde(default)]
    answers: Vec<String>,
    instruction: String,
}

#[derive(Debug, Clone, Deserialize)]
struct CatalogEntry {
    experiment: ExperimentKind,
    scenario: usize,
    priming: bool,
    template: String,
    experiment_type: ExperimentType,
    #[serde(default)]
    decoy_variant: DecoyVariant,
    #[serde(default)]
    baseline_shares: Option<BTreeMap<String, f64>>,
    #[serde(default)]
    baseline_median: Option<f64>,
    source: String,
}

impl CatalogEntry {
    fn key(&self) -> CatalogKey {
        CatalogKey {
            experiment: self.experiment,
            scenario: self.scenario,
            priming: self.priming,
        }
    }
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    priming_prefix: String,
    templates: BTreeMap<String, TemplateEntry>,
    entries: Vec<CatalogEntry>,
}

/// A catalog scenario resolved into runnable text
#[derive(Debug, Clone, PartialEq)]
pub struct Preset {
    pub key: CatalogKey,
    pub scenario_text: String,
    pub answers: Vec<String>,
    pub instruction: String,
    pub experiment_type: ExperimentType,
    pub decoy_variant: DecoyVariant,
    pub baseline: Option<Baseline>,
    pub source: String,
}

pub struct Catalog {
    priming_prefix: String,
    templates: BTreeMap<String, TemplateEntry>,
    entries: Vec<CatalogEntry>,
}

impl Catalog {
    /// The catalog shipped with the binary
    pub fn builtin() -> Result<Self> {
        Self::from_toml(BUILTIN_CATALOG).context("Failed to load built-in experiment catalog")
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let file: CatalogFile = toml::from_str(content).context("Failed to parse catalog TOML")?;

        for entry in &file.entries {
            if !file.templates.contains_key(&entry.template) {
                anyhow::bail!(
                    "Catalog entry {} scenario {} references unknown template {}",
                    entry.experiment,
                    entry.scenario,
                    entry.template
                );
            }
            if let Some(shares) = &entry.baseline_shares {
                if let Some(bad) = shares.keys().find(|k| AnswerLabel::parse(k).is_none()) {
                    anyhow::bail!("Catalog baseline uses unknown answer label {}", bad);
                }
            }
        }

        Ok(Self {
            priming_prefix: file.priming_prefix,
            templates: file.templates,
            entries: file.entries,
        })
    }

    /// All keys in file order
    pub fn keys(&self) -> Vec<CatalogKey> {
        self.entries.iter().map(CatalogEntry::key).collect()
    }

    pub fn lookup(&self, key: CatalogKey) -> Result<Preset, ExperimentError> {
        let entry = self
            .entries
            .iter()
            .find(|entry| entry.key() == key)
            .ok_or_else(|| ExperimentError::UnknownPreset {
                experiment: key.experiment.to_string(),
                scenario: key.scenario,
                priming: key.priming,
            })?;

        // Template references are checked when the catalog is loaded
        let template = &self.templates[&entry.template];
        let scenario_text = if entry.priming {
            format!("{} {}", self.priming_prefix, template.text)
        } else {
            template.text.clone()
        };

        Ok(Preset {
            key,
            scenario_text,
            answers: template.answers.clone(),
            instruction: template.instruction.clone(),
            experiment_type: entry.experiment_type,
            decoy_variant: entry.decoy_variant,
            baseline: entry_baseline(entry),
            source: entry.source.clone(),
        })
    }
}

fn entry_baseline(entry: &CatalogEntry) -> Option<Baseline> {
    if let Some(shares) = &entry.baseline_shares {
        let shares = shares
            .iter()
            .filter_map(|(label, share)| AnswerLabel::parse(label).map(|label| (label, *share)))
            .collect();
        return Some(Baseline::Shares(shares));
    }
    entry.baseline_median.map(Baseline::Median)
}
