//! Training configuration.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::real;
use crate::schedule::Schedule;

/// Which network is trained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    /// Predict a word from the average of its neighbors.
    #[default]
    Cbow,
    /// Predict a word from each neighbor separately.
    Skipgram,
    /// Paragraph vector, distributed memory: CBOW over the preceding words
    /// plus the paragraph's vector.
    Pvdm,
    /// Paragraph vector, distributed bag of words: predict each word of a
    /// paragraph from the paragraph's vector.
    Pvdbow,
}

impl ModelKind {
    pub fn has_paragraphs(self) -> bool {
        matches!(self, ModelKind::Pvdm | ModelKind::Pvdbow)
    }

    /// Models that average (or concatenate) the window into one hidden
    /// vector, as opposed to training each window entry on its own.
    pub fn averages_window(self) -> bool {
        matches!(self, ModelKind::Cbow | ModelKind::Pvdm)
    }

    /// Numeric tag used in saved models.
    pub fn code(self) -> u32 {
        match self {
            ModelKind::Cbow => 0,
            ModelKind::Skipgram => 1,
            ModelKind::Pvdm => 2,
            ModelKind::Pvdbow => 3,
        }
    }

    pub fn from_code(code: u32) -> Option<Self> {
        Some(match code {
            0 => ModelKind::Cbow,
            1 => ModelKind::Skipgram,
            2 => ModelKind::Pvdm,
            3 => ModelKind::Pvdbow,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    pub model: ModelKind,
    /// Size of word and paragraph vectors.
    pub dim: usize,
    /// Max skip length between words.
    pub window: usize,
    /// Threshold for occurrence of words. Those that appear with higher
    /// frequency in the training data will be randomly down-sampled;
    /// useful range is (0, 1e-5). 0 disables subsampling.
    pub sample: real,
    /// Use hierarchical softmax.
    pub hs: bool,
    /// Number of negative examples (0 = not used).
    pub negative: usize,
    pub threads: usize,
    pub epochs: usize,
    /// Discard words that appear less than this many times.
    pub min_count: u64,
    /// Starting learning rate; see `starting_alpha`.
    pub alpha: Option<real>,
    /// Shrink the window at random for each word, weighting near words
    /// more heavily.
    pub randomize_window: bool,
    pub lowercase: bool,
    /// Fold pruned words into `<unk>` rather than dropping them.
    pub replace_unknown: bool,
    /// PV-DM only: concatenate the paragraph and window vectors instead of
    /// averaging them.
    pub concat: bool,
    /// The first token of each line labels its paragraph.
    pub labels: bool,
    pub schedule: Schedule,
    pub negative_table_size: usize,
    pub max_vocab: usize,
    pub seed: u64,
    pub progress: bool,
    /// Warn when gradients stop being finite.
    pub check_numerics: bool,
}

impl Default for TrainConfig {
    fn default() -> Self {
        TrainConfig {
            model: ModelKind::Cbow,
            dim: 100,
            window: 5,
            sample: 1e-3,
            hs: false,
            negative: 5,
            threads: std::thread::available_parallelism().map_or(1, |n| n.get()),
            epochs: 5,
            min_count: 5,
            alpha: None,
            randomize_window: true,
            lowercase: false,
            replace_unknown: false,
            concat: false,
            labels: false,
            schedule: Schedule::Linear,
            negative_table_size: crate::negative::TABLE_SIZE,
            max_vocab: 21_000_000,
            seed: 1,
            progress: true,
            check_numerics: false,
        }
    }
}

impl TrainConfig {
    /// Read a JSON configuration. Missing fields take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("error reading config file {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("invalid config file {}", path.display()))
    }

    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(self.dim > 0, "vector size must be positive");
        anyhow::ensure!(self.window > 0, "window must be positive");
        anyhow::ensure!(self.threads > 0, "need at least one thread");
        anyhow::ensure!(self.epochs > 0, "need at least one epoch");
        anyhow::ensure!(
            self.hs || self.negative > 0,
            "enable hierarchical softmax or negative sampling (or both)"
        );
        anyhow::ensure!(
            !self.concat || self.model == ModelKind::Pvdm,
            "concatenated windows are only supported by the PV-DM model"
        );
        anyhow::ensure!(
            self.negative == 0 || self.negative_table_size > 0,
            "negative sampling table must not be empty"
        );
        anyhow::ensure!(self.sample >= 0.0, "sample threshold must not be negative");
        Ok(())
    }

    /// 0.05 for the averaging models and 0.025 otherwise, unless set.
    pub fn starting_alpha(&self) -> real {
        self.alpha
            .unwrap_or(if self.model.averages_window() { 0.05 } else { 0.025 })
    }

    /// Words after the center that are part of its window.
    pub fn window_after(&self) -> usize {
        if self.model == ModelKind::Pvdm {
            0
        } else {
            self.window
        }
    }

    /// Width of the hidden layer, and of the output tables.
    pub fn hidden_size(&self) -> usize {
        if self.concat {
            self.dim * (self.window + 1)
        } else {
            self.dim
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        TrainConfig::default().validate().unwrap();
    }

    #[test]
    fn starting_alpha_depends_on_model() {
        let mut c = TrainConfig::default();
        assert_eq!(c.starting_alpha(), 0.05);
        c.model = ModelKind::Skipgram;
        assert_eq!(c.starting_alpha(), 0.025);
        c.alpha = Some(0.1);
        assert_eq!(c.starting_alpha(), 0.1);
    }

    #[test]
    fn rejects_bad_combinations() {
        let c = TrainConfig {
            hs: false,
            negative: 0,
            ..TrainConfig::default()
        };
        assert!(c.validate().is_err());
        let c = TrainConfig {
            concat: true,
            ..TrainConfig::default()
        };
        assert!(c.validate().is_err());
    }

    #[test]
    fn concat_widens_hidden_layer() {
        let c = TrainConfig {
            model: ModelKind::Pvdm,
            concat: true,
            dim: 10,
            window: 3,
            ..TrainConfig::default()
        };
        assert_eq!(c.window_after(), 0);
        assert_eq!(c.hidden_size(), 40);
    }

    #[test]
    fn partial_json() {
        let c: TrainConfig =
            serde_json::from_str(r#"{"model": "pvdbow", "dim": 16, "schedule": {"decay": {"factor": 0.1}}}"#)
                .unwrap();
        assert_eq!(c.model, ModelKind::Pvdbow);
        assert_eq!(c.dim, 16);
        assert_eq!(c.window, 5);
        assert_eq!(c.schedule, Schedule::Decay { factor: 0.1 });
    }

    #[test]
    fn kind_codes() {
        for k in [ModelKind::Cbow, ModelKind::Skipgram, ModelKind::Pvdm, ModelKind::Pvdbow] {
            assert_eq!(ModelKind::from_code(k.code()), Some(k));
        }
        assert_eq!(ModelKind::from_code(9), None);
    }
}
