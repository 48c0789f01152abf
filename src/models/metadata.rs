//! Model metadata
//!
//! Metadata stored with each index record, plus the optional model card
//! (`model_card_v{N}.json`) that supplies the training date and accuracy.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Metadata stored with an installed model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    /// Number of classes, re-derived from the labels file on every resolution
    pub num_classes: usize,
    /// Newline-delimited labels file
    pub classes_file: PathBuf,
    /// Training date from the model card; `None` when unknown
    #[serde(default)]
    pub train_date: Option<NaiveDate>,
    /// Validation accuracy in [0, 1]; `None` when unknown
    #[serde(default)]
    pub accuracy: Option<f64>,
}

/// Model card published next to the artifact
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelCard {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub train_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,
}

/// Raw card structure (partial)
#[derive(Debug, Deserialize)]
struct RawCard {
    train_date: Option<String>,
    accuracy: Option<f64>,
    // Older cards use a different name
    val_accuracy: Option<f64>,
}

/// Parse a model card
///
/// # Returns
/// * `Some(ModelCard)` if the card exists and is valid JSON
/// * `None` if it doesn't exist or can't be parsed
pub fn parse_model_card(card_path: &Path) -> Option<ModelCard> {
    if !card_path.exists() {
        return None;
    }

    let content = std::fs::read_to_string(card_path).ok()?;
    let raw: RawCard = serde_json::from_str(&content).ok()?;

    Some(ModelCard {
        train_date: raw
            .train_date
            .and_then(|d| NaiveDate::parse_from_str(d.trim(), "%Y-%m-%d").ok()),
        accuracy: raw
            .accuracy
            .or(raw.val_accuracy)
            .filter(|a| (0.0..=1.0).contains(a)),
    })
}

impl ModelMetadata {
    /// Fill fields that are still unknown from a model card
    ///
    /// Known values are never overwritten. Returns whether anything changed.
    pub fn fill_unknown_from(&mut self, card: &ModelCard) -> bool {
        let mut changed = false;
        if self.train_date.is_none() && card.train_date.is_some() {
            self.train_date = card.train_date;
            changed = true;
        }
        if self.accuracy.is_none() && card.accuracy.is_some() {
            self.accuracy = card.accuracy;
            changed = true;
        }
        changed
    }
}
