//! Sequence definitions — ordered outbound steps shared by many contacts.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// A sequence may hold at most this many steps.
pub const MAX_STEPS: usize = 5;

fn default_delay_days() -> u32 {
    3
}

/// One outbound email in a sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceStep {
    /// Subject template. Follow-ups usually reply in-thread and leave this empty.
    #[serde(default)]
    pub subject: String,
    /// Days to wait after this step is sent before the next one is due.
    #[serde(default = "default_delay_days")]
    pub delay_days: u32,
}

/// A named, ordered list of steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sequence {
    pub name: String,
    pub steps: Vec<SequenceStep>,
}

impl Sequence {
    pub fn step_count(&self) -> u32 {
        self.steps.len() as u32
    }

    /// Delay to apply after sending `step` (1-based). Out-of-range steps use the last step's delay.
    pub fn delay_after(&self, step: u32) -> u32 {
        let idx = (step.max(1) as usize - 1).min(self.steps.len().saturating_sub(1));
        self.steps
            .get(idx)
            .map(|s| s.delay_days)
            .unwrap_or_else(default_delay_days)
    }
}

/// All known sequences, keyed by name.
#[derive(Debug, Clone, Default)]
pub struct SequenceCatalog {
    sequences: HashMap<String, Sequence>,
}

impl SequenceCatalog {
    /// Build a catalog, validating each sequence has 1..=MAX_STEPS steps.
    pub fn new(sequences: Vec<Sequence>) -> Result<Self, ConfigError> {
        let mut map = HashMap::with_capacity(sequences.len());
        for seq in sequences {
            if seq.steps.is_empty() || seq.steps.len() > MAX_STEPS {
                return Err(ConfigError::InvalidValue {
                    key: format!("sequence '{}'", seq.name),
                    message: format!(
                        "expected 1..={MAX_STEPS} steps, found {}",
                        seq.steps.len()
                    ),
                });
            }
            if map.insert(seq.name.clone(), seq).is_some() {
                return Err(ConfigError::ParseError("duplicate sequence name".into()));
            }
        }
        Ok(Self { sequences: map })
    }

    /// Parse a JSON array of sequences.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let sequences: Vec<Sequence> =
            serde_json::from_str(json).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        Self::new(sequences)
    }

    /// Load a catalog file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        let catalog = Self::from_json(&json)?;
        tracing::info!(path = %path.display(), sequences = catalog.len(), "Sequence catalog loaded");
        Ok(catalog)
    }

    pub fn get(&self, name: &str) -> Option<&Sequence> {
        self.sequences.get(name)
    }

    pub fn len(&self) -> usize {
        self.sequences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequences.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CATALOG: &str = r#"[
        {"name": "default", "steps": [
            {"subject": "Quick question", "delay_days": 3},
            {"delay_days": 4},
            {}
        ]}
    ]"#;

    #[test]
    fn parses_catalog_with_defaults() {
        let catalog = SequenceCatalog::from_json(CATALOG).unwrap();
        let seq = catalog.get("default").unwrap();
        assert_eq!(seq.step_count(), 3);
        assert_eq!(seq.steps[0].subject, "Quick question");
        assert_eq!(seq.steps[2].delay_days, 3);
    }

    #[test]
    fn delay_after_clamps_to_last_step() {
        let catalog = SequenceCatalog::from_json(CATALOG).unwrap();
        let seq = catalog.get("default").unwrap();
        assert_eq!(seq.delay_after(1), 3);
        assert_eq!(seq.delay_after(2), 4);
        assert_eq!(seq.delay_after(9), 3);
    }

    #[test]
    fn rejects_too_many_steps() {
        let steps = vec![
            SequenceStep {
                subject: String::new(),
                delay_days: 1,
            };
            6
        ];
        let err = SequenceCatalog::new(vec![Sequence {
            name: "long".into(),
            steps,
        }]);
        assert!(err.is_err());
    }

    #[test]
    fn rejects_empty_sequence() {
        assert!(SequenceCatalog::from_json(r#"[{"name": "x", "steps": []}]"#).is_err());
    }
}
