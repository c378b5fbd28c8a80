//! Adapter over the external correlation engine.
//!
//! The engine itself is a black box: anything implementing
//! [`CorrelationEngine`] can be plugged in. This module only decides when
//! the engine may be called and condenses its output into counts for the
//! correlation panel. The caller always learns *which* case occurred, so an
//! unloaded engine, too few readings and "nothing significant found" stay
//! distinguishable.

use serde::Serialize;

use crate::models::Reading;

// ---

/// Minimum number of readings before the engine is consulted.
pub const MIN_READINGS: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Strength {
    Weak,
    Moderate,
    Strong,
    VeryStrong,
}

impl Strength {
    // ---
    pub fn is_strong(self) -> bool {
        matches!(self, Strength::Strong | Strength::VeryStrong)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Positive,
    Negative,
}

/// One relationship reported by the engine between two reading fields.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Correlation {
    // ---
    pub parameters: (String, String),
    pub coefficient: f64,
    pub strength: Strength,
    pub direction: Direction,
}

#[derive(Debug, thiserror::Error)]
#[error("correlation engine failed: {0}")]
pub struct EngineError(pub String);

/// External statistical collaborator.
pub trait CorrelationEngine: Send + Sync {
    // ---
    fn analyze(&self, readings: &[Reading]) -> Result<Vec<Correlation>, EngineError>;

    /// Human-readable cards for a computed result.
    fn describe(&self, correlations: &[Correlation]) -> String {
        // ---
        correlations
            .iter()
            .map(|c| {
                format!(
                    "{} x {}: r={:+.2} ({:?}, {:?})",
                    c.parameters.0, c.parameters.1, c.coefficient, c.strength, c.direction
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CorrelationSummary {
    // ---
    pub total: usize,
    pub strong: usize,
    pub positive: usize,
    pub negative: usize,
}

impl CorrelationSummary {
    // ---
    pub fn from_correlations(correlations: &[Correlation]) -> Self {
        let total = correlations.len();
        let strong = correlations.iter().filter(|c| c.strength.is_strong()).count();
        let positive = correlations
            .iter()
            .filter(|c| c.direction == Direction::Positive)
            .count();

        Self {
            total,
            strong,
            positive,
            negative: total - positive,
        }
    }
}

/// What the correlation panel should show after a computation attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum CorrelationPanel {
    /// No engine is loaded.
    EngineUnavailable,
    /// Fewer than [`MIN_READINGS`] readings; engine was not called.
    InsufficientData { available: usize },
    /// Engine ran. An empty list means nothing significant was found.
    Computed {
        summary: CorrelationSummary,
        correlations: Vec<Correlation>,
    },
    /// Engine returned an error.
    Failed { message: String },
}

impl CorrelationPanel {
    // ---
    /// Counts shown in the stats row. All zero for every non-computed state.
    pub fn summary(&self) -> CorrelationSummary {
        match self {
            CorrelationPanel::Computed { summary, .. } => *summary,
            _ => CorrelationSummary::default(),
        }
    }
}

/// Run the engine over `readings` if it is loaded and there is enough data.
pub fn analyze_correlations(
    engine: Option<&dyn CorrelationEngine>,
    readings: &[Reading],
) -> CorrelationPanel {
    // ---
    let Some(engine) = engine else {
        tracing::error!("Correlation engine not loaded");
        return CorrelationPanel::EngineUnavailable;
    };

    if readings.len() < MIN_READINGS {
        tracing::warn!(
            "Insufficient data for correlations: {} reading(s)",
            readings.len()
        );
        return CorrelationPanel::InsufficientData {
            available: readings.len(),
        };
    }

    tracing::debug!("Analyzing correlations over {} readings", readings.len());

    match engine.analyze(readings) {
        Ok(correlations) => {
            let summary = CorrelationSummary::from_correlations(&correlations);
            tracing::info!(
                total = summary.total,
                strong = summary.strong,
                "Correlations updated"
            );
            CorrelationPanel::Computed {
                summary,
                correlations,
            }
        }
        Err(e) => {
            tracing::error!("Failed to compute correlations: {}", e);
            CorrelationPanel::Failed {
                message: e.to_string(),
            }
        }
    }
}
