//! # Confidence Module
//!
//! Evidence-weighted confidence for claim edges.
//!
//! - Each evidence item contributes its confidence weighted by study design
//! - The aggregate is a weight-normalised average, never a simple mean
//! - The weight table is an immutable value handed in by the caller

use crate::types::{Evidence, Probability, ProvGraphError, StudyType};
use serde::{Deserialize, Serialize};

/// Weight applied to evidence without a recorded study type.
pub const UNSPECIFIED_STUDY_WEIGHT: f64 = 0.5;

/// Per-study-type evidence weights.
///
/// Loaded from configuration or taken from `Default`; never mutated once an
/// engine is built.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WeightTable {
    pub rct: f64,
    pub meta_analysis: f64,
    pub cohort: f64,
    pub case_control: f64,
    pub observational: f64,
    pub review: f64,
    pub case_report: f64,
    pub unspecified: f64,
}

impl Default for WeightTable {
    fn default() -> Self {
        Self {
            rct: 1.0,
            meta_analysis: 0.95,
            cohort: 0.8,
            case_control: 0.7,
            observational: 0.6,
            review: 0.5,
            case_report: 0.4,
            unspecified: UNSPECIFIED_STUDY_WEIGHT,
        }
    }
}

impl WeightTable {
    /// Weight for a (possibly missing) study type.
    #[must_use]
    pub fn weight(&self, study_type: Option<StudyType>) -> f64 {
        match study_type {
            Some(StudyType::Rct) => self.rct,
            Some(StudyType::MetaAnalysis) => self.meta_analysis,
            Some(StudyType::Cohort) => self.cohort,
            Some(StudyType::CaseControl) => self.case_control,
            Some(StudyType::Observational) => self.observational,
            Some(StudyType::Review) => self.review,
            Some(StudyType::CaseReport) => self.case_report,
            None => self.unspecified,
        }
    }

    /// Named entries, in table order.
    #[must_use]
    pub fn entries(&self) -> [(&'static str, f64); 8] {
        [
            ("rct", self.rct),
            ("meta_analysis", self.meta_analysis),
            ("cohort", self.cohort),
            ("case_control", self.case_control),
            ("observational", self.observational),
            ("review", self.review),
            ("case_report", self.case_report),
            ("unspecified", self.unspecified),
        ]
    }

    /// Every weight must be finite and strictly positive.
    pub fn validate(&self) -> Result<(), ProvGraphError> {
        for (name, weight) in self.entries() {
            if !weight.is_finite() || weight <= 0.0 {
                return Err(ProvGraphError::Config(format!(
                    "weight for '{}' must be a positive number, got {}",
                    name, weight
                )));
            }
        }
        Ok(())
    }
}

/// Weight-normalised average confidence of an evidence list.
///
/// `Σ(cᵢ · w(studyᵢ)) / Σ w(studyᵢ)`. A single item yields its own confidence.
///
/// # Errors
///
/// `DataIntegrity` for an empty list (a claim cannot exist without evidence),
/// `Config` when the table's weights sum to zero.
pub fn weighted_confidence(
    evidence: &[Evidence],
    weights: &WeightTable,
) -> Result<Probability, ProvGraphError> {
    if evidence.is_empty() {
        return Err(ProvGraphError::DataIntegrity(
            "claim edge has no evidence".to_string(),
        ));
    }

    let (weighted, total) = evidence.iter().fold((0.0_f64, 0.0_f64), |(sum, w), e| {
        let weight = weights.weight(e.study_type);
        (sum + e.confidence.value() * weight, w + weight)
    });

    if total <= 0.0 {
        return Err(ProvGraphError::Config(
            "evidence weights sum to zero".to_string(),
        ));
    }

    Ok(Probability::clamped(weighted / total))
}

/// Confidence as reported in results: truncated, never rounded, to two decimals.
///
/// Matching against `min_confidence` uses the full-precision score.
#[must_use]
pub fn truncate_confidence(value: f64) -> f64 {
    // The epsilon absorbs representation error, so 0.29 stays 0.29.
    ((value * 100.0) + 1e-9).floor() / 100.0
}
