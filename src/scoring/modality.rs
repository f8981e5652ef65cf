//! Scoring modalities and their declarative configurations.
//!
//! Each of the six modalities declares its score range, expected element
//! count, required evidence keys, and rounding behavior. Quality-level
//! thresholds must be monotonically non-increasing; a violating
//! configuration is rejected at load time.

use crate::error::{Result, ScoringError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// The six scoring modalities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Modality {
    /// Bayesian numerical claims, gaps, risks.
    #[serde(rename = "TYPE_A")]
    TypeA,
    /// DAG / theory-of-change chains.
    #[serde(rename = "TYPE_B")]
    TypeB,
    /// Coherence / inverted contradiction count.
    #[serde(rename = "TYPE_C")]
    TypeC,
    /// Pattern-matched baseline data, formalization.
    #[serde(rename = "TYPE_D")]
    TypeD,
    /// Budget traceability.
    #[serde(rename = "TYPE_E")]
    TypeE,
    /// Mechanism-inference plausibility.
    #[serde(rename = "TYPE_F")]
    TypeF,
}

impl Modality {
    /// All modalities in canonical order.
    pub const ALL: [Self; 6] = [
        Self::TypeA,
        Self::TypeB,
        Self::TypeC,
        Self::TypeD,
        Self::TypeE,
        Self::TypeF,
    ];
}

impl fmt::Display for Modality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            Self::TypeA => "TYPE_A",
            Self::TypeB => "TYPE_B",
            Self::TypeC => "TYPE_C",
            Self::TypeD => "TYPE_D",
            Self::TypeE => "TYPE_E",
            Self::TypeF => "TYPE_F",
        };
        f.write_str(tag)
    }
}

impl FromStr for Modality {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "TYPE_A" => Ok(Self::TypeA),
            "TYPE_B" => Ok(Self::TypeB),
            "TYPE_C" => Ok(Self::TypeC),
            "TYPE_D" => Ok(Self::TypeD),
            "TYPE_E" => Ok(Self::TypeE),
            "TYPE_F" => Ok(Self::TypeF),
            other => Err(format!("unknown modality: {other}")),
        }
    }
}

/// Decimal rounding mode, fixed at load time per modality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoundingMode {
    /// Round half away from zero.
    HalfUp,
    /// Banker's rounding.
    HalfEven,
    /// Truncate toward zero.
    Down,
}

/// Rounds a value to `precision` decimal places with an explicit mode.
///
/// Scores are non-negative; negative inputs round via their magnitude.
#[must_use]
pub fn round_decimal(value: f64, precision: u32, mode: RoundingMode) -> f64 {
    let factor = 10f64.powi(i32::try_from(precision).unwrap_or(i32::MAX));
    let scaled = value * factor;
    let sign = if scaled < 0.0 { -1.0 } else { 1.0 };
    let magnitude = scaled.abs();
    let rounded = match mode {
        RoundingMode::Down => magnitude.trunc(),
        RoundingMode::HalfUp => (magnitude + 0.5).floor(),
        RoundingMode::HalfEven => {
            let floor = magnitude.floor();
            let diff = magnitude - floor;
            if (diff - 0.5).abs() < f64::EPSILON {
                // Tie: round to the even neighbor
                if (floor as u64) % 2 == 0 { floor } else { floor + 1.0 }
            } else if diff > 0.5 {
                floor + 1.0
            } else {
                floor
            }
        }
    };
    sign * rounded / factor
}

/// Quality level assigned to a normalized score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum QualityLevel {
    /// Below the ACEPTABLE threshold.
    #[serde(rename = "INSUFICIENTE")]
    Insuficiente,
    /// At or above the ACEPTABLE threshold.
    #[serde(rename = "ACEPTABLE")]
    Aceptable,
    /// At or above the BUENO threshold.
    #[serde(rename = "BUENO")]
    Bueno,
    /// At or above the EXCELENTE threshold.
    #[serde(rename = "EXCELENTE")]
    Excelente,
}

impl fmt::Display for QualityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            Self::Insuficiente => "INSUFICIENTE",
            Self::Aceptable => "ACEPTABLE",
            Self::Bueno => "BUENO",
            Self::Excelente => "EXCELENTE",
        };
        f.write_str(tag)
    }
}

/// Quality-level thresholds over normalized scores.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualityThresholds {
    /// EXCELENTE floor.
    pub excelente: f64,
    /// BUENO floor.
    pub bueno: f64,
    /// ACEPTABLE floor.
    pub aceptable: f64,
}

impl Default for QualityThresholds {
    fn default() -> Self {
        Self {
            excelente: 0.85,
            bueno: 0.70,
            aceptable: 0.55,
        }
    }
}

impl QualityThresholds {
    /// Validates monotone non-increasing order EXCELENTE >= BUENO >= ACEPTABLE.
    ///
    /// # Errors
    ///
    /// Returns [`ScoringError::ThresholdsNotMonotone`] naming the violating pair.
    pub fn validate(&self) -> Result<()> {
        if self.excelente < self.bueno {
            return Err(ScoringError::ThresholdsNotMonotone {
                level_a: "EXCELENTE",
                value_a: self.excelente,
                level_b: "BUENO",
                value_b: self.bueno,
            }
            .into());
        }
        if self.bueno < self.aceptable {
            return Err(ScoringError::ThresholdsNotMonotone {
                level_a: "BUENO",
                value_a: self.bueno,
                level_b: "ACEPTABLE",
                value_b: self.aceptable,
            }
            .into());
        }
        Ok(())
    }

    /// Assigns the quality level for a normalized score.
    #[must_use]
    pub fn level_for(&self, normalized: f64) -> QualityLevel {
        if normalized >= self.excelente {
            QualityLevel::Excelente
        } else if normalized >= self.bueno {
            QualityLevel::Bueno
        } else if normalized >= self.aceptable {
            QualityLevel::Aceptable
        } else {
            QualityLevel::Insuficiente
        }
    }
}

/// Declarative configuration of one modality scorer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModalityConfig {
    /// The modality this configuration belongs to.
    pub modality: Modality,
    /// Minimum raw score.
    pub min_score: f64,
    /// Maximum raw score (also the normalization divisor).
    pub max_score: f64,
    /// Expected element count for completeness.
    pub expected_elements: usize,
    /// Required evidence keys, validated before scoring.
    pub required_keys: Vec<String>,
    /// Rounding mode applied to the raw score.
    pub rounding: RoundingMode,
    /// Decimal places kept after rounding.
    pub precision: u32,
}

impl ModalityConfig {
    /// Validates the configuration at load time.
    ///
    /// # Errors
    ///
    /// Returns an error for inverted ranges, zero maxima, or zero
    /// expected elements.
    pub fn validate(&self) -> Result<()> {
        if self.max_score <= self.min_score {
            return Err(ScoringError::InvalidModalityConfig {
                modality: self.modality.to_string(),
                reason: format!(
                    "max_score {} must exceed min_score {}",
                    self.max_score, self.min_score
                ),
            }
            .into());
        }
        if self.max_score <= 0.0 {
            return Err(ScoringError::InvalidModalityConfig {
                modality: self.modality.to_string(),
                reason: "max_score must be positive".to_string(),
            }
            .into());
        }
        if self.expected_elements == 0 {
            return Err(ScoringError::InvalidModalityConfig {
                modality: self.modality.to_string(),
                reason: "expected_elements must be at least 1".to_string(),
            }
            .into());
        }
        Ok(())
    }
}

/// The full modality table plus shared quality thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModalityTable {
    /// Per-modality configurations.
    pub configs: BTreeMap<Modality, ModalityConfig>,
    /// Shared quality-level thresholds.
    pub quality: QualityThresholds,
}

impl Default for ModalityTable {
    fn default() -> Self {
        let mk = |modality: Modality,
                  max_score: f64,
                  expected_elements: usize,
                  extra_key: Option<&str>| {
            let mut required_keys = vec!["elements".to_string(), "confidence".to_string()];
            if let Some(key) = extra_key {
                required_keys.push(key.to_string());
            }
            ModalityConfig {
                modality,
                min_score: 0.0,
                max_score,
                expected_elements,
                required_keys,
                rounding: RoundingMode::HalfEven,
                precision: 4,
            }
        };

        let mut configs = BTreeMap::new();
        configs.insert(Modality::TypeA, mk(Modality::TypeA, 3.0, 4, None));
        configs.insert(Modality::TypeB, mk(Modality::TypeB, 3.0, 3, Some("paths")));
        configs.insert(
            Modality::TypeC,
            mk(Modality::TypeC, 3.0, 3, Some("contradictions")),
        );
        configs.insert(Modality::TypeD, mk(Modality::TypeD, 3.0, 4, Some("matches")));
        configs.insert(
            Modality::TypeE,
            mk(Modality::TypeE, 3.0, 4, Some("traced_ratio")),
        );
        configs.insert(
            Modality::TypeF,
            mk(Modality::TypeF, 4.0, 4, Some("plausibility")),
        );

        Self {
            configs,
            quality: QualityThresholds::default(),
        }
    }
}

impl ModalityTable {
    /// Validates every configuration and the quality thresholds.
    ///
    /// # Errors
    ///
    /// Returns the first invalid configuration or threshold violation.
    pub fn validate(&self) -> Result<()> {
        self.quality.validate()?;
        for config in self.configs.values() {
            config.validate()?;
        }
        // Every modality must be configured
        for modality in Modality::ALL {
            if !self.configs.contains_key(&modality) {
                return Err(ScoringError::InvalidModalityConfig {
                    modality: modality.to_string(),
                    reason: "modality missing from table".to_string(),
                }
                .into());
            }
        }
        Ok(())
    }

    /// Looks up the configuration for a modality.
    ///
    /// # Errors
    ///
    /// Returns an error when the modality is not configured.
    pub fn config_for(&self, modality: Modality) -> Result<&ModalityConfig> {
        self.configs.get(&modality).ok_or_else(|| {
            ScoringError::InvalidModalityConfig {
                modality: modality.to_string(),
                reason: "modality missing from table".to_string(),
            }
            .into()
        })
    }
}
