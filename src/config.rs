use crate::error::{FundFlowError, Result};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Weights for the fund-flow match confidence formula.
///
/// `confidence = amount * amount_score + date * date_score + description * desc_score`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct MatchWeights {
    #[schemars(description = "Weight of the amount-closeness sub-score. Should dominate the blend.")]
    pub amount: f64,

    #[schemars(description = "Weight of the date-proximity sub-score.")]
    pub date: f64,

    #[schemars(
        description = "Weight of the narration-similarity sub-score. Must stay a minority share so generic merchant text cannot manufacture matches on its own."
    )]
    pub description: f64,
}

impl Default for MatchWeights {
    fn default() -> Self {
        Self {
            amount: 0.6,
            date: 0.25,
            description: 0.15,
        }
    }
}

/// Weights for combining the anomaly components into one fraud probability.
///
/// `fraud_probability = ml * ml_component + merchant * merchant_component + behavioral * behavioral_component`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct EnsembleWeights {
    #[schemars(
        description = "Weight of the aggregated statistical/learned component (isolation, reconstruction, MAD, IQR)."
    )]
    pub ml: f64,

    #[schemars(description = "Weight of the merchant/category risk component.")]
    pub merchant: f64,

    #[schemars(description = "Weight of the behavioral-deviation component.")]
    pub behavioral: f64,
}

impl Default for EnsembleWeights {
    fn default() -> Self {
        Self {
            ml: 0.75,
            merchant: 0.15,
            behavioral: 0.10,
        }
    }
}

/// Tunable parameters for one analysis run.
///
/// All fields default to the values used by the reference pipeline; the
/// constants are deliberately configurable rather than hard-coded.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct AnalysisConfig {
    #[schemars(
        description = "Similarity threshold (0.0-1.0) above which a raw party token merges into an existing canonical entity. Default 0.75."
    )]
    pub merge_threshold: f64,

    #[schemars(
        description = "Maximum absolute amount difference (in currency units) between a debit and a credit for them to be match candidates. Default 2.0."
    )]
    pub amount_tolerance: f64,

    #[schemars(
        description = "Maximum number of days between the two legs of a candidate match. Default 1."
    )]
    pub date_window_days: i64,

    #[schemars(
        description = "Composite match confidence below which candidate matches are discarded. Also bounds chain extension. Default 0.5."
    )]
    pub min_match_confidence: f64,

    #[schemars(description = "Weights for the match confidence blend. Must sum to 1.0.")]
    pub match_weights: MatchWeights,

    #[schemars(description = "Weights for the fraud-probability combination. Must sum to 1.0.")]
    pub ensemble_weights: EnsembleWeights,

    #[schemars(
        description = "Fraud probability above which a transaction is flagged. Default 0.5."
    )]
    pub flag_threshold: f64,

    #[schemars(
        description = "Minimum number of prior transactions an entity needs before its history-relative signals (MAD, IQR, behavioral) are informative. Below this they report neutral 0.5. Default 3."
    )]
    pub min_history: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            merge_threshold: 0.75,
            amount_tolerance: 2.0,
            date_window_days: 1,
            min_match_confidence: 0.5,
            match_weights: MatchWeights::default(),
            ensemble_weights: EnsembleWeights::default(),
            flag_threshold: 0.5,
            min_history: 3,
        }
    }
}

const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

impl AnalysisConfig {
    /// Rejects out-of-range options before any processing starts.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.merge_threshold) {
            return Err(FundFlowError::InvalidMergeThreshold(self.merge_threshold));
        }

        if self.amount_tolerance < 0.0 || !self.amount_tolerance.is_finite() {
            return Err(FundFlowError::InvalidAmountTolerance(self.amount_tolerance));
        }

        if self.date_window_days < 0 {
            return Err(FundFlowError::InvalidDateWindow(self.date_window_days));
        }

        if !(0.0..=1.0).contains(&self.min_match_confidence) {
            return Err(FundFlowError::InvalidConfidenceFloor(
                self.min_match_confidence,
            ));
        }

        if !(0.0..=1.0).contains(&self.flag_threshold) {
            return Err(FundFlowError::InvalidFlagThreshold(self.flag_threshold));
        }

        self.validate_match_weights()?;
        self.validate_ensemble_weights()?;

        Ok(())
    }

    fn validate_match_weights(&self) -> Result<()> {
        let w = &self.match_weights;
        let make_err = |details: String| FundFlowError::InvalidMatchWeights {
            amount: w.amount,
            date: w.date,
            description: w.description,
            details,
        };

        if w.amount < 0.0 || w.date < 0.0 || w.description < 0.0 {
            return Err(make_err("all weights must be non-negative".to_string()));
        }

        let sum = w.amount + w.date + w.description;
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(make_err(format!("weights must sum to 1.0 (got {})", sum)));
        }

        // Description similarity must never be able to carry a match alone.
        if w.description >= 0.5 {
            return Err(make_err(
                "description weight must stay below 0.5".to_string(),
            ));
        }

        Ok(())
    }

    fn validate_ensemble_weights(&self) -> Result<()> {
        let w = &self.ensemble_weights;
        let make_err = |details: String| FundFlowError::InvalidEnsembleWeights {
            ml: w.ml,
            merchant: w.merchant,
            behavioral: w.behavioral,
            details,
        };

        if w.ml < 0.0 || w.merchant < 0.0 || w.behavioral < 0.0 {
            return Err(make_err("all weights must be non-negative".to_string()));
        }

        let sum = w.ml + w.merchant + w.behavioral;
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(make_err(format!("weights must sum to 1.0 (got {})", sum)));
        }

        Ok(())
    }

    pub fn generate_json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(AnalysisConfig)
    }

    pub fn schema_as_json() -> std::result::Result<String, serde_json::Error> {
        let schema = Self::generate_json_schema();
        serde_json::to_string_pretty(&schema)
    }
}
