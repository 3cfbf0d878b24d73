//! Finds debit/credit transaction pairs that plausibly represent the same
//! money movement, within and across statement files.
//!
//! Candidates are pre-gated on amount tolerance and date window; narration
//! similarity only ever adjusts confidence, so generic merchant text can
//! never manufacture a match on its own.

use crate::config::AnalysisConfig;
use crate::entity::EntityArena;
use crate::similarity::name_similarity;
use crate::transaction::Transaction;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Flat confidence bonus when both legs sit on a transfer channel.
const TRANSFER_CHANNEL_BONUS: f64 = 0.1;

/// A candidate link between two transactions. Directional: `source` is the
/// debit leg, `target` the credit leg.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowMatch {
    pub source_id: u64,
    pub target_id: u64,
    /// Amount of the debit leg.
    pub amount: f64,
    pub amount_delta: f64,
    pub date_delta_days: i64,
    pub description_similarity: f64,
    /// Composite confidence in [0,1].
    pub confidence: f64,
    /// True when the two legs came from different statement files.
    pub cross_file: bool,
}

/// Searches the full batch for credit legs matching each debit leg.
pub fn find_matches(
    transactions: &[Transaction],
    arena: &EntityArena,
    config: &AnalysisConfig,
) -> Vec<FlowMatch> {
    let credits: Vec<&Transaction> = transactions
        .iter()
        .filter(|t| t.is_credit() && t.is_well_formed())
        .collect();
    let debits: Vec<&Transaction> = transactions
        .iter()
        .filter(|t| t.is_debit() && t.is_well_formed())
        .collect();

    // Rounded-amount buckets so each debit only scans nearby credits.
    let mut credit_buckets: HashMap<i64, Vec<&Transaction>> = HashMap::new();
    for credit in &credits {
        credit_buckets
            .entry(credit.amount.abs().round() as i64)
            .or_default()
            .push(credit);
    }

    let bucket_span = config.amount_tolerance.ceil() as i64;
    let mut matches = Vec::new();

    for debit in &debits {
        let center = debit.amount.abs().round() as i64;
        for key in (center - bucket_span)..=(center + bucket_span) {
            let Some(bucket) = credit_buckets.get(&key) else {
                continue;
            };
            for credit in bucket {
                if let Some(m) = score_pair(debit, credit, arena, config) {
                    matches.push(m);
                }
            }
        }
    }

    log::debug!(
        "matcher: {} debits x {} credits -> {} matches above floor {}",
        debits.len(),
        credits.len(),
        matches.len(),
        config.min_match_confidence
    );

    matches
}

/// Scores one debit/credit pair. Returns `None` when the pair fails a hard
/// gate (tolerance, window, entity continuity) or lands below the confidence
/// floor.
fn score_pair(
    debit: &Transaction,
    credit: &Transaction,
    arena: &EntityArena,
    config: &AnalysisConfig,
) -> Option<FlowMatch> {
    if debit.id == credit.id {
        return None;
    }

    let amount_delta = (debit.amount.abs() - credit.amount.abs()).abs();
    if amount_delta > config.amount_tolerance {
        return None;
    }

    let date_delta = (debit.date - credit.date).num_days().abs();
    if date_delta > config.date_window_days {
        return None;
    }

    // Entity continuity: when both legs resolve, a movement needs two
    // distinct counterparties. Both narrations naming the same entity means
    // the legs describe the same side of an account, not a transfer between
    // accounts.
    if let (Some(a), Some(b)) = (arena.entity_of(debit.id), arena.entity_of(credit.id)) {
        if a == b {
            return None;
        }
    }

    let amount_score = decreasing_score(amount_delta, config.amount_tolerance);
    let date_score = decreasing_score(date_delta as f64, config.date_window_days as f64);
    let desc_score = name_similarity(&debit.narration, &credit.narration);

    let w = &config.match_weights;
    let mut confidence =
        (w.amount * amount_score + w.date * date_score + w.description * desc_score).clamp(0.0, 1.0);

    // Both legs on an account-to-account channel (UPI, NEFT, IMPS, RTGS) are
    // likelier to be two views of one movement than point-of-sale lines.
    if debit.effective_channel().is_transfer() && credit.effective_channel().is_transfer() {
        confidence = (confidence + TRANSFER_CHANNEL_BONUS).min(1.0);
    }

    if confidence < config.min_match_confidence {
        return None;
    }

    Some(FlowMatch {
        source_id: debit.id,
        target_id: credit.id,
        amount: debit.amount.abs(),
        amount_delta,
        date_delta_days: date_delta,
        description_similarity: desc_score,
        confidence,
        cross_file: debit.source_file != credit.source_file,
    })
}

/// Linear fall-off from 1.0 at zero delta to 0.0 at the tolerance edge.
/// A zero tolerance admits only exact agreement, at full score.
fn decreasing_score(delta: f64, tolerance: f64) -> f64 {
    if tolerance <= 0.0 {
        return if delta <= 0.0 { 1.0 } else { 0.0 };
    }
    (1.0 - delta / tolerance).clamp(0.0, 1.0)
}

/// Collapses the match set to the single best outgoing match per source
/// transaction: highest confidence, ties broken by smallest date delta, then
/// by target id for determinism.
pub fn best_match_per_source(matches: &[FlowMatch]) -> HashMap<u64, FlowMatch> {
    let mut best: HashMap<u64, FlowMatch> = HashMap::new();

    for m in matches {
        match best.get(&m.source_id) {
            None => {
                best.insert(m.source_id, m.clone());
            }
            Some(current) => {
                let better = m
                    .confidence
                    .total_cmp(&current.confidence)
                    .then(current.date_delta_days.cmp(&m.date_delta_days))
                    .then(current.target_id.cmp(&m.target_id))
                    .is_gt();
                if better {
                    best.insert(m.source_id, m.clone());
                }
            }
        }
    }

    best
}
