//! Per-transaction anomaly scoring ensemble.
//!
//! Six independent signals are computed for every transaction and combined
//! into one fraud probability. The learned components (isolation forest,
//! principal-component reconstruction) are implemented directly over a
//! fixed-size numeric feature vector so the statistical components (MAD,
//! IQR) and the learned ones can be unit-tested and substituted
//! independently. Entity-relative signals report neutral 0.5 when the
//! entity's history is too short to be informative.

use crate::config::AnalysisConfig;
use crate::entity::{EntityArena, EntityId};
use crate::transaction::{Channel, Transaction};
use chrono::Datelike;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Fixed seed: scoring must be reproducible across runs of the same batch.
const FOREST_SEED: u64 = 0x5eed_f10e5;
const FOREST_TREES: usize = 50;
const FOREST_SAMPLE: usize = 64;

const FEATURES: usize = 4;

/// Component scores plus the combined fraud probability for one transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnomalyScore {
    pub txn_id: u64,
    pub isolation: f64,
    pub reconstruction: f64,
    pub mad: f64,
    pub iqr: f64,
    pub merchant_risk: f64,
    pub behavioral: f64,
    pub fraud_probability: f64,
    pub flagged: bool,
    /// True for the placeholder emitted for malformed transactions.
    pub neutral: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnomalySummary {
    pub flagged_count: usize,
    pub fraud_rate: f64,
}

/// Scores every transaction in the batch. Malformed rows get a neutral
/// placeholder instead of failing the run.
pub fn score_batch(
    transactions: &[Transaction],
    arena: &EntityArena,
    config: &AnalysisConfig,
) -> Vec<AnomalyScore> {
    let usable: Vec<&Transaction> = transactions.iter().filter(|t| t.is_well_formed()).collect();

    let features = feature_matrix(&usable, arena);
    let isolation = isolation_scores(&features);
    let reconstruction = reconstruction_scores(&features);

    let histories = entity_histories(&usable, arena);

    let mut by_id: HashMap<u64, AnomalyScore> = HashMap::new();
    for (i, txn) in usable.iter().enumerate() {
        let history = arena
            .entity_of(txn.id)
            .and_then(|e| histories.get(&e))
            .map(|h| prior_slice(h, txn))
            .unwrap_or_default();

        let (mad, iqr, behavioral) = if history.len() < config.min_history {
            (0.5, 0.5, 0.5)
        } else {
            (
                mad_score(txn.amount.abs(), &history),
                iqr_score(txn.amount.abs(), &history),
                behavioral_score(txn, &history),
            )
        };

        let merchant_risk = merchant_risk_score(txn, arena);

        let ml = (isolation[i] + reconstruction[i] + mad + iqr) / 4.0;
        let w = &config.ensemble_weights;
        let fraud_probability =
            (w.ml * ml + w.merchant * merchant_risk + w.behavioral * behavioral).clamp(0.0, 1.0);

        by_id.insert(
            txn.id,
            AnomalyScore {
                txn_id: txn.id,
                isolation: isolation[i],
                reconstruction: reconstruction[i],
                mad,
                iqr,
                merchant_risk,
                behavioral,
                fraud_probability,
                flagged: fraud_probability > config.flag_threshold,
                neutral: false,
            },
        );
    }

    transactions
        .iter()
        .map(|txn| by_id.remove(&txn.id).unwrap_or(AnomalyScore {
            txn_id: txn.id,
            isolation: 0.5,
            reconstruction: 0.5,
            mad: 0.5,
            iqr: 0.5,
            merchant_risk: 0.5,
            behavioral: 0.5,
            fraud_probability: 0.5,
            flagged: false,
            neutral: true,
        }))
        .collect()
}

pub fn summarize(scores: &[AnomalyScore]) -> AnomalySummary {
    let flagged_count = scores.iter().filter(|s| s.flagged).count();
    let fraud_rate = if scores.is_empty() {
        0.0
    } else {
        flagged_count as f64 / scores.len() as f64
    };
    AnomalySummary {
        flagged_count,
        fraud_rate,
    }
}

/// One snapshot of an entity's activity. Keyed by transaction id so the
/// transaction under scoring excludes exactly itself from its own history,
/// never a same-day duplicate payment.
#[derive(Clone, Copy)]
struct HistoryEntry {
    ordinal: i64,
    txn_id: u64,
    amount: f64,
    channel: Channel,
}

fn entity_histories(
    usable: &[&Transaction],
    arena: &EntityArena,
) -> HashMap<EntityId, Vec<HistoryEntry>> {
    let mut histories: HashMap<EntityId, Vec<HistoryEntry>> = HashMap::new();
    for txn in usable {
        if let Some(entity) = arena.entity_of(txn.id) {
            histories.entry(entity).or_default().push(HistoryEntry {
                ordinal: i64::from(txn.date.num_days_from_ce()),
                txn_id: txn.id,
                amount: txn.amount.abs(),
                channel: txn.effective_channel(),
            });
        }
    }
    for h in histories.values_mut() {
        h.sort_by(|a, b| (a.ordinal, a.txn_id).cmp(&(b.ordinal, b.txn_id)));
    }
    histories
}

/// The strictly-prior portion of an entity's history for one transaction.
/// Same-day entries count as prior when their id precedes this one, mirroring
/// batch arrival order within a day.
fn prior_slice(history: &[HistoryEntry], txn: &Transaction) -> Vec<HistoryEntry> {
    let ordinal = i64::from(txn.date.num_days_from_ce());
    history
        .iter()
        .filter(|h| (h.ordinal, h.txn_id) < (ordinal, txn.id))
        .copied()
        .collect()
}

/// Feature vector: amount, day-of-month, day-of-week, rolling frequency of
/// the resolved entity around the transaction date.
fn feature_matrix(usable: &[&Transaction], arena: &EntityArena) -> Vec<[f64; FEATURES]> {
    let mut per_entity_dates: HashMap<EntityId, Vec<i64>> = HashMap::new();
    for txn in usable {
        if let Some(e) = arena.entity_of(txn.id) {
            per_entity_dates
                .entry(e)
                .or_default()
                .push(i64::from(txn.date.num_days_from_ce()));
        }
    }

    usable
        .iter()
        .map(|txn| {
            let ordinal = i64::from(txn.date.num_days_from_ce());
            let rolling = arena
                .entity_of(txn.id)
                .and_then(|e| per_entity_dates.get(&e))
                .map(|dates| dates.iter().filter(|d| (*d - ordinal).abs() <= 7).count())
                .unwrap_or(0);

            [
                txn.amount.abs(),
                f64::from(txn.date.day()),
                txn.date.weekday().num_days_from_monday() as f64,
                rolling as f64,
            ]
        })
        .collect()
}

// ---- isolation forest -----------------------------------------------------

struct IsolationTree {
    feature: usize,
    split: f64,
    left: Option<Box<IsolationTree>>,
    right: Option<Box<IsolationTree>>,
    size: usize,
}

fn isolation_scores(features: &[[f64; FEATURES]]) -> Vec<f64> {
    let n = features.len();
    if n < 3 {
        return vec![0.5; n];
    }

    let mut rng = StdRng::seed_from_u64(FOREST_SEED);
    let sample = FOREST_SAMPLE.min(n);
    let depth_limit = (sample as f64).log2().ceil() as usize;

    let mut trees = Vec::with_capacity(FOREST_TREES);
    for _ in 0..FOREST_TREES {
        let mut indices: Vec<usize> = (0..n).collect();
        for i in (1..indices.len()).rev() {
            indices.swap(i, rng.gen_range(0..=i));
        }
        indices.truncate(sample);
        let points: Vec<[f64; FEATURES]> = indices.iter().map(|&i| features[i]).collect();
        trees.push(grow_tree(&points, 0, depth_limit, &mut rng));
    }

    let norm = average_path_length(sample);
    features
        .iter()
        .map(|point| {
            let avg: f64 = trees
                .iter()
                .map(|t| path_length(t, point, 0))
                .sum::<f64>()
                / trees.len() as f64;
            2f64.powf(-avg / norm)
        })
        .collect()
}

fn grow_tree(
    points: &[[f64; FEATURES]],
    depth: usize,
    limit: usize,
    rng: &mut StdRng,
) -> IsolationTree {
    if points.len() <= 1 || depth >= limit {
        return IsolationTree {
            feature: 0,
            split: 0.0,
            left: None,
            right: None,
            size: points.len(),
        };
    }

    // Pick a feature that still varies; give up after a few attempts.
    for _ in 0..FEATURES * 2 {
        let feature = rng.gen_range(0..FEATURES);
        let min = points.iter().map(|p| p[feature]).fold(f64::INFINITY, f64::min);
        let max = points
            .iter()
            .map(|p| p[feature])
            .fold(f64::NEG_INFINITY, f64::max);
        if max <= min {
            continue;
        }

        let split = rng.gen_range(min..max);
        let left_points: Vec<[f64; FEATURES]> =
            points.iter().filter(|p| p[feature] < split).copied().collect();
        let right_points: Vec<[f64; FEATURES]> =
            points.iter().filter(|p| p[feature] >= split).copied().collect();

        return IsolationTree {
            feature,
            split,
            left: Some(Box::new(grow_tree(&left_points, depth + 1, limit, rng))),
            right: Some(Box::new(grow_tree(&right_points, depth + 1, limit, rng))),
            size: points.len(),
        };
    }

    IsolationTree {
        feature: 0,
        split: 0.0,
        left: None,
        right: None,
        size: points.len(),
    }
}

fn path_length(tree: &IsolationTree, point: &[f64; FEATURES], depth: usize) -> f64 {
    match (&tree.left, &tree.right) {
        (Some(left), Some(right)) => {
            if point[tree.feature] < tree.split {
                path_length(left, point, depth + 1)
            } else {
                path_length(right, point, depth + 1)
            }
        }
        _ => depth as f64 + average_path_length(tree.size),
    }
}

/// Expected path length of an unsuccessful BST search, the standard
/// normalizer for isolation forests.
fn average_path_length(n: usize) -> f64 {
    const EULER_MASCHERONI: f64 = 0.577_215_664_901_532_9;
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_MASCHERONI) - 2.0 * (n - 1.0) / n
        }
    }
}

// ---- reconstruction -------------------------------------------------------

/// Projects each standardized feature vector onto the first principal
/// component (found by power iteration) and scores by the distance left
/// unexplained, min-max normalized across the batch.
fn reconstruction_scores(features: &[[f64; FEATURES]]) -> Vec<f64> {
    let n = features.len();
    if n < 4 {
        return vec![0.5; n];
    }

    // Standardize columns.
    let mut means = [0.0; FEATURES];
    let mut stds = [0.0; FEATURES];
    for f in 0..FEATURES {
        means[f] = features.iter().map(|p| p[f]).sum::<f64>() / n as f64;
        let var = features
            .iter()
            .map(|p| (p[f] - means[f]).powi(2))
            .sum::<f64>()
            / n as f64;
        stds[f] = var.sqrt().max(1e-12);
    }
    let standardized: Vec<[f64; FEATURES]> = features
        .iter()
        .map(|p| {
            let mut z = [0.0; FEATURES];
            for f in 0..FEATURES {
                z[f] = (p[f] - means[f]) / stds[f];
            }
            z
        })
        .collect();

    // Covariance matrix and dominant eigenvector.
    let mut cov = [[0.0; FEATURES]; FEATURES];
    for z in &standardized {
        for (a, cov_row) in cov.iter_mut().enumerate() {
            for (b, cell) in cov_row.iter_mut().enumerate() {
                *cell += z[a] * z[b] / n as f64;
            }
        }
    }

    let mut v = [1.0; FEATURES];
    for _ in 0..100 {
        let mut next = [0.0; FEATURES];
        for (a, next_a) in next.iter_mut().enumerate() {
            for b in 0..FEATURES {
                *next_a += cov[a][b] * v[b];
            }
        }
        let norm = next.iter().map(|x| x * x).sum::<f64>().sqrt();
        if norm < 1e-12 {
            return vec![0.5; n];
        }
        for x in &mut next {
            *x /= norm;
        }
        v = next;
    }

    let errors: Vec<f64> = standardized
        .iter()
        .map(|z| {
            let projection: f64 = (0..FEATURES).map(|f| z[f] * v[f]).sum();
            (0..FEATURES)
                .map(|f| (z[f] - projection * v[f]).powi(2))
                .sum::<f64>()
                .sqrt()
        })
        .collect();

    let min = errors.iter().copied().fold(f64::INFINITY, f64::min);
    let max = errors.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if max - min < 1e-12 {
        return vec![0.0; n];
    }
    errors.iter().map(|e| (e - min) / (max - min)).collect()
}

// ---- robust statistics ----------------------------------------------------

fn median(sorted: &[f64]) -> f64 {
    let n = sorted.len();
    if n == 0 {
        return 0.0;
    }
    if n % 2 == 1 {
        sorted[n / 2]
    } else {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    }
}

fn quantile(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let pos = q * (sorted.len() - 1) as f64;
    let lower = pos.floor() as usize;
    let upper = pos.ceil() as usize;
    if lower == upper {
        sorted[lower]
    } else {
        sorted[lower] + (pos - lower as f64) * (sorted[upper] - sorted[lower])
    }
}

/// Robust z-score via median absolute deviation, squashed to [0,1] at the
/// conventional 3.5 cutoff.
fn mad_score(amount: f64, history: &[HistoryEntry]) -> f64 {
    let mut amounts: Vec<f64> = history.iter().map(|h| h.amount).collect();
    amounts.sort_by(f64::total_cmp);

    let med = median(&amounts);
    let mut deviations: Vec<f64> = amounts.iter().map(|a| (a - med).abs()).collect();
    deviations.sort_by(f64::total_cmp);
    let mad = median(&deviations);

    if mad < 1e-12 {
        return if (amount - med).abs() < 1e-9 { 0.0 } else { 1.0 };
    }

    let robust_z = 0.6745 * (amount - med).abs() / mad;
    (robust_z / 3.5).clamp(0.0, 1.0)
}

/// Distance beyond the Tukey fences, scaled by the fence width.
fn iqr_score(amount: f64, history: &[HistoryEntry]) -> f64 {
    let mut amounts: Vec<f64> = history.iter().map(|h| h.amount).collect();
    amounts.sort_by(f64::total_cmp);

    let q1 = quantile(&amounts, 0.25);
    let q3 = quantile(&amounts, 0.75);
    let iqr = q3 - q1;

    if iqr < 1e-12 {
        return if (amount - q1).abs() < 1e-9 { 0.0 } else { 1.0 };
    }

    let lower = q1 - 1.5 * iqr;
    let upper = q3 + 1.5 * iqr;
    let excess = if amount < lower {
        lower - amount
    } else if amount > upper {
        amount - upper
    } else {
        return 0.0;
    };

    (excess / (1.5 * iqr)).clamp(0.0, 1.0)
}

/// Deviation from the entity's typical amount range and typical channel.
fn behavioral_score(txn: &Transaction, history: &[HistoryEntry]) -> f64 {
    let amounts: Vec<f64> = history.iter().map(|h| h.amount).collect();
    let mean = amounts.iter().sum::<f64>() / amounts.len() as f64;
    let var = amounts.iter().map(|a| (a - mean).powi(2)).sum::<f64>() / amounts.len() as f64;
    let std = var.sqrt();

    let amount_dev = if std < 1e-12 {
        if (txn.amount.abs() - mean).abs() < 1e-9 {
            0.0
        } else {
            1.0
        }
    } else {
        ((txn.amount.abs() - mean).abs() / (3.0 * std)).clamp(0.0, 1.0)
    };

    let mut channel_counts: HashMap<Channel, usize> = HashMap::new();
    for h in history {
        *channel_counts.entry(h.channel).or_insert(0) += 1;
    }
    // Count ties break on the channel itself; map iteration order must never
    // leak into the score.
    let typical = channel_counts
        .iter()
        .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))
        .map(|(c, _)| *c);
    let channel_dev = if typical == Some(txn.effective_channel()) {
        0.0
    } else {
        1.0
    };

    (amount_dev + 0.3 * channel_dev).clamp(0.0, 1.0)
}

// ---- merchant risk --------------------------------------------------------

/// Static keyword risk table over narration and category text.
const RISK_KEYWORDS: &[(&str, f64)] = &[
    ("CASINO", 0.9),
    ("BETTING", 0.9),
    ("LOTTERY", 0.9),
    ("GAMBLING", 0.9),
    ("CRYPTO", 0.8),
    ("FOREX", 0.7),
    ("JEWELLERY", 0.6),
    ("GOLD", 0.6),
    ("PAWN", 0.6),
];

fn merchant_risk_score(txn: &Transaction, arena: &EntityArena) -> f64 {
    let mut haystack = txn.narration.to_uppercase();
    if let Some(category) = &txn.category {
        haystack.push(' ');
        haystack.push_str(&category.to_uppercase());
    }

    if let Some((_, risk)) = RISK_KEYWORDS.iter().find(|(kw, _)| haystack.contains(kw)) {
        return *risk;
    }

    if txn.effective_channel() == Channel::Cash {
        return 0.6;
    }

    // An unresolvable counterparty is mildly riskier than a known one.
    if arena.entity_of(txn.id).is_none() {
        return 0.5;
    }

    0.3
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::narration::NarrationParser;
    use crate::transaction::Direction;
    use chrono::NaiveDate;

    fn txn(id: u64, amount: f64, narration: &str, day: u32) -> Transaction {
        Transaction {
            id,
            source_file: "a.pdf".to_string(),
            date: NaiveDate::from_ymd_opt(2024, 3, day).unwrap(),
            amount,
            direction: Direction::Debit,
            narration: narration.to_string(),
            channel: Channel::Upi,
            category: None,
        }
    }

    fn resolve_all(transactions: &[Transaction]) -> EntityArena {
        let parser = NarrationParser::new();
        let mut arena = EntityArena::new(0.75);
        for t in transactions {
            let token = parser.parse(&t.narration, t.effective_channel());
            arena.observe(t.id, &token);
        }
        arena
    }

    /// Ten routine payments to one party, then a massive spike.
    fn spike_batch() -> Vec<Transaction> {
        let mut batch: Vec<Transaction> = (0..10)
            .map(|i| {
                txn(
                    i,
                    480.0 + 10.0 * i as f64,
                    "UPI/1001/RAVI KUMAR/OK",
                    1 + i as u32,
                )
            })
            .collect();
        batch.push(txn(10, 100_000.0, "UPI/9999/RAVI KUMAR/OK", 12));
        batch
    }

    #[test]
    fn test_spike_is_flagged() {
        let batch = spike_batch();
        let arena = resolve_all(&batch);
        let scores = score_batch(&batch, &arena, &AnalysisConfig::default());

        let spike = scores.iter().find(|s| s.txn_id == 10).unwrap();
        assert!(spike.behavioral > 0.9, "behavioral = {}", spike.behavioral);
        assert!(spike.mad > 0.9);
        assert!(spike.iqr > 0.9);
        assert!(spike.fraud_probability > 0.5);
        assert!(spike.flagged);
    }

    #[test]
    fn test_routine_transactions_not_flagged() {
        let batch = spike_batch();
        let arena = resolve_all(&batch);
        let scores = score_batch(&batch, &arena, &AnalysisConfig::default());

        let routine_flagged = scores
            .iter()
            .filter(|s| s.txn_id != 10 && s.flagged)
            .count();
        assert_eq!(routine_flagged, 0);
    }

    #[test]
    fn test_zero_history_neutral() {
        // One transaction per entity: no history anywhere.
        let batch = vec![
            txn(1, 500.0, "PAID TO ALPHA TRADING", 1),
            txn(2, 800.0, "PAID TO BRAVO METALS", 2),
        ];
        let arena = resolve_all(&batch);
        let scores = score_batch(&batch, &arena, &AnalysisConfig::default());

        for s in &scores {
            assert_eq!(s.mad, 0.5);
            assert_eq!(s.iqr, 0.5);
            assert_eq!(s.behavioral, 0.5);
            assert!(!s.neutral);
        }
    }

    #[test]
    fn test_probability_bounds() {
        let batch = spike_batch();
        let arena = resolve_all(&batch);
        let scores = score_batch(&batch, &arena, &AnalysisConfig::default());

        for s in &scores {
            for component in [
                s.isolation,
                s.reconstruction,
                s.mad,
                s.iqr,
                s.merchant_risk,
                s.behavioral,
                s.fraud_probability,
            ] {
                assert!((0.0..=1.0).contains(&component), "out of bounds: {s:?}");
            }
        }
    }

    #[test]
    fn test_malformed_gets_neutral_placeholder() {
        let mut batch = spike_batch();
        batch.push(txn(99, 0.0, "BROKEN ROW", 5));

        let arena = resolve_all(&batch);
        let scores = score_batch(&batch, &arena, &AnalysisConfig::default());

        assert_eq!(scores.len(), batch.len());
        let placeholder = scores.iter().find(|s| s.txn_id == 99).unwrap();
        assert!(placeholder.neutral);
        assert!(!placeholder.flagged);
        assert_eq!(placeholder.fraud_probability, 0.5);
    }

    #[test]
    fn test_scoring_is_deterministic() {
        let batch = spike_batch();
        let arena = resolve_all(&batch);
        let config = AnalysisConfig::default();

        let first = score_batch(&batch, &arena, &config);
        let second = score_batch(&batch, &arena, &config);
        for (a, b) in first.iter().zip(&second) {
            assert_eq!(a.fraud_probability, b.fraud_probability);
            assert_eq!(a.isolation, b.isolation);
        }
    }

    #[test]
    fn test_risk_keywords() {
        let batch = vec![
            txn(1, 500.0, "PAID TO LUCKY CASINO RESORT", 1),
            txn(2, 500.0, "PAID TO GROCERY MART", 1),
        ];
        let arena = resolve_all(&batch);
        let scores = score_batch(&batch, &arena, &AnalysisConfig::default());

        assert!(scores[0].merchant_risk > scores[1].merchant_risk);
        assert_eq!(scores[0].merchant_risk, 0.9);
    }

    fn entry(ordinal: i64, txn_id: u64, amount: f64, channel: Channel) -> HistoryEntry {
        HistoryEntry {
            ordinal,
            txn_id,
            amount,
            channel,
        }
    }

    #[test]
    fn test_mad_and_iqr_on_flat_history() {
        let history: Vec<HistoryEntry> = (0..5)
            .map(|i| entry(i, i as u64, 100.0, Channel::Upi))
            .collect();
        assert_eq!(mad_score(100.0, &history), 0.0);
        assert_eq!(mad_score(500.0, &history), 1.0);
        assert_eq!(iqr_score(100.0, &history), 0.0);
        assert_eq!(iqr_score(500.0, &history), 1.0);
    }

    #[test]
    fn test_tied_channel_history_scores_identically() {
        // Two channels tied at two entries each: the typical-channel pick
        // must not depend on hash-map iteration order.
        let history = vec![
            entry(1, 1, 500.0, Channel::Upi),
            entry(2, 2, 500.0, Channel::Neft),
            entry(3, 3, 510.0, Channel::Upi),
            entry(4, 4, 510.0, Channel::Neft),
        ];
        let current = txn(5, 505.0, "UPI/55/RAVI KUMAR/OK", 5);

        let first = behavioral_score(&current, &history);
        for _ in 0..50 {
            assert_eq!(behavioral_score(&current, &history), first);
        }
        // The tie resolves to the earliest-declared channel, which matches
        // this transaction's channel: no deviation at all.
        assert_eq!(first, 0.0);
    }

    #[test]
    fn test_same_day_duplicate_amounts_count_as_history() {
        // Two equal payments on the same day are distinct history entries;
        // only the transaction itself is excluded from its own history.
        let batch = vec![
            txn(1, 100.0, "UPI/1/RAVI KUMAR/OK", 1),
            txn(2, 100.0, "UPI/2/RAVI KUMAR/OK", 2),
            txn(3, 100.0, "UPI/3/RAVI KUMAR/OK", 3),
            txn(4, 100.0, "UPI/4/RAVI KUMAR/OK", 3),
        ];
        let arena = resolve_all(&batch);
        let scores = score_batch(&batch, &arena, &AnalysisConfig::default());

        // Transaction 4 sees three prior entries, including the same-day
        // same-amount twin, so its signals are informative rather than the
        // short-history neutral 0.5.
        let s = scores.iter().find(|s| s.txn_id == 4).unwrap();
        assert_eq!(s.mad, 0.0);
        assert_eq!(s.iqr, 0.0);
        assert_eq!(s.behavioral, 0.0);
    }

    #[test]
    fn test_spike_over_noisy_history() {
        use rand_distr::{Distribution, Normal};

        let mut rng = StdRng::seed_from_u64(7);
        let normal = Normal::<f64>::new(500.0, 50.0).unwrap();

        let mut batch: Vec<Transaction> = (0..30)
            .map(|i| {
                txn(
                    i,
                    normal.sample(&mut rng).max(1.0),
                    "UPI/1001/RAVI KUMAR/OK",
                    1 + (i % 28) as u32,
                )
            })
            .collect();
        batch.push(txn(30, 100_000.0, "UPI/9999/RAVI KUMAR/OK", 29));

        let arena = resolve_all(&batch);
        let scores = score_batch(&batch, &arena, &AnalysisConfig::default());

        let spike = scores.iter().find(|s| s.txn_id == 30).unwrap();
        assert!(spike.flagged);
        assert!(spike.fraud_probability > 0.5);
    }

    #[test]
    fn test_summary_counts() {
        let batch = spike_batch();
        let arena = resolve_all(&batch);
        let scores = score_batch(&batch, &arena, &AnalysisConfig::default());
        let summary = summarize(&scores);

        assert_eq!(summary.flagged_count, 1);
        assert!((summary.fraud_rate - 1.0 / 11.0).abs() < 1e-9);
    }
}
