//! Assembles pairwise fund-flow matches into multi-hop chains.
//!
//! A match moves money from a debit leg in one account to a credit leg in
//! another. Two matches concatenate when the credit leg of the first and the
//! debit leg of the second sit in the same statement file, close in date and
//! amount: money arrived and was passed on. Traversal starts at matches with
//! no such predecessor, keeps a per-path visited set so no transaction id
//! repeats, and each match lands in exactly one chain.

use crate::config::AnalysisConfig;
use crate::entity::EntityArena;
use crate::matcher::FlowMatch;
use crate::transaction::Transaction;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// A directed money-movement path with weakest-link confidence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowChain {
    pub chain_id: String,
    pub edges: Vec<FlowMatch>,
    /// Every transaction on the path, in traversal order. Guaranteed free of
    /// repeats.
    pub transaction_ids: Vec<u64>,
    /// Display path through the resolved counterparties, e.g. "A -> B -> C".
    pub flow_path: String,
    /// Minimum edge confidence along the path.
    pub confidence: f64,
    /// Sum of the matched amounts along the path.
    pub total_amount: f64,
    /// Number of transactions on the path.
    pub depth: usize,
    /// Edges whose legs came from different statement files.
    pub cross_file_links: usize,
}

/// Digest rows for the report layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainDigest {
    pub chain_id: String,
    pub flow_path: String,
    pub total_amount: f64,
    pub confidence: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainSummary {
    pub total_chains: usize,
    pub total_amount: f64,
    pub avg_chain_length: f64,
    pub max_chain_depth: usize,
    pub cross_file_links: usize,
    pub top_chains: Vec<ChainDigest>,
}

pub struct ChainBuilder<'a> {
    transactions: HashMap<u64, &'a Transaction>,
    arena: &'a EntityArena,
    config: &'a AnalysisConfig,
}

impl<'a> ChainBuilder<'a> {
    pub fn new(
        transactions: &'a [Transaction],
        arena: &'a EntityArena,
        config: &'a AnalysisConfig,
    ) -> Self {
        Self {
            transactions: transactions.iter().map(|t| (t.id, t)).collect(),
            arena,
            config,
        }
    }

    /// Builds all chains from the match set. Output is sorted by descending
    /// chain confidence, then descending total amount.
    pub fn build(&self, matches: &[FlowMatch]) -> Vec<FlowChain> {
        // Deterministic edge order: strongest first, ids break ties.
        let mut ordered: Vec<&FlowMatch> = matches.iter().collect();
        ordered.sort_by(|a, b| {
            b.confidence
                .total_cmp(&a.confidence)
                .then(a.source_id.cmp(&b.source_id))
                .then(a.target_id.cmp(&b.target_id))
        });

        let has_predecessor: HashSet<usize> = (0..ordered.len())
            .filter(|&i| {
                ordered
                    .iter()
                    .enumerate()
                    .any(|(j, prev)| j != i && self.continues(prev, ordered[i]))
            })
            .collect();

        let mut consumed = vec![false; ordered.len()];
        let mut chains = Vec::new();

        // Forward traversal from matches with no matched predecessor.
        for start in 0..ordered.len() {
            if consumed[start] || has_predecessor.contains(&start) {
                continue;
            }
            chains.push(self.walk(start, &ordered, &mut consumed));
        }

        // Matches whose predecessor chain branched elsewhere still surface,
        // as their own (possibly multi-hop) chain.
        for start in 0..ordered.len() {
            if !consumed[start] {
                chains.push(self.walk(start, &ordered, &mut consumed));
            }
        }

        chains.sort_by(|a, b| {
            b.confidence
                .total_cmp(&a.confidence)
                .then(b.total_amount.total_cmp(&a.total_amount))
        });

        for (i, chain) in chains.iter_mut().enumerate() {
            chain.chain_id = format!("chain_{i}");
        }

        log::debug!("built {} chains from {} matches", chains.len(), matches.len());
        chains
    }

    /// Extends a path edge-by-edge from `start`, guarding against revisits.
    fn walk(&self, start: usize, ordered: &[&FlowMatch], consumed: &mut [bool]) -> FlowChain {
        let mut edges: Vec<FlowMatch> = Vec::new();
        let mut path: Vec<u64> = Vec::new();
        let mut visited: HashSet<u64> = HashSet::new();

        let first = ordered[start];
        consumed[start] = true;
        path.push(first.source_id);
        visited.insert(first.source_id);
        path.push(first.target_id);
        visited.insert(first.target_id);
        edges.push(first.clone());

        let mut current = first;
        while let Some(j) = self.next_hop(ordered, consumed, &visited, current) {
            let edge = ordered[j];
            consumed[j] = true;
            path.push(edge.source_id);
            visited.insert(edge.source_id);
            path.push(edge.target_id);
            visited.insert(edge.target_id);
            edges.push(edge.clone());
            current = edge;
        }

        self.finish_chain(edges, path)
    }

    fn next_hop(
        &self,
        ordered: &[&FlowMatch],
        consumed: &[bool],
        visited: &HashSet<u64>,
        from: &FlowMatch,
    ) -> Option<usize> {
        (0..ordered.len()).find(|&j| {
            !consumed[j]
                && self.continues(from, ordered[j])
                && !visited.contains(&ordered[j].source_id)
                && !visited.contains(&ordered[j].target_id)
                && ordered[j].confidence >= self.config.min_match_confidence
        })
    }

    /// Whether `next` plausibly carries on the money received by `prev`:
    /// same statement file on the joining legs, onward debit no earlier than
    /// the credit and within the date window, amount within tolerance.
    fn continues(&self, prev: &FlowMatch, next: &FlowMatch) -> bool {
        let (Some(credit), Some(debit)) = (
            self.transactions.get(&prev.target_id),
            self.transactions.get(&next.source_id),
        ) else {
            return false;
        };

        if credit.id == debit.id || credit.source_file != debit.source_file {
            return false;
        }

        let gap = (debit.date - credit.date).num_days();
        if gap < 0 || gap > self.config.date_window_days {
            return false;
        }

        (prev.amount - next.amount).abs() <= self.config.amount_tolerance
    }

    fn finish_chain(&self, edges: Vec<FlowMatch>, path: Vec<u64>) -> FlowChain {
        let confidence = edges
            .iter()
            .map(|e| e.confidence)
            .fold(f64::INFINITY, f64::min);
        let total_amount = edges.iter().map(|e| e.amount).sum();
        let cross_file_links = edges.iter().filter(|e| e.cross_file).count();

        let flow_path = path
            .iter()
            .map(|id| self.party_label(*id))
            .collect::<Vec<_>>()
            .join(" -> ");

        FlowChain {
            chain_id: String::new(),
            depth: path.len(),
            transaction_ids: path,
            flow_path,
            confidence,
            total_amount,
            cross_file_links,
            edges,
        }
    }

    fn party_label(&self, txn_id: u64) -> String {
        self.arena
            .entity_of(txn_id)
            .map(|id| self.arena.get(id).display_name.clone())
            .unwrap_or_else(|| "UNKNOWN".to_string())
    }
}

/// Aggregates the chain set for the report layer.
pub fn summarize(chains: &[FlowChain]) -> ChainSummary {
    if chains.is_empty() {
        return ChainSummary {
            total_chains: 0,
            total_amount: 0.0,
            avg_chain_length: 0.0,
            max_chain_depth: 0,
            cross_file_links: 0,
            top_chains: Vec::new(),
        };
    }

    let total_amount = chains.iter().map(|c| c.total_amount).sum();
    let max_chain_depth = chains.iter().map(|c| c.depth).max().unwrap_or(0);
    let cross_file_links = chains.iter().map(|c| c.cross_file_links).sum();
    let avg_chain_length =
        chains.iter().map(|c| c.depth).sum::<usize>() as f64 / chains.len() as f64;

    let mut by_amount: Vec<&FlowChain> = chains.iter().collect();
    by_amount.sort_by(|a, b| b.total_amount.total_cmp(&a.total_amount));
    let top_chains = by_amount
        .iter()
        .take(10)
        .map(|c| ChainDigest {
            chain_id: c.chain_id.clone(),
            flow_path: c.flow_path.clone(),
            total_amount: c.total_amount,
            confidence: c.confidence,
        })
        .collect();

    ChainSummary {
        total_chains: chains.len(),
        total_amount,
        avg_chain_length,
        max_chain_depth,
        cross_file_links,
        top_chains,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::find_matches;
    use crate::narration::NarrationParser;
    use crate::transaction::{Channel, Direction};
    use chrono::NaiveDate;

    fn txn(
        id: u64,
        amount: f64,
        direction: Direction,
        narration: &str,
        day: u32,
        file: &str,
    ) -> Transaction {
        Transaction {
            id,
            source_file: file.to_string(),
            date: NaiveDate::from_ymd_opt(2024, 3, day).unwrap(),
            amount,
            direction,
            narration: narration.to_string(),
            channel: Channel::Unknown,
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

    fn relay_batch() -> Vec<Transaction> {
        vec![
            txn(1, 1000.0, Direction::Debit, "PAID TO BHARAT METALS", 1, "a.pdf"),
            txn(2, 1000.0, Direction::Credit, "RECEIVED FROM ALPHA CORP", 1, "b.pdf"),
            txn(3, 1000.0, Direction::Debit, "PAID TO CHARLIE FOODS", 2, "b.pdf"),
            txn(4, 1000.0, Direction::Credit, "RECEIVED FROM BHARAT METALS", 2, "c.pdf"),
        ]
    }

    #[test]
    fn test_multi_hop_chain() {
        let transactions = relay_batch();
        let config = AnalysisConfig::default();
        let arena = resolve_all(&transactions);
        let matches = find_matches(&transactions, &arena, &config);

        let chains = ChainBuilder::new(&transactions, &arena, &config).build(&matches);
        assert!(!chains.is_empty());

        // The relay a.pdf -> b.pdf -> c.pdf must come out as one path
        // through all four transactions.
        assert_eq!(chains[0].transaction_ids, vec![1, 2, 3, 4]);
        assert_eq!(chains[0].depth, 4);
        assert_eq!(chains[0].edges.len(), 2);
        assert_eq!(chains[0].cross_file_links, 2);
        assert!(chains[0].flow_path.contains(" -> "));
    }

    #[test]
    fn test_weakest_link_confidence() {
        let transactions = relay_batch();
        let config = AnalysisConfig::default();
        let arena = resolve_all(&transactions);
        let matches = find_matches(&transactions, &arena, &config);

        let chains = ChainBuilder::new(&transactions, &arena, &config).build(&matches);
        for chain in &chains {
            let min_edge = chain
                .edges
                .iter()
                .map(|e| e.confidence)
                .fold(f64::INFINITY, f64::min);
            assert_eq!(chain.confidence, min_edge);
        }
    }

    #[test]
    fn test_no_transaction_repeats_within_chain() {
        // Same-day legs in both directions would cycle without the guard.
        let transactions = vec![
            txn(1, 700.0, Direction::Debit, "PAID TO BHARAT METALS", 1, "a.pdf"),
            txn(2, 700.0, Direction::Credit, "RECEIVED FROM ALPHA CORP", 1, "b.pdf"),
            txn(3, 700.0, Direction::Debit, "PAID TO DELTA MOTORS", 1, "b.pdf"),
            txn(4, 700.0, Direction::Credit, "RECEIVED FROM ECHO STEEL", 1, "a.pdf"),
        ];
        let config = AnalysisConfig::default();
        let arena = resolve_all(&transactions);
        let matches = find_matches(&transactions, &arena, &config);

        let chains = ChainBuilder::new(&transactions, &arena, &config).build(&matches);
        for chain in &chains {
            let mut seen = HashSet::new();
            for id in &chain.transaction_ids {
                assert!(seen.insert(*id), "transaction {id} repeated in chain");
            }
        }
    }

    #[test]
    fn test_isolated_match_is_length_one_chain() {
        let transactions = vec![
            txn(1, 500.0, Direction::Debit, "PAID TO RAVI KUMAR", 1, "a.pdf"),
            txn(2, 500.0, Direction::Credit, "UPI/777/y@bank", 1, "b.pdf"),
        ];
        let config = AnalysisConfig::default();
        let arena = resolve_all(&transactions);
        let matches = find_matches(&transactions, &arena, &config);
        assert_eq!(matches.len(), 1);

        let chains = ChainBuilder::new(&transactions, &arena, &config).build(&matches);
        assert_eq!(chains.len(), 1);
        assert_eq!(chains[0].edges.len(), 1);
        assert_eq!(chains[0].chain_id, "chain_0");
        assert_eq!(chains[0].depth, 2);
    }

    #[test]
    fn test_chains_sorted_by_confidence_then_amount() {
        let transactions = vec![
            // Strong pair: exact amount, same day.
            txn(1, 900.0, Direction::Debit, "PAID TO BHARAT METALS", 1, "a.pdf"),
            txn(2, 900.0, Direction::Credit, "RECEIVED FROM ALPHA CORP", 1, "b.pdf"),
            // Weaker pair: amount off by one currency unit.
            txn(3, 300.0, Direction::Debit, "PAID TO DELTA MOTORS", 5, "a.pdf"),
            txn(4, 301.0, Direction::Credit, "RECEIVED FROM ECHO STEEL", 5, "b.pdf"),
        ];
        let config = AnalysisConfig::default();
        let arena = resolve_all(&transactions);
        let matches = find_matches(&transactions, &arena, &config);
        assert_eq!(matches.len(), 2);

        let chains = ChainBuilder::new(&transactions, &arena, &config).build(&matches);
        assert_eq!(chains.len(), 2);
        assert!(chains[0].confidence >= chains[1].confidence);
        assert_eq!(chains[0].transaction_ids, vec![1, 2]);
    }

    #[test]
    fn test_summary() {
        let transactions = relay_batch();
        let config = AnalysisConfig::default();
        let arena = resolve_all(&transactions);
        let matches = find_matches(&transactions, &arena, &config);
        let chains = ChainBuilder::new(&transactions, &arena, &config).build(&matches);

        let summary = summarize(&chains);
        assert_eq!(summary.total_chains, chains.len());
        assert_eq!(summary.max_chain_depth, 4);
        assert!(summary.cross_file_links >= 2);
        assert!(!summary.top_chains.is_empty());

        let empty = summarize(&[]);
        assert_eq!(empty.total_chains, 0);
        assert_eq!(empty.total_amount, 0.0);
    }
}
