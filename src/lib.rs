//! # Fund Flow Engine
//!
//! A library for resolving counterparty entities out of noisy bank-statement
//! narrations and correlating money movement across accounts.
//!
//! ## Core Concepts
//!
//! - **Narration Parsing**: Extracts a counterparty candidate from free-text
//!   transaction narrations (UPI, NEFT/RTGS/IMPS, cheque, cash)
//! - **Entity Resolution**: Clusters name variants of the same real-world
//!   party into one canonical entity via exact keys and fuzzy merging
//! - **Party Ledger**: Per-entity aggregates (credit, debit, net flow)
//! - **Fund-Flow Matching**: Pairs debit legs with candidate credit legs by
//!   amount, date proximity, and narration similarity
//! - **Chain Building**: Concatenates matches into multi-hop transfer chains
//!   with weakest-link confidence
//! - **Anomaly Scoring**: An ensemble of statistical and learned signals
//!   producing one fraud probability per transaction
//!
//! ## Example
//!
//! ```rust,ignore
//! use fund_flow_engine::*;
//! use chrono::NaiveDate;
//!
//! let transactions = vec![
//!     Transaction {
//!         id: 1,
//!         source_file: "statement_a.pdf".to_string(),
//!         date: NaiveDate::from_ymd_opt(2024, 3, 5).unwrap(),
//!         amount: 500.0,
//!         direction: Direction::Debit,
//!         narration: "UPI/4412/JOHN DOE/OK".to_string(),
//!         channel: Channel::Upi,
//!         category: None,
//!     },
//!     Transaction {
//!         id: 2,
//!         source_file: "statement_b.pdf".to_string(),
//!         date: NaiveDate::from_ymd_opt(2024, 3, 5).unwrap(),
//!         amount: 500.0,
//!         direction: Direction::Credit,
//!         narration: "UPI/4412/sender@okbank".to_string(),
//!         channel: Channel::Upi,
//!         category: None,
//!     },
//! ];
//!
//! let report = analyze_transactions(&transactions, &AnalysisConfig::default()).unwrap();
//! assert!(!report.matches.is_empty());
//! ```

pub mod anomaly;
pub mod chain;
pub mod config;
pub mod entity;
pub mod error;
pub mod ledger;
pub mod matcher;
pub mod narration;
pub mod similarity;
pub mod transaction;

pub use anomaly::{AnomalyScore, AnomalySummary};
pub use chain::{ChainBuilder, ChainDigest, ChainSummary, FlowChain};
pub use config::{AnalysisConfig, EnsembleWeights, MatchWeights};
pub use entity::{CanonicalEntity, EntityArena, EntityId, EntityKind};
pub use error::{FundFlowError, Result};
pub use ledger::{build_ledger, LedgerRow};
pub use matcher::{best_match_per_source, find_matches, FlowMatch};
pub use narration::{NarrationParser, RawPartyToken, TokenKind};
pub use similarity::{comparison_key, name_similarity};
pub use transaction::{Channel, Direction, Transaction};

use log::{debug, info};
use serde::{Deserialize, Serialize};

/// Everything one analysis pass produces for a batch of transactions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub ledger: Vec<LedgerRow>,
    pub matches: Vec<FlowMatch>,
    pub chains: Vec<FlowChain>,
    pub chain_summary: ChainSummary,
    pub scores: Vec<AnomalyScore>,
    pub anomaly_summary: AnomalySummary,
    /// Live canonical entities after all merges.
    pub entity_count: usize,
    /// Transactions whose narration yielded no usable counterparty.
    pub unresolved_count: usize,
}

pub struct AnalysisEngine {
    config: AnalysisConfig,
    parser: NarrationParser,
}

impl AnalysisEngine {
    /// Validates the configuration up front so a bad config fails the whole
    /// run instead of producing a partial report.
    pub fn new(config: AnalysisConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            parser: NarrationParser::new(),
        })
    }

    pub fn analyze(&self, transactions: &[Transaction]) -> Result<AnalysisReport> {
        info!("Analyzing batch of {} transactions", transactions.len());

        let (arena, unresolved_count) = self.resolve_entities(transactions);
        debug!(
            "Resolved {} live entities ({} narrations unresolved)",
            arena.live_count(),
            unresolved_count
        );

        let ledger = build_ledger(transactions, &arena);

        let matches = find_matches(transactions, &arena, &self.config);
        debug!("Found {} candidate fund-flow matches", matches.len());

        let chains = ChainBuilder::new(transactions, &arena, &self.config).build(&matches);
        let chain_summary = chain::summarize(&chains);

        let scores = anomaly::score_batch(transactions, &arena, &self.config);
        let anomaly_summary = anomaly::summarize(&scores);
        info!(
            "Flagged {} of {} transactions as anomalous",
            anomaly_summary.flagged_count,
            scores.len()
        );

        Ok(AnalysisReport {
            ledger,
            matches,
            chains,
            chain_summary,
            scores,
            anomaly_summary,
            entity_count: arena.live_count(),
            unresolved_count,
        })
    }

    fn resolve_entities(&self, transactions: &[Transaction]) -> (EntityArena, usize) {
        let mut arena = EntityArena::new(self.config.merge_threshold);
        let mut unresolved_count = 0;

        for txn in transactions.iter().filter(|t| t.is_well_formed()) {
            let token = self.parser.parse(&txn.narration, txn.effective_channel());
            // The fallback rule fires only when nothing usable was found;
            // its residue would otherwise mint junk entities.
            if token.text.is_empty() || token.rule == "fallback" {
                unresolved_count += 1;
                continue;
            }
            arena.observe(txn.id, &token);
        }

        (arena, unresolved_count)
    }
}

/// Runs the full pipeline with the given configuration.
pub fn analyze_transactions(
    transactions: &[Transaction],
    config: &AnalysisConfig,
) -> Result<AnalysisReport> {
    AnalysisEngine::new(config.clone())?.analyze(transactions)
}
