//! Per-counterparty aggregation over the resolved transaction set.

use crate::entity::{EntityArena, EntityId, EntityKind};
use crate::transaction::Transaction;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Aggregate row for one canonical entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerRow {
    pub entity_id: EntityId,
    pub display_name: String,
    pub kind: EntityKind,
    pub total_credit: f64,
    pub total_debit: f64,
    /// Credits minus debits.
    pub net_flow: f64,
    pub transaction_count: usize,
    pub avg_transaction: f64,
    pub first_date: NaiveDate,
    pub last_date: NaiveDate,
    pub upi_handles: Vec<String>,
}

/// Recomputes the party ledger from scratch. Deterministic: the same
/// transactions and entity mapping always produce the identical row sequence,
/// sorted by absolute net flow descending with entity id breaking ties.
///
/// Malformed transactions and transactions with no resolved counterparty
/// contribute nothing.
pub fn build_ledger(transactions: &[Transaction], arena: &EntityArena) -> Vec<LedgerRow> {
    struct Accumulator {
        credit: f64,
        debit: f64,
        count: usize,
        first: NaiveDate,
        last: NaiveDate,
    }

    let mut rows: BTreeMap<EntityId, Accumulator> = BTreeMap::new();

    for txn in transactions {
        if !txn.is_well_formed() {
            continue;
        }
        let Some(entity_id) = arena.entity_of(txn.id) else {
            continue;
        };

        let acc = rows.entry(entity_id).or_insert(Accumulator {
            credit: 0.0,
            debit: 0.0,
            count: 0,
            first: txn.date,
            last: txn.date,
        });

        if txn.is_credit() {
            acc.credit += txn.amount.abs();
        } else {
            acc.debit += txn.amount.abs();
        }
        acc.count += 1;
        acc.first = acc.first.min(txn.date);
        acc.last = acc.last.max(txn.date);
    }

    let mut ledger: Vec<LedgerRow> = rows
        .into_iter()
        .map(|(entity_id, acc)| {
            let entity = arena.get(entity_id);
            let volume = acc.credit + acc.debit;
            LedgerRow {
                entity_id,
                display_name: entity.display_name.clone(),
                kind: entity.kind,
                total_credit: acc.credit,
                total_debit: acc.debit,
                net_flow: acc.credit - acc.debit,
                transaction_count: acc.count,
                avg_transaction: volume / acc.count.max(1) as f64,
                first_date: acc.first,
                last_date: acc.last,
                upi_handles: entity.upi_handles.iter().cloned().collect(),
            }
        })
        .collect();

    ledger.sort_by(|a, b| {
        b.net_flow
            .abs()
            .total_cmp(&a.net_flow.abs())
            .then(a.entity_id.cmp(&b.entity_id))
    });

    ledger
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::narration::NarrationParser;
    use crate::transaction::{Channel, Direction};

    fn txn(id: u64, amount: f64, direction: Direction, narration: &str, day: u32) -> Transaction {
        Transaction {
            id,
            source_file: "statement_a.pdf".to_string(),
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

    #[test]
    fn test_totals_and_net_flow_signs() {
        let transactions = vec![
            txn(1, 500.0, Direction::Credit, "PAID TO RAVI KUMAR", 1),
            txn(2, 200.0, Direction::Debit, "PAID TO RAVI KUMAR", 2),
            txn(3, 900.0, Direction::Debit, "PAID TO GUPTA HARDWARE", 3),
        ];
        let arena = resolve_all(&transactions);
        let ledger = build_ledger(&transactions, &arena);

        assert_eq!(ledger.len(), 2);

        // Gupta has |net| 900, Ravi |net| 300.
        assert_eq!(ledger[0].display_name, "GUPTA HARDWARE");
        assert_eq!(ledger[0].net_flow, -900.0);
        assert_eq!(ledger[1].display_name, "RAVI KUMAR");
        assert_eq!(ledger[1].total_credit, 500.0);
        assert_eq!(ledger[1].total_debit, 200.0);
        assert_eq!(ledger[1].net_flow, 300.0);
        assert_eq!(ledger[1].transaction_count, 2);
    }

    #[test]
    fn test_date_span_and_average() {
        let transactions = vec![
            txn(1, 100.0, Direction::Debit, "PAID TO RAVI KUMAR", 5),
            txn(2, 300.0, Direction::Debit, "PAID TO RAVI KUMAR", 9),
        ];
        let arena = resolve_all(&transactions);
        let ledger = build_ledger(&transactions, &arena);

        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger[0].first_date, NaiveDate::from_ymd_opt(2024, 3, 5).unwrap());
        assert_eq!(ledger[0].last_date, NaiveDate::from_ymd_opt(2024, 3, 9).unwrap());
        assert_eq!(ledger[0].avg_transaction, 200.0);
    }

    #[test]
    fn test_malformed_excluded() {
        let transactions = vec![
            txn(1, 100.0, Direction::Debit, "PAID TO RAVI KUMAR", 1),
            txn(2, 0.0, Direction::Debit, "PAID TO RAVI KUMAR", 2),
        ];
        let arena = resolve_all(&transactions);
        let ledger = build_ledger(&transactions, &arena);
        assert_eq!(ledger[0].transaction_count, 1);
    }

    #[test]
    fn test_recomputation_is_bit_identical() {
        let transactions = vec![
            txn(1, 512.33, Direction::Credit, "UPI/1122/STORE 42/OK", 1),
            txn(2, 512.33, Direction::Debit, "UPI/2211/STORE 17/OK", 2),
            txn(3, 90.0, Direction::Debit, "PAID TO GUPTA HARDWARE", 3),
        ];
        let arena = resolve_all(&transactions);

        let first = build_ledger(&transactions, &arena);
        let second = build_ledger(&transactions, &arena);

        let a = serde_json::to_string(&first).unwrap();
        let b = serde_json::to_string(&second).unwrap();
        assert_eq!(a, b);
    }
}
