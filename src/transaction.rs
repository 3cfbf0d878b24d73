use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Whether a ledger line moves money into or out of the statement account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Credit,
    Debit,
}

/// Payment channel detected for a transaction.
///
/// Declaration order doubles as the tie-break order wherever scoring needs a
/// deterministic pick among equally frequent channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Upi,
    Neft,
    Imps,
    Rtgs,
    Cheque,
    Cash,
    Unknown,
}

impl Channel {
    /// Keyword scan over the narration, used when the upstream parser did not
    /// tag a channel itself.
    pub fn detect(narration: &str) -> Channel {
        let upper = narration.to_uppercase();
        if upper.contains("UPI") || upper.contains('@') {
            Channel::Upi
        } else if upper.contains("NEFT") {
            Channel::Neft
        } else if upper.contains("IMPS") {
            Channel::Imps
        } else if upper.contains("RTGS") {
            Channel::Rtgs
        } else if upper.contains("CHEQUE") || upper.contains("CHQ") {
            Channel::Cheque
        } else if upper.contains("CASH") {
            Channel::Cash
        } else {
            Channel::Unknown
        }
    }

    /// Channels that represent an account-to-account movement rather than a
    /// point-of-sale spend.
    pub fn is_transfer(&self) -> bool {
        matches!(
            self,
            Channel::Upi | Channel::Neft | Channel::Imps | Channel::Rtgs
        )
    }
}

/// One statement line, as supplied by the parsing collaborator.
///
/// `amount` is stored as an absolute value; the sign lives in `direction`.
/// The record is read-only to the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    /// Unique within one batch.
    pub id: u64,
    /// Which uploaded statement this line came from.
    pub source_file: String,
    pub date: NaiveDate,
    pub amount: f64,
    pub direction: Direction,
    pub narration: String,
    pub channel: Channel,
    pub category: Option<String>,
}

impl Transaction {
    pub fn is_credit(&self) -> bool {
        self.direction == Direction::Credit
    }

    pub fn is_debit(&self) -> bool {
        self.direction == Direction::Debit
    }

    /// Signed amount: credits positive, debits negative.
    pub fn signed_amount(&self) -> f64 {
        match self.direction {
            Direction::Credit => self.amount.abs(),
            Direction::Debit => -self.amount.abs(),
        }
    }

    /// The channel as tagged upstream, falling back to narration keywords
    /// when the collaborator passed `Unknown`.
    pub fn effective_channel(&self) -> Channel {
        if self.channel == Channel::Unknown {
            Channel::detect(&self.narration)
        } else {
            self.channel
        }
    }

    /// A line with a zero or non-finite amount cannot participate in matching
    /// or ledger totals. It still receives a neutral anomaly placeholder so
    /// the batch never fails on one bad row.
    pub fn is_well_formed(&self) -> bool {
        self.amount.is_finite() && self.amount.abs() > 0.0
    }
}
