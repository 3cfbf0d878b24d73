//! Extracts a raw counterparty token from a transaction narration.
//!
//! Narrations from Indian bank statements pack the counterparty into a
//! handful of structural formats (`UPI/REF/PARTY/STATUS`, `NEFT CR-REF-NAME`,
//! `PAID TO NAME`, ...). The parser tries an ordered list of pattern rules,
//! most specific first, and falls back to a keyword-stripping heuristic so it
//! never fails outright on a malformed narration.

use crate::transaction::Channel;
use regex::Regex;

/// Which family of pattern produced a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    UpiHandle,
    Merchant,
    BankRef,
    Phone,
    Unresolved,
}

/// A counterparty candidate pulled out of one narration.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RawPartyToken {
    /// Cleaned display text, uppercased with collapsed whitespace.
    pub text: String,
    pub kind: TokenKind,
    /// Set when the narration carried an explicit `name@bank` handle.
    pub upi_handle: Option<String>,
    /// Name of the rule that fired. Diagnostic only.
    pub rule: &'static str,
}

struct PatternRule {
    name: &'static str,
    kind: TokenKind,
    regex: Regex,
}

/// Well-known merchant aliases, canonicalized to one display name.
const MERCHANT_ALIASES: &[(&str, &str)] = &[
    ("AMZN", "AMAZON"),
    ("AMAZN", "AMAZON"),
    ("AMAZON", "AMAZON"),
    ("FLIP", "FLIPKART"),
    ("FLIPKART", "FLIPKART"),
    ("SWIGGY", "SWIGGY"),
    ("ZOMATO", "ZOMATO"),
    ("MYNTRA", "MYNTRA"),
    ("NYKAA", "NYKAA"),
    ("GPAY", "GPAY"),
    ("PHONEPE", "PHONEPE"),
    ("PAYTM", "PAYTM"),
    ("UBER", "UBER"),
    ("OLA", "OLA"),
    ("IRCTC", "IRCTC"),
    ("MAKEMYTRIP", "MAKE MY TRIP"),
];

/// Words that can never stand alone as a party name.
const NON_PARTY_WORDS: &[&str] = &[
    "DR",
    "CR",
    "TRF",
    "BY",
    "TO",
    "FROM",
    "PAID",
    "RECEIVED",
    "TRANSFER",
    "DEPOSIT",
    "WITHDRAWAL",
    "BALANCE",
    "CHARGES",
    "FEE",
    "UPI",
    "NEFT",
    "IMPS",
    "RTGS",
];

/// Transaction-type vocabulary stripped by the fallback heuristic.
const TRANSACTION_WORDS: &[&str] = &[
    "DEPOSIT",
    "WITHDRAWAL",
    "PAYMENT",
    "TRANSFER",
    "CREDIT",
    "DEBIT",
    "BALANCE",
    "CHARGES",
    "FEE",
    "TAX",
    "EMI",
    "BILL",
    "SALARY",
    "INTEREST",
    "DIVIDEND",
    "REFUND",
    "REVERSAL",
    "CLEARING",
    "CASH",
    "CHEQUE",
    "CHQ",
    "UPI",
    "NEFT",
    "IMPS",
    "RTGS",
    "POS",
    "ATM",
    "REF",
    "REFNO",
    "NO",
    "NUM",
    "BY",
    "TO",
    "FROM",
    "FOR",
    "AT",
    "ON",
    "CR",
    "DR",
    "OK",
    "TRF",
];

pub struct NarrationParser {
    rules: Vec<PatternRule>,
    handle_regex: Regex,
    phone_regex: Regex,
}

impl Default for NarrationParser {
    fn default() -> Self {
        Self::new()
    }
}

impl NarrationParser {
    /// Compiles the pattern table once. Rule order is the priority order:
    /// structural UPI and bank-reference formats strictly before the generic
    /// merchant/phone fallbacks, so a UPI handle embedded in a narration is
    /// never misread as a merchant keyword.
    pub fn new() -> Self {
        let rules = vec![
            rule(
                "upi_segmented_status",
                TokenKind::UpiHandle,
                r"UPI/(?:(?:CR|DR)/)?\d+/([A-Z][A-Z0-9 .]*?)/(?:OK|FAIL|PA|BI|AX|PASS)",
            ),
            rule(
                "upi_segmented",
                TokenKind::UpiHandle,
                r"UPI/(?:(?:CR|DR)/)?\d+/([A-Z][A-Z0-9 .]+)$",
            ),
            rule(
                "upi_dashed",
                TokenKind::UpiHandle,
                r"UPI-(?:(?:CR|DR)-)?(?:\d+-)?([A-Z][A-Z0-9 .]*?)(?:-(?:OK|FAIL|PA|BI))?$",
            ),
            rule(
                "upi_to_from",
                TokenKind::UpiHandle,
                r"UPI[/\s]+(?:FROM|TO|BY)[/\s]+([A-Z][A-Z ]{2,}?)(?:/|$)",
            ),
            rule(
                "bank_ref_structured",
                TokenKind::BankRef,
                r"(?:NEFT|RTGS|IMPS)\s+(?:CR|DR)[-\s]+[A-Z0-9]+[-\s]+([A-Z][A-Z ]+?)(?:-|$)",
            ),
            rule(
                "bank_ref_loose",
                TokenKind::BankRef,
                r"(?:NEFT|RTGS|IMPS)[/\s]+(?:(?:FROM|TO|TRANSFER|TRF)[/\s]+)?([A-Z][A-Z ]{2,})",
            ),
            rule(
                "transfer_phrase",
                TokenKind::BankRef,
                r"(?:PAID\s+TO|RECEIVED\s+FROM|TRF\s+(?:TO|FROM)|TRANSFER\s+(?:TO|FROM))[:\s]+([A-Z][A-Z ]{2,})",
            ),
            rule(
                "cheque",
                TokenKind::BankRef,
                r"(?:CHEQUE|CHQ)(?:\s+NO[:\s]*\d+)?(?:\s+DRAWN\s+ON)?[\s:,-]+([A-Z][A-Z ]{2,})",
            ),
            rule(
                "cash",
                TokenKind::BankRef,
                r"CASH\s+(?:DEPOSIT|WITHDRAWAL)\s+(?:AT|BY)[\s:-]*([A-Z][A-Z ]{2,})",
            ),
        ];

        Self {
            rules,
            handle_regex: Regex::new(r"([A-Z0-9._-]+@[A-Z]+)").expect("valid handle pattern"),
            phone_regex: Regex::new(r"\b(\d{10})\b").expect("valid phone pattern"),
        }
    }

    /// Extracts a party token from one narration. Never errors: the worst
    /// case is an `Unresolved` token carrying the cleaned narration.
    pub fn parse(&self, narration: &str, _channel_hint: Channel) -> RawPartyToken {
        let upper = narration.to_uppercase();
        let upper = upper.trim();

        // Explicit name@bank handles outrank everything else: they are the
        // only token kind with an exact-key identity.
        if let Some(caps) = self.handle_regex.captures(upper) {
            let handle = caps[1].to_lowercase();
            let display = clean_party_name(handle.split('@').next().unwrap_or(&handle));
            let text = if display.is_empty() {
                handle.clone()
            } else {
                display
            };
            return RawPartyToken {
                text,
                kind: TokenKind::UpiHandle,
                upi_handle: Some(handle),
                rule: "upi_handle",
            };
        }

        for r in &self.rules {
            if let Some(caps) = r.regex.captures(upper) {
                if let Some(m) = caps.get(1) {
                    let candidate = clean_party_name(m.as_str());
                    if is_plausible_party(&candidate) {
                        log::debug!("narration rule {} matched: {:?}", r.name, candidate);
                        return RawPartyToken {
                            text: candidate,
                            kind: r.kind,
                            upi_handle: None,
                            rule: r.name,
                        };
                    }
                }
            }
        }

        // Merchant keyword table, tried after the structural formats.
        if let Some(merchant) = find_known_merchant(upper) {
            return RawPartyToken {
                text: merchant.to_string(),
                kind: TokenKind::Merchant,
                upi_handle: None,
                rule: "merchant_keyword",
            };
        }

        // Bare mobile numbers, strictly after the merchant table: a known
        // merchant narration carrying a reference number is not a phone.
        if let Some(caps) = self.phone_regex.captures(upper) {
            return RawPartyToken {
                text: caps[1].to_string(),
                kind: TokenKind::Phone,
                upi_handle: None,
                rule: "phone",
            };
        }

        // Generic heuristic: strip transaction vocabulary and reference
        // codes, keep the leading meaningful words.
        if let Some(candidate) = heuristic_extract(upper) {
            return RawPartyToken {
                text: candidate,
                kind: TokenKind::Unresolved,
                upi_handle: None,
                rule: "heuristic",
            };
        }

        RawPartyToken {
            text: clean_party_name(upper),
            kind: TokenKind::Unresolved,
            upi_handle: None,
            rule: "fallback",
        }
    }
}

fn rule(name: &'static str, kind: TokenKind, pattern: &str) -> PatternRule {
    PatternRule {
        name,
        kind,
        regex: Regex::new(pattern).expect("valid narration pattern"),
    }
}

/// Uppercases, collapses separators to spaces, and trims filler prefixes.
/// Digits are kept: branch numbers are part of real names.
fn clean_party_name(raw: &str) -> String {
    let upper = raw.to_uppercase();
    let spaced: String = upper
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == ' ' {
                c
            } else {
                ' '
            }
        })
        .collect();

    let words: Vec<&str> = spaced.split_whitespace().collect();
    let start = words
        .iter()
        .position(|w| !matches!(*w, "TO" | "FROM" | "FOR" | "AT" | "ON" | "BY" | "REF" | "NEW"))
        .unwrap_or(words.len());

    words[start..].join(" ")
}

fn is_plausible_party(candidate: &str) -> bool {
    candidate.len() >= 2
        && !NON_PARTY_WORDS.contains(&candidate)
        && candidate.chars().any(|c| c.is_ascii_alphabetic())
}

fn find_known_merchant(narration: &str) -> Option<&'static str> {
    MERCHANT_ALIASES
        .iter()
        .find(|(alias, _)| narration.contains(alias))
        .map(|(_, canonical)| *canonical)
}

fn heuristic_extract(narration: &str) -> Option<String> {
    let cleaned = clean_party_name(narration);

    let meaningful: Vec<&str> = cleaned
        .split_whitespace()
        .filter(|w| w.len() > 2)
        .filter(|w| !w.chars().all(|c| c.is_ascii_digit()))
        .filter(|w| !TRANSACTION_WORDS.contains(w))
        .collect();

    if meaningful.is_empty() {
        return None;
    }

    let candidate = meaningful
        .iter()
        .take(3)
        .copied()
        .collect::<Vec<_>>()
        .join(" ");

    if is_plausible_party(&candidate) {
        Some(candidate)
    } else {
        None
    }
}
