//! Tag=value message decoder
//!
//! Decodes one datagram payload into a `MarketUpdate`. Fields are separated
//! by SOH (0x01) and each field is `TAG=VALUE`. Only message type (35),
//! symbol (55), entry type (269), price (270) and size (271) are
//! interpreted; everything else is skipped.
//!
//! Price and size are qualified by the entry type that precedes them in
//! field order, so decoding walks the fields sequentially through an
//! `EntryContext` state machine rather than doing keyed lookups.
//!
//! Decoding never fails: malformed fields are skipped and reported as
//! `DecodeWarning`s on the returned update, leaving other fields intact.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Field separator (Start of Heading).
pub const SOH: u8 = 0x01;

/// Visible delimiter substituted for SOH in `raw_text`.
pub const RAW_DELIMITER: char = '|';

pub const TAG_MSG_TYPE: &str = "35";
pub const TAG_SYMBOL: &str = "55";
pub const TAG_ENTRY_TYPE: &str = "269";
pub const TAG_ENTRY_PRICE: &str = "270";
pub const TAG_ENTRY_SIZE: &str = "271";

/// Book side an entry applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Bid,
    Ask,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Bid => write!(f, "bid"),
            Side::Ask => write!(f, "ask"),
        }
    }
}

/// Entry-type qualifier in effect while walking the fields.
///
/// Starts `Unset`; only tag 269 moves it. `"0"` selects the bid, `"1"` the
/// ask, and any other value drops back to `Unset` so that the price/size
/// tags following it are ignored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EntryContext {
    #[default]
    Unset,
    Bid,
    Ask,
}

impl EntryContext {
    /// Transition on an entry-type (269) value.
    pub fn on_entry_type(self, value: &str) -> Self {
        match value {
            "0" => EntryContext::Bid,
            "1" => EntryContext::Ask,
            _ => EntryContext::Unset,
        }
    }

    /// Side that price/size tags are attributed to, if any.
    pub fn side(self) -> Option<Side> {
        match self {
            EntryContext::Unset => None,
            EntryContext::Bid => Some(Side::Bid),
            EntryContext::Ask => Some(Side::Ask),
        }
    }
}

/// Non-fatal problem found while decoding a datagram.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
pub enum DecodeWarning {
    #[error("malformed field '{0}'")]
    MalformedField(String),

    #[error("invalid {side} price '{value}'")]
    InvalidPrice { side: Side, value: String },

    #[error("invalid {side} size '{value}'")]
    InvalidSize { side: Side, value: String },

    #[error("payload is not valid UTF-8")]
    InvalidUtf8,
}

/// One decoded market-data update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketUpdate {
    pub message_type: Option<String>,
    pub symbol: Option<String>,
    pub bid_price: f64,
    pub bid_size: i64,
    pub ask_price: f64,
    pub ask_size: i64,
    /// Present iff both prices are positive.
    pub mid_price: Option<f64>,
    /// Original payload with separators shown as `|`.
    pub raw_text: String,
    pub warnings: Vec<DecodeWarning>,
}

impl MarketUpdate {
    fn empty(raw_text: String) -> Self {
        Self {
            message_type: None,
            symbol: None,
            bid_price: 0.0,
            bid_size: 0,
            ask_price: 0.0,
            ask_size: 0,
            mid_price: None,
            raw_text,
            warnings: Vec::new(),
        }
    }

    /// Whether both a bid and an ask price were decoded.
    pub fn is_two_sided(&self) -> bool {
        self.bid_price > 0.0 && self.ask_price > 0.0
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    fn apply_price(&mut self, side: Side, value: &str) {
        match value.trim().parse::<f64>() {
            Ok(price) => match side {
                Side::Bid => self.bid_price = price,
                Side::Ask => self.ask_price = price,
            },
            Err(_) => self.warnings.push(DecodeWarning::InvalidPrice {
                side,
                value: value.to_string(),
            }),
        }
    }

    fn apply_size(&mut self, side: Side, value: &str) {
        match value.trim().parse::<i64>() {
            Ok(size) => match side {
                Side::Bid => self.bid_size = size,
                Side::Ask => self.ask_size = size,
            },
            Err(_) => self.warnings.push(DecodeWarning::InvalidSize {
                side,
                value: value.to_string(),
            }),
        }
    }
}

/// Compute the mid price of a quote; defined only when both sides are
/// strictly positive.
pub fn mid_price(bid: f64, ask: f64) -> Option<f64> {
    if bid > 0.0 && ask > 0.0 {
        Some((bid + ask) / 2.0)
    } else {
        None
    }
}

/// Decode one datagram payload.
pub fn decode(payload: &[u8]) -> MarketUpdate {
    let (text, lossy) = match std::str::from_utf8(payload) {
        Ok(text) => (std::borrow::Cow::Borrowed(text), false),
        Err(_) => (String::from_utf8_lossy(payload), true),
    };

    let raw_text: String = text
        .chars()
        .map(|c| if c == SOH as char { RAW_DELIMITER } else { c })
        .collect();

    let mut update = MarketUpdate::empty(raw_text);
    if lossy {
        update.warnings.push(DecodeWarning::InvalidUtf8);
    }

    let mut context = EntryContext::Unset;

    for field in text.split(SOH as char) {
        if field.is_empty() {
            continue;
        }
        let Some((tag, value)) = field.split_once('=') else {
            update
                .warnings
                .push(DecodeWarning::MalformedField(field.to_string()));
            continue;
        };

        match tag {
            TAG_MSG_TYPE => update.message_type = Some(value.to_string()),
            TAG_SYMBOL => update.symbol = Some(value.to_string()),
            TAG_ENTRY_TYPE => context = context.on_entry_type(value),
            TAG_ENTRY_PRICE => {
                if let Some(side) = context.side() {
                    update.apply_price(side, value);
                }
            }
            TAG_ENTRY_SIZE => {
                if let Some(side) = context.side() {
                    update.apply_size(side, value);
                }
            }
            _ => {}
        }
    }

    update.mid_price = mid_price(update.bid_price, update.ask_price);
    update
}

#[cfg(test)]
mod tests {
    use super::*;

    fn soh(fields: &[&str]) -> Vec<u8> {
        let mut out = Vec::new();
        for field in fields {
            out.extend_from_slice(field.as_bytes());
            out.push(SOH);
        }
        out
    }

    #[test]
    fn test_entry_context_transitions() {
        let ctx = EntryContext::default();
        assert_eq!(ctx, EntryContext::Unset);
        assert_eq!(ctx.on_entry_type("0"), EntryContext::Bid);
        assert_eq!(ctx.on_entry_type("1"), EntryContext::Ask);
        assert_eq!(EntryContext::Bid.on_entry_type("1"), EntryContext::Ask);
        assert_eq!(EntryContext::Ask.on_entry_type("2"), EntryContext::Unset);
        assert_eq!(EntryContext::Bid.on_entry_type(""), EntryContext::Unset);
        assert_eq!(EntryContext::Unset.side(), None);
        assert_eq!(EntryContext::Bid.side(), Some(Side::Bid));
        assert_eq!(EntryContext::Ask.side(), Some(Side::Ask));
    }

    #[test]
    fn test_decode_full_quote() {
        let update = decode(&soh(&[
            "35=W", "55=ESZ5", "269=0", "270=100.25", "271=10", "269=1", "270=100.50", "271=5",
        ]));

        assert_eq!(update.message_type.as_deref(), Some("W"));
        assert_eq!(update.symbol.as_deref(), Some("ESZ5"));
        assert_eq!(update.bid_price, 100.25);
        assert_eq!(update.bid_size, 10);
        assert_eq!(update.ask_price, 100.50);
        assert_eq!(update.ask_size, 5);
        assert_eq!(update.mid_price, Some(100.375));
        assert!(update.warnings.is_empty());
        assert_eq!(
            update.raw_text,
            "35=W|55=ESZ5|269=0|270=100.25|271=10|269=1|270=100.50|271=5|"
        );
    }

    #[test]
    fn test_price_before_entry_type_ignored() {
        let update = decode(&soh(&["270=99.0", "271=7", "269=1", "270=101.0"]));
        assert_eq!(update.bid_price, 0.0);
        assert_eq!(update.bid_size, 0);
        assert_eq!(update.ask_price, 101.0);
        assert_eq!(update.mid_price, None);
    }

    #[test]
    fn test_unknown_entry_type_resets_context() {
        let update = decode(&soh(&["269=0", "270=99.0", "269=2", "270=98.0", "271=3"]));
        assert_eq!(update.bid_price, 99.0);
        assert_eq!(update.bid_size, 0);
    }

    #[test]
    fn test_duplicate_tags_last_wins() {
        let update = decode(&soh(&[
            "35=X", "35=W", "55=AAA", "55=ESZ5", "269=0", "270=1.0", "270=2.0",
        ]));
        assert_eq!(update.message_type.as_deref(), Some("W"));
        assert_eq!(update.symbol.as_deref(), Some("ESZ5"));
        assert_eq!(update.bid_price, 2.0);
    }

    #[test]
    fn test_value_split_once() {
        let update = decode(&soh(&["55=A=B"]));
        assert_eq!(update.symbol.as_deref(), Some("A=B"));
    }

    #[test]
    fn test_invalid_price_is_warning() {
        let update = decode(&soh(&["269=0", "270=abc", "271=4", "269=1", "270=10.0"]));
        assert_eq!(update.bid_price, 0.0);
        assert_eq!(update.bid_size, 4);
        assert_eq!(update.ask_price, 10.0);
        assert_eq!(
            update.warnings,
            vec![DecodeWarning::InvalidPrice {
                side: Side::Bid,
                value: "abc".to_string()
            }]
        );
    }

    #[test]
    fn test_invalid_size_keeps_previous_value() {
        let update = decode(&soh(&["269=1", "271=5", "271=5.5"]));
        assert_eq!(update.ask_size, 5);
        assert_eq!(update.warnings.len(), 1);
    }

    #[test]
    fn test_invalid_utf8_is_lossy() {
        let mut payload = soh(&["35=W", "55=ESZ5"]);
        payload.push(0xFF);
        let update = decode(&payload);
        assert_eq!(update.symbol.as_deref(), Some("ESZ5"));
        assert!(update.warnings.contains(&DecodeWarning::InvalidUtf8));
    }

    #[test]
    fn test_empty_payload() {
        let update = decode(b"");
        assert_eq!(update.raw_text, "");
        assert_eq!(update.mid_price, None);
        assert!(update.warnings.is_empty());
    }

    #[test]
    fn test_mid_requires_both_positive() {
        assert_eq!(mid_price(0.0, 10.0), None);
        assert_eq!(mid_price(10.0, 0.0), None);
        assert_eq!(mid_price(-1.0, 10.0), None);
        assert_eq!(mid_price(9.0, 10.0), Some(9.5));
    }
}
