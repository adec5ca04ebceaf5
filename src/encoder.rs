//! Tag=value message builder
//!
//! Produces FIX.4.2-framed messages: `8=<begin string>`, `9=<body length>`,
//! the body fields, then `10=<checksum>`. Used by the test feed producer.

use std::fmt::Display;

use crate::decoder::SOH;

pub const DEFAULT_BEGIN_STRING: &str = "FIX.4.2";

/// Reusable message builder. `clear_body` keeps the allocation between
/// messages.
#[derive(Debug, Clone)]
pub struct MessageBuilder {
    begin_string: String,
    body: Vec<u8>,
}

impl MessageBuilder {
    pub fn new(begin_string: impl Into<String>) -> Self {
        Self {
            begin_string: begin_string.into(),
            body: Vec::with_capacity(256),
        }
    }

    /// Append `tag=value<SOH>` to the body.
    pub fn add_field(&mut self, tag: u32, value: impl Display) -> &mut Self {
        self.body.extend_from_slice(format!("{}={}", tag, value).as_bytes());
        self.body.push(SOH);
        self
    }

    pub fn clear_body(&mut self) -> &mut Self {
        self.body.clear();
        self
    }

    /// Frame the current body with header and checksum trailer.
    pub fn finalize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.body.len() + 32);
        out.extend_from_slice(format!("8={}", self.begin_string).as_bytes());
        out.push(SOH);
        out.extend_from_slice(format!("9={}", self.body.len()).as_bytes());
        out.push(SOH);
        out.extend_from_slice(&self.body);

        let sum = checksum(&out);
        out.extend_from_slice(format!("10={:03}", sum).as_bytes());
        out.push(SOH);
        out
    }

    /// Build a market-data snapshot (35=W) carrying one bid and one ask
    /// entry, prices rendered to two decimals.
    pub fn quote(
        &mut self,
        symbol: &str,
        bid_price: f64,
        bid_size: i64,
        ask_price: f64,
        ask_size: i64,
    ) -> Vec<u8> {
        self.clear_body()
            .add_field(35, "W")
            .add_field(55, symbol)
            .add_field(268, 2)
            .add_field(269, 0)
            .add_field(270, format!("{:.2}", bid_price))
            .add_field(271, bid_size)
            .add_field(269, 1)
            .add_field(270, format!("{:.2}", ask_price))
            .add_field(271, ask_size);
        self.finalize()
    }
}

impl Default for MessageBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_BEGIN_STRING)
    }
}

/// Sum of all bytes modulo 256.
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, b| acc.wrapping_add(*b))
}
