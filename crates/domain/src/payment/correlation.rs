//! Extraction of order ids from free-text transfer descriptions.

use common::OrderId;
use regex::Regex;
use thiserror::Error;

/// Marker customers are asked to put before the order id.
pub const DEFAULT_MARKER: &str = "DONHANG";

#[derive(Debug, Error)]
pub enum MarkerError {
    #[error("Payment marker must not be blank")]
    Blank,

    #[error("Invalid payment marker pattern: {0}")]
    Pattern(#[from] regex::Error),
}

/// Finds `<marker><digits>` in a description, ignoring case.
#[derive(Debug, Clone)]
pub struct CorrelationParser {
    pattern: Regex,
}

impl CorrelationParser {
    pub fn new(marker: &str) -> Result<Self, MarkerError> {
        let marker = marker.trim();
        if marker.is_empty() {
            return Err(MarkerError::Blank);
        }
        let pattern = Regex::new(&format!(r"(?i){}(\d+)", regex::escape(marker)))?;
        Ok(Self { pattern })
    }

    /// Returns the first correlated order id, if any.
    ///
    /// Digit runs too long for an order id count as no match.
    pub fn parse(&self, description: &str) -> Option<OrderId> {
        let digits = self.pattern.captures(description)?.get(1)?.as_str();
        digits.parse::<i64>().ok().map(OrderId::new)
    }
}
