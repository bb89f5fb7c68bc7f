//! Ledger amounts
//!
//! Amounts are denominated in tinybar, the smallest unit of the ledger's
//! native currency. All arithmetic is checked; overflow surfaces as an error
//! instead of wrapping.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Amount in tinybar, the smallest ledger unit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Amount(u64);

impl Amount {
    /// Amount zero
    pub const ZERO: Amount = Amount(0);

    /// Create a new [`Amount`] from a tinybar value.
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    /// Checked subtraction, erroring on underflow.
    pub fn checked_sub(self, other: Amount) -> Result<Amount, Error> {
        self.0
            .checked_sub(other.0)
            .map(Amount)
            .ok_or(Error::AmountOverflow)
    }
}

impl From<u64> for Amount {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<Amount> for u64 {
    fn from(value: Amount) -> Self {
        value.0
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checked_sub() {
        let a = Amount::new(42);
        assert_eq!(a.checked_sub(Amount::new(10)).unwrap(), Amount::new(32));
        assert!(Amount::ZERO.checked_sub(Amount::new(1)).is_err());
    }
}
