use serde::Serialize;

use stocktake_core::{DomainError, DomainResult, ValueObject};

/// A single scan recorded during a counting run.
///
/// Lines are a raw log: scanning the same item twice yields two lines, merged
/// only when the run is aggregated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CountLine {
    item_code: String,
    quantity: i64,
}

impl CountLine {
    /// Validate and build a line. Only `CountingRun::add_line` calls this.
    pub(crate) fn new(item_code: &str, quantity: i64) -> DomainResult<Self> {
        let item_code = item_code.trim();
        if item_code.is_empty() {
            return Err(DomainError::validation("item code cannot be empty"));
        }
        if quantity < 0 {
            return Err(DomainError::validation(format!(
                "quantity cannot be negative (got {quantity})"
            )));
        }
        Ok(Self {
            item_code: item_code.to_string(),
            quantity,
        })
    }

    pub fn item_code(&self) -> &str {
        &self.item_code
    }

    pub fn quantity(&self) -> i64 {
        self.quantity
    }
}

impl ValueObject for CountLine {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trims_item_code() {
        let line = CountLine::new("  4006381333931 ", 2).unwrap();
        assert_eq!(line.item_code(), "4006381333931");
        assert_eq!(line.quantity(), 2);
    }

    #[test]
    fn whitespace_only_code_is_rejected() {
        let err = CountLine::new("   ", 1).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn zero_quantity_is_allowed() {
        assert!(CountLine::new("123", 0).is_ok());
    }
}
