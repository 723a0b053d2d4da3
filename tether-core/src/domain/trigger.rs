//! Job trigger types

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Describes when a job became eligible to run
///
/// Triggers are carried on the job descriptor for the worker's benefit.
/// Deciding whether a trigger is satisfied happens outside this workspace.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Trigger {
    /// Run as soon as possible
    #[default]
    Now,

    /// Run somewhere between `start` and `end` seconds from scheduling
    ExecutionWindow { start: u64, end: u64 },
}

impl Trigger {
    /// The immediate trigger
    pub fn now() -> Self {
        Trigger::Now
    }

    /// Creates an execution window, rejecting windows that end before they start
    pub fn execution_window(start: u64, end: u64) -> Result<Self, ValidationError> {
        let trigger = Trigger::ExecutionWindow { start, end };
        trigger.validate()?;
        Ok(trigger)
    }

    /// Returns true for the immediate trigger
    pub fn is_immediate(&self) -> bool {
        matches!(self, Trigger::Now)
    }

    pub(crate) fn validate(&self) -> Result<(), ValidationError> {
        match *self {
            Trigger::ExecutionWindow { start, end } if end < start => {
                Err(ValidationError::InvalidWindow { start, end })
            }
            _ => Ok(()),
        }
    }
}

impl std::fmt::Display for Trigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Trigger::Now => write!(f, "now"),
            Trigger::ExecutionWindow { start, end } => write!(f, "window[{}s..{}s]", start, end),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_is_immediate() {
        assert!(Trigger::now().is_immediate());
        assert_eq!(Trigger::default(), Trigger::Now);
    }

    #[test]
    fn test_execution_window() {
        let trigger = Trigger::execution_window(10, 60).unwrap();
        assert!(!trigger.is_immediate());
        assert_eq!(trigger.to_string(), "window[10s..60s]");

        // Zero-width windows are allowed
        assert!(Trigger::execution_window(30, 30).is_ok());
    }

    #[test]
    fn test_inverted_window_rejected() {
        let err = Trigger::execution_window(60, 10).unwrap_err();
        assert_eq!(err, ValidationError::InvalidWindow { start: 60, end: 10 });
    }

    #[test]
    fn test_serde_shape() {
        let json = serde_json::to_value(Trigger::ExecutionWindow { start: 1, end: 2 }).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "type": "execution_window", "start": 1, "end": 2 })
        );
    }
}
