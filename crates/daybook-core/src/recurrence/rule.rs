//! Recurrence rule types and creation-time validation.

use chrono::{NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Recurrence frequency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
    Yearly,
    /// Day-by-day scan keeping dates that match the rule's weekday or
    /// day-of-month constraint sets; `interval` then selects every n-th match.
    IntervalSet,
}

/// How a series terminates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum Termination {
    /// Runs forever.
    Never,
    /// Occurrences on or after this date are excluded.
    Until(NaiveDate),
    /// Stops after this many occurrences counted from the anchor,
    /// independent of any query window.
    Count(u32),
}

/// A recurrence rule. Immutable once attached to a series; replacing it
/// starts a new expansion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecurrenceRule {
    pub frequency: Frequency,
    /// Every n-th step (or n-th constraint match for `IntervalSet`).
    #[serde(default = "default_interval")]
    pub interval: u32,
    #[serde(default = "default_termination")]
    pub termination: Termination,
    /// Weekday constraints, only meaningful for `IntervalSet`.
    #[serde(default)]
    pub by_weekday: Vec<Weekday>,
    /// Day-of-month constraints (1-31), only meaningful for `IntervalSet`.
    #[serde(default)]
    pub by_month_day: Vec<u8>,
}

fn default_interval() -> u32 {
    1
}

fn default_termination() -> Termination {
    Termination::Never
}

impl RecurrenceRule {
    /// Build a simple rule with no constraints.
    pub fn new(frequency: Frequency, interval: u32, termination: Termination) -> Self {
        Self {
            frequency,
            interval,
            termination,
            by_weekday: Vec::new(),
            by_month_day: Vec::new(),
        }
    }

    /// Validate the rule against its series anchor date.
    ///
    /// Malformed rules are rejected here and never reach the expander.
    ///
    /// # Errors
    /// Returns a [`ValidationError`] for a zero interval, zero count,
    /// an end date not after the anchor, an `IntervalSet` rule without
    /// constraints, or an out-of-range day-of-month constraint.
    pub fn validate(&self, anchor: NaiveDate) -> Result<(), ValidationError> {
        if self.interval == 0 {
            return Err(ValidationError::ZeroInterval(self.interval));
        }
        match self.termination {
            Termination::Count(0) => return Err(ValidationError::ZeroCount),
            Termination::Until(until) if until <= anchor => {
                return Err(ValidationError::UntilBeforeAnchor { anchor, until });
            }
            _ => {}
        }
        if self.frequency == Frequency::IntervalSet
            && self.by_weekday.is_empty()
            && self.by_month_day.is_empty()
        {
            return Err(ValidationError::EmptyIntervalSet);
        }
        if let Some(&day) = self.by_month_day.iter().find(|&&d| d == 0 || d > 31) {
            return Err(ValidationError::InvalidValue {
                field: "by_month_day".to_string(),
                message: format!("day {day} is outside 1-31"),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn anchor() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 1, 5).unwrap()
    }

    #[test]
    fn test_valid_simple_rule() {
        let rule = RecurrenceRule::new(Frequency::Daily, 2, Termination::Never);
        assert!(rule.validate(anchor()).is_ok());
    }

    #[test]
    fn test_zero_interval_rejected() {
        let rule = RecurrenceRule::new(Frequency::Weekly, 0, Termination::Never);
        assert!(matches!(
            rule.validate(anchor()),
            Err(ValidationError::ZeroInterval(0))
        ));
    }

    #[test]
    fn test_zero_count_rejected() {
        let rule = RecurrenceRule::new(Frequency::Daily, 1, Termination::Count(0));
        assert!(matches!(
            rule.validate(anchor()),
            Err(ValidationError::ZeroCount)
        ));
    }

    #[test]
    fn test_until_before_anchor_rejected() {
        let until = NaiveDate::from_ymd_opt(2025, 12, 31).unwrap();
        let rule = RecurrenceRule::new(Frequency::Daily, 1, Termination::Until(until));
        assert!(matches!(
            rule.validate(anchor()),
            Err(ValidationError::UntilBeforeAnchor { .. })
        ));
    }

    #[test]
    fn test_until_equal_anchor_rejected() {
        let rule = RecurrenceRule::new(Frequency::Daily, 1, Termination::Until(anchor()));
        assert!(rule.validate(anchor()).is_err());
    }

    #[test]
    fn test_empty_interval_set_rejected() {
        let rule = RecurrenceRule::new(Frequency::IntervalSet, 1, Termination::Never);
        assert!(matches!(
            rule.validate(anchor()),
            Err(ValidationError::EmptyIntervalSet)
        ));
    }

    #[test]
    fn test_interval_set_with_weekdays_ok() {
        let mut rule = RecurrenceRule::new(Frequency::IntervalSet, 1, Termination::Never);
        rule.by_weekday = vec![Weekday::Mon, Weekday::Thu];
        assert!(rule.validate(anchor()).is_ok());
    }

    #[test]
    fn test_month_day_out_of_range_rejected() {
        let mut rule = RecurrenceRule::new(Frequency::IntervalSet, 1, Termination::Never);
        rule.by_month_day = vec![15, 32];
        assert!(rule.validate(anchor()).is_err());
    }

    #[test]
    fn test_rule_serde_round_trip() {
        let rule = RecurrenceRule::new(Frequency::Monthly, 3, Termination::Count(10));
        let json = serde_json::to_string(&rule).unwrap();
        let decoded: RecurrenceRule = serde_json::from_str(&json).unwrap();
        assert_eq!(rule, decoded);
    }
}
