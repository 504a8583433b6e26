// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Circulation policy.
//!
//! Every rate and limit the engine applies lives here so that an external
//! settings source can override it. A policy file is JSON with any subset
//! of the fields; missing fields keep their defaults.
//!
//! ```
//! use loan_engine_rs::Policy;
//!
//! let policy = Policy::from_json(r#"{ "fine_per_day": 5 }"#).unwrap();
//! assert_eq!(policy.fine_per_day, 5);
//! assert_eq!(policy.default_issue_days, 14);
//! ```

use crate::LoanError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Errors raised while loading a policy.
#[derive(Error, Debug)]
pub enum PolicyError {
    #[error("cannot read policy file: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed policy: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("inconsistent policy: {0}")]
    Inconsistent(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct Policy {
    /// Period used when the caller does not pick one.
    #[serde(alias = "defaultIssuePeriod")]
    pub default_issue_days: u32,
    pub min_issue_days: u32,
    pub max_issue_days: u32,
    /// Currency units charged per started day past the due date.
    #[serde(alias = "finePerDay")]
    pub fine_per_day: u64,
    /// `None` lifts the cap.
    #[serde(alias = "maxBooksPerStudent")]
    pub max_loans_per_borrower: Option<u32>,
    /// Refuse new loans to borrowers with overdue loans or unpaid fines.
    pub block_on_outstanding: bool,
}

impl Policy {
    pub const DEFAULT_ISSUE_DAYS: u32 = 14;
    pub const DEFAULT_FINE_PER_DAY: u64 = 2;
    /// Longest loan period a policy may allow, ten years.
    pub const MAX_ISSUE_DAYS: u32 = 3650;
    pub const MAX_FINE_PER_DAY: u64 = 1_000_000;

    pub fn from_json(json: &str) -> Result<Self, PolicyError> {
        let policy: Policy = serde_json::from_str(json)?;
        policy.validate()?;
        Ok(policy)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, PolicyError> {
        Self::from_json(&fs::read_to_string(path)?)
    }

    pub fn validate(&self) -> Result<(), PolicyError> {
        if self.min_issue_days == 0 {
            return Err(PolicyError::Inconsistent("min_issue_days must be at least 1"));
        }
        if self.min_issue_days > self.max_issue_days {
            return Err(PolicyError::Inconsistent("min_issue_days exceeds max_issue_days"));
        }
        if self.max_issue_days > Self::MAX_ISSUE_DAYS {
            return Err(PolicyError::Inconsistent("max_issue_days exceeds ten years"));
        }
        if self.fine_per_day > Self::MAX_FINE_PER_DAY {
            return Err(PolicyError::Inconsistent("fine_per_day is out of range"));
        }
        if !(self.min_issue_days..=self.max_issue_days).contains(&self.default_issue_days) {
            return Err(PolicyError::Inconsistent(
                "default_issue_days is outside the allowed range",
            ));
        }
        Ok(())
    }

    /// Checks a caller-supplied issue period against the allowed range.
    pub fn check_issue_days(&self, days: u32) -> Result<u32, LoanError> {
        if (self.min_issue_days..=self.max_issue_days).contains(&days) {
            Ok(days)
        } else {
            Err(LoanError::InvalidIssuePeriod(
                days,
                self.min_issue_days,
                self.max_issue_days,
            ))
        }
    }
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            default_issue_days: Self::DEFAULT_ISSUE_DAYS,
            min_issue_days: 1,
            max_issue_days: 30,
            fine_per_day: Self::DEFAULT_FINE_PER_DAY,
            max_loans_per_borrower: Some(3),
            block_on_outstanding: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_library_settings() {
        let policy = Policy::default();
        assert_eq!(policy.default_issue_days, 14);
        assert_eq!(policy.fine_per_day, 2);
        assert_eq!(policy.max_loans_per_borrower, Some(3));
        assert!(policy.block_on_outstanding);
        assert!(policy.validate().is_ok());
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let policy = Policy::from_json(r#"{"max_loans_per_borrower": null}"#).unwrap();
        assert_eq!(policy.max_loans_per_borrower, None);
        assert_eq!(policy.fine_per_day, 2);
    }

    #[test]
    fn accepts_settings_screen_field_names() {
        let policy = Policy::from_json(
            r#"{"defaultIssuePeriod": 7, "finePerDay": 3, "maxBooksPerStudent": 5}"#,
        )
        .unwrap();
        assert_eq!(policy.default_issue_days, 7);
        assert_eq!(policy.fine_per_day, 3);
        assert_eq!(policy.max_loans_per_borrower, Some(5));
    }

    #[test]
    fn rejects_inconsistent_ranges() {
        assert!(matches!(
            Policy::from_json(r#"{"min_issue_days": 0}"#),
            Err(PolicyError::Inconsistent(_))
        ));
        assert!(matches!(
            Policy::from_json(r#"{"default_issue_days": 60}"#),
            Err(PolicyError::Inconsistent(_))
        ));
        assert!(matches!(
            Policy::from_json("{ not json"),
            Err(PolicyError::Parse(_))
        ));
    }

    #[test]
    fn rejects_unbounded_period_and_rate() {
        assert!(matches!(
            Policy::from_json(r#"{"max_issue_days": 4000000000}"#),
            Err(PolicyError::Inconsistent(_))
        ));
        assert!(Policy::from_json(r#"{"max_issue_days": 3650}"#).is_ok());
        assert!(matches!(
            Policy::from_json(r#"{"fine_per_day": 18446744073709551615}"#),
            Err(PolicyError::Inconsistent(_))
        ));
        assert!(Policy::from_json(r#"{"fine_per_day": 1000000}"#).is_ok());
    }

    #[test]
    fn issue_days_bounds_are_inclusive() {
        let policy = Policy::default();
        assert_eq!(policy.check_issue_days(1), Ok(1));
        assert_eq!(policy.check_issue_days(30), Ok(30));
        assert_eq!(
            policy.check_issue_days(0),
            Err(LoanError::InvalidIssuePeriod(0, 1, 30))
        );
        assert_eq!(
            policy.check_issue_days(31),
            Err(LoanError::InvalidIssuePeriod(31, 1, 30))
        );
    }
}
