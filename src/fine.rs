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

//! Late-return fines.
//!
//! A fine is charged per *started* day past the due date: one millisecond
//! late already counts as a full day, while returning at or before the due
//! instant costs nothing.
//!
//! ```
//! use chrono::{Duration, Utc};
//! use loan_engine_rs::fine::{days_overdue, fine_amount};
//!
//! let due = Utc::now();
//! assert_eq!(days_overdue(due, due), 0);
//! assert_eq!(days_overdue(due, due + Duration::hours(1)), 1);
//! assert_eq!(fine_amount(due, due + Duration::days(10), 2), 20);
//! ```

use crate::LoanError;
use crate::base::{BorrowerId, FineId, LoanId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const MILLIS_PER_DAY: i64 = 24 * 60 * 60 * 1000;

/// Reason recorded on every fine created by a late return.
pub const LATE_RETURN_REASON: &str = "Late return fine";

/// Whole days past `due_at`, rounded up; zero when `now <= due_at`.
pub fn days_overdue(due_at: DateTime<Utc>, now: DateTime<Utc>) -> u64 {
    let late_ms = (now - due_at).num_milliseconds();
    if late_ms <= 0 {
        return 0;
    }
    // ceil without overflow for any representable span
    (late_ms / MILLIS_PER_DAY + i64::from(late_ms % MILLIS_PER_DAY != 0)) as u64
}

/// `days_overdue × rate_per_day`.
pub fn fine_amount(due_at: DateTime<Utc>, now: DateTime<Utc>, rate_per_day: u64) -> u64 {
    days_overdue(due_at, now).saturating_mul(rate_per_day)
}

/// Sum of fine amounts, saturating at `u64::MAX`.
pub fn fine_total<'a>(fines: impl IntoIterator<Item = &'a Fine>) -> u64 {
    fines
        .into_iter()
        .fold(0, |total, fine| total.saturating_add(fine.amount()))
}

/// A monetary penalty attached to exactly one loan.
///
/// Only the payment fields change after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fine {
    id: FineId,
    #[serde(alias = "studentId", alias = "student_id")]
    borrower_id: BorrowerId,
    #[serde(alias = "issueId", alias = "issue_id")]
    loan_id: LoanId,
    amount: u64,
    reason: String,
    #[serde(alias = "date")]
    charged_at: DateTime<Utc>,
    paid: bool,
    #[serde(default, alias = "paidDate")]
    paid_at: Option<DateTime<Utc>>,
}

impl Fine {
    pub fn late_return(
        id: FineId,
        borrower_id: BorrowerId,
        loan_id: LoanId,
        amount: u64,
        charged_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            borrower_id,
            loan_id,
            amount,
            reason: LATE_RETURN_REASON.to_string(),
            charged_at,
            paid: false,
            paid_at: None,
        }
    }

    pub fn id(&self) -> FineId {
        self.id
    }

    pub fn borrower_id(&self) -> BorrowerId {
        self.borrower_id
    }

    pub fn loan_id(&self) -> LoanId {
        self.loan_id
    }

    pub fn amount(&self) -> u64 {
        self.amount
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    pub fn charged_at(&self) -> DateTime<Utc> {
        self.charged_at
    }

    pub fn is_paid(&self) -> bool {
        self.paid
    }

    pub fn paid_at(&self) -> Option<DateTime<Utc>> {
        self.paid_at
    }

    /// Records payment.
    pub fn settle(&mut self, at: DateTime<Utc>) -> Result<(), LoanError> {
        if self.paid {
            return Err(LoanError::FineAlreadyPaid(self.id));
        }
        self.paid = true;
        self.paid_at = Some(at);
        Ok(())
    }
}
