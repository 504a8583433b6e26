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

//! Loans.
//!
//! A loan only ever persists two states:
//! - [`Issued`](LoanStatus::Issued) → [`Returned`](LoanStatus::Returned) (via return)
//!
//! "Overdue" is read off the clock: an issued loan whose due date has
//! passed reports [`LoanState::Overdue`] without anything being written.

use crate::LoanError;
use crate::base::{BorrowerId, LoanId, TitleId};
use crate::fine::fine_amount;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoanStatus {
    /// Rows written by older back-ends as `overdue` are still outstanding.
    #[serde(alias = "overdue")]
    Issued,
    Returned,
}

/// What a loan looks like at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LoanState {
    Issued,
    Overdue,
    Returned,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "LoanRecord")]
pub struct Loan {
    id: LoanId,
    title_id: TitleId,
    borrower_id: BorrowerId,
    issued_at: DateTime<Utc>,
    due_at: DateTime<Utc>,
    returned_at: Option<DateTime<Utc>>,
    fine_amount: Option<u64>,
    fine_paid: bool,
    status: LoanStatus,
}

impl Loan {
    /// A freshly issued loan, due `period_days` whole days after `issued_at`.
    ///
    /// Fails with [`LoanError::DueDateOutOfRange`] when the due date is not
    /// representable.
    pub fn issue(
        id: LoanId,
        title_id: TitleId,
        borrower_id: BorrowerId,
        issued_at: DateTime<Utc>,
        period_days: u32,
    ) -> Result<Self, LoanError> {
        let due_at = Duration::try_days(i64::from(period_days))
            .and_then(|period| issued_at.checked_add_signed(period))
            .ok_or(LoanError::DueDateOutOfRange(period_days))?;
        Ok(Self {
            id,
            title_id,
            borrower_id,
            issued_at,
            due_at,
            returned_at: None,
            fine_amount: None,
            fine_paid: false,
            status: LoanStatus::Issued,
        })
    }

    pub fn id(&self) -> LoanId {
        self.id
    }

    pub fn title_id(&self) -> TitleId {
        self.title_id
    }

    pub fn borrower_id(&self) -> BorrowerId {
        self.borrower_id
    }

    pub fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }

    pub fn due_at(&self) -> DateTime<Utc> {
        self.due_at
    }

    pub fn returned_at(&self) -> Option<DateTime<Utc>> {
        self.returned_at
    }

    pub fn fine_amount(&self) -> Option<u64> {
        self.fine_amount
    }

    pub fn fine_paid(&self) -> bool {
        self.fine_paid
    }

    pub fn status(&self) -> LoanStatus {
        self.status
    }

    pub fn is_outstanding(&self) -> bool {
        self.status == LoanStatus::Issued
    }

    /// Still out and past its due date.
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.is_outstanding() && now > self.due_at
    }

    pub fn state(&self, now: DateTime<Utc>) -> LoanState {
        match self.status {
            LoanStatus::Returned => LoanState::Returned,
            LoanStatus::Issued if now > self.due_at => LoanState::Overdue,
            LoanStatus::Issued => LoanState::Issued,
        }
    }

    /// The fine this loan would carry if it came back at `now`.
    ///
    /// For a loan already returned this is the fine that was recorded.
    pub fn fine_if_returned(&self, now: DateTime<Utc>, rate_per_day: u64) -> u64 {
        match self.status {
            LoanStatus::Returned => self.fine_amount.unwrap_or(0),
            LoanStatus::Issued => fine_amount(self.due_at, now, rate_per_day),
        }
    }

    /// Closes the loan at `now`, returning the fine charged.
    pub fn close(&mut self, now: DateTime<Utc>, rate_per_day: u64) -> Result<u64, LoanError> {
        if !self.is_outstanding() {
            return Err(LoanError::LoanNotOutstanding(self.id));
        }
        let fine = fine_amount(self.due_at, now, rate_per_day);
        self.returned_at = Some(now);
        self.fine_amount = Some(fine);
        self.fine_paid = fine == 0;
        self.status = LoanStatus::Returned;
        Ok(fine)
    }

    /// Flags the loan's fine as settled.
    pub fn mark_fine_paid(&mut self) {
        self.fine_paid = true;
    }
}

/// Wire shape of a loan, accepting the field spellings used by the
/// various storage back-ends.
#[derive(Debug, Deserialize)]
struct LoanRecord {
    id: LoanId,
    #[serde(alias = "bookId", alias = "book_id")]
    title_id: TitleId,
    #[serde(alias = "studentId", alias = "student_id")]
    borrower_id: BorrowerId,
    #[serde(alias = "issueDate", alias = "issue_date")]
    issued_at: DateTime<Utc>,
    #[serde(alias = "dueDate", alias = "due_date")]
    due_at: DateTime<Utc>,
    #[serde(default, alias = "returnDate", alias = "return_date")]
    returned_at: Option<DateTime<Utc>>,
    #[serde(default, alias = "fineAmount")]
    fine_amount: Option<u64>,
    #[serde(default, alias = "finePaid")]
    fine_paid: bool,
    status: LoanStatus,
}

impl TryFrom<LoanRecord> for Loan {
    type Error = LoanError;

    fn try_from(record: LoanRecord) -> Result<Self, Self::Error> {
        if record.status == LoanStatus::Returned && record.returned_at.is_none() {
            return Err(LoanError::MissingField("returned_at"));
        }
        let fine_amount = match record.status {
            LoanStatus::Returned => Some(record.fine_amount.unwrap_or(0)),
            LoanStatus::Issued => None,
        };
        Ok(Loan {
            id: record.id,
            title_id: record.title_id,
            borrower_id: record.borrower_id,
            issued_at: record.issued_at,
            due_at: record.due_at,
            returned_at: record.returned_at,
            fine_paid: record.fine_paid || fine_amount == Some(0),
            fine_amount,
            status: record.status,
        })
    }
}
