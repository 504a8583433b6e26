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

//! Error types for circulation processing.

use crate::base::{BorrowerId, FineId, LoanId, TitleId};
use thiserror::Error;

/// Broad classification of a [`LoanError`].
///
/// Every error is recoverable: the operation that produced it applied no
/// mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A referenced record does not exist.
    NotFound,
    /// The record exists but is in the wrong state for the operation.
    Conflict,
    /// The operation is forbidden by circulation policy or role.
    PolicyViolation,
    /// The request itself is malformed.
    Invalid,
    /// The backing store could not be reached; the caller may retry.
    StorageUnavailable,
}

/// Circulation errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LoanError {
    #[error("title {0} not found")]
    TitleNotFound(TitleId),

    #[error("borrower {0} not found")]
    BorrowerNotFound(BorrowerId),

    #[error("loan {0} not found")]
    LoanNotFound(LoanId),

    #[error("fine {0} not found")]
    FineNotFound(FineId),

    /// No copy of the title is on the shelf
    #[error("title {0} has no copies available")]
    OutOfStock(TitleId),

    /// Every copy is already on the shelf
    #[error("title {0} already has all copies in stock")]
    StockFull(TitleId),

    /// Loan is not in the issued state
    #[error("loan {0} is not outstanding")]
    LoanNotOutstanding(LoanId),

    #[error("fine {0} is already paid")]
    FineAlreadyPaid(FineId),

    #[error("a title with ISBN {0} already exists")]
    DuplicateIsbn(String),

    #[error("title {0} already exists")]
    DuplicateTitle(TitleId),

    #[error("borrower {0} already exists")]
    DuplicateBorrower(BorrowerId),

    #[error("loan {0} already exists")]
    DuplicateLoan(LoanId),

    #[error("fine {0} already exists")]
    DuplicateFine(FineId),

    #[error("loan {0} already has a fine")]
    LoanAlreadyFined(LoanId),

    /// Shelf stock and outstanding loans do not add up to capacity
    #[error("title {0} stock does not match its outstanding loans")]
    StockMismatch(TitleId),

    #[error("a borrower with e-mail {0} already exists")]
    DuplicateEmail(String),

    #[error("title {0} has copies out on loan")]
    TitleHasActiveLoans(TitleId),

    #[error("borrower {0} has books out on loan")]
    BorrowerHasActiveLoans(BorrowerId),

    /// Shrinking capacity would strand issued copies
    #[error("title {0} cannot drop below the {1} copies out on loan")]
    CopiesOnLoan(TitleId, u32),

    #[error("borrower {0} is not eligible to borrow")]
    BorrowerIneligible(BorrowerId),

    #[error("borrower {0} has overdue loans")]
    OverdueLoans(BorrowerId),

    #[error("borrower {0} has unpaid fines")]
    UnpaidFines(BorrowerId),

    #[error("borrower {0} has reached the limit of {1} loans")]
    LoanLimitReached(BorrowerId, u32),

    /// Operator role lacks the capability
    #[error("operation not permitted for this role")]
    Forbidden,

    #[error("issue period of {0} days is outside {1}..={2}")]
    InvalidIssuePeriod(u32, u32, u32),

    #[error("issue period of {0} days puts the due date out of range")]
    DueDateOutOfRange(u32),

    #[error("a title needs at least one copy")]
    InvalidCopies,

    #[error("missing field: {0}")]
    MissingField(&'static str),

    #[error("unknown role: {0}")]
    UnknownRole(String),

    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),
}

impl LoanError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LoanError::TitleNotFound(_)
            | LoanError::BorrowerNotFound(_)
            | LoanError::LoanNotFound(_)
            | LoanError::FineNotFound(_) => ErrorKind::NotFound,
            LoanError::OutOfStock(_)
            | LoanError::StockFull(_)
            | LoanError::LoanNotOutstanding(_)
            | LoanError::FineAlreadyPaid(_)
            | LoanError::DuplicateIsbn(_)
            | LoanError::DuplicateTitle(_)
            | LoanError::DuplicateBorrower(_)
            | LoanError::DuplicateLoan(_)
            | LoanError::DuplicateFine(_)
            | LoanError::LoanAlreadyFined(_)
            | LoanError::StockMismatch(_)
            | LoanError::DuplicateEmail(_)
            | LoanError::TitleHasActiveLoans(_)
            | LoanError::BorrowerHasActiveLoans(_)
            | LoanError::CopiesOnLoan(..) => ErrorKind::Conflict,
            LoanError::BorrowerIneligible(_)
            | LoanError::OverdueLoans(_)
            | LoanError::UnpaidFines(_)
            | LoanError::LoanLimitReached(..)
            | LoanError::Forbidden => ErrorKind::PolicyViolation,
            LoanError::InvalidIssuePeriod(..)
            | LoanError::DueDateOutOfRange(_)
            | LoanError::InvalidCopies
            | LoanError::MissingField(_)
            | LoanError::UnknownRole(_) => ErrorKind::Invalid,
            LoanError::StorageUnavailable(_) => ErrorKind::StorageUnavailable,
        }
    }

    /// Storage failures are the only errors worth retrying unchanged.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::StorageUnavailable
    }
}
