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

//! Circulation engine.
//!
//! The [`Engine`] is the central component that issues and returns copies,
//! charges late fines and keeps title stock consistent.
//!
//! # Operations
//!
//! - **Issue**: Hands a copy to an eligible borrower; stock -1, new loan.
//! - **Return**: Closes an issued loan; stock +1, fine charged if late.
//! - **Settle**: Marks a fine paid.
//! - **Catalog / borrower maintenance**: Add, resize and remove records.
//!
//! # Thread Safety
//!
//! Every operation reads the clock once and commits its writes as a single
//! [`Batch`]. Issues for the same borrower are serialized through a
//! per-borrower gate held in a [`DashMap`]; different borrowers proceed in
//! parallel and the store's conditional mutations settle any race on a
//! title's stock or a loan's status.

use crate::LoanError;
use crate::base::{BorrowerId, FineId, LoanId, TitleId};
use crate::borrower::{Borrower, NewBorrower};
use crate::clock::{Clock, SystemClock};
use crate::fine::{Fine, fine_total};
use crate::journal::{Event, Journal};
use crate::loan::Loan;
use crate::policy::Policy;
use crate::stats::{LibraryStats, collection_rate};
use crate::store::{Batch, FineQuery, LibraryStore, LoanOrder, LoanQuery, MemoryStore, Mutation};
use crate::title::{NewTitle, Title};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Outcome of a return.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReturnReceipt {
    pub loan: Loan,
    /// Present only when the copy came back late.
    pub fine: Option<Fine>,
}

impl ReturnReceipt {
    pub fn fine_amount(&self) -> u64 {
        self.fine.as_ref().map_or(0, Fine::amount)
    }
}

/// Circulation engine over a [`LibraryStore`].
///
/// # Invariants
///
/// - `0 <= stock <= total_copies` for every title.
/// - A loan moves only `Issued` -> `Returned`; overdue is derived.
/// - A fine exists only for a late return and changes only when paid.
/// - The writes of one operation are applied together or not at all.
pub struct Engine<S: LibraryStore = MemoryStore> {
    store: S,
    clock: Arc<dyn Clock>,
    policy: Policy,
    /// One gate per borrower, serializing their standing check and issue.
    borrower_gates: DashMap<BorrowerId, Arc<Mutex<()>>>,
    journal: Journal,
}

impl Engine<MemoryStore> {
    /// Creates an engine over an empty in-memory store, the system clock
    /// and the default policy.
    pub fn new() -> Self {
        Self::with_store(MemoryStore::new())
    }
}

impl Default for Engine<MemoryStore> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: LibraryStore> Engine<S> {
    pub fn with_store(store: S) -> Self {
        Engine {
            store,
            clock: Arc::new(SystemClock),
            policy: Policy::default(),
            borrower_gates: DashMap::new(),
            journal: Journal::new(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_policy(mut self, policy: Policy) -> Self {
        self.policy = policy;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    fn gate(&self, borrower_id: BorrowerId) -> Arc<Mutex<()>> {
        self.borrower_gates.entry(borrower_id).or_default().clone()
    }

    // === Circulation ===

    /// Issues one copy of `title_id` to `borrower_id` for `period_days`.
    ///
    /// # Errors
    ///
    /// - [`LoanError::InvalidIssuePeriod`] - Period outside the policy range.
    /// - [`LoanError::TitleNotFound`] / [`LoanError::BorrowerNotFound`] - Unknown id.
    /// - [`LoanError::BorrowerIneligible`] - Borrower's role cannot borrow.
    /// - [`LoanError::OutOfStock`] - No copy on the shelf.
    /// - [`LoanError::OverdueLoans`] / [`LoanError::UnpaidFines`] - Borrower is
    ///   blocked (when the policy enforces it).
    /// - [`LoanError::LoanLimitReached`] - Borrower holds the maximum.
    pub fn issue_copy(
        &self,
        title_id: TitleId,
        borrower_id: BorrowerId,
        period_days: u32,
    ) -> Result<Loan, LoanError> {
        self.issue(title_id, borrower_id, period_days).inspect_err(|e| {
            warn!(%title_id, %borrower_id, period_days, error = %e, "issue rejected");
        })
    }

    /// [`issue_copy`](Self::issue_copy) with the policy's default period.
    pub fn issue_with_default_period(
        &self,
        title_id: TitleId,
        borrower_id: BorrowerId,
    ) -> Result<Loan, LoanError> {
        self.issue_copy(title_id, borrower_id, self.policy.default_issue_days)
    }

    fn issue(
        &self,
        title_id: TitleId,
        borrower_id: BorrowerId,
        period_days: u32,
    ) -> Result<Loan, LoanError> {
        let period_days = self.policy.check_issue_days(period_days)?;
        let now = self.clock.now();

        let gate = self.gate(borrower_id);
        let _serialized = gate.lock();

        let title = self.title(title_id)?;
        let borrower = self.borrower(borrower_id)?;
        if !borrower.can_borrow() {
            return Err(LoanError::BorrowerIneligible(borrower_id));
        }
        if !title.is_available() {
            return Err(LoanError::OutOfStock(title_id));
        }
        self.check_standing(borrower_id, now)?;

        let loan = Loan::issue(
            self.store.next_loan_id()?,
            title_id,
            borrower_id,
            now,
            period_days,
        )?;
        self.store.commit(
            Batch::new()
                .with(Mutation::TakeCopy(title_id))
                .with(Mutation::InsertLoan(loan.clone())),
        )?;

        info!(
            loan_id = %loan.id(),
            %title_id,
            %borrower_id,
            due_at = %loan.due_at(),
            "copy issued"
        );
        self.journal.record(Event::Issued {
            loan_id: loan.id(),
            title_id,
            borrower_id,
            due_at: loan.due_at(),
            at: now,
        });
        Ok(loan)
    }

    /// Rejects borrowers the policy says must not take another loan.
    fn check_standing(&self, borrower_id: BorrowerId, now: DateTime<Utc>) -> Result<(), LoanError> {
        let outstanding = self
            .store
            .loans(&LoanQuery::outstanding().for_borrower(borrower_id))?;

        if self.policy.block_on_outstanding {
            if outstanding.iter().any(|l| l.is_overdue(now)) {
                return Err(LoanError::OverdueLoans(borrower_id));
            }
            let unpaid = self
                .store
                .fines(&FineQuery::unpaid().for_borrower(borrower_id))?;
            if !unpaid.is_empty() {
                return Err(LoanError::UnpaidFines(borrower_id));
            }
        }

        if let Some(max) = self.policy.max_loans_per_borrower {
            if outstanding.len() >= max as usize {
                return Err(LoanError::LoanLimitReached(borrower_id, max));
            }
        }
        Ok(())
    }

    /// Returns the copy held under `loan_id`, charging a fine if it is late.
    ///
    /// # Errors
    ///
    /// - [`LoanError::LoanNotFound`] - Unknown loan.
    /// - [`LoanError::LoanNotOutstanding`] - Loan already returned.
    pub fn return_copy(&self, loan_id: LoanId) -> Result<ReturnReceipt, LoanError> {
        self.return_loan(loan_id).inspect_err(|e| {
            warn!(%loan_id, error = %e, "return rejected");
        })
    }

    fn return_loan(&self, loan_id: LoanId) -> Result<ReturnReceipt, LoanError> {
        let now = self.clock.now();
        let rate = self.policy.fine_per_day;

        let mut loan = self.loan(loan_id)?;
        if !loan.is_outstanding() {
            return Err(LoanError::LoanNotOutstanding(loan_id));
        }

        let amount = loan.fine_if_returned(now, rate);
        let mut batch = Batch::new()
            .with(Mutation::CloseLoan {
                id: loan_id,
                at: now,
                rate_per_day: rate,
            })
            .with(Mutation::RestoreCopy(loan.title_id()));
        let fine = if amount > 0 {
            let fine = Fine::late_return(
                self.store.next_fine_id()?,
                loan.borrower_id(),
                loan_id,
                amount,
                now,
            );
            batch.push(Mutation::InsertFine(fine.clone()));
            Some(fine)
        } else {
            None
        };
        self.store.commit(batch)?;
        loan.close(now, rate)?;

        info!(%loan_id, title_id = %loan.title_id(), fine = amount, "copy returned");
        self.journal.record(Event::Returned {
            loan_id,
            title_id: loan.title_id(),
            fine: fine.as_ref().map(|f| (f.id(), f.amount())),
            at: now,
        });
        Ok(ReturnReceipt { loan, fine })
    }

    /// Records payment of a fine and flags its loan as paid.
    ///
    /// # Errors
    ///
    /// - [`LoanError::FineNotFound`] - Unknown fine.
    /// - [`LoanError::FineAlreadyPaid`] - Fine was settled before.
    pub fn settle_fine(&self, fine_id: FineId) -> Result<Fine, LoanError> {
        let now = self.clock.now();
        let fine = self
            .settle(fine_id, now)
            .inspect_err(|e| warn!(%fine_id, error = %e, "settlement rejected"))?;

        info!(%fine_id, amount = fine.amount(), "fine settled");
        self.journal.record(Event::FineSettled {
            fine_id,
            amount: fine.amount(),
            at: now,
        });
        Ok(fine)
    }

    fn settle(&self, fine_id: FineId, now: DateTime<Utc>) -> Result<Fine, LoanError> {
        let mut fine = self.fine(fine_id)?;
        if fine.is_paid() {
            return Err(LoanError::FineAlreadyPaid(fine_id));
        }
        self.store
            .commit(Batch::new().with(Mutation::SettleFine { id: fine_id, at: now }))?;
        fine.settle(now)?;
        Ok(fine)
    }

    // === Catalog and borrowers ===

    /// Catalogues a title with every copy on the shelf.
    ///
    /// # Errors
    ///
    /// - [`LoanError::InvalidCopies`] - Fewer than one copy.
    /// - [`LoanError::DuplicateTitle`] / [`LoanError::DuplicateIsbn`] - Already catalogued.
    pub fn add_title(&self, request: NewTitle) -> Result<Title, LoanError> {
        let now = self.clock.now();
        let title = request.into_title(now)?;
        self.commit_logged(Batch::new().with(Mutation::InsertTitle(title.clone())))?;
        info!(
            title_id = %title.id(),
            isbn = %title.isbn(),
            copies = title.total_copies(),
            "title added"
        );
        self.journal.record(Event::TitleAdded {
            title_id: title.id(),
            at: now,
        });
        Ok(title)
    }

    /// Changes a title's capacity; stock moves by the same amount.
    ///
    /// # Errors
    ///
    /// - [`LoanError::CopiesOnLoan`] - More copies are out than would remain.
    pub fn set_total_copies(
        &self,
        title_id: TitleId,
        total_copies: u32,
    ) -> Result<Title, LoanError> {
        let now = self.clock.now();
        self.commit_logged(Batch::new().with(Mutation::ResizeTitle {
            id: title_id,
            total_copies,
        }))?;
        info!(%title_id, total_copies, "copies changed");
        self.journal.record(Event::CopiesChanged {
            title_id,
            total_copies,
            at: now,
        });
        self.title(title_id)
    }

    /// Deletes a title that has no copy out on loan.
    pub fn remove_title(&self, title_id: TitleId) -> Result<(), LoanError> {
        let now = self.clock.now();
        self.commit_logged(Batch::new().with(Mutation::RemoveTitle(title_id)))?;
        info!(%title_id, "title removed");
        self.journal.record(Event::TitleRemoved { title_id, at: now });
        Ok(())
    }

    /// Registers a borrower or staff member.
    ///
    /// # Errors
    ///
    /// - [`LoanError::DuplicateBorrower`] / [`LoanError::DuplicateEmail`] - Already registered.
    pub fn add_borrower(&self, request: NewBorrower) -> Result<Borrower, LoanError> {
        let now = self.clock.now();
        let borrower = request.into_borrower(now)?;
        self.commit_logged(Batch::new().with(Mutation::InsertBorrower(borrower.clone())))?;
        info!(borrower_id = %borrower.id, role = %borrower.role, "borrower added");
        self.journal.record(Event::BorrowerAdded {
            borrower_id: borrower.id,
            at: now,
        });
        Ok(borrower)
    }

    /// Deletes a borrower holding no issued loan.
    pub fn remove_borrower(&self, borrower_id: BorrowerId) -> Result<(), LoanError> {
        let now = self.clock.now();
        let gate = self.gate(borrower_id);
        let _serialized = gate.lock();
        self.commit_logged(Batch::new().with(Mutation::RemoveBorrower(borrower_id)))?;
        info!(%borrower_id, "borrower removed");
        self.journal.record(Event::BorrowerRemoved {
            borrower_id,
            at: now,
        });
        Ok(())
    }

    fn commit_logged(&self, batch: Batch) -> Result<(), LoanError> {
        self.store.commit(batch).inspect_err(|e| {
            warn!(error = %e, "maintenance rejected");
        })
    }

    // === Lookups ===

    pub fn title(&self, title_id: TitleId) -> Result<Title, LoanError> {
        self.store
            .title(title_id)?
            .ok_or(LoanError::TitleNotFound(title_id))
    }

    pub fn titles(&self) -> Result<Vec<Title>, LoanError> {
        self.store.titles()
    }

    pub fn borrower(&self, borrower_id: BorrowerId) -> Result<Borrower, LoanError> {
        self.store
            .borrower(borrower_id)?
            .ok_or(LoanError::BorrowerNotFound(borrower_id))
    }

    pub fn borrowers(&self) -> Result<Vec<Borrower>, LoanError> {
        self.store.borrowers()
    }

    pub fn loan(&self, loan_id: LoanId) -> Result<Loan, LoanError> {
        self.store
            .loan(loan_id)?
            .ok_or(LoanError::LoanNotFound(loan_id))
    }

    pub fn loans(&self, query: &LoanQuery) -> Result<Vec<Loan>, LoanError> {
        debug!(?query, "listing loans");
        self.store.loans(query)
    }

    /// Every loan of a borrower, oldest issue first.
    pub fn loans_for_borrower(&self, borrower_id: BorrowerId) -> Result<Vec<Loan>, LoanError> {
        self.store.loans(
            &LoanQuery::all()
                .for_borrower(borrower_id)
                .order_by(LoanOrder::IssuedAt),
        )
    }

    pub fn outstanding_loans(&self) -> Result<Vec<Loan>, LoanError> {
        self.store.loans(&LoanQuery::outstanding())
    }

    /// Issued loans past their due date, most overdue first.
    pub fn overdue_loans(&self) -> Result<Vec<Loan>, LoanError> {
        let now = self.clock.now();
        let mut loans = self
            .store
            .loans(&LoanQuery::outstanding().order_by(LoanOrder::DueAt))?;
        loans.retain(|l| l.is_overdue(now));
        Ok(loans)
    }

    pub fn fine(&self, fine_id: FineId) -> Result<Fine, LoanError> {
        self.store
            .fine(fine_id)?
            .ok_or(LoanError::FineNotFound(fine_id))
    }

    pub fn fines(&self, query: &FineQuery) -> Result<Vec<Fine>, LoanError> {
        self.store.fines(query)
    }

    pub fn fines_for_borrower(&self, borrower_id: BorrowerId) -> Result<Vec<Fine>, LoanError> {
        self.store.fines(&FineQuery::all().for_borrower(borrower_id))
    }

    pub fn unpaid_fines(&self) -> Result<Vec<Fine>, LoanError> {
        self.store.fines(&FineQuery::unpaid())
    }

    // === Derived queries ===

    pub fn is_overdue(&self, loan_id: LoanId) -> Result<bool, LoanError> {
        let now = self.clock.now();
        Ok(self.loan(loan_id)?.is_overdue(now))
    }

    /// The fine `loan_id` would carry if returned now. Nothing is written.
    pub fn preview_fine(&self, loan_id: LoanId) -> Result<u64, LoanError> {
        let now = self.clock.now();
        Ok(self.loan(loan_id)?.fine_if_returned(now, self.policy.fine_per_day))
    }

    // === Aggregates ===

    pub fn stats(&self) -> Result<LibraryStats, LoanError> {
        let now = self.clock.now();
        Ok(LibraryStats::compute(
            &self.store.titles()?,
            &self.store.borrowers()?,
            &self.store.loans(&LoanQuery::all())?,
            &self.store.fines(&FineQuery::all())?,
            now,
        ))
    }

    pub fn total_copies(&self) -> Result<u64, LoanError> {
        Ok(self
            .store
            .titles()?
            .iter()
            .map(|t| u64::from(t.total_copies()))
            .sum())
    }

    pub fn issued_count(&self) -> Result<usize, LoanError> {
        Ok(self.outstanding_loans()?.len())
    }

    pub fn overdue_count(&self) -> Result<usize, LoanError> {
        Ok(self.overdue_loans()?.len())
    }

    pub fn total_fines(&self) -> Result<u64, LoanError> {
        Ok(fine_total(&self.store.fines(&FineQuery::all())?))
    }

    pub fn paid_fines(&self) -> Result<u64, LoanError> {
        let paid = FineQuery {
            paid: Some(true),
            ..FineQuery::all()
        };
        Ok(fine_total(&self.store.fines(&paid)?))
    }

    /// Paid share of all fines, in percent.
    pub fn collection_rate(&self) -> Result<Decimal, LoanError> {
        let fines = self.store.fines(&FineQuery::all())?;
        let total = fine_total(&fines);
        let paid = fine_total(fines.iter().filter(|f| f.is_paid()));
        Ok(collection_rate(paid, total))
    }

    // === Journal ===

    /// Removes and returns every event recorded so far, oldest first.
    pub fn drain_journal(&self) -> Vec<Event> {
        self.journal.drain()
    }
}
