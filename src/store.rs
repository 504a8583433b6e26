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

//! Storage boundary.
//!
//! The engine never writes a record directly. It describes every change as
//! a [`Mutation`], groups the mutations of one operation into a [`Batch`]
//! and hands the batch to [`LibraryStore::commit`], which applies all of it
//! or none of it.
//!
//! Mutations are conditional: `TakeCopy` only succeeds while stock is
//! positive, `CloseLoan` only while the loan is issued, `SettleFine` only
//! while the fine is unpaid, and removals only while no issued loan points
//! at the record. Two racing callers therefore cannot both win.

use crate::LoanError;
use crate::base::{BorrowerId, FineId, LoanId, TitleId};
use crate::borrower::Borrower;
use crate::fine::Fine;
use crate::loan::{Loan, LoanStatus};
use crate::title::Title;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};

pub type StoreResult<T> = Result<T, LoanError>;

/// Sort key for loan listings. Ties keep id order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LoanOrder {
    #[default]
    Id,
    IssuedAt,
    DueAt,
}

/// Filter over loans; `None` fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoanQuery {
    pub title_id: Option<TitleId>,
    pub borrower_id: Option<BorrowerId>,
    pub status: Option<LoanStatus>,
    pub order: LoanOrder,
}

impl LoanQuery {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn outstanding() -> Self {
        Self::default().with_status(LoanStatus::Issued)
    }

    pub fn for_title(mut self, title_id: TitleId) -> Self {
        self.title_id = Some(title_id);
        self
    }

    pub fn for_borrower(mut self, borrower_id: BorrowerId) -> Self {
        self.borrower_id = Some(borrower_id);
        self
    }

    pub fn with_status(mut self, status: LoanStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn order_by(mut self, order: LoanOrder) -> Self {
        self.order = order;
        self
    }

    pub fn matches(&self, loan: &Loan) -> bool {
        self.title_id.is_none_or(|id| loan.title_id() == id)
            && self.borrower_id.is_none_or(|id| loan.borrower_id() == id)
            && self.status.is_none_or(|status| loan.status() == status)
    }

    /// Sorts `loans` in place by this query's order.
    pub fn sort(&self, loans: &mut [Loan]) {
        match self.order {
            LoanOrder::Id => loans.sort_by_key(|l| l.id()),
            LoanOrder::IssuedAt => loans.sort_by_key(|l| (l.issued_at(), l.id())),
            LoanOrder::DueAt => loans.sort_by_key(|l| (l.due_at(), l.id())),
        }
    }
}

/// Filter over fines; `None` fields match everything. Results are in id order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FineQuery {
    pub borrower_id: Option<BorrowerId>,
    pub loan_id: Option<LoanId>,
    pub paid: Option<bool>,
}

impl FineQuery {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn unpaid() -> Self {
        Self {
            paid: Some(false),
            ..Self::default()
        }
    }

    pub fn for_borrower(mut self, borrower_id: BorrowerId) -> Self {
        self.borrower_id = Some(borrower_id);
        self
    }

    pub fn for_loan(mut self, loan_id: LoanId) -> Self {
        self.loan_id = Some(loan_id);
        self
    }

    pub fn matches(&self, fine: &Fine) -> bool {
        self.borrower_id.is_none_or(|id| fine.borrower_id() == id)
            && self.loan_id.is_none_or(|id| fine.loan_id() == id)
            && self.paid.is_none_or(|paid| fine.is_paid() == paid)
    }
}

/// One conditional change to one record.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    InsertTitle(Title),
    ResizeTitle { id: TitleId, total_copies: u32 },
    RemoveTitle(TitleId),
    InsertBorrower(Borrower),
    RemoveBorrower(BorrowerId),
    TakeCopy(TitleId),
    RestoreCopy(TitleId),
    InsertLoan(Loan),
    CloseLoan {
        id: LoanId,
        at: DateTime<Utc>,
        rate_per_day: u64,
    },
    InsertFine(Fine),
    /// Also flags the fine's loan as paid.
    SettleFine { id: FineId, at: DateTime<Utc> },
}

/// The mutations of one operation, applied as a unit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Batch {
    mutations: Vec<Mutation>,
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, mutation: Mutation) -> &mut Self {
        self.mutations.push(mutation);
        self
    }

    pub fn with(mut self, mutation: Mutation) -> Self {
        self.mutations.push(mutation);
        self
    }

    pub fn len(&self) -> usize {
        self.mutations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mutations.is_empty()
    }

    pub fn mutations(&self) -> &[Mutation] {
        &self.mutations
    }
}

impl IntoIterator for Batch {
    type Item = Mutation;
    type IntoIter = std::vec::IntoIter<Mutation>;

    fn into_iter(self) -> Self::IntoIter {
        self.mutations.into_iter()
    }
}

/// Persistence collaborator.
///
/// Reads must observe every batch committed before them. Implementations
/// report transport failures as [`LoanError::StorageUnavailable`] and must
/// leave nothing applied when `commit` fails.
pub trait LibraryStore: Send + Sync {
    fn title(&self, id: TitleId) -> StoreResult<Option<Title>>;

    /// All titles in id order.
    fn titles(&self) -> StoreResult<Vec<Title>>;

    fn borrower(&self, id: BorrowerId) -> StoreResult<Option<Borrower>>;

    /// All borrowers in id order.
    fn borrowers(&self) -> StoreResult<Vec<Borrower>>;

    fn loan(&self, id: LoanId) -> StoreResult<Option<Loan>>;

    fn loans(&self, query: &LoanQuery) -> StoreResult<Vec<Loan>>;

    fn fine(&self, id: FineId) -> StoreResult<Option<Fine>>;

    fn fines(&self, query: &FineQuery) -> StoreResult<Vec<Fine>>;

    fn next_loan_id(&self) -> StoreResult<LoanId>;

    fn next_fine_id(&self) -> StoreResult<FineId>;

    /// Applies every mutation of `batch`, or none.
    fn commit(&self, batch: Batch) -> StoreResult<()>;
}

/// Every record the store holds, for seeding and inspection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Snapshot {
    #[serde(alias = "books")]
    pub titles: Vec<Title>,
    #[serde(alias = "users")]
    pub borrowers: Vec<Borrower>,
    #[serde(alias = "issues")]
    pub loans: Vec<Loan>,
    pub fines: Vec<Fine>,
}

/// Prior value of a touched record.
enum Undo {
    Title(TitleId, Option<Title>),
    Borrower(BorrowerId, Option<Borrower>),
    Loan(LoanId, Option<Loan>),
    Fine(FineId, Option<Fine>),
}

#[derive(Debug, Default)]
struct Tables {
    titles: BTreeMap<TitleId, Title>,
    borrowers: BTreeMap<BorrowerId, Borrower>,
    loans: BTreeMap<LoanId, Loan>,
    fines: BTreeMap<FineId, Fine>,
}

impl Tables {
    fn has_outstanding(&self, pred: impl Fn(&Loan) -> bool) -> bool {
        self.loans.values().any(|l| l.is_outstanding() && pred(l))
    }

    fn title_mut(&mut self, id: TitleId) -> StoreResult<&mut Title> {
        self.titles.get_mut(&id).ok_or(LoanError::TitleNotFound(id))
    }

    /// Applies one mutation, recording what it overwrote.
    ///
    /// On error nothing from this mutation has been written.
    fn apply(&mut self, mutation: Mutation, undo: &mut Vec<Undo>) -> StoreResult<()> {
        match mutation {
            Mutation::InsertTitle(title) => {
                let id = title.id();
                if self.titles.contains_key(&id) {
                    return Err(LoanError::DuplicateTitle(id));
                }
                if self.titles.values().any(|t| t.isbn() == title.isbn()) {
                    return Err(LoanError::DuplicateIsbn(title.isbn().to_string()));
                }
                self.titles.insert(id, title);
                undo.push(Undo::Title(id, None));
            }
            Mutation::ResizeTitle { id, total_copies } => {
                let title = self.title_mut(id)?;
                let before = title.clone();
                title.set_total_copies(total_copies)?;
                undo.push(Undo::Title(id, Some(before)));
            }
            Mutation::RemoveTitle(id) => {
                if !self.titles.contains_key(&id) {
                    return Err(LoanError::TitleNotFound(id));
                }
                if self.has_outstanding(|l| l.title_id() == id) {
                    return Err(LoanError::TitleHasActiveLoans(id));
                }
                let before = self.titles.remove(&id);
                undo.push(Undo::Title(id, before));
            }
            Mutation::InsertBorrower(borrower) => {
                let id = borrower.id;
                if self.borrowers.contains_key(&id) {
                    return Err(LoanError::DuplicateBorrower(id));
                }
                if self.borrowers.values().any(|b| b.same_email(&borrower.email)) {
                    return Err(LoanError::DuplicateEmail(borrower.email));
                }
                self.borrowers.insert(id, borrower);
                undo.push(Undo::Borrower(id, None));
            }
            Mutation::RemoveBorrower(id) => {
                if !self.borrowers.contains_key(&id) {
                    return Err(LoanError::BorrowerNotFound(id));
                }
                if self.has_outstanding(|l| l.borrower_id() == id) {
                    return Err(LoanError::BorrowerHasActiveLoans(id));
                }
                let before = self.borrowers.remove(&id);
                undo.push(Undo::Borrower(id, before));
            }
            Mutation::TakeCopy(id) => {
                let title = self.title_mut(id)?;
                let before = title.clone();
                title.take_copy()?;
                undo.push(Undo::Title(id, Some(before)));
            }
            Mutation::RestoreCopy(id) => {
                let title = self.title_mut(id)?;
                let before = title.clone();
                title.restore_copy()?;
                undo.push(Undo::Title(id, Some(before)));
            }
            Mutation::InsertLoan(loan) => {
                let id = loan.id();
                if self.loans.contains_key(&id) {
                    return Err(LoanError::DuplicateLoan(id));
                }
                if !self.titles.contains_key(&loan.title_id()) {
                    return Err(LoanError::TitleNotFound(loan.title_id()));
                }
                if !self.borrowers.contains_key(&loan.borrower_id()) {
                    return Err(LoanError::BorrowerNotFound(loan.borrower_id()));
                }
                self.loans.insert(id, loan);
                undo.push(Undo::Loan(id, None));
            }
            Mutation::CloseLoan {
                id,
                at,
                rate_per_day,
            } => {
                let loan = self.loans.get_mut(&id).ok_or(LoanError::LoanNotFound(id))?;
                let before = loan.clone();
                loan.close(at, rate_per_day)?;
                undo.push(Undo::Loan(id, Some(before)));
            }
            Mutation::InsertFine(fine) => {
                let id = fine.id();
                if self.fines.contains_key(&id) {
                    return Err(LoanError::DuplicateFine(id));
                }
                if !self.loans.contains_key(&fine.loan_id()) {
                    return Err(LoanError::LoanNotFound(fine.loan_id()));
                }
                if self.fines.values().any(|f| f.loan_id() == fine.loan_id()) {
                    return Err(LoanError::LoanAlreadyFined(fine.loan_id()));
                }
                self.fines.insert(id, fine);
                undo.push(Undo::Fine(id, None));
            }
            Mutation::SettleFine { id, at } => {
                let fine = self.fines.get_mut(&id).ok_or(LoanError::FineNotFound(id))?;
                let before = fine.clone();
                fine.settle(at)?;
                let loan_id = fine.loan_id();
                undo.push(Undo::Fine(id, Some(before)));
                if let Some(loan) = self.loans.get_mut(&loan_id) {
                    undo.push(Undo::Loan(loan_id, Some(loan.clone())));
                    loan.mark_fine_paid();
                }
            }
        }
        Ok(())
    }

    fn revert(&mut self, undo: Vec<Undo>) {
        for entry in undo.into_iter().rev() {
            match entry {
                Undo::Title(id, Some(t)) => {
                    self.titles.insert(id, t);
                }
                Undo::Title(id, None) => {
                    self.titles.remove(&id);
                }
                Undo::Borrower(id, Some(b)) => {
                    self.borrowers.insert(id, b);
                }
                Undo::Borrower(id, None) => {
                    self.borrowers.remove(&id);
                }
                Undo::Loan(id, Some(l)) => {
                    self.loans.insert(id, l);
                }
                Undo::Loan(id, None) => {
                    self.loans.remove(&id);
                }
                Undo::Fine(id, Some(f)) => {
                    self.fines.insert(id, f);
                }
                Undo::Fine(id, None) => {
                    self.fines.remove(&id);
                }
            }
        }
    }

    /// Every title's shelf stock plus its outstanding loans must equal its
    /// capacity.
    fn check_stock(&self) -> StoreResult<()> {
        for title in self.titles.values() {
            let out = self
                .loans
                .values()
                .filter(|l| l.is_outstanding() && l.title_id() == title.id())
                .count();
            if u64::from(title.stock()) + out as u64 != u64::from(title.total_copies()) {
                return Err(LoanError::StockMismatch(title.id()));
            }
        }
        Ok(())
    }

    fn assert_invariants(&self) {
        debug_assert!(
            self.titles.values().all(|t| t.stock() <= t.total_copies()),
            "Invariant violated: stock above capacity"
        );
    }
}

/// In-process store.
///
/// A single reader-writer lock guards all four tables, so readers never
/// see half of a batch.
#[derive(Debug)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
    next_loan: AtomicU32,
    next_fine: AtomicU32,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            next_loan: AtomicU32::new(1),
            next_fine: AtomicU32::new(1),
        }
    }

    /// Builds a store holding `snapshot`, enforcing the same uniqueness and
    /// reference checks as live inserts. Each title's stock must account
    /// for its outstanding loans.
    pub fn from_snapshot(snapshot: Snapshot) -> StoreResult<Self> {
        let store = Self::new();
        let next_loan = snapshot.loans.iter().map(|l| l.id().0).max().unwrap_or(0) + 1;
        let next_fine = snapshot.fines.iter().map(|f| f.id().0).max().unwrap_or(0) + 1;

        let mut batch = Batch::new();
        for title in snapshot.titles {
            batch.push(Mutation::InsertTitle(title));
        }
        for borrower in snapshot.borrowers {
            batch.push(Mutation::InsertBorrower(borrower));
        }
        for loan in snapshot.loans {
            batch.push(Mutation::InsertLoan(loan));
        }
        for fine in snapshot.fines {
            batch.push(Mutation::InsertFine(fine));
        }
        store.commit(batch)?;
        store.tables.read().check_stock()?;

        store.next_loan.store(next_loan, Ordering::SeqCst);
        store.next_fine.store(next_fine, Ordering::SeqCst);
        Ok(store)
    }

    pub fn snapshot(&self) -> Snapshot {
        let tables = self.tables.read();
        Snapshot {
            titles: tables.titles.values().cloned().collect(),
            borrowers: tables.borrowers.values().cloned().collect(),
            loans: tables.loans.values().cloned().collect(),
            fines: tables.fines.values().cloned().collect(),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl LibraryStore for MemoryStore {
    fn title(&self, id: TitleId) -> StoreResult<Option<Title>> {
        Ok(self.tables.read().titles.get(&id).cloned())
    }

    fn titles(&self) -> StoreResult<Vec<Title>> {
        Ok(self.tables.read().titles.values().cloned().collect())
    }

    fn borrower(&self, id: BorrowerId) -> StoreResult<Option<Borrower>> {
        Ok(self.tables.read().borrowers.get(&id).cloned())
    }

    fn borrowers(&self) -> StoreResult<Vec<Borrower>> {
        Ok(self.tables.read().borrowers.values().cloned().collect())
    }

    fn loan(&self, id: LoanId) -> StoreResult<Option<Loan>> {
        Ok(self.tables.read().loans.get(&id).cloned())
    }

    fn loans(&self, query: &LoanQuery) -> StoreResult<Vec<Loan>> {
        let mut loans: Vec<Loan> = self
            .tables
            .read()
            .loans
            .values()
            .filter(|l| query.matches(l))
            .cloned()
            .collect();
        query.sort(&mut loans);
        Ok(loans)
    }

    fn fine(&self, id: FineId) -> StoreResult<Option<Fine>> {
        Ok(self.tables.read().fines.get(&id).cloned())
    }

    fn fines(&self, query: &FineQuery) -> StoreResult<Vec<Fine>> {
        Ok(self
            .tables
            .read()
            .fines
            .values()
            .filter(|f| query.matches(f))
            .cloned()
            .collect())
    }

    fn next_loan_id(&self) -> StoreResult<LoanId> {
        Ok(LoanId(self.next_loan.fetch_add(1, Ordering::SeqCst)))
    }

    fn next_fine_id(&self) -> StoreResult<FineId> {
        Ok(FineId(self.next_fine.fetch_add(1, Ordering::SeqCst)))
    }

    fn commit(&self, batch: Batch) -> StoreResult<()> {
        let mut tables = self.tables.write();
        let mut undo = Vec::with_capacity(batch.len() + 1);
        for mutation in batch {
            if let Err(e) = tables.apply(mutation, &mut undo) {
                tables.revert(undo);
                return Err(e);
            }
        }
        tables.assert_invariants();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::Isbn;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap()
    }

    fn title(id: u32, isbn: &str, copies: u32) -> Title {
        Title::new(TitleId(id), Isbn::new(isbn), "Title", "Author", copies, t0()).unwrap()
    }

    fn student(id: u32) -> Borrower {
        Borrower::student(BorrowerId(id), "Student", format!("s{id}@example.edu"), t0())
    }

    fn seeded() -> MemoryStore {
        let store = MemoryStore::new();
        store
            .commit(
                Batch::new()
                    .with(Mutation::InsertTitle(title(1, "111", 1)))
                    .with(Mutation::InsertBorrower(student(7))),
            )
            .unwrap();
        store
    }

    fn issue(store: &MemoryStore) -> LoanId {
        let id = store.next_loan_id().unwrap();
        let loan = Loan::issue(id, TitleId(1), BorrowerId(7), t0(), 14).unwrap();
        store
            .commit(
                Batch::new()
                    .with(Mutation::TakeCopy(TitleId(1)))
                    .with(Mutation::InsertLoan(loan)),
            )
            .unwrap();
        id
    }

    #[test]
    fn duplicate_isbn_rejected() {
        let store = seeded();
        let result = store.commit(Batch::new().with(Mutation::InsertTitle(title(2, "1-1-1", 1))));
        assert_eq!(result, Err(LoanError::DuplicateIsbn("1-1-1".into())));
        assert_eq!(store.titles().unwrap().len(), 1);
    }

    #[test]
    fn duplicate_email_rejected() {
        let store = seeded();
        let mut other = student(8);
        other.email = "S7@example.edu".into();
        let result = store.commit(Batch::new().with(Mutation::InsertBorrower(other)));
        assert!(matches!(result, Err(LoanError::DuplicateEmail(_))));
    }

    #[test]
    fn failed_batch_is_rolled_back() {
        let store = seeded();
        issue(&store);

        // Second issue against a single-copy title: loan insert never happens
        // and the partially applied title insert is undone.
        let id = store.next_loan_id().unwrap();
        let loan = Loan::issue(id, TitleId(1), BorrowerId(7), t0(), 14).unwrap();
        let result = store.commit(
            Batch::new()
                .with(Mutation::InsertTitle(title(2, "222", 1)))
                .with(Mutation::TakeCopy(TitleId(1)))
                .with(Mutation::InsertLoan(loan)),
        );
        assert_eq!(result, Err(LoanError::OutOfStock(TitleId(1))));
        assert!(store.title(TitleId(2)).unwrap().is_none());
        assert!(store.loan(id).unwrap().is_none());
        assert_eq!(store.title(TitleId(1)).unwrap().unwrap().stock(), 0);
    }

    #[test]
    fn rollback_restores_modified_records() {
        let store = seeded();
        let loan_id = issue(&store);

        let result = store.commit(
            Batch::new()
                .with(Mutation::CloseLoan {
                    id: loan_id,
                    at: t0() + Duration::days(1),
                    rate_per_day: 2,
                })
                .with(Mutation::RestoreCopy(TitleId(1)))
                .with(Mutation::RestoreCopy(TitleId(1))),
        );
        assert_eq!(result, Err(LoanError::StockFull(TitleId(1))));

        let loan = store.loan(loan_id).unwrap().unwrap();
        assert_eq!(loan.status(), LoanStatus::Issued);
        assert_eq!(store.title(TitleId(1)).unwrap().unwrap().stock(), 0);
    }

    #[test]
    fn close_is_conditional_on_issued() {
        let store = seeded();
        let loan_id = issue(&store);
        let close = Mutation::CloseLoan {
            id: loan_id,
            at: t0(),
            rate_per_day: 2,
        };
        store.commit(Batch::new().with(close.clone())).unwrap();
        assert_eq!(
            store.commit(Batch::new().with(close)),
            Err(LoanError::LoanNotOutstanding(loan_id))
        );
    }

    #[test]
    fn removal_blocked_by_outstanding_loan() {
        let store = seeded();
        issue(&store);
        assert_eq!(
            store.commit(Batch::new().with(Mutation::RemoveTitle(TitleId(1)))),
            Err(LoanError::TitleHasActiveLoans(TitleId(1)))
        );
        assert_eq!(
            store.commit(Batch::new().with(Mutation::RemoveBorrower(BorrowerId(7)))),
            Err(LoanError::BorrowerHasActiveLoans(BorrowerId(7)))
        );
    }

    #[test]
    fn settle_fine_marks_loan() {
        let store = seeded();
        let loan_id = issue(&store);
        let at = t0() + Duration::days(20);
        let fine = Fine::late_return(FineId(1), BorrowerId(7), loan_id, 12, at);
        store
            .commit(
                Batch::new()
                    .with(Mutation::CloseLoan {
                        id: loan_id,
                        at,
                        rate_per_day: 2,
                    })
                    .with(Mutation::RestoreCopy(TitleId(1)))
                    .with(Mutation::InsertFine(fine)),
            )
            .unwrap();
        assert!(!store.loan(loan_id).unwrap().unwrap().fine_paid());

        store
            .commit(Batch::new().with(Mutation::SettleFine { id: FineId(1), at }))
            .unwrap();
        assert!(store.fine(FineId(1)).unwrap().unwrap().is_paid());
        assert!(store.loan(loan_id).unwrap().unwrap().fine_paid());
    }

    #[test]
    fn loan_queries_filter_and_order() {
        let store = MemoryStore::new();
        store
            .commit(
                Batch::new()
                    .with(Mutation::InsertTitle(title(1, "111", 5)))
                    .with(Mutation::InsertBorrower(student(1)))
                    .with(Mutation::InsertBorrower(student(2))),
            )
            .unwrap();
        for (borrower, days) in [(1, 10), (2, 3), (1, 5)] {
            let id = store.next_loan_id().unwrap();
            let loan = Loan::issue(id, TitleId(1), BorrowerId(borrower), t0(), days).unwrap();
            store
                .commit(
                    Batch::new()
                        .with(Mutation::TakeCopy(TitleId(1)))
                        .with(Mutation::InsertLoan(loan)),
                )
                .unwrap();
        }

        let mine = store.loans(&LoanQuery::all().for_borrower(BorrowerId(1))).unwrap();
        assert_eq!(mine.len(), 2);

        let by_due = store
            .loans(&LoanQuery::outstanding().order_by(LoanOrder::DueAt))
            .unwrap();
        let ids: Vec<u32> = by_due.iter().map(|l| l.id().0).collect();
        assert_eq!(ids, vec![2, 3, 1]);
    }

    #[test]
    fn snapshot_round_trip_resumes_ids() {
        let store = seeded();
        issue(&store);
        let restored = MemoryStore::from_snapshot(store.snapshot()).unwrap();
        assert_eq!(restored.snapshot(), store.snapshot());
        assert_eq!(restored.next_loan_id().unwrap(), LoanId(2));
        assert_eq!(restored.next_fine_id().unwrap(), FineId(1));
    }

    #[test]
    fn snapshot_rejects_dangling_loans() {
        let snapshot = Snapshot {
            loans: vec![Loan::issue(LoanId(1), TitleId(9), BorrowerId(9), t0(), 14).unwrap()],
            ..Snapshot::default()
        };
        assert_eq!(
            MemoryStore::from_snapshot(snapshot).err(),
            Some(LoanError::TitleNotFound(TitleId(9)))
        );
    }

    #[test]
    fn snapshot_rejects_stock_that_ignores_loans() {
        let store = seeded();
        issue(&store);
        let mut snapshot = store.snapshot();
        snapshot.titles = vec![title(1, "111", 1)];
        assert_eq!(
            MemoryStore::from_snapshot(snapshot).err(),
            Some(LoanError::StockMismatch(TitleId(1)))
        );
    }

    #[test]
    fn one_fine_per_loan() {
        let store = seeded();
        let loan_id = issue(&store);
        let at = t0() + Duration::days(20);
        let first = Fine::late_return(FineId(1), BorrowerId(7), loan_id, 12, at);
        let second = Fine::late_return(FineId(2), BorrowerId(7), loan_id, 12, at);
        store.commit(Batch::new().with(Mutation::InsertFine(first.clone()))).unwrap();
        assert_eq!(
            store.commit(Batch::new().with(Mutation::InsertFine(second.clone()))),
            Err(LoanError::LoanAlreadyFined(loan_id))
        );

        let mut snapshot = store.snapshot();
        snapshot.fines = vec![first, second];
        assert_eq!(
            MemoryStore::from_snapshot(snapshot).err(),
            Some(LoanError::LoanAlreadyFined(loan_id))
        );
    }
}
