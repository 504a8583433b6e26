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

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use clap::{Parser, ValueEnum};
use csv::{ReaderBuilder, Trim, Writer};
use loan_engine_rs::{
    BorrowerId, Engine, FineId, FineQuery, Isbn, LoanError, LoanId, LoanQuery, LoanState,
    ManualClock, NewBorrower, NewTitle, Policy, PolicyError, Role, TitleId,
};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

/// Loan Engine - Replay circulation CSV files
///
/// Reads library operations from a CSV file and writes a report to stdout.
/// Supports cataloguing titles, registering borrowers, issues, returns and
/// fine payments.
#[derive(Parser, Debug)]
#[command(name = "loan-engine-rs")]
#[command(about = "A library loan engine that replays circulation CSVs", long_about = None)]
struct Args {
    /// Path to CSV file with operations
    ///
    /// Expected format: type,at,title,borrower,loan,fine,isbn,name,email,copies,days,role
    /// Example: cargo run -- circulation.csv > loans.csv
    #[arg(value_name = "FILE")]
    input: PathBuf,

    /// Report written to stdout
    #[arg(long, value_enum, default_value_t = Report::Loans)]
    report: Report,

    /// Policy file (JSON); flags below override its values
    #[arg(long, env = "LOAN_POLICY")]
    config: Option<PathBuf>,

    /// Fine charged per started day past the due date
    #[arg(long, env = "LOAN_FINE_PER_DAY")]
    fine_per_day: Option<u64>,

    /// Default issue period in days
    #[arg(long, env = "LOAN_ISSUE_DAYS")]
    issue_days: Option<u32>,

    /// Maximum outstanding loans per borrower (0 lifts the cap)
    #[arg(long, env = "LOAN_MAX_LOANS")]
    max_loans: Option<u32>,

    /// Keep lending to borrowers with overdue loans or unpaid fines
    #[arg(long)]
    no_blocking: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Report {
    Loans,
    Fines,
    Stats,
}

impl Args {
    fn policy(&self) -> Result<Policy, PolicyError> {
        let mut policy = match &self.config {
            Some(path) => Policy::from_path(path)?,
            None => Policy::default(),
        };
        if let Some(rate) = self.fine_per_day {
            policy.fine_per_day = rate;
        }
        if let Some(days) = self.issue_days {
            policy.default_issue_days = days;
        }
        if let Some(max) = self.max_loans {
            policy.max_loans_per_borrower = (max > 0).then_some(max);
        }
        if self.no_blocking {
            policy.block_on_outstanding = false;
        }
        policy.validate()?;
        Ok(policy)
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let policy = match args.policy() {
        Ok(policy) => policy,
        Err(e) => {
            eprintln!("Error loading policy: {}", e);
            process::exit(1);
        }
    };

    let file = match File::open(&args.input) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Error opening file '{}': {}", args.input.display(), e);
            process::exit(1);
        }
    };

    let engine = match process_operations(BufReader::new(file), policy) {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("Error processing operations: {}", e);
            process::exit(1);
        }
    };

    let written = match args.report {
        Report::Loans => write_loans(&engine, std::io::stdout()),
        Report::Fines => write_fines(&engine, std::io::stdout()),
        Report::Stats => write_stats(&engine, std::io::stdout()),
    };
    if let Err(e) = written {
        eprintln!("Error writing output: {}", e);
        process::exit(1);
    }
}

/// Why a row could not be turned into an operation.
#[derive(Debug, Error)]
enum RowError {
    #[error("unknown operation type '{0}'")]
    UnknownType(String),
    #[error("missing column '{0}'")]
    Missing(&'static str),
    #[error("unreadable timestamp '{0}'")]
    Timestamp(String),
    #[error(transparent)]
    Rejected(#[from] LoanError),
}

/// Raw CSV record matching the input format.
#[derive(Debug, Default, Deserialize)]
struct CsvRecord {
    #[serde(rename = "type")]
    op_type: String,
    #[serde(default)]
    at: Option<String>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    title: Option<u32>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    borrower: Option<u32>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    loan: Option<u32>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    fine: Option<u32>,
    #[serde(default)]
    isbn: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    copies: Option<u32>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    days: Option<u32>,
    #[serde(default)]
    role: Option<String>,
}

#[derive(Debug, PartialEq)]
enum Operation {
    AddTitle(NewTitle),
    SetCopies(TitleId, u32),
    AddBorrower(NewBorrower),
    Issue {
        title: TitleId,
        borrower: BorrowerId,
        days: Option<u32>,
    },
    Return(LoanId),
    Pay(FineId),
    RemoveTitle(TitleId),
    RemoveBorrower(BorrowerId),
}

fn present(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

impl CsvRecord {
    /// Instant the row happens at, if it names one.
    fn instant(&self) -> Result<Option<DateTime<Utc>>, RowError> {
        let Some(raw) = self.at.as_deref().filter(|v| !v.is_empty()) else {
            return Ok(None);
        };
        if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
            return Ok(Some(at.with_timezone(&Utc)));
        }
        NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .map(|date| Some(date.and_time(NaiveTime::MIN).and_utc()))
            .map_err(|_| RowError::Timestamp(raw.to_string()))
    }

    fn into_operation(self) -> Result<Operation, RowError> {
        let title = self.title.map(TitleId).ok_or(RowError::Missing("title"));
        let borrower = self
            .borrower
            .map(BorrowerId)
            .ok_or(RowError::Missing("borrower"));

        match self.op_type.to_lowercase().as_str() {
            "title" => Ok(Operation::AddTitle(NewTitle {
                id: title?,
                isbn: present(self.isbn)
                    .map(Isbn::new)
                    .ok_or(RowError::Missing("isbn"))?,
                title: self.name.unwrap_or_default(),
                author: String::new(),
                total_copies: self.copies.ok_or(RowError::Missing("copies"))?,
            })),
            "copies" => Ok(Operation::SetCopies(
                title?,
                self.copies.ok_or(RowError::Missing("copies"))?,
            )),
            "borrower" => {
                let role = match present(self.role) {
                    Some(role) => role.parse::<Role>()?,
                    None => Role::Student,
                };
                let request = NewBorrower::student(
                    borrower?,
                    present(self.name).ok_or(RowError::Missing("name"))?,
                    present(self.email).ok_or(RowError::Missing("email"))?,
                );
                Ok(Operation::AddBorrower(request.with_role(role)))
            }
            "issue" => Ok(Operation::Issue {
                title: title?,
                borrower: borrower?,
                days: self.days,
            }),
            "return" => Ok(Operation::Return(
                self.loan.map(LoanId).ok_or(RowError::Missing("loan"))?,
            )),
            "pay" => Ok(Operation::Pay(
                self.fine.map(FineId).ok_or(RowError::Missing("fine"))?,
            )),
            "remove_title" => Ok(Operation::RemoveTitle(title?)),
            "remove_borrower" => Ok(Operation::RemoveBorrower(borrower?)),
            other => Err(RowError::UnknownType(other.to_string())),
        }
    }
}

fn apply(engine: &Engine, operation: Operation) -> Result<(), LoanError> {
    match operation {
        Operation::AddTitle(request) => engine.add_title(request).map(drop),
        Operation::SetCopies(id, copies) => engine.set_total_copies(id, copies).map(drop),
        Operation::AddBorrower(request) => engine.add_borrower(request).map(drop),
        Operation::Issue {
            title,
            borrower,
            days: Some(days),
        } => engine.issue_copy(title, borrower, days).map(drop),
        Operation::Issue {
            title,
            borrower,
            days: None,
        } => engine.issue_with_default_period(title, borrower).map(drop),
        Operation::Return(loan) => engine.return_copy(loan).map(drop),
        Operation::Pay(fine) => engine.settle_fine(fine).map(drop),
        Operation::RemoveTitle(id) => engine.remove_title(id),
        Operation::RemoveBorrower(id) => engine.remove_borrower(id),
    }
}

/// Replays operations from a CSV reader against a fresh engine.
///
/// Rows are streamed. A row's `at` column moves the engine's clock before
/// the row is applied; rows without one happen at the previous instant.
/// Malformed rows and rejected operations are logged and skipped.
///
/// # CSV Format
///
/// ```csv
/// type,at,title,borrower,loan,fine,isbn,name,email,copies,days,role
/// title,2024-01-01,1,,,,978-0-13-110362-7,The C Programming Language,,1,,
/// borrower,2024-01-01,,1,,,,Ada,ada@example.edu,,,student
/// issue,2024-01-01,1,1,,,,,,,14,
/// return,2024-01-21,,,1,,,,,,,
/// pay,2024-01-22,,,,1,,,,,,
/// ```
///
/// # Errors
///
/// Returns a CSV error if the reader fails or the header is unreadable.
pub fn process_operations<R: Read>(reader: R, policy: Policy) -> Result<Engine, csv::Error> {
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let engine = Engine::new().with_clock(clock.clone()).with_policy(policy);

    let mut rdr = ReaderBuilder::new()
        .trim(Trim::All)
        .flexible(true)
        .has_headers(true)
        .from_reader(reader);

    for (line, result) in rdr.deserialize::<CsvRecord>().enumerate() {
        let row = line + 1;
        let record = match result {
            Ok(record) => record,
            Err(e) => {
                warn!(row, error = %e, "skipping malformed row");
                continue;
            }
        };

        let outcome = record.instant().and_then(|at| {
            if let Some(at) = at {
                clock.set(at);
            }
            let operation = record.into_operation()?;
            debug!(row, ?operation, "applying");
            apply(&engine, operation).map_err(RowError::from)
        });
        if let Err(e) = outcome {
            warn!(row, error = %e, "skipping row");
        }
    }

    Ok(engine)
}

#[derive(Debug, Serialize)]
struct LoanRow {
    loan: LoanId,
    title: TitleId,
    borrower: BorrowerId,
    issued_at: DateTime<Utc>,
    due_at: DateTime<Utc>,
    returned_at: Option<DateTime<Utc>>,
    state: LoanState,
    fine: Option<u64>,
    fine_paid: bool,
}

/// Writes every loan, with its state as of the engine's clock.
///
/// # CSV Format
///
/// Columns: `loan, title, borrower, issued_at, due_at, returned_at, state, fine, fine_paid`
pub fn write_loans<W: Write>(engine: &Engine, writer: W) -> Result<(), csv::Error> {
    let mut wtr = Writer::from_writer(writer);
    let now = engine.now();
    let loans = engine
        .loans(&LoanQuery::all())
        .map_err(|e| std::io::Error::other(e.to_string()))?;

    for loan in loans {
        wtr.serialize(LoanRow {
            loan: loan.id(),
            title: loan.title_id(),
            borrower: loan.borrower_id(),
            issued_at: loan.issued_at(),
            due_at: loan.due_at(),
            returned_at: loan.returned_at(),
            state: loan.state(now),
            fine: loan.fine_amount(),
            fine_paid: loan.fine_paid(),
        })?;
    }

    wtr.flush()?;
    Ok(())
}

/// Writes every fine ever charged.
pub fn write_fines<W: Write>(engine: &Engine, writer: W) -> Result<(), csv::Error> {
    let mut wtr = Writer::from_writer(writer);
    let fines = engine
        .fines(&FineQuery::all())
        .map_err(|e| std::io::Error::other(e.to_string()))?;
    for fine in fines {
        wtr.serialize(&fine)?;
    }
    wtr.flush()?;
    Ok(())
}

/// Writes a single row of dashboard figures.
pub fn write_stats<W: Write>(engine: &Engine, writer: W) -> Result<(), csv::Error> {
    let mut wtr = Writer::from_writer(writer);
    let stats = engine
        .stats()
        .map_err(|e| std::io::Error::other(e.to_string()))?;
    wtr.serialize(&stats)?;
    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const HEADER: &str = "type,at,title,borrower,loan,fine,isbn,name,email,copies,days,role\n";

    fn replay(rows: &str) -> Engine {
        let csv = format!("{HEADER}{rows}");
        process_operations(Cursor::new(csv), Policy::default()).unwrap()
    }

    fn render(
        engine: &Engine,
        report: fn(&Engine, &mut Vec<u8>) -> Result<(), csv::Error>,
    ) -> String {
        let mut output = Vec::new();
        report(engine, &mut output).unwrap();
        String::from_utf8(output).unwrap()
    }

    const SETUP: &str = "title,2024-01-01,1,,,,978-0-13-110362-7,K&R,,1,,\n\
                         borrower,2024-01-01,,1,,,,Ada,ada@example.edu,,,\n";

    #[test]
    fn parse_title_and_borrower() {
        let engine = replay(SETUP);
        assert_eq!(engine.title(TitleId(1)).unwrap().stock(), 1);
        assert_eq!(engine.borrower(BorrowerId(1)).unwrap().role, Role::Student);
    }

    #[test]
    fn late_return_charges_fine() {
        let engine = replay(&format!(
            "{SETUP}issue,2024-01-01,1,1,,,,,,,14,\n\
             return,2024-01-21,,,1,,,,,,,\n"
        ));

        let loan = engine.loan(LoanId(1)).unwrap();
        assert_eq!(loan.fine_amount(), Some(12));
        assert_eq!(engine.title(TitleId(1)).unwrap().stock(), 1);
        assert_eq!(engine.unpaid_fines().unwrap().len(), 1);
    }

    #[test]
    fn pay_settles_fine() {
        let engine = replay(&format!(
            "{SETUP}issue,2024-01-01,1,1,,,,,,,14,\n\
             return,2024-01-21,,,1,,,,,,,\n\
             pay,2024-01-22,,,,1,,,,,,\n"
        ));

        assert!(engine.fine(FineId(1)).unwrap().is_paid());
        assert!(engine.loan(LoanId(1)).unwrap().fine_paid());
    }

    #[test]
    fn missing_days_uses_default_period() {
        let engine = replay(&format!("{SETUP}issue,2024-01-01T10:00:00Z,1,1,,,,,,,,\n"));
        let loan = engine.loan(LoanId(1)).unwrap();
        assert_eq!(loan.due_at() - loan.issued_at(), chrono::Duration::days(14));
    }

    #[test]
    fn rejected_operations_are_skipped() {
        let engine = replay(&format!(
            "{SETUP}issue,2024-01-01,1,1,,,,,,,14,\n\
             issue,2024-01-01,1,1,,,,,,,14,\n\
             return,2024-01-02,,,9,,,,,,,\n\
             teleport,2024-01-02,,,,,,,,,,\n\
             issue,not-a-date,1,1,,,,,,,14,\n"
        ));

        assert_eq!(engine.outstanding_loans().unwrap().len(), 1);
        assert_eq!(engine.title(TitleId(1)).unwrap().stock(), 0);
    }

    #[test]
    fn staff_cannot_borrow() {
        let engine = replay(
            "title,2024-01-01,1,,,,1,A,,1,,\n\
             borrower,2024-01-01,,2,,,,Lib,lib@example.edu,,,librarian\n\
             issue,2024-01-01,1,2,,,,,,,14,\n",
        );
        assert!(engine.outstanding_loans().unwrap().is_empty());
    }

    #[test]
    fn parse_with_whitespace() {
        let engine = replay(" title , 2024-01-01 , 7 ,,,, 42 , Dune ,, 3 ,, \n");
        assert_eq!(engine.title(TitleId(7)).unwrap().total_copies(), 3);
    }

    #[test]
    fn write_loans_to_csv() {
        let engine = replay(&format!(
            "{SETUP}issue,2024-01-01,1,1,,,,,,,14,\n\
             return,2024-01-21,,,1,,,,,,,\n"
        ));

        let output = render(&engine, |e, w| write_loans(e, w));
        let mut lines = output.lines();
        assert_eq!(
            lines.next(),
            Some("loan,title,borrower,issued_at,due_at,returned_at,state,fine,fine_paid")
        );
        let row = lines.next().unwrap();
        assert!(row.starts_with("1,1,1,"));
        assert!(row.ends_with(",returned,12,false"));
    }

    #[test]
    fn write_loans_reports_overdue_state() {
        let engine = replay(&format!(
            "{SETUP}issue,2024-01-01,1,1,,,,,,,14,\n\
             title,2024-02-01,2,,,,2,B,,1,,\n"
        ));
        let output = render(&engine, |e, w| write_loans(e, w));
        assert!(output.contains(",overdue,"));
    }

    #[test]
    fn write_fines_to_csv() {
        let engine = replay(&format!(
            "{SETUP}issue,2024-01-01,1,1,,,,,,,14,\n\
             return,2024-01-21,,,1,,,,,,,\n"
        ));
        assert_eq!(engine.fines(&FineQuery::all()).unwrap().len(), 1);

        let output = render(&engine, |e, w| write_fines(e, w));
        assert_eq!(output.lines().count(), 2);
        assert!(output.contains("Late return fine"));
    }

    #[test]
    fn write_stats_to_csv() {
        let engine = replay(&format!(
            "{SETUP}issue,2024-01-01,1,1,,,,,,,14,\n\
             return,2024-01-21,,,1,,,,,,,\n"
        ));
        let output = render(&engine, |e, w| write_stats(e, w));
        let mut lines = output.lines();
        assert!(lines.next().unwrap().starts_with("total_copies,issued,overdue"));
        assert!(lines.next().unwrap().starts_with("1,0,0,1,1,12,0,12,"));
    }

    #[test]
    fn flags_override_policy() {
        let args = Args::parse_from([
            "loan-engine-rs",
            "ops.csv",
            "--fine-per-day",
            "5",
            "--max-loans",
            "0",
            "--no-blocking",
        ]);
        let policy = args.policy().unwrap();
        assert_eq!(policy.fine_per_day, 5);
        assert_eq!(policy.max_loans_per_borrower, None);
        assert!(!policy.block_on_outstanding);
        assert_eq!(policy.default_issue_days, 14);
    }

    #[test]
    fn out_of_range_issue_days_rejected() {
        let args = Args::parse_from(["loan-engine-rs", "ops.csv", "--issue-days", "45"]);
        assert!(args.policy().is_err());
    }
}
