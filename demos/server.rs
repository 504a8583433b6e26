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

//! Simple REST API server example for the loan engine.
//!
//! Run with: `cargo run --example server`
//!
//! Every mutating route needs an `x-operator-role` header naming the caller's
//! role (`admin`, `librarian` or `student`); the role is trusted as given and
//! checked against the capability table.
//!
//! # Example requests
//!
//! ```bash
//! # Catalogue a title
//! curl -X POST http://localhost:3000/titles \
//!   -H "Content-Type: application/json" -H "x-operator-role: librarian" \
//!   -d '{"id": 1, "isbn": "978-0-13-110362-7", "title": "K&R", "total_copies": 2}'
//!
//! # Register a student
//! curl -X POST http://localhost:3000/borrowers \
//!   -H "Content-Type: application/json" -H "x-operator-role: admin" \
//!   -d '{"id": 1, "name": "Ada", "email": "ada@example.edu"}'
//!
//! # Issue for 14 days
//! curl -X POST http://localhost:3000/loans \
//!   -H "Content-Type: application/json" -H "x-operator-role: librarian" \
//!   -d '{"title_id": 1, "borrower_id": 1, "days": 14}'
//!
//! # Return, then pay the fine if one was charged
//! curl -X POST http://localhost:3000/loans/1/return -H "x-operator-role: librarian"
//! curl -X POST http://localhost:3000/fines/1/pay -H "x-operator-role: librarian"
//!
//! # Dashboard figures
//! curl http://localhost:3000/stats
//! ```

use axum::{
    Json, Router,
    extract::{FromRequestParts, Path, Query, State},
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
};
use loan_engine_rs::{
    Borrower, BorrowerId, Capability, Engine, ErrorKind, Fine, FineId, LibraryStats, Loan,
    LoanError, LoanId, LoanState, NewBorrower, NewTitle, ReturnReceipt, Role, Title, TitleId,
    authorize,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

pub const OPERATOR_ROLE: &str = "x-operator-role";

// === Request/Response DTOs ===

/// Request body for issuing a copy.
///
/// ```json
/// {"title_id": 1, "borrower_id": 1, "days": 14}
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueRequest {
    #[serde(alias = "bookId", alias = "book_id")]
    pub title_id: u32,
    #[serde(alias = "studentId", alias = "student_id")]
    pub borrower_id: u32,
    /// Falls back to the policy's default period.
    #[serde(default, alias = "issuePeriod")]
    pub days: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CopiesRequest {
    #[serde(alias = "totalCopies")]
    pub total_copies: u32,
}

/// A loan as seen right now.
#[derive(Debug, Serialize)]
pub struct LoanResponse {
    #[serde(flatten)]
    pub loan: Loan,
    pub state: LoanState,
    /// Fine owed if the copy came back now.
    pub fine_now: u64,
}

#[derive(Debug, Default, Deserialize)]
pub struct LoanFilter {
    #[serde(default)]
    pub overdue: bool,
    #[serde(default)]
    pub borrower: Option<u32>,
}

/// Response body for errors.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

// === Application State ===

/// Shared application state containing the loan engine.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
}

// === Error Handling ===

/// Wrapper for converting `LoanError` into HTTP responses.
pub struct AppError(LoanError);

impl From<LoanError> for AppError {
    fn from(err: LoanError) -> Self {
        AppError(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = match (&self.0, self.0.kind()) {
            (LoanError::Forbidden, _) => (StatusCode::FORBIDDEN, "FORBIDDEN"),
            (_, ErrorKind::NotFound) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            (_, ErrorKind::Conflict) => (StatusCode::CONFLICT, "CONFLICT"),
            (_, ErrorKind::PolicyViolation) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "POLICY_VIOLATION")
            }
            (_, ErrorKind::Invalid) => (StatusCode::BAD_REQUEST, "INVALID"),
            (_, ErrorKind::StorageUnavailable) => {
                (StatusCode::SERVICE_UNAVAILABLE, "STORAGE_UNAVAILABLE")
            }
        };
        (
            status,
            Json(ErrorResponse {
                error: self.0.to_string(),
                code: code.to_string(),
            }),
        )
            .into_response()
    }
}

// === Operator ===

/// Role named by the `x-operator-role` header.
pub struct Operator(pub Role);

impl Operator {
    fn may(&self, capability: Capability) -> Result<(), AppError> {
        Ok(authorize(self.0, capability)?)
    }
}

impl<S: Send + Sync> FromRequestParts<S> for Operator {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(OPERATOR_ROLE)
            .and_then(|value| value.to_str().ok())
            .ok_or(LoanError::MissingField(OPERATOR_ROLE))?;
        Ok(Operator(raw.parse()?))
    }
}

// === Handlers ===

/// POST /titles - Catalogue a title.
async fn add_title(
    State(state): State<AppState>,
    operator: Operator,
    Json(request): Json<NewTitle>,
) -> Result<(StatusCode, Json<Title>), AppError> {
    operator.may(Capability::ManageCatalog)?;
    let title = state.engine.add_title(request)?;
    Ok((StatusCode::CREATED, Json(title)))
}

/// GET /titles - List the catalogue.
async fn list_titles(State(state): State<AppState>) -> Result<Json<Vec<Title>>, AppError> {
    Ok(Json(state.engine.titles()?))
}

/// GET /titles/{id} - Get a title by id.
async fn get_title(
    State(state): State<AppState>,
    Path(id): Path<u32>,
) -> Result<Json<Title>, AppError> {
    Ok(Json(state.engine.title(TitleId(id))?))
}

/// PUT /titles/{id}/copies - Change a title's capacity.
async fn set_copies(
    State(state): State<AppState>,
    operator: Operator,
    Path(id): Path<u32>,
    Json(request): Json<CopiesRequest>,
) -> Result<Json<Title>, AppError> {
    operator.may(Capability::ManageCatalog)?;
    Ok(Json(
        state
            .engine
            .set_total_copies(TitleId(id), request.total_copies)?,
    ))
}

/// DELETE /titles/{id} - Remove a title with no copy out.
async fn remove_title(
    State(state): State<AppState>,
    operator: Operator,
    Path(id): Path<u32>,
) -> Result<StatusCode, AppError> {
    operator.may(Capability::ManageCatalog)?;
    state.engine.remove_title(TitleId(id))?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /borrowers - Register a borrower.
async fn add_borrower(
    State(state): State<AppState>,
    operator: Operator,
    Json(request): Json<NewBorrower>,
) -> Result<(StatusCode, Json<Borrower>), AppError> {
    operator.may(Capability::ManageBorrowers)?;
    let borrower = state.engine.add_borrower(request)?;
    Ok((StatusCode::CREATED, Json(borrower)))
}

/// DELETE /borrowers/{id} - Remove a borrower holding nothing.
async fn remove_borrower(
    State(state): State<AppState>,
    operator: Operator,
    Path(id): Path<u32>,
) -> Result<StatusCode, AppError> {
    operator.may(Capability::ManageBorrowers)?;
    state.engine.remove_borrower(BorrowerId(id))?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /loans - Issue a copy.
async fn issue(
    State(state): State<AppState>,
    operator: Operator,
    Json(request): Json<IssueRequest>,
) -> Result<(StatusCode, Json<Loan>), AppError> {
    operator.may(Capability::Circulate)?;
    let (title, borrower) = (TitleId(request.title_id), BorrowerId(request.borrower_id));
    let loan = match request.days {
        Some(days) => state.engine.issue_copy(title, borrower, days)?,
        None => state.engine.issue_with_default_period(title, borrower)?,
    };
    Ok((StatusCode::CREATED, Json(loan)))
}

/// POST /loans/{id}/return - Return a copy.
async fn return_copy(
    State(state): State<AppState>,
    operator: Operator,
    Path(id): Path<u32>,
) -> Result<Json<ReturnReceipt>, AppError> {
    operator.may(Capability::Circulate)?;
    Ok(Json(state.engine.return_copy(LoanId(id))?))
}

fn describe(engine: &Engine, loan: Loan) -> Result<LoanResponse, LoanError> {
    let now = engine.now();
    Ok(LoanResponse {
        state: loan.state(now),
        fine_now: engine.preview_fine(loan.id())?,
        loan,
    })
}

/// GET /loans/{id} - Get a loan with its current state.
async fn get_loan(
    State(state): State<AppState>,
    Path(id): Path<u32>,
) -> Result<Json<LoanResponse>, AppError> {
    let loan = state.engine.loan(LoanId(id))?;
    Ok(Json(describe(&state.engine, loan)?))
}

/// GET /loans - List issued loans, or overdue ones with `?overdue=true`.
async fn list_loans(
    State(state): State<AppState>,
    Query(filter): Query<LoanFilter>,
) -> Result<Json<Vec<LoanResponse>>, AppError> {
    let engine = &state.engine;
    let loans = match (filter.overdue, filter.borrower) {
        (true, _) => engine.overdue_loans()?,
        (false, Some(id)) => engine.loans_for_borrower(BorrowerId(id))?,
        (false, None) => engine.outstanding_loans()?,
    };
    let described = loans
        .into_iter()
        .map(|loan| describe(engine, loan))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Json(described))
}

/// POST /fines/{id}/pay - Settle a fine.
async fn pay_fine(
    State(state): State<AppState>,
    operator: Operator,
    Path(id): Path<u32>,
) -> Result<Json<Fine>, AppError> {
    operator.may(Capability::SettleFines)?;
    Ok(Json(state.engine.settle_fine(FineId(id))?))
}

/// GET /fines/unpaid - List unpaid fines.
async fn unpaid_fines(State(state): State<AppState>) -> Result<Json<Vec<Fine>>, AppError> {
    Ok(Json(state.engine.unpaid_fines()?))
}

/// GET /stats - Dashboard figures.
async fn stats(State(state): State<AppState>) -> Result<Json<LibraryStats>, AppError> {
    Ok(Json(state.engine.stats()?))
}

// === Router ===

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/titles", post(add_title).get(list_titles))
        .route("/titles/{id}", get(get_title).delete(remove_title))
        .route("/titles/{id}/copies", put(set_copies))
        .route("/borrowers", post(add_borrower))
        .route("/borrowers/{id}", delete(remove_borrower))
        .route("/loans", post(issue).get(list_loans))
        .route("/loans/{id}", get(get_loan))
        .route("/loans/{id}/return", post(return_copy))
        .route("/fines/unpaid", get(unpaid_fines))
        .route("/fines/{id}/pay", post(pay_fine))
        .route("/stats", get(stats))
        .with_state(state)
}

// === Main ===

#[tokio::main]
async fn main() -> Result<(), std::io::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let state = AppState {
        engine: Arc::new(Engine::new()),
    };

    let app = create_router(state);

    let listener = TcpListener::bind("127.0.0.1:3000").await?;
    info!(addr = %listener.local_addr()?, "loan API server running");
    println!("Endpoints:");
    println!("  POST   /titles              - Catalogue a title");
    println!("  PUT    /titles/{{id}}/copies  - Change capacity");
    println!("  DELETE /titles/{{id}}         - Remove a title");
    println!("  POST   /borrowers           - Register a borrower");
    println!("  POST   /loans               - Issue a copy");
    println!("  POST   /loans/{{id}}/return   - Return a copy");
    println!("  GET    /loans?overdue=true  - List overdue loans");
    println!("  POST   /fines/{{id}}/pay      - Settle a fine");
    println!("  GET    /stats               - Dashboard figures");

    axum::serve(listener, app).await
}
