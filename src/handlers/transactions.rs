use axum::{
    Json,
    extract::{Path, Query, State},
};
use uuid::Uuid;

use crate::{
    AppState,
    auth::AuthUser,
    error::{AppError, AppResult, RepositoryError},
    geo::round2,
    handlers::{display_name, limit_param, offset_param},
    models::{
        CURRENCY, EscrowCreate, FeeQuery, GigStatus, HistoryQuery, NewTransaction, PaymentSummary,
        ServiceFeeCalculation, StatusQuery, Transaction, TransactionHistoryOut, TransactionOut,
        TransactionStatus,
    },
    repository::CANCELLED_GIG_RELEASE,
};

const DEFAULT_PAYMENT_METHOD: &str = "mock";

/// (service_fee, net_amount) for `amount` at `rate`, both rounded to 2 decimals.
pub fn split_fee(amount: f64, rate: f64) -> (f64, f64) {
    let fee = round2(amount * rate);
    (fee, round2(amount - fee))
}

/// Mock processor reference: `MOCK_` followed by 8 upper-case hex digits.
fn mock_reference() -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("MOCK_{}", hex[..8].to_uppercase())
}

fn involves(tx: &Transaction, user_id: Uuid) -> bool {
    tx.payer_id == user_id || tx.payee_id == user_id
}

async fn transaction_out(state: &AppState, tx: Transaction) -> AppResult<TransactionOut> {
    let gig_title = state
        .repo
        .get_gig(tx.gig_id)
        .await?
        .map(|gig| gig.title)
        .unwrap_or_else(|| "Unknown gig".to_string());
    Ok(TransactionOut {
        id: tx.id,
        gig_id: tx.gig_id,
        gig_title,
        payer_id: tx.payer_id,
        payer_name: display_name(state, tx.payer_id).await?,
        payee_id: tx.payee_id,
        payee_name: display_name(state, tx.payee_id).await?,
        amount: tx.amount,
        service_fee: tx.service_fee,
        net_amount: tx.net_amount,
        currency: tx.currency,
        status: tx.status,
        payment_method: tx.payment_method,
        transaction_ref: tx.transaction_ref,
        created_at: tx.created_at,
        completed_at: tx.completed_at,
    })
}

/// Loads a transaction the caller is party to: 404 when missing, 403 when not involved.
async fn visible_transaction(state: &AppState, tx: Option<Transaction>, user_id: Uuid) -> AppResult<TransactionOut> {
    let tx = tx.ok_or_else(|| AppError::not_found("Transaction"))?;
    if !involves(&tx, user_id) {
        return Err(AppError::Forbidden(
            "Not authorized to view this transaction".to_string(),
        ));
    }
    transaction_out(state, tx).await
}

/// settle
///
/// Moves a pending transaction the caller may act on to `to`. Anything else is a 404.
async fn settle(
    state: &AppState,
    id: Uuid,
    user_id: Uuid,
    to: TransactionStatus,
    may_act: fn(&Transaction, Uuid) -> bool,
) -> AppResult<TransactionOut> {
    let not_found = || AppError::not_found("Transaction");
    let tx = state.repo.get_transaction(id).await?.ok_or_else(not_found)?;
    if tx.status != TransactionStatus::Pending || !may_act(&tx, user_id) {
        return Err(not_found());
    }
    if to == TransactionStatus::Completed {
        let gig = state.repo.get_gig(tx.gig_id).await?;
        if gig.is_some_and(|g| g.status == GigStatus::Cancelled) {
            return Err(AppError::BadRequest(CANCELLED_GIG_RELEASE.to_string()));
        }
    }
    let settled = state
        .repo
        .settle_transaction(id, to)
        .await?
        .ok_or_else(not_found)?;
    tracing::info!(transaction_id = %id, status = ?to, "transaction settled");
    transaction_out(state, settled).await
}

/// create_escrow
///
/// [Authenticated Route] The seeker of an accepted gig parks its budget in a pending
/// mock transaction payable to the helper.
#[utoipa::path(
    post,
    path = "/api/transactions/escrow",
    request_body = EscrowCreate,
    responses(
        (status = 200, description = "Escrow created", body = TransactionOut),
        (status = 400, description = "Gig not eligible for escrow"),
        (status = 404, description = "Gig not found")
    ),
    security(("bearer" = [])),
    tag = "transactions"
)]
pub async fn create_escrow(
    AuthUser { id: payer_id, .. }: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<EscrowCreate>,
) -> AppResult<Json<TransactionOut>> {
    let gig = state
        .repo
        .get_gig(payload.gig_id)
        .await?
        .ok_or_else(|| AppError::not_found("Gig"))?;

    let payee_id = match (gig.status, gig.helper_id) {
        (GigStatus::Accepted, Some(helper_id)) => helper_id,
        _ => {
            return Err(AppError::BadRequest(
                "Gig must be accepted by a helper before escrow".to_string(),
            ));
        }
    };
    if gig.seeker_id != payer_id {
        return Err(AppError::BadRequest("Only the gig's seeker can fund escrow".to_string()));
    }
    if state.repo.get_transaction_by_gig(gig.id).await?.is_some() {
        return Err(AppError::BadRequest("Transaction already exists for this gig".to_string()));
    }

    let (service_fee, net_amount) = split_fee(gig.budget, state.config.service_fee_rate);
    let tx = state
        .repo
        .create_transaction(NewTransaction {
            gig_id: gig.id,
            payer_id,
            payee_id,
            amount: gig.budget,
            service_fee,
            net_amount,
            payment_method: payload
                .payment_method
                .filter(|m| !m.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_PAYMENT_METHOD.to_string()),
            transaction_ref: mock_reference(),
        })
        .await
        .map_err(|e| match e {
            RepositoryError::Conflict(_) => {
                AppError::BadRequest("Transaction already exists for this gig".to_string())
            }
            other => other.into(),
        })?;

    tracing::info!(transaction_id = %tx.id, gig_id = %gig.id, reference = %tx.transaction_ref, "escrow created");
    Ok(Json(transaction_out(&state, tx).await?))
}

/// release_payment
///
/// [Authenticated Route] Completes a pending transaction and, with it, the gig.
#[utoipa::path(
    put,
    path = "/api/transactions/{id}/release",
    params(("id" = Uuid, Path, description = "Transaction id")),
    responses(
        (status = 200, description = "Payment released", body = TransactionOut),
        (status = 404, description = "Not found, not pending, or caller not involved")
    ),
    security(("bearer" = [])),
    tag = "transactions"
)]
pub async fn release_payment(
    AuthUser { id: user_id, .. }: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<TransactionOut>> {
    Ok(Json(
        settle(&state, id, user_id, TransactionStatus::Completed, involves).await?,
    ))
}

/// cancel_transaction
///
/// [Authenticated Route] Payer-only cancellation of a pending transaction.
#[utoipa::path(
    put,
    path = "/api/transactions/{id}/cancel",
    params(("id" = Uuid, Path, description = "Transaction id")),
    responses(
        (status = 200, description = "Transaction cancelled", body = TransactionOut),
        (status = 404, description = "Not found, not pending, or caller not the payer")
    ),
    security(("bearer" = [])),
    tag = "transactions"
)]
pub async fn cancel_transaction(
    AuthUser { id: user_id, .. }: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<TransactionOut>> {
    Ok(Json(
        settle(&state, id, user_id, TransactionStatus::Cancelled, |tx, user| {
            tx.payer_id == user
        })
        .await?,
    ))
}

/// get_transaction
#[utoipa::path(
    get,
    path = "/api/transactions/{id}",
    params(("id" = Uuid, Path, description = "Transaction id")),
    responses(
        (status = 200, description = "Transaction", body = TransactionOut),
        (status = 403, description = "Caller not involved"),
        (status = 404, description = "Transaction not found")
    ),
    security(("bearer" = [])),
    tag = "transactions"
)]
pub async fn get_transaction(
    AuthUser { id: user_id, .. }: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<TransactionOut>> {
    let tx = state.repo.get_transaction(id).await?;
    Ok(Json(visible_transaction(&state, tx, user_id).await?))
}

/// get_gig_transaction
#[utoipa::path(
    get,
    path = "/api/transactions/gig/{gig_id}",
    params(("gig_id" = Uuid, Path, description = "Gig id")),
    responses(
        (status = 200, description = "Transaction of the gig", body = TransactionOut),
        (status = 403, description = "Caller not involved"),
        (status = 404, description = "No transaction for this gig")
    ),
    security(("bearer" = [])),
    tag = "transactions"
)]
pub async fn get_gig_transaction(
    AuthUser { id: user_id, .. }: AuthUser,
    State(state): State<AppState>,
    Path(gig_id): Path<Uuid>,
) -> AppResult<Json<TransactionOut>> {
    let tx = state.repo.get_transaction_by_gig(gig_id).await?;
    Ok(Json(visible_transaction(&state, tx, user_id).await?))
}

/// transaction_history
///
/// [Authenticated Route] Transactions the caller paid or received, newest first. Totals
/// cover the completed rows of the returned page.
#[utoipa::path(
    get,
    path = "/api/transactions/history/my",
    params(HistoryQuery),
    responses((status = 200, description = "Transaction history", body = TransactionHistoryOut)),
    security(("bearer" = [])),
    tag = "transactions"
)]
pub async fn transaction_history(
    AuthUser { id: user_id, .. }: AuthUser,
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> AppResult<Json<TransactionHistoryOut>> {
    let skip = offset_param(query.skip, "skip")?;
    let limit = limit_param(query.limit, 20, 100)?;
    let (rows, total_count) = state
        .repo
        .list_user_transactions(user_id, query.status, skip, limit)
        .await?;

    let (mut total_paid, mut total_received) = (0.0, 0.0);
    for tx in rows.iter().filter(|t| t.status == TransactionStatus::Completed) {
        if tx.payer_id == user_id {
            total_paid += tx.amount;
        }
        if tx.payee_id == user_id {
            total_received += tx.net_amount;
        }
    }

    let mut transactions = Vec::with_capacity(rows.len());
    for tx in rows {
        transactions.push(transaction_out(&state, tx).await?);
    }
    Ok(Json(TransactionHistoryOut {
        transactions,
        total_count,
        total_paid: round2(total_paid),
        total_received: round2(total_received),
        currency: CURRENCY.to_string(),
    }))
}

/// payment_summary
#[utoipa::path(
    get,
    path = "/api/transactions/summary/my",
    responses((status = 200, description = "Payment summary", body = PaymentSummary)),
    security(("bearer" = [])),
    tag = "transactions"
)]
pub async fn payment_summary(
    AuthUser { id, .. }: AuthUser,
    State(state): State<AppState>,
) -> AppResult<Json<PaymentSummary>> {
    let mut summary = state.repo.payment_summary(id).await?;
    summary.total_paid = round2(summary.total_paid);
    summary.total_received = round2(summary.total_received);
    Ok(Json(summary))
}

/// calculate_fee
///
/// [Public Route] Previews the platform fee for an amount. `fee_rate` defaults to the
/// configured service fee.
#[utoipa::path(
    post,
    path = "/api/transactions/calculate-fee",
    params(FeeQuery),
    responses(
        (status = 200, description = "Fee breakdown", body = ServiceFeeCalculation),
        (status = 422, description = "Amount or rate out of range")
    ),
    tag = "transactions"
)]
pub async fn calculate_fee(
    State(state): State<AppState>,
    Query(query): Query<FeeQuery>,
) -> AppResult<Json<ServiceFeeCalculation>> {
    if !query.amount.is_finite() || query.amount <= 0.0 {
        return Err(AppError::Validation("amount must be > 0".to_string()));
    }
    let fee_rate = query.fee_rate.unwrap_or(state.config.service_fee_rate);
    if !(0.0..=1.0).contains(&fee_rate) {
        return Err(AppError::Validation("fee_rate must be between 0 and 1".to_string()));
    }

    let (service_fee, net_amount) = split_fee(query.amount, fee_rate);
    Ok(Json(ServiceFeeCalculation {
        amount: query.amount,
        fee_rate,
        service_fee,
        net_amount,
        currency: CURRENCY.to_string(),
    }))
}

/// update_transaction_status
///
/// [Authenticated Route] Generic settlement of a pending transaction. `completed` behaves
/// like release.
#[utoipa::path(
    put,
    path = "/api/transactions/{id}/status",
    params(("id" = Uuid, Path, description = "Transaction id"), StatusQuery),
    responses(
        (status = 200, description = "Transaction updated", body = TransactionOut),
        (status = 400, description = "Target status is pending"),
        (status = 404, description = "Not found, not pending, or caller not involved")
    ),
    security(("bearer" = [])),
    tag = "transactions"
)]
pub async fn update_transaction_status(
    AuthUser { id: user_id, .. }: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<StatusQuery>,
) -> AppResult<Json<TransactionOut>> {
    if query.new_status == TransactionStatus::Pending {
        return Err(AppError::BadRequest(
            "Transaction is already pending".to_string(),
        ));
    }
    Ok(Json(
        settle(&state, id, user_id, query.new_status, involves).await?,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fee_split_rounds_to_satang() {
        assert_eq!(split_fee(500.0, 0.05), (25.0, 475.0));
        assert_eq!(split_fee(1234.0, 0.05), (61.7, 1172.3));
        assert_eq!(split_fee(100.0, 0.0), (0.0, 100.0));
    }

    #[test]
    fn mock_reference_shape() {
        let reference = mock_reference();
        assert!(reference.starts_with("MOCK_"));
        let suffix = &reference[5..];
        assert_eq!(suffix.len(), 8);
        assert!(suffix.chars().all(|c| c.is_ascii_digit() || c.is_ascii_uppercase()));
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
