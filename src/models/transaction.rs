use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

pub const CURRENCY: &str = "THB";

/// TransactionStatus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema, sqlx::Type, Default)]
#[sqlx(type_name = "transaction_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum TransactionStatus {
    #[default]
    Pending,
    Completed,
    Cancelled,
    Failed,
}

/// Transaction
///
/// Mock escrow record. At most one exists per gig.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, Default)]
pub struct Transaction {
    pub id: Uuid,
    pub gig_id: Uuid,
    pub payer_id: Uuid,
    pub payee_id: Uuid,
    pub amount: f64,
    pub service_fee: f64,
    pub net_amount: f64,
    pub currency: String,
    pub status: TransactionStatus,
    pub payment_method: String,
    pub transaction_ref: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// NewTransaction
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub gig_id: Uuid,
    pub payer_id: Uuid,
    pub payee_id: Uuid,
    pub amount: f64,
    pub service_fee: f64,
    pub net_amount: f64,
    pub payment_method: String,
    pub transaction_ref: String,
}

// --- Request Payloads ---

/// EscrowCreate
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct EscrowCreate {
    pub gig_id: Uuid,
    #[schema(example = "mock")]
    pub payment_method: Option<String>,
}

/// HistoryQuery
#[derive(Debug, Clone, Deserialize, IntoParams, Default)]
pub struct HistoryQuery {
    pub skip: Option<i64>,
    pub limit: Option<i64>,
    pub status: Option<TransactionStatus>,
}

/// FeeQuery
#[derive(Debug, Clone, Deserialize, IntoParams)]
pub struct FeeQuery {
    pub amount: f64,
    /// Defaults to the configured platform rate.
    pub fee_rate: Option<f64>,
}

/// StatusQuery
#[derive(Debug, Clone, Deserialize, IntoParams)]
pub struct StatusQuery {
    pub new_status: TransactionStatus,
}

// --- Response Schemas ---

/// TransactionOut
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct TransactionOut {
    pub id: Uuid,
    pub gig_id: Uuid,
    pub gig_title: String,
    pub payer_id: Uuid,
    pub payer_name: String,
    pub payee_id: Uuid,
    pub payee_name: String,
    pub amount: f64,
    pub service_fee: f64,
    pub net_amount: f64,
    pub currency: String,
    pub status: TransactionStatus,
    pub payment_method: String,
    pub transaction_ref: String,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string | null")]
    pub completed_at: Option<DateTime<Utc>>,
}

/// TransactionHistoryOut
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct TransactionHistoryOut {
    pub transactions: Vec<TransactionOut>,
    pub total_count: i64,
    pub total_paid: f64,
    pub total_received: f64,
    pub currency: String,
}

/// PaymentSummary
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct PaymentSummary {
    pub total_paid: f64,
    pub total_received: f64,
    pub pending_transactions: i64,
    pub completed_transactions: i64,
    pub currency: String,
}

/// ServiceFeeCalculation
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct ServiceFeeCalculation {
    pub amount: f64,
    pub fee_rate: f64,
    pub service_fee: f64,
    pub net_amount: f64,
    pub currency: String,
}
