use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::RepositoryError;
use crate::models::{
    Address, Buddy, ChatParticipant, ChatRoom, Gig, GigCreate, GigFilter, GigStatus, GigUpdate,
    Message, NearbyUser, NewMessage, NewSession, NewTransaction, NewUser, PaymentSummary,
    ProfileUpdate, Review, ReviewCreate, ReviewUpdate, Transaction, TransactionStatus,
    UploadedFile, User, UserSession,
};

mod memory;
mod postgres;

pub use memory::InMemoryRepository;
pub use postgres::PostgresRepository;

pub type RepoResult<T> = Result<T, RepositoryError>;

/// Conflict detail when an escrow is released against a cancelled gig.
pub const CANCELLED_GIG_RELEASE: &str = "Cannot release payment for a cancelled gig";

/// Repository Trait
///
/// Abstract contract for all persistence operations. Handlers only ever see
/// `Arc<dyn Repository>`, so the Postgres backend and the in-memory backend used by
/// the test suite are interchangeable.
///
/// Ownership-guarded writes take the acting user's id and affect nothing (returning
/// `None`/`false`) when the guard does not hold.
#[async_trait]
pub trait Repository: Send + Sync {
    /// Liveness check for GET /health.
    async fn ping(&self) -> RepoResult<()>;

    // --- Users ---
    /// Fails with `RepositoryError::Conflict` when the email is taken.
    async fn create_user(&self, user: NewUser) -> RepoResult<User>;
    async fn get_user(&self, id: Uuid) -> RepoResult<Option<User>>;
    async fn get_user_by_email(&self, email: &str) -> RepoResult<Option<User>>;
    async fn get_address(&self, id: Uuid) -> RepoResult<Option<Address>>;
    /// Applies a validated profile upsert, creating or updating the address in place,
    /// and marks the profile as set up.
    async fn update_profile(&self, user_id: Uuid, update: ProfileUpdate) -> RepoResult<Option<User>>;
    async fn set_availability(&self, user_id: Uuid, is_available: bool) -> RepoResult<Option<User>>;
    async fn set_profile_image(&self, user_id: Uuid, url: &str) -> RepoResult<Option<User>>;
    /// Users with an address point within `radius_km` of (lat, lon), nearest first.
    async fn find_nearby_users(
        &self,
        exclude: Uuid,
        latitude: f64,
        longitude: f64,
        radius_km: f64,
        only_available: bool,
    ) -> RepoResult<Vec<NearbyUser>>;
    async fn set_reputation(&self, user_id: Uuid, score: f64, total_reviews: i32) -> RepoResult<()>;

    // --- Sessions & Token Blacklist ---
    async fn create_session(&self, session: NewSession) -> RepoResult<UserSession>;
    /// Closes the active, unexpired session owning `refresh_jti`. `false` when no such
    /// session was open, so only one caller can ever close a given session.
    async fn deactivate_session(&self, refresh_jti: Uuid) -> RepoResult<bool>;
    async fn deactivate_user_sessions(&self, user_id: Uuid) -> RepoResult<u64>;
    async fn list_active_sessions(&self, user_id: Uuid) -> RepoResult<Vec<UserSession>>;
    async fn blacklist_token(&self, jti: Uuid, user_id: Uuid, expires_at: DateTime<Utc>) -> RepoResult<()>;
    async fn is_token_blacklisted(&self, jti: Uuid) -> RepoResult<bool>;
    /// Removes expired blacklist rows and expired sessions. Returns rows removed.
    async fn purge_expired_tokens(&self) -> RepoResult<u64>;

    // --- Gigs ---
    async fn create_gig(&self, seeker_id: Uuid, gig: GigCreate) -> RepoResult<Gig>;
    async fn get_gig(&self, id: Uuid) -> RepoResult<Option<Gig>>;
    /// Returns one page of matches plus the total match count.
    async fn search_gigs(&self, filter: &GigFilter) -> RepoResult<(Vec<Gig>, i64)>;
    async fn list_user_gigs(
        &self,
        user_id: Uuid,
        as_seeker: bool,
        limit: i64,
        offset: i64,
    ) -> RepoResult<(Vec<Gig>, i64)>;
    /// Seeker-only partial update.
    async fn update_gig(&self, id: Uuid, seeker_id: Uuid, update: GigUpdate) -> RepoResult<Option<Gig>>;
    /// Seeker-only; only while pending and unassigned.
    async fn delete_gig(&self, id: Uuid, seeker_id: Uuid) -> RepoResult<bool>;
    /// Assigns `helper_id` iff the gig is still pending and unassigned, and opens (or
    /// reuses) the seeker/helper chat room in the same transaction.
    async fn accept_gig(&self, id: Uuid, helper_id: Uuid) -> RepoResult<Option<(Gig, ChatRoom)>>;
    /// Compare-and-set on the status column; `completed` stamps `completed_at`.
    async fn update_gig_status(&self, id: Uuid, from: GigStatus, to: GigStatus) -> RepoResult<Option<Gig>>;

    // --- Chat ---
    /// Room for `gig_id` in which both users participate, created when missing.
    async fn get_or_create_room(&self, gig_id: Uuid, first: Uuid, second: Uuid) -> RepoResult<ChatRoom>;
    async fn get_room(&self, id: Uuid) -> RepoResult<Option<ChatRoom>>;
    async fn list_participants(&self, room_id: Uuid) -> RepoResult<Vec<ChatParticipant>>;
    async fn get_participant(&self, room_id: Uuid, user_id: Uuid) -> RepoResult<Option<ChatParticipant>>;
    /// Active rooms of `user_id`, most recently updated first.
    async fn list_user_rooms(&self, user_id: Uuid, limit: i64, offset: i64) -> RepoResult<Vec<ChatRoom>>;
    /// Inserts the message and bumps the room's `updated_at`.
    async fn create_message(&self, message: NewMessage) -> RepoResult<Message>;
    /// Newest first, plus the total message count of the room.
    async fn list_messages(&self, room_id: Uuid, limit: i64, offset: i64) -> RepoResult<(Vec<Message>, i64)>;
    async fn count_unread(&self, room_id: Uuid, user_id: Uuid) -> RepoResult<i64>;
    async fn mark_room_read(&self, room_id: Uuid, user_id: Uuid) -> RepoResult<bool>;
    async fn deactivate_room(&self, room_id: Uuid) -> RepoResult<bool>;

    // --- Buddies ---
    /// Fails with `RepositoryError::Conflict` on a duplicate pair.
    async fn add_buddy(&self, user_id: Uuid, buddy_id: Uuid, notes: Option<String>) -> RepoResult<Buddy>;
    async fn get_buddy(&self, user_id: Uuid, buddy_id: Uuid) -> RepoResult<Option<Buddy>>;
    async fn list_buddies(
        &self,
        user_id: Uuid,
        only_available: bool,
        skip: i64,
        limit: i64,
    ) -> RepoResult<(Vec<Buddy>, i64)>;
    async fn update_buddy_notes(&self, user_id: Uuid, buddy_id: Uuid, notes: Option<String>) -> RepoResult<Option<Buddy>>;
    async fn remove_buddy(&self, user_id: Uuid, buddy_id: Uuid) -> RepoResult<bool>;

    // --- Reviews ---
    /// Fails with `RepositoryError::Conflict` when (gig, reviewer, reviewee) already exists.
    async fn create_review(&self, reviewer_id: Uuid, review: ReviewCreate) -> RepoResult<Review>;
    async fn get_review(&self, id: Uuid) -> RepoResult<Option<Review>>;
    async fn find_review(&self, gig_id: Uuid, reviewer_id: Uuid, reviewee_id: Uuid) -> RepoResult<Option<Review>>;
    async fn list_reviews_for_user(&self, reviewee_id: Uuid, skip: i64, limit: i64) -> RepoResult<Vec<Review>>;
    async fn list_reviews_for_gig(&self, gig_id: Uuid) -> RepoResult<Vec<Review>>;
    async fn list_reviews_by_reviewer(&self, reviewer_id: Uuid, skip: i64, limit: i64) -> RepoResult<Vec<Review>>;
    /// (rating, count) pairs for every star value the user has received.
    async fn rating_counts(&self, reviewee_id: Uuid) -> RepoResult<Vec<(i32, i64)>>;
    /// Reviewer-only.
    async fn update_review(&self, id: Uuid, reviewer_id: Uuid, update: ReviewUpdate) -> RepoResult<Option<Review>>;
    /// Reviewer-only. Returns the removed row.
    async fn delete_review(&self, id: Uuid, reviewer_id: Uuid) -> RepoResult<Option<Review>>;

    // --- Transactions ---
    /// Fails with `RepositoryError::Conflict` when the gig already has a transaction.
    async fn create_transaction(&self, tx: NewTransaction) -> RepoResult<Transaction>;
    async fn get_transaction(&self, id: Uuid) -> RepoResult<Option<Transaction>>;
    async fn get_transaction_by_gig(&self, gig_id: Uuid) -> RepoResult<Option<Transaction>>;
    async fn list_user_transactions(
        &self,
        user_id: Uuid,
        status: Option<TransactionStatus>,
        skip: i64,
        limit: i64,
    ) -> RepoResult<(Vec<Transaction>, i64)>;
    /// Moves a pending transaction to `to`. Completing also completes the gig, and fails
    /// with `Conflict` when the gig was cancelled.
    async fn settle_transaction(&self, id: Uuid, to: TransactionStatus) -> RepoResult<Option<Transaction>>;
    async fn payment_summary(&self, user_id: Uuid) -> RepoResult<PaymentSummary>;

    // --- Uploads ---
    async fn create_file(&self, file: UploadedFile) -> RepoResult<UploadedFile>;
    /// Active files only.
    async fn get_file(&self, id: Uuid) -> RepoResult<Option<UploadedFile>>;
    async fn list_user_files(
        &self,
        user_id: Uuid,
        category: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> RepoResult<Vec<UploadedFile>>;
    /// Uploader-only soft delete. Returns the deactivated row.
    async fn deactivate_file(&self, id: Uuid, user_id: Uuid) -> RepoResult<Option<UploadedFile>>;
}

/// RepositoryState
///
/// The concrete type used to share the persistence layer across the application state.
pub type RepositoryState = Arc<dyn Repository>;
