use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool, Postgres, query_builder::QueryBuilder};
use uuid::Uuid;

use super::{CANCELLED_GIG_RELEASE, RepoResult, Repository};
use crate::error::RepositoryError;
use crate::models::{
    Address, Buddy, CURRENCY, ChatParticipant, ChatRoom, Gig, GigCreate, GigFilter, GigStatus,
    GigUpdate, Message, NearbyUser, NewMessage, NewSession, NewTransaction, NewUser,
    PaymentSummary, ProfileUpdate, Review, ReviewCreate, ReviewUpdate, Transaction,
    TransactionStatus, UploadedFile, User, UserSession,
};

// --- Column Lists ---

const USER_COLUMNS: &str = "u.id, u.email, u.hashed_password, u.first_name, u.last_name, \
     u.phone_number, u.bio, u.additional_contact, u.profile_image_url, u.is_profile_setup, \
     u.is_available, u.is_verified, u.reputation_score, u.total_reviews, u.address_id, \
     u.created_at, u.updated_at";

const ADDRESS_COLUMNS: &str = "id, address_line, district, province, postal_code, country, \
     ST_Y(location) AS latitude, ST_X(location) AS longitude, created_at, updated_at";

const GIG_COLUMNS: &str = "g.id, g.title, g.description, g.duration_hours, g.budget, \
     ST_Y(g.location) AS latitude, ST_X(g.location) AS longitude, g.address_text, g.status, \
     g.image_urls, g.seeker_id, g.helper_id, g.starts_at, g.completed_at, g.created_at, \
     g.updated_at";

const MESSAGE_COLUMNS: &str = "id, chat_room_id, sender_id, content, message_type, image_url, \
     is_read, \"timestamp\"";

const SESSION_COLUMNS: &str = "id, user_id, refresh_jti, user_agent, ip_address, is_active, \
     created_at, last_used_at, expires_at";

/// Maps a unique-key violation to `RepositoryError::Conflict`, everything else to `Database`.
fn conflict_or(err: sqlx::Error, what: &str) -> RepositoryError {
    if let sqlx::Error::Database(db) = &err {
        if db.is_unique_violation() {
            return RepositoryError::Conflict(format!("{what} already exists"));
        }
    }
    tracing::error!("{what} insert error: {:?}", err);
    RepositoryError::Database(err)
}

/// PostgresRepository
///
/// The `Repository` implementation backed by PostgreSQL + PostGIS. Points are stored as
/// `geometry(POINT, 4326)`; every distance computation casts to `geography` so radii and
/// distances are in metres.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    /// Creates a new repository instance using the initialized connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Applies the embedded SQL migrations.
    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn fetch_gig_where_id(&self, id: Option<Uuid>) -> RepoResult<Option<Gig>> {
        match id {
            Some(id) => self.get_gig(id).await,
            None => Ok(None),
        }
    }
}

/// Oldest room of `gig_id` that has both users as participants.
async fn find_room_between(
    conn: &mut PgConnection,
    gig_id: Uuid,
    first: Uuid,
    second: Uuid,
) -> RepoResult<Option<ChatRoom>> {
    Ok(sqlx::query_as::<_, ChatRoom>(
        r#"SELECT r.id, r.gig_id, r.is_active, r.created_at, r.updated_at
           FROM chat_rooms r
           WHERE r.gig_id = $1
             AND EXISTS (SELECT 1 FROM chat_participants p WHERE p.chat_room_id = r.id AND p.user_id = $2)
             AND EXISTS (SELECT 1 FROM chat_participants p WHERE p.chat_room_id = r.id AND p.user_id = $3)
           ORDER BY r.created_at ASC
           LIMIT 1"#,
    )
    .bind(gig_id)
    .bind(first)
    .bind(second)
    .fetch_optional(&mut *conn)
    .await?)
}

async fn insert_room(
    conn: &mut PgConnection,
    gig_id: Uuid,
    first: Uuid,
    second: Uuid,
) -> RepoResult<ChatRoom> {
    let room = sqlx::query_as::<_, ChatRoom>(
        "INSERT INTO chat_rooms (id, gig_id) VALUES ($1, $2) RETURNING id, gig_id, is_active, created_at, updated_at",
    )
    .bind(Uuid::new_v4())
    .bind(gig_id)
    .fetch_one(&mut *conn)
    .await?;
    for user_id in [first, second] {
        sqlx::query(
            "INSERT INTO chat_participants (id, chat_room_id, user_id) VALUES ($1, $2, $3) ON CONFLICT DO NOTHING",
        )
        .bind(Uuid::new_v4())
        .bind(room.id)
        .bind(user_id)
        .execute(&mut *conn)
        .await?;
    }
    tracing::debug!(room_id = %room.id, %gig_id, "chat room created");
    Ok(room)
}

/// push_gig_filters
///
/// Appends the WHERE clause shared by the gig search page query and its count query.
fn push_gig_filters(builder: &mut QueryBuilder<'_, Postgres>, filter: &GigFilter) {
    builder.push(" WHERE g.status = ");
    builder.push_bind(filter.status);

    if let Some((lat, lon)) = filter.center {
        builder.push(" AND g.location IS NOT NULL AND ST_DWithin(g.location::geography, ST_SetSRID(ST_MakePoint(");
        builder.push_bind(lon);
        builder.push(", ");
        builder.push_bind(lat);
        builder.push("), 4326)::geography, ");
        builder.push_bind(filter.radius_km * 1000.0);
        builder.push(")");
    }
    if let Some(min) = filter.min_budget {
        builder.push(" AND g.budget >= ");
        builder.push_bind(min);
    }
    if let Some(max) = filter.max_budget {
        builder.push(" AND g.budget <= ");
        builder.push_bind(max);
    }
    if let Some(max) = filter.max_duration {
        builder.push(" AND g.duration_hours <= ");
        builder.push_bind(max);
    }
}

#[async_trait]
impl Repository for PostgresRepository {
    async fn ping(&self) -> RepoResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    // --- Users ---

    async fn create_user(&self, user: NewUser) -> RepoResult<User> {
        let sql = format!(
            "INSERT INTO users AS u (id, email, hashed_password) VALUES ($1, $2, $3) RETURNING {USER_COLUMNS}"
        );
        sqlx::query_as::<_, User>(&sql)
            .bind(Uuid::new_v4())
            .bind(&user.email)
            .bind(&user.hashed_password)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| conflict_or(e, "Email"))
    }

    async fn get_user(&self, id: Uuid) -> RepoResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users u WHERE u.id = $1");
        Ok(sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn get_user_by_email(&self, email: &str) -> RepoResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users u WHERE u.email = $1");
        Ok(sqlx::query_as::<_, User>(&sql)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn get_address(&self, id: Uuid) -> RepoResult<Option<Address>> {
        let sql = format!("SELECT {ADDRESS_COLUMNS} FROM addresses WHERE id = $1");
        Ok(sqlx::query_as::<_, Address>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    /// update_profile
    ///
    /// Runs in one transaction: the user row is locked, the address is inserted or
    /// updated, then the profile columns are COALESCEd with the new values.
    async fn update_profile(&self, user_id: Uuid, update: ProfileUpdate) -> RepoResult<Option<User>> {
        let mut tx = self.pool.begin().await?;

        let address_id: Option<Option<Uuid>> =
            sqlx::query_scalar("SELECT address_id FROM users WHERE id = $1 FOR UPDATE")
                .bind(user_id)
                .fetch_optional(&mut *tx)
                .await?;
        let Some(mut address_id) = address_id else {
            return Ok(None);
        };

        if let Some(addr) = &update.address {
            let country = addr.country.clone().unwrap_or_else(|| "Thailand".to_string());
            match address_id {
                Some(existing) => {
                    sqlx::query(
                        r#"UPDATE addresses SET address_line = $2, district = $3, province = $4,
                               postal_code = $5, country = $6,
                               location = CASE WHEN $7::float8 IS NULL OR $8::float8 IS NULL THEN NULL
                                               ELSE ST_SetSRID(ST_MakePoint($8::float8, $7::float8), 4326) END,
                               updated_at = now()
                           WHERE id = $1"#,
                    )
                    .bind(existing)
                    .bind(&addr.address_line)
                    .bind(&addr.district)
                    .bind(&addr.province)
                    .bind(&addr.postal_code)
                    .bind(&country)
                    .bind(addr.latitude)
                    .bind(addr.longitude)
                    .execute(&mut *tx)
                    .await?;
                }
                None => {
                    let new_id = Uuid::new_v4();
                    sqlx::query(
                        r#"INSERT INTO addresses (id, address_line, district, province, postal_code, country, location)
                           VALUES ($1, $2, $3, $4, $5, $6,
                               CASE WHEN $7::float8 IS NULL OR $8::float8 IS NULL THEN NULL
                                    ELSE ST_SetSRID(ST_MakePoint($8::float8, $7::float8), 4326) END)"#,
                    )
                    .bind(new_id)
                    .bind(&addr.address_line)
                    .bind(&addr.district)
                    .bind(&addr.province)
                    .bind(&addr.postal_code)
                    .bind(&country)
                    .bind(addr.latitude)
                    .bind(addr.longitude)
                    .execute(&mut *tx)
                    .await?;
                    address_id = Some(new_id);
                }
            }
        }

        sqlx::query(
            r#"UPDATE users SET
                   first_name = COALESCE($2, first_name),
                   last_name = COALESCE($3, last_name),
                   phone_number = COALESCE($4, phone_number),
                   bio = COALESCE($5, bio),
                   additional_contact = COALESCE($6, additional_contact),
                   profile_image_url = COALESCE($7, profile_image_url),
                   address_id = $8,
                   is_profile_setup = true,
                   updated_at = now()
               WHERE id = $1"#,
        )
        .bind(user_id)
        .bind(&update.first_name)
        .bind(&update.last_name)
        .bind(&update.phone_number)
        .bind(&update.bio)
        .bind(&update.additional_contact)
        .bind(&update.profile_image_url)
        .bind(address_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        self.get_user(user_id).await
    }

    async fn set_availability(&self, user_id: Uuid, is_available: bool) -> RepoResult<Option<User>> {
        let sql = format!(
            "UPDATE users AS u SET is_available = $2, updated_at = now() WHERE u.id = $1 RETURNING {USER_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, User>(&sql)
            .bind(user_id)
            .bind(is_available)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn set_profile_image(&self, user_id: Uuid, url: &str) -> RepoResult<Option<User>> {
        let sql = format!(
            "UPDATE users AS u SET profile_image_url = $2, updated_at = now() WHERE u.id = $1 RETURNING {USER_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, User>(&sql)
            .bind(user_id)
            .bind(url)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn find_nearby_users(
        &self,
        exclude: Uuid,
        latitude: f64,
        longitude: f64,
        radius_km: f64,
        only_available: bool,
    ) -> RepoResult<Vec<NearbyUser>> {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(format!("SELECT {USER_COLUMNS}, "));
        builder.push("ST_Distance(a.location::geography, ST_SetSRID(ST_MakePoint(");
        builder.push_bind(longitude);
        builder.push(", ");
        builder.push_bind(latitude);
        builder.push("), 4326)::geography) / 1000.0 AS distance_km");
        builder.push(" FROM users u JOIN addresses a ON a.id = u.address_id");
        builder.push(" WHERE a.location IS NOT NULL AND u.id <> ");
        builder.push_bind(exclude);
        builder.push(" AND ST_DWithin(a.location::geography, ST_SetSRID(ST_MakePoint(");
        builder.push_bind(longitude);
        builder.push(", ");
        builder.push_bind(latitude);
        builder.push("), 4326)::geography, ");
        builder.push_bind(radius_km * 1000.0);
        builder.push(")");
        if only_available {
            builder.push(" AND u.is_available = true");
        }
        builder.push(" ORDER BY distance_km ASC LIMIT 100");

        builder
            .build_query_as::<NearbyUser>()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!("find_nearby_users error: {:?}", e);
                e.into()
            })
    }

    async fn set_reputation(&self, user_id: Uuid, score: f64, total_reviews: i32) -> RepoResult<()> {
        sqlx::query(
            "UPDATE users SET reputation_score = $2, total_reviews = $3, updated_at = now() WHERE id = $1",
        )
        .bind(user_id)
        .bind(score)
        .bind(total_reviews)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // --- Sessions & Token Blacklist ---

    async fn create_session(&self, session: NewSession) -> RepoResult<UserSession> {
        let sql = format!(
            "INSERT INTO user_sessions (id, user_id, refresh_jti, user_agent, ip_address, expires_at)
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {SESSION_COLUMNS}"
        );
        sqlx::query_as::<_, UserSession>(&sql)
            .bind(Uuid::new_v4())
            .bind(session.user_id)
            .bind(session.refresh_jti)
            .bind(&session.user_agent)
            .bind(&session.ip_address)
            .bind(session.expires_at)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| conflict_or(e, "Session"))
    }

    async fn deactivate_session(&self, refresh_jti: Uuid) -> RepoResult<bool> {
        let result = sqlx::query(
            "UPDATE user_sessions SET is_active = false, last_used_at = now()
             WHERE refresh_jti = $1 AND is_active = true AND expires_at > now()",
        )
        .bind(refresh_jti)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn deactivate_user_sessions(&self, user_id: Uuid) -> RepoResult<u64> {
        let result = sqlx::query(
            "UPDATE user_sessions SET is_active = false WHERE user_id = $1 AND is_active = true",
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn list_active_sessions(&self, user_id: Uuid) -> RepoResult<Vec<UserSession>> {
        let sql = format!(
            "SELECT {SESSION_COLUMNS} FROM user_sessions
             WHERE user_id = $1 AND is_active = true AND expires_at > now()
             ORDER BY last_used_at DESC"
        );
        Ok(sqlx::query_as::<_, UserSession>(&sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn blacklist_token(&self, jti: Uuid, user_id: Uuid, expires_at: DateTime<Utc>) -> RepoResult<()> {
        sqlx::query(
            "INSERT INTO blacklisted_tokens (jti, user_id, expires_at) VALUES ($1, $2, $3) ON CONFLICT (jti) DO NOTHING",
        )
        .bind(jti)
        .bind(user_id)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn is_token_blacklisted(&self, jti: Uuid) -> RepoResult<bool> {
        Ok(sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM blacklisted_tokens WHERE jti = $1)",
        )
        .bind(jti)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn purge_expired_tokens(&self) -> RepoResult<u64> {
        let tokens = sqlx::query("DELETE FROM blacklisted_tokens WHERE expires_at <= now()")
            .execute(&self.pool)
            .await?;
        let sessions = sqlx::query("DELETE FROM user_sessions WHERE expires_at <= now()")
            .execute(&self.pool)
            .await?;
        Ok(tokens.rows_affected() + sessions.rows_affected())
    }

    // --- Gigs ---

    async fn create_gig(&self, seeker_id: Uuid, gig: GigCreate) -> RepoResult<Gig> {
        let id = Uuid::new_v4();
        sqlx::query(
            r#"INSERT INTO gigs (id, title, description, duration_hours, budget, location,
                                 address_text, image_urls, starts_at, seeker_id)
               VALUES ($1, $2, $3, $4, $5,
                   CASE WHEN $6::float8 IS NULL OR $7::float8 IS NULL THEN NULL
                        ELSE ST_SetSRID(ST_MakePoint($7::float8, $6::float8), 4326) END,
                   $8, $9, $10, $11)"#,
        )
        .bind(id)
        .bind(&gig.title)
        .bind(&gig.description)
        .bind(gig.duration_hours)
        .bind(gig.budget)
        .bind(gig.latitude)
        .bind(gig.longitude)
        .bind(&gig.address_text)
        .bind(&gig.image_urls)
        .bind(gig.starts_at)
        .bind(seeker_id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("create_gig error: {:?}", e);
            RepositoryError::Database(e)
        })?;

        self.get_gig(id)
            .await?
            .ok_or_else(|| RepositoryError::Corrupt(format!("gig {id} missing after insert")))
    }

    async fn get_gig(&self, id: Uuid) -> RepoResult<Option<Gig>> {
        let sql = format!("SELECT {GIG_COLUMNS} FROM gigs g WHERE g.id = $1");
        Ok(sqlx::query_as::<_, Gig>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    /// search_gigs
    ///
    /// With a center point: filtered by `ST_DWithin` and ordered nearest first, each row
    /// carrying `distance_km`. Without one: newest first.
    async fn search_gigs(&self, filter: &GigFilter) -> RepoResult<(Vec<Gig>, i64)> {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(format!("SELECT {GIG_COLUMNS}"));
        if let Some((lat, lon)) = filter.center {
            builder.push(", ST_Distance(g.location::geography, ST_SetSRID(ST_MakePoint(");
            builder.push_bind(lon);
            builder.push(", ");
            builder.push_bind(lat);
            builder.push("), 4326)::geography) / 1000.0 AS distance_km");
        }
        builder.push(" FROM gigs g");
        push_gig_filters(&mut builder, filter);
        if filter.center.is_some() {
            builder.push(" ORDER BY distance_km ASC, g.created_at DESC");
        } else {
            builder.push(" ORDER BY g.created_at DESC");
        }
        builder.push(" LIMIT ");
        builder.push_bind(filter.limit);
        builder.push(" OFFSET ");
        builder.push_bind(filter.offset);

        let gigs = builder
            .build_query_as::<Gig>()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!("search_gigs error: {:?}", e);
                RepositoryError::Database(e)
            })?;

        let mut count: QueryBuilder<Postgres> = QueryBuilder::new("SELECT COUNT(*) FROM gigs g");
        push_gig_filters(&mut count, filter);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        Ok((gigs, total))
    }

    async fn list_user_gigs(
        &self,
        user_id: Uuid,
        as_seeker: bool,
        limit: i64,
        offset: i64,
    ) -> RepoResult<(Vec<Gig>, i64)> {
        let column = if as_seeker { "seeker_id" } else { "helper_id" };
        let sql = format!(
            "SELECT {GIG_COLUMNS} FROM gigs g WHERE g.{column} = $1 ORDER BY g.created_at DESC LIMIT $2 OFFSET $3"
        );
        let gigs = sqlx::query_as::<_, Gig>(&sql)
            .bind(user_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;
        let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM gigs WHERE {column} = $1"))
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;
        Ok((gigs, total))
    }

    async fn update_gig(&self, id: Uuid, seeker_id: Uuid, update: GigUpdate) -> RepoResult<Option<Gig>> {
        let updated: Option<Uuid> = sqlx::query_scalar(
            r#"UPDATE gigs SET
                   title = COALESCE($3, title),
                   description = COALESCE($4, description),
                   duration_hours = COALESCE($5, duration_hours),
                   budget = COALESCE($6, budget),
                   location = CASE WHEN $7::float8 IS NULL OR $8::float8 IS NULL THEN location
                                   ELSE ST_SetSRID(ST_MakePoint($8::float8, $7::float8), 4326) END,
                   address_text = COALESCE($9, address_text),
                   image_urls = COALESCE($10, image_urls),
                   starts_at = COALESCE($11, starts_at),
                   updated_at = now()
               WHERE id = $1 AND seeker_id = $2
               RETURNING id"#,
        )
        .bind(id)
        .bind(seeker_id)
        .bind(&update.title)
        .bind(&update.description)
        .bind(update.duration_hours)
        .bind(update.budget)
        .bind(update.latitude)
        .bind(update.longitude)
        .bind(&update.address_text)
        .bind(&update.image_urls)
        .bind(update.starts_at)
        .fetch_optional(&self.pool)
        .await?;
        self.fetch_gig_where_id(updated).await
    }

    async fn delete_gig(&self, id: Uuid, seeker_id: Uuid) -> RepoResult<bool> {
        let result = sqlx::query(
            "DELETE FROM gigs WHERE id = $1 AND seeker_id = $2 AND status = 'pending' AND helper_id IS NULL",
        )
        .bind(id)
        .bind(seeker_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn accept_gig(&self, id: Uuid, helper_id: Uuid) -> RepoResult<Option<(Gig, ChatRoom)>> {
        let mut tx = self.pool.begin().await?;
        let updated: Option<(Uuid, Uuid)> = sqlx::query_as(
            r#"UPDATE gigs SET helper_id = $2, status = 'accepted', updated_at = now()
               WHERE id = $1 AND status = 'pending' AND helper_id IS NULL AND seeker_id <> $2
               RETURNING id, seeker_id"#,
        )
        .bind(id)
        .bind(helper_id)
        .fetch_optional(&mut *tx)
        .await?;
        let Some((gig_id, seeker_id)) = updated else {
            return Ok(None);
        };

        let room = match find_room_between(&mut tx, gig_id, seeker_id, helper_id).await? {
            Some(room) => room,
            None => insert_room(&mut tx, gig_id, seeker_id, helper_id).await?,
        };
        tx.commit().await?;

        Ok(self.get_gig(gig_id).await?.map(|gig| (gig, room)))
    }

    async fn update_gig_status(&self, id: Uuid, from: GigStatus, to: GigStatus) -> RepoResult<Option<Gig>> {
        let updated: Option<Uuid> = sqlx::query_scalar(
            r#"UPDATE gigs SET status = $3,
                   completed_at = CASE WHEN $3 = 'completed'::gig_status THEN now() ELSE completed_at END,
                   updated_at = now()
               WHERE id = $1 AND status = $2
               RETURNING id"#,
        )
        .bind(id)
        .bind(from)
        .bind(to)
        .fetch_optional(&self.pool)
        .await?;
        self.fetch_gig_where_id(updated).await
    }

    // --- Chat ---

    async fn get_or_create_room(&self, gig_id: Uuid, first: Uuid, second: Uuid) -> RepoResult<ChatRoom> {
        let mut tx = self.pool.begin().await?;
        let room = match find_room_between(&mut tx, gig_id, first, second).await? {
            Some(room) => room,
            None => insert_room(&mut tx, gig_id, first, second).await?,
        };
        tx.commit().await?;
        Ok(room)
    }

    async fn get_room(&self, id: Uuid) -> RepoResult<Option<ChatRoom>> {
        Ok(sqlx::query_as::<_, ChatRoom>(
            "SELECT id, gig_id, is_active, created_at, updated_at FROM chat_rooms WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn list_participants(&self, room_id: Uuid) -> RepoResult<Vec<ChatParticipant>> {
        Ok(sqlx::query_as::<_, ChatParticipant>(
            "SELECT id, chat_room_id, user_id, joined_at, last_read_at FROM chat_participants
             WHERE chat_room_id = $1 ORDER BY joined_at ASC",
        )
        .bind(room_id)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn get_participant(&self, room_id: Uuid, user_id: Uuid) -> RepoResult<Option<ChatParticipant>> {
        Ok(sqlx::query_as::<_, ChatParticipant>(
            "SELECT id, chat_room_id, user_id, joined_at, last_read_at FROM chat_participants
             WHERE chat_room_id = $1 AND user_id = $2",
        )
        .bind(room_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn list_user_rooms(&self, user_id: Uuid, limit: i64, offset: i64) -> RepoResult<Vec<ChatRoom>> {
        Ok(sqlx::query_as::<_, ChatRoom>(
            r#"SELECT r.id, r.gig_id, r.is_active, r.created_at, r.updated_at
               FROM chat_rooms r JOIN chat_participants p ON p.chat_room_id = r.id
               WHERE p.user_id = $1 AND r.is_active = true
               ORDER BY r.updated_at DESC
               LIMIT $2 OFFSET $3"#,
        )
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn create_message(&self, message: NewMessage) -> RepoResult<Message> {
        let mut tx = self.pool.begin().await?;
        let sql = format!(
            "INSERT INTO messages (id, chat_room_id, sender_id, content, message_type, image_url)
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {MESSAGE_COLUMNS}"
        );
        let stored = sqlx::query_as::<_, Message>(&sql)
            .bind(Uuid::new_v4())
            .bind(message.chat_room_id)
            .bind(message.sender_id)
            .bind(&message.content)
            .bind(message.message_type)
            .bind(&message.image_url)
            .fetch_one(&mut *tx)
            .await?;
        sqlx::query("UPDATE chat_rooms SET updated_at = now() WHERE id = $1")
            .bind(message.chat_room_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(stored)
    }

    async fn list_messages(&self, room_id: Uuid, limit: i64, offset: i64) -> RepoResult<(Vec<Message>, i64)> {
        let sql = format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE chat_room_id = $1
             ORDER BY \"timestamp\" DESC LIMIT $2 OFFSET $3"
        );
        let messages = sqlx::query_as::<_, Message>(&sql)
            .bind(room_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM messages WHERE chat_room_id = $1")
            .bind(room_id)
            .fetch_one(&self.pool)
            .await?;
        Ok((messages, total))
    }

    async fn count_unread(&self, room_id: Uuid, user_id: Uuid) -> RepoResult<i64> {
        Ok(sqlx::query_scalar::<_, i64>(
            r#"SELECT COUNT(*) FROM messages m
               JOIN chat_participants p ON p.chat_room_id = m.chat_room_id AND p.user_id = $2
               WHERE m.chat_room_id = $1 AND m.sender_id <> $2
                 AND (p.last_read_at IS NULL OR m."timestamp" > p.last_read_at)"#,
        )
        .bind(room_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn mark_room_read(&self, room_id: Uuid, user_id: Uuid) -> RepoResult<bool> {
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query(
            "UPDATE chat_participants SET last_read_at = now() WHERE chat_room_id = $1 AND user_id = $2",
        )
        .bind(room_id)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;
        if result.rows_affected() == 0 {
            return Ok(false);
        }
        sqlx::query(
            "UPDATE messages SET is_read = true WHERE chat_room_id = $1 AND sender_id <> $2 AND is_read = false",
        )
        .bind(room_id)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(true)
    }

    async fn deactivate_room(&self, room_id: Uuid) -> RepoResult<bool> {
        let result = sqlx::query("UPDATE chat_rooms SET is_active = false, updated_at = now() WHERE id = $1")
            .bind(room_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // --- Buddies ---

    async fn add_buddy(&self, user_id: Uuid, buddy_id: Uuid, notes: Option<String>) -> RepoResult<Buddy> {
        sqlx::query_as::<_, Buddy>(
            "INSERT INTO buddies (id, user_id, buddy_id, notes) VALUES ($1, $2, $3, $4)
             RETURNING id, user_id, buddy_id, notes, created_at",
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(buddy_id)
        .bind(notes)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| conflict_or(e, "Buddy"))
    }

    async fn get_buddy(&self, user_id: Uuid, buddy_id: Uuid) -> RepoResult<Option<Buddy>> {
        Ok(sqlx::query_as::<_, Buddy>(
            "SELECT id, user_id, buddy_id, notes, created_at FROM buddies WHERE user_id = $1 AND buddy_id = $2",
        )
        .bind(user_id)
        .bind(buddy_id)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn list_buddies(
        &self,
        user_id: Uuid,
        only_available: bool,
        skip: i64,
        limit: i64,
    ) -> RepoResult<(Vec<Buddy>, i64)> {
        let availability = if only_available { " AND u.is_available = true" } else { "" };
        let sql = format!(
            "SELECT b.id, b.user_id, b.buddy_id, b.notes, b.created_at
             FROM buddies b JOIN users u ON u.id = b.buddy_id
             WHERE b.user_id = $1{availability}
             ORDER BY b.created_at DESC LIMIT $2 OFFSET $3"
        );
        let buddies = sqlx::query_as::<_, Buddy>(&sql)
            .bind(user_id)
            .bind(limit)
            .bind(skip)
            .fetch_all(&self.pool)
            .await?;
        let count_sql = format!(
            "SELECT COUNT(*) FROM buddies b JOIN users u ON u.id = b.buddy_id WHERE b.user_id = $1{availability}"
        );
        let total: i64 = sqlx::query_scalar(&count_sql)
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;
        Ok((buddies, total))
    }

    async fn update_buddy_notes(&self, user_id: Uuid, buddy_id: Uuid, notes: Option<String>) -> RepoResult<Option<Buddy>> {
        Ok(sqlx::query_as::<_, Buddy>(
            "UPDATE buddies SET notes = $3 WHERE user_id = $1 AND buddy_id = $2
             RETURNING id, user_id, buddy_id, notes, created_at",
        )
        .bind(user_id)
        .bind(buddy_id)
        .bind(notes)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn remove_buddy(&self, user_id: Uuid, buddy_id: Uuid) -> RepoResult<bool> {
        let result = sqlx::query("DELETE FROM buddies WHERE user_id = $1 AND buddy_id = $2")
            .bind(user_id)
            .bind(buddy_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // --- Reviews ---

    async fn create_review(&self, reviewer_id: Uuid, review: ReviewCreate) -> RepoResult<Review> {
        sqlx::query_as::<_, Review>(
            "INSERT INTO reviews (id, gig_id, reviewer_id, reviewee_id, rating, comment)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING id, gig_id, reviewer_id, reviewee_id, rating, comment, created_at, updated_at",
        )
        .bind(Uuid::new_v4())
        .bind(review.gig_id)
        .bind(reviewer_id)
        .bind(review.reviewee_id)
        .bind(review.rating)
        .bind(&review.comment)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| conflict_or(e, "Review"))
    }

    async fn get_review(&self, id: Uuid) -> RepoResult<Option<Review>> {
        Ok(sqlx::query_as::<_, Review>(
            "SELECT id, gig_id, reviewer_id, reviewee_id, rating, comment, created_at, updated_at
             FROM reviews WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn find_review(&self, gig_id: Uuid, reviewer_id: Uuid, reviewee_id: Uuid) -> RepoResult<Option<Review>> {
        Ok(sqlx::query_as::<_, Review>(
            "SELECT id, gig_id, reviewer_id, reviewee_id, rating, comment, created_at, updated_at
             FROM reviews WHERE gig_id = $1 AND reviewer_id = $2 AND reviewee_id = $3",
        )
        .bind(gig_id)
        .bind(reviewer_id)
        .bind(reviewee_id)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn list_reviews_for_user(&self, reviewee_id: Uuid, skip: i64, limit: i64) -> RepoResult<Vec<Review>> {
        Ok(sqlx::query_as::<_, Review>(
            "SELECT id, gig_id, reviewer_id, reviewee_id, rating, comment, created_at, updated_at
             FROM reviews WHERE reviewee_id = $1 ORDER BY created_at DESC LIMIT $2 OFFSET $3",
        )
        .bind(reviewee_id)
        .bind(limit)
        .bind(skip)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn list_reviews_for_gig(&self, gig_id: Uuid) -> RepoResult<Vec<Review>> {
        Ok(sqlx::query_as::<_, Review>(
            "SELECT id, gig_id, reviewer_id, reviewee_id, rating, comment, created_at, updated_at
             FROM reviews WHERE gig_id = $1 ORDER BY created_at DESC",
        )
        .bind(gig_id)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn list_reviews_by_reviewer(&self, reviewer_id: Uuid, skip: i64, limit: i64) -> RepoResult<Vec<Review>> {
        Ok(sqlx::query_as::<_, Review>(
            "SELECT id, gig_id, reviewer_id, reviewee_id, rating, comment, created_at, updated_at
             FROM reviews WHERE reviewer_id = $1 ORDER BY created_at DESC LIMIT $2 OFFSET $3",
        )
        .bind(reviewer_id)
        .bind(limit)
        .bind(skip)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn rating_counts(&self, reviewee_id: Uuid) -> RepoResult<Vec<(i32, i64)>> {
        Ok(sqlx::query_as::<_, (i32, i64)>(
            "SELECT rating, COUNT(*) FROM reviews WHERE reviewee_id = $1 GROUP BY rating ORDER BY rating",
        )
        .bind(reviewee_id)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn update_review(&self, id: Uuid, reviewer_id: Uuid, update: ReviewUpdate) -> RepoResult<Option<Review>> {
        Ok(sqlx::query_as::<_, Review>(
            "UPDATE reviews SET rating = COALESCE($3, rating), comment = COALESCE($4, comment), updated_at = now()
             WHERE id = $1 AND reviewer_id = $2
             RETURNING id, gig_id, reviewer_id, reviewee_id, rating, comment, created_at, updated_at",
        )
        .bind(id)
        .bind(reviewer_id)
        .bind(update.rating)
        .bind(&update.comment)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn delete_review(&self, id: Uuid, reviewer_id: Uuid) -> RepoResult<Option<Review>> {
        Ok(sqlx::query_as::<_, Review>(
            "DELETE FROM reviews WHERE id = $1 AND reviewer_id = $2
             RETURNING id, gig_id, reviewer_id, reviewee_id, rating, comment, created_at, updated_at",
        )
        .bind(id)
        .bind(reviewer_id)
        .fetch_optional(&self.pool)
        .await?)
    }

    // --- Transactions ---

    async fn create_transaction(&self, tx: NewTransaction) -> RepoResult<Transaction> {
        sqlx::query_as::<_, Transaction>(
            "INSERT INTO transactions (id, gig_id, payer_id, payee_id, amount, service_fee, net_amount,
                                       currency, payment_method, transaction_ref)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
             RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(tx.gig_id)
        .bind(tx.payer_id)
        .bind(tx.payee_id)
        .bind(tx.amount)
        .bind(tx.service_fee)
        .bind(tx.net_amount)
        .bind(CURRENCY)
        .bind(&tx.payment_method)
        .bind(&tx.transaction_ref)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| conflict_or(e, "Transaction"))
    }

    async fn get_transaction(&self, id: Uuid) -> RepoResult<Option<Transaction>> {
        Ok(sqlx::query_as::<_, Transaction>("SELECT * FROM transactions WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn get_transaction_by_gig(&self, gig_id: Uuid) -> RepoResult<Option<Transaction>> {
        Ok(sqlx::query_as::<_, Transaction>("SELECT * FROM transactions WHERE gig_id = $1")
            .bind(gig_id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn list_user_transactions(
        &self,
        user_id: Uuid,
        status: Option<TransactionStatus>,
        skip: i64,
        limit: i64,
    ) -> RepoResult<(Vec<Transaction>, i64)> {
        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new("SELECT * FROM transactions WHERE (payer_id = ");
        builder.push_bind(user_id);
        builder.push(" OR payee_id = ");
        builder.push_bind(user_id);
        builder.push(")");
        if let Some(status) = status {
            builder.push(" AND status = ");
            builder.push_bind(status);
        }
        builder.push(" ORDER BY created_at DESC LIMIT ");
        builder.push_bind(limit);
        builder.push(" OFFSET ");
        builder.push_bind(skip);
        let rows = builder
            .build_query_as::<Transaction>()
            .fetch_all(&self.pool)
            .await?;

        let mut count: QueryBuilder<Postgres> =
            QueryBuilder::new("SELECT COUNT(*) FROM transactions WHERE (payer_id = ");
        count.push_bind(user_id);
        count.push(" OR payee_id = ");
        count.push_bind(user_id);
        count.push(")");
        if let Some(status) = status {
            count.push(" AND status = ");
            count.push_bind(status);
        }
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;
        Ok((rows, total))
    }

    /// settle_transaction
    ///
    /// Single database transaction: the escrow row moves out of `pending`, and on
    /// completion the gig is completed alongside it. A cancelled gig is never
    /// completed; releasing against one is a conflict.
    async fn settle_transaction(&self, id: Uuid, to: TransactionStatus) -> RepoResult<Option<Transaction>> {
        let mut db_tx = self.pool.begin().await?;
        let settled = sqlx::query_as::<_, Transaction>(
            r#"UPDATE transactions SET status = $2,
                   completed_at = CASE WHEN $2 = 'completed'::transaction_status THEN now() ELSE completed_at END,
                   updated_at = now()
               WHERE id = $1 AND status = 'pending'
               RETURNING *"#,
        )
        .bind(id)
        .bind(to)
        .fetch_optional(&mut *db_tx)
        .await?;

        let Some(settled) = settled else {
            return Ok(None);
        };

        if settled.status == TransactionStatus::Completed {
            let updated = sqlx::query(
                r#"UPDATE gigs SET status = 'completed', completed_at = now(), updated_at = now()
                   WHERE id = $1 AND status <> 'cancelled'"#,
            )
            .bind(settled.gig_id)
            .execute(&mut *db_tx)
            .await?;
            // Dropping `db_tx` rolls the escrow row back to pending.
            if updated.rows_affected() == 0 {
                return Err(RepositoryError::Conflict(CANCELLED_GIG_RELEASE.to_string()));
            }
        }
        db_tx.commit().await?;
        Ok(Some(settled))
    }

    async fn payment_summary(&self, user_id: Uuid) -> RepoResult<PaymentSummary> {
        let (total_paid, total_received, pending, completed): (f64, f64, i64, i64) = sqlx::query_as(
            r#"SELECT
                   COALESCE(SUM(amount) FILTER (WHERE payer_id = $1 AND status = 'completed'), 0)::float8,
                   COALESCE(SUM(net_amount) FILTER (WHERE payee_id = $1 AND status = 'completed'), 0)::float8,
                   COUNT(*) FILTER (WHERE status = 'pending'),
                   COUNT(*) FILTER (WHERE status = 'completed')
               FROM transactions WHERE payer_id = $1 OR payee_id = $1"#,
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(PaymentSummary {
            total_paid,
            total_received,
            pending_transactions: pending,
            completed_transactions: completed,
            currency: CURRENCY.to_string(),
        })
    }

    // --- Uploads ---

    async fn create_file(&self, file: UploadedFile) -> RepoResult<UploadedFile> {
        Ok(sqlx::query_as::<_, UploadedFile>(
            "INSERT INTO uploaded_files (id, filename, original_filename, file_path, file_size,
                                         content_type, upload_category, uploaded_by, is_active, uploaded_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
             RETURNING *",
        )
        .bind(file.id)
        .bind(&file.filename)
        .bind(&file.original_filename)
        .bind(&file.file_path)
        .bind(file.file_size)
        .bind(&file.content_type)
        .bind(&file.upload_category)
        .bind(file.uploaded_by)
        .bind(file.is_active)
        .bind(file.uploaded_at)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn get_file(&self, id: Uuid) -> RepoResult<Option<UploadedFile>> {
        Ok(sqlx::query_as::<_, UploadedFile>(
            "SELECT * FROM uploaded_files WHERE id = $1 AND is_active = true",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn list_user_files(
        &self,
        user_id: Uuid,
        category: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> RepoResult<Vec<UploadedFile>> {
        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new("SELECT * FROM uploaded_files WHERE is_active = true AND uploaded_by = ");
        builder.push_bind(user_id);
        if let Some(category) = category {
            builder.push(" AND upload_category = ");
            builder.push_bind(category.to_string());
        }
        builder.push(" ORDER BY uploaded_at DESC LIMIT ");
        builder.push_bind(limit);
        builder.push(" OFFSET ");
        builder.push_bind(offset);
        Ok(builder
            .build_query_as::<UploadedFile>()
            .fetch_all(&self.pool)
            .await?)
    }

    async fn deactivate_file(&self, id: Uuid, user_id: Uuid) -> RepoResult<Option<UploadedFile>> {
        Ok(sqlx::query_as::<_, UploadedFile>(
            "UPDATE uploaded_files SET is_active = false
             WHERE id = $1 AND uploaded_by = $2 AND is_active = true
             RETURNING *",
        )
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?)
    }
}
