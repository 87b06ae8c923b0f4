use chrono::{Duration, Utc};
use hourz_server::{
    error::RepositoryError,
    models::{
        AddressInput, GigCreate, GigFilter, GigStatus, NewMessage, NewSession, NewTransaction,
        NewUser, ProfileUpdate, ReviewCreate, TransactionStatus, User,
    },
    repository::{PostgresRepository, Repository},
};
use sqlx::PgPool;
use uuid::Uuid;

// --- Test Context and Setup ---

/// A simple structure to hold the database pool for testing
struct DbTestContext {
    pool: PgPool,
}

impl DbTestContext {
    async fn setup() -> Self {
        dotenv::dotenv().ok();

        let db_url = std::env::var("DATABASE_URL")
            .expect("DATABASE_URL must be set to run integration tests");

        let pool = PgPool::connect(&db_url)
            .await
            .expect("Failed to connect to database for integration tests.");

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .expect("Failed to run database migrations.");

        DbTestContext { pool }
    }

    fn repository(&self) -> PostgresRepository {
        PostgresRepository::new(self.pool.clone())
    }
}

// --- Test Data Helpers ---

async fn create_test_user(repo: &PostgresRepository, label: &str) -> User {
    repo.create_user(NewUser {
        email: format!("{label}-{}@test.com", Uuid::new_v4()),
        hashed_password: "not-a-real-hash".to_string(),
    })
    .await
    .expect("Failed to create test user")
}

/// A point no other fixture uses, so radius searches only see this test's rows.
fn unique_point() -> (f64, f64) {
    let bytes = Uuid::new_v4().into_bytes();
    let lat = -60.0 + f64::from(bytes[0]) / 10.0;
    let lon = -170.0 + f64::from(u16::from_be_bytes([bytes[1], bytes[2]])) / 200.0;
    (lat, lon)
}

fn gig_at(latitude: f64, longitude: f64) -> GigCreate {
    GigCreate {
        title: "Assemble a wardrobe".to_string(),
        description: "Flat-pack wardrobe, tools provided.".to_string(),
        duration_hours: 2,
        budget: 400.0,
        latitude: Some(latitude),
        longitude: Some(longitude),
        address_text: "Test address".to_string(),
        ..GigCreate::default()
    }
}

// --- Tests ---

#[tokio::test]
#[ignore = "requires Postgres with PostGIS (DATABASE_URL)"]
async fn test_user_email_is_unique() {
    let ctx = DbTestContext::setup().await;
    let repo = ctx.repository();
    let user = create_test_user(&repo, "unique").await;

    let duplicate = repo
        .create_user(NewUser {
            email: user.email.clone(),
            hashed_password: "x".to_string(),
        })
        .await;
    assert!(matches!(duplicate, Err(RepositoryError::Conflict(_))));

    let found = repo.get_user_by_email(&user.email).await.unwrap().unwrap();
    assert_eq!(found.id, user.id);
    assert_eq!(found.reputation_score, 5.0);
}

#[tokio::test]
#[ignore = "requires Postgres with PostGIS (DATABASE_URL)"]
async fn test_profile_address_round_trips_coordinates_and_nearby_search() {
    let ctx = DbTestContext::setup().await;
    let repo = ctx.repository();
    let user = create_test_user(&repo, "address").await;
    let searcher = create_test_user(&repo, "searcher").await;
    let (lat, lon) = unique_point();

    let updated = repo
        .update_profile(
            user.id,
            ProfileUpdate {
                first_name: Some("Somchai".to_string()),
                address: Some(AddressInput {
                    address_line: "1 Test Road".to_string(),
                    district: "Test".to_string(),
                    province: "Test".to_string(),
                    latitude: Some(lat),
                    longitude: Some(lon),
                    ..AddressInput::default()
                }),
                ..ProfileUpdate::default()
            },
        )
        .await
        .unwrap()
        .unwrap();
    assert!(updated.is_profile_setup);

    let address = repo
        .get_address(updated.address_id.unwrap())
        .await
        .unwrap()
        .unwrap();
    assert!((address.latitude.unwrap() - lat).abs() < 1e-6);
    assert!((address.longitude.unwrap() - lon).abs() < 1e-6);

    let nearby = repo
        .find_nearby_users(searcher.id, lat + 0.01, lon, 5.0, true)
        .await
        .unwrap();
    let hit = nearby.iter().find(|n| n.user.id == user.id).unwrap();
    assert!(hit.distance_km > 0.5 && hit.distance_km < 2.0);
}

#[tokio::test]
#[ignore = "requires Postgres with PostGIS (DATABASE_URL)"]
async fn test_gig_radius_search_and_accept_race() {
    let ctx = DbTestContext::setup().await;
    let repo = ctx.repository();
    let seeker = create_test_user(&repo, "seeker").await;
    let first = create_test_user(&repo, "first").await;
    let second = create_test_user(&repo, "second").await;
    let (lat, lon) = unique_point();

    let gig = repo.create_gig(seeker.id, gig_at(lat, lon)).await.unwrap();
    assert_eq!(gig.status, GigStatus::Pending);
    assert!((gig.latitude.unwrap() - lat).abs() < 1e-6);

    let (found, total) = repo
        .search_gigs(&GigFilter {
            center: Some((lat, lon)),
            radius_km: 1.0,
            ..GigFilter::default()
        })
        .await
        .unwrap();
    assert!(total >= 1);
    let hit = found.iter().find(|g| g.id == gig.id).unwrap();
    assert!(hit.distance_km.unwrap() < 0.01);

    // Only one helper can win the gig.
    let (accepted, room) = repo.accept_gig(gig.id, first.id).await.unwrap().unwrap();
    assert_eq!(accepted.helper_id, Some(first.id));
    assert_eq!(accepted.status, GigStatus::Accepted);
    assert_eq!(room.gig_id, gig.id);
    assert_eq!(repo.list_participants(room.id).await.unwrap().len(), 2);
    assert!(repo.accept_gig(gig.id, second.id).await.unwrap().is_none());

    // Status changes are compare-and-set.
    assert!(
        repo.update_gig_status(gig.id, GigStatus::Pending, GigStatus::Cancelled)
            .await
            .unwrap()
            .is_none()
    );
    let done = repo
        .update_gig_status(gig.id, GigStatus::Accepted, GigStatus::Completed)
        .await
        .unwrap()
        .unwrap();
    assert!(done.completed_at.is_some());
}

#[tokio::test]
#[ignore = "requires Postgres with PostGIS (DATABASE_URL)"]
async fn test_chat_room_is_reused_and_tracks_unread() {
    let ctx = DbTestContext::setup().await;
    let repo = ctx.repository();
    let seeker = create_test_user(&repo, "chat-seeker").await;
    let helper = create_test_user(&repo, "chat-helper").await;
    let (lat, lon) = unique_point();
    let gig = repo.create_gig(seeker.id, gig_at(lat, lon)).await.unwrap();

    let room = repo.get_or_create_room(gig.id, seeker.id, helper.id).await.unwrap();
    let again = repo.get_or_create_room(gig.id, helper.id, seeker.id).await.unwrap();
    assert_eq!(room.id, again.id);
    assert_eq!(repo.list_participants(room.id).await.unwrap().len(), 2);

    repo.create_message(NewMessage {
        chat_room_id: room.id,
        sender_id: seeker.id,
        content: "Hello".to_string(),
        message_type: Default::default(),
        image_url: None,
    })
    .await
    .unwrap();
    assert_eq!(repo.count_unread(room.id, helper.id).await.unwrap(), 1);
    assert_eq!(repo.count_unread(room.id, seeker.id).await.unwrap(), 0);

    assert!(repo.mark_room_read(room.id, helper.id).await.unwrap());
    assert_eq!(repo.count_unread(room.id, helper.id).await.unwrap(), 0);
}

#[tokio::test]
#[ignore = "requires Postgres with PostGIS (DATABASE_URL)"]
async fn test_one_review_per_pair_and_one_transaction_per_gig() {
    let ctx = DbTestContext::setup().await;
    let repo = ctx.repository();
    let seeker = create_test_user(&repo, "rev-seeker").await;
    let helper = create_test_user(&repo, "rev-helper").await;
    let (lat, lon) = unique_point();
    let gig = repo.create_gig(seeker.id, gig_at(lat, lon)).await.unwrap();
    repo.accept_gig(gig.id, helper.id).await.unwrap().unwrap();

    let escrow = || NewTransaction {
        gig_id: gig.id,
        payer_id: seeker.id,
        payee_id: helper.id,
        amount: 400.0,
        service_fee: 20.0,
        net_amount: 380.0,
        payment_method: "mock".to_string(),
        transaction_ref: format!("MOCK_{}", &Uuid::new_v4().simple().to_string()[..8]),
    };
    let tx = repo.create_transaction(escrow()).await.unwrap();
    assert!(matches!(
        repo.create_transaction(escrow()).await,
        Err(RepositoryError::Conflict(_))
    ));

    // Releasing the escrow completes the gig in the same step.
    let settled = repo
        .settle_transaction(tx.id, TransactionStatus::Completed)
        .await
        .unwrap()
        .unwrap();
    assert!(settled.completed_at.is_some());
    let gig = repo.get_gig(gig.id).await.unwrap().unwrap();
    assert_eq!(gig.status, GigStatus::Completed);
    assert!(
        repo.settle_transaction(tx.id, TransactionStatus::Cancelled)
            .await
            .unwrap()
            .is_none()
    );

    let review = || ReviewCreate {
        gig_id: gig.id,
        reviewee_id: helper.id,
        rating: 5,
        comment: "Great".to_string(),
    };
    repo.create_review(seeker.id, review()).await.unwrap();
    assert!(matches!(
        repo.create_review(seeker.id, review()).await,
        Err(RepositoryError::Conflict(_))
    ));
    assert_eq!(repo.rating_counts(helper.id).await.unwrap(), vec![(5, 1)]);
}

#[tokio::test]
#[ignore = "requires Postgres with PostGIS (DATABASE_URL)"]
async fn test_release_against_cancelled_gig_rolls_back() {
    let ctx = DbTestContext::setup().await;
    let repo = ctx.repository();
    let seeker = create_test_user(&repo, "void-seeker").await;
    let helper = create_test_user(&repo, "void-helper").await;
    let (lat, lon) = unique_point();
    let gig = repo.create_gig(seeker.id, gig_at(lat, lon)).await.unwrap();
    repo.accept_gig(gig.id, helper.id).await.unwrap().unwrap();
    let tx = repo
        .create_transaction(NewTransaction {
            gig_id: gig.id,
            payer_id: seeker.id,
            payee_id: helper.id,
            amount: 400.0,
            service_fee: 20.0,
            net_amount: 380.0,
            payment_method: "mock".to_string(),
            transaction_ref: format!("MOCK_{}", &Uuid::new_v4().simple().to_string()[..8]),
        })
        .await
        .unwrap();
    repo.update_gig_status(gig.id, GigStatus::Accepted, GigStatus::Cancelled)
        .await
        .unwrap()
        .unwrap();

    assert!(matches!(
        repo.settle_transaction(tx.id, TransactionStatus::Completed).await,
        Err(RepositoryError::Conflict(_))
    ));
    let gig = repo.get_gig(gig.id).await.unwrap().unwrap();
    assert_eq!(gig.status, GigStatus::Cancelled);
    let tx = repo.get_transaction(tx.id).await.unwrap().unwrap();
    assert_eq!(tx.status, TransactionStatus::Pending);
}

#[tokio::test]
#[ignore = "requires Postgres with PostGIS (DATABASE_URL)"]
async fn test_sessions_and_token_blacklist() {
    let ctx = DbTestContext::setup().await;
    let repo = ctx.repository();
    let user = create_test_user(&repo, "session").await;
    let jti = Uuid::new_v4();

    let session = |refresh_jti: Uuid| NewSession {
        user_id: user.id,
        refresh_jti,
        user_agent: Some("tests".to_string()),
        ip_address: Some("127.0.0.1".to_string()),
        expires_at: Utc::now() + Duration::days(7),
    };
    repo.create_session(session(jti)).await.unwrap();
    assert_eq!(repo.list_active_sessions(user.id).await.unwrap().len(), 1);

    // Closing a session succeeds exactly once.
    assert!(repo.deactivate_session(jti).await.unwrap());
    assert!(!repo.deactivate_session(jti).await.unwrap());

    let second = Uuid::new_v4();
    repo.create_session(session(second)).await.unwrap();
    assert_eq!(repo.deactivate_user_sessions(user.id).await.unwrap(), 1);
    assert!(!repo.deactivate_session(second).await.unwrap());
    assert!(repo.list_active_sessions(user.id).await.unwrap().is_empty());

    assert!(!repo.is_token_blacklisted(jti).await.unwrap());
    repo.blacklist_token(jti, user.id, Utc::now() + Duration::minutes(30))
        .await
        .unwrap();
    // Blacklisting twice is harmless.
    repo.blacklist_token(jti, user.id, Utc::now() + Duration::minutes(30))
        .await
        .unwrap();
    assert!(repo.is_token_blacklisted(jti).await.unwrap());
}
