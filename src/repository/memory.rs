use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{CANCELLED_GIG_RELEASE, RepoResult, Repository};
use crate::error::RepositoryError;
use crate::geo::haversine_km;
use crate::models::{
    Address, Buddy, CURRENCY, ChatParticipant, ChatRoom, Gig, GigCreate, GigFilter, GigStatus,
    GigUpdate, Message, NearbyUser, NewMessage, NewSession, NewTransaction, NewUser,
    PaymentSummary, ProfileUpdate, Review, ReviewCreate, ReviewUpdate, Transaction,
    TransactionStatus, UploadedFile, User, UserSession,
};

#[derive(Default)]
struct Store {
    users: HashMap<Uuid, User>,
    addresses: HashMap<Uuid, Address>,
    sessions: Vec<UserSession>,
    blacklist: HashMap<Uuid, DateTime<Utc>>,
    gigs: HashMap<Uuid, Gig>,
    rooms: HashMap<Uuid, ChatRoom>,
    participants: Vec<ChatParticipant>,
    messages: Vec<Message>,
    buddies: Vec<Buddy>,
    reviews: Vec<Review>,
    transactions: Vec<Transaction>,
    files: HashMap<Uuid, UploadedFile>,
}

/// InMemoryRepository
///
/// A process-local `Repository` with the same guards and orderings as the Postgres
/// backend. Distances use the haversine formula instead of PostGIS. Backs the
/// integration test suite and database-less local runs.
#[derive(Default)]
pub struct InMemoryRepository {
    store: RwLock<Store>,
    fail_file_writes: AtomicBool,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// While set, `create_file` fails with a backend error.
    pub fn set_fail_file_writes(&self, fail: bool) {
        self.fail_file_writes.store(fail, Ordering::SeqCst);
    }
}

fn page<T>(items: Vec<T>, offset: i64, limit: i64) -> Vec<T> {
    items
        .into_iter()
        .skip(offset.max(0) as usize)
        .take(limit.max(0) as usize)
        .collect()
}

fn in_room(store: &Store, room_id: Uuid, user_id: Uuid) -> bool {
    store
        .participants
        .iter()
        .any(|p| p.chat_room_id == room_id && p.user_id == user_id)
}

/// Oldest room of `gig_id` shared by both users, created when missing.
fn room_between(store: &mut Store, gig_id: Uuid, first: Uuid, second: Uuid) -> ChatRoom {
    let existing = store
        .rooms
        .values()
        .filter(|r| r.gig_id == gig_id && in_room(store, r.id, first) && in_room(store, r.id, second))
        .min_by_key(|r| r.created_at)
        .cloned();
    if let Some(room) = existing {
        return room;
    }

    let now = Utc::now();
    let room = ChatRoom {
        id: Uuid::new_v4(),
        gig_id,
        is_active: true,
        created_at: now,
        updated_at: now,
    };
    store.rooms.insert(room.id, room.clone());
    for user_id in [first, second] {
        if !in_room(store, room.id, user_id) {
            store.participants.push(ChatParticipant {
                id: Uuid::new_v4(),
                chat_room_id: room.id,
                user_id,
                joined_at: now,
                last_read_at: None,
            });
        }
    }
    room
}

fn gig_matches(gig: &Gig, filter: &GigFilter) -> Option<Option<f64>> {
    if gig.status != filter.status {
        return None;
    }
    if filter.min_budget.is_some_and(|min| gig.budget < min)
        || filter.max_budget.is_some_and(|max| gig.budget > max)
        || filter.max_duration.is_some_and(|max| gig.duration_hours > max)
    {
        return None;
    }
    match filter.center {
        Some((lat, lon)) => {
            let (glat, glon) = (gig.latitude?, gig.longitude?);
            let distance = haversine_km(lat, lon, glat, glon);
            (distance <= filter.radius_km).then_some(Some(distance))
        }
        None => Some(None),
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn ping(&self) -> RepoResult<()> {
        Ok(())
    }

    // --- Users ---

    async fn create_user(&self, user: NewUser) -> RepoResult<User> {
        let mut store = self.store.write().await;
        if store.users.values().any(|u| u.email == user.email) {
            return Err(RepositoryError::Conflict("Email already exists".to_string()));
        }
        let now = Utc::now();
        let created = User {
            id: Uuid::new_v4(),
            email: user.email,
            hashed_password: user.hashed_password,
            is_available: true,
            reputation_score: 5.0,
            created_at: now,
            updated_at: now,
            ..User::default()
        };
        store.users.insert(created.id, created.clone());
        Ok(created)
    }

    async fn get_user(&self, id: Uuid) -> RepoResult<Option<User>> {
        Ok(self.store.read().await.users.get(&id).cloned())
    }

    async fn get_user_by_email(&self, email: &str) -> RepoResult<Option<User>> {
        Ok(self
            .store
            .read()
            .await
            .users
            .values()
            .find(|u| u.email == email)
            .cloned())
    }

    async fn get_address(&self, id: Uuid) -> RepoResult<Option<Address>> {
        Ok(self.store.read().await.addresses.get(&id).cloned())
    }

    async fn update_profile(&self, user_id: Uuid, update: ProfileUpdate) -> RepoResult<Option<User>> {
        let mut store = self.store.write().await;
        let Some(mut user) = store.users.get(&user_id).cloned() else {
            return Ok(None);
        };
        let now = Utc::now();

        if let Some(input) = update.address {
            let existing = user.address_id.and_then(|id| store.addresses.get(&id).cloned());
            let address = Address {
                id: existing.as_ref().map(|a| a.id).unwrap_or_else(Uuid::new_v4),
                address_line: input.address_line,
                district: input.district,
                province: input.province,
                postal_code: input.postal_code,
                country: input.country.unwrap_or_else(|| "Thailand".to_string()),
                latitude: input.latitude.filter(|_| input.longitude.is_some()),
                longitude: input.longitude.filter(|_| input.latitude.is_some()),
                created_at: existing.as_ref().map(|a| a.created_at).unwrap_or(now),
                updated_at: now,
            };
            user.address_id = Some(address.id);
            store.addresses.insert(address.id, address);
        }

        if update.first_name.is_some() {
            user.first_name = update.first_name;
        }
        if update.last_name.is_some() {
            user.last_name = update.last_name;
        }
        if update.phone_number.is_some() {
            user.phone_number = update.phone_number;
        }
        if update.bio.is_some() {
            user.bio = update.bio;
        }
        if update.additional_contact.is_some() {
            user.additional_contact = update.additional_contact;
        }
        if update.profile_image_url.is_some() {
            user.profile_image_url = update.profile_image_url;
        }
        user.is_profile_setup = true;
        user.updated_at = now;
        store.users.insert(user_id, user.clone());
        Ok(Some(user))
    }

    async fn set_availability(&self, user_id: Uuid, is_available: bool) -> RepoResult<Option<User>> {
        let mut store = self.store.write().await;
        Ok(store.users.get_mut(&user_id).map(|user| {
            user.is_available = is_available;
            user.updated_at = Utc::now();
            user.clone()
        }))
    }

    async fn set_profile_image(&self, user_id: Uuid, url: &str) -> RepoResult<Option<User>> {
        let mut store = self.store.write().await;
        Ok(store.users.get_mut(&user_id).map(|user| {
            user.profile_image_url = Some(url.to_string());
            user.updated_at = Utc::now();
            user.clone()
        }))
    }

    async fn find_nearby_users(
        &self,
        exclude: Uuid,
        latitude: f64,
        longitude: f64,
        radius_km: f64,
        only_available: bool,
    ) -> RepoResult<Vec<NearbyUser>> {
        let store = self.store.read().await;
        let mut found: Vec<NearbyUser> = store
            .users
            .values()
            .filter(|u| u.id != exclude && (!only_available || u.is_available))
            .filter_map(|u| {
                let address = store.addresses.get(&u.address_id?)?;
                let distance = haversine_km(latitude, longitude, address.latitude?, address.longitude?);
                (distance <= radius_km).then(|| NearbyUser {
                    user: u.clone(),
                    distance_km: distance,
                })
            })
            .collect();
        found.sort_by(|a, b| a.distance_km.total_cmp(&b.distance_km));
        found.truncate(100);
        Ok(found)
    }

    async fn set_reputation(&self, user_id: Uuid, score: f64, total_reviews: i32) -> RepoResult<()> {
        let mut store = self.store.write().await;
        if let Some(user) = store.users.get_mut(&user_id) {
            user.reputation_score = score;
            user.total_reviews = total_reviews;
            user.updated_at = Utc::now();
        }
        Ok(())
    }

    // --- Sessions & Token Blacklist ---

    async fn create_session(&self, session: NewSession) -> RepoResult<UserSession> {
        let mut store = self.store.write().await;
        if store.sessions.iter().any(|s| s.refresh_jti == session.refresh_jti) {
            return Err(RepositoryError::Conflict("Session already exists".to_string()));
        }
        let now = Utc::now();
        let created = UserSession {
            id: Uuid::new_v4(),
            user_id: session.user_id,
            refresh_jti: session.refresh_jti,
            user_agent: session.user_agent,
            ip_address: session.ip_address,
            is_active: true,
            created_at: now,
            last_used_at: now,
            expires_at: session.expires_at,
        };
        store.sessions.push(created.clone());
        Ok(created)
    }

    async fn deactivate_session(&self, refresh_jti: Uuid) -> RepoResult<bool> {
        let now = Utc::now();
        let mut store = self.store.write().await;
        match store
            .sessions
            .iter_mut()
            .find(|s| s.refresh_jti == refresh_jti && s.is_active && s.expires_at > now)
        {
            Some(session) => {
                session.is_active = false;
                session.last_used_at = now;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn deactivate_user_sessions(&self, user_id: Uuid) -> RepoResult<u64> {
        let mut store = self.store.write().await;
        let mut revoked = 0;
        for session in store.sessions.iter_mut().filter(|s| s.user_id == user_id && s.is_active) {
            session.is_active = false;
            revoked += 1;
        }
        Ok(revoked)
    }

    async fn list_active_sessions(&self, user_id: Uuid) -> RepoResult<Vec<UserSession>> {
        let now = Utc::now();
        let mut sessions: Vec<UserSession> = self
            .store
            .read()
            .await
            .sessions
            .iter()
            .filter(|s| s.user_id == user_id && s.is_active && s.expires_at > now)
            .cloned()
            .collect();
        sessions.sort_by(|a, b| b.last_used_at.cmp(&a.last_used_at));
        Ok(sessions)
    }

    async fn blacklist_token(&self, jti: Uuid, _user_id: Uuid, expires_at: DateTime<Utc>) -> RepoResult<()> {
        self.store.write().await.blacklist.entry(jti).or_insert(expires_at);
        Ok(())
    }

    async fn is_token_blacklisted(&self, jti: Uuid) -> RepoResult<bool> {
        Ok(self.store.read().await.blacklist.contains_key(&jti))
    }

    async fn purge_expired_tokens(&self) -> RepoResult<u64> {
        let now = Utc::now();
        let mut store = self.store.write().await;
        let before = store.blacklist.len() + store.sessions.len();
        store.blacklist.retain(|_, expires_at| *expires_at > now);
        store.sessions.retain(|s| s.expires_at > now);
        Ok((before - store.blacklist.len() - store.sessions.len()) as u64)
    }

    // --- Gigs ---

    async fn create_gig(&self, seeker_id: Uuid, gig: GigCreate) -> RepoResult<Gig> {
        let now = Utc::now();
        let has_point = gig.latitude.is_some() && gig.longitude.is_some();
        let created = Gig {
            id: Uuid::new_v4(),
            title: gig.title,
            description: gig.description,
            duration_hours: gig.duration_hours,
            budget: gig.budget,
            latitude: gig.latitude.filter(|_| has_point),
            longitude: gig.longitude.filter(|_| has_point),
            address_text: gig.address_text,
            status: GigStatus::Pending,
            image_urls: gig.image_urls,
            seeker_id,
            helper_id: None,
            starts_at: gig.starts_at,
            completed_at: None,
            created_at: now,
            updated_at: now,
            distance_km: None,
        };
        self.store.write().await.gigs.insert(created.id, created.clone());
        Ok(created)
    }

    async fn get_gig(&self, id: Uuid) -> RepoResult<Option<Gig>> {
        Ok(self.store.read().await.gigs.get(&id).cloned())
    }

    async fn search_gigs(&self, filter: &GigFilter) -> RepoResult<(Vec<Gig>, i64)> {
        let store = self.store.read().await;
        let mut matches: Vec<Gig> = store
            .gigs
            .values()
            .filter_map(|gig| {
                gig_matches(gig, filter).map(|distance| Gig {
                    distance_km: distance,
                    ..gig.clone()
                })
            })
            .collect();

        if filter.center.is_some() {
            matches.sort_by(|a, b| {
                a.distance_km
                    .unwrap_or_default()
                    .total_cmp(&b.distance_km.unwrap_or_default())
                    .then(b.created_at.cmp(&a.created_at))
            });
        } else {
            matches.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        }

        let total = matches.len() as i64;
        Ok((page(matches, filter.offset, filter.limit), total))
    }

    async fn list_user_gigs(
        &self,
        user_id: Uuid,
        as_seeker: bool,
        limit: i64,
        offset: i64,
    ) -> RepoResult<(Vec<Gig>, i64)> {
        let store = self.store.read().await;
        let mut gigs: Vec<Gig> = store
            .gigs
            .values()
            .filter(|g| {
                if as_seeker {
                    g.seeker_id == user_id
                } else {
                    g.helper_id == Some(user_id)
                }
            })
            .cloned()
            .collect();
        gigs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let total = gigs.len() as i64;
        Ok((page(gigs, offset, limit), total))
    }

    async fn update_gig(&self, id: Uuid, seeker_id: Uuid, update: GigUpdate) -> RepoResult<Option<Gig>> {
        let mut store = self.store.write().await;
        let Some(gig) = store.gigs.get_mut(&id).filter(|g| g.seeker_id == seeker_id) else {
            return Ok(None);
        };
        if let Some(title) = update.title {
            gig.title = title;
        }
        if let Some(description) = update.description {
            gig.description = description;
        }
        if let Some(duration) = update.duration_hours {
            gig.duration_hours = duration;
        }
        if let Some(budget) = update.budget {
            gig.budget = budget;
        }
        if let (Some(lat), Some(lon)) = (update.latitude, update.longitude) {
            gig.latitude = Some(lat);
            gig.longitude = Some(lon);
        }
        if let Some(address) = update.address_text {
            gig.address_text = address;
        }
        if let Some(urls) = update.image_urls {
            gig.image_urls = urls;
        }
        if update.starts_at.is_some() {
            gig.starts_at = update.starts_at;
        }
        gig.updated_at = Utc::now();
        Ok(Some(gig.clone()))
    }

    async fn delete_gig(&self, id: Uuid, seeker_id: Uuid) -> RepoResult<bool> {
        let mut store = self.store.write().await;
        let deletable = store.gigs.get(&id).is_some_and(|g| {
            g.seeker_id == seeker_id && g.status == GigStatus::Pending && g.helper_id.is_none()
        });
        if deletable {
            store.gigs.remove(&id);
        }
        Ok(deletable)
    }

    async fn accept_gig(&self, id: Uuid, helper_id: Uuid) -> RepoResult<Option<(Gig, ChatRoom)>> {
        let mut store = self.store.write().await;
        let Some(gig) = store.gigs.get_mut(&id).filter(|g| {
            g.status == GigStatus::Pending && g.helper_id.is_none() && g.seeker_id != helper_id
        }) else {
            return Ok(None);
        };
        gig.helper_id = Some(helper_id);
        gig.status = GigStatus::Accepted;
        gig.updated_at = Utc::now();
        let gig = gig.clone();

        let room = room_between(&mut store, gig.id, gig.seeker_id, helper_id);
        Ok(Some((gig, room)))
    }

    async fn update_gig_status(&self, id: Uuid, from: GigStatus, to: GigStatus) -> RepoResult<Option<Gig>> {
        let mut store = self.store.write().await;
        let Some(gig) = store.gigs.get_mut(&id).filter(|g| g.status == from) else {
            return Ok(None);
        };
        let now = Utc::now();
        gig.status = to;
        if to == GigStatus::Completed {
            gig.completed_at = Some(now);
        }
        gig.updated_at = now;
        Ok(Some(gig.clone()))
    }

    // --- Chat ---

    async fn get_or_create_room(&self, gig_id: Uuid, first: Uuid, second: Uuid) -> RepoResult<ChatRoom> {
        let mut store = self.store.write().await;
        Ok(room_between(&mut store, gig_id, first, second))
    }

    async fn get_room(&self, id: Uuid) -> RepoResult<Option<ChatRoom>> {
        Ok(self.store.read().await.rooms.get(&id).cloned())
    }

    async fn list_participants(&self, room_id: Uuid) -> RepoResult<Vec<ChatParticipant>> {
        Ok(self
            .store
            .read()
            .await
            .participants
            .iter()
            .filter(|p| p.chat_room_id == room_id)
            .cloned()
            .collect())
    }

    async fn get_participant(&self, room_id: Uuid, user_id: Uuid) -> RepoResult<Option<ChatParticipant>> {
        Ok(self
            .store
            .read()
            .await
            .participants
            .iter()
            .find(|p| p.chat_room_id == room_id && p.user_id == user_id)
            .cloned())
    }

    async fn list_user_rooms(&self, user_id: Uuid, limit: i64, offset: i64) -> RepoResult<Vec<ChatRoom>> {
        let store = self.store.read().await;
        let mut rooms: Vec<ChatRoom> = store
            .participants
            .iter()
            .filter(|p| p.user_id == user_id)
            .filter_map(|p| store.rooms.get(&p.chat_room_id))
            .filter(|r| r.is_active)
            .cloned()
            .collect();
        rooms.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(page(rooms, offset, limit))
    }

    async fn create_message(&self, message: NewMessage) -> RepoResult<Message> {
        let mut store = self.store.write().await;
        let now = Utc::now();
        let stored = Message {
            id: Uuid::new_v4(),
            chat_room_id: message.chat_room_id,
            sender_id: message.sender_id,
            content: message.content,
            message_type: message.message_type,
            image_url: message.image_url,
            is_read: false,
            timestamp: now,
        };
        store.messages.push(stored.clone());
        if let Some(room) = store.rooms.get_mut(&message.chat_room_id) {
            room.updated_at = now;
        }
        Ok(stored)
    }

    async fn list_messages(&self, room_id: Uuid, limit: i64, offset: i64) -> RepoResult<(Vec<Message>, i64)> {
        let store = self.store.read().await;
        // Insertion order reversed, then a stable sort keeps ties newest first.
        let mut messages: Vec<Message> = store
            .messages
            .iter()
            .rev()
            .filter(|m| m.chat_room_id == room_id)
            .cloned()
            .collect();
        messages.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        let total = messages.len() as i64;
        Ok((page(messages, offset, limit), total))
    }

    async fn count_unread(&self, room_id: Uuid, user_id: Uuid) -> RepoResult<i64> {
        let store = self.store.read().await;
        let Some(participant) = store
            .participants
            .iter()
            .find(|p| p.chat_room_id == room_id && p.user_id == user_id)
        else {
            return Ok(0);
        };
        Ok(store
            .messages
            .iter()
            .filter(|m| {
                m.chat_room_id == room_id
                    && m.sender_id != user_id
                    && participant.last_read_at.is_none_or(|read| m.timestamp > read)
            })
            .count() as i64)
    }

    async fn mark_room_read(&self, room_id: Uuid, user_id: Uuid) -> RepoResult<bool> {
        let mut store = self.store.write().await;
        let now = Utc::now();
        let Some(participant) = store
            .participants
            .iter_mut()
            .find(|p| p.chat_room_id == room_id && p.user_id == user_id)
        else {
            return Ok(false);
        };
        participant.last_read_at = Some(now);
        for message in store
            .messages
            .iter_mut()
            .filter(|m| m.chat_room_id == room_id && m.sender_id != user_id)
        {
            message.is_read = true;
        }
        Ok(true)
    }

    async fn deactivate_room(&self, room_id: Uuid) -> RepoResult<bool> {
        let mut store = self.store.write().await;
        Ok(match store.rooms.get_mut(&room_id) {
            Some(room) => {
                room.is_active = false;
                room.updated_at = Utc::now();
                true
            }
            None => false,
        })
    }

    // --- Buddies ---

    async fn add_buddy(&self, user_id: Uuid, buddy_id: Uuid, notes: Option<String>) -> RepoResult<Buddy> {
        let mut store = self.store.write().await;
        if store
            .buddies
            .iter()
            .any(|b| b.user_id == user_id && b.buddy_id == buddy_id)
        {
            return Err(RepositoryError::Conflict("Buddy already exists".to_string()));
        }
        let buddy = Buddy {
            id: Uuid::new_v4(),
            user_id,
            buddy_id,
            notes,
            created_at: Utc::now(),
        };
        store.buddies.push(buddy.clone());
        Ok(buddy)
    }

    async fn get_buddy(&self, user_id: Uuid, buddy_id: Uuid) -> RepoResult<Option<Buddy>> {
        Ok(self
            .store
            .read()
            .await
            .buddies
            .iter()
            .find(|b| b.user_id == user_id && b.buddy_id == buddy_id)
            .cloned())
    }

    async fn list_buddies(
        &self,
        user_id: Uuid,
        only_available: bool,
        skip: i64,
        limit: i64,
    ) -> RepoResult<(Vec<Buddy>, i64)> {
        let store = self.store.read().await;
        let mut buddies: Vec<Buddy> = store
            .buddies
            .iter()
            .rev()
            .filter(|b| b.user_id == user_id)
            .filter(|b| {
                !only_available
                    || store
                        .users
                        .get(&b.buddy_id)
                        .is_some_and(|u| u.is_available)
            })
            .cloned()
            .collect();
        buddies.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let total = buddies.len() as i64;
        Ok((page(buddies, skip, limit), total))
    }

    async fn update_buddy_notes(&self, user_id: Uuid, buddy_id: Uuid, notes: Option<String>) -> RepoResult<Option<Buddy>> {
        let mut store = self.store.write().await;
        Ok(store
            .buddies
            .iter_mut()
            .find(|b| b.user_id == user_id && b.buddy_id == buddy_id)
            .map(|b| {
                b.notes = notes;
                b.clone()
            }))
    }

    async fn remove_buddy(&self, user_id: Uuid, buddy_id: Uuid) -> RepoResult<bool> {
        let mut store = self.store.write().await;
        let before = store.buddies.len();
        store
            .buddies
            .retain(|b| !(b.user_id == user_id && b.buddy_id == buddy_id));
        Ok(store.buddies.len() < before)
    }

    // --- Reviews ---

    async fn create_review(&self, reviewer_id: Uuid, review: ReviewCreate) -> RepoResult<Review> {
        let mut store = self.store.write().await;
        if store.reviews.iter().any(|r| {
            r.gig_id == review.gig_id && r.reviewer_id == reviewer_id && r.reviewee_id == review.reviewee_id
        }) {
            return Err(RepositoryError::Conflict("Review already exists".to_string()));
        }
        let now = Utc::now();
        let created = Review {
            id: Uuid::new_v4(),
            gig_id: review.gig_id,
            reviewer_id,
            reviewee_id: review.reviewee_id,
            rating: review.rating,
            comment: review.comment,
            created_at: now,
            updated_at: now,
        };
        store.reviews.push(created.clone());
        Ok(created)
    }

    async fn get_review(&self, id: Uuid) -> RepoResult<Option<Review>> {
        Ok(self
            .store
            .read()
            .await
            .reviews
            .iter()
            .find(|r| r.id == id)
            .cloned())
    }

    async fn find_review(&self, gig_id: Uuid, reviewer_id: Uuid, reviewee_id: Uuid) -> RepoResult<Option<Review>> {
        Ok(self
            .store
            .read()
            .await
            .reviews
            .iter()
            .find(|r| r.gig_id == gig_id && r.reviewer_id == reviewer_id && r.reviewee_id == reviewee_id)
            .cloned())
    }

    async fn list_reviews_for_user(&self, reviewee_id: Uuid, skip: i64, limit: i64) -> RepoResult<Vec<Review>> {
        let store = self.store.read().await;
        let mut reviews: Vec<Review> = store
            .reviews
            .iter()
            .rev()
            .filter(|r| r.reviewee_id == reviewee_id)
            .cloned()
            .collect();
        reviews.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(page(reviews, skip, limit))
    }

    async fn list_reviews_for_gig(&self, gig_id: Uuid) -> RepoResult<Vec<Review>> {
        let store = self.store.read().await;
        let mut reviews: Vec<Review> = store
            .reviews
            .iter()
            .rev()
            .filter(|r| r.gig_id == gig_id)
            .cloned()
            .collect();
        reviews.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(reviews)
    }

    async fn list_reviews_by_reviewer(&self, reviewer_id: Uuid, skip: i64, limit: i64) -> RepoResult<Vec<Review>> {
        let store = self.store.read().await;
        let mut reviews: Vec<Review> = store
            .reviews
            .iter()
            .rev()
            .filter(|r| r.reviewer_id == reviewer_id)
            .cloned()
            .collect();
        reviews.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(page(reviews, skip, limit))
    }

    async fn rating_counts(&self, reviewee_id: Uuid) -> RepoResult<Vec<(i32, i64)>> {
        let store = self.store.read().await;
        let mut counts: HashMap<i32, i64> = HashMap::new();
        for review in store.reviews.iter().filter(|r| r.reviewee_id == reviewee_id) {
            *counts.entry(review.rating).or_default() += 1;
        }
        let mut counts: Vec<(i32, i64)> = counts.into_iter().collect();
        counts.sort_unstable();
        Ok(counts)
    }

    async fn update_review(&self, id: Uuid, reviewer_id: Uuid, update: ReviewUpdate) -> RepoResult<Option<Review>> {
        let mut store = self.store.write().await;
        Ok(store
            .reviews
            .iter_mut()
            .find(|r| r.id == id && r.reviewer_id == reviewer_id)
            .map(|review| {
                if let Some(rating) = update.rating {
                    review.rating = rating;
                }
                if let Some(comment) = update.comment {
                    review.comment = comment;
                }
                review.updated_at = Utc::now();
                review.clone()
            }))
    }

    async fn delete_review(&self, id: Uuid, reviewer_id: Uuid) -> RepoResult<Option<Review>> {
        let mut store = self.store.write().await;
        let position = store
            .reviews
            .iter()
            .position(|r| r.id == id && r.reviewer_id == reviewer_id);
        Ok(position.map(|index| store.reviews.remove(index)))
    }

    // --- Transactions ---

    async fn create_transaction(&self, tx: NewTransaction) -> RepoResult<Transaction> {
        let mut store = self.store.write().await;
        if store.transactions.iter().any(|t| t.gig_id == tx.gig_id) {
            return Err(RepositoryError::Conflict("Transaction already exists".to_string()));
        }
        let now = Utc::now();
        let created = Transaction {
            id: Uuid::new_v4(),
            gig_id: tx.gig_id,
            payer_id: tx.payer_id,
            payee_id: tx.payee_id,
            amount: tx.amount,
            service_fee: tx.service_fee,
            net_amount: tx.net_amount,
            currency: CURRENCY.to_string(),
            status: TransactionStatus::Pending,
            payment_method: tx.payment_method,
            transaction_ref: tx.transaction_ref,
            created_at: now,
            updated_at: now,
            completed_at: None,
        };
        store.transactions.push(created.clone());
        Ok(created)
    }

    async fn get_transaction(&self, id: Uuid) -> RepoResult<Option<Transaction>> {
        Ok(self
            .store
            .read()
            .await
            .transactions
            .iter()
            .find(|t| t.id == id)
            .cloned())
    }

    async fn get_transaction_by_gig(&self, gig_id: Uuid) -> RepoResult<Option<Transaction>> {
        Ok(self
            .store
            .read()
            .await
            .transactions
            .iter()
            .find(|t| t.gig_id == gig_id)
            .cloned())
    }

    async fn list_user_transactions(
        &self,
        user_id: Uuid,
        status: Option<TransactionStatus>,
        skip: i64,
        limit: i64,
    ) -> RepoResult<(Vec<Transaction>, i64)> {
        let store = self.store.read().await;
        let mut rows: Vec<Transaction> = store
            .transactions
            .iter()
            .rev()
            .filter(|t| t.payer_id == user_id || t.payee_id == user_id)
            .filter(|t| status.is_none_or(|s| t.status == s))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let total = rows.len() as i64;
        Ok((page(rows, skip, limit), total))
    }

    async fn settle_transaction(&self, id: Uuid, to: TransactionStatus) -> RepoResult<Option<Transaction>> {
        let mut store = self.store.write().await;
        let now = Utc::now();
        let Some(gig_id) = store
            .transactions
            .iter()
            .find(|t| t.id == id && t.status == TransactionStatus::Pending)
            .map(|t| t.gig_id)
        else {
            return Ok(None);
        };
        if to == TransactionStatus::Completed
            && store.gigs.get(&gig_id).is_some_and(|g| g.status == GigStatus::Cancelled)
        {
            return Err(RepositoryError::Conflict(CANCELLED_GIG_RELEASE.to_string()));
        }
        let Some(tx) = store.transactions.iter_mut().find(|t| t.id == id) else {
            return Ok(None);
        };
        tx.status = to;
        tx.updated_at = now;
        if to == TransactionStatus::Completed {
            tx.completed_at = Some(now);
        }
        let settled = tx.clone();

        if to == TransactionStatus::Completed {
            if let Some(gig) = store.gigs.get_mut(&settled.gig_id) {
                gig.status = GigStatus::Completed;
                gig.completed_at = Some(now);
                gig.updated_at = now;
            }
        }
        Ok(Some(settled))
    }

    async fn payment_summary(&self, user_id: Uuid) -> RepoResult<PaymentSummary> {
        let store = self.store.read().await;
        let mut summary = PaymentSummary {
            currency: CURRENCY.to_string(),
            ..PaymentSummary::default()
        };
        for tx in store
            .transactions
            .iter()
            .filter(|t| t.payer_id == user_id || t.payee_id == user_id)
        {
            match tx.status {
                TransactionStatus::Completed => {
                    summary.completed_transactions += 1;
                    if tx.payer_id == user_id {
                        summary.total_paid += tx.amount;
                    }
                    if tx.payee_id == user_id {
                        summary.total_received += tx.net_amount;
                    }
                }
                TransactionStatus::Pending => summary.pending_transactions += 1,
                _ => {}
            }
        }
        Ok(summary)
    }

    // --- Uploads ---

    async fn create_file(&self, file: UploadedFile) -> RepoResult<UploadedFile> {
        if self.fail_file_writes.load(Ordering::SeqCst) {
            return Err(RepositoryError::Database(sqlx::Error::PoolTimedOut));
        }
        self.store.write().await.files.insert(file.id, file.clone());
        Ok(file)
    }

    async fn get_file(&self, id: Uuid) -> RepoResult<Option<UploadedFile>> {
        Ok(self
            .store
            .read()
            .await
            .files
            .get(&id)
            .filter(|f| f.is_active)
            .cloned())
    }

    async fn list_user_files(
        &self,
        user_id: Uuid,
        category: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> RepoResult<Vec<UploadedFile>> {
        let store = self.store.read().await;
        let mut files: Vec<UploadedFile> = store
            .files
            .values()
            .filter(|f| f.is_active && f.uploaded_by == user_id)
            .filter(|f| category.is_none_or(|c| f.upload_category == c))
            .cloned()
            .collect();
        files.sort_by(|a, b| b.uploaded_at.cmp(&a.uploaded_at));
        Ok(page(files, offset, limit))
    }

    async fn deactivate_file(&self, id: Uuid, user_id: Uuid) -> RepoResult<Option<UploadedFile>> {
        let mut store = self.store.write().await;
        Ok(store
            .files
            .get_mut(&id)
            .filter(|f| f.is_active && f.uploaded_by == user_id)
            .map(|f| {
                f.is_active = false;
                f.clone()
            }))
    }
}
