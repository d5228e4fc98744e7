//! In-process backend for tests and local runs.
//!
//! A transaction holds the state mutex from `begin` to `commit`/`abort`, so
//! transactions are serialized. Rollback restores a snapshot taken at `begin`,
//! including when the session is dropped mid-transaction.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use eyre::{bail, eyre, Result};
use log::info;
use model::{
    booking::{Booking, BookingFilter, BookingStatus},
    class::{Class, ClassDetails},
    session::Transaction,
    user::User,
};
use mongodb::bson::oid::ObjectId;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::{CapacityDelta, LedgerStore};

#[derive(Debug, Default, Clone)]
struct MemoryState {
    users: HashMap<ObjectId, User>,
    classes: HashMap<ObjectId, Class>,
    bookings: HashMap<ObjectId, Booking>,
}

#[derive(Clone, Default)]
pub struct MemoryStorage {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

struct OpenTx {
    guard: OwnedMutexGuard<MemoryState>,
    snapshot: MemoryState,
    committed: bool,
}

impl Drop for OpenTx {
    fn drop(&mut self) {
        if !self.committed {
            *self.guard = std::mem::take(&mut self.snapshot);
        }
    }
}

pub struct MemorySession {
    state: Arc<Mutex<MemoryState>>,
    tx: Option<OpenTx>,
}

impl MemorySession {
    async fn with<R, F>(&mut self, f: F) -> R
    where
        F: FnOnce(&mut MemoryState) -> R,
    {
        match self.tx.as_mut() {
            Some(tx) => f(&mut *tx.guard),
            None => {
                let mut state = self.state.lock().await;
                f(&mut *state)
            }
        }
    }

    pub fn in_transaction(&self) -> bool {
        self.tx.is_some()
    }
}

#[async_trait]
impl Transaction for MemorySession {
    async fn begin(&mut self) -> Result<()> {
        if self.in_transaction() {
            bail!("Transaction already in progress");
        }
        let guard = self.state.clone().lock_owned().await;
        let snapshot = guard.clone();
        self.tx = Some(OpenTx {
            guard,
            snapshot,
            committed: false,
        });
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        let mut tx = self
            .tx
            .take()
            .ok_or_else(|| eyre!("No transaction in progress"))?;
        tx.committed = true;
        Ok(())
    }

    async fn abort(&mut self) -> Result<()> {
        self.tx
            .take()
            .ok_or_else(|| eyre!("No transaction in progress"))?;
        Ok(())
    }
}

fn sorted_classes<'a>(classes: impl Iterator<Item = &'a Class>) -> Vec<Class> {
    let mut classes: Vec<Class> = classes.cloned().collect();
    classes.sort_by_key(|class| (class.start_at, class.id));
    classes
}

#[async_trait]
impl LedgerStore for MemoryStorage {
    type Session = MemorySession;

    async fn start_session(&self) -> Result<MemorySession> {
        Ok(MemorySession {
            state: self.state.clone(),
            tx: None,
        })
    }

    async fn insert_user(&self, session: &mut MemorySession, user: &User) -> Result<bool> {
        info!("Inserting user: {} {}", user.id, user.email);
        Ok(session
            .with(|state| {
                if state.users.values().any(|u| u.email == user.email) {
                    return false;
                }
                state.users.insert(user.id, user.clone());
                true
            })
            .await)
    }

    async fn get_user(&self, session: &mut MemorySession, id: ObjectId) -> Result<Option<User>> {
        Ok(session.with(|state| state.users.get(&id).cloned()).await)
    }

    async fn get_user_by_email(
        &self,
        session: &mut MemorySession,
        email: &str,
    ) -> Result<Option<User>> {
        Ok(session
            .with(|state| state.users.values().find(|u| u.email == email).cloned())
            .await)
    }

    async fn find_users(&self, session: &mut MemorySession) -> Result<Vec<User>> {
        Ok(session
            .with(|state| {
                let mut users: Vec<User> = state.users.values().cloned().collect();
                users.sort_by_key(|user| (user.created_at, user.id));
                users
            })
            .await)
    }

    async fn insert_class(&self, session: &mut MemorySession, class: &Class) -> Result<()> {
        info!("Add class: {} {:?}", class.id, class.title);
        session
            .with(|state| {
                if state.classes.contains_key(&class.id) {
                    bail!("Duplicate class id: {}", class.id);
                }
                state.classes.insert(class.id, class.clone());
                Ok(())
            })
            .await
    }

    async fn get_class_by_id(
        &self,
        session: &mut MemorySession,
        id: ObjectId,
    ) -> Result<Option<Class>> {
        Ok(session.with(|state| state.classes.get(&id).cloned()).await)
    }

    async fn find_classes(
        &self,
        session: &mut MemorySession,
        from: Option<DateTime<Utc>>,
    ) -> Result<Vec<Class>> {
        Ok(session
            .with(|state| {
                sorted_classes(
                    state
                        .classes
                        .values()
                        .filter(|class| from.map(|from| class.start_at >= from).unwrap_or(true)),
                )
            })
            .await)
    }

    async fn find_finished_classes(
        &self,
        session: &mut MemorySession,
        now: DateTime<Utc>,
    ) -> Result<Vec<Class>> {
        Ok(session
            .with(|state| sorted_classes(state.classes.values().filter(|c| c.end_at < now)))
            .await)
    }

    async fn update_class_details(
        &self,
        session: &mut MemorySession,
        id: ObjectId,
        details: &ClassDetails,
    ) -> Result<bool> {
        info!("Edit class: {} {:?}", id, details);
        Ok(session
            .with(|state| match state.classes.get_mut(&id) {
                Some(class) if class.current_capacity <= details.max_capacity => {
                    class.title = details.title.clone();
                    class.description = details.description.clone();
                    class.instructor = details.instructor;
                    class.start_at = details.start_at;
                    class.end_at = details.end_at;
                    class.max_capacity = details.max_capacity;
                    class.price = details.price;
                    true
                }
                _ => false,
            })
            .await)
    }

    async fn update_class_capacity(
        &self,
        session: &mut MemorySession,
        id: ObjectId,
        delta: CapacityDelta,
    ) -> Result<bool> {
        info!("Capacity {:?}: {}", delta, id);
        Ok(session
            .with(|state| match (state.classes.get_mut(&id), delta) {
                (Some(class), CapacityDelta::Reserve)
                    if class.current_capacity < class.max_capacity =>
                {
                    class.current_capacity += 1;
                    true
                }
                (Some(class), CapacityDelta::Release) if class.current_capacity > 0 => {
                    class.current_capacity -= 1;
                    true
                }
                _ => false,
            })
            .await)
    }

    async fn delete_class(&self, session: &mut MemorySession, id: ObjectId) -> Result<bool> {
        info!("Delete class: {}", id);
        Ok(session
            .with(|state| state.classes.remove(&id).is_some())
            .await)
    }

    async fn insert_booking(&self, session: &mut MemorySession, booking: &Booking) -> Result<bool> {
        info!(
            "Add booking: {} user:{} class:{}",
            booking.id, booking.user_id, booking.class_id
        );
        session
            .with(|state| {
                if state.bookings.contains_key(&booking.id) {
                    bail!("Duplicate booking id: {}", booking.id);
                }
                let duplicate = booking.holds_seat()
                    && state.bookings.values().any(|b| {
                        b.holds_seat()
                            && b.user_id == booking.user_id
                            && b.class_id == booking.class_id
                    });
                if duplicate {
                    return Ok(false);
                }
                state.bookings.insert(booking.id, booking.clone());
                Ok(true)
            })
            .await
    }

    async fn get_booking_by_id(
        &self,
        session: &mut MemorySession,
        id: ObjectId,
    ) -> Result<Option<Booking>> {
        Ok(session.with(|state| state.bookings.get(&id).cloned()).await)
    }

    async fn find_bookings(
        &self,
        session: &mut MemorySession,
        filter: BookingFilter,
    ) -> Result<Vec<Booking>> {
        Ok(session
            .with(|state| {
                let mut bookings: Vec<Booking> = state
                    .bookings
                    .values()
                    .filter(|booking| filter.is_match(booking))
                    .cloned()
                    .collect();
                bookings.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
                bookings
            })
            .await)
    }

    async fn find_confirmed_booking(
        &self,
        session: &mut MemorySession,
        user_id: ObjectId,
        class_id: ObjectId,
    ) -> Result<Option<Booking>> {
        Ok(session
            .with(|state| {
                state
                    .bookings
                    .values()
                    .find(|b| b.holds_seat() && b.user_id == user_id && b.class_id == class_id)
                    .cloned()
            })
            .await)
    }

    async fn count_confirmed_bookings(
        &self,
        session: &mut MemorySession,
        class_id: ObjectId,
    ) -> Result<u64> {
        Ok(session
            .with(|state| {
                state
                    .bookings
                    .values()
                    .filter(|b| b.holds_seat() && b.class_id == class_id)
                    .count() as u64
            })
            .await)
    }

    async fn update_booking_status(
        &self,
        session: &mut MemorySession,
        id: ObjectId,
        from: BookingStatus,
        to: BookingStatus,
    ) -> Result<bool> {
        info!("Booking status: {} {} -> {}", id, from, to);
        Ok(session
            .with(|state| match state.bookings.get_mut(&id) {
                Some(booking) if booking.status == from && from != to => {
                    booking.status = to;
                    true
                }
                _ => false,
            })
            .await)
    }

    async fn delete_class_bookings(
        &self,
        session: &mut MemorySession,
        class_id: ObjectId,
    ) -> Result<u64> {
        info!("Delete bookings of class: {}", class_id);
        Ok(session
            .with(|state| {
                let before = state.bookings.len();
                state.bookings.retain(|_, b| b.class_id != class_id);
                (before - state.bookings.len()) as u64
            })
            .await)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use model::class::NewClass;

    use super::*;

    fn class(max_capacity: u32) -> Class {
        let start_at = Utc::now() + Duration::hours(2);
        NewClass {
            title: "Yin".to_owned(),
            description: "Slow, long holds".to_owned(),
            instructor: ObjectId::new(),
            start_at,
            end_at: start_at + Duration::minutes(75),
            max_capacity: Some(max_capacity),
            price: "18.00".to_owned(),
        }
        .into_class(Utc::now())
        .unwrap()
    }

    #[tokio::test]
    async fn test_abort_restores_snapshot() {
        let storage = MemoryStorage::new();
        let mut session = storage.start_session().await.unwrap();
        let class = class(3);
        storage.insert_class(&mut session, &class).await.unwrap();

        session.begin().await.unwrap();
        assert!(session.in_transaction());
        assert!(storage
            .update_class_capacity(&mut session, class.id, CapacityDelta::Reserve)
            .await
            .unwrap());
        session.abort().await.unwrap();

        let stored = storage
            .get_class_by_id(&mut session, class.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.current_capacity, 0);
    }

    #[tokio::test]
    async fn test_dropped_session_rolls_back() {
        let storage = MemoryStorage::new();
        let class = class(3);
        {
            let mut session = storage.start_session().await.unwrap();
            storage.insert_class(&mut session, &class).await.unwrap();
            session.begin().await.unwrap();
            storage
                .update_class_capacity(&mut session, class.id, CapacityDelta::Reserve)
                .await
                .unwrap();
        }

        let mut session = storage.start_session().await.unwrap();
        let stored = storage
            .get_class_by_id(&mut session, class.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.current_capacity, 0);
    }

    #[tokio::test]
    async fn test_commit_keeps_changes() {
        let storage = MemoryStorage::new();
        let mut session = storage.start_session().await.unwrap();
        let class = class(1);
        storage.insert_class(&mut session, &class).await.unwrap();

        session.begin().await.unwrap();
        assert!(storage
            .update_class_capacity(&mut session, class.id, CapacityDelta::Reserve)
            .await
            .unwrap());
        session.commit().await.unwrap();
        assert!(!session.in_transaction());
        assert!(session.abort().await.is_err());

        let stored = storage
            .get_class_by_id(&mut session, class.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.current_capacity, 1);
    }

    #[tokio::test]
    async fn test_capacity_guards() {
        let storage = MemoryStorage::new();
        let mut session = storage.start_session().await.unwrap();
        let class = class(1);
        storage.insert_class(&mut session, &class).await.unwrap();

        assert!(!storage
            .update_class_capacity(&mut session, class.id, CapacityDelta::Release)
            .await
            .unwrap());
        assert!(storage
            .update_class_capacity(&mut session, class.id, CapacityDelta::Reserve)
            .await
            .unwrap());
        assert!(!storage
            .update_class_capacity(&mut session, class.id, CapacityDelta::Reserve)
            .await
            .unwrap());
        assert!(!storage
            .update_class_capacity(&mut session, ObjectId::new(), CapacityDelta::Reserve)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_status_compare_and_set() {
        let storage = MemoryStorage::new();
        let mut session = storage.start_session().await.unwrap();
        let booking = Booking::confirmed(ObjectId::new(), ObjectId::new(), Utc::now());
        storage.insert_booking(&mut session, &booking).await.unwrap();

        assert!(storage
            .update_booking_status(
                &mut session,
                booking.id,
                BookingStatus::Confirmed,
                BookingStatus::Cancelled
            )
            .await
            .unwrap());
        assert!(!storage
            .update_booking_status(
                &mut session,
                booking.id,
                BookingStatus::Confirmed,
                BookingStatus::Cancelled
            )
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_duplicate_confirmed_booking_is_rejected() {
        let storage = MemoryStorage::new();
        let mut session = storage.start_session().await.unwrap();
        let (user, class) = (ObjectId::new(), ObjectId::new());
        assert!(storage
            .insert_booking(&mut session, &Booking::confirmed(user, class, Utc::now()))
            .await
            .unwrap());
        assert!(!storage
            .insert_booking(&mut session, &Booking::confirmed(user, class, Utc::now()))
            .await
            .unwrap());

        let cancelled = Booking {
            status: BookingStatus::Cancelled,
            ..Booking::confirmed(user, class, Utc::now())
        };
        assert!(storage
            .insert_booking(&mut session, &cancelled)
            .await
            .unwrap());
    }
}
