use std::time::Duration;

use chrono::{DateTime, Utc};
use eyre::eyre;
use log::{error, info, warn};
use model::booking::{Booking, BookingStatus};
use model::class::{Class, ClassPatch, NewClass};
use model::errors::LedgerError;
use model::user::User;
use mongodb::bson::oid::ObjectId;
use retry::Backoff;
use service::bookings::Bookings;
use service::classes::Classes;
use service::users::Users;
use storage::{CapacityDelta, LedgerStore, Storage};

use tx_macro::tx;

mod retry;
pub mod service;


/// How long write conflicts keep being replayed before they surface.
const TX_RETRY_WINDOW: Duration = Duration::from_secs(120);

#[derive(Clone)]
pub struct Ledger<S: LedgerStore = Storage> {
    store: S,
    retry_window: Duration,
    pub users: Users<S>,
    pub classes: Classes<S>,
    pub bookings: Bookings<S>,
}

/// Stored counter next to the confirmed bookings it should equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapacityAudit {
    pub class_id: ObjectId,
    pub counter: u32,
    pub confirmed: u64,
}

impl CapacityAudit {
    pub fn is_consistent(&self) -> bool {
        self.counter as u64 == self.confirmed
    }
}

impl<S: LedgerStore> Ledger<S> {
    pub fn new(store: S) -> Self {
        Ledger {
            users: Users::new(store.clone()),
            classes: Classes::new(store.clone()),
            bookings: Bookings::new(store.clone()),
            store,
            retry_window: TX_RETRY_WINDOW,
        }
    }

    pub fn with_retry_window(mut self, window: Duration) -> Self {
        self.retry_window = window;
        self
    }

    pub async fn start_session(&self) -> Result<S::Session, LedgerError> {
        Ok(self.store.start_session().await?)
    }

    pub async fn get_user(&self, session: &mut S::Session, id: ObjectId) -> Result<User, LedgerError> {
        self.users
            .get(session, id)
            .await?
            .ok_or(LedgerError::UserNotFound(id))
    }

    pub async fn get_class(
        &self,
        session: &mut S::Session,
        id: ObjectId,
    ) -> Result<Class, LedgerError> {
        self.classes
            .get(session, id)
            .await?
            .ok_or(LedgerError::ClassNotFound(id))
    }

    /// Books a seat for `user_id`. The seat is taken by a conditional
    /// increment, so concurrent bookings never push the class past its
    /// maximum.
    pub async fn create_booking(
        &self,
        session: &mut S::Session,
        user_id: ObjectId,
        class_id: ObjectId,
    ) -> Result<Booking, LedgerError> {
        let mut backoff = Backoff::new(self.retry_window);
        loop {
            let err = match self.try_create_booking(session, user_id, class_id).await {
                Err(err) if S::is_transient(&err) => err,
                result => return result,
            };
            warn!("Booking of class {} conflicted: {:#}", class_id, err);
            if !backoff.wait().await {
                return Err(err);
            }
        }
    }

    #[tx]
    async fn try_create_booking(
        &self,
        session: &mut S::Session,
        user_id: ObjectId,
        class_id: ObjectId,
    ) -> Result<Booking, LedgerError> {
        let class = self.get_class(session, class_id).await?;
        self.get_user(session, user_id).await?;

        if self
            .store
            .find_confirmed_booking(session, user_id, class_id)
            .await?
            .is_some()
        {
            return Err(LedgerError::AlreadyBooked { user_id, class_id });
        }

        if class.is_full()
            || !self
                .store
                .update_class_capacity(session, class_id, CapacityDelta::Reserve)
                .await?
        {
            return Err(LedgerError::CapacityExceeded {
                class_id,
                max_capacity: class.max_capacity,
            });
        }

        let booking = Booking::confirmed(user_id, class_id, Utc::now());
        if !self.store.insert_booking(session, &booking).await? {
            return Err(LedgerError::AlreadyBooked { user_id, class_id });
        }
        info!(
            "User {} booked class {} ({:?})",
            user_id, class_id, class.title
        );
        Ok(booking)
    }

    /// Cancels a booking. A seat is released only when the booking held one,
    /// so repeating the call changes nothing.
    pub async fn cancel_booking(
        &self,
        session: &mut S::Session,
        booking_id: ObjectId,
    ) -> Result<(), LedgerError> {
        let mut backoff = Backoff::new(self.retry_window);
        loop {
            let err = match self.try_cancel_booking(session, booking_id).await {
                Err(err) if S::is_transient(&err) => err,
                result => return result,
            };
            warn!("Cancellation of booking {} conflicted: {:#}", booking_id, err);
            if !backoff.wait().await {
                return Err(err);
            }
        }
    }

    #[tx]
    async fn try_cancel_booking(
        &self,
        session: &mut S::Session,
        booking_id: ObjectId,
    ) -> Result<(), LedgerError> {
        let booking = self
            .bookings
            .get(session, booking_id)
            .await?
            .ok_or(LedgerError::BookingNotFound(booking_id))?;

        if booking.status.is_terminal() {
            info!("Booking {} is already cancelled", booking_id);
            return Ok(());
        }

        let cancelled = self
            .store
            .update_booking_status(session, booking_id, booking.status, BookingStatus::Cancelled)
            .await?;
        if !cancelled {
            warn!("Booking {} changed status concurrently", booking_id);
            return Ok(());
        }

        if booking.holds_seat()
            && !self
                .store
                .update_class_capacity(session, booking.class_id, CapacityDelta::Release)
                .await?
        {
            return Err(eyre!(
                "Class {} has no seat to release for booking {}",
                booking.class_id,
                booking_id
            )
            .into());
        }
        info!(
            "Booking {} of user {} cancelled",
            booking_id, booking.user_id
        );
        Ok(())
    }

    #[tx]
    pub async fn create_class(
        &self,
        session: &mut S::Session,
        actor: ObjectId,
        new_class: NewClass,
    ) -> Result<Class, LedgerError> {
        self.ensure_studio_owner(session, actor).await?;
        let class = new_class.into_class(Utc::now())?;
        self.get_user(session, class.instructor).await?;
        self.store.insert_class(session, &class).await?;
        Ok(class)
    }

    #[tx]
    pub async fn update_class(
        &self,
        session: &mut S::Session,
        actor: ObjectId,
        id: ObjectId,
        patch: ClassPatch,
    ) -> Result<Class, LedgerError> {
        self.ensure_studio_owner(session, actor).await?;
        let class = self.get_class(session, id).await?;
        let details = class.patched(patch)?;
        if details.instructor != class.instructor {
            self.get_user(session, details.instructor).await?;
        }

        let below_bookings = |current_capacity| LedgerError::CapacityBelowBookings {
            class_id: id,
            current_capacity,
            requested: details.max_capacity,
        };
        if details.max_capacity < class.current_capacity {
            return Err(below_bookings(class.current_capacity));
        }
        if !self.store.update_class_details(session, id, &details).await? {
            let current = self.get_class(session, id).await?;
            return Err(below_bookings(current.current_capacity));
        }
        self.get_class(session, id).await
    }

    /// Removes the class with all of its bookings. Returns the number of
    /// bookings removed.
    #[tx]
    pub async fn delete_class(
        &self,
        session: &mut S::Session,
        actor: ObjectId,
        id: ObjectId,
    ) -> Result<u64, LedgerError> {
        self.ensure_studio_owner(session, actor).await?;
        self.remove_class(session, id).await
    }

    /// Drops every class that ended before `now`, one transaction per class.
    pub async fn purge_finished_classes(
        &self,
        session: &mut S::Session,
        now: DateTime<Utc>,
    ) -> Result<usize, LedgerError> {
        let finished = self.classes.finished(session, now).await?;
        let mut purged = 0;
        for class in finished {
            match self.purge_class(session, class.id).await {
                Ok(bookings) => {
                    info!(
                        "Purged class {} ({:?}, ended {}) with {} bookings",
                        class.id, class.title, class.end_at, bookings
                    );
                    purged += 1;
                }
                Err(err) if err.is_not_found() => continue,
                Err(err) => error!("Failed to purge class {}: {:#}", class.id, err),
            }
        }
        Ok(purged)
    }

    #[tx]
    async fn purge_class(&self, session: &mut S::Session, id: ObjectId) -> Result<u64, LedgerError> {
        self.remove_class(session, id).await
    }

    async fn remove_class(&self, session: &mut S::Session, id: ObjectId) -> Result<u64, LedgerError> {
        self.get_class(session, id).await?;
        let bookings = self.store.delete_class_bookings(session, id).await?;
        if !self.store.delete_class(session, id).await? {
            return Err(LedgerError::ClassNotFound(id));
        }
        Ok(bookings)
    }

    /// Compares the stored counter with a count of confirmed bookings. Never
    /// rewrites the counter.
    #[tx]
    pub async fn audit_capacity(
        &self,
        session: &mut S::Session,
        class_id: ObjectId,
    ) -> Result<CapacityAudit, LedgerError> {
        let class = self.get_class(session, class_id).await?;
        let confirmed = self
            .store
            .count_confirmed_bookings(session, class_id)
            .await?;
        Ok(CapacityAudit {
            class_id,
            counter: class.current_capacity,
            confirmed,
        })
    }

    async fn ensure_studio_owner(
        &self,
        session: &mut S::Session,
        actor: ObjectId,
    ) -> Result<User, LedgerError> {
        let user = self.get_user(session, actor).await?;
        if !user.is_studio_owner() {
            return Err(LedgerError::NotStudioOwner(actor));
        }
        Ok(user)
    }
}
