use eyre::Result;
use model::booking::{Booking, BookingFilter};
use mongodb::bson::oid::ObjectId;
use storage::LedgerStore;

use super::view::{BookingView, Lookup};

#[derive(Clone)]
pub struct Bookings<S> {
    store: S,
}

impl<S: LedgerStore> Bookings<S> {
    pub(crate) fn new(store: S) -> Self {
        Bookings { store }
    }

    pub async fn get(&self, session: &mut S::Session, id: ObjectId) -> Result<Option<Booking>> {
        self.store.get_booking_by_id(session, id).await
    }

    /// Every booking with its user and class, newest first.
    pub async fn find(&self, session: &mut S::Session) -> Result<Vec<BookingView>> {
        self.views(session, BookingFilter::All).await
    }

    pub async fn user_bookings(
        &self,
        session: &mut S::Session,
        user_id: ObjectId,
    ) -> Result<Vec<BookingView>> {
        self.views(session, BookingFilter::User(user_id)).await
    }

    pub async fn class_bookings(
        &self,
        session: &mut S::Session,
        class_id: ObjectId,
    ) -> Result<Vec<BookingView>> {
        self.views(session, BookingFilter::Class(class_id)).await
    }

    async fn views(
        &self,
        session: &mut S::Session,
        filter: BookingFilter,
    ) -> Result<Vec<BookingView>> {
        let bookings = self.store.find_bookings(session, filter).await?;
        Lookup::new(&self.store).bookings(session, bookings).await
    }
}
