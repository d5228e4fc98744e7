use std::collections::HashMap;

use eyre::Result;
use model::{booking::Booking, class::Class, user::User};
use mongodb::bson::oid::ObjectId;
use storage::LedgerStore;

/// Class with its instructor resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassView {
    pub class: Class,
    pub instructor: Option<User>,
}

/// Class page: the class and everyone booked on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassRoster {
    pub class: ClassView,
    pub bookings: Vec<BookingView>,
}

/// Booking with its user and class resolved. A reference read back as
/// `None` was removed while the view was being built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingView {
    pub booking: Booking,
    pub user: Option<User>,
    pub class: Option<ClassView>,
}

/// Resolves references for one query, loading each user and class once.
pub(crate) struct Lookup<'a, S: LedgerStore> {
    store: &'a S,
    users: HashMap<ObjectId, Option<User>>,
    classes: HashMap<ObjectId, Option<ClassView>>,
}

impl<'a, S: LedgerStore> Lookup<'a, S> {
    pub(crate) fn new(store: &'a S) -> Self {
        Lookup {
            store,
            users: HashMap::new(),
            classes: HashMap::new(),
        }
    }

    async fn user(&mut self, session: &mut S::Session, id: ObjectId) -> Result<Option<User>> {
        if let Some(user) = self.users.get(&id) {
            return Ok(user.clone());
        }
        let user = self.store.get_user(session, id).await?;
        self.users.insert(id, user.clone());
        Ok(user)
    }

    pub(crate) async fn class(
        &mut self,
        session: &mut S::Session,
        class: Class,
    ) -> Result<ClassView> {
        let instructor = self.user(session, class.instructor).await?;
        let view = ClassView { class, instructor };
        self.classes.insert(view.class.id, Some(view.clone()));
        Ok(view)
    }

    async fn class_by_id(
        &mut self,
        session: &mut S::Session,
        id: ObjectId,
    ) -> Result<Option<ClassView>> {
        if let Some(view) = self.classes.get(&id) {
            return Ok(view.clone());
        }
        match self.store.get_class_by_id(session, id).await? {
            Some(class) => Ok(Some(self.class(session, class).await?)),
            None => {
                self.classes.insert(id, None);
                Ok(None)
            }
        }
    }

    async fn booking(
        &mut self,
        session: &mut S::Session,
        booking: Booking,
    ) -> Result<BookingView> {
        let user = self.user(session, booking.user_id).await?;
        let class = self.class_by_id(session, booking.class_id).await?;
        Ok(BookingView {
            booking,
            user,
            class,
        })
    }

    pub(crate) async fn bookings(
        &mut self,
        session: &mut S::Session,
        bookings: Vec<Booking>,
    ) -> Result<Vec<BookingView>> {
        let mut views = Vec::with_capacity(bookings.len());
        for booking in bookings {
            views.push(self.booking(session, booking).await?);
        }
        Ok(views)
    }
}
