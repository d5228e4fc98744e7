use chrono::{DateTime, Utc};
use eyre::Result;
use model::{booking::BookingFilter, class::Class};
use mongodb::bson::oid::ObjectId;
use storage::LedgerStore;

use super::view::{ClassRoster, ClassView, Lookup};

#[derive(Clone)]
pub struct Classes<S> {
    store: S,
}

impl<S: LedgerStore> Classes<S> {
    pub(crate) fn new(store: S) -> Self {
        Classes { store }
    }

    pub async fn get(&self, session: &mut S::Session, id: ObjectId) -> Result<Option<Class>> {
        self.store.get_class_by_id(session, id).await
    }

    /// Whole schedule, earliest first.
    pub async fn find(&self, session: &mut S::Session) -> Result<Vec<Class>> {
        self.store.find_classes(session, None).await
    }

    /// Whole schedule with instructors, earliest first.
    pub async fn schedule(&self, session: &mut S::Session) -> Result<Vec<ClassView>> {
        let classes = self.find(session).await?;
        self.views(session, classes).await
    }

    /// Classes starting at or after `now`, with instructors.
    pub async fn upcoming(
        &self,
        session: &mut S::Session,
        now: DateTime<Utc>,
    ) -> Result<Vec<ClassView>> {
        let classes = self.store.find_classes(session, Some(now)).await?;
        self.views(session, classes).await
    }

    /// The class with its instructor and bookings, newest booking first.
    pub async fn roster(
        &self,
        session: &mut S::Session,
        id: ObjectId,
    ) -> Result<Option<ClassRoster>> {
        let class = match self.get(session, id).await? {
            Some(class) => class,
            None => return Ok(None),
        };
        let mut lookup = Lookup::new(&self.store);
        let class = lookup.class(session, class).await?;
        let bookings = self
            .store
            .find_bookings(session, BookingFilter::Class(id))
            .await?;
        let bookings = lookup.bookings(session, bookings).await?;
        Ok(Some(ClassRoster { class, bookings }))
    }

    pub async fn finished(
        &self,
        session: &mut S::Session,
        now: DateTime<Utc>,
    ) -> Result<Vec<Class>> {
        self.store.find_finished_classes(session, now).await
    }

    async fn views(&self, session: &mut S::Session, classes: Vec<Class>) -> Result<Vec<ClassView>> {
        let mut lookup = Lookup::new(&self.store);
        let mut views = Vec::with_capacity(classes.len());
        for class in classes {
            views.push(lookup.class(session, class).await?);
        }
        Ok(views)
    }
}
