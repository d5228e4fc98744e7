pub mod booking;
pub mod class;
pub mod memory;
pub mod session;
pub mod user;

use async_trait::async_trait;
use booking::BookingStore;
use chrono::{DateTime, Utc};
use class::ClassStore;
use eyre::Result;
use model::{
    booking::{Booking, BookingFilter, BookingStatus},
    class::{Class, ClassDetails},
    errors::LedgerError,
    session::{Session, Transaction},
    user::User,
};
use mongodb::bson::oid::ObjectId;
use session::Db;
use user::UserStore;

pub use memory::{MemorySession, MemoryStorage};

/// Direction of a conditional move of a class's `current_capacity`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapacityDelta {
    /// +1, only while `current_capacity < max_capacity`.
    Reserve,
    /// -1, only while `current_capacity > 0`.
    Release,
}

/// Persistence consumed by the ledger.
///
/// Every call runs inside the caller's session. Methods returning `bool`
/// report whether their guard matched; they never fail on a guard miss.
#[async_trait]
pub trait LedgerStore: Clone + Send + Sync + 'static {
    type Session: Transaction;

    async fn start_session(&self) -> Result<Self::Session>;

    /// Whether the transaction that failed with `err` may be replayed as a
    /// whole.
    fn is_transient(err: &LedgerError) -> bool {
        err.is_transient()
    }

    /// `false` if the email is taken.
    async fn insert_user(&self, session: &mut Self::Session, user: &User) -> Result<bool>;
    async fn get_user(&self, session: &mut Self::Session, id: ObjectId) -> Result<Option<User>>;
    async fn get_user_by_email(
        &self,
        session: &mut Self::Session,
        email: &str,
    ) -> Result<Option<User>>;
    async fn find_users(&self, session: &mut Self::Session) -> Result<Vec<User>>;

    async fn insert_class(&self, session: &mut Self::Session, class: &Class) -> Result<()>;
    async fn get_class_by_id(
        &self,
        session: &mut Self::Session,
        id: ObjectId,
    ) -> Result<Option<Class>>;
    /// Classes starting at or after `from` (all when `None`), earliest first.
    async fn find_classes(
        &self,
        session: &mut Self::Session,
        from: Option<DateTime<Utc>>,
    ) -> Result<Vec<Class>>;
    /// Classes whose end is strictly before `now`.
    async fn find_finished_classes(
        &self,
        session: &mut Self::Session,
        now: DateTime<Utc>,
    ) -> Result<Vec<Class>>;
    /// `false` if the class is gone or `details.max_capacity` is below the
    /// current counter.
    async fn update_class_details(
        &self,
        session: &mut Self::Session,
        id: ObjectId,
        details: &ClassDetails,
    ) -> Result<bool>;
    async fn update_class_capacity(
        &self,
        session: &mut Self::Session,
        id: ObjectId,
        delta: CapacityDelta,
    ) -> Result<bool>;
    async fn delete_class(&self, session: &mut Self::Session, id: ObjectId) -> Result<bool>;

    /// `false` if the user already holds a confirmed booking for the class.
    async fn insert_booking(
        &self,
        session: &mut Self::Session,
        booking: &Booking,
    ) -> Result<bool>;
    async fn get_booking_by_id(
        &self,
        session: &mut Self::Session,
        id: ObjectId,
    ) -> Result<Option<Booking>>;
    /// Newest first.
    async fn find_bookings(
        &self,
        session: &mut Self::Session,
        filter: BookingFilter,
    ) -> Result<Vec<Booking>>;
    async fn find_confirmed_booking(
        &self,
        session: &mut Self::Session,
        user_id: ObjectId,
        class_id: ObjectId,
    ) -> Result<Option<Booking>>;
    async fn count_confirmed_bookings(
        &self,
        session: &mut Self::Session,
        class_id: ObjectId,
    ) -> Result<u64>;
    async fn update_booking_status(
        &self,
        session: &mut Self::Session,
        id: ObjectId,
        from: BookingStatus,
        to: BookingStatus,
    ) -> Result<bool>;
    async fn delete_class_bookings(
        &self,
        session: &mut Self::Session,
        class_id: ObjectId,
    ) -> Result<u64>;
}

#[derive(Clone)]
pub struct Storage {
    pub db: Db,
    pub users: UserStore,
    pub classes: ClassStore,
    pub bookings: BookingStore,
}

impl Storage {
    pub async fn new(uri: &str, db_name: &str) -> Result<Self> {
        let db = Db::new(uri, db_name).await?;
        let users = UserStore::new(&db).await?;
        let classes = ClassStore::new(&db).await?;
        let bookings = BookingStore::new(&db).await?;

        Ok(Storage {
            db,
            users,
            classes,
            bookings,
        })
    }
}

#[async_trait]
impl LedgerStore for Storage {
    type Session = Session;

    async fn start_session(&self) -> Result<Session> {
        self.db.start_session().await
    }

    async fn insert_user(&self, session: &mut Session, user: &User) -> Result<bool> {
        self.users.insert(session, user).await
    }

    async fn get_user(&self, session: &mut Session, id: ObjectId) -> Result<Option<User>> {
        self.users.get(session, id).await
    }

    async fn get_user_by_email(&self, session: &mut Session, email: &str) -> Result<Option<User>> {
        self.users.get_by_email(session, email).await
    }

    async fn find_users(&self, session: &mut Session) -> Result<Vec<User>> {
        self.users.find(session).await
    }

    async fn insert_class(&self, session: &mut Session, class: &Class) -> Result<()> {
        self.classes.insert(session, class).await
    }

    async fn get_class_by_id(&self, session: &mut Session, id: ObjectId) -> Result<Option<Class>> {
        self.classes.get(session, id).await
    }

    async fn find_classes(
        &self,
        session: &mut Session,
        from: Option<DateTime<Utc>>,
    ) -> Result<Vec<Class>> {
        self.classes.find(session, from).await
    }

    async fn find_finished_classes(
        &self,
        session: &mut Session,
        now: DateTime<Utc>,
    ) -> Result<Vec<Class>> {
        self.classes.find_finished(session, now).await
    }

    async fn update_class_details(
        &self,
        session: &mut Session,
        id: ObjectId,
        details: &ClassDetails,
    ) -> Result<bool> {
        self.classes.update_details(session, id, details).await
    }

    async fn update_class_capacity(
        &self,
        session: &mut Session,
        id: ObjectId,
        delta: CapacityDelta,
    ) -> Result<bool> {
        self.classes.update_capacity(session, id, delta).await
    }

    async fn delete_class(&self, session: &mut Session, id: ObjectId) -> Result<bool> {
        self.classes.delete(session, id).await
    }

    async fn insert_booking(&self, session: &mut Session, booking: &Booking) -> Result<bool> {
        self.bookings.insert(session, booking).await
    }

    async fn get_booking_by_id(
        &self,
        session: &mut Session,
        id: ObjectId,
    ) -> Result<Option<Booking>> {
        self.bookings.get(session, id).await
    }

    async fn find_bookings(
        &self,
        session: &mut Session,
        filter: BookingFilter,
    ) -> Result<Vec<Booking>> {
        self.bookings.find(session, filter).await
    }

    async fn find_confirmed_booking(
        &self,
        session: &mut Session,
        user_id: ObjectId,
        class_id: ObjectId,
    ) -> Result<Option<Booking>> {
        self.bookings.find_confirmed(session, user_id, class_id).await
    }

    async fn count_confirmed_bookings(
        &self,
        session: &mut Session,
        class_id: ObjectId,
    ) -> Result<u64> {
        self.bookings.count_confirmed(session, class_id).await
    }

    async fn update_booking_status(
        &self,
        session: &mut Session,
        id: ObjectId,
        from: BookingStatus,
        to: BookingStatus,
    ) -> Result<bool> {
        self.bookings.update_status(session, id, from, to).await
    }

    async fn delete_class_bookings(&self, session: &mut Session, class_id: ObjectId) -> Result<u64> {
        self.bookings.delete_by_class(session, class_id).await
    }
}
