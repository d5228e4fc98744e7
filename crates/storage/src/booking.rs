use std::sync::Arc;

use eyre::Result;
use futures_util::stream::TryStreamExt;
use log::info;
use model::{
    booking::{Booking, BookingFilter, BookingStatus},
    session::Session,
};
use mongodb::{
    bson::{doc, oid::ObjectId},
    error::{Error, ErrorKind, WriteError, WriteFailure},
    options::IndexOptions,
    Collection, Database, IndexModel,
};

const COLLECTION: &str = "bookings";
const DUPLICATE_KEY: i32 = 11000;

fn is_duplicate_key(err: &Error) -> bool {
    matches!(
        err.kind.as_ref(),
        ErrorKind::Write(WriteFailure::WriteError(WriteError {
            code: DUPLICATE_KEY,
            ..
        }))
    )
}

#[derive(Clone)]
pub struct BookingStore {
    pub(crate) store: Arc<Collection<Booking>>,
}

impl BookingStore {
    pub(crate) async fn new(db: &Database) -> Result<Self> {
        let bookings = db.collection(COLLECTION);
        bookings
            .create_index(IndexModel::builder().keys(doc! { "class_id": 1 }).build())
            .await?;
        bookings
            .create_index(IndexModel::builder().keys(doc! { "user_id": 1 }).build())
            .await?;
        // One live seat per user and class.
        bookings
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "user_id": 1, "class_id": 1 })
                    .options(
                        IndexOptions::builder()
                            .unique(true)
                            .partial_filter_expression(doc! {
                                "status": BookingStatus::Confirmed.as_ref()
                            })
                            .build(),
                    )
                    .build(),
            )
            .await?;
        Ok(BookingStore {
            store: Arc::new(bookings),
        })
    }

    /// `false` when the unique index on confirmed bookings rejects the insert.
    pub async fn insert(&self, session: &mut Session, booking: &Booking) -> Result<bool> {
        info!(
            "Add booking: {} user:{} class:{}",
            booking.id, booking.user_id, booking.class_id
        );
        match self.store.insert_one(booking).session(&mut *session).await {
            Ok(_) => Ok(true),
            Err(err) if is_duplicate_key(&err) => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    pub async fn get(&self, session: &mut Session, id: ObjectId) -> Result<Option<Booking>> {
        Ok(self
            .store
            .find_one(doc! { "_id": id })
            .session(&mut *session)
            .await?)
    }

    pub async fn find(&self, session: &mut Session, filter: BookingFilter) -> Result<Vec<Booking>> {
        let filter = match filter {
            BookingFilter::All => doc! {},
            BookingFilter::User(id) => doc! { "user_id": id },
            BookingFilter::Class(id) => doc! { "class_id": id },
        };
        let mut cursor = self
            .store
            .find(filter)
            .sort(doc! { "created_at": -1, "_id": -1 })
            .session(&mut *session)
            .await?;
        Ok(cursor.stream(&mut *session).try_collect().await?)
    }

    pub async fn find_confirmed(
        &self,
        session: &mut Session,
        user_id: ObjectId,
        class_id: ObjectId,
    ) -> Result<Option<Booking>> {
        Ok(self
            .store
            .find_one(doc! {
                "user_id": user_id,
                "class_id": class_id,
                "status": BookingStatus::Confirmed.as_ref(),
            })
            .session(&mut *session)
            .await?)
    }

    pub async fn count_confirmed(&self, session: &mut Session, class_id: ObjectId) -> Result<u64> {
        Ok(self
            .store
            .count_documents(doc! {
                "class_id": class_id,
                "status": BookingStatus::Confirmed.as_ref(),
            })
            .session(&mut *session)
            .await?)
    }

    /// Compare-and-set on the status. `false` if the booking is gone or no
    /// longer in `from`.
    pub async fn update_status(
        &self,
        session: &mut Session,
        id: ObjectId,
        from: BookingStatus,
        to: BookingStatus,
    ) -> Result<bool> {
        info!("Booking status: {} {} -> {}", id, from, to);
        let result = self
            .store
            .update_one(
                doc! { "_id": id, "status": from.as_ref() },
                doc! { "$set": { "status": to.as_ref() } },
            )
            .session(&mut *session)
            .await?;
        Ok(result.modified_count == 1)
    }

    pub async fn delete_by_class(&self, session: &mut Session, class_id: ObjectId) -> Result<u64> {
        info!("Delete bookings of class: {}", class_id);
        let result = self
            .store
            .delete_many(doc! { "class_id": class_id })
            .session(&mut *session)
            .await?;
        Ok(result.deleted_count)
    }
}
