use std::sync::Arc;

use chrono::{DateTime, Utc};
use eyre::Result;
use futures_util::stream::TryStreamExt;
use log::info;
use model::{
    class::{Class, ClassDetails},
    session::Session,
};
use mongodb::{
    bson::{doc, oid::ObjectId, Document},
    Collection, Database, IndexModel,
};

use crate::CapacityDelta;

const COLLECTION: &str = "classes";

#[derive(Clone)]
pub struct ClassStore {
    pub(crate) store: Arc<Collection<Class>>,
}

impl ClassStore {
    pub(crate) async fn new(db: &Database) -> Result<Self> {
        let classes = db.collection(COLLECTION);
        classes
            .create_index(IndexModel::builder().keys(doc! { "start_at": 1 }).build())
            .await?;
        classes
            .create_index(IndexModel::builder().keys(doc! { "end_at": 1 }).build())
            .await?;
        classes
            .create_index(IndexModel::builder().keys(doc! { "instructor": 1 }).build())
            .await?;
        Ok(ClassStore {
            store: Arc::new(classes),
        })
    }

    pub async fn insert(&self, session: &mut Session, class: &Class) -> Result<()> {
        info!("Add class: {} {:?}", class.id, class.title);
        self.store.insert_one(class).session(&mut *session).await?;
        Ok(())
    }

    pub async fn get(&self, session: &mut Session, id: ObjectId) -> Result<Option<Class>> {
        Ok(self
            .store
            .find_one(doc! { "_id": id })
            .session(&mut *session)
            .await?)
    }

    pub async fn find(
        &self,
        session: &mut Session,
        from: Option<DateTime<Utc>>,
    ) -> Result<Vec<Class>> {
        let filter = match from {
            Some(from) => doc! { "start_at": { "$gte": from } },
            None => doc! {},
        };
        self.collect(session, filter).await
    }

    pub async fn find_finished(
        &self,
        session: &mut Session,
        now: DateTime<Utc>,
    ) -> Result<Vec<Class>> {
        self.collect(session, doc! { "end_at": { "$lt": now } })
            .await
    }

    async fn collect(&self, session: &mut Session, filter: Document) -> Result<Vec<Class>> {
        let mut cursor = self
            .store
            .find(filter)
            .sort(doc! { "start_at": 1 })
            .session(&mut *session)
            .await?;
        Ok(cursor.stream(&mut *session).try_collect().await?)
    }

    /// Owner edit. Refuses to drop `max_capacity` below the live counter and
    /// never writes the counter itself.
    pub async fn update_details(
        &self,
        session: &mut Session,
        id: ObjectId,
        details: &ClassDetails,
    ) -> Result<bool> {
        info!("Edit class: {} {:?}", id, details);
        let filter = doc! {
            "_id": id,
            "current_capacity": { "$lte": details.max_capacity as i64 },
        };
        let update = doc! {
            "$set": {
                "title": details.title.as_str(),
                "description": details.description.as_str(),
                "instructor": details.instructor,
                "start_at": details.start_at,
                "end_at": details.end_at,
                "max_capacity": details.max_capacity as i64,
                "price": details.price.inner(),
            }
        };
        let result = self
            .store
            .update_one(filter, update)
            .session(&mut *session)
            .await?;
        Ok(result.matched_count == 1)
    }

    /// Conditional counter move. `false` means the guard did not hold (class
    /// full on reserve, counter at zero on release) or the class is gone.
    pub async fn update_capacity(
        &self,
        session: &mut Session,
        id: ObjectId,
        delta: CapacityDelta,
    ) -> Result<bool> {
        info!("Capacity {:?}: {}", delta, id);
        let (filter, update) = match delta {
            CapacityDelta::Reserve => (
                doc! {
                    "_id": id,
                    "$expr": { "$lt": ["$current_capacity", "$max_capacity"] },
                },
                doc! { "$inc": { "current_capacity": 1 } },
            ),
            CapacityDelta::Release => (
                doc! {
                    "_id": id,
                    "current_capacity": { "$gt": 0 },
                },
                doc! { "$inc": { "current_capacity": -1 } },
            ),
        };
        let result = self
            .store
            .update_one(filter, update)
            .session(&mut *session)
            .await?;
        Ok(result.modified_count == 1)
    }

    pub async fn delete(&self, session: &mut Session, id: ObjectId) -> Result<bool> {
        info!("Delete class: {}", id);
        let result = self
            .store
            .delete_one(doc! { "_id": id })
            .session(&mut *session)
            .await?;
        Ok(result.deleted_count == 1)
    }
}
