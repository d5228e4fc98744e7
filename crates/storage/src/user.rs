use std::sync::Arc;

use bson::to_document;
use eyre::Result;
use futures_util::stream::TryStreamExt;
use log::info;
use model::session::Session;
use model::user::User;
use mongodb::options::IndexOptions;
use mongodb::IndexModel;
use mongodb::{
    bson::{doc, oid::ObjectId},
    Collection, Database,
};

const COLLECTION: &str = "users";

#[derive(Clone)]
pub struct UserStore {
    pub(crate) users: Arc<Collection<User>>,
}

impl UserStore {
    pub(crate) async fn new(db: &Database) -> Result<Self> {
        let users = db.collection(COLLECTION);
        users
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "email": 1 })
                    .options(IndexOptions::builder().unique(true).build())
                    .build(),
            )
            .await?;
        Ok(UserStore {
            users: Arc::new(users),
        })
    }

    pub async fn get(&self, session: &mut Session, id: ObjectId) -> Result<Option<User>> {
        Ok(self
            .users
            .find_one(doc! { "_id": id })
            .session(&mut *session)
            .await?)
    }

    pub async fn get_by_email(&self, session: &mut Session, email: &str) -> Result<Option<User>> {
        Ok(self
            .users
            .find_one(doc! { "email": email })
            .session(&mut *session)
            .await?)
    }

    /// Returns `false` when the email is already registered.
    pub async fn insert(&self, session: &mut Session, user: &User) -> Result<bool> {
        info!("Inserting user: {} {}", user.id, user.email);
        let result = self
            .users
            .update_one(
                doc! { "email": user.email.as_str() },
                doc! { "$setOnInsert": to_document(user)? },
            )
            .upsert(true)
            .session(&mut *session)
            .await?;
        Ok(result.upserted_id.is_some())
    }

    pub async fn find(&self, session: &mut Session) -> Result<Vec<User>> {
        let mut cursor = self
            .users
            .find(doc! {})
            .sort(doc! { "created_at": 1 })
            .session(&mut *session)
            .await?;
        Ok(cursor.stream(&mut *session).try_collect().await?)
    }
}
