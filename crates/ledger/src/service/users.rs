use chrono::Utc;
use eyre::Result;
use log::info;
use model::{
    errors::LedgerError,
    user::{normalize_email, NewUser, User},
};
use mongodb::bson::oid::ObjectId;
use storage::LedgerStore;

#[derive(Clone)]
pub struct Users<S> {
    store: S,
}

impl<S: LedgerStore> Users<S> {
    pub(crate) fn new(store: S) -> Self {
        Users { store }
    }

    pub async fn create(
        &self,
        session: &mut S::Session,
        new_user: NewUser,
    ) -> Result<User, LedgerError> {
        let user = new_user.into_user(Utc::now())?;
        if !self.store.insert_user(session, &user).await? {
            return Err(LedgerError::UserAlreadyExists(user.email));
        }
        info!("Registered user {} as {}", user.id, user.role);
        Ok(user)
    }

    pub async fn get(&self, session: &mut S::Session, id: ObjectId) -> Result<Option<User>> {
        self.store.get_user(session, id).await
    }

    pub async fn get_by_email(&self, session: &mut S::Session, email: &str) -> Result<Option<User>> {
        match normalize_email(email) {
            Ok(email) => self.store.get_user_by_email(session, &email).await,
            Err(_) => Ok(None),
        }
    }

    pub async fn find(&self, session: &mut S::Session) -> Result<Vec<User>> {
        self.store.find_users(session).await
    }
}
