use std::{env::var, sync::Arc};

use dotenv::dotenv;
use eyre::{eyre, Error};
use log::info;

const DEFAULT_MONGO_DB: &str = "yoga_studio";
const DEFAULT_RUST_LOG: &str = "info";

#[derive(Clone, Debug)]
pub struct Env(Arc<EnvInner>);

#[derive(Clone, Debug)]
pub struct EnvInner {
    mongo_url: String,
    mongo_db: String,
    rust_log: String,
}

impl Env {
    pub fn mongo_url(&self) -> &str {
        &self.0.mongo_url
    }

    pub fn mongo_db(&self) -> &str {
        &self.0.mongo_db
    }

    pub fn rust_log(&self) -> &str {
        &self.0.rust_log
    }

    /// Reads the process environment, after merging `.env` when one exists.
    pub fn load() -> Result<Env, Error> {
        if let Err(err) = dotenv() {
            info!("No .env file loaded: {}", err);
        }
        Env::from_lookup(|key| var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Env, Error> {
        let value = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        Ok(Env(Arc::new(EnvInner {
            mongo_url: value("MONGO_URL").ok_or_else(|| eyre!("MONGO_URL is not set"))?,
            mongo_db: value("MONGO_DB").unwrap_or_else(|| DEFAULT_MONGO_DB.to_owned()),
            rust_log: value("RUST_LOG").unwrap_or_else(|| DEFAULT_RUST_LOG.to_owned()),
        })))
    }
}
