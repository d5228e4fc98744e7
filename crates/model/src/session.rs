use std::{
    ops::{Deref, DerefMut},
    time::{Duration, Instant},
};

use async_trait::async_trait;
use eyre::Result;
use mongodb::{error::UNKNOWN_TRANSACTION_COMMIT_RESULT, ClientSession};

/// How long a commit with an unknown outcome keeps being retried.
const COMMIT_RETRY_WINDOW: Duration = Duration::from_secs(120);

/// Unit of work shared by every store call made on behalf of one request.
///
/// `#[tx]` drives these methods; stores never start or finish transactions
/// themselves.
#[async_trait]
pub trait Transaction: Send {
    async fn begin(&mut self) -> Result<()>;
    async fn commit(&mut self) -> Result<()>;
    async fn abort(&mut self) -> Result<()>;
}

pub struct Session {
    client_session: ClientSession,
}

impl Session {
    pub fn new(client_session: ClientSession) -> Self {
        Session { client_session }
    }
}

#[async_trait]
impl Transaction for Session {
    async fn begin(&mut self) -> Result<()> {
        self.client_session.start_transaction().await?;
        Ok(())
    }

    /// Commits, re-sending the commit while the server reports its outcome
    /// as unknown. The body itself is never replayed here.
    async fn commit(&mut self) -> Result<()> {
        let started = Instant::now();
        loop {
            match self.client_session.commit_transaction().await {
                Ok(()) => return Ok(()),
                Err(err)
                    if err.contains_label(UNKNOWN_TRANSACTION_COMMIT_RESULT)
                        && started.elapsed() < COMMIT_RETRY_WINDOW =>
                {
                    continue
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    async fn abort(&mut self) -> Result<()> {
        self.client_session.abort_transaction().await?;
        Ok(())
    }
}

impl Deref for Session {
    type Target = ClientSession;

    fn deref(&self) -> &Self::Target {
        &self.client_session
    }
}

impl DerefMut for Session {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.client_session
    }
}

impl<'a> From<&'a mut Session> for &'a mut ClientSession {
    fn from(session: &'a mut Session) -> &'a mut ClientSession {
        &mut session.client_session
    }
}
