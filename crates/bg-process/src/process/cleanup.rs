use crate::Task;
use async_trait::async_trait;
use chrono::Utc;
use eyre::Error;
use ledger::Ledger;
use log::info;
use storage::LedgerStore;

/// Drops classes that already ended together with their bookings.
#[derive(Clone)]
pub struct CleanupBg<S: LedgerStore> {
    ledger: Ledger<S>,
}

impl<S: LedgerStore> CleanupBg<S> {
    pub fn new(ledger: Ledger<S>) -> CleanupBg<S> {
        CleanupBg { ledger }
    }
}

#[async_trait]
impl<S: LedgerStore> Task for CleanupBg<S> {
    const NAME: &'static str = "cleanup";
    const CRON: &'static str = "every day at 02:00";

    async fn process(&mut self) -> Result<(), Error> {
        let mut session = self.ledger.start_session().await?;
        let purged = self
            .ledger
            .purge_finished_classes(&mut session, Utc::now())
            .await?;
        info!("Purged {} finished classes", purged);
        Ok(())
    }
}
