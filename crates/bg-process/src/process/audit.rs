use crate::Task;
use async_trait::async_trait;
use eyre::Error;
use ledger::Ledger;
use log::{error, info};
use storage::LedgerStore;

/// Reports classes whose seat counter disagrees with their confirmed
/// bookings. The counter itself is left untouched.
#[derive(Clone)]
pub struct CapacityAuditBg<S: LedgerStore> {
    ledger: Ledger<S>,
}

impl<S: LedgerStore> CapacityAuditBg<S> {
    pub fn new(ledger: Ledger<S>) -> CapacityAuditBg<S> {
        CapacityAuditBg { ledger }
    }
}

#[async_trait]
impl<S: LedgerStore> Task for CapacityAuditBg<S> {
    const NAME: &'static str = "capacity audit";
    const CRON: &'static str = "every 1 hour";

    async fn process(&mut self) -> Result<(), Error> {
        let mut session = self.ledger.start_session().await?;
        let classes = self.ledger.classes.find(&mut session).await?;
        let mut drifted = 0;
        for class in &classes {
            let audit = match self.ledger.audit_capacity(&mut session, class.id).await {
                Ok(audit) => audit,
                Err(err) if err.is_not_found() => continue,
                Err(err) => return Err(err.into()),
            };
            if !audit.is_consistent() {
                error!(
                    "Class {} counter is {} but has {} confirmed bookings",
                    audit.class_id, audit.counter, audit.confirmed
                );
                drifted += 1;
            }
        }
        info!("Audited {} classes, {} drifted", classes.len(), drifted);
        Ok(())
    }
}
