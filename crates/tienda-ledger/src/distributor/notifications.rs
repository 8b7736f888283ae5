//! Reconciliation notices.
//!
//! Notices are raised by whatever watches for overdue reconciliations; this
//! engine stores them and moves them along `pending → seen → resolved`.

use tracing::info;

use tienda_core::distributor::{NoticeState, ReconciliationNotice};
use tienda_core::validation::validate_stock_level;
use tienda_core::CoreError;
use tienda_db::repository::distributor as store;
use tienda_db::new_id;

use super::DistributorEngine;
use crate::error::{LedgerError, LedgerResult};

impl DistributorEngine {
    pub async fn raise_notification(
        &self,
        distributor_id: &str,
        days_without_reconciliation: i64,
    ) -> LedgerResult<ReconciliationNotice> {
        validate_stock_level("days_without_reconciliation", days_without_reconciliation)?;
        let distributor = self.distributor(distributor_id).await?;

        let now = self.clock.now();
        let notice = ReconciliationNotice {
            id: new_id(),
            distributor_id: distributor.id,
            days_without_reconciliation,
            state: NoticeState::Pending,
            created_at: now,
            updated_at: now,
        };
        let mut conn = self.db.pool().acquire().await?;
        store::insert_notice(&mut conn, &notice).await?;

        info!(id = %notice.id, distributor_id = %notice.distributor_id, days = days_without_reconciliation, "Reconciliation notice raised");
        Ok(notice)
    }

    pub async fn mark_seen(&self, notice_id: &str) -> LedgerResult<ReconciliationNotice> {
        self.move_notice(notice_id, NoticeState::Seen).await
    }

    pub async fn resolve(&self, notice_id: &str) -> LedgerResult<ReconciliationNotice> {
        self.move_notice(notice_id, NoticeState::Resolved).await
    }

    /// Pending notices of this channel, most overdue first.
    pub async fn pending_notifications(&self) -> LedgerResult<Vec<ReconciliationNotice>> {
        let ours = self.channel_distributor_ids().await?;
        let pending = self.db.distributors().pending_notices().await?;
        Ok(pending
            .into_iter()
            .filter(|n| ours.contains(&n.distributor_id))
            .collect())
    }

    async fn move_notice(&self, notice_id: &str, next: NoticeState) -> LedgerResult<ReconciliationNotice> {
        let mut tx = self.db.pool().begin().await?;
        let mut notice = store::get_notice(&mut tx, notice_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("Notice", notice_id))?;
        let distributor = store::get_distributor(&mut tx, &notice.distributor_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("Distributor", &notice.distributor_id))?;
        self.ensure_channel(&distributor.id, distributor.channel)?;

        let from = notice.state;
        notice.transition(next, self.clock.now())?;
        if !store::store_notice_state(&mut tx, &notice, from).await? {
            return Err(CoreError::InvalidTransition {
                entity: "Notice",
                id: notice.id.clone(),
                from: from.as_str().to_string(),
                to: next.as_str().to_string(),
            }
            .into());
        }
        tx.commit().await?;

        info!(id = %notice.id, from = from.as_str(), to = next.as_str(), "Reconciliation notice updated");
        Ok(notice)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::error::ErrorKind;

    #[tokio::test]
    async fn test_notice_lifecycle() {
        let h = harness().await;
        let norte = h.wholesale.create_distributor("Distribuidora Norte").await.unwrap();

        let notice = h.wholesale.raise_notification(&norte.id, 9).await.unwrap();
        assert_eq!(notice.state, NoticeState::Pending);
        assert_eq!(h.wholesale.pending_notifications().await.unwrap().len(), 1);

        h.clock.advance_days(1);
        let seen = h.wholesale.mark_seen(&notice.id).await.unwrap();
        assert_eq!(seen.state, NoticeState::Seen);
        assert_eq!(seen.updated_at.date(), day(3));
        assert!(h.wholesale.pending_notifications().await.unwrap().is_empty());

        let err = h.wholesale.mark_seen(&notice.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);

        let resolved = h.wholesale.resolve(&notice.id).await.unwrap();
        assert_eq!(resolved.state, NoticeState::Resolved);
        let err = h.wholesale.resolve(&notice.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn test_resolve_straight_from_pending() {
        let h = harness().await;
        let kiosko = h.retail.create_distributor("Kiosko Plaza").await.unwrap();
        let norte = h.wholesale.create_distributor("Distribuidora Norte").await.unwrap();

        let mild = h.retail.raise_notification(&kiosko.id, 2).await.unwrap();
        let worse = h.retail.raise_notification(&kiosko.id, 5).await.unwrap();
        h.wholesale.raise_notification(&norte.id, 30).await.unwrap();

        let pending = h.retail.pending_notifications().await.unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].id, worse.id);

        let resolved = h.retail.resolve(&mild.id).await.unwrap();
        assert_eq!(resolved.state, NoticeState::Resolved);

        // Wrong engine for this notice
        let err = h.wholesale.mark_seen(&worse.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let err = h.retail.raise_notification(&kiosko.id, -1).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        let err = h.retail.resolve("missing").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
