// ABOUTME: Makes sure an item's provider data is recent before fetching it
// ABOUTME: Requests a refresh for stale items and polls the status with a bounded budget

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use super::until_cancelled;
use crate::config::RefreshConfig;
use crate::error::SyncError;
use crate::provider::{ItemState, ItemStatus, ProviderGateway};

/// Limits for the refresh wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshPolicy {
    /// Data older than this triggers a refresh
    pub stale_after: chrono::Duration,
    pub poll_interval: Duration,
    pub max_attempts: u32,
}

impl Default for RefreshPolicy {
    fn default() -> Self {
        Self::from(&RefreshConfig::default())
    }
}

impl From<&RefreshConfig> for RefreshPolicy {
    fn from(config: &RefreshConfig) -> Self {
        Self {
            stale_after: config.stale_after(),
            poll_interval: config.poll_interval(),
            max_attempts: config.max_attempts,
        }
    }
}

/// Where an item ended up in `Current -> Stale -> Refreshing -> (Ready | Error)`.
///
/// Only the terminal outcomes are reported; `Stale` and `Refreshing` are
/// transient and show up in the logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FreshnessState {
    /// Recent enough, no refresh needed
    Current,
    Stale,
    Refreshing,
    /// Refreshed during this run
    Ready,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FreshnessReport {
    pub item_id: String,
    pub state: FreshnessState,
    /// Item update time before any refresh; feeds the watermark
    pub previous_updated_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub connector_name: Option<String>,
    /// Status polls spent waiting for a refresh
    pub polls: u32,
}

/// Drives the freshness check for one item at a time.
pub struct FreshnessCoordinator<'a> {
    gateway: &'a dyn ProviderGateway,
    policy: RefreshPolicy,
}

impl<'a> FreshnessCoordinator<'a> {
    pub fn new(gateway: &'a dyn ProviderGateway, policy: RefreshPolicy) -> Self {
        Self { gateway, policy }
    }

    /// Bring an item to `Current` or `Ready`.
    ///
    /// Fails with `RefreshFailed` if the provider reports an error state,
    /// `RefreshTimeout` once `max_attempts` polls are spent, `ProviderFetch`
    /// if a status call fails, and `Cancelled` when the token fires.
    pub async fn ensure_fresh(
        &self,
        item_id: &str,
        now: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<FreshnessReport, SyncError> {
        let initial = self.status(item_id, cancel).await?;
        let previous_updated_at = initial.updated_at;

        if initial.state == ItemState::Current && self.is_fresh(initial.updated_at, now) {
            tracing::debug!("Item {} is current", item_id);
            return Ok(FreshnessReport {
                item_id: item_id.to_string(),
                state: FreshnessState::Current,
                previous_updated_at,
                updated_at: initial.updated_at,
                connector_name: initial.connector_name,
                polls: 0,
            });
        }

        if initial.state == ItemState::Updating {
            tracing::info!("Item {} is already refreshing, waiting", item_id);
        } else {
            tracing::info!(
                "Item {} is {:?} (last update {}), requesting refresh",
                item_id,
                FreshnessState::Stale,
                describe(previous_updated_at)
            );
            until_cancelled(cancel, self.gateway.request_refresh(item_id))
                .await?
                .map_err(|e| SyncError::provider(format!("refresh of item {}", item_id), e))?;
        }

        let mut connector_name = initial.connector_name;
        for attempt in 1..=self.policy.max_attempts {
            tokio::select! {
                _ = cancel.cancelled() => return Err(SyncError::Cancelled),
                _ = tokio::time::sleep(self.policy.poll_interval) => {}
            }

            let status = self.status(item_id, cancel).await?;
            if status.connector_name.is_some() {
                connector_name = status.connector_name.clone();
            }

            match status.state {
                ItemState::Error => {
                    let execution_status = status
                        .execution_status
                        .unwrap_or_else(|| "UNKNOWN".to_string());
                    tracing::warn!(
                        "Item {} refresh failed with {}",
                        item_id,
                        execution_status
                    );
                    return Err(SyncError::RefreshFailed {
                        item_id: item_id.to_string(),
                        execution_status,
                    });
                }
                ItemState::Current if self.is_fresh(status.updated_at, now) => {
                    tracing::info!(
                        "Item {} refreshed after {} poll(s), updated at {}",
                        item_id,
                        attempt,
                        describe(status.updated_at)
                    );
                    return Ok(FreshnessReport {
                        item_id: item_id.to_string(),
                        state: FreshnessState::Ready,
                        previous_updated_at,
                        updated_at: status.updated_at,
                        connector_name,
                        polls: attempt,
                    });
                }
                _ => {
                    tracing::debug!(
                        "Item {} {:?} (poll {}/{})",
                        item_id,
                        FreshnessState::Refreshing,
                        attempt,
                        self.policy.max_attempts
                    );
                }
            }
        }

        tracing::warn!(
            "Item {} still refreshing after {} polls, giving up",
            item_id,
            self.policy.max_attempts
        );
        Err(SyncError::RefreshTimeout {
            item_id: item_id.to_string(),
            attempts: self.policy.max_attempts,
        })
    }

    fn is_fresh(&self, updated_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
        match updated_at {
            Some(updated_at) => now - updated_at <= self.policy.stale_after,
            None => false,
        }
    }

    async fn status(
        &self,
        item_id: &str,
        cancel: &CancellationToken,
    ) -> Result<ItemStatus, SyncError> {
        until_cancelled(cancel, self.gateway.item_status(item_id))
            .await?
            .map_err(|e| SyncError::provider(format!("status of item {}", item_id), e))
    }
}

fn describe(updated_at: Option<DateTime<Utc>>) -> String {
    updated_at
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;
    use crate::models::AccountType;
    use crate::provider::{ProviderAccount, TransactionPage, TransactionQuery};
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays a scripted sequence of item statuses; the last one repeats.
    struct ScriptedItem {
        statuses: Mutex<VecDeque<ItemStatus>>,
        refreshes: Mutex<u32>,
    }

    impl ScriptedItem {
        fn new(statuses: Vec<ItemStatus>) -> Self {
            Self {
                statuses: Mutex::new(statuses.into()),
                refreshes: Mutex::new(0),
            }
        }

        fn refreshes(&self) -> u32 {
            *self.refreshes.lock().unwrap()
        }
    }

    #[async_trait]
    impl ProviderGateway for ScriptedItem {
        async fn item_status(&self, _item_id: &str) -> Result<ItemStatus, ProviderError> {
            let mut statuses = self.statuses.lock().unwrap();
            if statuses.len() > 1 {
                Ok(statuses.pop_front().unwrap())
            } else {
                statuses
                    .front()
                    .cloned()
                    .ok_or_else(|| ProviderError::Unavailable("no status".to_string()))
            }
        }

        async fn request_refresh(&self, _item_id: &str) -> Result<(), ProviderError> {
            *self.refreshes.lock().unwrap() += 1;
            Ok(())
        }

        async fn list_accounts(
            &self,
            _item_id: &str,
            _account_type: AccountType,
        ) -> Result<Vec<ProviderAccount>, ProviderError> {
            Ok(Vec::new())
        }

        async fn list_transactions(
            &self,
            _account_id: &str,
            _query: &TransactionQuery,
        ) -> Result<TransactionPage, ProviderError> {
            Ok(TransactionPage {
                results: Vec::new(),
                page: 1,
                total_pages: 0,
            })
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 10, 12, 0, 0).unwrap()
    }

    fn status(state: ItemState, hours_ago: Option<i64>) -> ItemStatus {
        ItemStatus {
            state,
            execution_status: None,
            updated_at: hours_ago.map(|h| now() - chrono::Duration::hours(h)),
            connector_name: Some("Nubank".to_string()),
        }
    }

    fn fast_policy(max_attempts: u32) -> RefreshPolicy {
        RefreshPolicy {
            stale_after: chrono::Duration::days(1),
            poll_interval: Duration::from_millis(1),
            max_attempts,
        }
    }

    #[tokio::test]
    async fn test_current_item_needs_no_refresh() {
        let gateway = ScriptedItem::new(vec![status(ItemState::Current, Some(2))]);
        let coordinator = FreshnessCoordinator::new(&gateway, fast_policy(3));
        let report = coordinator
            .ensure_fresh("item-1", now(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report.state, FreshnessState::Current);
        assert_eq!(report.polls, 0);
        assert_eq!(gateway.refreshes(), 0);
        assert_eq!(report.connector_name.as_deref(), Some("Nubank"));
    }

    #[tokio::test]
    async fn test_stale_item_is_refreshed() {
        let gateway = ScriptedItem::new(vec![
            status(ItemState::Current, Some(48)),
            status(ItemState::Updating, Some(48)),
            status(ItemState::Current, Some(0)),
        ]);
        let coordinator = FreshnessCoordinator::new(&gateway, fast_policy(5));
        let report = coordinator
            .ensure_fresh("item-1", now(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report.state, FreshnessState::Ready);
        assert_eq!(report.polls, 2);
        assert_eq!(gateway.refreshes(), 1);
        assert_eq!(
            report.previous_updated_at,
            Some(now() - chrono::Duration::hours(48))
        );
        assert_eq!(report.updated_at, Some(now()));
    }

    #[tokio::test]
    async fn test_unknown_update_time_is_stale() {
        let gateway = ScriptedItem::new(vec![
            status(ItemState::Current, None),
            status(ItemState::Current, Some(0)),
        ]);
        let coordinator = FreshnessCoordinator::new(&gateway, fast_policy(5));
        let report = coordinator
            .ensure_fresh("item-1", now(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report.state, FreshnessState::Ready);
        assert_eq!(gateway.refreshes(), 1);
        assert!(report.previous_updated_at.is_none());
    }

    #[tokio::test]
    async fn test_already_updating_item_is_not_refreshed_again() {
        let gateway = ScriptedItem::new(vec![
            status(ItemState::Updating, Some(30)),
            status(ItemState::Current, Some(0)),
        ]);
        let coordinator = FreshnessCoordinator::new(&gateway, fast_policy(5));
        let report = coordinator
            .ensure_fresh("item-1", now(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report.state, FreshnessState::Ready);
        assert_eq!(gateway.refreshes(), 0);
    }

    #[tokio::test]
    async fn test_refresh_times_out() {
        let gateway = ScriptedItem::new(vec![
            status(ItemState::Current, Some(48)),
            status(ItemState::Updating, Some(48)),
        ]);
        let coordinator = FreshnessCoordinator::new(&gateway, fast_policy(3));
        let err = coordinator
            .ensure_fresh("item-1", now(), &CancellationToken::new())
            .await
            .unwrap_err();
        match err {
            SyncError::RefreshTimeout { item_id, attempts } => {
                assert_eq!(item_id, "item-1");
                assert_eq!(attempts, 3);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_refresh_error_state() {
        let mut failed = status(ItemState::Error, Some(48));
        failed.execution_status = Some("INVALID_CREDENTIALS".to_string());
        let gateway = ScriptedItem::new(vec![status(ItemState::Current, Some(48)), failed]);
        let coordinator = FreshnessCoordinator::new(&gateway, fast_policy(3));
        let err = coordinator
            .ensure_fresh("item-1", now(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SyncError::RefreshFailed { ref execution_status, .. } if execution_status == "INVALID_CREDENTIALS"
        ));
    }

    #[tokio::test]
    async fn test_cancellation_during_wait() {
        let gateway = ScriptedItem::new(vec![
            status(ItemState::Current, Some(48)),
            status(ItemState::Updating, Some(48)),
        ]);
        let policy = RefreshPolicy {
            poll_interval: Duration::from_secs(3600),
            ..fast_policy(3)
        };
        let coordinator = FreshnessCoordinator::new(&gateway, policy);
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.cancel();
        });
        let err = coordinator
            .ensure_fresh("item-1", now(), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Cancelled));
    }
}
