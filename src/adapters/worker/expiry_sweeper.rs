//! ExpirySweeper - periodically expires fixed-term subscriptions past their end.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time;

use crate::application::handlers::subscription::SubscriptionLifecycle;
use crate::domain::foundation::{DomainError, Timestamp};

pub struct ExpirySweeper {
    lifecycle: Arc<SubscriptionLifecycle>,
    interval: Duration,
    batch_size: u32,
}

impl ExpirySweeper {
    pub fn new(lifecycle: Arc<SubscriptionLifecycle>, interval: Duration, batch_size: u32) -> Self {
        Self {
            lifecycle,
            interval,
            batch_size,
        }
    }

    /// Sweeps on every tick until the shutdown signal flips.
    ///
    /// A failed sweep is logged and retried on the next tick.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = time::interval(self.interval);

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        tracing::info!("Expiry sweeper stopped");
                        return;
                    }
                }

                _ = interval.tick() => {
                    if let Err(e) = self.sweep_once(Timestamp::now()).await {
                        tracing::warn!(error = %e, "Expiry sweep failed");
                    }
                }
            }
        }
    }

    /// Expires everything due at `now`, one batch at a time.
    pub async fn sweep_once(&self, now: Timestamp) -> Result<usize, DomainError> {
        let mut total = 0;
        loop {
            let expired = self.lifecycle.expire_due(now, self.batch_size).await?;
            total += expired;
            // A short batch means nothing is left, and a batch of pure
            // conflicts would otherwise spin.
            if expired == 0 || expired < self.batch_size as usize {
                break;
            }
        }
        if total > 0 {
            tracing::info!(expired = total, "Subscriptions expired");
        }
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::{InMemoryMonitorRepository, InMemorySubscriptionRepository};
    use crate::application::handlers::monitor::AllocationRefresher;
    use crate::config::AllocationConfig;
    use crate::domain::foundation::{Actor, AuditEntry, ClientId, MonitorId, SubscriptionId};
    use crate::domain::subscription::{
        Cart, CartItem, CartMonitor, Client, ClientRole, Recurrence, Subscription, SubscriptionStatus,
    };
    use crate::ports::SubscriptionRepository;

    fn sweeper(subscriptions: Arc<InMemorySubscriptionRepository>, batch_size: u32) -> ExpirySweeper {
        let monitors = Arc::new(InMemoryMonitorRepository::new(subscriptions.clone()));
        let refresher = Arc::new(AllocationRefresher::new(monitors, AllocationConfig::default()));
        let lifecycle = Arc::new(SubscriptionLifecycle::new(subscriptions, refresher));
        ExpirySweeper::new(lifecycle, Duration::from_millis(10), batch_size)
    }

    async fn active(repo: &InMemorySubscriptionRepository, recurrence: Recurrence, started: Timestamp) -> Subscription {
        let cart = Cart {
            client: Client { id: ClientId::new(), role: ClientRole::Client },
            recurrence,
            items: vec![CartItem {
                monitor: CartMonitor { monitor_id: MonitorId::new(), address_owner: None, box_active: true },
                slots_quantity: Some(1),
            }],
            amount_cents: 1_000,
            currency: "brl".to_string(),
        };
        let mut sub = Subscription::create_from_cart(SubscriptionId::new(), &cart, started);
        sub.activate(started, None).unwrap();
        repo.create(&sub, &AuditEntry::new("subscription", *sub.id.as_uuid(), "created", &Actor::system("test")))
            .await
            .unwrap();
        sub
    }

    #[tokio::test]
    async fn sweep_expires_due_subscriptions_across_batches() {
        let repo = Arc::new(InMemorySubscriptionRepository::new());
        let long_ago = Timestamp::now().add_days(-100);
        let mut due = Vec::new();
        for _ in 0..3 {
            due.push(active(&repo, Recurrence::ThirtyDays, long_ago).await);
        }
        let current = active(&repo, Recurrence::NinetyDays, Timestamp::now()).await;
        let open_ended = active(&repo, Recurrence::Monthly, long_ago).await;

        let expired = sweeper(repo.clone(), 2).sweep_once(Timestamp::now()).await.unwrap();

        assert_eq!(expired, 3);
        for sub in due {
            let stored = repo.find_by_id(&sub.id).await.unwrap().unwrap();
            assert_eq!(stored.status, SubscriptionStatus::Expired);
        }
        for sub in [current, open_ended] {
            let stored = repo.find_by_id(&sub.id).await.unwrap().unwrap();
            assert_eq!(stored.status, SubscriptionStatus::Active);
        }
    }

    #[tokio::test]
    async fn run_stops_on_shutdown() {
        let sweeper = sweeper(Arc::new(InMemorySubscriptionRepository::new()), 10);
        let (tx, rx) = watch::channel(false);

        let handle = tokio::spawn(async move { sweeper.run(rx).await });
        tokio::time::sleep(Duration::from_millis(25)).await;
        tx.send(true).unwrap();

        tokio::time::timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();
    }
}
