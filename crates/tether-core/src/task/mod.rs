//! Task adapters: tracked futures, abortable operations, stream consumers.
//!
//! Three shapes of asynchronous work:
//!
//! - [`spawn_task`](crate::scope::LifecycleScope::spawn_task) — a one-shot
//!   future; auto-removes on natural completion.
//! - [`spawn_abortable`](crate::scope::LifecycleScope::spawn_abortable) — a
//!   cooperative operation handed its own [`CancellationToken`]. The
//!   operation must check the token after every wait or retry sleep; the
//!   driving task additionally races the token so a non-cooperative await
//!   still stops at its next suspension point.
//! - [`spawn_consumer`](crate::scope::LifecycleScope::spawn_consumer) — a
//!   channel-consumer loop; each delivered item counts as one trigger.
//!
//! Errors inside the tracked work are the operation's own business (retry
//! policy, error channel); the registry only guarantees eventual cleanup.

use std::future::Future;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::handle::{HandleMetrics, ResourceKind};
use crate::id::epoch_millis;
use crate::registry::RegistryError;
use crate::scope::LifecycleScope;

impl LifecycleScope {
    /// Tracks a one-shot future.
    ///
    /// Cancellation stops the future at its next suspension point; natural
    /// completion removes the entry without an explicit cancel.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::ScopeClosed`] after shutdown.
    pub fn spawn_task<Fut>(&self, future: Fut) -> Result<String, RegistryError>
    where
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.ensure_open()?;
        let id = self.next_id(ResourceKind::Task);
        let token = CancellationToken::new();
        let metrics = Arc::new(HandleMetrics::new());

        let cancel_token = token.clone();
        self.track(
            ResourceKind::Task,
            id.clone(),
            Box::new(move || {
                cancel_token.cancel();
                Ok(())
            }),
            None,
            None,
            Arc::clone(&metrics),
        )?;

        let registry = Arc::downgrade(self.registry());
        let task_id = id.clone();
        self.runtime().spawn(async move {
            tokio::select! {
                () = token.cancelled() => {}
                () = future => {
                    metrics.record_trigger(epoch_millis());
                    if let Some(registry) = registry.upgrade() {
                        registry.discard(&task_id);
                    }
                }
            }
        });
        Ok(id)
    }

    /// Tracks a cooperatively abortable operation.
    ///
    /// The operation receives a token that fires when the resource is
    /// canceled; an operation that polls, retries, or waits must check the
    /// token after every wait. Natural completion removes the entry.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::ScopeClosed`] after shutdown.
    pub fn spawn_abortable<F, Fut>(&self, operation: F) -> Result<String, RegistryError>
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.ensure_open()?;
        let id = self.next_id(ResourceKind::Task);
        let token = CancellationToken::new();
        let metrics = Arc::new(HandleMetrics::new());

        let cancel_token = token.clone();
        self.track(
            ResourceKind::Task,
            id.clone(),
            Box::new(move || {
                cancel_token.cancel();
                Ok(())
            }),
            None,
            None,
            Arc::clone(&metrics),
        )?;

        let registry = Arc::downgrade(self.registry());
        let task_id = id.clone();
        let op_token = token.clone();
        self.runtime().spawn(async move {
            let work = operation(op_token);
            tokio::select! {
                () = token.cancelled() => {}
                () = work => {
                    metrics.record_trigger(epoch_millis());
                    if let Some(registry) = registry.upgrade() {
                        registry.discard(&task_id);
                    }
                }
            }
        });
        Ok(id)
    }

    /// Tracks a channel-consumer loop.
    ///
    /// Each delivered item records one trigger. The entry auto-removes when
    /// the channel closes; cancellation stops consumption immediately.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::ScopeClosed`] after shutdown.
    pub fn spawn_consumer<T, F>(
        &self,
        mut receiver: tokio::sync::mpsc::Receiver<T>,
        mut on_item: F,
    ) -> Result<String, RegistryError>
    where
        T: Send + 'static,
        F: FnMut(T) + Send + 'static,
    {
        self.ensure_open()?;
        let id = self.next_id(ResourceKind::AsyncStream);
        let token = CancellationToken::new();
        let metrics = Arc::new(HandleMetrics::new());

        let cancel_token = token.clone();
        self.track(
            ResourceKind::AsyncStream,
            id.clone(),
            Box::new(move || {
                cancel_token.cancel();
                Ok(())
            }),
            None,
            None,
            Arc::clone(&metrics),
        )?;

        let registry = Arc::downgrade(self.registry());
        let task_id = id.clone();
        self.runtime().spawn(async move {
            loop {
                tokio::select! {
                    () = token.cancelled() => return,
                    item = receiver.recv() => {
                        match item {
                            Some(item) => {
                                if token.is_cancelled() {
                                    return;
                                }
                                metrics.record_trigger(epoch_millis());
                                on_item(item);
                            }
                            None => break,
                        }
                    }
                }
            }
            if let Some(registry) = registry.upgrade() {
                registry.discard(&task_id);
            }
        });
        Ok(id)
    }
}
