/*!
 * Telegram dispatcher.
 *
 * Matches every telegram against the registered address filters and fans it
 * out to the interested callbacks. Callbacks run on their own tasks so a slow
 * subscriber never stalls delivery to the others.
 */
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;
use tracing::{trace, warn};

use crate::address::AddressFilter;
use crate::error::{KnxError, Result};
use crate::telegram::{Telegram, TelegramDirection};

/// Callback invoked with each matching telegram
pub type TelegramCallback = Arc<dyn Fn(Telegram) -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// Build a [`TelegramCallback`] from an async closure
pub fn telegram_callback<F, Fut>(f: F) -> TelegramCallback
where
    F: Fn(Telegram) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = Result<()>> + Send + 'static,
{
    Arc::new(move |telegram| Box::pin(f(telegram)))
}

/// Handle returned by [`TelegramDispatcher::register`]; pass it back to
/// [`TelegramDispatcher::unregister`] on teardown
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegistrationHandle(u64);

struct Registration {
    id: u64,
    callback: TelegramCallback,
    filters: Vec<AddressFilter>,
    match_for_outgoing: bool,
}

impl Registration {
    fn matches(&self, telegram: &Telegram) -> bool {
        if telegram.direction == TelegramDirection::Outgoing && !self.match_for_outgoing {
            return false;
        }
        // An empty filter set means "match everything"; used by the global
        // event listener and the telegram history recorder.
        if self.filters.is_empty() {
            return true;
        }
        self.filters
            .iter()
            .any(|filter| filter.matches(&telegram.destination))
    }
}

/// Dispatches telegrams to registered callbacks in registration order
pub struct TelegramDispatcher {
    registrations: Mutex<Vec<Registration>>,
    next_id: AtomicU64,
}

impl std::fmt::Debug for TelegramDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self.registrations.lock().map(|r| r.len()).unwrap_or(0);
        f.debug_struct("TelegramDispatcher")
            .field("registrations", &count)
            .finish()
    }
}

impl TelegramDispatcher {
    /// Create a new dispatcher with no registrations
    pub fn new() -> Self {
        Self {
            registrations: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a callback for telegrams matching any of the given filters.
    ///
    /// An empty filter set matches every telegram. Outgoing telegrams are
    /// only delivered when `match_for_outgoing` is set.
    pub fn register(
        &self,
        callback: TelegramCallback,
        filters: Vec<AddressFilter>,
        match_for_outgoing: bool,
    ) -> Result<RegistrationHandle> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut registrations = self
            .registrations
            .lock()
            .map_err(|_| KnxError::dispatch("Failed to lock dispatcher registrations"))?;
        registrations.push(Registration {
            id,
            callback,
            filters,
            match_for_outgoing,
        });
        Ok(RegistrationHandle(id))
    }

    /// Remove a registration; unknown handles are ignored
    pub fn unregister(&self, handle: RegistrationHandle) -> Result<()> {
        let mut registrations = self
            .registrations
            .lock()
            .map_err(|_| KnxError::dispatch("Failed to lock dispatcher registrations"))?;
        registrations.retain(|registration| registration.id != handle.0);
        Ok(())
    }

    /// Number of live registrations
    pub fn len(&self) -> usize {
        self.registrations.lock().map(|r| r.len()).unwrap_or(0)
    }

    /// Whether no callbacks are registered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deliver a telegram to every matching registration.
    ///
    /// Each callback runs on its own task (fire-and-continue): the dispatcher
    /// never awaits one subscriber before invoking the next, and a failing
    /// callback is logged without affecting the others.
    pub fn dispatch(&self, telegram: &Telegram) -> Result<usize> {
        let callbacks: Vec<TelegramCallback> = {
            let registrations = self
                .registrations
                .lock()
                .map_err(|_| KnxError::dispatch("Failed to lock dispatcher registrations"))?;
            registrations
                .iter()
                .filter(|registration| registration.matches(telegram))
                .map(|registration| registration.callback.clone())
                .collect()
        };

        trace!("Dispatching {} to {} callbacks", telegram, callbacks.len());

        for callback in &callbacks {
            let callback = callback.clone();
            let telegram = telegram.clone();
            tokio::spawn(async move {
                if let Err(e) = callback(telegram.clone()).await {
                    warn!("Telegram callback failed for {}: {}", telegram, e);
                }
            });
        }

        Ok(callbacks.len())
    }
}

impl Default for TelegramDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use tokio::sync::mpsc;

    use crate::address::{GroupAddress, IndividualAddress};
    use crate::telegram::TelegramPayload;

    fn telegram(destination: &str) -> Telegram {
        Telegram::incoming(
            IndividualAddress::parse("1.1.5").unwrap(),
            GroupAddress::parse(destination).unwrap(),
            TelegramPayload::GroupValueWrite(Bytes::from_static(&[1])),
        )
    }

    fn counting_callback(tx: mpsc::UnboundedSender<&'static str>, tag: &'static str) -> TelegramCallback {
        telegram_callback(move |_telegram| {
            let tx = tx.clone();
            async move {
                tx.send(tag).unwrap();
                Ok(())
            }
        })
    }

    #[tokio::test]
    async fn test_filter_matching() {
        let dispatcher = TelegramDispatcher::new();
        let (tx, mut rx) = mpsc::unbounded_channel();

        dispatcher
            .register(
                counting_callback(tx, "lights"),
                vec![AddressFilter::parse("1/2/*").unwrap()],
                false,
            )
            .unwrap();

        assert_eq!(dispatcher.dispatch(&telegram("1/2/3")).unwrap(), 1);
        assert_eq!(dispatcher.dispatch(&telegram("4/0/0")).unwrap(), 0);

        assert_eq!(rx.recv().await, Some("lights"));
    }

    #[tokio::test]
    async fn test_empty_filters_match_everything() {
        let dispatcher = TelegramDispatcher::new();
        let (tx, mut rx) = mpsc::unbounded_channel();

        dispatcher
            .register(counting_callback(tx, "all"), Vec::new(), false)
            .unwrap();

        assert_eq!(dispatcher.dispatch(&telegram("1/2/3")).unwrap(), 1);
        assert_eq!(dispatcher.dispatch(&telegram("31/7/255")).unwrap(), 1);
        assert_eq!(rx.recv().await, Some("all"));
        assert_eq!(rx.recv().await, Some("all"));
    }

    #[tokio::test]
    async fn test_outgoing_requires_opt_in() {
        let dispatcher = TelegramDispatcher::new();
        let (tx, mut rx) = mpsc::unbounded_channel();

        dispatcher
            .register(counting_callback(tx.clone(), "incoming_only"), Vec::new(), false)
            .unwrap();
        dispatcher
            .register(counting_callback(tx, "both"), Vec::new(), true)
            .unwrap();

        let outgoing = Telegram::outgoing(
            IndividualAddress::parse("15.15.250").unwrap(),
            GroupAddress::parse("1/2/3").unwrap(),
            TelegramPayload::GroupValueWrite(Bytes::from_static(&[0])),
        );
        assert_eq!(dispatcher.dispatch(&outgoing).unwrap(), 1);
        assert_eq!(rx.recv().await, Some("both"));
    }

    #[tokio::test]
    async fn test_fan_out_isolation() {
        // A failing callback must not prevent delivery to the others, and no
        // error may escape dispatch.
        let dispatcher = TelegramDispatcher::new();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let failing = telegram_callback(|_telegram| async {
            Err(KnxError::other("subscriber is broken"))
        });
        dispatcher
            .register(failing, vec![AddressFilter::parse("1/*/*").unwrap()], false)
            .unwrap();
        dispatcher
            .register(
                counting_callback(tx, "healthy"),
                vec![AddressFilter::parse("1/2/3").unwrap()],
                false,
            )
            .unwrap();

        assert_eq!(dispatcher.dispatch(&telegram("1/2/3")).unwrap(), 2);
        assert_eq!(rx.recv().await, Some("healthy"));
    }

    #[tokio::test]
    async fn test_unregister() {
        let dispatcher = TelegramDispatcher::new();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let handle = dispatcher
            .register(counting_callback(tx, "gone"), Vec::new(), false)
            .unwrap();
        assert_eq!(dispatcher.len(), 1);

        dispatcher.unregister(handle).unwrap();
        assert!(dispatcher.is_empty());
        assert_eq!(dispatcher.dispatch(&telegram("1/2/3")).unwrap(), 0);
        assert!(rx.try_recv().is_err());
    }
}
