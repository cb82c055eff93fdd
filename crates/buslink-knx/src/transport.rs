/*!
 * Outbound transport seam.
 *
 * The KNX/IP stack itself is an external collaborator; the pipeline only
 * needs a way to hand it outgoing telegrams. The loopback writer feeds the
 * local dispatcher as well, so outgoing traffic reaches registrations that
 * opted in to it.
 */
use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;

use crate::dispatcher::TelegramDispatcher;
use crate::error::Result;
use crate::telegram::Telegram;

/// Sink for outgoing telegrams
#[async_trait]
pub trait GroupWriter: Debug + Send + Sync {
    /// Queue a telegram for transmission on the bus
    async fn send(&self, telegram: Telegram) -> Result<()>;
}

/// Writer that delivers outgoing telegrams to the local dispatcher.
///
/// Production setups wrap the real bus connection and chain to this so that
/// match-for-outgoing registrations (history, events) observe sent traffic.
#[derive(Debug)]
pub struct LoopbackWriter {
    dispatcher: Arc<TelegramDispatcher>,
}

impl LoopbackWriter {
    /// Create a loopback writer over a dispatcher
    pub fn new(dispatcher: Arc<TelegramDispatcher>) -> Self {
        Self { dispatcher }
    }
}

#[async_trait]
impl GroupWriter for LoopbackWriter {
    async fn send(&self, telegram: Telegram) -> Result<()> {
        self.dispatcher.dispatch(&telegram)?;
        Ok(())
    }
}
