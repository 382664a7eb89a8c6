//! Explicit contract → handler registry, populated at startup.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use evented_events::{FeedResult, TransportMessage};

use super::middleware::TransportMessageHandler;

/// Handles one message of a contract it was registered for.
///
/// A fresh handler is built per message, so handlers may keep per-message
/// state in `self`. Returned errors are reported as per-message failures.
pub trait MessageHandler: Send {
    fn handle(&mut self, message: &TransportMessage) -> anyhow::Result<()>;
}

impl<F> MessageHandler for F
where
    F: FnMut(&TransportMessage) -> anyhow::Result<()> + Send,
{
    fn handle(&mut self, message: &TransportMessage) -> anyhow::Result<()> {
        self(message)
    }
}

type HandlerFactory = Box<dyn Fn() -> Box<dyn MessageHandler> + Send + Sync>;

#[derive(Default)]
pub struct HandlerRegistry {
    factories: BTreeMap<String, Vec<HandlerFactory>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a handler factory for `contract`. Several handlers per contract run
    /// in registration order.
    pub fn register<F, H>(&mut self, contract: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn() -> H + Send + Sync + 'static,
        H: MessageHandler + 'static,
    {
        let contract = contract.into();
        debug!(contract = %contract, "handler registered");
        self.factories
            .entry(contract)
            .or_default()
            .push(Box::new(move || Box::new(factory()) as Box<dyn MessageHandler>));
        self
    }

    /// Contract names with at least one handler, sorted.
    pub fn handled_contracts(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }

    pub fn handler_count(&self, contract: &str) -> usize {
        self.factories.get(contract).map_or(0, Vec::len)
    }

    pub fn into_chain(self) -> RegistryHandlerChain {
        RegistryHandlerChain { registry: self }
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("contracts", &self.handled_contracts())
            .finish()
    }
}

/// Dispatches each message to the handlers registered for its type.
#[derive(Debug)]
pub struct RegistryHandlerChain {
    registry: HandlerRegistry,
}

impl RegistryHandlerChain {
    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }
}

impl TransportMessageHandler for RegistryHandlerChain {
    fn handle(&self, message: &TransportMessage) -> anyhow::Result<FeedResult> {
        let Some(factories) = self.registry.factories.get(message.message_type()) else {
            warn!(message_type = message.message_type(), "no handler registered");
            return Ok(FeedResult::failure(
                message.clone(),
                format!("no handler registered for {}", message.message_type()),
            ));
        };

        for factory in factories {
            let mut handler = factory();
            if let Err(err) = handler.handle(message) {
                warn!(
                    message_id = %message.id(),
                    message_type = message.message_type(),
                    error = %format!("{err:#}"),
                    "handler failed"
                );
                return Ok(FeedResult::failure(message.clone(), format!("{err:#}")));
            }
        }

        Ok(FeedResult::success(message.clone()))
    }
}
