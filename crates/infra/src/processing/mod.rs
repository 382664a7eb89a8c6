//! Batch message processing: handler chains, the registry that builds them,
//! unit-of-work scoping and the commit persister.

pub mod commit_persister;
pub mod middleware;
pub mod registry;
pub mod scope;

pub use commit_persister::CommitPersistingHandler;
pub use middleware::{MessageProcessor, TransportMessageHandler};
pub use registry::{HandlerRegistry, MessageHandler, RegistryHandlerChain};
pub use scope::{HandlerScope, ScopeGuard, UnitOfWork};
