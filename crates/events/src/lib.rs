//! Messaging contracts: events, commands, commits, publication and the
//! transport envelope types shared by the repository and the transport.

pub mod codec;
pub mod command;
pub mod commit;
pub mod event;
pub mod feed;
pub mod in_memory_publisher;
pub mod message;
pub mod publisher;

pub use codec::{Codec, CodecError, JsonCodec};
pub use command::Command;
pub use commit::{AggregateCommit, COMMIT_CONTRACT, Commit, PersistedCommit};
pub use event::Contract;
pub use feed::{BatchFault, FailedMessage, FeedResult, TransportMessage};
pub use in_memory_publisher::{InMemoryPublishError, InMemoryPublisher};
pub use message::{EndpointMessage, RoutingHeaders};
pub use publisher::Publisher;
