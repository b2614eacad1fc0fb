//! owmqtt - 1-Wire to MQTT bridge
//!
//! Periodically walks the hierarchical namespace served by an owserver
//! instance and republishes every leaf value to an MQTT broker, one topic
//! per namespace path, pruning configured subtrees along the way.

pub mod bridge;
pub mod config;
pub mod filter;
pub mod namespace;
pub mod publish;
pub mod scan;
pub mod session;
pub mod topic;

pub use bridge::{Bridge, ShutdownFlag};
pub use config::Config;
pub use filter::IgnoreList;
pub use namespace::owserver::OwserverClient;
pub use namespace::{Namespace, NamespaceError};
pub use publish::{MessageSink, OutboundMessage, PublishError, Publisher};
pub use scan::{ScanStats, Scanner};
pub use session::{MqttSink, Session, SessionState};
pub use topic::TopicMapper;
