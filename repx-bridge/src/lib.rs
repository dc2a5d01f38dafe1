pub mod bridge;
pub mod config;
pub mod fanout;
pub mod ingress;
pub mod registry;
pub mod subscriber;
pub mod transport;

pub use bridge::{Bridge, BridgeError, BridgeStats, PumpOutcome, StatsSnapshot};
pub use config::{Config, IngressConfig, IngressPolicy, ServerConfig, SessionConfig};
pub use fanout::{BroadcastReport, Broadcaster};
pub use ingress::mock::{GeneratorError, MockIngress, MotionSamples, MotionSettings};
pub use ingress::udp::UdpIngress;
pub use ingress::{Ingress, IngressEvent};
pub use registry::SubscriberRegistry;
pub use subscriber::{SendError, Subscriber, SubscriberId};
