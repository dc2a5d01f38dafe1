pub mod ws;

pub use ws::{AppState, SubscriberSettings, WsSubscriber, drain_connections, router};
