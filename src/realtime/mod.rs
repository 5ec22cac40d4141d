pub mod channel;
pub mod handler;
pub mod store_feed;
pub mod types;

pub use channel::{CallbackSubscription, NotificationHub, RealtimeChannel, Subscription};
pub use handler::ws_handler;
pub use store_feed::StoreFeedChannel;
