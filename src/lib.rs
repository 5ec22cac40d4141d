pub mod auth;
pub mod db;
pub mod error;
pub mod middleware;
pub mod notification;
pub mod realtime;
pub mod routes;
pub mod state;

pub use routes::create_router;
pub use state::{AppState, Config};
