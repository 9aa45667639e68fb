//! HTTP surface of the relay

pub mod handlers;
pub mod models;
pub mod routes;

pub use handlers::AppState;
pub use models::{ApiEnvelope, ChatResponseData, SupportListData};
pub use routes::build_router;
