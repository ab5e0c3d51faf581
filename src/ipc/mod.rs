mod handlers;
mod respond;
mod router;
mod types;

pub use router::handle_request;
pub use types::{AppState, Request};
