pub mod response;
pub mod routes;

pub use response::ForwardResponse;
pub use routes::{create_router, AppState};
