pub mod aggregator;
pub mod error;
pub mod fanout;
pub mod pipeline;
pub mod resolver;

pub use aggregator::{aggregate, apply_policy, overall_status, status_code};
pub use error::DispatchError;
pub use fanout::{FanOut, FanOutConfig, FanOutDispatcher};
pub use pipeline::Forwarder;
pub use resolver::{build_endpoint, EndpointResolver};
