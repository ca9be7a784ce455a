pub mod client;
pub mod elasticsearch;
pub mod mock;
pub mod readiness;
pub mod traits;

pub use client::RuleRegistryClient;
pub use elasticsearch::{ElasticsearchConfig, ElasticsearchRegistry};
pub use mock::MockRegistry;
pub use readiness::{ReadinessError, ReadinessGate, ReadinessStage};
pub use traits::{RegistryError, RuleHit, RuleRegistry};
