pub mod api;
pub mod config;
pub mod dispatch;
pub mod domain;
pub mod observability;
pub mod registry;

pub use config::{Config, DeliveryPolicy};
pub use dispatch::{DispatchError, Forwarder};
pub use domain::{Category, CategoryTable, DispatchResult, OverallStatus};
pub use registry::{RuleRegistry, RuleRegistryClient};
