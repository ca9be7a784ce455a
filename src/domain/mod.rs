pub mod category;
pub mod outcome;
pub mod payload;
pub mod rule;

pub use category::{Category, CategoryError, CategoryTable};
pub use outcome::{DeliveryError, DeliveryOutcome, DeliveryStatus, DispatchResult, OverallStatus};
pub use payload::{Payload, PayloadError};
pub use rule::{ResolvedEndpoint, RuleRecord};
