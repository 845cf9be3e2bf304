// Module declarations
mod error;
mod provision;
pub mod types;

// Public API re-exports
pub use error::ProvisionError;
pub use provision::{ProvisionContext, provision};

pub use types::{ProgressReporter, ProvisionResult, ProvisioningConfig, SeedCommit, Step};
