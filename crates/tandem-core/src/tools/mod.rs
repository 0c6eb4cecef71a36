//! Tool system: registry, validation, confirmation and execution

pub mod confirmation;
pub mod executor;
pub mod implementations;
pub mod registry;
pub mod validation;

pub use confirmation::{
    AutoApprove, AutoDecline, ChannelConfirmer, ConfirmationRequest, Confirmer,
    PendingConfirmation, RiskLevel,
};
pub use executor::ToolExecutor;
pub use registry::{
    parse_params, ErrorKind, Tool, ToolCategory, ToolContext, ToolRegistry, ToolResult,
};
pub use validation::{ActionValidator, AllowAll, Validation};
