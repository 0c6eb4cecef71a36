//! Interface to the external security policy
//!
//! The executor consults an [`ActionValidator`] before every dispatch and
//! treats its decision as final. Policy itself lives outside this crate.

use crate::ai::types::Arguments;
use crate::tools::confirmation::RiskLevel;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Validation {
    Allowed,
    Denied { reason: String },
    RequiresConfirmation { reason: String, risk: RiskLevel },
}

pub trait ActionValidator: Send + Sync {
    fn validate(&self, action: &str, arguments: &Arguments) -> Validation;
}

/// Permits every action
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl ActionValidator for AllowAll {
    fn validate(&self, _action: &str, _arguments: &Arguments) -> Validation {
        Validation::Allowed
    }
}
