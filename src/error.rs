//! Error taxonomy for the rule engine
use crate::role::{Action, Role};

/// Malformed or missing input, always raised before any write.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{0} must not be empty")]
    EmptyField(&'static str),
    #[error("{0} must not be negative")]
    NegativeAmount(&'static str),
    #[error("{0} does not fit in the amount range")]
    AmountOutOfRange(&'static str),
    #[error("{field} must be between 0 and 10000 basis points, got {value}")]
    PercentOutOfRange { field: &'static str, value: u32 },
    #[error("contract {0} does not exist")]
    UnknownContract(String),
    #[error("claim {0} does not exist")]
    UnknownClaim(String),
    #[error("{record} belongs to contract {actual}, not {expected}")]
    ContractMismatch {
        record: String,
        expected: String,
        actual: String,
    },
    #[error("contract number {0} is already registered")]
    DuplicateContractNumber(String),
    #[error("claim number {0} already exists on this contract")]
    DuplicateClaimNumber(String),
    #[error("{0} is not an allowed outcome for this action")]
    DisallowedOutcome(String),
    #[error("date arithmetic overflowed")]
    DateOutOfRange,
}

/// Coarse classification used by callers to pick a message class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Authorization,
    InvalidState,
    Conflict,
    Storage,
}

#[derive(thiserror::Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("{action} requires one of {}", display_roles(.required))]
    Authorization {
        action: Action,
        required: Vec<Role>,
    },
    #[error("only the principal who filed {record} may {action}")]
    NotOwner { record: String, action: Action },
    #[error("cannot {action} {record}: current status is {status}")]
    InvalidState {
        record: String,
        status: String,
        action: Action,
    },
    #[error("{record} is {actual}, expected {expected}; it was already handled")]
    StaleState {
        record: String,
        expected: String,
        actual: String,
    },
    #[error("{record} was modified concurrently")]
    Conflict { record: String },
    #[error("no {table} record with id {id}")]
    NotFound { table: &'static str, id: String },
    #[error("store error: {0}")]
    Store(#[from] sled::Error),
    #[error("codec error: {0}")]
    Codec(String),
}

pub type EngineResult<T> = Result<T, EngineError>;

impl EngineError {
    pub fn invalid_state(record: &str, status: impl std::fmt::Display, action: Action) -> Self {
        EngineError::InvalidState {
            record: record.to_string(),
            status: status.to_string(),
            action,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Validation(_) | EngineError::NotFound { .. } => ErrorKind::Validation,
            EngineError::Authorization { .. } | EngineError::NotOwner { .. } => {
                ErrorKind::Authorization
            }
            EngineError::InvalidState { .. } | EngineError::StaleState { .. } => {
                ErrorKind::InvalidState
            }
            EngineError::Conflict { .. } => ErrorKind::Conflict,
            EngineError::Store(_) | EngineError::Codec(_) => ErrorKind::Storage,
        }
    }

    /// The message class shown to an end user.
    pub fn user_message(&self) -> &'static str {
        match self.kind() {
            ErrorKind::Validation => "Please fix your input and try again.",
            ErrorKind::Authorization => "You don't have permission to perform this action.",
            ErrorKind::InvalidState => "This record was already handled.",
            ErrorKind::Conflict => "Someone else updated this record, please refresh.",
            ErrorKind::Storage => "The record store is unavailable, please try again later.",
        }
    }
}

impl<E: std::fmt::Display> From<minicbor::encode::Error<E>> for EngineError {
    fn from(value: minicbor::encode::Error<E>) -> Self {
        EngineError::Codec(value.to_string())
    }
}

impl From<minicbor::decode::Error> for EngineError {
    fn from(value: minicbor::decode::Error) -> Self {
        EngineError::Codec(value.to_string())
    }
}

fn display_roles(roles: &[Role]) -> String {
    roles
        .iter()
        .map(|r| r.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}
