//! Error types for the booking engine.

use std::time::Duration;

use crate::booking::state::{Field, StepKind, WizardGate};

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("API error: {0}")]
    Api(#[from] ApiError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Wizard error: {0}")]
    Wizard(#[from] WizardError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Errors from the booking REST backend.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Request to {endpoint} failed: {reason}")]
    RequestFailed { endpoint: String, reason: String },

    #[error("{endpoint} returned HTTP {status}: {body}")]
    Status {
        endpoint: String,
        status: u16,
        body: String,
    },

    #[error("Invalid response from {endpoint}: {reason}")]
    InvalidResponse { endpoint: String, reason: String },

    #[error("{entity} {id} not found")]
    NotFound { entity: String, id: String },
}

/// LLM provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Provider {provider} rate limited, retry after {retry_after:?}")]
    RateLimited {
        provider: String,
        retry_after: Option<Duration>,
    },

    #[error("Provider {provider} returned HTTP {status}: {message}")]
    Api {
        provider: String,
        status: u16,
        message: String,
    },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Session/local storage errors.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Failed to open session store: {0}")]
    Open(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Client-local selection errors. These never reach the network.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Please choose a course")]
    NoCourseSelected,

    #[error("Only one course can be booked at a time")]
    SingleCourseOnly,

    #[error("Option {0} was selected twice")]
    DuplicateOption(String),

    #[error("Course {0} is not on this menu")]
    UnknownCourse(String),

    #[error("Option {0} is not on this menu")]
    UnknownOption(String),

    #[error("Menu totals are too large")]
    TotalsOverflow,

    #[error("Totals do not match the selected menu ({duration} min, {price} yen)")]
    TotalsMismatch { duration: u32, price: u32 },

    #[error("Please choose a date")]
    NoDateSelected,

    #[error("Please choose a time")]
    NoTimeSelected,

    #[error("{date} is outside the bookable window")]
    DateUnavailable { date: String },

    #[error("{time} is not available on {date}")]
    SlotUnavailable { date: String, time: String },

    #[error("scheduled_at must be {expected}")]
    ScheduleMismatch { expected: String },

    #[error("Please choose a site or enter a dispatch address")]
    NoPlacement,

    #[error("A dispatch address is required")]
    DispatchAddressRequired,

    #[error("Site {0} is not in the list")]
    UnknownSite(String),

    #[error("Please choose a therapist")]
    NoTherapistSelected,

    #[error("Therapist {0} is not in the list")]
    UnknownTherapist(String),

    #[error("Ask the concierge for a recommendation first")]
    NoRecommendation,

    #[error("Message must not be empty")]
    EmptyMessage,

    #[error("Please agree to the cancellation policy")]
    PolicyNotAccepted,

    #[error("Please upload an ID document image")]
    KycImageMissing,

    #[error("ID verification failed: {0}")]
    KycRejected(String),

    #[error("{0} must be filled before leaving this step")]
    MissingField(Field),
}

/// Illegal wizard transitions and submission failures.
#[derive(Debug, thiserror::Error)]
pub enum WizardError {
    #[error("Step {step} does not own field {field}")]
    FieldNotOwned { step: StepKind, field: Field },

    #[error("Finish the {0} check before continuing")]
    GatePending(WizardGate),

    #[error("No {0} gate is pending")]
    NoGatePending(WizardGate),

    #[error("Cannot {action} at step {step}")]
    WrongStep { action: &'static str, step: StepKind },

    #[error("Pattern {pattern} needs a pre-selected {field}")]
    MissingSeed { pattern: String, field: Field },

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Booking could not be created: {0}")]
    Submission(#[source] ApiError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias for the crate.
pub type Result<T> = std::result::Result<T, Error>;
