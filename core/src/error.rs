use crate::types::PlanId;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PlanError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Access denied to plan {plan_id}")]
    AccessDenied { plan_id: PlanId },

    #[error("{what} {id} not found")]
    NotFound { what: &'static str, id: i64 },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type PlanResult<T> = Result<T, PlanError>;
