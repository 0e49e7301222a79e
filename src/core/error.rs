use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProjectionError {
    #[error("{field} must be a finite number")]
    NonFinite { field: &'static str },

    #[error("{field} cannot be negative (got {value})")]
    Negative { field: &'static str, value: f64 },

    #[error("projection horizon must be at least 1 year (got {years})")]
    HorizonTooShort { years: u32 },

    #[error("{field} must be at most {max} (got {age})")]
    AgeOutOfRange {
        field: &'static str,
        age: u32,
        max: u32,
    },

    #[error("at least one simulation is required")]
    NoSimulations,
}
