//! Error types for the fetch, parse, delivery, and configuration layers.

/// Failure to obtain a roster snapshot.
#[derive(thiserror::Error, Debug)]
pub enum FetchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP status {status} from {url}")]
    Status { status: u16, url: String },

    #[error("Anti-bot challenge page (status {status})")]
    Challenge { status: u16 },

    #[error("Browser error: {0}")]
    Browser(String),

    #[error("Roster table not found")]
    TableNotFound,

    #[error("Roster table has no member rows")]
    EmptyRoster,

    #[error("All {attempts} fetch attempts failed, last error: {last}")]
    Exhausted {
        attempts: u32,
        #[source]
        last: Box<FetchError>,
    },
}

/// A single roster row that could not be turned into a member record.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("Row for {name} has no player id")]
    MissingPlayerId { name: String },

    #[error("Row for {name} has an unusable player id: {id:?}")]
    InvalidPlayerId { name: String, id: String },

    #[error("Row for {name} has a non-numeric counter: {value:?}")]
    InvalidCount { name: String, value: String },
}

/// Failure to post a message to the webhook.
#[derive(thiserror::Error, Debug)]
pub enum DeliveryError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Webhook rejected message with status {status}: {body}")]
    Rejected { status: u16, body: String },
}

/// Start-up configuration problems. These abort before the watch loop starts.
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required setting: {flag} (or {env})")]
    Missing {
        flag: &'static str,
        env: &'static str,
    },

    #[error("Invalid URL for {field}: {value}")]
    InvalidUrl { field: &'static str, value: String },

    #[error("Invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Why a watch cycle ended before diffing.
#[derive(thiserror::Error, Debug)]
pub enum CycleError {
    #[error("Fetch failed: {0}")]
    Fetch(#[from] FetchError),
}

pub type FetchResult<T> = Result<T, FetchError>;
pub type DeliveryResult<T> = Result<T, DeliveryError>;
