use thiserror::Error;

/// Failures raised by the transport collaborator.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected status {status} from {url}")]
    UnexpectedStatus { status: u16, url: String },

    #[error("failed to decode response body: {0}")]
    Decode(String),
}

/// Failures raised while building, executing or reshaping a query.
///
/// Every variant is recoverable: a rejected specification leaves the
/// builder untouched and a failed execution leaves the previous data set
/// in place.
#[derive(Error, Debug)]
pub enum QueryError {
    #[error("`{name}` is not a valid field. Valid fields are [{valid}]")]
    UnknownField { name: String, valid: String },

    #[error("`{name}` is not a valid parameter. Valid parameters are [{valid}]")]
    UnknownParameter { name: String, valid: String },

    #[error("filter clause is missing a required part: {0}")]
    InvalidFilterClause(String),

    #[error("format `{0}` requires a key field")]
    MissingKeyField(String),

    #[error("unexpected data returned from {query_name}")]
    MalformedResponse { query_name: String },

    #[error(transparent)]
    Transport(#[from] TransportError),
}
