use actix_web::http::StatusCode;

/// Classified errors surfaced by the store. The class survives `mask`, so a
/// caller can always tell "does not exist" apart from "exists but denied".
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    ServiceUnavailable(String),

    /// Macaroon caveats were not satisfied. Never returned to the client as
    /// is: the authorizer turns it into a freshly minted macaroon.
    #[error("verification failed: {0}")]
    Verification(String),

    /// The client must discharge `macaroon` (serialized) and retry.
    #[error("{message}")]
    DischargeRequired { message: String, macaroon: String },

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Prefixes the error message with `context`, keeping its class.
    pub fn mask(self, context: impl AsRef<str>) -> Self {
        let context = context.as_ref();
        match self {
            Self::NotFound(msg) => Self::NotFound(format!("{context}: {msg}")),
            Self::Unauthorized(msg) => Self::Unauthorized(format!("{context}: {msg}")),
            Self::BadRequest(msg) => Self::BadRequest(format!("{context}: {msg}")),
            Self::Forbidden(msg) => Self::Forbidden(format!("{context}: {msg}")),
            Self::ServiceUnavailable(msg) => {
                Self::ServiceUnavailable(format!("{context}: {msg}"))
            }
            Self::Verification(msg) => Self::Verification(format!("{context}: {msg}")),
            // The envelope is machine-readable, its message stays fixed.
            Self::DischargeRequired { .. } => self,
            Self::Internal(err) => Self::Internal(err.context(context.to_string())),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Verification(_) => StatusCode::UNAUTHORIZED,
            Self::DischargeRequired { .. } => StatusCode::UNAUTHORIZED,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable error code included in every JSON error body.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not found",
            Self::Unauthorized(_) => "unauthorized",
            Self::BadRequest(_) => "bad request",
            Self::Forbidden(_) => "forbidden",
            Self::ServiceUnavailable(_) => "service unavailable",
            Self::Verification(_) => "unauthorized",
            Self::DischargeRequired { .. } => "macaroon discharge required",
            Self::Internal(_) => "internal error",
        }
    }
}
