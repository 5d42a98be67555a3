use actix_web::http::header;
use actix_web::http::StatusCode;
use actix_web::{HttpResponse, HttpResponseBuilder};
use log::{debug, error};
use serde::{Deserialize, Serialize};

use crate::bakery::cookie::DischargeRequiredBody;
use crate::errors::Error;

pub const MIME_OCTET_STREAM: &str = "application/octet-stream";

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}

/// A wrapper for HTTP responses with constructors for the shapes the API
/// returns.
pub struct Response {
    http_response: HttpResponse,
}

impl Response {
    pub fn ok() -> Self {
        Self {
            http_response: HttpResponse::Ok().finish(),
        }
    }

    pub fn json<T: Serialize>(data: T) -> Self {
        Self {
            http_response: HttpResponse::Ok().json(data),
        }
    }

    pub fn binary(data: Vec<u8>) -> Self {
        Self {
            http_response: HttpResponse::Ok()
                .insert_header((header::CONTENT_TYPE, MIME_OCTET_STREAM))
                .body(data),
        }
    }

    pub fn error(err: Error) -> Self {
        let status = err.status();
        let code = err.code();
        let mut builder = HttpResponseBuilder::new(status);
        let http_response = match err {
            Error::DischargeRequired { message, macaroon } => {
                debug!("Respond discharge required");
                builder.insert_header((header::WWW_AUTHENTICATE, "Macaroon"));
                builder.json(DischargeRequiredBody::new(code, &message, &macaroon))
            }
            Error::Verification(_) => {
                builder.insert_header((header::WWW_AUTHENTICATE, "Macaroon"));
                builder.json(Self::error_body(&err))
            }
            Error::Internal(ref e) => {
                error!("Internal server error: {e:#}");
                builder.json(ErrorResponse {
                    code: String::from(code),
                    message: String::from("internal server error"),
                })
            }
            _ => {
                if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
                    debug!("Request denied: {err}");
                }
                builder.json(Self::error_body(&err))
            }
        };
        Self { http_response }
    }

    fn error_body(err: &Error) -> ErrorResponse {
        ErrorResponse {
            code: String::from(err.code()),
            message: err.to_string(),
        }
    }
}

impl From<Error> for Response {
    fn from(err: Error) -> Self {
        Self::error(err)
    }
}

impl From<Response> for HttpResponse {
    fn from(val: Response) -> Self {
        val.http_response
    }
}

pub fn convert_response(resp: crate::errors::Result<Response>) -> HttpResponse {
    match resp {
        Ok(resp) => resp.into(),
        Err(err) => Response::error(err).into(),
    }
}
