/*
 * Copyright (C) 2020 Oakes, Gregory <gregoryoakes@fastmail.com>
 * Author: Oakes, Gregory <gregory.oakes@fastmail.com>
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as
 * published by the Free Software Foundation, either version 3 of the
 * License, or (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program.  If not, see <http://www.gnu.org/licenses/>.
 */

use std::convert::Infallible;

use serde::Serialize;
use warp::{http::StatusCode, reject, Rejection, Reply};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    DBPoolError(#[from] mobc::Error<mobc_postgres::tokio_postgres::Error>),
    #[error(transparent)]
    DBError(#[from] mobc_postgres::tokio_postgres::Error),
    #[error("access token required")]
    TokenRequired,
    #[error("invalid credentials")]
    Unauthorized,
    #[error(transparent)]
    JWTError(#[from] jsonwebtoken::errors::Error),
    #[error("{0}")]
    Validation(String),
    #[error("image not found")]
    NotFound,
    #[error("image generation failed: {0}")]
    Generation(String),
    #[error("no image in the provider response")]
    NoImage,
    #[error("generated image could not be saved")]
    SaveFailed(#[source] mobc_postgres::tokio_postgres::Error),
    #[error(transparent)]
    HTTPError(#[from] reqwest::Error),
    #[error(transparent)]
    ResponseError(#[from] warp::http::Error),
    #[error(transparent)]
    Base64Error(#[from] base64::DecodeError),
    #[error("{0}")]
    Config(String),
    #[error(transparent)]
    IOError(#[from] std::io::Error),
}

impl reject::Reject for Error {}

impl From<Error> for Rejection {
    fn from(item: Error) -> Rejection {
        reject::custom(item)
    }
}

/// The uniform error body of every non-2xx response. `details` is only
/// populated for generation failures, where the provider's message is
/// surfaced for diagnostics.
#[derive(Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

pub async fn handle_rejects(err: Rejection) -> Result<impl Reply, Infallible> {
    let (code, message, details) = if err.is_not_found() {
        (StatusCode::NOT_FOUND, "Not found".to_string(), None)
    } else if let Some(e) = err.find::<Error>() {
        status_for(e)
    } else if err
        .find::<warp::filters::body::BodyDeserializeError>()
        .is_some()
    {
        (
            StatusCode::BAD_REQUEST,
            "Invalid request body".to_string(),
            None,
        )
    } else if err.find::<warp::reject::InvalidQuery>().is_some() {
        (
            StatusCode::BAD_REQUEST,
            "Invalid query string".to_string(),
            None,
        )
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        (
            StatusCode::METHOD_NOT_ALLOWED,
            "Method not allowed".to_string(),
            None,
        )
    } else {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Server error".to_string(),
            None,
        )
    };

    if code.is_server_error() {
        tracing::error!(status = %code, rejection = ?err, "request failed");
    }

    let body = warp::reply::json(&ErrorBody {
        error: message,
        details,
    });
    Ok(warp::reply::with_status(body, code))
}

fn status_for(e: &Error) -> (StatusCode, String, Option<String>) {
    match e {
        Error::TokenRequired => (
            StatusCode::UNAUTHORIZED,
            "Access token required".to_string(),
            None,
        ),
        Error::Unauthorized => (
            StatusCode::UNAUTHORIZED,
            "Invalid credentials".to_string(),
            None,
        ),
        // Bad signature and expiry are reported identically.
        Error::JWTError(_) => (StatusCode::FORBIDDEN, "Invalid token".to_string(), None),
        Error::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone(), None),
        // Absent and not-owned respond identically so image ids cannot be
        // probed across users.
        Error::NotFound => (StatusCode::NOT_FOUND, "Image not found".to_string(), None),
        Error::Generation(msg) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to generate image".to_string(),
            Some(msg.clone()),
        ),
        Error::NoImage => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "No image generated in response".to_string(),
            None,
        ),
        Error::SaveFailed(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to save image".to_string(),
            None,
        ),
        Error::DBPoolError(_) | Error::DBError(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Database error".to_string(),
            None,
        ),
        _ => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Server error".to_string(),
            None,
        ),
    }
}
