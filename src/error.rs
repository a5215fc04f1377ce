use serde::Serialize;
use warp::http::StatusCode;

/// Everything a request can fail with once it reaches a handler.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Description and duration fields are mandatory.")]
    MissingField,

    #[error("Date is invalid.")]
    InvalidDate,

    #[error("Duration must be a whole number.")]
    InvalidDuration,

    #[error("Limit is invalid.")]
    InvalidLimit,

    #[error("Username is required.")]
    MissingUsername,

    #[error("Unknown user id.")]
    NotFound,

    #[error("Internal server error.")]
    Persistence(#[from] anyhow::Error),
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

impl ApiError {
    /// Validation failures keep a 200 status so existing clients that only
    /// look at the `error` key keep working.
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::OK,
        }
    }

    pub fn body(&self) -> ErrorBody {
        ErrorBody {
            error: self.to_string(),
        }
    }
}

impl warp::Reply for ApiError {
    fn into_response(self) -> warp::reply::Response {
        if let ApiError::Persistence(ref e) = self {
            tracing::error!(error = ?e, "store operation failed");
        }
        let status = self.status();
        warp::reply::with_status(warp::reply::json(&self.body()), status).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warp::Reply;

    #[test]
    fn test_validation_errors_keep_ok_status() {
        assert_eq!(ApiError::MissingField.status(), StatusCode::OK);
        assert_eq!(ApiError::InvalidDate.status(), StatusCode::OK);
        assert_eq!(ApiError::InvalidLimit.status(), StatusCode::OK);
    }

    #[test]
    fn test_store_failure_is_server_error() {
        let res = ApiError::Persistence(anyhow::anyhow!("pool closed")).into_response();
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_unknown_user_is_not_found() {
        let res = ApiError::NotFound.into_response();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
        assert_eq!(ApiError::NotFound.body().error, "Unknown user id.");
    }
}
