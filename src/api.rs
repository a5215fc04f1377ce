use std::convert::Infallible;
use std::path::PathBuf;

use bytes::Bytes;
use chrono::Local;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use warp::http::StatusCode;
use warp::reply::{Reply, Response};
use warp::{Filter, Rejection};

use crate::config::Settings;
use crate::db::{Store, User};
use crate::error::{ApiError, ErrorBody};
use crate::exercise::{display_date, ExerciseForm, NewExercise};
use crate::log_query::{LogParams, LogQuery, UserLog};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewUserForm {
    #[serde(default)]
    pub username: Option<String>,
}

/// The user a new exercise was added to, with that exercise echoed back.
#[derive(Debug, Clone, Serialize)]
pub struct ExerciseReply {
    #[serde(flatten)]
    pub user: User,
    pub description: String,
    pub duration: i64,
    pub date: String,
}

/// A request body that could not be turned into a form.
#[derive(Debug, PartialEq)]
pub enum BodyRejection {
    Malformed,
    UnsupportedType,
}

impl warp::reject::Reject for BodyRejection {}

/// Accepts either a JSON or a urlencoded body. The parser is picked from the
/// content type, or from the body itself when the header is missing.
fn body<T>() -> impl Filter<Extract = (T,), Error = Rejection> + Clone
where
    T: DeserializeOwned + Send,
{
    warp::body::content_length_limit(1024 * 16)
        .and(warp::header::optional::<String>("content-type"))
        .and(warp::body::bytes())
        .and_then(|content_type: Option<String>, raw: Bytes| async move {
            decode_body(content_type.as_deref(), &raw).map_err(warp::reject::custom)
        })
}

pub fn decode_body<T: DeserializeOwned>(
    content_type: Option<&str>,
    raw: &[u8],
) -> Result<T, BodyRejection> {
    let mime = content_type
        .and_then(|value| value.split(';').next())
        .map(|value| value.trim().to_ascii_lowercase());

    let is_json = match mime.as_deref() {
        Some("application/json") => true,
        Some("application/x-www-form-urlencoded") => false,
        Some(_) => return Err(BodyRejection::UnsupportedType),
        None => raw
            .iter()
            .find(|b| !b.is_ascii_whitespace())
            .map_or(false, |b| *b == b'{'),
    };

    if is_json {
        serde_json::from_slice(raw).map_err(|_| BodyRejection::Malformed)
    } else {
        serde_urlencoded::from_bytes(raw).map_err(|_| BodyRejection::Malformed)
    }
}

fn with_store(store: Store) -> impl Filter<Extract = (Store,), Error = Infallible> + Clone {
    warp::any().map(move || store.clone())
}

pub fn routes(
    store: Store,
    settings: &Settings,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    let cors = warp::cors()
        .allow_any_origin()
        .allow_header("content-type")
        .allow_methods(vec!["GET", "POST"]);

    index(settings.views_dir.join("index.html"))
        .or(test_route())
        .or(post_user(store.clone()))
        .or(get_users(store.clone()))
        .or(post_exercise(store.clone()))
        .or(get_logs(store))
        .or(public_files(settings.public_dir.clone()))
        .recover(handle_rejection)
        .with(cors)
        .with(warp::trace::request())
}

// Filters
pub fn index(page: PathBuf) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::get()
        .and(warp::path::end())
        .and(warp::fs::file(page))
}

pub fn test_route() -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path!("test")
        .and(warp::get())
        .map(|| warp::reply::json(&json!({ "message": "this is working" })))
}

pub fn post_user(store: Store) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path!("api" / "users")
        .and(warp::post())
        .and(body::<NewUserForm>())
        .and(with_store(store))
        .and_then(create_user)
}

pub fn get_users(store: Store) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path!("api" / "users")
        .and(warp::get())
        .and(with_store(store))
        .and_then(list_users)
}

pub fn post_exercise(store: Store) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path!("api" / "users" / String / "exercises")
        .and(warp::post())
        .and(body::<ExerciseForm>())
        .and(with_store(store))
        .and_then(add_exercise)
}

pub fn get_logs(store: Store) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path!("api" / "users" / String / "logs")
        .and(warp::get())
        .and(warp::query::<LogParams>())
        .and(with_store(store))
        .and_then(read_logs)
}

pub fn public_files(dir: PathBuf) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::get().and(warp::fs::dir(dir))
}

// Handlers
fn respond<T: Serialize>(result: Result<T, ApiError>) -> Response {
    match result {
        Ok(body) => warp::reply::json(&body).into_response(),
        Err(e) => e.into_response(),
    }
}

#[tracing::instrument(name = "Creating user", skip(store))]
async fn create_user(form: NewUserForm, store: Store) -> Result<Response, Infallible> {
    Ok(respond(insert_user(form, &store).await))
}

async fn insert_user(form: NewUserForm, store: &Store) -> Result<User, ApiError> {
    let username = form
        .username
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .ok_or(ApiError::MissingUsername)?;

    Ok(store.insert_user(username).await?)
}

#[tracing::instrument(name = "Listing users", skip(store))]
async fn list_users(store: Store) -> Result<Response, Infallible> {
    Ok(respond(store.read_all_users().await.map_err(ApiError::from)))
}

#[tracing::instrument(name = "Adding exercise", skip(form, store))]
async fn add_exercise(
    user_id: String,
    form: ExerciseForm,
    store: Store,
) -> Result<Response, Infallible> {
    Ok(respond(push_exercise(&user_id, &form, &store).await))
}

async fn push_exercise(
    user_id: &str,
    form: &ExerciseForm,
    store: &Store,
) -> Result<ExerciseReply, ApiError> {
    let exercise = NewExercise::validate(form, Local::now().date_naive())?;
    let user = store.read_user(user_id).await?.ok_or(ApiError::NotFound)?;

    if store.push_entry(&user.id, &exercise).await? {
        tracing::info!(user_id = %user.id, "started a new exercise log");
    }

    Ok(ExerciseReply {
        user,
        description: exercise.description,
        duration: exercise.duration,
        date: display_date(exercise.date),
    })
}

#[tracing::instrument(name = "Reading log", skip(store))]
async fn read_logs(user_id: String, params: LogParams, store: Store) -> Result<Response, Infallible> {
    Ok(respond(user_log(&user_id, &params, &store).await))
}

async fn user_log(user_id: &str, params: &LogParams, store: &Store) -> Result<UserLog, ApiError> {
    let query = LogQuery::from_params(params)?;
    let user = store.read_user(user_id).await?.ok_or(ApiError::NotFound)?;
    let log = store.aggregate_log(&user.id, &query).await?;

    Ok(UserLog::new(user, log))
}

/// Turns whatever no route accepted into a JSON error.
pub async fn handle_rejection(err: Rejection) -> Result<Response, Infallible> {
    let (status, message) = if err.is_not_found() {
        (StatusCode::NOT_FOUND, "Not found.")
    } else if err.find::<warp::reject::PayloadTooLarge>().is_some() {
        (StatusCode::PAYLOAD_TOO_LARGE, "Request body is too large.")
    } else if err.find::<BodyRejection>() == Some(&BodyRejection::Malformed)
        || err.find::<warp::reject::InvalidQuery>().is_some()
        || err.find::<warp::reject::LengthRequired>().is_some()
    {
        (StatusCode::BAD_REQUEST, "Malformed request.")
    } else if err.find::<BodyRejection>() == Some(&BodyRejection::UnsupportedType) {
        (StatusCode::UNSUPPORTED_MEDIA_TYPE, "Unsupported content type.")
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        (StatusCode::METHOD_NOT_ALLOWED, "Method not allowed.")
    } else {
        tracing::error!(rejection = ?err, "unhandled rejection");
        (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error.")
    };

    let body = ErrorBody {
        error: message.to_string(),
    };
    Ok(warp::reply::with_status(warp::reply::json(&body), status).into_response())
}
