// src/wiki/api.rs
use crate::wiki::error::{ServerError, WikiError};
use crate::wiki::store::{normalize_content, EntryStore};
use crate::wiki::views;
use log::{debug, error, info};
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use rand::seq::SliceRandom;
use serde::Deserialize;
use std::convert::Infallible;
use std::sync::Arc;
use warp::http::{StatusCode, Uri};
use warp::reply::Response;
use warp::{Filter, Rejection, Reply};

const MAX_FORM_BYTES: u64 = 1024 * 1024;

/// Characters left as-is in a path segment.
const SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

const NOT_FOUND: &str = "No page found for this query.";
const NO_RESULTS: &str = "There are no search results for this query.";
const ALREADY_EXISTS: &str = "An entry already exists for this query.";
const NO_ENTRIES: &str = "No entries yet.";

#[derive(Deserialize, Default)]
#[serde(default)]
struct SearchQuery {
    q: Option<String>,
}

impl SearchQuery {
    fn query(&self) -> Option<&str> {
        self.q.as_deref().filter(|q| !q.is_empty())
    }
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct CreateForm {
    title: String,
    content: String,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct EditForm {
    content: String,
}

pub fn entry_path(title: &str) -> String {
    format!("/wiki/{}", utf8_percent_encode(title, SEGMENT))
}

pub fn edit_path(title: &str) -> String {
    format!("/edit/{}", utf8_percent_encode(title, SEGMENT))
}

pub fn routes(
    store: Arc<EntryStore>,
) -> impl Filter<Extract = impl Reply, Error = Infallible> + Clone {
    let index = warp::path::end()
        .and(warp::get())
        .and(warp::query::<SearchQuery>())
        .and(with_store(store.clone()))
        .and_then(index_handler);

    let entry = warp::path!("wiki" / String)
        .and(warp::get())
        .and(warp::query::<SearchQuery>())
        .and(with_store(store.clone()))
        .and_then(entry_handler);

    let search = warp::path!("search")
        .and(warp::get())
        .and(warp::query::<SearchQuery>())
        .and(with_store(store.clone()))
        .and_then(|query: SearchQuery, store: Arc<EntryStore>| async move {
            let q = query.query().unwrap_or_default().to_string();
            search_handler(q, store).await
        });

    let create_form = warp::path!("create")
        .and(warp::get())
        .map(|| warp::reply::html(views::create()).into_response());

    let create = warp::path!("create")
        .and(warp::post())
        .and(with_store(store.clone()))
        .and(warp::body::content_length_limit(MAX_FORM_BYTES))
        .and(warp::body::form())
        .and_then(create_handler);

    let edit_form = warp::path!("edit" / String)
        .and(warp::get())
        .and(with_store(store.clone()))
        .and_then(edit_form_handler);

    let edit = warp::path!("edit" / String)
        .and(warp::post())
        .and(with_store(store.clone()))
        .and(warp::body::content_length_limit(MAX_FORM_BYTES))
        .and(warp::body::form())
        .and_then(edit_handler);

    let random = warp::path!("random")
        .and(warp::get())
        .and(with_store(store))
        .and_then(random_handler);

    index
        .or(entry)
        .unify()
        .or(search)
        .unify()
        .or(create_form)
        .unify()
        .or(create)
        .unify()
        .or(edit_form)
        .unify()
        .or(edit)
        .unify()
        .or(random)
        .unify()
        .recover(handle_rejection)
        .unify()
        .with(warp::log("wiki"))
}

fn with_store(
    store: Arc<EntryStore>,
) -> impl Filter<Extract = (Arc<EntryStore>,), Error = Infallible> + Clone {
    warp::any().map(move || store.clone())
}

fn page(html: String) -> Response {
    warp::reply::html(html).into_response()
}

fn notice(status: StatusCode, message: &str) -> Response {
    warp::reply::with_status(warp::reply::html(views::notice(message)), status).into_response()
}

fn redirect_to_entry(title: &str) -> Result<Response, Rejection> {
    let uri: Uri = entry_path(title).parse().map_err(|e| {
        error!("Cannot redirect to {:?}: {}", title, e);
        warp::reject::custom(ServerError)
    })?;
    Ok(warp::redirect::see_other(uri).into_response())
}

/// Path parameters arrive percent-encoded.
fn decode_title(raw: &str) -> Option<String> {
    percent_decode_str(raw)
        .decode_utf8()
        .ok()
        .map(|title| title.into_owned())
}

async fn index_handler(query: SearchQuery, store: Arc<EntryStore>) -> Result<Response, Rejection> {
    if let Some(q) = query.query() {
        return search_handler(q.to_string(), store).await;
    }
    let titles = store.list_entries().await.map_err(WikiError::into_rejection)?;
    Ok(page(views::index(&titles)))
}

async fn entry_handler(
    raw_title: String,
    query: SearchQuery,
    store: Arc<EntryStore>,
) -> Result<Response, Rejection> {
    if let Some(q) = query.query() {
        return search_handler(q.to_string(), store).await;
    }
    let Some(title) = decode_title(&raw_title) else {
        return Ok(notice(StatusCode::OK, NOT_FOUND));
    };

    match store.get_entry(&title).await.map_err(WikiError::into_rejection)? {
        Some(entry) => Ok(page(views::entry(&entry.title, &entry.content))),
        None => {
            debug!("No entry for {:?}", title);
            Ok(notice(StatusCode::OK, NOT_FOUND))
        }
    }
}

/// An exact title match goes straight to the entry; anything else lists the
/// titles containing the query.
async fn search_handler(query: String, store: Arc<EntryStore>) -> Result<Response, Rejection> {
    if let Some(stored) = store.find(&query).await.map_err(WikiError::into_rejection)? {
        return redirect_to_entry(&stored);
    }

    let matches = store.search(&query).await.map_err(WikiError::into_rejection)?;
    if matches.is_empty() {
        return Ok(notice(StatusCode::OK, NO_RESULTS));
    }
    Ok(page(views::results(&query, &matches)))
}

async fn create_handler(store: Arc<EntryStore>, form: CreateForm) -> Result<Response, Rejection> {
    if form.title.trim().is_empty() {
        return Ok(notice(StatusCode::BAD_REQUEST, "must provide a title"));
    }
    if store
        .find(form.title.trim())
        .await
        .map_err(WikiError::into_rejection)?
        .is_some()
    {
        debug!("Entry {:?} already exists", form.title);
        return Ok(notice(StatusCode::OK, ALREADY_EXISTS));
    }

    save(&store, &form.title, &form.content).await
}

async fn edit_form_handler(raw_title: String, store: Arc<EntryStore>) -> Result<Response, Rejection> {
    let Some(title) = decode_title(&raw_title) else {
        return Ok(notice(StatusCode::OK, NOT_FOUND));
    };
    match store.get_entry(&title).await.map_err(WikiError::into_rejection)? {
        Some(entry) => Ok(page(views::edit(&entry.title, &entry.content))),
        None => Ok(notice(StatusCode::OK, NOT_FOUND)),
    }
}

/// Saves unconditionally, so editing a missing title creates it.
async fn edit_handler(
    raw_title: String,
    store: Arc<EntryStore>,
    form: EditForm,
) -> Result<Response, Rejection> {
    let Some(title) = decode_title(&raw_title) else {
        return Ok(notice(StatusCode::BAD_REQUEST, "invalid title"));
    };
    save(&store, &title, &form.content).await
}

async fn save(store: &EntryStore, title: &str, content: &str) -> Result<Response, Rejection> {
    match store.save_entry(title, &normalize_content(content)).await {
        Ok(stored) => {
            info!("Entry {:?} saved", stored);
            redirect_to_entry(&stored)
        }
        Err(WikiError::InvalidTitle(title)) => {
            debug!("Refused title {:?}", title);
            Ok(notice(StatusCode::BAD_REQUEST, "invalid title"))
        }
        Err(e) => Err(e.into_rejection()),
    }
}

async fn random_handler(store: Arc<EntryStore>) -> Result<Response, Rejection> {
    let titles = store.list_entries().await.map_err(WikiError::into_rejection)?;
    match titles.choose(&mut rand::thread_rng()) {
        Some(title) => redirect_to_entry(title),
        None => Ok(notice(StatusCode::OK, NO_ENTRIES)),
    }
}

pub async fn handle_rejection(err: Rejection) -> Result<Response, Infallible> {
    if err.is_not_found() {
        return Ok(notice(StatusCode::NOT_FOUND, NOT_FOUND));
    }
    if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        return Ok(notice(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed."));
    }
    if err.find::<warp::reject::PayloadTooLarge>().is_some() {
        return Ok(notice(StatusCode::PAYLOAD_TOO_LARGE, "Entry too large."));
    }
    if err.find::<warp::reject::LengthRequired>().is_some()
        || err.find::<warp::reject::UnsupportedMediaType>().is_some()
        || err.find::<warp::body::BodyDeserializeError>().is_some()
        || err.find::<warp::reject::InvalidQuery>().is_some()
    {
        return Ok(notice(StatusCode::BAD_REQUEST, "Bad request."));
    }
    if err.find::<ServerError>().is_none() {
        error!("Unhandled rejection: {:?}", err);
    }
    Ok(notice(
        StatusCode::INTERNAL_SERVER_ERROR,
        "Something went wrong.",
    ))
}
