// src/finance/api.rs
use crate::finance::auth::{
    clear_session_cookie, hash_password, verify_password, Session, SessionKeys, SESSION_COOKIE,
};
use crate::finance::db;
use crate::finance::error::{apology, Apology, LedgerError, LoginRequired};
use crate::finance::lookup::{normalize_symbol, QuoteService};
use crate::finance::models::{Portfolio, User};
use crate::finance::views;
use chrono::{Local, NaiveDateTime, SubsecRound};
use log::{debug, error, info, warn};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use sqlx::SqlitePool;
use std::convert::Infallible;
use std::str::FromStr;
use std::sync::Arc;
use warp::http::header::{HeaderMap, HeaderValue, CACHE_CONTROL, EXPIRES, PRAGMA};
use warp::http::{StatusCode, Uri};
use warp::reply::Response;
use warp::{Filter, Rejection, Reply};

const MAX_FORM_BYTES: u64 = 16 * 1024;

pub struct AppState {
    pub pool: SqlitePool,
    pub quotes: QuoteService,
    pub sessions: SessionKeys,
    pub password_iterations: u32,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct RegisterForm {
    username: String,
    password: String,
    confirmation: String,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct LoginForm {
    username: String,
    password: String,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct QuoteForm {
    symbol: String,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct TradeForm {
    symbol: String,
    shares: String,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct CashForm {
    cash: String,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct PasswordForm {
    current_password: String,
    password: String,
    confirmation: String,
}

pub fn routes(
    state: Arc<AppState>,
) -> impl Filter<Extract = impl Reply, Error = Infallible> + Clone {
    let index = warp::path::end()
        .and(warp::get())
        .and(authenticated(state.clone()))
        .and(with_state(state.clone()))
        .and_then(index_handler);

    let register_form = warp::path!("register")
        .and(warp::get())
        .map(|| logged_out(warp::reply::html(views::register()).into_response()));

    let register = warp::path!("register")
        .and(warp::post())
        .and(with_state(state.clone()))
        .and(form_body())
        .and_then(register_handler);

    let login_form = warp::path!("login")
        .and(warp::get())
        .map(|| logged_out(warp::reply::html(views::login()).into_response()));

    let login = warp::path!("login")
        .and(warp::post())
        .and(with_state(state.clone()))
        .and(form_body())
        .and_then(login_handler);

    let logout = warp::path!("logout")
        .and(warp::get())
        .and(warp::cookie::optional(SESSION_COOKIE))
        .and(with_state(state.clone()))
        .and_then(logout_handler);

    let quote_form = warp::path!("quote")
        .and(warp::get())
        .and(authenticated(state.clone()))
        .map(|_user: User| warp::reply::html(views::quote()).into_response());

    let quote = warp::path!("quote")
        .and(warp::post())
        .and(authenticated(state.clone()))
        .and(with_state(state.clone()))
        .and(form_body())
        .and_then(quote_handler);

    let buy_form = warp::path!("buy")
        .and(warp::get())
        .and(authenticated(state.clone()))
        .map(|_user: User| warp::reply::html(views::buy()).into_response());

    let buy = warp::path!("buy")
        .and(warp::post())
        .and(authenticated(state.clone()))
        .and(with_state(state.clone()))
        .and(form_body())
        .and_then(buy_handler);

    let sell_form = warp::path!("sell")
        .and(warp::get())
        .and(authenticated(state.clone()))
        .and(with_state(state.clone()))
        .and_then(sell_form_handler);

    let sell = warp::path!("sell")
        .and(warp::post())
        .and(authenticated(state.clone()))
        .and(with_state(state.clone()))
        .and(form_body())
        .and_then(sell_handler);

    let history = warp::path!("history")
        .and(warp::get())
        .and(authenticated(state.clone()))
        .and(with_state(state.clone()))
        .and_then(history_handler);

    let add_cash_form = warp::path!("add_cash")
        .and(warp::get())
        .and(authenticated(state.clone()))
        .map(|_user: User| warp::reply::html(views::add_cash()).into_response());

    let add_cash = warp::path!("add_cash")
        .and(warp::post())
        .and(authenticated(state.clone()))
        .and(with_state(state.clone()))
        .and(form_body())
        .and_then(add_cash_handler);

    let change_password_form = warp::path!("change_password")
        .and(warp::get())
        .and(authenticated(state.clone()))
        .map(|_user: User| warp::reply::html(views::change_password()).into_response());

    let change_password = warp::path!("change_password")
        .and(warp::post())
        .and(authenticated(state.clone()))
        .and(with_state(state))
        .and(form_body())
        .and_then(change_password_handler);

    let account = register_form
        .or(register)
        .unify()
        .or(login_form)
        .unify()
        .or(login)
        .unify()
        .or(logout)
        .unify()
        .or(change_password_form)
        .unify()
        .or(change_password)
        .unify()
        .boxed();

    let trading = index
        .or(quote_form)
        .unify()
        .or(quote)
        .unify()
        .or(buy_form)
        .unify()
        .or(buy)
        .unify()
        .or(sell_form)
        .unify()
        .or(sell)
        .unify()
        .or(history)
        .unify()
        .or(add_cash_form)
        .unify()
        .or(add_cash)
        .unify()
        .boxed();

    account
        .or(trading)
        .unify()
        .recover(handle_rejection)
        .unify()
        .with(warp::reply::with::headers(no_cache_headers()))
        .with(warp::log("finance"))
}

fn with_state(
    state: Arc<AppState>,
) -> impl Filter<Extract = (Arc<AppState>,), Error = Infallible> + Clone {
    warp::any().map(move || state.clone())
}

/// Resolves the session cookie to a user, or rejects with `LoginRequired`.
fn authenticated(
    state: Arc<AppState>,
) -> impl Filter<Extract = (User,), Error = Rejection> + Clone {
    warp::cookie::optional(SESSION_COOKIE)
        .and(with_state(state))
        .and_then(|token: Option<String>, state: Arc<AppState>| async move {
            match session_user(&state, token.as_deref()).await {
                Ok(Some(user)) => Ok(user),
                Ok(None) => Err(warp::reject::custom(LoginRequired)),
                Err(e) => Err(e.into_rejection()),
            }
        })
}

/// The user a session token still speaks for. Tokens issued before the
/// user's last logout or password change resolve to `None`.
async fn session_user(state: &AppState, token: Option<&str>) -> Result<Option<User>, LedgerError> {
    let Some(session) = token.and_then(|t| state.sessions.verify_token(t)) else {
        return Ok(None);
    };
    let user = match db::get_user(&state.pool, session.user_id).await {
        Ok(user) => user,
        Err(LedgerError::UnknownUser(id)) => {
            warn!("Session refers to missing user {}", id);
            return Ok(None);
        }
        Err(e) => return Err(e),
    };
    if user.session_version != session.version {
        debug!("Revoked session for user {}", user.id);
        return Ok(None);
    }
    Ok(Some(user))
}

fn form_body<T: DeserializeOwned + Send + 'static>() -> impl Filter<Extract = (T,), Error = Rejection> + Clone
{
    warp::body::content_length_limit(MAX_FORM_BYTES).and(warp::body::form())
}

fn no_cache_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        CACHE_CONTROL,
        HeaderValue::from_static("no-cache, no-store, must-revalidate"),
    );
    headers.insert(EXPIRES, HeaderValue::from_static("0"));
    headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));
    headers
}

fn redirect(location: &'static str) -> Response {
    warp::redirect::see_other(Uri::from_static(location)).into_response()
}

fn logged_out(reply: Response) -> Response {
    warp::reply::with_header(reply, "set-cookie", clear_session_cookie()).into_response()
}

fn logged_in(state: &AppState, user: &User) -> Result<Response, Apology> {
    let token = state
        .sessions
        .create_token(Session {
            user_id: user.id,
            version: user.session_version,
        })
        .map_err(LedgerError::into_apology)?;
    Ok(warp::reply::with_header(redirect("/"), "set-cookie", state.sessions.session_cookie(&token))
        .into_response())
}

fn now() -> NaiveDateTime {
    Local::now().naive_local().trunc_subsecs(0)
}

/// A positive whole number of shares.
fn parse_shares(raw: &str) -> Option<i64> {
    raw.trim().parse::<i64>().ok().filter(|shares| *shares > 0)
}

/// A positive decimal amount of cash.
fn parse_amount(raw: &str) -> Option<Decimal> {
    Decimal::from_str(raw.trim())
        .ok()
        .filter(|amount| *amount > Decimal::ZERO)
}

async fn index_handler(user: User, state: Arc<AppState>) -> Result<Response, Rejection> {
    let holdings = db::holdings(&state.pool, user.id)
        .await
        .map_err(LedgerError::into_rejection)?;

    let mut valued = Vec::with_capacity(holdings.len());
    for holding in holdings {
        let quote = state.quotes.lookup(&holding.symbol).await;
        if quote.is_none() {
            warn!("No current quote for {}, using last trade price", holding.symbol);
        }
        valued.push((holding, quote));
    }

    let portfolio = Portfolio::value(valued, user.cash);
    Ok(warp::reply::html(views::index(&portfolio)).into_response())
}

/// Login and registration start from a cleared session, so a rejected attempt
/// also logs the browser out.
fn fresh_session(result: Result<Response, Apology>) -> Result<Response, Rejection> {
    Ok(match result {
        Ok(response) => response,
        Err(apology) => logged_out(apology_reply(apology.status, &apology.message)),
    })
}

async fn register_handler(state: Arc<AppState>, form: RegisterForm) -> Result<Response, Rejection> {
    fresh_session(register(&state, form).await)
}

async fn register(state: &AppState, form: RegisterForm) -> Result<Response, Apology> {
    if form.username.is_empty() {
        return Err(Apology::bad_request("must provide username"));
    }
    if form.password.is_empty() {
        return Err(Apology::bad_request("must provide password"));
    }
    if form.confirmation.is_empty() {
        return Err(Apology::bad_request("must provide password confirmation"));
    }
    if form.password != form.confirmation {
        return Err(Apology::bad_request(
            "password and password confirmation must match",
        ));
    }

    let existing = db::find_user_by_name(&state.pool, &form.username)
        .await
        .map_err(LedgerError::into_apology)?;
    if existing.is_some() {
        debug!("Registration for taken username {}", form.username);
        return Err(LedgerError::DuplicateUser.into_apology());
    }

    let hash = hash_password(form.password, state.password_iterations)
        .await
        .map_err(LedgerError::into_apology)?;
    let user_id = db::create_user(&state.pool, &form.username, &hash)
        .await
        .map_err(LedgerError::into_apology)?;
    let user = db::get_user(&state.pool, user_id)
        .await
        .map_err(LedgerError::into_apology)?;

    info!("Registered user {} ({})", form.username, user_id);
    logged_in(state, &user)
}

async fn login_handler(state: Arc<AppState>, form: LoginForm) -> Result<Response, Rejection> {
    fresh_session(login(&state, form).await)
}

async fn login(state: &AppState, form: LoginForm) -> Result<Response, Apology> {
    if form.username.is_empty() {
        return Err(Apology::forbidden("must provide username"));
    }
    if form.password.is_empty() {
        return Err(Apology::forbidden("must provide password"));
    }

    let user = db::find_user_by_name(&state.pool, &form.username)
        .await
        .map_err(LedgerError::into_apology)?;
    if let Some(user) = user {
        if verify_password(user.hash.clone(), form.password).await {
            info!("User {} logged in", user.id);
            return logged_in(state, &user);
        }
    }
    debug!("Failed login for {}", form.username);
    Err(Apology::forbidden("invalid username and/or password"))
}

async fn quote_handler(
    _user: User,
    state: Arc<AppState>,
    form: QuoteForm,
) -> Result<Response, Rejection> {
    match state.quotes.lookup(&form.symbol).await {
        Some(quote) => Ok(warp::reply::html(views::quoted(&quote)).into_response()),
        None => Err(apology(StatusCode::BAD_REQUEST, "incorrect symbol")),
    }
}

async fn buy_handler(
    user: User,
    state: Arc<AppState>,
    form: TradeForm,
) -> Result<Response, Rejection> {
    let Some(quote) = state.quotes.lookup(&form.symbol).await else {
        return Err(apology(StatusCode::BAD_REQUEST, "incorrect symbol"));
    };
    let Some(shares) = parse_shares(&form.shares) else {
        return Err(apology(StatusCode::BAD_REQUEST, "input a positive integer"));
    };

    db::buy(&state.pool, user.id, &quote, shares, now())
        .await
        .map_err(LedgerError::into_rejection)?;

    info!("User {} bought {} {} at {}", user.id, shares, quote.symbol, quote.price);
    Ok(redirect("/"))
}

async fn sell_form_handler(user: User, state: Arc<AppState>) -> Result<Response, Rejection> {
    let holdings = db::holdings(&state.pool, user.id)
        .await
        .map_err(LedgerError::into_rejection)?;
    Ok(warp::reply::html(views::sell(&holdings)).into_response())
}

async fn sell_handler(
    user: User,
    state: Arc<AppState>,
    form: TradeForm,
) -> Result<Response, Rejection> {
    let symbol = normalize_symbol(&form.symbol);
    if symbol.is_empty() {
        return Err(apology(StatusCode::BAD_REQUEST, "must select a symbol"));
    }
    let Some(shares) = parse_shares(&form.shares) else {
        return Err(apology(StatusCode::BAD_REQUEST, "input a positive integer"));
    };

    let held = db::net_shares(&state.pool, user.id, &symbol)
        .await
        .map_err(|e| LedgerError::from(e).into_rejection())?;
    if shares > held {
        return Err(LedgerError::InsufficientShares.into_rejection());
    }

    let Some(quote) = state.quotes.lookup(&symbol).await else {
        return Err(apology(StatusCode::BAD_REQUEST, "incorrect symbol"));
    };

    db::sell(&state.pool, user.id, &quote, shares, now())
        .await
        .map_err(LedgerError::into_rejection)?;

    info!("User {} sold {} {} at {}", user.id, shares, quote.symbol, quote.price);
    Ok(redirect("/"))
}

/// Ends every session of the presenting user, then expires the cookie.
async fn logout_handler(
    token: Option<String>,
    state: Arc<AppState>,
) -> Result<Response, Rejection> {
    let user = session_user(&state, token.as_deref())
        .await
        .map_err(LedgerError::into_rejection)?;
    if let Some(user) = user {
        db::end_sessions(&state.pool, user.id)
            .await
            .map_err(LedgerError::into_rejection)?;
        info!("User {} logged out", user.id);
    }
    Ok(logged_out(redirect("/")))
}

async fn history_handler(user: User, state: Arc<AppState>) -> Result<Response, Rejection> {
    let transactions = db::history(&state.pool, user.id)
        .await
        .map_err(LedgerError::into_rejection)?;
    Ok(warp::reply::html(views::history(&transactions)).into_response())
}

async fn add_cash_handler(
    user: User,
    state: Arc<AppState>,
    form: CashForm,
) -> Result<Response, Rejection> {
    if form.cash.is_empty() {
        return Err(apology(StatusCode::BAD_REQUEST, "missing amount"));
    }
    let Some(amount) = parse_amount(&form.cash) else {
        return Err(apology(StatusCode::BAD_REQUEST, "input a positive number"));
    };

    db::add_cash(&state.pool, user.id, amount)
        .await
        .map_err(LedgerError::into_rejection)?;

    info!("User {} added {} cash", user.id, amount);
    Ok(redirect("/"))
}

async fn change_password_handler(
    user: User,
    state: Arc<AppState>,
    form: PasswordForm,
) -> Result<Response, Rejection> {
    if form.current_password.is_empty() {
        return Err(apology(StatusCode::BAD_REQUEST, "must provide password"));
    }
    if form.password.is_empty() {
        return Err(apology(StatusCode::BAD_REQUEST, "must provide new password"));
    }
    if form.confirmation.is_empty() {
        return Err(apology(StatusCode::BAD_REQUEST, "must provide password confirmation"));
    }
    if form.password != form.confirmation {
        return Err(apology(
            StatusCode::BAD_REQUEST,
            "password and password confirmation must match",
        ));
    }
    if !verify_password(user.hash.clone(), form.current_password).await {
        return Err(apology(StatusCode::FORBIDDEN, "invalid password"));
    }

    let hash = hash_password(form.password, state.password_iterations)
        .await
        .map_err(LedgerError::into_rejection)?;
    db::update_hash(&state.pool, user.id, &hash)
        .await
        .map_err(LedgerError::into_rejection)?;

    info!("User {} changed their password", user.id);
    Ok(redirect("/logout"))
}

fn apology_reply(status: StatusCode, message: &str) -> Response {
    warp::reply::with_status(
        warp::reply::html(views::apology(status.as_u16(), message)),
        status,
    )
    .into_response()
}

pub async fn handle_rejection(err: Rejection) -> Result<Response, Infallible> {
    if let Some(apology) = err.find::<Apology>() {
        debug!("Apology {}: {}", apology.status, apology.message);
        return Ok(apology_reply(apology.status, &apology.message));
    }
    if err.find::<LoginRequired>().is_some() {
        return Ok(redirect("/login"));
    }
    if err.is_not_found() {
        return Ok(apology_reply(StatusCode::NOT_FOUND, "not found"));
    }
    if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        return Ok(apology_reply(StatusCode::METHOD_NOT_ALLOWED, "method not allowed"));
    }
    if err.find::<warp::reject::PayloadTooLarge>().is_some() {
        return Ok(apology_reply(StatusCode::PAYLOAD_TOO_LARGE, "payload too large"));
    }
    if err.find::<warp::reject::LengthRequired>().is_some() {
        return Ok(apology_reply(StatusCode::LENGTH_REQUIRED, "length required"));
    }
    if err.find::<warp::reject::UnsupportedMediaType>().is_some()
        || err.find::<warp::body::BodyDeserializeError>().is_some()
    {
        return Ok(apology_reply(StatusCode::BAD_REQUEST, "bad request"));
    }

    error!("Unhandled rejection: {:?}", err);
    Ok(apology_reply(
        StatusCode::INTERNAL_SERVER_ERROR,
        "internal server error",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::finance::db::tests::test_pool;
    use crate::finance::models::{Quote, DEFAULT_CASH};
    use tempfile::TempDir;

    struct Page {
        status: StatusCode,
        location: Option<String>,
        cookie: Option<String>,
        cache_control: Option<String>,
        body: String,
    }

    fn dec(raw: &str) -> Decimal {
        raw.parse().unwrap()
    }

    fn quote(symbol: &str, name: &str, price: &str) -> Quote {
        Quote {
            symbol: symbol.to_string(),
            name: name.to_string(),
            price: dec(price),
        }
    }

    async fn test_state() -> (TempDir, Arc<AppState>) {
        let (dir, pool) = test_pool().await;
        let state = AppState {
            pool,
            quotes: QuoteService::fixed(vec![
                quote("AAPL", "Apple Inc.", "150.00"),
                quote("NFLX", "Netflix, Inc.", "400.00"),
                quote("BRK.A", "Berkshire Hathaway Inc.", "600000.00"),
                quote("PNY", "Penny Stock Corp", "0.10"),
                quote("BIG", "Big Ticket Corp", "10000.00"),
            ]),
            sessions: SessionKeys::new("test-secret", 1),
            password_iterations: 1000,
        };
        (dir, Arc::new(state))
    }

    async fn send(
        state: &Arc<AppState>,
        method: &str,
        path: &str,
        body: &str,
        cookie: Option<&str>,
    ) -> Page {
        let mut request = warp::test::request().method(method).path(path);
        if method == "POST" {
            request = request
                .header("content-type", "application/x-www-form-urlencoded")
                .body(body.to_string());
        }
        if let Some(cookie) = cookie {
            request = request.header("cookie", cookie);
        }

        let response = request.reply(&routes(state.clone())).await;
        let header = |name: &str| {
            response
                .headers()
                .get(name)
                .map(|value| value.to_str().unwrap().to_string())
        };
        Page {
            status: response.status(),
            location: header("location"),
            cookie: header("set-cookie"),
            cache_control: header("cache-control"),
            body: String::from_utf8(response.body().to_vec()).unwrap(),
        }
    }

    async fn get(state: &Arc<AppState>, path: &str, cookie: &str) -> Page {
        send(state, "GET", path, "", Some(cookie)).await
    }

    async fn post(state: &Arc<AppState>, path: &str, body: &str, cookie: &str) -> Page {
        send(state, "POST", path, body, Some(cookie)).await
    }

    /// The `name=value` part of a Set-Cookie header.
    fn session_of(page: &Page) -> String {
        page.cookie
            .as_deref()
            .and_then(|cookie| cookie.split(';').next())
            .unwrap()
            .to_string()
    }

    async fn register(state: &Arc<AppState>, username: &str, password: &str) -> String {
        let page = send(
            state,
            "POST",
            "/register",
            &format!("username={username}&password={password}&confirmation={password}"),
            None,
        )
        .await;
        assert_eq!(page.status, StatusCode::SEE_OTHER);
        assert_eq!(page.location.as_deref(), Some("/"));
        session_of(&page)
    }

    async fn cash_of(state: &Arc<AppState>, username: &str) -> Decimal {
        db::find_user_by_name(&state.pool, username)
            .await
            .unwrap()
            .unwrap()
            .cash
    }

    #[tokio::test]
    async fn test_anonymous_visitors_are_sent_to_login() {
        let (_dir, state) = test_state().await;
        for path in ["/", "/quote", "/buy", "/sell", "/history", "/add_cash", "/change_password"] {
            let page = send(&state, "GET", path, "", None).await;
            assert_eq!(page.status, StatusCode::SEE_OTHER, "{path}");
            assert_eq!(page.location.as_deref(), Some("/login"), "{path}");
        }

        let page = get(&state, "/", "session=not-a-token").await;
        assert_eq!(page.location.as_deref(), Some("/login"));
    }

    #[tokio::test]
    async fn test_register_logs_in_with_default_cash() {
        let (_dir, state) = test_state().await;
        let session = register(&state, "alice", "pw").await;

        let page = get(&state, "/", &session).await;
        assert_eq!(page.status, StatusCode::OK);
        assert!(page.body.contains("$10,000.00"));
        assert_eq!(cash_of(&state, "alice").await, DEFAULT_CASH);
    }

    #[tokio::test]
    async fn test_register_validation() {
        let (_dir, state) = test_state().await;
        let cases = [
            ("password=a&confirmation=a", "must provide username"),
            ("username=bob&confirmation=a", "must provide password"),
            ("username=bob&password=a", "must provide password confirmation"),
            (
                "username=bob&password=a&confirmation=b",
                "password and password confirmation must match",
            ),
        ];
        for (body, message) in cases {
            let page = send(&state, "POST", "/register", body, None).await;
            assert_eq!(page.status, StatusCode::BAD_REQUEST);
            assert!(page.body.contains(message), "{message}");
        }
    }

    #[tokio::test]
    async fn test_duplicate_registration_is_rejected() {
        let (_dir, state) = test_state().await;
        register(&state, "alice", "pw").await;

        let page = send(
            &state,
            "POST",
            "/register",
            "username=alice&password=x&confirmation=x",
            None,
        )
        .await;
        assert_eq!(page.status, StatusCode::BAD_REQUEST);
        assert!(page.body.contains("user already exists"));

        // Usernames match exactly, so a different casing is a new user.
        register(&state, "Alice", "pw").await;
    }

    #[tokio::test]
    async fn test_login_failures_are_generic() {
        let (_dir, state) = test_state().await;
        register(&state, "alice", "right").await;

        for body in ["username=alice&password=wrong", "username=nobody&password=right"] {
            let page = send(&state, "POST", "/login", body, None).await;
            assert_eq!(page.status, StatusCode::FORBIDDEN);
            assert!(page.body.contains("invalid username and/or password"));
            assert!(page.cookie.unwrap().contains("Max-Age=0"));
        }

        let page = send(&state, "POST", "/login", "password=right", None).await;
        assert_eq!(page.status, StatusCode::FORBIDDEN);
        assert!(page.body.contains("must provide username"));

        let page = send(&state, "POST", "/login", "username=alice&password=right", None).await;
        assert_eq!(page.status, StatusCode::SEE_OTHER);
        let session = session_of(&page);
        assert_eq!(get(&state, "/", &session).await.status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_logout_clears_session() {
        let (_dir, state) = test_state().await;
        let session = register(&state, "alice", "pw").await;

        let page = get(&state, "/logout", &session).await;
        assert_eq!(page.status, StatusCode::SEE_OTHER);
        assert_eq!(page.location.as_deref(), Some("/"));
        assert!(page.cookie.unwrap().contains("Max-Age=0"));

        // The cookie captured before logout no longer authenticates.
        let page = get(&state, "/history", &session).await;
        assert_eq!(page.status, StatusCode::SEE_OTHER);
        assert_eq!(page.location.as_deref(), Some("/login"));

        // Logging out again with a stale or missing cookie still succeeds.
        assert_eq!(get(&state, "/logout", &session).await.status, StatusCode::SEE_OTHER);
        let page = send(&state, "GET", "/logout", "", None).await;
        assert_eq!(page.status, StatusCode::SEE_OTHER);
    }

    #[tokio::test]
    async fn test_logout_ends_every_session_of_the_user() {
        let (_dir, state) = test_state().await;
        let first = register(&state, "alice", "pw").await;
        let page = send(&state, "POST", "/login", "username=alice&password=pw", None).await;
        let second = session_of(&page);
        let bob = register(&state, "bob", "pw").await;

        get(&state, "/logout", &second).await;

        for session in [&first, &second] {
            let page = get(&state, "/", session).await;
            assert_eq!(page.location.as_deref(), Some("/login"));
        }
        assert_eq!(get(&state, "/", &bob).await.status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_quote() {
        let (_dir, state) = test_state().await;
        let session = register(&state, "alice", "pw").await;

        let page = post(&state, "/quote", "symbol=nflx", &session).await;
        assert_eq!(page.status, StatusCode::OK);
        assert!(page.body.contains("A share of Netflix, Inc. (NFLX) costs $400.00."));

        let page = post(&state, "/quote", "symbol=ZZZZ", &session).await;
        assert_eq!(page.status, StatusCode::BAD_REQUEST);
        assert!(page.body.contains("incorrect symbol"));
    }

    #[tokio::test]
    async fn test_buy_rejections() {
        let (_dir, state) = test_state().await;
        let session = register(&state, "alice", "pw").await;

        let page = post(&state, "/buy", "symbol=ZZZZ&shares=1", &session).await;
        assert_eq!(page.status, StatusCode::BAD_REQUEST);
        assert!(page.body.contains("incorrect symbol"));

        for shares in ["", "abc", "0", "-3", "1.5"] {
            let page = post(&state, "/buy", &format!("symbol=AAPL&shares={shares}"), &session).await;
            assert_eq!(page.status, StatusCode::BAD_REQUEST, "{shares:?}");
            assert!(page.body.contains("input a positive integer"));
        }

        let page = post(&state, "/buy", "symbol=BRK.A&shares=1", &session).await;
        assert_eq!(page.status, StatusCode::BAD_REQUEST);
        assert!(page.body.contains("not enough cash"));

        assert_eq!(cash_of(&state, "alice").await, DEFAULT_CASH);
        let page = get(&state, "/history", &session).await;
        assert!(!page.body.contains("AAPL"));
    }

    #[tokio::test]
    async fn test_buys_debit_exact_cost_and_show_in_portfolio() {
        let (_dir, state) = test_state().await;
        let session = register(&state, "alice", "pw").await;

        for (symbol, shares) in [("aapl", 2), ("NFLX", 3), ("AAPL", 4)] {
            let page = post(&state, "/buy", &format!("symbol={symbol}&shares={shares}"), &session).await;
            assert_eq!(page.status, StatusCode::SEE_OTHER);
            assert_eq!(page.location.as_deref(), Some("/"));
        }

        let spent = dec("2100.00");
        assert_eq!(cash_of(&state, "alice").await, DEFAULT_CASH - spent);

        let page = get(&state, "/", &session).await;
        assert!(page.body.contains("Apple Inc."));
        assert!(page.body.contains("$900.00"));
        assert!(page.body.contains("$1,200.00"));
        assert!(page.body.contains(&crate::html::usd(DEFAULT_CASH - spent)));
        assert!(page.body.contains("$10,000.00"));
    }

    #[tokio::test]
    async fn test_oversell_is_rejected_and_not_recorded() {
        let (_dir, state) = test_state().await;
        let session = register(&state, "alice", "pw").await;
        post(&state, "/buy", "symbol=AAPL&shares=2", &session).await;

        let page = post(&state, "/sell", "symbol=AAPL&shares=3", &session).await;
        assert_eq!(page.status, StatusCode::BAD_REQUEST);
        assert!(page.body.contains("not enough shares"));

        let page = post(&state, "/sell", "symbol=NFLX&shares=1", &session).await;
        assert_eq!(page.status, StatusCode::BAD_REQUEST);

        let page = post(&state, "/sell", "shares=1", &session).await;
        assert!(page.body.contains("must select a symbol"));

        let rows = db::history(&state.pool, 1).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(cash_of(&state, "alice").await, dec("9700.00"));
    }

    #[tokio::test]
    async fn test_sell_credits_cash_and_appends_negative_shares() {
        let (_dir, state) = test_state().await;
        let session = register(&state, "alice", "pw").await;
        post(&state, "/buy", "symbol=AAPL&shares=5", &session).await;

        let page = get(&state, "/sell", &session).await;
        assert!(page.body.contains(r#"<option value="AAPL">AAPL (5)</option>"#));

        let page = post(&state, "/sell", "symbol=AAPL&shares=5", &session).await;
        assert_eq!(page.status, StatusCode::SEE_OTHER);
        assert_eq!(cash_of(&state, "alice").await, DEFAULT_CASH);

        let rows = db::history(&state.pool, 1).await.unwrap();
        let shares: Vec<i64> = rows.iter().map(|row| row.shares).collect();
        assert_eq!(shares, vec![5, -5]);

        let page = get(&state, "/", &session).await;
        assert!(!page.body.contains("Apple Inc."));

        let page = get(&state, "/history", &session).await;
        assert!(page.body.contains("<td>-5</td>"));
    }

    #[tokio::test]
    async fn test_add_cash() {
        let (_dir, state) = test_state().await;
        let session = register(&state, "alice", "pw").await;

        let page = post(&state, "/add_cash", "cash=", &session).await;
        assert!(page.body.contains("missing amount"));
        for cash in ["-5", "0", "lots", "inf", "NaN"] {
            let page = post(&state, "/add_cash", &format!("cash={cash}"), &session).await;
            assert_eq!(page.status, StatusCode::BAD_REQUEST, "{cash}");
            assert!(page.body.contains("input a positive number"));
        }

        let page = post(&state, "/add_cash", "cash=250.5", &session).await;
        assert_eq!(page.status, StatusCode::SEE_OTHER);
        assert_eq!(cash_of(&state, "alice").await, dec("10250.50"));
    }

    #[tokio::test]
    async fn test_cash_is_exact_with_fractional_amounts() {
        let (_dir, state) = test_state().await;
        let session = register(&state, "alice", "pw").await;

        post(&state, "/add_cash", "cash=0.30", &session).await;
        let page = post(&state, "/buy", "symbol=BIG&shares=1", &session).await;
        assert_eq!(page.status, StatusCode::SEE_OTHER);
        assert_eq!(cash_of(&state, "alice").await, dec("0.30"));

        // The remaining 0.30 covers exactly three shares at 0.10.
        let page = post(&state, "/buy", "symbol=PNY&shares=3", &session).await;
        assert_eq!(page.status, StatusCode::SEE_OTHER);
        assert_eq!(cash_of(&state, "alice").await, Decimal::ZERO);

        let page = get(&state, "/", &session).await;
        assert!(page.body.contains("<td>$0.30</td>"));
        assert!(page.body.contains("<b>$10,000.30</b>"));

        let page = post(&state, "/buy", "symbol=PNY&shares=1", &session).await;
        assert!(page.body.contains("not enough cash"));
    }

    #[tokio::test]
    async fn test_change_password() {
        let (_dir, state) = test_state().await;
        let session = register(&state, "alice", "old").await;

        let page = post(
            &state,
            "/change_password",
            "current_password=wrong&password=new&confirmation=new",
            &session,
        )
        .await;
        assert_eq!(page.status, StatusCode::FORBIDDEN);
        assert!(page.body.contains("invalid password"));

        let page = post(
            &state,
            "/change_password",
            "current_password=old&password=new&confirmation=other",
            &session,
        )
        .await;
        assert_eq!(page.status, StatusCode::BAD_REQUEST);

        let page = post(
            &state,
            "/change_password",
            "current_password=old&password=new&confirmation=new",
            &session,
        )
        .await;
        assert_eq!(page.status, StatusCode::SEE_OTHER);
        assert_eq!(page.location.as_deref(), Some("/logout"));

        // The pre-change cookie is revoked even before /logout is followed.
        let page = get(&state, "/history", &session).await;
        assert_eq!(page.status, StatusCode::SEE_OTHER);
        assert_eq!(page.location.as_deref(), Some("/login"));

        let page = send(&state, "POST", "/login", "username=alice&password=old", None).await;
        assert_eq!(page.status, StatusCode::FORBIDDEN);
        let page = send(&state, "POST", "/login", "username=alice&password=new", None).await;
        assert_eq!(page.status, StatusCode::SEE_OTHER);
    }

    #[tokio::test]
    async fn test_responses_are_not_cached_and_unknown_paths_apologise() {
        let (_dir, state) = test_state().await;

        let page = send(&state, "GET", "/login", "", None).await;
        assert_eq!(page.status, StatusCode::OK);
        assert_eq!(
            page.cache_control.as_deref(),
            Some("no-cache, no-store, must-revalidate")
        );

        let page = send(&state, "GET", "/nowhere", "", None).await;
        assert_eq!(page.status, StatusCode::NOT_FOUND);
        assert!(page.body.contains("<h1>404</h1>"));
        assert!(page.cache_control.is_some());
    }
}
