use chrono::Duration;
use serde::Serialize;
use std::net::IpAddr;
use std::sync::Arc;
use warp::{http::StatusCode, reply, Filter, Rejection, Reply};

use super::types::{
    ActionResponse, ApiError, HistoryQuery, SessionResponse, StatsResponse,
};
use crate::auth::LoginAttempt;
use crate::engine::{Engine, Status};
use crate::monitoring::HistoricalPoint;

/// Window of the login attempt listing.
const LOGIN_ATTEMPTS_WINDOW_HOURS: i64 = 24;

pub fn stats_view(engine: &Engine) -> StatsResponse {
    StatsResponse {
        network: engine.connections().stats(),
        active_sessions: engine.sessions().len(),
        blocked_ips: engine.login_guard().blocked_ips().len(),
        players: engine.connections().player_count(),
        latest_metrics: engine.metrics().latest(),
    }
}

pub fn user_sessions_view(engine: &Engine, user_id: &str) -> Vec<SessionResponse> {
    engine
        .sessions()
        .list_active_for_user(user_id)
        .iter()
        .map(SessionResponse::from)
        .collect()
}

pub fn login_attempts_view(engine: &Engine) -> Vec<LoginAttempt> {
    engine
        .login_guard()
        .recent_attempts(Duration::hours(LOGIN_ATTEMPTS_WINDOW_HOURS))
}

pub fn history_view(engine: &Engine, query: &HistoryQuery) -> Vec<HistoricalPoint> {
    match query.minutes {
        Some(minutes) => {
            let from = engine.clock().now() - Duration::minutes(i64::from(minutes));
            engine.metrics().since(from)
        }
        None => engine.metrics().points(),
    }
}

pub fn parse_ip(raw: &str) -> Result<IpAddr, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::new(format!("Invalid IP address: {}", raw)))
}

pub fn unban_view(engine: &Engine, raw_ip: &str) -> Result<ActionResponse, ApiError> {
    let ip = parse_ip(raw_ip)?;
    Ok(ActionResponse {
        ip,
        removed: engine.unban_ip(ip),
    })
}

pub fn unblock_view(engine: &Engine, raw_ip: &str) -> Result<ActionResponse, ApiError> {
    let ip = parse_ip(raw_ip)?;
    Ok(ActionResponse {
        ip,
        removed: engine.unblock_ip(ip),
    })
}

/// Checks an `Authorization: Bearer <session id>` header against the live sessions.
pub fn authorize(engine: &Engine, header: Option<&str>) -> Result<(), ApiError> {
    let Some(header) = header else {
        return Err(ApiError::new("Authentication required"));
    };
    let token = header.strip_prefix("Bearer ").map(str::trim).unwrap_or_default();
    match engine.validate_session(token) {
        Status::Ok => Ok(()),
        _ => Err(ApiError::new("Invalid token")),
    }
}

fn unauthorized(e: ApiError) -> reply::Response {
    reply::with_status(reply::json(&e), StatusCode::UNAUTHORIZED).into_response()
}

fn action_reply(result: Result<ActionResponse, ApiError>) -> reply::Response {
    match result {
        Ok(action) if action.removed => {
            reply::with_status(reply::json(&action), StatusCode::OK).into_response()
        }
        Ok(action) => reply::with_status(
            reply::json(&ApiError::new(format!("{} is not listed", action.ip))),
            StatusCode::NOT_FOUND,
        )
        .into_response(),
        Err(e) => reply::with_status(reply::json(&e), StatusCode::BAD_REQUEST).into_response(),
    }
}

/// Serves `GET /<name>` with the JSON produced by `view`. A `protected` listing requires a
/// valid session token.
fn listing_route<T, F>(
    name: &'static str,
    engine: Arc<Engine>,
    protected: bool,
    view: F,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone
where
    T: Serialize,
    F: Fn(&Engine) -> T + Clone + Send + Sync + 'static,
{
    warp::path(name)
        .and(warp::path::end())
        .and(warp::get())
        .and(warp::header::optional::<String>("authorization"))
        .and_then(move |auth: Option<String>| {
            let engine = engine.clone();
            let view = view.clone();
            async move {
                if protected {
                    if let Err(e) = authorize(&engine, auth.as_deref()) {
                        return Ok::<_, Rejection>(unauthorized(e));
                    }
                }
                Ok::<_, Rejection>(reply::json(&view(&engine)).into_response())
            }
        })
}

/// GET /
pub fn dashboard_route() -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path::end().and(warp::get()).and_then(|| async move {
        let html = r#"<html><head><title>Warden Dashboard</title></head>
                <body><h1>Warden is running</h1>
                <p>JSON endpoints: /stats, /connections, /banned, /suspicious, /blocked,
                /history; with a session token: /login-attempts, /users/{id}/sessions</p>
                </body></html>"#;
        Ok::<_, Rejection>(reply::html(html))
    })
}

/// GET /stats
pub fn stats_route(
    engine: Arc<Engine>,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    listing_route("stats", engine, false, stats_view)
}

/// GET /connections
pub fn connections_route(
    engine: Arc<Engine>,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    listing_route("connections", engine, false, |e: &Engine| {
        e.connections().connections()
    })
}

/// GET /banned
pub fn banned_route(
    engine: Arc<Engine>,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    listing_route("banned", engine, false, |e: &Engine| e.reputation().banned_ips())
}

/// GET /suspicious
pub fn suspicious_route(
    engine: Arc<Engine>,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    listing_route("suspicious", engine, false, |e: &Engine| {
        e.reputation().suspicious_ips()
    })
}

/// GET /blocked
pub fn blocked_route(
    engine: Arc<Engine>,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    listing_route("blocked", engine, false, |e: &Engine| e.login_guard().blocked_ips())
}

/// GET /login-attempts (authenticated)
pub fn login_attempts_route(
    engine: Arc<Engine>,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    listing_route("login-attempts", engine, true, login_attempts_view)
}

/// GET /history?minutes=N
pub fn history_route(
    engine: Arc<Engine>,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path("history")
        .and(warp::path::end())
        .and(warp::get())
        .and(warp::query::<HistoryQuery>())
        .and_then(move |query: HistoryQuery| {
            let engine = engine.clone();
            async move { Ok::<_, Rejection>(reply::json(&history_view(&engine, &query))) }
        })
}

/// GET /users/:user_id/sessions (authenticated)
pub fn user_sessions_route(
    engine: Arc<Engine>,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path!("users" / String / "sessions")
        .and(warp::get())
        .and(warp::header::optional::<String>("authorization"))
        .and_then(move |user_id: String, auth: Option<String>| {
            let engine = engine.clone();
            async move {
                if let Err(e) = authorize(&engine, auth.as_deref()) {
                    return Ok::<_, Rejection>(unauthorized(e));
                }
                Ok::<_, Rejection>(
                    reply::json(&user_sessions_view(&engine, &user_id)).into_response(),
                )
            }
        })
}

/// DELETE /banned/:ip (authenticated)
pub fn unban_route(
    engine: Arc<Engine>,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path!("banned" / String)
        .and(warp::delete())
        .and(warp::header::optional::<String>("authorization"))
        .and_then(move |raw_ip: String, auth: Option<String>| {
            let engine = engine.clone();
            async move {
                if let Err(e) = authorize(&engine, auth.as_deref()) {
                    return Ok::<_, Rejection>(unauthorized(e));
                }
                Ok::<_, Rejection>(action_reply(unban_view(&engine, &raw_ip)))
            }
        })
}

/// DELETE /blocked/:ip (authenticated)
pub fn unblock_route(
    engine: Arc<Engine>,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path!("blocked" / String)
        .and(warp::delete())
        .and(warp::header::optional::<String>("authorization"))
        .and_then(move |raw_ip: String, auth: Option<String>| {
            let engine = engine.clone();
            async move {
                if let Err(e) = authorize(&engine, auth.as_deref()) {
                    return Ok::<_, Rejection>(unauthorized(e));
                }
                Ok::<_, Rejection>(action_reply(unblock_view(&engine, &raw_ip)))
            }
        })
}

/// Every dashboard route, composed.
pub fn routes(
    engine: Arc<Engine>,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    dashboard_route()
        .or(stats_route(engine.clone()))
        .or(connections_route(engine.clone()))
        .or(banned_route(engine.clone()))
        .or(suspicious_route(engine.clone()))
        .or(blocked_route(engine.clone()))
        .or(login_attempts_route(engine.clone()))
        .or(history_route(engine.clone()))
        .or(user_sessions_route(engine.clone()))
        .or(unban_route(engine.clone()))
        .or(unblock_route(engine))
}
