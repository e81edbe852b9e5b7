use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use log::warn;
use warp::{http::StatusCode, Filter, Rejection, Reply};

use super::types::{auth_status, ingest_status, ApiResponse, DeleteAlertsResponse};
use super::web_server::ApiContext;
use crate::alert_management::AlertQuery;
use crate::authorization::{bearer_token, Machine};

async fn authenticate(ctx: &ApiContext, header: Option<&str>) -> Result<Machine, ApiResponse> {
    let token = bearer_token(header).map_err(|e| ApiResponse::error(auth_status(&e), &e))?;
    ctx.credentials.authenticate(token).await.map_err(|e| {
        warn!("authentication failed: {}", e);
        ApiResponse::error(auth_status(&e), &e)
    })
}

/// POST /v1/alerts
pub async fn create_alerts(ctx: Arc<ApiContext>, auth: Option<String>, body: Bytes) -> ApiResponse {
    let machine = match authenticate(&ctx, auth.as_deref()).await {
        Ok(machine) => machine,
        Err(resp) => return resp,
    };
    match ctx.ingestion.create(&machine, &body).await {
        Ok(ids) => ApiResponse::json(StatusCode::CREATED, &ids),
        Err(e) => ApiResponse::error(ingest_status(&e), &e),
    }
}

/// GET /v1/alerts
pub async fn list_alerts(
    ctx: Arc<ApiContext>,
    auth: Option<String>,
    query: Vec<(String, String)>,
) -> ApiResponse {
    if let Err(resp) = authenticate(&ctx, auth.as_deref()).await {
        return resp;
    }
    let filter = match AlertQuery::build_filter(query) {
        Ok(filter) => filter,
        Err(e) => return ApiResponse::error(StatusCode::INTERNAL_SERVER_ERROR, &e),
    };
    match ctx.query.apply(&filter).await {
        Ok(alerts) => ApiResponse::json(StatusCode::OK, &alerts),
        Err(e) => ApiResponse::error(StatusCode::INTERNAL_SERVER_ERROR, &e),
    }
}

/// GET /v1/alerts/:id
pub async fn get_alert(ctx: Arc<ApiContext>, auth: Option<String>, id: i64) -> ApiResponse {
    if let Err(resp) = authenticate(&ctx, auth.as_deref()).await {
        return resp;
    }
    match ctx.query.find(id).await {
        Ok(Some(alert)) => ApiResponse::json(StatusCode::OK, &alert),
        Ok(None) => ApiResponse::error(
            StatusCode::NOT_FOUND,
            &format!("alert {} not found", id),
        ),
        Err(e) => ApiResponse::error(StatusCode::INTERNAL_SERVER_ERROR, &e),
    }
}

/// DELETE /v1/alerts
pub async fn delete_alerts(
    ctx: Arc<ApiContext>,
    auth: Option<String>,
    remote: Option<SocketAddr>,
    query: Vec<(String, String)>,
) -> ApiResponse {
    if let Err(resp) = authenticate(&ctx, auth.as_deref()).await {
        return resp;
    }
    if let Err(e) = ctx.origin_policy.authorize(remote) {
        return ApiResponse::error(auth_status(&e), &e);
    }

    let deleted = if query.is_empty() {
        ctx.lifecycle.delete_all().await
    } else {
        match AlertQuery::build_filter(query) {
            Ok(filter) => ctx.lifecycle.delete_matching(&filter).await,
            Err(e) => return ApiResponse::error(StatusCode::INTERNAL_SERVER_ERROR, &e),
        }
    };
    match deleted {
        Ok(count) => ApiResponse::json(
            StatusCode::OK,
            &DeleteAlertsResponse {
                deleted_count: count.to_string(),
            },
        ),
        Err(e) => ApiResponse::error(StatusCode::INTERNAL_SERVER_ERROR, &e),
    }
}

fn with_context(
    ctx: Arc<ApiContext>,
) -> impl Filter<Extract = (Arc<ApiContext>,), Error = std::convert::Infallible> + Clone {
    warp::any().map(move || ctx.clone())
}

/// All `/v1/alerts` routes, wrapped in the access log.
pub fn alert_routes(
    ctx: Arc<ApiContext>,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let max_body_bytes = ctx.max_body_bytes;

    let create = warp::path!("v1" / "alerts")
        .and(warp::post())
        .and(with_context(ctx.clone()))
        .and(warp::header::optional::<String>("authorization"))
        .and(warp::body::content_length_limit(max_body_bytes))
        .and(warp::body::bytes())
        .then(create_alerts);

    let list = warp::path!("v1" / "alerts")
        .and(warp::get())
        .and(with_context(ctx.clone()))
        .and(warp::header::optional::<String>("authorization"))
        .and(warp::query::<Vec<(String, String)>>())
        .then(list_alerts);

    let get_one = warp::path!("v1" / "alerts" / i64)
        .and(warp::get())
        .and(with_context(ctx.clone()))
        .and(warp::header::optional::<String>("authorization"))
        .then(|id: i64, ctx: Arc<ApiContext>, auth: Option<String>| get_alert(ctx, auth, id));

    let delete = warp::path!("v1" / "alerts")
        .and(warp::delete())
        .and(with_context(ctx))
        .and(warp::header::optional::<String>("authorization"))
        .and(warp::addr::remote())
        .and(warp::query::<Vec<(String, String)>>())
        .then(delete_alerts);

    create
        .or(list)
        .unify()
        .or(get_one)
        .unify()
        .or(delete)
        .unify()
        .with(warp::log("decisiond::api"))
}
