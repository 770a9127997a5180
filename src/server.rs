use std::sync::Arc;

use axum::{
    extract::{Request, State},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::entities::{
    ApiResponse, IdleBeatRequest, KillRequest, LogRequest, LogResult, RunRequest,
    ACCESS_TOKEN_HEADER,
};
use crate::errors::{ExecutorError, ExecutorResult};
use crate::execution::ExecutionEngine;
use crate::logging::LogProvider;

/// 协议服务端共享状态
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<ExecutionEngine>,
    pub log_provider: Arc<dyn LogProvider>,
    pub access_token: String,
}

/// 调度中心访问的五个端点，全部 POST + JSON 信封
pub fn create_routes(state: AppState) -> Router {
    Router::new()
        .route("/run", post(run_job))
        .route("/kill", post(kill_job))
        .route("/log", post(fetch_log))
        .route("/beat", post(beat))
        .route("/idleBeat", post(idle_beat))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            access_token_gate,
        ))
        .with_state(state)
}

/// 令牌硬门禁：所有端点一视同仁，校验失败不做任何后续处理。
/// 协议以信封 code 传递错误，HTTP 状态保持 200
async fn access_token_gate(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if state.access_token.is_empty() {
        return next.run(request).await;
    }
    let presented = request
        .headers()
        .get(ACCESS_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok());
    if presented == Some(state.access_token.as_str()) {
        next.run(request).await
    } else {
        warn!(
            "rejected request to {}: access token missing or mismatched",
            request.uri().path()
        );
        ApiResponse::<()>::fail(ExecutorError::AuthFailed.to_string()).into_response()
    }
}

/// 存活探测
async fn beat() -> ApiResponse<()> {
    ApiResponse::success_empty()
}

/// 忙碌返回失败码，调度中心据此把触发路由到空闲节点
async fn idle_beat(
    State(state): State<AppState>,
    Json(req): Json<IdleBeatRequest>,
) -> ApiResponse<()> {
    if state.engine.is_busy(req.job_id).await {
        ApiResponse::fail("job thread is running or has trigger queue")
    } else {
        ApiResponse::success_empty()
    }
}

async fn run_job(State(state): State<AppState>, Json(req): Json<RunRequest>) -> ApiResponse<()> {
    match state.engine.submit(req).await {
        Ok(()) => ApiResponse::success_empty(),
        Err(e) => {
            warn!("run request rejected: {}", e);
            ApiResponse::fail(e.to_string())
        }
    }
}

async fn kill_job(State(state): State<AppState>, Json(req): Json<KillRequest>) -> ApiResponse<()> {
    match state.engine.kill(req.job_id).await {
        Ok(()) => ApiResponse::success_empty(),
        Err(e) => ApiResponse::fail(e.to_string()),
    }
}

async fn fetch_log(
    State(state): State<AppState>,
    Json(req): Json<LogRequest>,
) -> ApiResponse<LogResult> {
    match state.log_provider.fetch(&req).await {
        Ok(content) => ApiResponse::success(content),
        Err(e) => {
            warn!("log query failed for log_id={}: {}", req.log_id, e);
            ApiResponse::fail(e.to_string())
        }
    }
}

/// 在已绑定的监听器上服务到收到停机信号为止
pub async fn serve(
    state: AppState,
    listener: TcpListener,
    shutdown: CancellationToken,
) -> ExecutorResult<()> {
    let addr = listener
        .local_addr()
        .map_err(|e| ExecutorError::Internal(format!("listener has no local addr: {e}")))?;
    info!("protocol server listening on {}", addr);

    axum::serve(listener, create_routes(state))
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
        .map_err(|e| ExecutorError::Internal(format!("protocol server failed: {e}")))
}
