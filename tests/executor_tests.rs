use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::routing::post;
use axum::{Json, Router};
use scheduler_executor::{
    task_fn, ApiResponse, CallbackParam, Executor, ExecutorError, ExecutorResult, LogProvider,
    LogRequest, LogResult, RegistryParam, ACCESS_TOKEN_HEADER, FAILURE_CODE, SUCCESS_CODE,
};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::time::sleep;

/// 回调/注册一律应答成功的假调度中心
async fn spawn_quiet_admin() -> String {
    async fn ok_callback(Json(_): Json<Vec<CallbackParam>>) -> ApiResponse<()> {
        ApiResponse::success_empty()
    }
    async fn ok_registry(Json(_): Json<RegistryParam>) -> ApiResponse<()> {
        ApiResponse::success_empty()
    }
    let router = Router::new()
        .route("/api/callback", post(ok_callback))
        .route("/api/registry", post(ok_registry))
        .route("/api/registryRemove", post(|| async { ApiResponse::success_empty() }));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

fn builder(admin_url: &str, app_name: &str) -> scheduler_executor::ExecutorBuilder {
    Executor::builder()
        .admin_url(admin_url)
        .access_token("token")
        .app_name(app_name)
        .bind_address("127.0.0.1")
        .port(0)
        .heartbeat_interval(Duration::from_secs(30))
        .shutdown_grace(Duration::from_secs(2))
}

async fn post_json(
    addr: std::net::SocketAddr,
    path: &str,
    body: serde_json::Value,
) -> ApiResponse<serde_json::Value> {
    reqwest::Client::new()
        .post(format!("http://{addr}{path}"))
        .header(ACCESS_TOKEN_HEADER, "token")
        .json(&body)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap()
}

/// 宿主应用整体替换日志实现的扩展点
struct FixedLogProvider;

#[async_trait]
impl LogProvider for FixedLogProvider {
    async fn fetch(&self, req: &LogRequest) -> ExecutorResult<LogResult> {
        Ok(LogResult {
            from_line_num: req.from_line_num,
            to_line_num: 2,
            log_content: "custom log handler output".to_string(),
            is_end: true,
        })
    }
}

#[tokio::test]
async fn test_custom_log_provider_overrides_default() {
    let admin_url = spawn_quiet_admin().await;
    let executor = builder(&admin_url, "custom-log-executor")
        .log_provider(Arc::new(FixedLogProvider))
        .build()
        .unwrap();
    let addr = executor.start().await.unwrap();

    let resp = post_json(addr, "/log", json!({"logId": 1, "fromLineNum": 3})).await;
    assert_eq!(resp.code, SUCCESS_CODE);
    let content = resp.content.unwrap();
    assert_eq!(content["fromLineNum"], 3);
    assert_eq!(content["toLineNum"], 2);
    assert_eq!(content["logContent"], "custom log handler output");
    assert_eq!(content["isEnd"], true);

    executor.stop().await.unwrap();
}

#[tokio::test]
async fn test_two_executors_coexist_in_one_process() {
    let admin_url = spawn_quiet_admin().await;

    let blocker = || {
        task_fn(|ctx| async move {
            tokio::select! {
                _ = ctx.cancelled() => Err(ExecutorError::TaskExecution("cancelled".to_string())),
                _ = sleep(Duration::from_secs(60)) => Ok("done".to_string()),
            }
        })
    };

    let first = builder(&admin_url, "executor-a").build().unwrap();
    first
        .register_task("blocker", "", "0 * * * * ?", blocker())
        .await;
    let second = builder(&admin_url, "executor-b").build().unwrap();
    second
        .register_task("blocker", "", "0 * * * * ?", blocker())
        .await;

    let addr_a = first.start().await.unwrap();
    let addr_b = second.start().await.unwrap();
    assert_ne!(addr_a, addr_b);

    // 同一个 jobId 只在执行器 A 上忙，状态互不串扰
    let resp = post_json(
        addr_a,
        "/run",
        json!({"jobId": 1, "logId": 10, "executorHandler": "blocker"}),
    )
    .await;
    assert_eq!(resp.code, SUCCESS_CODE);

    let resp = post_json(addr_a, "/idleBeat", json!({"jobId": 1})).await;
    assert_eq!(resp.code, FAILURE_CODE);
    let resp = post_json(addr_b, "/idleBeat", json!({"jobId": 1})).await;
    assert_eq!(resp.code, SUCCESS_CODE);

    let resp = post_json(addr_a, "/kill", json!({"jobId": 1})).await;
    assert_eq!(resp.code, SUCCESS_CODE);

    first.stop().await.unwrap();
    second.stop().await.unwrap();
}

#[tokio::test]
async fn test_stop_is_idempotent_and_releases_port() {
    let admin_url = spawn_quiet_admin().await;
    let executor = builder(&admin_url, "restart-executor").build().unwrap();
    let addr = executor.start().await.unwrap();
    assert!(executor.is_running().await);

    executor.stop().await.unwrap();
    assert!(!executor.is_running().await);
    executor.stop().await.unwrap();

    // 端口释放后可以被重新占用
    for _ in 0..100 {
        if TcpListener::bind(addr).await.is_ok() {
            return;
        }
        sleep(Duration::from_millis(10)).await;
    }
    panic!("listener port was not released after stop");
}
