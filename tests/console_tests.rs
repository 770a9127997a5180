use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::State;
use axum::http::header::{COOKIE, SET_COOKIE};
use axum::http::HeaderMap;
use axum::response::{AppendHeaders, IntoResponse};
use axum::routing::post;
use axum::{Form, Json, Router};
use scheduler_executor::{ConsoleClient, WebConsoleClient};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::Mutex;

const SESSION: &str = "SESSION=mock-console-session";

#[derive(Debug, Clone)]
struct GroupRecord {
    id: i64,
    appname: String,
    title: String,
    address_list: String,
}

#[derive(Debug, Clone)]
struct JobRecord {
    id: i64,
    job_group: i64,
    job_desc: String,
    schedule_conf: String,
    executor_handler: String,
}

#[derive(Debug, Default)]
struct ConsoleInner {
    groups: Vec<GroupRecord>,
    jobs: Vec<JobRecord>,
    started: Vec<i64>,
    login_count: usize,
    next_id: i64,
}

#[derive(Clone, Default)]
struct ConsoleState {
    inner: Arc<Mutex<ConsoleInner>>,
}

fn has_session(headers: &HeaderMap) -> bool {
    headers
        .get(COOKIE)
        .and_then(|v| v.to_str().ok())
        .map(|c| c.contains(SESSION))
        .unwrap_or(false)
}

async fn login(State(state): State<ConsoleState>) -> impl IntoResponse {
    state.inner.lock().await.login_count += 1;
    (AppendHeaders([(SET_COOKIE, SESSION)]), "ok")
}

async fn group_page_list(
    State(state): State<ConsoleState>,
    headers: HeaderMap,
    Form(form): Form<HashMap<String, String>>,
) -> Json<serde_json::Value> {
    assert!(has_session(&headers), "pageList requires a session cookie");
    let appname = form.get("appname").cloned().unwrap_or_default();
    let inner = state.inner.lock().await;
    let data: Vec<serde_json::Value> = inner
        .groups
        .iter()
        .filter(|g| g.appname == appname)
        .map(|g| {
            json!({
                "id": g.id,
                "appname": g.appname,
                "title": g.title,
                "addressList": g.address_list,
            })
        })
        .collect();
    Json(json!({"recordsFiltered": data.len(), "data": data, "recordsTotal": data.len()}))
}

async fn group_save(
    State(state): State<ConsoleState>,
    headers: HeaderMap,
    Form(form): Form<HashMap<String, String>>,
) -> Json<serde_json::Value> {
    assert!(has_session(&headers));
    let mut inner = state.inner.lock().await;
    inner.next_id += 1;
    let record = GroupRecord {
        id: inner.next_id,
        appname: form.get("appname").cloned().unwrap_or_default(),
        title: form.get("title").cloned().unwrap_or_default(),
        address_list: form.get("addressList").cloned().unwrap_or_default(),
    };
    inner.groups.push(record);
    Json(json!({"code": 200}))
}

async fn group_update(
    State(state): State<ConsoleState>,
    headers: HeaderMap,
    Form(form): Form<HashMap<String, String>>,
) -> Json<serde_json::Value> {
    assert!(has_session(&headers));
    let id: i64 = form.get("id").and_then(|v| v.parse().ok()).unwrap_or(0);
    let mut inner = state.inner.lock().await;
    if let Some(group) = inner.groups.iter_mut().find(|g| g.id == id) {
        group.title = form.get("title").cloned().unwrap_or_default();
        group.address_list = form.get("addressList").cloned().unwrap_or_default();
    }
    Json(json!({"code": 200}))
}

async fn job_page_list(
    State(state): State<ConsoleState>,
    headers: HeaderMap,
    Form(form): Form<HashMap<String, String>>,
) -> Json<serde_json::Value> {
    assert!(has_session(&headers));
    let group: i64 = form
        .get("jobGroup")
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);
    let handler = form.get("executorHandler").cloned().unwrap_or_default();
    let inner = state.inner.lock().await;
    let data: Vec<serde_json::Value> = inner
        .jobs
        .iter()
        .filter(|j| j.job_group == group && j.executor_handler == handler)
        .map(|j| {
            json!({
                "id": j.id,
                "jobGroup": j.job_group,
                "jobDesc": j.job_desc,
                "scheduleConf": j.schedule_conf,
                "executorHandler": j.executor_handler,
            })
        })
        .collect();
    Json(json!({"recordsFiltered": data.len(), "data": data, "recordsTotal": data.len()}))
}

async fn job_add(
    State(state): State<ConsoleState>,
    headers: HeaderMap,
    Form(form): Form<HashMap<String, String>>,
) -> Json<serde_json::Value> {
    assert!(has_session(&headers));
    let mut inner = state.inner.lock().await;
    inner.next_id += 1;
    let record = JobRecord {
        id: inner.next_id,
        job_group: form
            .get("jobGroup")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0),
        job_desc: form.get("jobDesc").cloned().unwrap_or_default(),
        schedule_conf: form.get("scheduleConf").cloned().unwrap_or_default(),
        executor_handler: form.get("executorHandler").cloned().unwrap_or_default(),
    };
    inner.jobs.push(record);
    Json(json!({"code": 200}))
}

async fn job_update(
    State(state): State<ConsoleState>,
    headers: HeaderMap,
    Form(form): Form<HashMap<String, String>>,
) -> Json<serde_json::Value> {
    assert!(has_session(&headers));
    let id: i64 = form.get("id").and_then(|v| v.parse().ok()).unwrap_or(0);
    let mut inner = state.inner.lock().await;
    if let Some(job) = inner.jobs.iter_mut().find(|j| j.id == id) {
        job.job_desc = form.get("jobDesc").cloned().unwrap_or_default();
        job.schedule_conf = form.get("scheduleConf").cloned().unwrap_or_default();
    }
    Json(json!({"code": 200}))
}

async fn job_start(
    State(state): State<ConsoleState>,
    headers: HeaderMap,
    Form(form): Form<HashMap<String, String>>,
) -> Json<serde_json::Value> {
    assert!(has_session(&headers));
    let id: i64 = form.get("id").and_then(|v| v.parse().ok()).unwrap_or(0);
    state.inner.lock().await.started.push(id);
    Json(json!({"code": 200}))
}

async fn spawn_mock_console() -> (String, ConsoleState) {
    let state = ConsoleState::default();
    let router = Router::new()
        .route("/login", post(login))
        .route("/jobgroup/pageList", post(group_page_list))
        .route("/jobgroup/save", post(group_save))
        .route("/jobgroup/update", post(group_update))
        .route("/jobinfo/pageList", post(job_page_list))
        .route("/jobinfo/add", post(job_add))
        .route("/jobinfo/update", post(job_update))
        .route("/jobinfo/start", post(job_start))
        .with_state(state.clone());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    (format!("http://{addr}"), state)
}

#[tokio::test]
async fn test_sync_executor_group_creates_then_updates() {
    let (url, state) = spawn_mock_console().await;
    let client = WebConsoleClient::new(url.as_str(), "admin", "secret", "my-app");

    client
        .sync_executor_group("my-app", "my alias", "http://10.0.0.1:9999")
        .await
        .unwrap();
    {
        let inner = state.inner.lock().await;
        assert_eq!(inner.groups.len(), 1);
        assert_eq!(inner.groups[0].appname, "my-app");
        assert_eq!(inner.groups[0].title, "my alias");
        assert_eq!(inner.groups[0].address_list, "http://10.0.0.1:9999");
    }

    // 已是最新则不重复写
    client
        .sync_executor_group("my-app", "my alias", "http://10.0.0.1:9999")
        .await
        .unwrap();
    assert_eq!(state.inner.lock().await.groups.len(), 1);

    // 地址变化走更新而不是新建
    client
        .sync_executor_group("my-app", "my alias", "http://10.0.0.2:9999")
        .await
        .unwrap();
    {
        let inner = state.inner.lock().await;
        assert_eq!(inner.groups.len(), 1);
        assert_eq!(inner.groups[0].address_list, "http://10.0.0.2:9999");
    }
}

#[tokio::test]
async fn test_sync_job_creates_updates_and_starts() {
    let (url, state) = spawn_mock_console().await;
    let client = WebConsoleClient::new(url.as_str(), "admin", "secret", "my-app");
    client
        .sync_executor_group("my-app", "alias", "http://10.0.0.1:9999")
        .await
        .unwrap();

    client
        .sync_job("nightly cleanup", "0 0 2 * * ?", "cleanup.handler")
        .await
        .unwrap();
    {
        let inner = state.inner.lock().await;
        assert_eq!(inner.jobs.len(), 1);
        let job = &inner.jobs[0];
        assert_eq!(job.job_desc, "nightly cleanup");
        assert_eq!(job.schedule_conf, "0 0 2 * * ?");
        assert_eq!(job.executor_handler, "cleanup.handler");
        assert!(inner.started.contains(&job.id), "job must be started");
    }

    // 元数据没变则不新建也不更新
    client
        .sync_job("nightly cleanup", "0 0 2 * * ?", "cleanup.handler")
        .await
        .unwrap();
    assert_eq!(state.inner.lock().await.jobs.len(), 1);

    // cron 变化时原地更新
    client
        .sync_job("nightly cleanup", "0 30 3 * * ?", "cleanup.handler")
        .await
        .unwrap();
    {
        let inner = state.inner.lock().await;
        assert_eq!(inner.jobs.len(), 1);
        assert_eq!(inner.jobs[0].schedule_conf, "0 30 3 * * ?");
    }
}

#[tokio::test]
async fn test_sync_job_requires_executor_group() {
    let (url, _state) = spawn_mock_console().await;
    let client = WebConsoleClient::new(url.as_str(), "admin", "secret", "unknown-app");

    let result = client.sync_job("desc", "0 0 * * * ?", "some.handler").await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_session_is_established_once_and_reused() {
    let (url, state) = spawn_mock_console().await;
    let client = WebConsoleClient::new(url.as_str(), "admin", "secret", "my-app");

    client
        .sync_executor_group("my-app", "alias", "http://10.0.0.1:9999")
        .await
        .unwrap();
    client
        .sync_job("desc", "0 0 * * * ?", "h.one")
        .await
        .unwrap();

    assert_eq!(state.inner.lock().await.login_count, 1);
}
