use axum::{response::IntoResponse, Json};
use serde::{Deserialize, Serialize};

/// 调度中心协议的成功/失败码
pub const SUCCESS_CODE: i32 = 200;
pub const FAILURE_CODE: i32 = 500;

/// 共享令牌请求头，所有入站与出站调用都携带
pub const ACCESS_TOKEN_HEADER: &str = "X-Access-Token";

/// 协议信封：入站响应与调度中心的应答都是 {code, msg, content}
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub code: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msg: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn success(content: T) -> Self {
        Self {
            code: SUCCESS_CODE,
            msg: None,
            content: Some(content),
        }
    }
    pub fn fail<S: Into<String>>(msg: S) -> Self {
        Self {
            code: FAILURE_CODE,
            msg: Some(msg.into()),
            content: None,
        }
    }
    pub fn is_success(&self) -> bool {
        self.code == SUCCESS_CODE
    }
}

impl ApiResponse<()> {
    pub fn success_empty() -> Self {
        Self {
            code: SUCCESS_CODE,
            msg: None,
            content: None,
        }
    }
}

impl<T> IntoResponse for ApiResponse<T>
where
    T: Serialize,
{
    fn into_response(self) -> axum::response::Response {
        Json(self).into_response()
    }
}

/// 同一 jobId 并发触发时的阻塞处理策略
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum BlockStrategy {
    #[default]
    #[serde(rename = "SERIAL_EXECUTION")]
    SerialExecution,
    #[serde(rename = "DISCARD_LATER")]
    DiscardLater,
    #[serde(rename = "COVER_EARLY")]
    CoverEarly,
}

/// 调度中心下发的触发请求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRequest {
    #[serde(rename = "jobId")]
    pub job_id: i64,
    #[serde(rename = "logId")]
    pub log_id: i64,
    /// 触发时刻（毫秒），原样回传给回调接口
    #[serde(rename = "logDateTime", default)]
    pub log_date_time: i64,
    #[serde(rename = "executorHandler")]
    pub executor_handler: String,
    #[serde(rename = "executorParams", default)]
    pub executor_params: String,
    #[serde(rename = "executorBlockStrategy", default)]
    pub executor_block_strategy: BlockStrategy,
    /// 秒，0 表示不限时
    #[serde(rename = "executorTimeout", default)]
    pub executor_timeout: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KillRequest {
    #[serde(rename = "jobId")]
    pub job_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdleBeatRequest {
    #[serde(rename = "jobId")]
    pub job_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogRequest {
    #[serde(rename = "logId")]
    pub log_id: i64,
    /// 起始行号，从 1 开始
    #[serde(rename = "fromLineNum")]
    pub from_line_num: i32,
    #[serde(rename = "logDateTime", default)]
    pub log_date_time: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct LogResult {
    #[serde(rename = "fromLineNum")]
    pub from_line_num: i32,
    #[serde(rename = "toLineNum")]
    pub to_line_num: i32,
    #[serde(rename = "logContent")]
    pub log_content: String,
    #[serde(rename = "isEnd")]
    pub is_end: bool,
}

/// 任务完成后回报给调度中心的结果
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CallbackParam {
    #[serde(rename = "logId")]
    pub log_id: i64,
    #[serde(rename = "jobId")]
    pub job_id: i64,
    #[serde(rename = "logDateTime", default)]
    pub log_date_time: i64,
    #[serde(rename = "handleCode")]
    pub handle_code: i32,
    #[serde(rename = "handleMsg")]
    pub handle_msg: String,
}

/// 注册/心跳上报体
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryParam {
    #[serde(rename = "registryGroup")]
    pub registry_group: String,
    #[serde(rename = "registryKey")]
    pub registry_key: String,
    #[serde(rename = "registryValue")]
    pub registry_value: String,
}

impl RegistryParam {
    pub fn executor<K: Into<String>, V: Into<String>>(key: K, value: V) -> Self {
        Self {
            registry_group: "EXECUTOR".to_string(),
            registry_key: key.into(),
            registry_value: value.into(),
        }
    }
}
