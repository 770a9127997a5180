use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("handler not found: {name}")]
    HandlerNotFound { name: String },
    #[error("job {job_id} is already running, request discarded")]
    AdmissionRejected { job_id: i64 },
    #[error("execution timeout after {timeout_seconds}s")]
    ExecutionTimeout { timeout_seconds: i64 },
    #[error("task execution failed: {0}")]
    TaskExecution(String),
    #[error("access token missing or mismatched")]
    AuthFailed,
    #[error("network error: {0}")]
    Network(String),
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("internal error: {0}")]
    Internal(String),
}

pub type ExecutorResult<T> = Result<T, ExecutorError>;

impl ExecutorError {
    pub fn handler_not_found<S: Into<String>>(name: S) -> Self {
        Self::HandlerNotFound { name: name.into() }
    }
    pub fn config_error<S: Into<String>>(msg: S) -> Self {
        Self::Configuration(msg.into())
    }
    pub fn network_error<S: Into<String>>(msg: S) -> Self {
        Self::Network(msg.into())
    }
    /// 只有配置/绑定失败会让进程退出，任务级错误都被隔离上报
    pub fn is_fatal(&self) -> bool {
        matches!(self, ExecutorError::Configuration(_))
    }
}

impl From<reqwest::Error> for ExecutorError {
    fn from(err: reqwest::Error) -> Self {
        ExecutorError::Network(err.to_string())
    }
}

impl From<serde_json::Error> for ExecutorError {
    fn from(err: serde_json::Error) -> Self {
        ExecutorError::Serialization(err.to_string())
    }
}

impl From<anyhow::Error> for ExecutorError {
    fn from(err: anyhow::Error) -> Self {
        ExecutorError::Internal(err.to_string())
    }
}
