use async_trait::async_trait;
use tracing::debug;

use crate::entities::{ApiResponse, CallbackParam, ACCESS_TOKEN_HEADER};
use crate::errors::{ExecutorError, ExecutorResult};

/// 执行结果的上报出口；测试可注入自己的实现观察完成事件
#[async_trait]
pub trait CallbackSink: Send + Sync {
    async fn report(&self, param: CallbackParam) -> ExecutorResult<()>;
}

/// 默认实现：把结果回传调度中心的 callback 接口。
/// 只尝试一次，失败由调用方记日志后丢弃，过期的结果重发也没有意义
pub struct CallbackReporter {
    admin_url: String,
    access_token: String,
    client: reqwest::Client,
}

impl CallbackReporter {
    pub fn new<U: Into<String>, T: Into<String>>(admin_url: U, access_token: T) -> Self {
        Self {
            admin_url: admin_url.into().trim_end_matches('/').to_string(),
            access_token: access_token.into(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl CallbackSink for CallbackReporter {
    async fn report(&self, param: CallbackParam) -> ExecutorResult<()> {
        let url = format!("{}/api/callback", self.admin_url);
        // 协议约定 body 是结果数组
        let mut request = self.client.post(&url).json(&vec![&param]);
        if !self.access_token.is_empty() {
            request = request.header(ACCESS_TOKEN_HEADER, &self.access_token);
        }

        match request.send().await {
            Ok(response) if response.status().is_success() => {
                let body: ApiResponse<serde_json::Value> = response.json().await?;
                if body.is_success() {
                    debug!(
                        "callback delivered: job_id={}, log_id={}, handle_code={}",
                        param.job_id, param.log_id, param.handle_code
                    );
                    Ok(())
                } else {
                    Err(ExecutorError::network_error(format!(
                        "callback rejected by admin: code={}, msg={}",
                        body.code,
                        body.msg.unwrap_or_default()
                    )))
                }
            }
            Ok(response) => Err(ExecutorError::network_error(format!(
                "callback failed: HTTP {} from {}",
                response.status(),
                url
            ))),
            Err(e) => Err(ExecutorError::network_error(format!(
                "callback connection error: {e}"
            ))),
        }
    }
}
