use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::entities::{ApiResponse, RegistryParam, ACCESS_TOKEN_HEADER};
use crate::errors::{ExecutorError, ExecutorResult};

/// 周期性向调度中心注册表上报本执行器地址。
/// 固定间隔本身就是重试策略：单次失败记日志，下一个 tick 自然重试
pub struct RegistryClient {
    admin_url: String,
    access_token: String,
    registry_key: String,
    registry_value: String,
    heartbeat_interval: Duration,
    client: reqwest::Client,
}

impl RegistryClient {
    pub fn new<U, T, K, V>(
        admin_url: U,
        access_token: T,
        registry_key: K,
        registry_value: V,
        heartbeat_interval: Duration,
    ) -> Self
    where
        U: Into<String>,
        T: Into<String>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            admin_url: admin_url.into().trim_end_matches('/').to_string(),
            access_token: access_token.into(),
            registry_key: registry_key.into(),
            registry_value: registry_value.into(),
            heartbeat_interval,
            client: reqwest::Client::new(),
        }
    }

    /// 上报一次 {registryKey, registryValue}
    pub async fn register_once(&self) -> ExecutorResult<()> {
        self.post_registry("/api/registry").await?;
        debug!(
            "registry heartbeat ok: key={}, value={}",
            self.registry_key, self.registry_value
        );
        Ok(())
    }

    /// 停机时的注销是尽力而为，失败只警告
    pub async fn remove(&self) {
        match self.post_registry("/api/registryRemove").await {
            Ok(()) => info!("executor {} deregistered from admin", self.registry_key),
            Err(e) => warn!("executor deregistration failed (ignored): {}", e),
        }
    }

    async fn post_registry(&self, path: &str) -> ExecutorResult<()> {
        let url = format!("{}{}", self.admin_url, path);
        let param = RegistryParam::executor(&self.registry_key, &self.registry_value);
        let mut request = self.client.post(&url).json(&param);
        if !self.access_token.is_empty() {
            request = request.header(ACCESS_TOKEN_HEADER, &self.access_token);
        }

        match request.send().await {
            Ok(response) if response.status().is_success() => {
                let body: ApiResponse<serde_json::Value> = response.json().await?;
                if body.is_success() {
                    Ok(())
                } else {
                    Err(ExecutorError::network_error(format!(
                        "admin rejected registry call: code={}, msg={}",
                        body.code,
                        body.msg.unwrap_or_default()
                    )))
                }
            }
            Ok(response) => Err(ExecutorError::network_error(format!(
                "registry call failed: HTTP {} from {}",
                response.status(),
                url
            ))),
            Err(e) => Err(ExecutorError::network_error(format!(
                "registry connection error: {e}"
            ))),
        }
    }

    /// 启动心跳循环。第一个 tick 立即触发，让调度中心尽快看到本节点
    pub fn spawn(self: Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut tick = interval(self.heartbeat_interval);
            loop {
                tokio::select! {
                    _ = tick.tick() => {
                        if let Err(e) = self.register_once().await {
                            warn!("registry heartbeat failed, will retry next tick: {}", e);
                        }
                    }
                    _ = shutdown.cancelled() => {
                        info!("registry heartbeat shutting down");
                        self.remove().await;
                        break;
                    }
                }
            }
        })
    }
}
