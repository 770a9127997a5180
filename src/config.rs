use std::time::Duration;

use crate::errors::{ExecutorError, ExecutorResult};

/// 执行器的全部配置项，构造时一次性给定，运行期不再变更
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// 调度中心根地址，例如 http://localhost:8080/scheduler-admin
    pub admin_url: String,
    /// 共享访问令牌，空串表示不校验
    pub access_token: String,
    /// 本地监听地址
    pub bind_address: String,
    /// 本地监听端口，0 表示随机端口
    pub port: u16,
    /// 对外公布的回调地址（http://host:port），缺省时由监听地址推导
    pub advertised_address: Option<String>,
    /// 执行器注册 key（调度中心里的 appname）
    pub app_name: String,
    /// 执行器展示名
    pub alias: String,
    /// 心跳上报间隔
    pub heartbeat_interval: Duration,
    /// 停机时等待任务退出的宽限期
    pub shutdown_grace: Duration,
    /// 管理控制台账号，仅用于启动期的元数据同步
    pub console_username: String,
    /// 为空则跳过控制台同步
    pub console_password: Option<String>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            admin_url: String::new(),
            access_token: String::new(),
            bind_address: "0.0.0.0".to_string(),
            port: 9999,
            advertised_address: None,
            app_name: String::new(),
            alias: String::new(),
            heartbeat_interval: Duration::from_secs(30),
            shutdown_grace: Duration::from_secs(30),
            console_username: "admin".to_string(),
            console_password: None,
        }
    }
}

impl ExecutorConfig {
    pub fn validate(&self) -> ExecutorResult<()> {
        if self.admin_url.is_empty() {
            return Err(ExecutorError::config_error("admin_url is required"));
        }
        if !self.admin_url.starts_with("http://") && !self.admin_url.starts_with("https://") {
            return Err(ExecutorError::config_error(format!(
                "admin_url must be an http(s) URL: {}",
                self.admin_url
            )));
        }
        if self.app_name.is_empty() {
            return Err(ExecutorError::config_error("app_name is required"));
        }
        if self.bind_address.is_empty() {
            return Err(ExecutorError::config_error("bind_address is required"));
        }
        if let Some(ref addr) = self.advertised_address {
            if !addr.starts_with("http://") && !addr.starts_with("https://") {
                return Err(ExecutorError::config_error(format!(
                    "advertised_address must be an http(s) URL: {addr}"
                )));
            }
        }
        Ok(())
    }

    /// 去掉尾部斜杠的调度中心地址，便于拼接 API 路径
    pub fn admin_base(&self) -> &str {
        self.admin_url.trim_end_matches('/')
    }
}
