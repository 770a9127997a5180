use async_trait::async_trait;
use reqwest::header::{COOKIE, SET_COOKIE};
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::entities::ApiResponse;
use crate::errors::{ExecutorError, ExecutorResult};

/// 启动期元数据同步的边界接口：执行器核心只依赖这个 trait，
/// 不关心控制台的具体交互方式。只在启动时逐个 handler 调用，
/// 永远不在请求处理热路径上
#[async_trait]
pub trait ConsoleClient: Send + Sync {
    async fn sync_executor_group(
        &self,
        app_key: &str,
        alias: &str,
        address_list: &str,
    ) -> ExecutorResult<()>;

    async fn sync_job(
        &self,
        description: &str,
        cron: &str,
        handler_name: &str,
    ) -> ExecutorResult<()>;
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ConsoleGroup {
    #[serde(default)]
    id: i64,
    #[serde(default)]
    appname: String,
    #[serde(default)]
    title: String,
    #[serde(rename = "addressList", default)]
    address_list: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ConsoleJob {
    #[serde(default)]
    id: i64,
    #[serde(rename = "jobGroup", default)]
    job_group: i64,
    #[serde(rename = "jobDesc", default)]
    job_desc: String,
    #[serde(rename = "scheduleConf", default)]
    schedule_conf: String,
    #[serde(rename = "executorHandler", default)]
    executor_handler: String,
}

#[derive(Debug, Deserialize)]
struct PageList<T> {
    #[serde(default)]
    data: Vec<T>,
}

/// 默认实现：用会话登录驱动调度中心 web 控制台的表单接口，
/// 自动建好/更新执行器分组和任务记录
pub struct WebConsoleClient {
    console_url: String,
    username: String,
    password: String,
    /// sync_job 查找任务时要先定位本执行器的分组
    app_key: String,
    session: RwLock<Option<String>>,
    client: reqwest::Client,
}

impl WebConsoleClient {
    pub fn new<U, N, P, K>(console_url: U, username: N, password: P, app_key: K) -> Self
    where
        U: Into<String>,
        N: Into<String>,
        P: Into<String>,
        K: Into<String>,
    {
        Self {
            console_url: console_url.into().trim_end_matches('/').to_string(),
            username: username.into(),
            password: password.into(),
            app_key: app_key.into(),
            session: RwLock::new(None),
            client: reqwest::Client::new(),
        }
    }

    async fn login(&self) -> ExecutorResult<String> {
        let url = format!("{}/login", self.console_url);
        let response = self
            .client
            .post(&url)
            .form(&[
                ("userName", self.username.as_str()),
                ("password", self.password.as_str()),
            ])
            .send()
            .await
            .map_err(|e| ExecutorError::network_error(format!("console login failed: {e}")))?;

        let cookie = response
            .headers()
            .get(SET_COOKIE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string())
            .ok_or_else(|| {
                ExecutorError::network_error("console login did not return a session cookie")
            })?;

        let mut session = self.session.write().await;
        *session = Some(cookie.clone());
        debug!("console session established for {}", self.username);
        Ok(cookie)
    }

    async fn ensure_session(&self) -> ExecutorResult<String> {
        {
            let session = self.session.read().await;
            if let Some(ref cookie) = *session {
                return Ok(cookie.clone());
            }
        }
        self.login().await
    }

    async fn post_form(
        &self,
        path: &str,
        form: &[(&str, String)],
    ) -> ExecutorResult<reqwest::Response> {
        let cookie = self.ensure_session().await?;
        let url = format!("{}{}", self.console_url, path);
        let response = self
            .client
            .post(&url)
            .header(COOKIE, cookie)
            .form(form)
            .send()
            .await
            .map_err(|e| ExecutorError::network_error(format!("console call {path} failed: {e}")))?;
        Ok(response)
    }

    /// 表单写接口统一返回 {code, msg}
    async fn post_form_checked(&self, path: &str, form: &[(&str, String)]) -> ExecutorResult<()> {
        let response = self.post_form(path, form).await?;
        let body: ApiResponse<serde_json::Value> = response.json().await?;
        if body.is_success() {
            Ok(())
        } else {
            Err(ExecutorError::network_error(format!(
                "console call {path} rejected: code={}, msg={}",
                body.code,
                body.msg.unwrap_or_default()
            )))
        }
    }

    async fn fetch_group(&self, app_key: &str) -> ExecutorResult<Option<ConsoleGroup>> {
        let response = self
            .post_form("/jobgroup/pageList", &[("appname", app_key.to_string())])
            .await?;
        let page: PageList<ConsoleGroup> = response.json().await?;
        Ok(page.data.into_iter().find(|g| g.appname == app_key))
    }

    async fn fetch_job(&self, group_id: i64, handler_name: &str) -> ExecutorResult<Option<ConsoleJob>> {
        let response = self
            .post_form(
                "/jobinfo/pageList",
                &[
                    ("jobGroup", group_id.to_string()),
                    ("executorHandler", handler_name.to_string()),
                    ("triggerStatus", "-1".to_string()),
                ],
            )
            .await?;
        let page: PageList<ConsoleJob> = response.json().await?;
        Ok(page
            .data
            .into_iter()
            .find(|j| j.job_group == group_id && j.executor_handler.trim() == handler_name))
    }

    fn job_form(
        &self,
        group_id: i64,
        description: &str,
        cron: &str,
        handler_name: &str,
    ) -> Vec<(&'static str, String)> {
        vec![
            ("jobGroup", group_id.to_string()),
            ("jobDesc", description.to_string()),
            ("author", self.username.clone()),
            ("scheduleType", "CRON".to_string()),
            // cron 表达式只透传，不在执行器侧解析
            ("scheduleConf", cron.to_string()),
            ("cronGen_display", cron.to_string()),
            ("glueType", "BEAN".to_string()),
            ("executorHandler", handler_name.to_string()),
            ("executorRouteStrategy", "FIRST".to_string()),
            ("misfireStrategy", "DO_NOTHING".to_string()),
            ("executorBlockStrategy", "SERIAL_EXECUTION".to_string()),
            ("executorTimeout", "0".to_string()),
            ("executorFailRetryCount", "0".to_string()),
        ]
    }

    async fn start_job(&self, job_id: i64) -> ExecutorResult<()> {
        self.post_form_checked("/jobinfo/start", &[("id", job_id.to_string())])
            .await
    }
}

#[async_trait]
impl ConsoleClient for WebConsoleClient {
    async fn sync_executor_group(
        &self,
        app_key: &str,
        alias: &str,
        address_list: &str,
    ) -> ExecutorResult<()> {
        let form = |id: Option<i64>| {
            let mut form = vec![
                ("appname", app_key.to_string()),
                ("title", alias.to_string()),
                // 手动录入地址模式
                ("addressType", "1".to_string()),
                ("addressList", address_list.to_string()),
            ];
            if let Some(id) = id {
                form.push(("id", id.to_string()));
            }
            form
        };

        match self.fetch_group(app_key).await? {
            None => {
                info!("console: creating executor group {}", app_key);
                self.post_form_checked("/jobgroup/save", &form(None)).await
            }
            Some(group) if group.address_list != address_list || group.title != alias => {
                info!("console: updating executor group {}", app_key);
                self.post_form_checked("/jobgroup/update", &form(Some(group.id)))
                    .await
            }
            Some(_) => {
                debug!("console: executor group {} already up to date", app_key);
                Ok(())
            }
        }
    }

    async fn sync_job(
        &self,
        description: &str,
        cron: &str,
        handler_name: &str,
    ) -> ExecutorResult<()> {
        let group = self.fetch_group(&self.app_key).await?.ok_or_else(|| {
            ExecutorError::network_error(format!(
                "executor group {} not found in console",
                self.app_key
            ))
        })?;
        if group.id == 0 {
            return Err(ExecutorError::network_error(format!(
                "console returned executor group {} without id",
                self.app_key
            )));
        }

        match self.fetch_job(group.id, handler_name).await? {
            None => {
                info!("console: creating job record for handler {}", handler_name);
                self.post_form_checked(
                    "/jobinfo/add",
                    &self.job_form(group.id, description, cron, handler_name),
                )
                .await?;
            }
            Some(job) if job.job_desc != description || job.schedule_conf != cron => {
                info!("console: updating job record for handler {}", handler_name);
                let mut form = self.job_form(group.id, description, cron, handler_name);
                form.push(("id", job.id.to_string()));
                self.post_form_checked("/jobinfo/update", &form).await?;
            }
            Some(_) => {
                debug!("console: job record for {} already up to date", handler_name);
            }
        }

        // 确保任务处于启用状态；重复启动由控制台幂等处理
        if let Some(job) = self.fetch_job(group.id, handler_name).await? {
            self.start_job(job.id).await?;
        }
        Ok(())
    }
}
