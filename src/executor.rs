use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::callback::{CallbackReporter, CallbackSink};
use crate::config::ExecutorConfig;
use crate::console::{ConsoleClient, WebConsoleClient};
use crate::errors::{ExecutorError, ExecutorResult};
use crate::execution::ExecutionEngine;
use crate::heartbeat::RegistryClient;
use crate::logging::{InMemoryLogStore, LogProvider};
use crate::registry::{TaskHandler, TaskRegistry, TaskSpec};
use crate::server::{self, AppState};

/// 组装 Executor 的构建器：固定配置项 + 可替换的协作组件
pub struct ExecutorBuilder {
    config: ExecutorConfig,
    log_provider: Option<Arc<dyn LogProvider>>,
    console: Option<Arc<dyn ConsoleClient>>,
    callback: Option<Arc<dyn CallbackSink>>,
}

impl ExecutorBuilder {
    pub fn new() -> Self {
        Self {
            config: ExecutorConfig::default(),
            log_provider: None,
            console: None,
            callback: None,
        }
    }

    pub fn admin_url<S: Into<String>>(mut self, admin_url: S) -> Self {
        self.config.admin_url = admin_url.into();
        self
    }

    pub fn access_token<S: Into<String>>(mut self, access_token: S) -> Self {
        self.config.access_token = access_token.into();
        self
    }

    pub fn bind_address<S: Into<String>>(mut self, bind_address: S) -> Self {
        self.config.bind_address = bind_address.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    pub fn advertised_address<S: Into<String>>(mut self, advertised_address: S) -> Self {
        self.config.advertised_address = Some(advertised_address.into());
        self
    }

    pub fn app_name<S: Into<String>>(mut self, app_name: S) -> Self {
        self.config.app_name = app_name.into();
        self
    }

    pub fn alias<S: Into<String>>(mut self, alias: S) -> Self {
        self.config.alias = alias.into();
        self
    }

    pub fn heartbeat_interval(mut self, heartbeat_interval: Duration) -> Self {
        self.config.heartbeat_interval = heartbeat_interval;
        self
    }

    pub fn shutdown_grace(mut self, shutdown_grace: Duration) -> Self {
        self.config.shutdown_grace = shutdown_grace;
        self
    }

    /// 配置控制台账号后，启动时会同步执行器分组与任务记录
    pub fn console_credentials<U: Into<String>, P: Into<String>>(
        mut self,
        username: U,
        password: P,
    ) -> Self {
        self.config.console_username = username.into();
        self.config.console_password = Some(password.into());
        self
    }

    /// 整体替换日志查询实现
    pub fn log_provider(mut self, provider: Arc<dyn LogProvider>) -> Self {
        self.log_provider = Some(provider);
        self
    }

    /// 替换控制台客户端（测试或自定义控制台）
    pub fn console_client(mut self, console: Arc<dyn ConsoleClient>) -> Self {
        self.console = Some(console);
        self
    }

    /// 替换回调出口；测试用它观察完成事件
    pub fn callback_sink(mut self, callback: Arc<dyn CallbackSink>) -> Self {
        self.callback = Some(callback);
        self
    }

    pub fn build(self) -> ExecutorResult<Executor> {
        self.config.validate()?;

        let registry = Arc::new(TaskRegistry::new());
        let log_store = Arc::new(InMemoryLogStore::new());
        let callback = self.callback.unwrap_or_else(|| {
            Arc::new(CallbackReporter::new(
                self.config.admin_base(),
                self.config.access_token.clone(),
            ))
        });
        let engine = Arc::new(ExecutionEngine::new(
            Arc::clone(&registry),
            Arc::clone(&log_store),
            Arc::clone(&callback),
        ));
        let log_provider = self
            .log_provider
            .unwrap_or_else(|| Arc::clone(&log_store) as Arc<dyn LogProvider>);
        let console = self.console.or_else(|| {
            self.config.console_password.as_ref().map(|password| {
                Arc::new(WebConsoleClient::new(
                    self.config.admin_base(),
                    self.config.console_username.clone(),
                    password.clone(),
                    self.config.app_name.clone(),
                )) as Arc<dyn ConsoleClient>
            })
        });

        Ok(Executor {
            config: self.config,
            registry,
            engine,
            log_provider,
            console,
            shutdown: CancellationToken::new(),
            is_running: RwLock::new(false),
            heartbeat_handle: Mutex::new(None),
        })
    }
}

impl Default for ExecutorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// 执行器门面：协议服务端 + 执行引擎 + 注册心跳 + 结果回报的生命周期管理。
/// 所有状态都在实例内部，同一进程可以并存多个执行器
pub struct Executor {
    config: ExecutorConfig,
    registry: Arc<TaskRegistry>,
    engine: Arc<ExecutionEngine>,
    log_provider: Arc<dyn LogProvider>,
    console: Option<Arc<dyn ConsoleClient>>,
    shutdown: CancellationToken,
    is_running: RwLock<bool>,
    heartbeat_handle: Mutex<Option<JoinHandle<()>>>,
}

impl Executor {
    pub fn builder() -> ExecutorBuilder {
        ExecutorBuilder::new()
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    pub fn engine(&self) -> Arc<ExecutionEngine> {
        Arc::clone(&self.engine)
    }

    /// 注册任务 handler，启动前完成全部注册
    pub async fn register_task<N, D, C>(
        &self,
        name: N,
        description: D,
        cron: C,
        handler: Arc<dyn TaskHandler>,
    ) where
        N: Into<String>,
        D: Into<String>,
        C: Into<String>,
    {
        self.registry
            .register(TaskSpec {
                name: name.into(),
                description: description.into(),
                cron: cron.into(),
                handler,
            })
            .await;
    }

    /// 启动执行器并返回实际监听地址。绑定监听失败是唯一的致命错误；
    /// 控制台同步在开始服务之前做一次，之后只剩周期心跳
    pub async fn start(&self) -> ExecutorResult<SocketAddr> {
        let mut is_running = self.is_running.write().await;
        if *is_running {
            return Err(ExecutorError::Internal(
                "executor is already running".to_string(),
            ));
        }

        let listener = TcpListener::bind((self.config.bind_address.as_str(), self.config.port))
            .await
            .map_err(|e| {
                ExecutorError::config_error(format!(
                    "cannot bind {}:{}: {e}",
                    self.config.bind_address, self.config.port
                ))
            })?;
        let addr = listener
            .local_addr()
            .map_err(|e| ExecutorError::Internal(format!("listener has no local addr: {e}")))?;
        let advertised = self
            .config
            .advertised_address
            .clone()
            .unwrap_or_else(|| default_advertised(&self.config.bind_address, addr.port()));

        // 启动期一次性同步，失败不阻断启动
        if let Some(ref console) = self.console {
            if let Err(e) = console
                .sync_executor_group(&self.config.app_name, &self.config.alias, &advertised)
                .await
            {
                warn!("executor group sync failed, continuing startup: {}", e);
            }
            for spec in self.registry.list().await {
                if let Err(e) = console
                    .sync_job(&spec.description, &spec.cron, &spec.name)
                    .await
                {
                    warn!("job sync failed for handler {}: {}", spec.name, e);
                }
            }
        }

        let registry_client = Arc::new(RegistryClient::new(
            self.config.admin_base(),
            self.config.access_token.clone(),
            self.config.app_name.clone(),
            advertised.clone(),
            self.config.heartbeat_interval,
        ));
        let heartbeat = registry_client.spawn(self.shutdown.clone());
        {
            let mut handle = self.heartbeat_handle.lock().await;
            *handle = Some(heartbeat);
        }

        let state = AppState {
            engine: Arc::clone(&self.engine),
            log_provider: Arc::clone(&self.log_provider),
            access_token: self.config.access_token.clone(),
        };
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = server::serve(state, listener, shutdown).await {
                error!("protocol server terminated: {}", e);
            }
        });

        *is_running = true;
        info!(
            "executor {} started on {} (advertised as {})",
            self.config.app_name, addr, advertised
        );
        Ok(addr)
    }

    /// 前台运行直至收到 ctrl-c
    pub async fn run(&self) -> ExecutorResult<()> {
        self.start().await?;
        tokio::signal::ctrl_c()
            .await
            .map_err(|e| ExecutorError::Internal(format!("failed to listen for ctrl-c: {e}")))?;
        info!("shutdown signal received");
        self.stop().await
    }

    /// 停机：先停收新触发，再取消在运行任务并在宽限期内等待退出。
    /// 注销心跳是尽力而为
    pub async fn stop(&self) -> ExecutorResult<()> {
        let mut is_running = self.is_running.write().await;
        if !*is_running {
            return Ok(());
        }

        info!("stopping executor {}", self.config.app_name);
        self.shutdown.cancel();
        self.engine.shutdown(self.config.shutdown_grace).await;

        // 等心跳任务发完注销再退出，但不无限等
        let handle = { self.heartbeat_handle.lock().await.take() };
        if let Some(handle) = handle {
            if tokio::time::timeout(Duration::from_secs(5), handle)
                .await
                .is_err()
            {
                warn!("heartbeat task did not stop within 5s");
            }
        }

        *is_running = false;
        info!("executor {} stopped", self.config.app_name);
        Ok(())
    }

    pub async fn is_running(&self) -> bool {
        *self.is_running.read().await
    }
}

fn default_advertised(bind_address: &str, port: u16) -> String {
    let host = match bind_address {
        "0.0.0.0" | "::" | "[::]" => "127.0.0.1",
        other => other,
    };
    format!("http://{host}:{port}")
}
