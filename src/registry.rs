use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::errors::ExecutorResult;
use crate::logging::JobLogWriter;

/// 一次任务调用的上下文：参数、取消信号和日志句柄
pub struct TaskContext {
    pub job_id: i64,
    pub log_id: i64,
    /// 调度中心透传的参数串，内容由 handler 自行解释
    pub params: String,
    pub cancellation: CancellationToken,
    log: JobLogWriter,
}

impl TaskContext {
    pub(crate) fn new(
        job_id: i64,
        log_id: i64,
        params: String,
        cancellation: CancellationToken,
        log: JobLogWriter,
    ) -> Self {
        Self {
            job_id,
            log_id,
            params,
            cancellation,
            log,
        }
    }

    /// 取消是协作式的：handler 应在耗时循环里主动检查
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    pub async fn cancelled(&self) {
        self.cancellation.cancelled().await;
    }

    /// 写一行任务日志，调度中心可通过 log 接口查询
    pub async fn log<S: Into<String>>(&self, line: S) {
        self.log.append(line).await;
    }
}

/// 可被调度中心按名字触发的执行单元
#[async_trait]
pub trait TaskHandler: Send + Sync {
    /// 返回 Ok(msg) 作为成功回执，Err 作为失败回执；
    /// 不配合取消信号的 handler 无法被强制终止
    async fn execute(&self, ctx: TaskContext) -> ExecutorResult<String>;
}

struct FnHandler<F> {
    f: F,
}

#[async_trait]
impl<F, Fut> TaskHandler for FnHandler<F>
where
    F: Fn(TaskContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ExecutorResult<String>> + Send + 'static,
{
    async fn execute(&self, ctx: TaskContext) -> ExecutorResult<String> {
        (self.f)(ctx).await
    }
}

/// 把异步闭包包装成 TaskHandler
pub fn task_fn<F, Fut>(f: F) -> Arc<dyn TaskHandler>
where
    F: Fn(TaskContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ExecutorResult<String>> + Send + 'static,
{
    Arc::new(FnHandler { f })
}

/// 注册信息：名字在启动期固定，cron 表达式只透传给调度中心
pub struct TaskSpec {
    pub name: String,
    pub description: String,
    pub cron: String,
    pub handler: Arc<dyn TaskHandler>,
}

/// handler 名字 -> 任务的静态映射，启动装配后只读
pub struct TaskRegistry {
    tasks: RwLock<HashMap<String, Arc<TaskSpec>>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self {
            tasks: RwLock::new(HashMap::new()),
        }
    }

    /// 注册或替换同名任务（后注册的生效）
    pub async fn register(&self, spec: TaskSpec) {
        info!("registering task handler: {}", spec.name);
        let mut tasks = self.tasks.write().await;
        tasks.insert(spec.name.clone(), Arc::new(spec));
    }

    pub async fn get(&self, name: &str) -> Option<Arc<TaskSpec>> {
        let tasks = self.tasks.read().await;
        tasks.get(name).cloned()
    }

    pub async fn contains(&self, name: &str) -> bool {
        let tasks = self.tasks.read().await;
        tasks.contains_key(name)
    }

    pub async fn list(&self) -> Vec<Arc<TaskSpec>> {
        let tasks = self.tasks.read().await;
        tasks.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        let tasks = self.tasks.read().await;
        tasks.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self::new()
    }
}
