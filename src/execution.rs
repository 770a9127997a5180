use std::collections::hash_map::Entry;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::callback::CallbackSink;
use crate::entities::{BlockStrategy, CallbackParam, RunRequest, FAILURE_CODE, SUCCESS_CODE};
use crate::errors::{ExecutorError, ExecutorResult};
use crate::logging::InMemoryLogStore;
use crate::registry::{TaskContext, TaskRegistry, TaskSpec};

/// 正在执行的一次触发。同一 jobId 任意时刻至多一个
/// （COVER_EARLY 的换代窗口除外）
#[derive(Clone)]
pub struct RunningTask {
    pub job_id: i64,
    pub log_id: i64,
    pub log_date_time: i64,
    /// 全局单调递增，用来区分同一 jobId 先后几代执行
    pub generation: u64,
    pub handler: String,
    pub started_at: DateTime<Utc>,
    cancel: CancellationToken,
}

struct QueuedRun {
    req: RunRequest,
    spec: Arc<TaskSpec>,
}

struct JobSlot {
    current: RunningTask,
    /// SERIAL_EXECUTION 策略下等待的触发，严格 FIFO
    queue: VecDeque<QueuedRun>,
}

impl JobSlot {
    fn new(current: RunningTask) -> Self {
        Self {
            current,
            queue: VecDeque::new(),
        }
    }
}

enum Outcome {
    Success(String),
    Failed(String),
    Timeout(i64),
    Cancelled,
}

/// 准入/并发控制核心：jobId -> 在运行任务 的映射是唯一共享可变状态，
/// 锁内只做 O(1) 的映射操作，handler 永远在锁外执行
pub struct ExecutionEngine {
    registry: Arc<TaskRegistry>,
    log_store: Arc<InMemoryLogStore>,
    callback: Arc<dyn CallbackSink>,
    slots: Arc<Mutex<HashMap<i64, JobSlot>>>,
    generation: Arc<AtomicU64>,
    shutdown: CancellationToken,
}

impl ExecutionEngine {
    pub fn new(
        registry: Arc<TaskRegistry>,
        log_store: Arc<InMemoryLogStore>,
        callback: Arc<dyn CallbackSink>,
    ) -> Self {
        Self {
            registry,
            log_store,
            callback,
            slots: Arc::new(Mutex::new(HashMap::new())),
            generation: Arc::new(AtomicU64::new(0)),
            shutdown: CancellationToken::new(),
        }
    }

    /// 准入决策。返回 Ok 表示已接受（立即执行或已入队），
    /// 完成结果只能通过回调出口观察，不会在这里等待
    pub async fn submit(&self, req: RunRequest) -> ExecutorResult<()> {
        let spec = self
            .registry
            .get(&req.executor_handler)
            .await
            .ok_or_else(|| ExecutorError::handler_not_found(&req.executor_handler))?;

        let mut slots = self.slots.lock().await;
        match slots.entry(req.job_id) {
            Entry::Vacant(entry) => {
                let task = self.new_running_task(&req);
                entry.insert(JobSlot::new(task.clone()));
                info!(
                    "job {} admitted: handler={}, log_id={}, generation={}",
                    req.job_id, req.executor_handler, req.log_id, task.generation
                );
                self.spawn_invocation(task, req, spec);
            }
            Entry::Occupied(mut entry) => match req.executor_block_strategy {
                BlockStrategy::SerialExecution => {
                    debug!(
                        "job {} busy, queueing trigger log_id={} (serial)",
                        req.job_id, req.log_id
                    );
                    entry.get_mut().queue.push_back(QueuedRun { req, spec });
                }
                BlockStrategy::DiscardLater => {
                    debug!(
                        "job {} busy, discarding trigger log_id={}",
                        req.job_id, req.log_id
                    );
                    return Err(ExecutorError::AdmissionRejected { job_id: req.job_id });
                }
                BlockStrategy::CoverEarly => {
                    let task = self.new_running_task(&req);
                    let old = std::mem::replace(&mut entry.get_mut().current, task.clone());
                    old.cancel.cancel();
                    info!(
                        "job {} covered: generation {} superseded by {}",
                        req.job_id, old.generation, task.generation
                    );
                    self.spawn_invocation(task, req, spec);
                }
            },
        }
        Ok(())
    }

    /// 取消指定 job。没有在运行的任务时也是成功（幂等），
    /// 因为调度中心的 kill 可能和自然完成赛跑
    pub async fn kill(&self, job_id: i64) -> ExecutorResult<()> {
        let removed = { self.slots.lock().await.remove(&job_id) };
        let Some(slot) = removed else {
            debug!("kill job {}: not running, nothing to do", job_id);
            return Ok(());
        };

        info!(
            "killing job {} (generation {}, {} queued)",
            job_id,
            slot.current.generation,
            slot.queue.len()
        );
        slot.current.cancel.cancel();

        // 队列里已被接受的触发也要逐一回执
        for queued in slot.queue {
            self.log_store
                .append(queued.req.log_id, "job killed before execution")
                .await;
            self.log_store.finish(queued.req.log_id).await;
            let param = CallbackParam {
                log_id: queued.req.log_id,
                job_id,
                log_date_time: queued.req.log_date_time,
                handle_code: FAILURE_CODE,
                handle_msg: "job killed before execution".to_string(),
            };
            if let Err(e) = self.callback.report(param).await {
                warn!(
                    "callback dropped for killed trigger log_id={}: {}",
                    queued.req.log_id, e
                );
            }
        }
        Ok(())
    }

    /// 调度中心故障转移路由用的忙闲探测
    pub async fn is_busy(&self, job_id: i64) -> bool {
        self.slots.lock().await.contains_key(&job_id)
    }

    pub async fn running_count(&self) -> usize {
        self.slots.lock().await.len()
    }

    pub async fn running_tasks(&self) -> Vec<RunningTask> {
        let slots = self.slots.lock().await;
        slots.values().map(|slot| slot.current.clone()).collect()
    }

    /// 停机：取消所有在运行任务，在宽限期内等待它们退出
    pub async fn shutdown(&self, grace: Duration) {
        let count = self.running_count().await;
        info!(
            "execution engine shutting down, cancelling {} running job(s)",
            count
        );
        self.shutdown.cancel();

        let deadline = tokio::time::Instant::now() + grace;
        loop {
            if self.slots.lock().await.is_empty() {
                break;
            }
            if tokio::time::Instant::now() >= deadline {
                let remaining = self.running_count().await;
                warn!(
                    "shutdown grace period expired with {} job(s) still tracked",
                    remaining
                );
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    fn new_running_task(&self, req: &RunRequest) -> RunningTask {
        RunningTask {
            job_id: req.job_id,
            log_id: req.log_id,
            log_date_time: req.log_date_time,
            generation: self.generation.fetch_add(1, Ordering::Relaxed) + 1,
            handler: req.executor_handler.clone(),
            started_at: Utc::now(),
            // 子令牌：kill/覆盖只取消这一次执行，停机取消全部
            cancel: self.shutdown.child_token(),
        }
    }

    fn spawn_invocation(&self, task: RunningTask, req: RunRequest, spec: Arc<TaskSpec>) {
        let engine = self.clone();
        tokio::spawn(async move {
            let outcome = engine.invoke(&task, &req, spec).await;
            engine.complete(task, outcome).await;
        });
    }

    /// 让 handler 在自己的任务里执行（panic 变成 JoinError 而不是进程崩溃），
    /// 并和取消信号、超时赛跑。超时从 handler 启动起算
    async fn invoke(&self, task: &RunningTask, req: &RunRequest, spec: Arc<TaskSpec>) -> Outcome {
        self.log_store
            .append(
                task.log_id,
                format!(
                    "{} [trigger] handler={} params={}",
                    task.started_at.format("%Y-%m-%d %H:%M:%S%.3f"),
                    task.handler,
                    req.executor_params
                ),
            )
            .await;

        let ctx = TaskContext::new(
            task.job_id,
            task.log_id,
            req.executor_params.clone(),
            task.cancel.clone(),
            self.log_store.writer(task.log_id),
        );
        let handler = Arc::clone(&spec.handler);
        let mut invocation = tokio::spawn(async move { handler.execute(ctx).await });

        let cancel = task.cancel.clone();
        if req.executor_timeout > 0 {
            tokio::select! {
                result = &mut invocation => Self::join_outcome(result),
                _ = cancel.cancelled() => Outcome::Cancelled,
                _ = tokio::time::sleep(Duration::from_secs(req.executor_timeout as u64)) => {
                    // 通知 handler 停止；不配合的 handler 会继续游离运行，
                    // 但本次触发已按超时结案
                    cancel.cancel();
                    Outcome::Timeout(req.executor_timeout)
                }
            }
        } else {
            tokio::select! {
                result = &mut invocation => Self::join_outcome(result),
                _ = cancel.cancelled() => Outcome::Cancelled,
            }
        }
    }

    fn join_outcome(result: Result<ExecutorResult<String>, tokio::task::JoinError>) -> Outcome {
        match result {
            Ok(Ok(msg)) => Outcome::Success(msg),
            Ok(Err(e)) => Outcome::Failed(e.to_string()),
            Err(join_err) if join_err.is_panic() => {
                let payload = join_err.into_panic();
                let msg = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                Outcome::Failed(format!("handler panicked: {msg}"))
            }
            Err(_) => Outcome::Failed("handler task aborted".to_string()),
        }
    }

    /// 结案：先回执，再做带代数校验的映射清理/串行队列推进。
    /// 过期代的完成绝不能动新代的条目
    async fn complete(&self, task: RunningTask, outcome: Outcome) {
        let (handle_code, handle_msg) = match outcome {
            Outcome::Success(msg) => (SUCCESS_CODE, msg),
            Outcome::Failed(msg) => (FAILURE_CODE, msg),
            Outcome::Timeout(seconds) => (
                FAILURE_CODE,
                ExecutorError::ExecutionTimeout {
                    timeout_seconds: seconds,
                }
                .to_string(),
            ),
            Outcome::Cancelled => (FAILURE_CODE, "job cancelled before completion".to_string()),
        };

        self.log_store
            .append(
                task.log_id,
                format!(
                    "{} [finish] code={} msg={}",
                    Utc::now().format("%Y-%m-%d %H:%M:%S%.3f"),
                    handle_code,
                    handle_msg
                ),
            )
            .await;
        self.log_store.finish(task.log_id).await;

        info!(
            "job {} finished: log_id={}, generation={}, code={}",
            task.job_id, task.log_id, task.generation, handle_code
        );

        // 每次被接受的触发恰好上报一次；投递失败只记日志，不重试
        let param = CallbackParam {
            log_id: task.log_id,
            job_id: task.job_id,
            log_date_time: task.log_date_time,
            handle_code,
            handle_msg,
        };
        if let Err(e) = self.callback.report(param).await {
            warn!(
                "callback dropped for job {} log_id={}: {}",
                task.job_id, task.log_id, e
            );
        }

        let next = {
            let mut slots = self.slots.lock().await;
            match slots.get_mut(&task.job_id) {
                Some(slot) if slot.current.generation == task.generation => {
                    if let Some(queued) = slot.queue.pop_front() {
                        let next_task = self.new_running_task(&queued.req);
                        slot.current = next_task.clone();
                        Some((next_task, queued))
                    } else {
                        slots.remove(&task.job_id);
                        None
                    }
                }
                // 条目已被 kill 移除，或已是更新的代
                _ => None,
            }
        };

        if let Some((next_task, queued)) = next {
            info!(
                "job {} promoting queued trigger log_id={} (generation {})",
                task.job_id, queued.req.log_id, next_task.generation
            );
            self.spawn_invocation(next_task, queued.req, queued.spec);
        }
    }
}

// 后台任务里需要把引擎克隆进去，所有字段共享同一份状态
impl Clone for ExecutionEngine {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
            log_store: Arc::clone(&self.log_store),
            callback: Arc::clone(&self.callback),
            slots: Arc::clone(&self.slots),
            generation: Arc::clone(&self.generation),
            shutdown: self.shutdown.clone(),
        }
    }
}
