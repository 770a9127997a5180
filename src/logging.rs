use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::entities::{LogRequest, LogResult};
use crate::errors::ExecutorResult;

/// 默认保留的日志流数量，超出后按最旧的 logId 淘汰
const DEFAULT_LOG_CAPACITY: usize = 256;

/// 调度中心查询任务日志的扩展点，可由宿主应用整体替换
#[async_trait]
pub trait LogProvider: Send + Sync {
    async fn fetch(&self, req: &LogRequest) -> ExecutorResult<LogResult>;
}

#[derive(Debug, Default)]
struct JobLog {
    lines: Vec<String>,
    finished: bool,
}

#[derive(Debug, Default)]
struct StoreInner {
    logs: HashMap<i64, JobLog>,
    /// 插入顺序，用于容量淘汰
    order: VecDeque<i64>,
}

/// 默认日志实现：按 logId 追加的内存缓冲
#[derive(Debug)]
pub struct InMemoryLogStore {
    inner: Mutex<StoreInner>,
    capacity: usize,
}

impl InMemoryLogStore {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_LOG_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(StoreInner::default()),
            capacity: capacity.max(1),
        }
    }

    pub async fn append<S: Into<String>>(&self, log_id: i64, line: S) {
        let mut inner = self.inner.lock().await;
        if !inner.logs.contains_key(&log_id) {
            inner.logs.insert(log_id, JobLog::default());
            inner.order.push_back(log_id);
            while inner.logs.len() > self.capacity {
                if let Some(evicted) = inner.order.pop_front() {
                    inner.logs.remove(&evicted);
                }
            }
        }
        if let Some(log) = inner.logs.get_mut(&log_id) {
            log.lines.push(line.into());
        }
    }

    /// 标记日志流结束，此后 fetch 到末尾会返回 isEnd
    pub async fn finish(&self, log_id: i64) {
        let mut inner = self.inner.lock().await;
        if let Some(log) = inner.logs.get_mut(&log_id) {
            log.finished = true;
        }
    }

    pub fn writer(self: &Arc<Self>, log_id: i64) -> JobLogWriter {
        JobLogWriter {
            log_id,
            store: Arc::clone(self),
        }
    }

    pub async fn line_count(&self, log_id: i64) -> usize {
        let inner = self.inner.lock().await;
        inner.logs.get(&log_id).map(|l| l.lines.len()).unwrap_or(0)
    }
}

impl Default for InMemoryLogStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LogProvider for InMemoryLogStore {
    async fn fetch(&self, req: &LogRequest) -> ExecutorResult<LogResult> {
        let from = req.from_line_num.max(1);
        let inner = self.inner.lock().await;
        let Some(log) = inner.logs.get(&req.log_id) else {
            // 未知或已淘汰的日志流，回应空内容并结束轮询
            return Ok(LogResult {
                from_line_num: from,
                to_line_num: 0,
                log_content: String::new(),
                is_end: true,
            });
        };

        let total = log.lines.len() as i32;
        let log_content = if from <= total {
            log.lines[(from - 1) as usize..].join("\n")
        } else {
            String::new()
        };
        Ok(LogResult {
            from_line_num: from,
            to_line_num: total,
            log_content,
            is_end: log.finished,
        })
    }
}

/// 任务上下文里持有的日志句柄，把 handler 输出写进所属 logId 的缓冲
#[derive(Clone)]
pub struct JobLogWriter {
    log_id: i64,
    store: Arc<InMemoryLogStore>,
}

impl JobLogWriter {
    pub async fn append<S: Into<String>>(&self, line: S) {
        self.store.append(self.log_id, line).await;
    }

    pub fn log_id(&self) -> i64 {
        self.log_id
    }
}
