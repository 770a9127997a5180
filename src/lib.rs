//! 分布式调度系统的执行器运行时。
//!
//! 执行器向调度中心注册自己，暴露 run/kill/log/beat/idleBeat 五个
//! 协议端点，按阻塞策略（串行、丢弃、覆盖）执行命名任务，并把结果
//! 回调给调度中心。何时触发由调度中心决定，执行器只负责执行。

pub mod callback;
pub mod config;
pub mod console;
pub mod entities;
pub mod errors;
pub mod execution;
pub mod executor;
pub mod heartbeat;
pub mod logging;
pub mod registry;
pub mod server;

pub use callback::{CallbackReporter, CallbackSink};
pub use config::ExecutorConfig;
pub use console::{ConsoleClient, WebConsoleClient};
pub use entities::{
    ApiResponse, BlockStrategy, CallbackParam, IdleBeatRequest, KillRequest, LogRequest, LogResult,
    RegistryParam, RunRequest, ACCESS_TOKEN_HEADER, FAILURE_CODE, SUCCESS_CODE,
};
pub use errors::{ExecutorError, ExecutorResult};
pub use execution::{ExecutionEngine, RunningTask};
pub use executor::{Executor, ExecutorBuilder};
pub use heartbeat::RegistryClient;
pub use logging::{InMemoryLogStore, JobLogWriter, LogProvider};
pub use registry::{task_fn, TaskContext, TaskHandler, TaskRegistry, TaskSpec};
pub use server::{create_routes, AppState};
