use std::env;
use std::time::Duration;

use scheduler_executor::{task_fn, Executor, ExecutorError};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// 演示用执行器：注册两个任务后挂机等待调度中心触发。
/// 环境变量覆盖默认配置：
///   ADMIN_URL      调度中心根地址
///   ACCESS_TOKEN   共享令牌
///   APP_NAME       执行器注册 key
///   EXECUTOR_PORT  本地监听端口
///   CONSOLE_PASSWORD  配置后启动时自动同步控制台记录
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let admin_url =
        env::var("ADMIN_URL").unwrap_or_else(|_| "http://localhost:8080/scheduler-admin".into());
    let port = env::var("EXECUTOR_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(9999);

    let mut builder = Executor::builder()
        .admin_url(admin_url)
        .access_token(env::var("ACCESS_TOKEN").unwrap_or_default())
        .app_name(env::var("APP_NAME").unwrap_or_else(|_| "demo-executor".into()))
        .alias("演示执行器")
        .port(port);
    if let Ok(password) = env::var("CONSOLE_PASSWORD") {
        builder = builder.console_credentials(
            env::var("CONSOLE_USERNAME").unwrap_or_else(|_| "admin".into()),
            password,
        );
    }
    let executor = builder.build()?;

    executor
        .register_task(
            "demo.echo",
            "回显触发参数",
            "0 * * * * ?",
            task_fn(|ctx| async move {
                ctx.log(format!("echo task fired with params: {}", ctx.params))
                    .await;
                Ok(format!("echo: {}", ctx.params))
            }),
        )
        .await;

    executor
        .register_task(
            "demo.batch",
            "分批处理，演示协作式取消",
            "0 0 2 * * ?",
            task_fn(|ctx| async move {
                for step in 1..=10 {
                    if ctx.is_cancelled() {
                        return Err(ExecutorError::TaskExecution(format!(
                            "cancelled at step {step}"
                        )));
                    }
                    ctx.log(format!("processing batch {step}/10")).await;
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
                Ok("all batches done".to_string())
            }),
        )
        .await;

    info!("demo executor configured, starting");
    executor.run().await?;
    Ok(())
}
