use anyhow::Context;
use sheetwatch::config::Config;
use sheetwatch::db::Database;
use sheetwatch::delivery::chat::TelegramNotifier;
use sheetwatch::delivery::email::SmtpMailer;
use sheetwatch::runner::ReportRunner;
use sheetwatch::scheduler::ScheduleRegistry;
use sheetwatch::source::XlsxOpener;
use std::path::Path;
use std::sync::{Arc, OnceLock};
use tracing_appender::non_blocking::WorkerGuard;

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    init_tracing(&config.log_dir)?;

    let db = Arc::new(Database::new(&config.database_path)?);
    let mailer = Arc::new(SmtpMailer::new(&config.smtp)?);
    let chat = Arc::new(TelegramNotifier::new(
        config.telegram_bot_token.clone().unwrap_or_default(),
    ));
    let runner = Arc::new(ReportRunner::new(
        db.clone(),
        Arc::new(XlsxOpener),
        mailer,
        chat,
        config.smtp.send_timeout,
    ));

    let registry = ScheduleRegistry::new();
    {
        let runner = runner.clone();
        registry.set_executor(Arc::new(move |task_id| {
            let runner = runner.clone();
            Box::pin(async move {
                if let Err(error) = runner.run(task_id).await {
                    tracing::warn!(task_id, error = %error, "scheduled execution failed");
                }
            })
        }));
    }

    let tasks = db.list_tasks().context("restore task schedules")?;
    for task in &tasks {
        registry.upsert(task.id, task.schedule_time).await;
    }
    registry.start();
    tracing::info!(task_count = tasks.len(), "scheduler started");

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown requested");
    Ok(())
}

fn init_tracing(log_dir: &Path) -> anyhow::Result<()> {
    std::fs::create_dir_all(log_dir)?;
    let file_appender = tracing_appender::rolling::daily(log_dir, "sheetwatch.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let _ = LOG_GUARD.set(guard);

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .json()
        .with_writer(non_blocking)
        .try_init()
        .map_err(|error| anyhow::anyhow!(error.to_string()))?;
    Ok(())
}
