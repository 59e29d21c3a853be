use crate::bi;
use crate::db::{Database, FREE_EXECUTION_CAP};
use crate::delivery::{ChatNotifier, Mailer};
use crate::errors::{AppError, AppResult};
use crate::filters::run_filter;
use crate::models::{LogStatus, Task};
use crate::report::render_report;
use crate::source::SourceOpener;
use chrono::{Local, NaiveDate};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

/// Log rows are bounded; anything longer is cut before insert.
const MAX_LOG_MESSAGE_LEN: usize = 500;

pub struct ReportRunner {
    db: Arc<Database>,
    opener: Arc<dyn SourceOpener>,
    mailer: Arc<dyn Mailer>,
    chat: Arc<dyn ChatNotifier>,
    email_timeout: Duration,
}

impl ReportRunner {
    pub fn new(
        db: Arc<Database>,
        opener: Arc<dyn SourceOpener>,
        mailer: Arc<dyn Mailer>,
        chat: Arc<dyn ChatNotifier>,
        email_timeout: Duration,
    ) -> Self {
        Self {
            db,
            opener,
            mailer,
            chat,
            email_timeout,
        }
    }

    /// Single entry point for the schedule trigger and for "run now";
    /// both get identical semantics, quota gate included. Every call ends
    /// in exactly one primary log entry, and the outcome is returned.
    pub async fn run(&self, task_id: i64) -> AppResult<LogStatus> {
        self.run_for_date(task_id, Local::now().date_naive()).await
    }

    pub async fn run_for_date(&self, task_id: i64, today: NaiveDate) -> AppResult<LogStatus> {
        let task = self
            .db
            .get_task(task_id)?
            .ok_or_else(|| AppError::NotFound(format!("task {}", task_id)))?;
        let tenant = self
            .db
            .get_tenant(task.tenant_id)?
            .ok_or_else(|| AppError::NotFound(format!("tenant {}", task.tenant_id)))?;

        // Quota gate runs before any I/O. The counter moves exactly once
        // per execution that passes, even if later stages fail.
        if !self.db.try_consume_execution(tenant.id)? {
            let message = format!(
                "Blocked: free-tier cap of {} lifetime executions reached.",
                FREE_EXECUTION_CAP
            );
            self.db
                .insert_log(task.id, tenant.id, LogStatus::Blocked, &message)?;
            tracing::info!(task_id = task.id, tenant_id = tenant.id, "execution blocked by quota");
            return Ok(LogStatus::Blocked);
        }

        tracing::info!(task_id = task.id, mode = task.filter.mode(), "execution started");

        let payload = match self.build_payload(&task, today) {
            Ok(payload) => payload,
            Err(error) => {
                let message = truncate(
                    &format!("Execution failed for task {}: {}", task.id, error),
                    MAX_LOG_MESSAGE_LEN,
                );
                self.db
                    .insert_log(task.id, tenant.id, LogStatus::Failure, &message)?;
                tracing::warn!(task_id = task.id, error = %error, "report computation failed");
                return Ok(LogStatus::Failure);
            }
        };

        let subject = format!("Scheduled report: {}", task.client_name);
        let email_error = match timeout(
            self.email_timeout,
            self.mailer.send(&task.recipient_email, &subject, &payload),
        )
        .await
        {
            Ok(Ok(())) => None,
            Ok(Err(error)) => Some(error.to_string()),
            Err(_) => Some(format!(
                "send timed out after {}s",
                self.email_timeout.as_secs()
            )),
        };

        // Chat alert is attempted regardless of the email result and never
        // affects the outcome.
        if let Some(target) = task.chat_target.as_deref() {
            let alert = format!("Report '{}' executed.", task.client_name);
            if let Err(error) = self.chat.notify(target, &alert).await {
                tracing::warn!(task_id = task.id, error = %error, "chat notification failed");
            }
        }

        let mut outcome = LogStatus::Success;
        if let Some(detail) = email_error {
            outcome = LogStatus::Warning;
            let message = truncate(
                &format!("Email transport failed: {}", detail),
                MAX_LOG_MESSAGE_LEN,
            );
            self.db
                .insert_log(task.id, tenant.id, LogStatus::Transport, &message)?;
            tracing::warn!(task_id = task.id, "email delivery degraded to warning");
        }

        self.db.insert_log(task.id, tenant.id, outcome, "")?;
        Ok(outcome)
    }

    /// read -> filter -> BI -> format. The source handle lives only for
    /// this scope, so the file is released on every exit path.
    fn build_payload(&self, task: &Task, today: NaiveDate) -> AppResult<String> {
        let source = self.opener.open(Path::new(&task.file_path))?;
        let scan = run_filter(source.as_ref(), &task.filter, today);
        let bi_report = match task.bi {
            Some(columns) => Some(bi::run_bi(&self.db, task, columns, source.as_ref(), today)?),
            None => None,
        };
        Ok(render_report(task, &scan, bi_report.as_ref()))
    }
}

fn truncate(message: &str, cap: usize) -> String {
    if message.chars().count() <= cap {
        return message.to_string();
    }
    message.chars().take(cap).collect()
}
