use crate::errors::{AppError, AppResult};
use crate::models::{
    BiColumns, DailySnapshot, ExecutionLog, FilterConfig, LogStatus, NewTask, Plan, Task, Tenant,
};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::fs;
use std::path::Path;
use std::sync::Mutex;

const SCHEMA_SQL: &str = include_str!("schema.sql");

/// Lifetime execution cap for free-tier tenants.
pub const FREE_EXECUTION_CAP: i64 = 5;
pub const FREE_TASK_LIMIT: u32 = 3;
const PRO_TASK_LIMIT: u32 = 15;

#[derive(Debug)]
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn new(path: &Path) -> AppResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|err| AppError::Io(err.to_string()))?;
        }
        let conn = Connection::open(path).map_err(AppError::from)?;
        conn.execute_batch(SCHEMA_SQL).map_err(AppError::from)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn create_tenant(&self, email: &str, company_name: &str, plan: Plan) -> AppResult<Tenant> {
        let now = Utc::now();
        let task_limit = match plan {
            Plan::Free => FREE_TASK_LIMIT,
            Plan::Pro => PRO_TASK_LIMIT,
        };
        let conn = self
            .conn
            .lock()
            .map_err(|_| AppError::Internal("database mutex poisoned".to_string()))?;
        conn.execute(
            "INSERT INTO tenants (email, company_name, plan, task_limit, executions_used, created_at)
             VALUES (?1, ?2, ?3, ?4, 0, ?5)",
            params![email, company_name, plan.as_str(), task_limit, now.to_rfc3339()],
        )?;
        let id = conn.last_insert_rowid();
        Ok(Tenant {
            id,
            email: email.to_string(),
            company_name: company_name.to_string(),
            plan,
            task_limit,
            executions_used: 0,
            created_at: now,
        })
    }

    pub fn get_tenant(&self, tenant_id: i64) -> AppResult<Option<Tenant>> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| AppError::Internal("database mutex poisoned".to_string()))?;
        conn.query_row(
            "SELECT id, email, company_name, plan, task_limit, executions_used, created_at
             FROM tenants WHERE id = ?1",
            [tenant_id],
            |row| {
                Ok(Tenant {
                    id: row.get(0)?,
                    email: row.get(1)?,
                    company_name: row.get(2)?,
                    plan: parse_plan(&row.get::<_, String>(3)?)?,
                    task_limit: row.get(4)?,
                    executions_used: row.get(5)?,
                    created_at: parse_time(&row.get::<_, String>(6)?)?,
                })
            },
        )
        .optional()
        .map_err(AppError::from)
    }

    /// Consumes one execution from the tenant's quota. Free tenants are
    /// gated at [`FREE_EXECUTION_CAP`] lifetime executions; the guarded
    /// UPDATE makes the check-and-increment atomic under concurrent runs.
    /// Returns `false` when the gate refuses the execution.
    pub fn try_consume_execution(&self, tenant_id: i64) -> AppResult<bool> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| AppError::Internal("database mutex poisoned".to_string()))?;
        let changed = conn.execute(
            "UPDATE tenants SET executions_used = executions_used + 1
             WHERE id = ?1 AND plan = 'free' AND executions_used < ?2",
            params![tenant_id, FREE_EXECUTION_CAP],
        )?;
        if changed == 1 {
            return Ok(true);
        }
        let plan: Option<String> = conn
            .query_row("SELECT plan FROM tenants WHERE id = ?1", [tenant_id], |row| {
                row.get(0)
            })
            .optional()?;
        match plan {
            Some(plan) => Ok(plan != "free"),
            None => Err(AppError::NotFound(format!("tenant {}", tenant_id))),
        }
    }

    pub fn insert_task(&self, payload: NewTask) -> AppResult<Task> {
        let now = Utc::now();
        let filter_json = serde_json::to_string(&payload.filter)?;
        let conn = self
            .conn
            .lock()
            .map_err(|_| AppError::Internal("database mutex poisoned".to_string()))?;
        conn.execute(
            "INSERT INTO tasks (
               tenant_id, client_name, file_path, schedule_time, recipient_email,
               chat_target, filter_json, value_column, id_column, created_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                payload.tenant_id,
                payload.client_name,
                payload.file_path,
                payload.schedule_time.format("%H:%M").to_string(),
                payload.recipient_email,
                payload.chat_target,
                filter_json,
                payload.bi.map(|bi| bi.value_column),
                payload.bi.map(|bi| bi.id_column),
                now.to_rfc3339(),
            ],
        )?;
        let id = conn.last_insert_rowid();
        Ok(Task {
            id,
            tenant_id: payload.tenant_id,
            client_name: payload.client_name,
            file_path: payload.file_path,
            schedule_time: payload.schedule_time,
            recipient_email: payload.recipient_email,
            chat_target: payload.chat_target,
            filter: payload.filter,
            bi: payload.bi,
            created_at: now,
        })
    }

    pub fn get_task(&self, task_id: i64) -> AppResult<Option<Task>> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| AppError::Internal("database mutex poisoned".to_string()))?;
        conn.query_row(
            "SELECT id, tenant_id, client_name, file_path, schedule_time, recipient_email,
                    chat_target, filter_json, value_column, id_column, created_at
             FROM tasks WHERE id = ?1",
            [task_id],
            parse_task_row,
        )
        .optional()
        .map_err(AppError::from)
    }

    pub fn list_tasks(&self) -> AppResult<Vec<Task>> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| AppError::Internal("database mutex poisoned".to_string()))?;
        let mut stmt = conn.prepare(
            "SELECT id, tenant_id, client_name, file_path, schedule_time, recipient_email,
                    chat_target, filter_json, value_column, id_column, created_at
             FROM tasks ORDER BY id ASC",
        )?;
        let tasks = stmt
            .query_map([], parse_task_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(tasks)
    }

    pub fn list_tasks_for_tenant(&self, tenant_id: i64) -> AppResult<Vec<Task>> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| AppError::Internal("database mutex poisoned".to_string()))?;
        let mut stmt = conn.prepare(
            "SELECT id, tenant_id, client_name, file_path, schedule_time, recipient_email,
                    chat_target, filter_json, value_column, id_column, created_at
             FROM tasks WHERE tenant_id = ?1 ORDER BY id ASC",
        )?;
        let tasks = stmt
            .query_map([tenant_id], parse_task_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(tasks)
    }

    pub fn delete_task(&self, task_id: i64) -> AppResult<bool> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| AppError::Internal("database mutex poisoned".to_string()))?;
        let changed = conn.execute("DELETE FROM tasks WHERE id = ?1", [task_id])?;
        Ok(changed > 0)
    }

    pub fn insert_log(
        &self,
        task_id: i64,
        tenant_id: i64,
        status: LogStatus,
        message: &str,
    ) -> AppResult<ExecutionLog> {
        let now = Utc::now();
        let conn = self
            .conn
            .lock()
            .map_err(|_| AppError::Internal("database mutex poisoned".to_string()))?;
        conn.execute(
            "INSERT INTO execution_logs (task_id, tenant_id, status, message, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![task_id, tenant_id, status.as_str(), message, now.to_rfc3339()],
        )?;
        let id = conn.last_insert_rowid();
        Ok(ExecutionLog {
            id,
            task_id,
            tenant_id,
            status,
            message: message.to_string(),
            created_at: now,
        })
    }

    pub fn logs_for_task(&self, task_id: i64, limit: u32) -> AppResult<Vec<ExecutionLog>> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| AppError::Internal("database mutex poisoned".to_string()))?;
        let mut stmt = conn.prepare(
            "SELECT id, task_id, tenant_id, status, message, created_at
             FROM execution_logs WHERE task_id = ?1
             ORDER BY id DESC LIMIT ?2",
        )?;
        let logs = stmt
            .query_map(params![task_id, limit], parse_log_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(logs)
    }

    pub fn recent_logs(&self, limit: u32) -> AppResult<Vec<ExecutionLog>> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| AppError::Internal("database mutex poisoned".to_string()))?;
        let mut stmt = conn.prepare(
            "SELECT id, task_id, tenant_id, status, message, created_at
             FROM execution_logs ORDER BY id DESC LIMIT ?1",
        )?;
        let logs = stmt
            .query_map([limit], parse_log_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(logs)
    }

    pub fn snapshot_for(&self, task_id: i64, date: NaiveDate) -> AppResult<Option<DailySnapshot>> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| AppError::Internal("database mutex poisoned".to_string()))?;
        conn.query_row(
            "SELECT id, task_id, tenant_id, recorded_on, total_production, average_ticket
             FROM daily_snapshots WHERE task_id = ?1 AND recorded_on = ?2",
            params![task_id, date.format("%Y-%m-%d").to_string()],
            parse_snapshot_row,
        )
        .optional()
        .map_err(AppError::from)
    }

    /// Replaces the snapshot for (task, date). Delete-then-insert runs in
    /// one transaction under the connection mutex, so reruns on the same
    /// day leave exactly one row and concurrent writers for the same key
    /// are serialized.
    pub fn replace_snapshot(
        &self,
        task_id: i64,
        tenant_id: i64,
        date: NaiveDate,
        total_production: f64,
        average_ticket: f64,
    ) -> AppResult<DailySnapshot> {
        let mut conn = self
            .conn
            .lock()
            .map_err(|_| AppError::Internal("database mutex poisoned".to_string()))?;
        let date_text = date.format("%Y-%m-%d").to_string();
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM daily_snapshots WHERE task_id = ?1 AND recorded_on = ?2",
            params![task_id, date_text],
        )?;
        tx.execute(
            "INSERT INTO daily_snapshots (task_id, tenant_id, recorded_on, total_production, average_ticket)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![task_id, tenant_id, date_text, total_production, average_ticket],
        )?;
        let id = tx.last_insert_rowid();
        tx.commit()?;
        Ok(DailySnapshot {
            id,
            task_id,
            tenant_id,
            recorded_on: date,
            total_production,
            average_ticket,
        })
    }
}

fn parse_task_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Task> {
    let filter_raw: String = row.get(7)?;
    let filter = serde_json::from_str::<FilterConfig>(&filter_raw).map_err(|error| {
        rusqlite::Error::FromSqlConversionFailure(
            7,
            rusqlite::types::Type::Text,
            Box::new(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                error.to_string(),
            )),
        )
    })?;
    let value_column: Option<u32> = row.get(8)?;
    let id_column: Option<u32> = row.get(9)?;
    let bi = match (value_column, id_column) {
        (Some(value_column), Some(id_column)) => Some(BiColumns {
            value_column,
            id_column,
        }),
        _ => None,
    };
    Ok(Task {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        client_name: row.get(2)?,
        file_path: row.get(3)?,
        schedule_time: parse_clock(&row.get::<_, String>(4)?)?,
        recipient_email: row.get(5)?,
        chat_target: row.get(6)?,
        filter,
        bi,
        created_at: parse_time(&row.get::<_, String>(10)?)?,
    })
}

fn parse_log_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ExecutionLog> {
    Ok(ExecutionLog {
        id: row.get(0)?,
        task_id: row.get(1)?,
        tenant_id: row.get(2)?,
        status: parse_status(&row.get::<_, String>(3)?)?,
        message: row.get(4)?,
        created_at: parse_time(&row.get::<_, String>(5)?)?,
    })
}

fn parse_snapshot_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<DailySnapshot> {
    Ok(DailySnapshot {
        id: row.get(0)?,
        task_id: row.get(1)?,
        tenant_id: row.get(2)?,
        recorded_on: parse_date(&row.get::<_, String>(3)?)?,
        total_production: row.get(4)?,
        average_ticket: row.get(5)?,
    })
}

fn parse_plan(raw: &str) -> rusqlite::Result<Plan> {
    match raw {
        "free" => Ok(Plan::Free),
        "pro" => Ok(Plan::Pro),
        other => Err(conversion_error(format!("Unknown plan '{}'", other))),
    }
}

fn parse_status(raw: &str) -> rusqlite::Result<LogStatus> {
    match raw {
        "success" => Ok(LogStatus::Success),
        "warning" => Ok(LogStatus::Warning),
        "failure" => Ok(LogStatus::Failure),
        "blocked" => Ok(LogStatus::Blocked),
        "transport" => Ok(LogStatus::Transport),
        other => Err(conversion_error(format!("Unknown log status '{}'", other))),
    }
}

fn parse_time(raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|error| conversion_error(error.to_string()))
}

fn parse_clock(raw: &str) -> rusqlite::Result<NaiveTime> {
    NaiveTime::parse_from_str(raw, "%H:%M").map_err(|error| conversion_error(error.to_string()))
}

fn parse_date(raw: &str) -> rusqlite::Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|error| conversion_error(error.to_string()))
}

fn conversion_error(message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        0,
        rusqlite::types::Type::Text,
        Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, message)),
    )
}
