use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Plan {
    Free,
    Pro,
}

impl Plan {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Pro => "pro",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tenant {
    pub id: i64,
    pub email: String,
    pub company_name: String,
    pub plan: Plan,
    pub task_limit: u32,
    pub executions_used: i64,
    pub created_at: DateTime<Utc>,
}

/// Exactly one analysis mode exists per task; fields for the other modes
/// cannot be populated by construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum FilterConfig {
    Deadline {
        column: u32,
        alert_days: i64,
    },
    Status {
        column: u32,
        keyword: String,
    },
    Funnel {
        triggered: u32,
        contacted: u32,
        positive_contact: u32,
        agreements: u32,
        payments: u32,
    },
}

impl FilterConfig {
    pub fn mode(&self) -> &'static str {
        match self {
            Self::Deadline { .. } => "deadline",
            Self::Status { .. } => "status",
            Self::Funnel { .. } => "funnel",
        }
    }
}

/// Business-intelligence columns; independent of the filter mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BiColumns {
    pub value_column: u32,
    pub id_column: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: i64,
    pub tenant_id: i64,
    pub client_name: String,
    pub file_path: String,
    pub schedule_time: NaiveTime,
    pub recipient_email: String,
    pub chat_target: Option<String>,
    pub filter: FilterConfig,
    pub bi: Option<BiColumns>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTask {
    pub tenant_id: i64,
    pub client_name: String,
    pub file_path: String,
    pub schedule_time: NaiveTime,
    pub recipient_email: String,
    pub chat_target: Option<String>,
    pub filter: FilterConfig,
    pub bi: Option<BiColumns>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LogStatus {
    Success,
    Warning,
    Failure,
    Blocked,
    /// Secondary diagnostic entry for a failed email transport; never a
    /// primary execution outcome.
    Transport,
}

impl LogStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Warning => "warning",
            Self::Failure => "failure",
            Self::Blocked => "blocked",
            Self::Transport => "transport",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionLog {
    pub id: i64,
    pub task_id: i64,
    pub tenant_id: i64,
    pub status: LogStatus,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailySnapshot {
    pub id: i64,
    pub task_id: i64,
    pub tenant_id: i64,
    pub recorded_on: NaiveDate,
    pub total_production: f64,
    pub average_ticket: f64,
}

/// A row matched by the deadline or status evaluator, in sheet order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchedItem {
    pub identifier: String,
    pub detail: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunnelSummary {
    pub base_total: u32,
    pub triggered: u32,
    pub contacted: u32,
    pub positive_contact: u32,
    pub agreements: u32,
    pub payments: u32,
    pub agreement_rate: f64,
    pub payment_rate: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ScanResult {
    Items(Vec<MatchedItem>),
    Funnel(FunnelSummary),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DayOverDay {
    pub total_delta: f64,
    pub total_pct: f64,
    pub ticket_delta: f64,
    pub ticket_pct: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BiReport {
    pub total_today: f64,
    pub ticket_today: f64,
    pub versus_yesterday: Option<DayOverDay>,
}
