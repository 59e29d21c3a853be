use crate::db::Database;
use crate::errors::AppResult;
use crate::models::{BiColumns, BiReport, DayOverDay, Task};
use crate::source::TabularSource;
use chrono::{Duration, NaiveDate};
use std::collections::HashSet;

const FIRST_DATA_ROW: u32 = 2;

/// Computes today's production metrics, compares them against yesterday's
/// persisted snapshot, and replaces today's snapshot. Yesterday's row is
/// read-only input; today's row is rewritten on every run, so a second run
/// on the same day leaves a single snapshot with the later values.
pub fn run_bi(
    db: &Database,
    task: &Task,
    columns: BiColumns,
    source: &dyn TabularSource,
    today: NaiveDate,
) -> AppResult<BiReport> {
    let (total_today, ticket_today) = daily_totals(source, columns);

    let prior = db.snapshot_for(task.id, today - Duration::days(1))?;
    let versus_yesterday = prior.map(|prior| {
        let total_delta = total_today - prior.total_production;
        let ticket_delta = ticket_today - prior.average_ticket;
        DayOverDay {
            total_delta,
            total_pct: pct_delta(total_delta, prior.total_production),
            ticket_delta,
            ticket_pct: pct_delta(ticket_delta, prior.average_ticket),
        }
    });

    db.replace_snapshot(task.id, task.tenant_id, today, total_today, ticket_today)?;

    Ok(BiReport {
        total_today,
        ticket_today,
        versus_yesterday,
    })
}

/// Sum of positive values in the value column, and the average ticket over
/// the distinct identifiers of those rows. Non-numeric value cells read as
/// 0 and contribute nothing.
pub fn daily_totals(source: &dyn TabularSource, columns: BiColumns) -> (f64, f64) {
    let mut total = 0.0;
    let mut identifiers: HashSet<String> = HashSet::new();

    for row in FIRST_DATA_ROW..=source.row_count() {
        let value = source
            .cell(row, columns.value_column)
            .and_then(|cell| cell.as_number())
            .unwrap_or(0.0);
        if value > 0.0 {
            total += value;
            let identifier = source
                .cell(row, columns.id_column)
                .map(|cell| cell.display())
                .unwrap_or_default();
            identifiers.insert(identifier);
        }
    }

    let ticket = if identifiers.is_empty() {
        0.0
    } else {
        total / identifiers.len() as f64
    };
    (total, ticket)
}

/// Percentage delta against a prior-day baseline. A baseline of exactly 0
/// yields 0 rather than a division fault; "no change" and "undefined" are
/// deliberately conflated here.
fn pct_delta(delta: f64, baseline: f64) -> f64 {
    if baseline == 0.0 {
        0.0
    } else {
        delta / baseline * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::{daily_totals, run_bi};
    use crate::db::Database;
    use crate::models::{BiColumns, FilterConfig, NewTask, Plan, Task};
    use crate::source::{CellValue, MemorySource};
    use chrono::{NaiveDate, NaiveTime};

    fn text(value: &str) -> Option<CellValue> {
        Some(CellValue::Text(value.to_string()))
    }

    fn number(value: f64) -> Option<CellValue> {
        Some(CellValue::Number(value))
    }

    const COLUMNS: BiColumns = BiColumns {
        value_column: 2,
        id_column: 1,
    };

    fn fixture_task(db: &Database) -> Task {
        let tenant = db
            .create_tenant("owner@acme.example", "Acme", Plan::Pro)
            .expect("tenant");
        db.insert_task(NewTask {
            tenant_id: tenant.id,
            client_name: "Acme".to_string(),
            file_path: "uploads/acme.xlsx".to_string(),
            schedule_time: NaiveTime::from_hms_opt(8, 0, 0).expect("time"),
            recipient_email: "ops@acme.example".to_string(),
            chat_target: None,
            filter: FilterConfig::Status {
                column: 3,
                keyword: "open".to_string(),
            },
            bi: Some(COLUMNS),
        })
        .expect("task")
    }

    #[test]
    fn totals_sum_positive_values_over_distinct_identifiers() {
        let source = MemorySource::from_rows(vec![
            vec![text("id"), text("value")],
            vec![text("A"), number(100.0)],
            vec![text("A"), number(50.0)],
            vec![text("B"), number(150.0)],
            vec![text("C"), number(-30.0)],
            vec![text("D"), text("n/a")],
            vec![text("E"), None],
        ]);

        let (total, ticket) = daily_totals(&source, COLUMNS);
        assert_eq!(total, 300.0);
        assert_eq!(ticket, 150.0);
    }

    #[test]
    fn empty_sheet_produces_zero_ticket_without_dividing() {
        let source = MemorySource::from_rows(vec![vec![text("id"), text("value")]]);
        let (total, ticket) = daily_totals(&source, COLUMNS);
        assert_eq!(total, 0.0);
        assert_eq!(ticket, 0.0);
    }

    #[test]
    fn rerun_on_same_day_keeps_one_snapshot_with_latest_values() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = Database::new(&dir.path().join("state.sqlite")).expect("db");
        let task = fixture_task(&db);
        let today = NaiveDate::from_ymd_opt(2024, 1, 10).expect("date");

        let first = MemorySource::from_rows(vec![
            vec![text("id"), text("value")],
            vec![text("A"), number(100.0)],
        ]);
        let second = MemorySource::from_rows(vec![
            vec![text("id"), text("value")],
            vec![text("A"), number(100.0)],
            vec![text("B"), number(60.0)],
        ]);

        run_bi(&db, &task, COLUMNS, &first, today).expect("first run");
        run_bi(&db, &task, COLUMNS, &second, today).expect("second run");

        let stored = db
            .snapshot_for(task.id, today)
            .expect("query")
            .expect("present");
        assert_eq!(stored.total_production, 160.0);
        assert_eq!(stored.average_ticket, 80.0);
    }

    #[test]
    fn comparison_reports_deltas_against_yesterday() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = Database::new(&dir.path().join("state.sqlite")).expect("db");
        let task = fixture_task(&db);
        let yesterday = NaiveDate::from_ymd_opt(2024, 1, 9).expect("date");
        let today = NaiveDate::from_ymd_opt(2024, 1, 10).expect("date");

        db.replace_snapshot(task.id, task.tenant_id, yesterday, 200.0, 100.0)
            .expect("seed yesterday");

        let source = MemorySource::from_rows(vec![
            vec![text("id"), text("value")],
            vec![text("A"), number(150.0)],
            vec![text("B"), number(150.0)],
        ]);
        let report = run_bi(&db, &task, COLUMNS, &source, today).expect("run");

        assert_eq!(report.total_today, 300.0);
        assert_eq!(report.ticket_today, 150.0);
        let delta = report.versus_yesterday.expect("comparison");
        assert_eq!(delta.total_delta, 100.0);
        assert_eq!(delta.total_pct, 50.0);
        assert_eq!(delta.ticket_delta, 50.0);
        assert_eq!(delta.ticket_pct, 50.0);
    }

    #[test]
    fn zero_baseline_yields_zero_percentage_delta() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = Database::new(&dir.path().join("state.sqlite")).expect("db");
        let task = fixture_task(&db);
        let yesterday = NaiveDate::from_ymd_opt(2024, 1, 9).expect("date");
        let today = NaiveDate::from_ymd_opt(2024, 1, 10).expect("date");

        db.replace_snapshot(task.id, task.tenant_id, yesterday, 0.0, 0.0)
            .expect("seed yesterday");

        let source = MemorySource::from_rows(vec![
            vec![text("id"), text("value")],
            vec![text("A"), number(500.0)],
        ]);
        let report = run_bi(&db, &task, COLUMNS, &source, today).expect("run");

        let delta = report.versus_yesterday.expect("comparison");
        assert_eq!(delta.total_delta, 500.0);
        assert_eq!(delta.total_pct, 0.0);
        assert_eq!(delta.ticket_pct, 0.0);
    }

    #[test]
    fn first_day_run_has_no_comparison_but_persists_snapshot() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = Database::new(&dir.path().join("state.sqlite")).expect("db");
        let task = fixture_task(&db);
        let today = NaiveDate::from_ymd_opt(2024, 1, 10).expect("date");

        let source = MemorySource::from_rows(vec![
            vec![text("id"), text("value")],
            vec![text("A"), number(75.0)],
        ]);
        let report = run_bi(&db, &task, COLUMNS, &source, today).expect("run");

        assert!(report.versus_yesterday.is_none());
        assert!(db.snapshot_for(task.id, today).expect("query").is_some());
    }
}
