use crate::models::{FilterConfig, FunnelSummary, MatchedItem, ScanResult};
use crate::source::TabularSource;
use chrono::{Duration, NaiveDate};

const DATE_FORMAT: &str = "%d/%m/%Y";

/// Column holding the item identifier in every sheet.
const IDENTIFIER_COLUMN: u32 = 1;

/// Data rows start below the header.
const FIRST_DATA_ROW: u32 = 2;

pub fn run_filter(source: &dyn TabularSource, filter: &FilterConfig, today: NaiveDate) -> ScanResult {
    match filter {
        FilterConfig::Deadline { column, alert_days } => {
            ScanResult::Items(scan_deadline(source, *column, *alert_days, today))
        }
        FilterConfig::Status { column, keyword } => {
            ScanResult::Items(scan_status(source, *column, keyword))
        }
        FilterConfig::Funnel {
            triggered,
            contacted,
            positive_contact,
            agreements,
            payments,
        } => ScanResult::Funnel(scan_funnel(
            source,
            *triggered,
            *contacted,
            *positive_contact,
            *agreements,
            *payments,
        )),
    }
}

/// Rows whose date in `column` falls inside `[today, today + alert_days]`,
/// both ends inclusive. Cells that are not a date or dd/mm/yyyy text are
/// skipped, not errors.
pub fn scan_deadline(
    source: &dyn TabularSource,
    column: u32,
    alert_days: i64,
    today: NaiveDate,
) -> Vec<MatchedItem> {
    let horizon = today + Duration::days(alert_days);
    let mut items = Vec::new();
    for row in FIRST_DATA_ROW..=source.row_count() {
        let Some(due) = source.cell(row, column).and_then(|cell| cell.as_date()) else {
            continue;
        };
        if today <= due && due <= horizon {
            items.push(MatchedItem {
                identifier: identifier_at(source, row),
                detail: due.format(DATE_FORMAT).to_string(),
            });
        }
    }
    items
}

/// Rows whose cell in `column`, trimmed and uppercased, equals the
/// normalized keyword exactly. Empty cells never match.
pub fn scan_status(source: &dyn TabularSource, column: u32, keyword: &str) -> Vec<MatchedItem> {
    let target = keyword.trim().to_uppercase();
    let mut items = Vec::new();
    for row in FIRST_DATA_ROW..=source.row_count() {
        let Some(cell) = source.cell(row, column) else {
            continue;
        };
        let raw = cell.display();
        if raw.trim().to_uppercase() == target {
            items.push(MatchedItem {
                identifier: identifier_at(source, row),
                detail: raw,
            });
        }
    }
    items
}

/// Presence counts for the five funnel stages plus derived conversion
/// rates. Rates degrade to 0 when their denominator is 0.
pub fn scan_funnel(
    source: &dyn TabularSource,
    triggered: u32,
    contacted: u32,
    positive_contact: u32,
    agreements: u32,
    payments: u32,
) -> FunnelSummary {
    let mut summary = FunnelSummary {
        base_total: source.row_count().saturating_sub(1),
        triggered: 0,
        contacted: 0,
        positive_contact: 0,
        agreements: 0,
        payments: 0,
        agreement_rate: 0.0,
        payment_rate: 0.0,
    };
    for row in FIRST_DATA_ROW..=source.row_count() {
        if stage_filled(source, row, triggered) {
            summary.triggered += 1;
        }
        if stage_filled(source, row, contacted) {
            summary.contacted += 1;
        }
        if stage_filled(source, row, positive_contact) {
            summary.positive_contact += 1;
        }
        if stage_filled(source, row, agreements) {
            summary.agreements += 1;
        }
        if stage_filled(source, row, payments) {
            summary.payments += 1;
        }
    }
    if summary.positive_contact > 0 {
        summary.agreement_rate =
            f64::from(summary.agreements) / f64::from(summary.positive_contact) * 100.0;
    }
    if summary.agreements > 0 {
        summary.payment_rate = f64::from(summary.payments) / f64::from(summary.agreements) * 100.0;
    }
    summary
}

fn stage_filled(source: &dyn TabularSource, row: u32, column: u32) -> bool {
    source
        .cell(row, column)
        .map(|cell| cell.is_truthy())
        .unwrap_or(false)
}

fn identifier_at(source: &dyn TabularSource, row: u32) -> String {
    source
        .cell(row, IDENTIFIER_COLUMN)
        .map(|cell| cell.display())
        .unwrap_or_default()
}
