use crate::models::{BiReport, FilterConfig, FunnelSummary, MatchedItem, ScanResult, Task};
use std::fmt::Write;

/// Assembles the delivery payload. Section order is fixed: mode header and
/// parameters, funnel block (funnel mode only), BI block, then the item
/// count and list for the row-matching modes. Funnel mode never emits an
/// item list.
pub fn render_report(task: &Task, scan: &ScanResult, bi: Option<&BiReport>) -> String {
    let mut out = String::new();

    match &task.filter {
        FilterConfig::Deadline { column, alert_days } => {
            out.push_str("CRITICAL DEADLINE REPORT (rule: DEADLINE)\n\n");
            let _ = writeln!(out, "- Monitored column: {}", column);
            let _ = writeln!(out, "- Alert window: {} days", alert_days);
        }
        FilterConfig::Status { column, keyword } => {
            out.push_str("STATUS REPORT (rule: STATUS)\n\n");
            let _ = writeln!(out, "- Monitored column: {}", column);
            let _ = writeln!(out, "- Target keyword: {}", keyword);
        }
        FilterConfig::Funnel { .. } => {
            if let ScanResult::Funnel(summary) = scan {
                push_funnel(&mut out, summary);
            }
        }
    }

    if let Some(bi) = bi {
        push_bi(&mut out, bi);
    }

    if let ScanResult::Items(items) = scan {
        push_items(&mut out, items);
    }

    out
}

fn push_funnel(out: &mut String, summary: &FunnelSummary) {
    out.push_str("--- FUNNEL ANALYSIS ---\n");
    let _ = writeln!(out, "Total client base: {}", summary.base_total);
    let _ = writeln!(out, "1. Triggered: {}", summary.triggered);
    let _ = writeln!(out, "2. Contacted: {}", summary.contacted);
    let _ = writeln!(out, "3. Positive contact (CPC): {}", summary.positive_contact);
    let _ = writeln!(out, "4. Agreements closed: {}", summary.agreements);
    let _ = writeln!(out, "5. Payments received: {}", summary.payments);
    out.push_str("\n--- CONVERSION RATES ---\n");
    let _ = writeln!(out, "Agreements/CPC: {:.2}%", summary.agreement_rate);
    let _ = writeln!(out, "Payments/agreements: {:.2}%", summary.payment_rate);
    out.push_str("---------------------------------------\n");
}

fn push_bi(out: &mut String, bi: &BiReport) {
    out.push_str("\n--- DAILY BI REPORT ---\n");
    let _ = writeln!(out, "Total production today: {:.2}", bi.total_today);
    let _ = writeln!(out, "Average ticket today: {:.2}", bi.ticket_today);
    if let Some(delta) = &bi.versus_yesterday {
        out.push_str("\n--- COMPARED TO YESTERDAY ---\n");
        let _ = writeln!(
            out,
            "Production delta: {:+.2} ({:+.2}%)",
            delta.total_delta, delta.total_pct
        );
        let _ = writeln!(
            out,
            "Average ticket delta: {:+.2} ({:+.2}%)",
            delta.ticket_delta, delta.ticket_pct
        );
    }
    out.push_str("---------------------------------\n");
}

fn push_items(out: &mut String, items: &[MatchedItem]) {
    let _ = writeln!(out, "- Total items flagged: {}", items.len());
    out.push_str(&"=".repeat(50));
    out.push('\n');

    if items.is_empty() {
        out.push_str("\n** No items matched the configured rule. **\n");
        return;
    }

    out.push_str("\nMATCHED ITEMS:\n");
    for item in items {
        let _ = writeln!(out, "  > Item {} ({})", item.identifier, item.detail);
    }
}
