use anyhow::Result;
use chrono::{Local, NaiveDate};

use fittrack_core::service::FitService;

use super::helpers::parse_optional_date;

const DEFAULT_WINDOW_DAYS: i64 = 7;

/// Resolve `--from`/`--to`, defaulting to the seven days ending today.
pub(crate) fn report_window(
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
    today: NaiveDate,
) -> (NaiveDate, NaiveDate) {
    let end = to.unwrap_or(today);
    let start = from.unwrap_or(end - chrono::Duration::days(DEFAULT_WINDOW_DAYS - 1));
    (start, end)
}

pub(crate) fn cmd_report(
    svc: &FitService,
    user: &str,
    from: Option<String>,
    to: Option<String>,
    no_cache: bool,
    json: bool,
) -> Result<()> {
    let (start, end) = report_window(
        parse_optional_date(from)?,
        parse_optional_date(to)?,
        Local::now().date_naive(),
    );
    let report = svc.generate_report(user, start, end, !no_cache)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", report.summary);
        if report.from_cache {
            eprintln!("\n(served from cache)");
        }
    }
    Ok(())
}

pub(crate) fn cmd_cache_invalidate(svc: &FitService, user: &str, json: bool) -> Result<()> {
    let user = svc.resolve_user(user)?;
    let removed = svc.invalidate_reports(&user.identity)?;

    if json {
        println!(
            "{}",
            serde_json::json!({ "user": user.username, "invalidated": removed })
        );
    } else {
        println!("Invalidated {removed} cached report(s) for {}", user.username);
    }
    Ok(())
}
