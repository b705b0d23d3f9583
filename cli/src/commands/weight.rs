use anyhow::{Result, bail};
use std::process;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use fittrack_core::models::NewWeightLog;
use fittrack_core::service::FitService;

use super::helpers::{json_error, no_neg_zero, parse_date, parse_optional_date};

const LBS_PER_KG: f64 = 2.20462;
const KG_PER_LB: f64 = 0.453_592;

fn to_kg(value: f64, unit: &str) -> Result<f64> {
    match unit.to_lowercase().as_str() {
        "kg" => Ok(value),
        "lbs" | "lb" => {
            let kg = no_neg_zero(value * KG_PER_LB);
            eprintln!("Converting {value:.1} lbs → {kg:.2} kg");
            Ok(kg)
        }
        _ => bail!("Invalid unit '{unit}'. Use 'kg' or 'lbs'"),
    }
}

pub(crate) fn cmd_weight_log(
    svc: &FitService,
    user: &str,
    value: f64,
    unit: &str,
    date: Option<String>,
    json: bool,
) -> Result<()> {
    let weight_kg = to_kg(value, unit)?;
    let log = svc.log_weight(
        user,
        &NewWeightLog {
            weight_kg,
            date: parse_date(date)?,
        },
    )?;

    if json {
        println!("{}", serde_json::to_string_pretty(&log)?);
    } else {
        println!(
            "Logged {:.1} kg ({:.1} lbs) for {}",
            log.weight_kg,
            log.weight_kg * LBS_PER_KG,
            log.date.format("%Y-%m-%d")
        );
    }
    Ok(())
}

pub(crate) fn cmd_weight_list(
    svc: &FitService,
    user: &str,
    from: Option<String>,
    to: Option<String>,
    limit: Option<u32>,
    json: bool,
) -> Result<()> {
    let logs = svc.list_weight_logs(
        user,
        parse_optional_date(from)?,
        parse_optional_date(to)?,
        limit,
    )?;

    if json {
        println!("{}", serde_json::to_string_pretty(&logs)?);
    } else if logs.is_empty() {
        eprintln!("No weight entries found. Use `fittrack weight log` to record your weight.");
    } else {
        #[derive(Tabled)]
        struct WeightRow {
            #[tabled(rename = "ID")]
            id: i64,
            #[tabled(rename = "Date")]
            date: String,
            #[tabled(rename = "Weight (kg)")]
            kg: String,
            #[tabled(rename = "Weight (lbs)")]
            lbs: String,
        }

        let rows: Vec<WeightRow> = logs
            .iter()
            .map(|e| WeightRow {
                id: e.id,
                date: e.date.format("%Y-%m-%d").to_string(),
                kg: format!("{:.1}", e.weight_kg),
                lbs: format!("{:.1}", e.weight_kg * LBS_PER_KG),
            })
            .collect();

        let table = Table::new(&rows)
            .with(Style::rounded())
            .with(Modify::new(Columns::new(2..4)).with(Alignment::right()))
            .to_string();
        println!("{table}");
    }
    Ok(())
}

pub(crate) fn cmd_weight_update(
    svc: &FitService,
    id: i64,
    value: f64,
    unit: &str,
    json: bool,
) -> Result<()> {
    let weight_kg = to_kg(value, unit)?;
    if let Some(log) = svc.update_weight(id, weight_kg)? {
        if json {
            println!("{}", serde_json::to_string_pretty(&log)?);
        } else {
            println!(
                "Updated {}: {:.1} kg ({:.1} lbs)",
                log.date.format("%Y-%m-%d"),
                log.weight_kg,
                log.weight_kg * LBS_PER_KG
            );
        }
        Ok(())
    } else {
        not_found(id, json)
    }
}

pub(crate) fn cmd_weight_delete(svc: &FitService, id: i64, json: bool) -> Result<()> {
    if svc.delete_weight(id)? {
        if json {
            println!("{}", serde_json::json!({ "deleted": id }));
        } else {
            println!("Deleted weight entry {id}");
        }
        Ok(())
    } else {
        not_found(id, json)
    }
}

fn not_found(id: i64, json: bool) -> Result<()> {
    if json {
        println!("{}", json_error(&format!("Weight entry {id} not found")));
    } else {
        eprintln!("Weight entry {id} not found");
    }
    process::exit(2);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_kg() {
        assert!((to_kg(80.0, "kg").unwrap() - 80.0).abs() < f64::EPSILON);
        assert!((to_kg(100.0, "LBS").unwrap() - 45.3592).abs() < 1e-9);
        assert!(to_kg(80.0, "stone").is_err());
    }
}
