use anyhow::Result;
use std::process;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use fittrack_core::models::{NewWorkout, UpdateWorkout};
use fittrack_core::service::FitService;

use super::helpers::{json_error, parse_date, parse_intensity, parse_optional_date, truncate};

#[allow(clippy::too_many_arguments)]
pub(crate) fn cmd_workout_add(
    svc: &FitService,
    user: &str,
    activity: &str,
    minutes: i64,
    intensity: &str,
    date: Option<String>,
    notes: Option<String>,
    json: bool,
) -> Result<()> {
    let workout = svc.log_workout(
        user,
        &NewWorkout {
            activity: activity.to_string(),
            duration_minutes: minutes,
            intensity: parse_intensity(intensity)?,
            date: parse_date(date)?,
            notes,
        },
    )?;

    if json {
        println!("{}", serde_json::to_string_pretty(&workout)?);
    } else {
        println!(
            "Logged #{}: {} for {} min ({}) on {}",
            workout.id,
            workout.activity,
            workout.duration_minutes,
            workout.intensity,
            workout.date.format("%Y-%m-%d")
        );
    }
    Ok(())
}

pub(crate) fn cmd_workout_list(
    svc: &FitService,
    user: &str,
    from: Option<String>,
    to: Option<String>,
    limit: Option<u32>,
    json: bool,
) -> Result<()> {
    let workouts = svc.list_workouts(
        user,
        parse_optional_date(from)?,
        parse_optional_date(to)?,
        limit,
    )?;

    if json {
        println!("{}", serde_json::to_string_pretty(&workouts)?);
    } else if workouts.is_empty() {
        eprintln!("No workouts found. Use `fittrack workout add` to log one.");
    } else {
        #[derive(Tabled)]
        struct WorkoutRow {
            #[tabled(rename = "ID")]
            id: i64,
            #[tabled(rename = "Date")]
            date: String,
            #[tabled(rename = "Activity")]
            activity: String,
            #[tabled(rename = "Minutes")]
            minutes: i64,
            #[tabled(rename = "Intensity")]
            intensity: String,
            #[tabled(rename = "Notes")]
            notes: String,
        }

        let rows: Vec<WorkoutRow> = workouts
            .iter()
            .map(|w| WorkoutRow {
                id: w.id,
                date: w.date.format("%Y-%m-%d").to_string(),
                activity: truncate(&w.activity, 30),
                minutes: w.duration_minutes,
                intensity: w.intensity.to_string(),
                notes: w.notes.as_deref().map(|n| truncate(n, 40)).unwrap_or_default(),
            })
            .collect();

        let table = Table::new(&rows)
            .with(Style::rounded())
            .with(Modify::new(Columns::single(3)).with(Alignment::right()))
            .to_string();
        println!("{table}");
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub(crate) fn cmd_workout_update(
    svc: &FitService,
    id: i64,
    activity: Option<String>,
    minutes: Option<i64>,
    intensity: Option<String>,
    date: Option<String>,
    notes: Option<String>,
    json: bool,
) -> Result<()> {
    let update = UpdateWorkout {
        activity,
        duration_minutes: minutes,
        intensity: intensity.as_deref().map(parse_intensity).transpose()?,
        date: parse_optional_date(date)?,
        notes,
    };

    if let Some(workout) = svc.update_workout(id, &update)? {
        if json {
            println!("{}", serde_json::to_string_pretty(&workout)?);
        } else {
            println!(
                "Updated #{}: {} for {} min ({}) on {}",
                workout.id,
                workout.activity,
                workout.duration_minutes,
                workout.intensity,
                workout.date.format("%Y-%m-%d")
            );
        }
        Ok(())
    } else {
        not_found(id, json)
    }
}

pub(crate) fn cmd_workout_delete(svc: &FitService, id: i64, json: bool) -> Result<()> {
    if svc.delete_workout(id)? {
        if json {
            println!("{}", serde_json::json!({ "deleted": id }));
        } else {
            println!("Deleted workout {id}");
        }
        Ok(())
    } else {
        not_found(id, json)
    }
}

fn not_found(id: i64, json: bool) -> Result<()> {
    if json {
        println!("{}", json_error(&format!("Workout {id} not found")));
    } else {
        eprintln!("Workout {id} not found");
    }
    process::exit(2);
}
