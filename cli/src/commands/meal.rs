use anyhow::Result;
use std::process;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use fittrack_core::models::{Macros, Meal, NewMeal, UpdateMeal};
use fittrack_core::service::FitService;

use super::helpers::{json_error, parse_meal_time, parse_optional_date, truncate};

#[allow(clippy::too_many_arguments)]
pub(crate) fn cmd_meal_add(
    svc: &FitService,
    user: &str,
    name: &str,
    calories: i64,
    protein: f64,
    carbs: f64,
    fat: f64,
    time: Option<String>,
    notes: Option<String>,
    json: bool,
) -> Result<()> {
    let meal = svc.log_meal(
        user,
        &NewMeal {
            name: name.to_string(),
            calories,
            macros: Macros {
                protein,
                carbs,
                fat,
            },
            time: parse_meal_time(time)?,
            notes,
        },
    )?;

    if json {
        println!("{}", serde_json::to_string_pretty(&meal)?);
    } else {
        print_meal("Logged", &meal);
    }
    Ok(())
}

pub(crate) fn cmd_meal_list(
    svc: &FitService,
    user: &str,
    from: Option<String>,
    to: Option<String>,
    limit: Option<u32>,
    json: bool,
) -> Result<()> {
    let meals = svc.list_meals(
        user,
        parse_optional_date(from)?,
        parse_optional_date(to)?,
        limit,
    )?;

    if json {
        println!("{}", serde_json::to_string_pretty(&meals)?);
    } else if meals.is_empty() {
        eprintln!("No meals found. Use `fittrack meal add` to log one.");
    } else {
        #[derive(Tabled)]
        struct MealRow {
            #[tabled(rename = "ID")]
            id: i64,
            #[tabled(rename = "Time")]
            time: String,
            #[tabled(rename = "Meal")]
            name: String,
            #[tabled(rename = "Cal")]
            calories: i64,
            #[tabled(rename = "Protein")]
            protein: String,
            #[tabled(rename = "Carbs")]
            carbs: String,
            #[tabled(rename = "Fat")]
            fat: String,
        }

        let rows: Vec<MealRow> = meals
            .iter()
            .map(|m| MealRow {
                id: m.id,
                time: m.time.format("%Y-%m-%d %H:%M").to_string(),
                name: truncate(&m.name, 35),
                calories: m.calories,
                protein: format!("{:.1}", m.macros.protein),
                carbs: format!("{:.1}", m.macros.carbs),
                fat: format!("{:.1}", m.macros.fat),
            })
            .collect();

        let total: i64 = meals.iter().map(|m| m.calories).sum();
        let table = Table::new(&rows)
            .with(Style::rounded())
            .with(Modify::new(Columns::new(3..7)).with(Alignment::right()))
            .to_string();
        println!("{table}");
        println!("Total: {total} kcal across {} meals", meals.len());
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub(crate) fn cmd_meal_update(
    svc: &FitService,
    id: i64,
    name: Option<String>,
    calories: Option<i64>,
    protein: Option<f64>,
    carbs: Option<f64>,
    fat: Option<f64>,
    time: Option<String>,
    notes: Option<String>,
    json: bool,
) -> Result<()> {
    // Partial macro updates keep the stored values for the others
    let macros = if protein.is_some() || carbs.is_some() || fat.is_some() {
        let current = svc.get_meal(id)?.map(|m| m.macros).unwrap_or_default();
        Some(Macros {
            protein: protein.unwrap_or(current.protein),
            carbs: carbs.unwrap_or(current.carbs),
            fat: fat.unwrap_or(current.fat),
        })
    } else {
        None
    };

    let update = UpdateMeal {
        name,
        calories,
        macros,
        time: time.map(|t| parse_meal_time(Some(t))).transpose()?,
        notes,
    };

    if let Some(meal) = svc.update_meal(id, &update)? {
        if json {
            println!("{}", serde_json::to_string_pretty(&meal)?);
        } else {
            print_meal("Updated", &meal);
        }
        Ok(())
    } else {
        not_found(id, json)
    }
}

pub(crate) fn cmd_meal_delete(svc: &FitService, id: i64, json: bool) -> Result<()> {
    if svc.delete_meal(id)? {
        if json {
            println!("{}", serde_json::json!({ "deleted": id }));
        } else {
            println!("Deleted meal {id}");
        }
        Ok(())
    } else {
        not_found(id, json)
    }
}

fn print_meal(verb: &str, meal: &Meal) {
    println!(
        "{verb} #{}: {} ({} kcal) at {}",
        meal.id,
        meal.name,
        meal.calories,
        meal.time.format("%Y-%m-%d %H:%M")
    );
    println!(
        "  P: {:.1}g  C: {:.1}g  F: {:.1}g",
        meal.macros.protein, meal.macros.carbs, meal.macros.fat
    );
}

fn not_found(id: i64, json: bool) -> Result<()> {
    if json {
        println!("{}", json_error(&format!("Meal {id} not found")));
    } else {
        eprintln!("Meal {id} not found");
    }
    process::exit(2);
}
