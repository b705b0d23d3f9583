use anyhow::{Result, bail};
use std::process;

use fittrack_core::models::{FitnessGoals, NewUser, User};
use fittrack_core::service::FitService;

use super::helpers::{json_error, parse_optional_date};

#[allow(clippy::too_many_arguments)]
pub(crate) fn cmd_user_register(
    svc: &FitService,
    username: &str,
    email: &str,
    full_name: Option<String>,
    dob: Option<String>,
    target_weight: Option<f64>,
    weekly_minutes: Option<i64>,
    json: bool,
) -> Result<()> {
    let user = svc.register_user(&NewUser {
        username: username.to_string(),
        email: email.to_string(),
        full_name,
        dob: parse_optional_date(dob)?,
        goals: FitnessGoals {
            target_weight,
            weekly_workout_minutes: weekly_minutes,
        },
    })?;

    if json {
        println!("{}", serde_json::to_string_pretty(&user)?);
    } else {
        println!("Registered {} ({})", user.username, user.identity);
    }
    Ok(())
}

pub(crate) fn cmd_user_show(svc: &FitService, user: &str, json: bool) -> Result<()> {
    let user = svc.resolve_user(user)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&user)?);
    } else {
        print_user(&user);
    }
    Ok(())
}

pub(crate) fn cmd_user_goals(
    svc: &FitService,
    user: &str,
    target_weight: Option<f64>,
    weekly_minutes: Option<i64>,
    clear: bool,
    json: bool,
) -> Result<()> {
    let goals = if clear {
        FitnessGoals::default()
    } else {
        if target_weight.is_none() && weekly_minutes.is_none() {
            bail!("Nothing to update. Provide --target-weight, --weekly-minutes or --clear");
        }
        let current = svc.resolve_user(user)?.goals;
        FitnessGoals {
            target_weight: target_weight.or(current.target_weight),
            weekly_workout_minutes: weekly_minutes.or(current.weekly_workout_minutes),
        }
    };

    let user = svc.set_goals(user, &goals)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&user)?);
    } else {
        println!("Updated goals for {}", user.username);
        print_goals(&user.goals);
    }
    Ok(())
}

pub(crate) fn cmd_user_delete(svc: &FitService, username: &str, json: bool) -> Result<()> {
    if let Some(user) = svc.delete_user(username)? {
        if json {
            println!(
                "{}",
                serde_json::json!({ "deleted": user.username, "identity": user.identity })
            );
        } else {
            println!("Deleted {} and all of their records", user.username);
        }
        Ok(())
    } else {
        if json {
            println!("{}", json_error(&format!("User '{username}' not found")));
        } else {
            eprintln!("User '{username}' not found");
        }
        process::exit(2);
    }
}

fn print_user(user: &User) {
    println!("{} ({})", user.username, user.identity);
    println!("  Email:  {}", user.email);
    if let Some(ref name) = user.full_name {
        println!("  Name:   {name}");
    }
    if let Some(dob) = user.dob {
        println!("  Born:   {}", dob.format("%Y-%m-%d"));
    }
    print_goals(&user.goals);
}

fn print_goals(goals: &FitnessGoals) {
    match goals.target_weight {
        Some(kg) => println!("  Target weight: {kg:.1} kg"),
        None => println!("  Target weight: -"),
    }
    match goals.weekly_workout_minutes {
        Some(m) => println!("  Weekly workout goal: {m} minutes"),
        None => println!("  Weekly workout goal: -"),
    }
}
