use crate::models::User;
use crate::report::Period;
use crate::stats::{NutritionStats, WeightTrend, WorkoutStats, round_to};

/// Render a fractional quantity with at least one decimal place (`45.0`, `2433.3`).
#[must_use]
pub fn fmt_num(value: f64) -> String {
    if value.fract() == 0.0 && value.is_finite() {
        format!("{value:.1}")
    } else {
        format!("{value}")
    }
}

fn fmt_signed(value: f64) -> String {
    if value > 0.0 {
        format!("+{}", fmt_num(value))
    } else {
        fmt_num(value)
    }
}

/// Build the plain-text report summary. Lines are joined with `\n`, no trailing newline.
#[must_use]
pub fn format_summary(
    user: &User,
    period: &Period,
    workouts: &WorkoutStats,
    nutrition: &NutritionStats,
    weight: &WeightTrend,
) -> String {
    let mut lines = vec![
        format!(
            "Fitness Report for {} ({} to {})",
            user.username, period.start, period.end
        ),
        format!("Period: {} days", period.days),
        String::new(),
    ];

    if workouts.total_workouts > 0 {
        let b = &workouts.intensity_breakdown;
        lines.push(format!(
            "🏋️ Workouts: {} sessions, {} total minutes",
            workouts.total_workouts, workouts.total_minutes
        ));
        lines.push(format!(
            "   Average duration: {} minutes",
            fmt_num(workouts.average_duration)
        ));
        lines.push(format!(
            "   Intensity: {} low, {} medium, {} high",
            b.low, b.medium, b.high
        ));
    } else {
        lines.push("🏋️ No workouts logged in this period".to_string());
    }
    lines.push(String::new());

    if nutrition.total_meals > 0 {
        let m = &nutrition.average_daily_macros;
        lines.push(format!(
            "🍽️ Nutrition: {} meals logged",
            nutrition.total_meals
        ));
        lines.push(format!(
            "   Average daily calories: {}",
            fmt_num(nutrition.average_daily_calories)
        ));
        lines.push(format!(
            "   Average daily macros: P:{}g, C:{}g, F:{}g",
            fmt_num(m.protein),
            fmt_num(m.carbs),
            fmt_num(m.fat)
        ));
    } else {
        lines.push("🍽️ No meals logged in this period".to_string());
    }
    lines.push(String::new());

    match (weight.start_weight, weight.end_weight, weight.change) {
        (Some(start), Some(end), Some(change)) if weight.entries > 0 => {
            lines.push(format!("⚖️ Weight: {} measurements", weight.entries));
            lines.push(format!("   Start: {} kg", fmt_num(start)));
            lines.push(format!("   End: {} kg", fmt_num(end)));
            lines.push(format!(
                "   Change: {} kg ({})",
                fmt_signed(change),
                weight.trend
            ));
            if let Some(target) = user.goals.target_weight.filter(|t| *t != 0.0) {
                lines.push(target_line(target, end));
            }
        }
        _ => lines.push("⚖️ No weight measurements in this period".to_string()),
    }

    if workouts.total_workouts > 0 {
        if let Some(goal) = user.goals.weekly_workout_minutes.filter(|g| *g != 0) {
            lines.extend(goal_lines(goal, workouts.total_minutes, period.days));
        }
    }

    lines.join("\n")
}

fn target_line(target: f64, end: f64) -> String {
    let diff = round_to(end - target, 2);
    let status = if diff > 0.0 {
        format!("{} kg above target", fmt_num(diff))
    } else if diff < 0.0 {
        format!("{} kg below target", fmt_num(diff.abs()))
    } else {
        "target reached!".to_string()
    };
    format!("   Target: {} kg ({status})", fmt_num(target))
}

#[allow(clippy::cast_precision_loss)]
fn goal_lines(goal: i64, total_minutes: i64, days: i64) -> Vec<String> {
    let weeks = days as f64 / 7.0;
    let actual = total_minutes as f64 / weeks;

    let mut lines = vec![
        String::new(),
        format!("📊 Weekly workout goal: {goal} minutes"),
        format!(
            "   Actual average: {} minutes/week",
            fmt_num(round_to(actual, 1))
        ),
    ];
    if actual >= goal as f64 {
        lines.push("   ✅ Goal achieved!".to_string());
    } else {
        let deficit = round_to(goal as f64 - actual, 1);
        lines.push(format!(
            "   ⚠️ {} minutes short of weekly goal",
            fmt_num(deficit)
        ));
    }
    lines
}
