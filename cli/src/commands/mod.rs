mod helpers;
mod meal;
mod report;
mod user;
mod weight;
mod workout;

pub(crate) use meal::{cmd_meal_add, cmd_meal_delete, cmd_meal_list, cmd_meal_update};
pub(crate) use report::{cmd_cache_invalidate, cmd_report};
pub(crate) use user::{cmd_user_delete, cmd_user_goals, cmd_user_register, cmd_user_show};
pub(crate) use weight::{cmd_weight_delete, cmd_weight_list, cmd_weight_log, cmd_weight_update};
pub(crate) use workout::{
    cmd_workout_add, cmd_workout_delete, cmd_workout_list, cmd_workout_update,
};
