use std::collections::BTreeSet;

use crate::record::FieldMap;

/// Business column order for the persisted dataset.
pub const PRIORITY_COLUMNS: [&str; 106] = [
    "event_date",
    "event_location",
    "fighter_1",
    "fighter_2",
    "result",
    "method_main",
    "method_detail",
    "round",
    "time",
    "fighter_1_kd",
    "fighter_1_str",
    "fighter_1_td",
    "fighter_1_sub",
    "fighter_2_kd",
    "fighter_2_str",
    "fighter_2_td",
    "fighter_2_sub",
    "weight_class",
    "fighter_1_record",
    "fighter_1_height",
    "fighter_1_weight",
    "fighter_1_reach",
    "fighter_1_stance",
    "fighter_1_dob",
    "fighter_1_slpm",
    "fighter_1_str_acc",
    "fighter_1_sapm",
    "fighter_1_str_def",
    "fighter_1_td_avg",
    "fighter_1_td_acc",
    "fighter_1_td_def",
    "fighter_1_sub_avg",
    "fighter_2_record",
    "fighter_2_height",
    "fighter_2_weight",
    "fighter_2_reach",
    "fighter_2_stance",
    "fighter_2_dob",
    "fighter_2_slpm",
    "fighter_2_str_acc",
    "fighter_2_sapm",
    "fighter_2_str_def",
    "fighter_2_td_avg",
    "fighter_2_td_acc",
    "fighter_2_td_def",
    "fighter_2_sub_avg",
    "fighter_1_born",
    "fighter_1_gym",
    "fighter_2_born",
    "fighter_2_gym",
    "fighter_1_ufcwins",
    "fighter_1_ufcloss",
    "fighter_2_ufcwins",
    "fighter_2_ufcloss",
    "fighter_1_active",
    "fighter_2_active",
    "f1_total_kd",
    "f2_total_kd",
    "f1_sig_str_landed",
    "f1_sig_str_attempted",
    "f1_sig_str_pct",
    "f2_sig_str_landed",
    "f2_sig_str_attempted",
    "f2_sig_str_pct",
    "f1_total_str_landed",
    "f1_total_str_attempted",
    "f2_total_str_landed",
    "f2_total_str_attempted",
    "f1_td_landed",
    "f1_td_attempted",
    "f1_td_pct",
    "f2_td_landed",
    "f2_td_attempted",
    "f2_td_pct",
    "f1_sub_att",
    "f2_sub_att",
    "f1_reversals",
    "f2_reversals",
    "f1_ctrl_time",
    "f2_ctrl_time",
    "f1_head_landed",
    "f1_head_attempted",
    "f2_head_landed",
    "f2_head_attempted",
    "f1_body_landed",
    "f1_body_attempted",
    "f2_body_landed",
    "f2_body_attempted",
    "f1_leg_landed",
    "f1_leg_attempted",
    "f2_leg_landed",
    "f2_leg_attempted",
    "f1_distance_landed",
    "f1_distance_attempted",
    "f2_distance_landed",
    "f2_distance_attempted",
    "f1_clinch_landed",
    "f1_clinch_attempted",
    "f2_clinch_landed",
    "f2_clinch_attempted",
    "f1_ground_landed",
    "f1_ground_attempted",
    "f2_ground_landed",
    "f2_ground_attempted",
    "fighter_1_wins",
    "fighter_2_wins",
];

/// Every priority column, then every other column seen in `rows`, sorted.
#[must_use]
pub fn ordered_columns(rows: &[FieldMap]) -> Vec<String> {
    let priority = PRIORITY_COLUMNS.iter().copied().collect::<BTreeSet<_>>();
    let discovered = rows
        .iter()
        .flat_map(FieldMap::keys)
        .map(String::as_str)
        .filter(|column| !priority.contains(column))
        .collect::<BTreeSet<_>>();

    PRIORITY_COLUMNS
        .iter()
        .copied()
        .chain(discovered)
        .map(str::to_string)
        .collect()
}
