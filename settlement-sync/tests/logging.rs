use chrono::{Local, TimeZone};
use settlement_sync::logging::log_file_name;

#[test]
fn log_file_name_uses_day_month_year_and_time() {
    let started = Local.with_ymd_and_hms(2024, 11, 2, 3, 15, 9).unwrap();
    assert_eq!(log_file_name(started), "log_021124_03_15_09.txt");
}
