use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, Month, OffsetDateTime, PrimitiveDateTime};

pub(crate) fn primitive_now_utc() -> PrimitiveDateTime {
    let now = OffsetDateTime::now_utc();
    PrimitiveDateTime::new(now.date(), now.time())
}

pub(crate) fn today_utc() -> Date {
    OffsetDateTime::now_utc().date()
}

pub(crate) fn format_primitive(value: PrimitiveDateTime) -> String {
    value.assume_utc().format(&Rfc3339).unwrap_or_else(|_| value.assume_utc().to_string())
}

/// Calendar dates travel as `YYYY-MM-DD`.
pub(crate) fn parse_date(value: &str) -> Option<Date> {
    Date::parse(value.trim(), format_description!("[year]-[month]-[day]")).ok()
}

pub(crate) fn format_date(value: Date) -> String {
    value
        .format(format_description!("[year]-[month]-[day]"))
        .unwrap_or_else(|_| value.to_string())
}

pub(crate) fn month_start(value: Date) -> Date {
    value.replace_day(1).unwrap_or(value)
}

/// First day of the month `offset` months away from `value`'s month.
pub(crate) fn shift_month(value: Date, offset: i32) -> Date {
    let month_index = value.year() * 12 + (value.month() as i32 - 1) + offset;
    let year = month_index.div_euclid(12);
    let month = Month::try_from((month_index.rem_euclid(12) + 1) as u8).unwrap_or(Month::January);
    Date::from_calendar_date(year, month, 1).unwrap_or_else(|_| month_start(value))
}

/// Month starts covering the `months` most recent calendar months, oldest first.
pub(crate) fn trailing_month_starts(today: Date, months: u32) -> Vec<Date> {
    let months = months.max(1) as i32;
    (0..months).rev().map(|back| shift_month(today, -back)).collect()
}
