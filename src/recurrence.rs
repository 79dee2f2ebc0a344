//! Maintenance schedule recurrence arithmetic.

use chrono::{Days, Months, NaiveDate};

pub const FREQUENCIES: &[&str] = &[
    "daily",
    "weekly",
    "biweekly",
    "monthly",
    "quarterly",
    "biannual",
    "yearly",
    "seasonal",
    "as_needed",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frequency {
    Daily,
    Weekly,
    Biweekly,
    Monthly,
    Quarterly,
    Biannual,
    Yearly,
    Seasonal,
    AsNeeded,
}

impl Frequency {
    pub fn parse(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "daily" => Some(Frequency::Daily),
            "weekly" => Some(Frequency::Weekly),
            "biweekly" => Some(Frequency::Biweekly),
            "monthly" => Some(Frequency::Monthly),
            "quarterly" => Some(Frequency::Quarterly),
            "biannual" => Some(Frequency::Biannual),
            "yearly" => Some(Frequency::Yearly),
            "seasonal" => Some(Frequency::Seasonal),
            "as_needed" => Some(Frequency::AsNeeded),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Frequency::Daily => "daily",
            Frequency::Weekly => "weekly",
            Frequency::Biweekly => "biweekly",
            Frequency::Monthly => "monthly",
            Frequency::Quarterly => "quarterly",
            Frequency::Biannual => "biannual",
            Frequency::Yearly => "yearly",
            Frequency::Seasonal => "seasonal",
            Frequency::AsNeeded => "as_needed",
        }
    }
}

/// Next due date from a base date. `as_needed` has no automatic recurrence
/// and yields None; the schedule becomes manually triggered. Month-based
/// frequencies use calendar months, so Jan 31 + 1 month clamps to the end of
/// February.
pub fn next_due_date(frequency: Frequency, multiplier: u32, from: NaiveDate) -> Option<NaiveDate> {
    let multiplier = multiplier.max(1);
    match frequency {
        Frequency::Daily => from.checked_add_days(Days::new(u64::from(multiplier))),
        Frequency::Weekly => from.checked_add_days(Days::new(u64::from(7 * multiplier))),
        Frequency::Biweekly => from.checked_add_days(Days::new(u64::from(14 * multiplier))),
        Frequency::Monthly => from.checked_add_months(Months::new(multiplier)),
        Frequency::Quarterly => from.checked_add_months(Months::new(3 * multiplier)),
        Frequency::Biannual => from.checked_add_months(Months::new(6 * multiplier)),
        Frequency::Yearly => from.checked_add_months(Months::new(12 * multiplier)),
        Frequency::Seasonal => from.checked_add_months(Months::new(3 * multiplier)),
        Frequency::AsNeeded => None,
    }
}
