//! Classic five-field cron expressions.
//!
//! Fields are `minute hour day-of-month month day-of-week`. Each field accepts `*`, single
//! values, `a-b` ranges, `/n` steps and comma separated lists. Months and weekdays also accept
//! three-letter English names, weekday `7` is Sunday. The `@yearly`, `@annually`, `@monthly`,
//! `@weekly`, `@daily`, `@midnight` and `@hourly` macros are expanded before parsing.
//!
//! When both day fields are restricted a day matches if *either* of them matches, as in
//! Vixie cron.
use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::ModelError;

struct Field {
    name: &'static str,
    min: u32,
    max: u32,
    names: &'static [&'static str],
    name_base: u32,
}

const MINUTE: Field = Field {
    name: "minute",
    min: 0,
    max: 59,
    names: &[],
    name_base: 0,
};

const HOUR: Field = Field {
    name: "hour",
    min: 0,
    max: 23,
    names: &[],
    name_base: 0,
};

const DAY_OF_MONTH: Field = Field {
    name: "day-of-month",
    min: 1,
    max: 31,
    names: &[],
    name_base: 0,
};

const MONTH: Field = Field {
    name: "month",
    min: 1,
    max: 12,
    names: &[
        "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
    ],
    name_base: 1,
};

const DAY_OF_WEEK: Field = Field {
    name: "day-of-week",
    min: 0,
    max: 7,
    names: &["sun", "mon", "tue", "wed", "thu", "fri", "sat"],
    name_base: 0,
};

/// Parsed cron schedule. Serialized as its source expression.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Schedule {
    source: String,
    minutes: u64,
    hours: u64,
    days_of_month: u64,
    months: u64,
    days_of_week: u64,
    dom_restricted: bool,
    dow_restricted: bool,
}

impl Schedule {
    /// Source expression exactly as entered.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Whether the schedule fires during the minute containing `at`.
    pub fn matches(&self, at: OffsetDateTime) -> bool {
        let minute_ok = bit(self.minutes, u32::from(at.minute()));
        let hour_ok = bit(self.hours, u32::from(at.hour()));
        let month_ok = bit(self.months, u32::from(u8::from(at.month())));

        let dom_ok = bit(self.days_of_month, u32::from(at.day()));
        let dow_ok = bit(
            self.days_of_week,
            u32::from(at.weekday().number_days_from_sunday()),
        );
        let day_ok = if self.dom_restricted && self.dow_restricted {
            dom_ok || dow_ok
        } else {
            dom_ok && dow_ok
        };

        minute_ok && hour_ok && month_ok && day_ok
    }
}

impl FromStr for Schedule {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let source = s.trim();
        let expanded = expand_macro(source).unwrap_or(source);
        let invalid = |reason: String| ModelError::InvalidSchedule {
            expression: s.to_string(),
            reason,
        };

        let fields: Vec<&str> = expanded.split_whitespace().collect();
        let [minute, hour, dom, month, dow] = fields.as_slice() else {
            return Err(invalid(format!("expected 5 fields, got {}", fields.len())));
        };

        let minutes = parse_field(&MINUTE, minute).map_err(invalid)?;
        let hours = parse_field(&HOUR, hour).map_err(invalid)?;
        let days_of_month = parse_field(&DAY_OF_MONTH, dom).map_err(invalid)?;
        let months = parse_field(&MONTH, month).map_err(invalid)?;
        let mut days_of_week = parse_field(&DAY_OF_WEEK, dow).map_err(invalid)?;

        // 7 is an alias for Sunday.
        if bit(days_of_week, 7) {
            days_of_week = (days_of_week & !(1 << 7)) | 1;
        }

        Ok(Self {
            source: source.to_string(),
            minutes,
            hours,
            days_of_month,
            months,
            days_of_week,
            dom_restricted: !dom.starts_with('*'),
            dow_restricted: !dow.starts_with('*'),
        })
    }
}

impl TryFrom<String> for Schedule {
    type Error = ModelError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Schedule> for String {
    fn from(s: Schedule) -> Self {
        s.source
    }
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

fn expand_macro(s: &str) -> Option<&'static str> {
    match s.to_ascii_lowercase().as_str() {
        "@yearly" | "@annually" => Some("0 0 1 1 *"),
        "@monthly" => Some("0 0 1 * *"),
        "@weekly" => Some("0 0 * * 0"),
        "@daily" | "@midnight" => Some("0 0 * * *"),
        "@hourly" => Some("0 * * * *"),
        _ => None,
    }
}

#[inline]
fn bit(set: u64, n: u32) -> bool {
    set & (1 << n) != 0
}

fn parse_field(field: &Field, text: &str) -> Result<u64, String> {
    let mut set = 0u64;

    for item in text.split(',') {
        if item.is_empty() {
            return Err(format!("empty list item in {} field", field.name));
        }

        let (range, step) = match item.split_once('/') {
            Some((range, step)) => {
                let step: u32 = step
                    .parse()
                    .map_err(|_| format!("invalid step {step:?} in {} field", field.name))?;
                if step == 0 {
                    return Err(format!("zero step in {} field", field.name));
                }
                (range, Some(step))
            }
            None => (item, None),
        };

        let (lo, hi) = if range == "*" {
            (field.min, field.max)
        } else if let Some((a, b)) = range.split_once('-') {
            (parse_value(field, a)?, parse_value(field, b)?)
        } else {
            let v = parse_value(field, range)?;
            match step {
                Some(_) => (v, field.max),
                None => (v, v),
            }
        };

        if lo > hi {
            return Err(format!("range {lo}-{hi} is reversed in {} field", field.name));
        }

        for v in (lo..=hi).step_by(step.unwrap_or(1) as usize) {
            set |= 1 << v;
        }
    }

    Ok(set)
}

fn parse_value(field: &Field, s: &str) -> Result<u32, String> {
    let lower = s.to_ascii_lowercase();
    let value = match lower.parse::<u32>() {
        Ok(v) => v,
        Err(_) => field
            .names
            .iter()
            .position(|n| *n == lower)
            .map(|i| i as u32 + field.name_base)
            .ok_or_else(|| format!("invalid value {s:?} in {} field", field.name))?,
    };

    if value < field.min || value > field.max {
        return Err(format!(
            "value {value} out of range {}-{} in {} field",
            field.min, field.max, field.name
        ));
    }
    Ok(value)
}
