use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Timelike, Utc};
use chrono_tz::Tz;
use regex::Regex;
use serde::Deserialize;
use tracing::warn;

const TIMEZONE_CONFIG_FILE: &str = "dayboard-time.toml";
const TIMEZONE_ENV_VAR: &str = "DAYBOARD_TIMEZONE";
const TIMEZONE_CONFIG_ENV_VAR: &str = "DAYBOARD_TIME_CONFIG";

#[derive(Debug, Deserialize)]
struct TimezoneConfig {
    timezone: Option<String>,
    time: Option<TimezoneSection>,
}

#[derive(Debug, Deserialize)]
struct TimezoneSection {
    timezone: Option<String>,
}

/// The board's wall clock. Every "local" computation in the engine (due
/// times, end-of-day, civil today) goes through this zone so results are
/// reproducible across machines; resolution order is the env var, then the
/// optional toml file, then UTC.
pub fn board_timezone() -> &'static Tz {
    static BOARD_TZ: OnceLock<Tz> = OnceLock::new();
    BOARD_TZ.get_or_init(resolve_board_timezone)
}

fn resolve_board_timezone() -> Tz {
    if let Ok(raw) = std::env::var(TIMEZONE_ENV_VAR) {
        if let Some(tz) = parse_timezone(&raw, TIMEZONE_ENV_VAR) {
            return tz;
        }
    }

    if let Some(path) = timezone_config_path() {
        if let Some(tz) = read_timezone_config(&path) {
            return tz;
        }
    }

    Tz::UTC
}

fn timezone_config_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var(TIMEZONE_CONFIG_ENV_VAR) {
        return Some(PathBuf::from(path));
    }
    let candidate = PathBuf::from(TIMEZONE_CONFIG_FILE);
    candidate.exists().then_some(candidate)
}

fn read_timezone_config(path: &Path) -> Option<Tz> {
    let text = fs::read_to_string(path).ok()?;
    let parsed: TimezoneConfig = match toml::from_str(&text) {
        Ok(parsed) => parsed,
        Err(err) => {
            warn!(file = %path.display(), error = %err, "ignoring malformed timezone config");
            return None;
        }
    };
    let raw = parsed
        .timezone
        .or_else(|| parsed.time.and_then(|section| section.timezone))?;
    parse_timezone(&raw, &path.display().to_string())
}

fn parse_timezone(raw: &str, source: &str) -> Option<Tz> {
    match raw.trim().parse::<Tz>() {
        Ok(tz) => Some(tz),
        Err(_) => {
            warn!(source, value = %raw, "unrecognized timezone; ignoring");
            None
        }
    }
}

/// Civil date of `now` on the board's wall clock.
#[must_use]
pub fn today(now: DateTime<Utc>) -> NaiveDate {
    now.with_timezone(board_timezone()).date_naive()
}

/// Due timestamp for a task on `date`: the given time of day with seconds
/// zeroed, else 23:59:59, both board-local.
#[must_use]
pub fn due_at_on(date: NaiveDate, time_of_day: Option<NaiveTime>) -> Option<DateTime<Utc>> {
    let time = match time_of_day {
        Some(t) => t.with_second(0)?.with_nanosecond(0)?,
        None => NaiveTime::from_hms_opt(23, 59, 59)?,
    };

    let local = date.and_time(time);
    let tz = board_timezone();
    // A wall time inside a DST gap rolls forward an hour.
    let resolved = tz
        .from_local_datetime(&local)
        .earliest()
        .or_else(|| tz.from_local_datetime(&(local + Duration::hours(1))).earliest())?;

    Some(resolved.with_timezone(&Utc))
}

/// Strict `HH:MM` wall-clock parse. Anything else is `None`; the store
/// treats a missing time as "end of day", never as an error.
#[must_use]
pub fn parse_time_of_day(raw: &str) -> Option<NaiveTime> {
    static TIME_RE: OnceLock<Regex> = OnceLock::new();
    let re = TIME_RE.get_or_init(|| Regex::new(r"^(\d{1,2}):(\d{2})$").expect("valid time regex"));

    let caps = re.captures(raw.trim())?;
    let hours: u32 = caps[1].parse().ok()?;
    let minutes: u32 = caps[2].parse().ok()?;
    NaiveTime::from_hms_opt(hours, minutes, 0)
}

/// Human due-distance label. Unit counts round at every step on the way
/// up (seconds to minutes to hours to days), matching how people read
/// "in 2 days" rather than "in 47 hours".
#[must_use]
pub fn format_relative(delta: Duration) -> String {
    let abs_ms = delta.num_milliseconds().unsigned_abs();
    let secs = div_round(abs_ms, 1000);
    let mins = div_round(secs, 60);
    let hours = div_round(mins, 60);
    let days = div_round(hours, 24);

    let text = if secs < 45 {
        "moments".to_string()
    } else if mins < 45 {
        pluralize(mins, "min")
    } else if hours < 36 {
        pluralize(hours, "hr")
    } else {
        pluralize(days, "day")
    };

    if delta >= Duration::zero() {
        format!("in {text}")
    } else {
        format!("{text} ago")
    }
}

fn div_round(value: u64, unit: u64) -> u64 {
    (value + unit / 2) / unit
}

fn pluralize(count: u64, unit: &str) -> String {
    if count == 1 {
        format!("{count} {unit}")
    } else {
        format!("{count} {unit}s")
    }
}
