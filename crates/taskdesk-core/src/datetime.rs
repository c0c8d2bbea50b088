use std::fs;
use std::path::PathBuf;
use std::sync::OnceLock;

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Timelike, Utc};
use chrono_tz::Tz;
use regex::Regex;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::i18n::{self, Lang};

/// Neutral placeholder for anything that failed to parse or was never
/// supplied. Rendering must degrade to this, never panic.
pub const PLACEHOLDER: &str = "—";

const TIMEZONE_CONFIG_FILE: &str = "taskdesk-time.toml";
const TIMEZONE_ENV_VAR: &str = "TASKDESK_TIMEZONE";
const TIMEZONE_CONFIG_ENV_VAR: &str = "TASKDESK_TIME_CONFIG";

#[derive(Debug, Deserialize)]
struct TimezoneConfig {
    timezone: Option<String>,
    time: Option<TimezoneSection>,
}

#[derive(Debug, Deserialize)]
struct TimezoneSection {
    timezone: Option<String>,
}

/// Timezone the viewer's "today" is computed in. Resolved once from
/// the environment or `taskdesk-time.toml`; defaults to UTC.
pub fn viewer_timezone() -> &'static Tz {
    static VIEWER_TZ: OnceLock<Tz> = OnceLock::new();
    VIEWER_TZ.get_or_init(resolve_viewer_timezone)
}

fn resolve_viewer_timezone() -> Tz {
    if let Ok(raw) = std::env::var(TIMEZONE_ENV_VAR)
        && let Some(tz) = parse_timezone(&raw, TIMEZONE_ENV_VAR)
    {
        return tz;
    }

    if let Some(path) = timezone_config_path()
        && let Some(tz) = load_timezone_from_file(&path)
    {
        return tz;
    }

    chrono_tz::UTC
}

fn timezone_config_path() -> Option<PathBuf> {
    if let Ok(raw) = std::env::var(TIMEZONE_CONFIG_ENV_VAR) {
        let trimmed = raw.trim();
        if !trimmed.is_empty() {
            return Some(PathBuf::from(trimmed));
        }
    }

    std::env::current_dir()
        .ok()
        .map(|dir| dir.join(TIMEZONE_CONFIG_FILE))
}

fn load_timezone_from_file(path: &PathBuf) -> Option<Tz> {
    if !path.exists() {
        debug!(file = %path.display(), "timezone config file not found");
        return None;
    }

    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) => {
            warn!(file = %path.display(), error = %err, "failed reading timezone config file");
            return None;
        }
    };

    let parsed = match toml::from_str::<TimezoneConfig>(&raw) {
        Ok(parsed) => parsed,
        Err(err) => {
            warn!(file = %path.display(), error = %err, "failed parsing timezone config file");
            return None;
        }
    };

    let timezone = parsed
        .timezone
        .or_else(|| parsed.time.and_then(|section| section.timezone));
    let Some(timezone) = timezone else {
        warn!(file = %path.display(), "timezone config had no timezone field");
        return None;
    };

    parse_timezone(timezone.as_str(), &format!("file:{}", path.display()))
}

fn parse_timezone(raw: &str, source: &str) -> Option<Tz> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        warn!(source, "timezone source was empty");
        return None;
    }

    match trimmed.parse::<Tz>() {
        Ok(tz) => {
            debug!(source, timezone = %trimmed, "configured viewer timezone");
            Some(tz)
        }
        Err(err) => {
            warn!(source, timezone = %trimmed, error = %err, "failed to parse timezone id");
            None
        }
    }
}

/// The viewer's calendar day for `now`, used by the overdue rule.
#[must_use]
pub fn today_for_viewer(now: DateTime<Utc>) -> NaiveDate {
    now.with_timezone(viewer_timezone()).date_naive()
}

fn strip_fraction(raw: &str) -> String {
    let Ok(fraction_re) = Regex::new(r"\.\d+$") else {
        return raw.to_string();
    };
    fraction_re.replace(raw, "").into_owned()
}

/// Lenient parse of a wire datetime string. The server sends
/// `YYYY-MM-DD HH:MM:SS[.ffffff]`; `T`-separated, second-less and
/// date-only forms are accepted too. Returns `None` (and logs) on
/// anything else.
pub fn parse_wire_datetime(raw: &str) -> Option<NaiveDateTime> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let trimmed = strip_fraction(trimmed);

    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(&trimmed, format) {
            return Some(dt);
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(&trimmed, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0);
    }

    warn!(raw, "unparseable wire datetime; rendering placeholder");
    None
}

/// `DD/MM/YYYY HH:MM` for table cells; placeholder when missing or
/// malformed.
pub fn format_compact(raw: Option<&str>) -> String {
    let Some(raw) = raw else {
        return PLACEHOLDER.to_string();
    };
    match parse_wire_datetime(raw) {
        Some(dt) => dt.format("%d/%m/%Y %H:%M").to_string(),
        None => PLACEHOLDER.to_string(),
    }
}

/// Long human form in the configured language, e.g.
/// `Tuesday, 22 July 2025, 3:00 PM` / `الثلاثاء، 22 يوليو 2025، 3:00 م`.
pub fn format_verbose(raw: Option<&str>, lang: Lang) -> String {
    let Some(raw) = raw else {
        return PLACEHOLDER.to_string();
    };
    match parse_wire_datetime(raw) {
        Some(dt) => verbose(dt, lang),
        None => PLACEHOLDER.to_string(),
    }
}

fn verbose(dt: NaiveDateTime, lang: Lang) -> String {
    let comma = match lang {
        Lang::En => ", ",
        Lang::Ar => "، ",
    };
    format!(
        "{weekday}{comma}{day} {month} {year}{comma}{clock}",
        weekday = i18n::weekday_name(lang, dt.weekday()),
        day = dt.day(),
        month = i18n::month_name(lang, dt.month()),
        year = dt.year(),
        clock = clock(dt, lang),
    )
}

fn clock(dt: NaiveDateTime, lang: Lang) -> String {
    let (is_pm, hour) = dt.hour12();
    format!("{}:{:02} {}", hour, dt.minute(), i18n::meridiem(lang, is_pm))
}

fn format_clock(raw: Option<&str>, lang: Lang) -> String {
    let Some(raw) = raw else {
        return PLACEHOLDER.to_string();
    };
    match parse_wire_datetime(raw) {
        Some(dt) => clock(dt, lang),
        None => PLACEHOLDER.to_string(),
    }
}

/// Dual-timezone rendering of a due date: the local instant prominent,
/// the UTC instant secondary. Both instants are pre-computed by the
/// server; this is formatting only.
///
/// `Tuesday, 22 July 2025, 3:00 PM — Timezone: Africa/Cairo (UTC: 1:00 PM)`
pub fn dual_display(
    utc: Option<&str>,
    local: Option<&str>,
    tz_label: Option<&str>,
    lang: Lang,
) -> String {
    if let Some(local) = local {
        let label = match tz_label {
            Some(label) => {
                if label.parse::<Tz>().is_err() {
                    warn!(label, "unknown timezone label on task; displaying as-is");
                }
                label.to_string()
            }
            None => PLACEHOLDER.to_string(),
        };
        return format!(
            "{} — Timezone: {} (UTC: {})",
            format_verbose(Some(local), lang),
            label,
            format_clock(utc, lang)
        );
    }

    format!(
        "{} — Timezone: {}",
        format_verbose(utc, lang),
        PLACEHOLDER
    )
}

/// Calendar-day overdue predicate: the due day (time zeroed) is
/// strictly before `today`. Status is the caller's concern; malformed
/// and missing dates are never overdue.
pub fn overdue_on(local_due: Option<&str>, today: NaiveDate) -> bool {
    let Some(raw) = local_due else {
        return false;
    };
    match parse_wire_datetime(raw) {
        Some(dt) => dt.date() < today,
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::{dual_display, format_compact, format_verbose, overdue_on, PLACEHOLDER};
    use crate::i18n::Lang;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn malformed_date_degrades_to_placeholder() {
        assert_eq!(format_compact(Some("not a date")), PLACEHOLDER);
        assert_eq!(
            format_verbose(Some("2025-99-99 10:00:00"), Lang::En),
            PLACEHOLDER
        );
        assert_eq!(format_compact(None), PLACEHOLDER);
    }

    #[test]
    fn compact_format_matches_dashboard_cells() {
        assert_eq!(
            format_compact(Some("2025-07-22 15:00:00")),
            "22/07/2025 15:00"
        );
        assert_eq!(format_compact(Some("2025-07-22")), "22/07/2025 00:00");
    }

    #[test]
    fn fractional_seconds_are_accepted() {
        assert_eq!(
            format_compact(Some("2025-07-22 15:00:00.000123")),
            "22/07/2025 15:00"
        );
    }

    #[test]
    fn dual_display_shows_local_prominently() {
        let rendered = dual_display(
            Some("2025-07-22 13:00:00"),
            Some("2025-07-22 15:00:00"),
            Some("Africa/Cairo"),
            Lang::En,
        );
        assert_eq!(
            rendered,
            "Tuesday, 22 July 2025, 3:00 PM — Timezone: Africa/Cairo (UTC: 1:00 PM)"
        );
    }

    #[test]
    fn dual_display_without_local_falls_back_to_utc() {
        let rendered = dual_display(Some("2025-07-22 13:00:00"), None, None, Lang::En);
        assert_eq!(
            rendered,
            "Tuesday, 22 July 2025, 1:00 PM — Timezone: —"
        );
    }

    #[test]
    fn verbose_format_localizes_date_names() {
        assert_eq!(
            format_verbose(Some("2025-07-22 15:00:00"), Lang::Ar),
            "الثلاثاء، 22 يوليو 2025، 3:00 م"
        );
        let rendered = dual_display(
            Some("2025-07-22 13:00:00"),
            Some("2025-07-22 15:00:00"),
            Some("Africa/Cairo"),
            Lang::Ar,
        );
        assert_eq!(
            rendered,
            "الثلاثاء، 22 يوليو 2025، 3:00 م — Timezone: Africa/Cairo (UTC: 1:00 م)"
        );
    }

    #[test]
    fn overdue_is_a_strict_calendar_day_comparison() {
        let due = Some("2025-07-20 10:00:00");
        assert!(overdue_on(due, day(2025, 7, 22)));
        assert!(!overdue_on(due, day(2025, 7, 20)));
        assert!(!overdue_on(due, day(2025, 7, 19)));
    }

    #[test]
    fn malformed_or_missing_due_is_never_overdue() {
        assert!(!overdue_on(Some("garbage"), day(2025, 7, 22)));
        assert!(!overdue_on(None, day(2025, 7, 22)));
    }
}
