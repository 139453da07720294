use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use icalendar::{Calendar, Component, Event, EventLike};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::models::ScheduleItem;

static DISPLAY_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d{4})[./-](\d{1,2})[./-](\d{1,2})").expect("regex compiles"));
static TIME_RANGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d{1,2}):(\d{2})(?:\s*[~\-]\s*(\d{1,2}):(\d{2}))?").expect("regex compiles")
});

/// `"2026.02.04 (수)"` -> 2026-02-04
pub fn parse_display_date(text: &str) -> Option<NaiveDate> {
    let caps = DISPLAY_DATE.captures(text)?;
    NaiveDate::from_ymd_opt(
        caps[1].parse().ok()?,
        caps[2].parse().ok()?,
        caps[3].parse().ok()?,
    )
}

/// `"12:30 ~ 14:00"` -> (12:30, Some(14:00)); a lone `"18:00"` has no end.
pub fn parse_time_range(text: &str) -> Option<(NaiveTime, Option<NaiveTime>)> {
    let caps = TIME_RANGE.captures(text)?;
    let start = NaiveTime::from_hms_opt(caps[1].parse().ok()?, caps[2].parse().ok()?, 0)?;
    let end = match (caps.get(3), caps.get(4)) {
        (Some(hour), Some(minute)) => NaiveTime::from_hms_opt(
            hour.as_str().parse().ok()?,
            minute.as_str().parse().ok()?,
            0,
        ),
        _ => None,
    };
    Some((start, end))
}

/// Renders the itinerary as an iCalendar feed in the trip's timezone.
#[derive(Clone)]
pub struct ItineraryExporter {
    timezone: Tz,
}

impl ItineraryExporter {
    pub fn new(timezone: Tz) -> Self {
        Self { timezone }
    }

    fn to_utc(&self, local: NaiveDateTime) -> Option<DateTime<Utc>> {
        self.timezone
            .from_local_datetime(&local)
            .earliest()
            .map(|dt| dt.with_timezone(&Utc))
    }

    pub fn generate(&self, items: &[ScheduleItem]) -> Vec<u8> {
        if items.is_empty() {
            return Vec::new();
        }

        let mut calendar = Calendar::new();
        calendar.name("Travel Itinerary");

        for (index, item) in items.iter().enumerate() {
            let Some(date) = parse_display_date(&item.date) else {
                debug!(date = %item.date, content = %item.content, "skipping item without a date");
                continue;
            };

            let mut event = Event::new();
            event.summary(&item.content);
            match parse_time_range(&item.time_range) {
                Some((start, end)) => {
                    let start = date.and_time(start);
                    let mut end = end
                        .map(|end| date.and_time(end))
                        .unwrap_or(start + Duration::hours(1));
                    if end <= start {
                        end += Duration::days(1);
                    }
                    let (Some(start), Some(end)) = (self.to_utc(start), self.to_utc(end)) else {
                        continue;
                    };
                    event.starts(start);
                    event.ends(end);
                }
                None => {
                    event.all_day(date);
                }
            }
            event.location(&item.content);
            event.add_property("GEO", format!("{};{}", item.lat, item.lng));
            event.add_property("CATEGORIES", item.category.clone());
            if let Some(note) = &item.note {
                event.description(note);
            }
            event.uid(&format!(
                "{}-{}-{}-itinerary",
                date.format("%Y%m%d"),
                item.id.unwrap_or(index as i64),
                item.content.replace(' ', "-")
            ));
            calendar.push(event);
        }

        calendar.to_string().into_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(date: &str, time_range: &str) -> ScheduleItem {
        ScheduleItem {
            id: None,
            date: date.into(),
            time_range: time_range.into(),
            content: "Shrine A".into(),
            lat: 35.5,
            lng: 135.25,
            category: "SIGHT".into(),
            note: Some("bring cash".into()),
        }
    }

    #[test]
    fn test_parse_display_date() {
        assert_eq!(
            parse_display_date("2026.02.04 (수)"),
            NaiveDate::from_ymd_opt(2026, 2, 4)
        );
        assert_eq!(
            parse_display_date("2026-2-5"),
            NaiveDate::from_ymd_opt(2026, 2, 5)
        );
        assert!(parse_display_date("").is_none());
        assert!(parse_display_date("2026.13.40").is_none());
    }

    #[test]
    fn test_parse_time_range() {
        let t = |h, m| NaiveTime::from_hms_opt(h, m, 0).unwrap();
        assert_eq!(
            parse_time_range("12:30 ~ 14:00"),
            Some((t(12, 30), Some(t(14, 0))))
        );
        assert_eq!(
            parse_time_range("13:00~14:00"),
            Some((t(13, 0), Some(t(14, 0))))
        );
        assert_eq!(parse_time_range("18:00"), Some((t(18, 0), None)));
        assert!(parse_time_range("afternoon").is_none());
    }

    #[test]
    fn test_generate_converts_to_utc() {
        let exporter = ItineraryExporter::new(chrono_tz::Asia::Tokyo);
        let body = String::from_utf8(exporter.generate(&[item("2026.02.04 (수)", "12:30 ~ 14:00")]))
            .unwrap();
        assert!(body.contains("BEGIN:VEVENT"));
        assert!(body.contains("SUMMARY:Shrine A"));
        assert!(body.contains("20260204T033000Z"));
        assert!(body.contains("20260204T050000Z"));
        assert!(body.contains("GEO:35.5"));
        assert!(body.contains("CATEGORIES:SIGHT"));
    }

    #[test]
    fn test_generate_all_day_and_skips_undated() {
        let exporter = ItineraryExporter::new(chrono_tz::Asia::Tokyo);
        let body = String::from_utf8(
            exporter.generate(&[item("2026.02.04 (수)", ""), item("", "10:00 ~ 11:00")]),
        )
        .unwrap();
        assert_eq!(body.matches("BEGIN:VEVENT").count(), 1);
        assert!(body.contains("VALUE=DATE"));
    }

    #[test]
    fn test_generate_empty() {
        let exporter = ItineraryExporter::new(chrono_tz::Asia::Tokyo);
        assert!(exporter.generate(&[]).is_empty());
    }
}
