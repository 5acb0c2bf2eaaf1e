//! Lenient date parsing into UTC.
//!
//! Pages and servers publish dates in many shapes: HTTP dates in headers,
//! RFC 3339 in Open Graph tags, bare dates in Dublin Core. Anything that
//! cannot be read becomes `None` rather than an error.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

const OFFSET_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M%:z", "%Y-%m-%dT%H:%M:%S%.f%z"];
const NAIVE_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M"];

pub fn parse_utc(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
            return Some(dt.with_timezone(&Utc));
        }
    }
    for fmt in NAIVE_FORMATS {
        if let Ok(ndt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(ndt.and_utc());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|ndt| ndt.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn http_date() {
        assert_eq!(
            parse_utc("Wed, 21 Oct 2015 07:28:00 GMT"),
            Some(Utc.with_ymd_and_hms(2015, 10, 21, 7, 28, 0).unwrap())
        );
    }

    #[test]
    fn offset_is_normalized() {
        assert_eq!(
            parse_utc("2021-03-04T10:00:00+02:00"),
            Some(Utc.with_ymd_and_hms(2021, 3, 4, 8, 0, 0).unwrap())
        );
    }

    #[test]
    fn bare_date_is_midnight() {
        assert_eq!(
            parse_utc("2020-12-31"),
            Some(Utc.with_ymd_and_hms(2020, 12, 31, 0, 0, 0).unwrap())
        );
    }

    #[test]
    fn garbage_is_none() {
        assert_eq!(parse_utc("last tuesday"), None);
        assert_eq!(parse_utc("   "), None);
    }
}
