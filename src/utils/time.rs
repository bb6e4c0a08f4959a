//! Timestamp parsing shared by the persisted state files.

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, TimeZone, Utc};

/// Parse an ISO-8601 timestamp.
///
/// Accepts RFC 3339 (with offset), naive date-times (interpreted as local
/// time) and bare dates (local midnight).
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }

    let naive = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })?;

    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Whole days elapsed since `ts`, never negative.
pub fn days_since(ts: DateTime<Utc>) -> u64 {
    u64::try_from((Utc::now() - ts).num_days()).unwrap_or(0)
}

/// Serde adapter for required timestamps written by older tools.
pub mod flexible {
    use chrono::{DateTime, Utc};
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&ts.to_rfc3339())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        super::parse_timestamp(&raw)
            .ok_or_else(|| D::Error::custom(format!("invalid timestamp: {}", raw)))
    }
}

/// Serde adapter for optional timestamps. Unparseable values read as `None`.
pub mod flexible_opt {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &Option<DateTime<Utc>>, s: S) -> Result<S::Ok, S::Error> {
        match ts {
            Some(ts) => s.serialize_str(&ts.to_rfc3339()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        d: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        let raw = Option::<String>::deserialize(d)?;
        Ok(raw.as_deref().and_then(super::parse_timestamp))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_parse_rfc3339() {
        let ts = parse_timestamp("2024-03-01T12:00:00+01:00").unwrap();
        assert_eq!(ts.to_rfc3339(), "2024-03-01T11:00:00+00:00");
    }

    #[test]
    fn test_parse_naive_forms() {
        assert!(parse_timestamp("2024-03-01T12:00:00.123456").is_some());
        assert!(parse_timestamp("2024-03-01 12:00:00").is_some());
        assert!(parse_timestamp("2024-03-01").is_some());
        assert!(parse_timestamp("yesterday").is_none());
    }

    #[test]
    fn test_days_since() {
        assert_eq!(days_since(Utc::now()), 0);
        assert_eq!(days_since(Utc::now() - Duration::days(3) - Duration::hours(1)), 3);
        // Future timestamps clamp to zero
        assert_eq!(days_since(Utc::now() + Duration::days(2)), 0);
    }
}
