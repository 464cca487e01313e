use chrono::{DateTime, Duration, Local, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::api::{ApiError, TokenResponse};

/// Format used for `expires_at` in the credential file, in local time.
pub const EXPIRY_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// The locally persisted access/refresh token pair and its expiry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: Option<String>,
    #[serde(with = "expiry_format")]
    pub expires_at: DateTime<Utc>,
}

impl Session {
    /// Build a session from a successful grant.
    ///
    /// `granted_at` must be sampled when the grant response arrived; the
    /// expiry is always `granted_at + expires_in`, never derived from server
    /// clock headers. If the server omits a refresh token, `previous_refresh`
    /// is carried over. An `expires_in` too large to represent is an invalid
    /// response.
    pub fn from_grant(
        token: &TokenResponse,
        granted_at: DateTime<Utc>,
        previous_refresh: Option<String>,
    ) -> Result<Self, ApiError> {
        let expires_at = expiry_after(granted_at, token.expires_in).ok_or_else(|| {
            ApiError::InvalidResponse(format!("token expires_in out of range: {}", token.expires_in))
        })?;

        Ok(Self {
            access_token: token.access_token.clone(),
            refresh_token: token.refresh_token.clone().or(previous_refresh),
            expires_at,
        })
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    pub fn time_until_expiry(&self) -> Duration {
        self.expires_at - Utc::now()
    }
}

/// `start + seconds`, or `None` if the result is not representable.
pub(crate) fn expiry_after(start: DateTime<Utc>, seconds: u64) -> Option<DateTime<Utc>> {
    let seconds = i64::try_from(seconds).ok()?;
    start.checked_add_signed(Duration::try_seconds(seconds)?)
}

/// Parse an `expires_at` value as written by [`EXPIRY_FORMAT`].
///
/// Naive values are local wall-clock time, matching files written by earlier
/// DOXA clients. RFC 3339 timestamps are accepted too.
pub fn parse_expiry(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(naive) = NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f") {
        return Some(local_to_utc(naive));
    }
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Skipped-over local times (DST gaps) fall back to reading the value as UTC.
fn local_to_utc(naive: NaiveDateTime) -> DateTime<Utc> {
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|local| local.with_timezone(&Utc))
        .unwrap_or_else(|| naive.and_utc())
}

mod expiry_format {
    use chrono::{DateTime, Local, Utc};
    use serde::{de, Deserialize, Deserializer, Serializer};

    use super::{parse_expiry, EXPIRY_FORMAT};

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        let local = value.with_timezone(&Local);
        serializer.serialize_str(&local.format(EXPIRY_FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse_expiry(&raw).ok_or_else(|| de::Error::custom(format!("unparseable expiry: {}", raw)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn grant(refresh: Option<&str>) -> TokenResponse {
        TokenResponse {
            access_token: "new-access".to_string(),
            refresh_token: refresh.map(str::to_string),
            expires_in: 3600,
            token_type: Some("Bearer".to_string()),
        }
    }

    #[test]
    fn test_from_grant_uses_grant_moment() {
        let at = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        let session = Session::from_grant(&grant(Some("r1")), at, None).unwrap();
        assert_eq!(session.expires_at, at + Duration::hours(1));
        assert_eq!(session.refresh_token.as_deref(), Some("r1"));
    }

    #[test]
    fn test_from_grant_keeps_previous_refresh_token() {
        let at = Utc::now();
        let session = Session::from_grant(&grant(None), at, Some("old".to_string())).unwrap();
        assert_eq!(session.refresh_token.as_deref(), Some("old"));

        let session =
            Session::from_grant(&grant(Some("rotated")), at, Some("old".to_string())).unwrap();
        assert_eq!(session.refresh_token.as_deref(), Some("rotated"));
    }

    #[test]
    fn test_from_grant_rejects_unrepresentable_expiry() {
        let at = Utc::now();
        for expires_in in [u64::MAX, u64::MAX / 2, i64::MAX as u64] {
            let mut token = grant(None);
            token.expires_in = expires_in;
            let err = Session::from_grant(&token, at, None).unwrap_err();
            assert!(err.is_transport(), "{} -> {:?}", expires_in, err);
        }
    }

    #[test]
    fn test_expiry_after() {
        let at = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(expiry_after(at, 90), Some(at + Duration::seconds(90)));
        assert_eq!(expiry_after(at, u64::MAX), None);
        assert_eq!(expiry_after(DateTime::<Utc>::MAX_UTC, 1), None);
    }

    #[test]
    fn test_is_expired_at_boundary() {
        let at = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let session = Session {
            access_token: "a".to_string(),
            refresh_token: None,
            expires_at: at,
        };
        assert!(!session.is_expired_at(at - Duration::seconds(1)));
        assert!(session.is_expired_at(at));
    }

    #[test]
    fn test_expiry_round_trips_through_json() {
        let session = Session {
            access_token: "a".to_string(),
            refresh_token: Some("r".to_string()),
            expires_at: Utc.with_ymd_and_hms(2026, 10, 15, 12, 30, 0).unwrap()
                + Duration::microseconds(618_838),
        };
        let json = serde_json::to_string(&session).unwrap();
        let written = session.expires_at.with_timezone(&Local).format(EXPIRY_FORMAT).to_string();
        assert!(json.contains(&format!("\"expires_at\":\"{}\"", written)));
        let parsed: Session = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, session);
    }

    #[test]
    fn test_naive_expiry_is_local_time() {
        let naive = NaiveDateTime::parse_from_str("2026-10-15 12:30:00", "%Y-%m-%d %H:%M:%S").unwrap();
        let expected = Local
            .from_local_datetime(&naive)
            .earliest()
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(parse_expiry("2026-10-15 12:30:00.000000"), Some(expected));
        assert_eq!(
            parse_expiry("2026-10-15T12:30:00+00:00"),
            Some(Utc.with_ymd_and_hms(2026, 10, 15, 12, 30, 0).unwrap())
        );
    }

    #[test]
    fn test_parse_expiry_variants() {
        assert!(parse_expiry("2026-10-15 12:30:00").is_some());
        assert!(parse_expiry("2026-10-15 12:30:00.5").is_some());
        assert!(parse_expiry("2026-10-15T12:30:00+00:00").is_some());
        assert!(parse_expiry("tomorrow").is_none());
        assert!(parse_expiry("").is_none());
    }
}
