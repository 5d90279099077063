use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::WaitlistEmail;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WaitlistEntry {
    pub email: String,
    #[serde(with = "iso8601")]
    pub subscribed_at: DateTime<Utc>,
}

impl WaitlistEntry {
    pub fn new(email: &WaitlistEmail, subscribed_at: DateTime<Utc>) -> Self {
        Self {
            email: email.as_ref().to_owned(),
            subscribed_at,
        }
    }
}

/// Millisecond precision, `Z` suffix: `2025-03-01T09:15:02.417Z`.
pub mod iso8601 {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn format(timestamp: &DateTime<Utc>) -> String {
        timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    pub fn serialize<S>(timestamp: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format(timestamp))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}
