//! `std::time::Duration` を整数ミリ秒としてシリアライズする serde ヘルパー。
//!
//! ```ignore
//! #[serde(with = "crate::domain::duration_ms")]
//! heartbeat: Duration,
//! ```

use serde::{Deserialize, Deserializer, Serializer};
use std::time::Duration;

pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    let millis = u64::try_from(value.as_millis()).unwrap_or(u64::MAX);
    serializer.serialize_u64(millis)
}

pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    let millis = u64::deserialize(deserializer)?;
    Ok(Duration::from_millis(millis))
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};
    use std::time::Duration;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Holder {
        #[serde(with = "super")]
        wait: Duration,
    }

    #[test]
    fn durations_are_plain_millis() {
        let json = serde_json::to_string(&Holder {
            wait: Duration::from_millis(1500),
        })
        .unwrap();
        assert_eq!(json, r#"{"wait":1500}"#);

        let back: Holder = serde_json::from_str(r#"{"wait":250}"#).unwrap();
        assert_eq!(back.wait, Duration::from_millis(250));
    }
}
