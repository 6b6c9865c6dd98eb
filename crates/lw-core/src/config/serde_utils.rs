//! Serde helpers for configuration values

/// Durations written as seconds
///
/// Whole seconds are written as integers and anything finer as a float, so
/// `connection_timeout = 10` and `connection_timeout = 0.25` both load.
pub mod duration_secs {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if duration.subsec_nanos() == 0 {
            serializer.serialize_u64(duration.as_secs())
        } else {
            serializer.serialize_f64(duration.as_secs_f64())
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs)
            .map_err(|_| D::Error::custom(format!("invalid duration: {} seconds", secs)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use std::time::Duration;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Timeouts {
        #[serde(with = "duration_secs")]
        connect: Duration,
    }

    #[test]
    fn test_whole_seconds_stay_integers() {
        let t = Timeouts {
            connect: Duration::from_secs(10),
        };
        assert_eq!(toml::to_string(&t).unwrap().trim(), "connect = 10");
    }

    #[test]
    fn test_fractional_seconds() {
        let t: Timeouts = toml::from_str("connect = 0.25").unwrap();
        assert_eq!(t.connect, Duration::from_millis(250));
        let json = serde_json::to_string(&t).unwrap();
        assert_eq!(json, r#"{"connect":0.25}"#);
    }

    #[test]
    fn test_negative_rejected() {
        assert!(toml::from_str::<Timeouts>("connect = -1").is_err());
    }
}
