//! Serde helpers shared by serializable definitions

/// Serde support for Duration as milliseconds
pub(crate) mod duration_millis {
    use serde::{ser::Error as _, Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let millis = u64::try_from(duration.as_millis()).map_err(|_| {
            S::Error::custom(format!("duration {duration:?} does not fit in u64 milliseconds"))
        })?;
        millis.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};
    use std::time::Duration;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Wrapper {
        #[serde(with = "super::duration_millis")]
        timeout: Duration,
    }

    #[test]
    fn test_duration_as_millis() {
        let json = serde_json::to_value(Wrapper {
            timeout: Duration::from_millis(1500),
        })
        .unwrap();

        assert_eq!(json, serde_json::json!({ "timeout": 1500 }));
        let parsed: Wrapper = serde_json::from_value(json).unwrap();
        assert_eq!(parsed.timeout, Duration::from_millis(1500));
    }

    #[test]
    fn test_overflowing_duration_is_an_error() {
        let result = serde_json::to_string(&Wrapper {
            timeout: Duration::MAX,
        });

        assert!(result.unwrap_err().to_string().contains("does not fit"));
    }
}
