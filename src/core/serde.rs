use serde::{Serialize, Deserialize, Serializer, Deserializer};
use std::time::Duration;

/// Serializes Duration as seconds
pub fn serialize_duration<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    duration.as_secs_f64().serialize(serializer)
}

/// Deserializes Duration from seconds
pub fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let secs = f64::deserialize(deserializer)?;
    Ok(Duration::from_secs_f64(secs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json;

    #[test]
    fn test_duration_serialization() {
        #[derive(Serialize, Deserialize)]
        struct Test {
            #[serde(serialize_with = "serialize_duration")]
            #[serde(deserialize_with = "deserialize_duration")]
            duration: Duration,
        }

        let original = Test {
            duration: Duration::from_millis(4500),
        };

        let serialized = serde_json::to_string(&original).unwrap();
        let deserialized: Test = serde_json::from_str(&serialized).unwrap();

        assert_eq!(deserialized.duration, original.duration);
    }
}
