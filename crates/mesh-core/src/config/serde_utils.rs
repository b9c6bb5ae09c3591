//! Shared serde helpers for configuration files

/// Helper module for Duration serialization as whole seconds
///
/// # Example
///
/// ```ignore
/// use std::time::Duration;
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Serialize, Deserialize)]
/// struct Cluster {
///     #[serde(with = "mesh_core::config::serde_utils::duration_secs")]
///     connect_timeout: Duration,
/// }
/// ```
pub mod duration_secs {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    /// Serialize a Duration as seconds (u64)
    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    /// Deserialize a Duration from seconds (u64)
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
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
        connect_timeout: Duration,
    }

    #[test]
    fn test_duration_secs_from_yaml() {
        let parsed: Timeouts = serde_yaml::from_str("connect_timeout: 45").unwrap();
        assert_eq!(parsed.connect_timeout, Duration::from_secs(45));
    }

    #[test]
    fn test_duration_secs_to_json() {
        let value = Timeouts {
            connect_timeout: Duration::from_millis(30_900),
        };
        assert_eq!(
            serde_json::to_string(&value).unwrap(),
            r#"{"connect_timeout":30}"#
        );
    }

    #[test]
    fn test_duration_secs_rejects_negative() {
        assert!(serde_yaml::from_str::<Timeouts>("connect_timeout: -1").is_err());
    }
}
