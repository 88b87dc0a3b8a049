use std::fmt;
use std::time::Duration;

/// A byte value that can be parsed from human-readable units or plain numbers.
///
/// Supports units: B, K, KB, M, MB, G, GB
/// Examples: "1000", "1K", "64KB", "1M", "1MB"
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ByteValue(pub u64);

impl ByteValue {
    /// Parse a string containing a number with optional unit suffix.
    pub fn parse(input: &str) -> Result<u64, String> {
        let input = input.trim();
        if let Ok(value) = input.parse::<u64>() {
            return Ok(value);
        }

        let split = input
            .find(|c: char| !c.is_ascii_digit())
            .ok_or_else(|| format!("Invalid number: {input}"))?;
        if split == 0 {
            return Err("No number found".to_string());
        }
        let (number, unit) = input.split_at(split);
        let number: u64 = number
            .parse()
            .map_err(|_| format!("Invalid number: {number}"))?;

        let multiplier: u64 = match unit.trim().to_uppercase().as_str() {
            "B" => 1,
            "K" | "KB" => 1024,
            "M" | "MB" => 1024 * 1024,
            "G" | "GB" => 1024 * 1024 * 1024,
            _ => return Err(format!("Unknown unit: {unit}")),
        };

        number
            .checked_mul(multiplier)
            .ok_or_else(|| format!("Value too large: {input}"))
    }
}

impl fmt::Display for ByteValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl<'de> serde::Deserialize<'de> for ByteValue {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        use serde::de::{self, Visitor};

        struct ByteValueVisitor;

        impl Visitor<'_> for ByteValueVisitor {
            type Value = ByteValue;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a number or string with byte units (e.g., 1000, \"64K\")")
            }

            fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(ByteValue(value))
            }

            fn visit_i64<E>(self, value: i64) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                u64::try_from(value)
                    .map(ByteValue)
                    .map_err(|_| de::Error::custom("negative values are not allowed"))
            }

            fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                ByteValue::parse(value)
                    .map(ByteValue)
                    .map_err(de::Error::custom)
            }
        }

        deserializer.deserialize_any(ByteValueVisitor)
    }
}

impl serde::Serialize for ByteValue {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_u64(self.0)
    }
}

/// A duration written the way humans write it: "500ms", "2s", "1m 30s".
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HumanDuration(pub Duration);

impl HumanDuration {
    pub fn from_millis(millis: u64) -> Self {
        HumanDuration(Duration::from_millis(millis))
    }

    pub fn from_secs(secs: u64) -> Self {
        HumanDuration(Duration::from_secs(secs))
    }
}

impl From<HumanDuration> for Duration {
    fn from(value: HumanDuration) -> Self {
        value.0
    }
}

impl fmt::Display for HumanDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", humantime::format_duration(self.0))
    }
}

impl<'de> serde::Deserialize<'de> for HumanDuration {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s)
            .map(HumanDuration)
            .map_err(serde::de::Error::custom)
    }
}

impl serde::Serialize for HumanDuration {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}
