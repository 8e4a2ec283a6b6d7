use std::net::SocketAddr;

use chrono::TimeDelta;

const DEFAULT_API_PORT: u16 = 3000;

pub fn get_default_api_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], DEFAULT_API_PORT))
}

/// Parse a boolean flag the way environment files usually spell them.
pub fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Serialize a [`TimeDelta`] as whole milliseconds.
pub mod delta_millis {
    use chrono::TimeDelta;
    use serde::Serializer;

    pub fn serialize<S>(delta: &TimeDelta, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_i64(delta.num_milliseconds())
    }
}

pub fn millis(ms: u64) -> TimeDelta {
    TimeDelta::milliseconds(i64::try_from(ms).unwrap_or(i64::MAX))
}
