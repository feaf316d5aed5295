//! Wire messages of the `pb.Echo` service.
//!
//! Mirrors `proto/echo.proto`; kept by hand so the build needs no `protoc`.

use std::collections::BTreeMap;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Route of the unary echo call.
pub const SEND_PATH: &str = "/pb.Echo/Send";
/// Route of the server-streaming subscription.
pub const SUBSCRIBE_PATH: &str = "/pb.Echo/Subscribe";

/// Request carried by both operations.
#[derive(Clone, PartialEq, prost::Message)]
pub struct Ping {
    #[prost(string, tag = "1")]
    pub message: String,
}

impl Ping {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Response of every echo, probe and subscription tick.
#[derive(Clone, PartialEq, prost::Message)]
pub struct Pong {
    #[prost(string, tag = "1")]
    pub message: String,
    /// Unix seconds at construction.
    #[prost(int64, tag = "2")]
    pub timestamp: i64,
    #[prost(string, tag = "3")]
    pub hostname: String,
    /// JSON object of header name to ordered values.
    #[prost(string, tag = "4")]
    pub header: String,
}

impl Pong {
    /// Build a pong stamped with the current time.
    pub fn now(message: impl Into<String>, hostname: impl Into<String>, header: String) -> Self {
        Self {
            message: message.into(),
            timestamp: unix_now(),
            hostname: hostname.into(),
            header,
        }
    }
}

/// Protobuf text rendering: `field:value` pairs, default values omitted.
impl fmt::Display for Pong {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut sep = "";
        if !self.message.is_empty() {
            write!(f, "{sep}message:{:?}", self.message)?;
            sep = " ";
        }
        if self.timestamp != 0 {
            write!(f, "{sep}timestamp:{}", self.timestamp)?;
            sep = " ";
        }
        if !self.hostname.is_empty() {
            write!(f, "{sep}hostname:{:?}", self.hostname)?;
            sep = " ";
        }
        if !self.header.is_empty() {
            write!(f, "{sep}header:{:?}", self.header)?;
        }
        Ok(())
    }
}

/// Current Unix time in seconds.
pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

/// Serialize header pairs as a JSON object of name to ordered values.
///
/// Values that are not valid UTF-8 are skipped.
pub fn header_json<'a, I>(pairs: I) -> String
where
    I: IntoIterator<Item = (&'a str, &'a [u8])>,
{
    let mut map: BTreeMap<&str, Vec<String>> = BTreeMap::new();
    for (name, value) in pairs {
        if let Ok(value) = std::str::from_utf8(value) {
            map.entry(name).or_default().push(value.to_string());
        }
    }
    serde_json::to_string(&map).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost::Message;

    #[test]
    fn display_omits_defaults() {
        let pong = Pong {
            message: String::new(),
            timestamp: 42,
            hostname: "echo-1".into(),
            header: String::new(),
        };
        assert_eq!(pong.to_string(), "timestamp:42 hostname:\"echo-1\"");
    }

    #[test]
    fn display_escapes_header() {
        let pong = Pong {
            message: "hi".into(),
            timestamp: 1,
            hostname: "h".into(),
            header: r#"{"a":["b"]}"#.into(),
        };
        assert_eq!(
            pong.to_string(),
            r#"message:"hi" timestamp:1 hostname:"h" header:"{\"a\":[\"b\"]}""#
        );
    }

    #[test]
    fn header_values_keep_order() {
        let json = header_json([
            ("x-b", b"2".as_slice()),
            ("x-a", b"1".as_slice()),
            ("x-b", b"3".as_slice()),
        ]);
        assert_eq!(json, r#"{"x-a":["1"],"x-b":["2","3"]}"#);
    }

    #[test]
    fn wire_layout_matches_proto() {
        let ping = Ping::new("abc");
        assert_eq!(ping.encode_to_vec(), vec![0x0a, 3, b'a', b'b', b'c']);

        let pong = Pong::decode(&[0x10, 0x07, 0x1a, 0x01, b'h'][..]).unwrap();
        assert_eq!(pong.timestamp, 7);
        assert_eq!(pong.hostname, "h");
    }

    #[test]
    fn timestamp_is_construction_time() {
        let before = unix_now();
        let pong = Pong::now("m", "h", String::new());
        assert!(pong.timestamp >= before && pong.timestamp <= unix_now());
    }
}
