//! Engine.IO v4 / Socket.IO v5 text packet codec
//!
//! Only the websocket transport and text frames are handled. An Engine.IO
//! packet is a one-digit type followed by its data; a Socket.IO packet rides
//! inside an Engine.IO `message` (type 4):
//!
//! ```text
//! 42["lock_device",{"locked":true}]
//! ^^ ^-- JSON array: event name then arguments
//! |+---- Socket.IO EVENT
//! +----- Engine.IO MESSAGE
//! ```

use serde::Deserialize;
use serde_json::Value;
use url::Url;

use crate::error::PauseError;

/// Engine.IO protocol revision
pub const ENGINE_IO_VERSION: &str = "4";

/// Reply to a server ping
pub const PONG: &str = "3";

/// Handshake data sent by the server in the `open` packet
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenInfo {
    pub sid: String,
    #[serde(default)]
    pub ping_interval: u64,
    #[serde(default)]
    pub ping_timeout: u64,
}

/// Decoded packet
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    Open(OpenInfo),
    Close,
    Ping,
    Pong,
    Upgrade,
    Noop,
    Connect {
        namespace: String,
    },
    Disconnect {
        namespace: String,
    },
    Event {
        namespace: String,
        name: String,
        args: Vec<Value>,
    },
    ConnectError {
        namespace: String,
        message: Option<String>,
    },
    /// ACK and binary packets; not used by the lock channel
    Unhandled(char),
}

/// Decode one text frame
pub fn decode(frame: &str) -> Result<Packet, PauseError> {
    let mut chars = frame.chars();
    let kind = chars
        .next()
        .ok_or_else(|| PauseError::Socket("empty frame".to_string()))?;
    let rest = chars.as_str();

    match kind {
        '0' => Ok(Packet::Open(serde_json::from_str(rest)?)),
        '1' => Ok(Packet::Close),
        '2' => Ok(Packet::Ping),
        '3' => Ok(Packet::Pong),
        '4' => decode_message(rest),
        '5' => Ok(Packet::Upgrade),
        '6' => Ok(Packet::Noop),
        other => Err(PauseError::Socket(format!("unknown packet type {other:?}"))),
    }
}

fn decode_message(body: &str) -> Result<Packet, PauseError> {
    let mut chars = body.chars();
    let kind = chars
        .next()
        .ok_or_else(|| PauseError::Socket("empty message".to_string()))?;
    let (namespace, rest) = split_namespace(chars.as_str());
    // Optional ack id before the JSON body
    let rest = rest.trim_start_matches(|c: char| c.is_ascii_digit());

    match kind {
        '0' => Ok(Packet::Connect { namespace }),
        '1' => Ok(Packet::Disconnect { namespace }),
        '2' => {
            let mut items: Vec<Value> = serde_json::from_str(rest)?;
            if items.is_empty() {
                return Err(PauseError::Socket("event without a name".to_string()));
            }
            let name = match items.remove(0) {
                Value::String(name) => name,
                other => {
                    return Err(PauseError::Socket(format!("event name is not a string: {other}")))
                }
            };
            Ok(Packet::Event {
                namespace,
                name,
                args: items,
            })
        }
        '4' => {
            let message = serde_json::from_str::<Value>(rest)
                .ok()
                .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string));
            Ok(Packet::ConnectError { namespace, message })
        }
        other => Ok(Packet::Unhandled(other)),
    }
}

/// Split a leading `/namespace,` off the packet body
fn split_namespace(body: &str) -> (String, &str) {
    if body.starts_with('/') {
        match body.split_once(',') {
            Some((namespace, rest)) => (namespace.to_string(), rest),
            None => (body.to_string(), ""),
        }
    } else {
        ("/".to_string(), body)
    }
}

/// Frame that joins `namespace`
pub fn connect_frame(namespace: &str) -> String {
    if namespace == "/" {
        "40".to_string()
    } else {
        format!("40{namespace},")
    }
}

/// Websocket URL for a Socket.IO server at `base`, with the user identifier
/// as query parameter
pub fn socket_url(base: &str, user_query_key: &str, user_id: &str) -> Result<Url, PauseError> {
    let mut url =
        Url::parse(base).map_err(|e| PauseError::Config(format!("invalid socket url {base}: {e}")))?;

    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => return Err(PauseError::Config(format!("unsupported socket scheme {other}"))),
    };
    url.set_scheme(scheme)
        .map_err(|_| PauseError::Config(format!("cannot use scheme {scheme}")))?;

    url.set_path("/socket.io/");
    url.set_query(None);
    url.query_pairs_mut()
        .append_pair("EIO", ENGINE_IO_VERSION)
        .append_pair("transport", "websocket")
        .append_pair(user_query_key, user_id);
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_decode_open() {
        let packet =
            decode(r#"0{"sid":"abc","upgrades":[],"pingInterval":25000,"pingTimeout":20000}"#)
                .unwrap();
        assert_eq!(
            packet,
            Packet::Open(OpenInfo {
                sid: "abc".to_string(),
                ping_interval: 25000,
                ping_timeout: 20000,
            })
        );
    }

    #[test]
    fn test_decode_control_packets() {
        assert_eq!(decode("2").unwrap(), Packet::Ping);
        assert_eq!(decode("3").unwrap(), Packet::Pong);
        assert_eq!(decode("1").unwrap(), Packet::Close);
        assert_eq!(decode("6").unwrap(), Packet::Noop);
        assert!(decode("").is_err());
        assert!(decode("9").is_err());
    }

    #[test]
    fn test_decode_connect() {
        assert_eq!(
            decode(r#"40{"sid":"xyz"}"#).unwrap(),
            Packet::Connect {
                namespace: "/".to_string()
            }
        );
        assert_eq!(
            decode("40/admin,").unwrap(),
            Packet::Connect {
                namespace: "/admin".to_string()
            }
        );
    }

    #[test]
    fn test_decode_event() {
        let packet = decode(r#"42["lock_device",{"locked":true}]"#).unwrap();
        assert_eq!(
            packet,
            Packet::Event {
                namespace: "/".to_string(),
                name: "lock_device".to_string(),
                args: vec![json!({"locked": true})],
            }
        );
    }

    #[test]
    fn test_decode_event_with_namespace_and_ack() {
        let packet = decode(r#"42/family,7["lock_device",{"locked":"false"}]"#).unwrap();
        match packet {
            Packet::Event {
                namespace,
                name,
                args,
            } => {
                assert_eq!(namespace, "/family");
                assert_eq!(name, "lock_device");
                assert_eq!(args[0]["locked"], "false");
            }
            other => panic!("unexpected packet {other:?}"),
        }
    }

    #[test]
    fn test_decode_bad_events() {
        assert!(decode("42[]").is_err());
        assert!(decode("42[1,2]").is_err());
        assert!(decode("42{not json").is_err());
    }

    #[test]
    fn test_decode_connect_error() {
        let packet = decode(r#"44{"message":"Not authorized"}"#).unwrap();
        assert_eq!(
            packet,
            Packet::ConnectError {
                namespace: "/".to_string(),
                message: Some("Not authorized".to_string()),
            }
        );
    }

    #[test]
    fn test_connect_frame() {
        assert_eq!(connect_frame("/"), "40");
        assert_eq!(connect_frame("/family"), "40/family,");
    }

    #[test]
    fn test_socket_url() {
        let url = socket_url("https://api.example.com/v1?x=1", "clerkId", "user_42").unwrap();
        assert_eq!(
            url.as_str(),
            "wss://api.example.com/socket.io/?EIO=4&transport=websocket&clerkId=user_42"
        );

        let local = socket_url("http://127.0.0.1:3000", "clerkId", "u").unwrap();
        assert_eq!(local.scheme(), "ws");
        assert!(socket_url("ftp://example.com", "clerkId", "u").is_err());
    }
}
