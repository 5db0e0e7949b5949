//! Discord gateway payloads
//!
//! Only the subset the bot needs: Hello, heartbeats, Identify, presence
//! updates and application command interactions.

use serde::Deserialize;
use serde_json::{json, Value};

pub mod opcode {
    pub const DISPATCH: u8 = 0;
    pub const HEARTBEAT: u8 = 1;
    pub const IDENTIFY: u8 = 2;
    pub const PRESENCE_UPDATE: u8 = 3;
    pub const RECONNECT: u8 = 7;
    pub const INVALID_SESSION: u8 = 9;
    pub const HELLO: u8 = 10;
    pub const HEARTBEAT_ACK: u8 = 11;
}

/// GUILDS intent; enough to receive interactions for the configured server
pub const INTENTS: u64 = 1;

/// Activity type for a custom status
const CUSTOM_STATUS_ACTIVITY: u8 = 4;

/// Interaction type for slash commands
pub const APPLICATION_COMMAND: u8 = 2;

/// Close codes after which reconnecting cannot succeed
pub const FATAL_CLOSE_CODES: &[u16] = &[
    4004, // authentication failed
    4010, // invalid shard
    4011, // sharding required
    4012, // invalid API version
    4013, // invalid intents
    4014, // disallowed intents
];

/// Envelope of every gateway message
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayFrame {
    pub op: u8,
    #[serde(default)]
    pub d: Value,
    #[serde(default)]
    pub s: Option<u64>,
    #[serde(default)]
    pub t: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Hello {
    pub heartbeat_interval: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Ready {
    pub user: ReadyUser,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReadyUser {
    pub username: String,
}

/// An incoming interaction (only the fields used to answer it)
#[derive(Debug, Clone, Deserialize)]
pub struct Interaction {
    pub id: String,
    pub token: String,
    #[serde(rename = "type")]
    pub kind: u8,
    #[serde(default)]
    pub data: Option<CommandData>,
}

impl Interaction {
    /// Name of the invoked command, if this is a slash command
    pub fn command_name(&self) -> Option<&str> {
        if self.kind != APPLICATION_COMMAND {
            return None;
        }
        self.data.as_ref().map(|d| d.name.as_str())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommandData {
    pub name: String,
}

pub fn heartbeat(sequence: Option<u64>) -> Value {
    json!({ "op": opcode::HEARTBEAT, "d": sequence })
}

pub fn identify(token: &str, status: &str) -> Value {
    json!({
        "op": opcode::IDENTIFY,
        "d": {
            "token": token,
            "intents": INTENTS,
            "properties": {
                "os": std::env::consts::OS,
                "browser": env!("CARGO_PKG_NAME"),
                "device": env!("CARGO_PKG_NAME"),
            },
            "presence": presence(status),
        }
    })
}

pub fn presence_update(status: &str) -> Value {
    json!({ "op": opcode::PRESENCE_UPDATE, "d": presence(status) })
}

fn presence(status: &str) -> Value {
    let activities = if status.is_empty() {
        json!([])
    } else {
        json!([{
            "name": "Custom Status",
            "type": CUSTOM_STATUS_ACTIVITY,
            "state": status,
        }])
    };

    json!({
        "since": null,
        "activities": activities,
        "status": "online",
        "afk": false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presence_update_sets_custom_status() {
        let payload = presence_update("Forest: 3");
        assert_eq!(payload["op"], 3);
        assert_eq!(payload["d"]["activities"][0]["type"], 4);
        assert_eq!(payload["d"]["activities"][0]["state"], "Forest: 3");
    }

    #[test]
    fn empty_status_clears_activities() {
        let payload = presence_update("");
        assert_eq!(payload["d"]["activities"], json!([]));
    }

    #[test]
    fn identify_carries_token_and_presence() {
        let payload = identify("secret", "Garden: 1");
        assert_eq!(payload["op"], 2);
        assert_eq!(payload["d"]["token"], "secret");
        assert_eq!(payload["d"]["intents"], 1);
        assert_eq!(payload["d"]["presence"]["activities"][0]["state"], "Garden: 1");
    }

    #[test]
    fn heartbeat_sends_null_before_first_sequence() {
        assert_eq!(heartbeat(None), json!({ "op": 1, "d": null }));
        assert_eq!(heartbeat(Some(42)), json!({ "op": 1, "d": 42 }));
    }

    #[test]
    fn parses_interaction_create() {
        let frame: GatewayFrame = serde_json::from_str(
            r#"{"op":0,"s":5,"t":"INTERACTION_CREATE","d":{"id":"1","token":"tok","type":2,"data":{"name":"sessions"},"guild_id":"9"}}"#,
        )
        .unwrap();
        let interaction: Interaction = serde_json::from_value(frame.d).unwrap();
        assert_eq!(interaction.command_name(), Some("sessions"));
    }

    #[test]
    fn non_command_interactions_have_no_name() {
        let interaction: Interaction =
            serde_json::from_str(r#"{"id":"1","token":"tok","type":1}"#).unwrap();
        assert_eq!(interaction.command_name(), None);
    }
}
