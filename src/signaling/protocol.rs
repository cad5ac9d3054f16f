use super::ChannelEvent;
use serde::{Deserialize, Serialize};

/// Запросы клиента к relay
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ClientFrame {
    Login {
        app_id: String,
        uid: String,
        token: Option<String>,
    },
    Join {
        channel: String,
    },
    Send {
        to: String,
        text: String,
    },
    Leave,
    Logout,
}

/// Ответы и события relay. На каждый запрос приходит ровно один `ok` или `error`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ServerFrame {
    Ok,
    Error { message: String },
    MemberJoined { member_id: String },
    MemberLeft { member_id: String },
    Message { from: String, text: String },
}

impl ServerFrame {
    pub fn into_event(self) -> Option<ChannelEvent> {
        match self {
            ServerFrame::MemberJoined { member_id } => Some(ChannelEvent::MemberJoined(member_id)),
            ServerFrame::MemberLeft { member_id } => Some(ChannelEvent::MemberLeft(member_id)),
            ServerFrame::Message { from, text } => Some(ChannelEvent::MessageFromPeer {
                text,
                member_id: from,
            }),
            ServerFrame::Ok | ServerFrame::Error { .. } => None,
        }
    }
}

impl From<ChannelEvent> for ServerFrame {
    fn from(event: ChannelEvent) -> Self {
        match event {
            ChannelEvent::MemberJoined(member_id) => ServerFrame::MemberJoined { member_id },
            ChannelEvent::MemberLeft(member_id) => ServerFrame::MemberLeft { member_id },
            ChannelEvent::MessageFromPeer { text, member_id } => ServerFrame::Message {
                from: member_id,
                text,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_are_tagged() {
        let login = serde_json::to_value(ClientFrame::Login {
            app_id: "app".into(),
            uid: "u1".into(),
            token: None,
        })
        .unwrap();
        assert_eq!(login["op"], "login");
        assert_eq!(login["uid"], "u1");

        let leave: ClientFrame = serde_json::from_str(r#"{"op":"leave"}"#).unwrap();
        assert_eq!(leave, ClientFrame::Leave);

        let err: ServerFrame =
            serde_json::from_str(r#"{"event":"error","message":"nope"}"#).unwrap();
        assert_eq!(err, ServerFrame::Error { message: "nope".into() });
    }

    #[test]
    fn events_map_both_ways() {
        let ev = ChannelEvent::MessageFromPeer {
            text: "t".into(),
            member_id: "m".into(),
        };
        let frame = ServerFrame::from(ev.clone());
        assert_eq!(frame.clone().into_event(), Some(ev));
        assert_eq!(ServerFrame::Ok.into_event(), None);
    }
}
