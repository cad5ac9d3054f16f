use crate::error::Result;
use serde::{Deserialize, Serialize};
use webrtc::ice_transport::ice_candidate::RTCIceCandidateInit;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;

/// Сообщение согласования между двумя участниками.
///
/// Формат совместим с браузерной страницей:
/// `{"type":"offer","offer":{"type":"offer","sdp":"..."}}`.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SignalingMessage {
    Offer { offer: RTCSessionDescription },
    Answer { answer: RTCSessionDescription },
    Candidate { candidate: RTCIceCandidateInit },
}

impl SignalingMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            SignalingMessage::Offer { .. } => "offer",
            SignalingMessage::Answer { .. } => "answer",
            SignalingMessage::Candidate { .. } => "candidate",
        }
    }

    pub fn to_text(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_text(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use webrtc::peer_connection::sdp::sdp_type::RTCSdpType;

    #[test]
    fn parses_browser_offer() {
        let text = r#"{"type":"offer","offer":{"type":"offer","sdp":"v=0\r\n"}}"#;
        match SignalingMessage::from_text(text).unwrap() {
            SignalingMessage::Offer { offer } => {
                assert_eq!(offer.sdp_type, RTCSdpType::Offer);
                assert_eq!(offer.sdp, "v=0\r\n");
            }
            other => panic!("unexpected {}", other.kind()),
        }
    }

    #[test]
    fn parses_browser_candidate() {
        let text = r#"{"type":"candidate","candidate":{"candidate":"candidate:1 1 udp 2122260223 192.168.1.2 54321 typ host","sdpMid":"0","sdpMLineIndex":0,"usernameFragment":"abcd"}}"#;
        match SignalingMessage::from_text(text).unwrap() {
            SignalingMessage::Candidate { candidate } => {
                assert!(candidate.candidate.ends_with("typ host"));
                assert_eq!(candidate.sdp_mid.as_deref(), Some("0"));
                assert_eq!(candidate.sdp_mline_index, Some(0));
            }
            other => panic!("unexpected {}", other.kind()),
        }
    }

    #[test]
    fn answer_text_keeps_wire_shape() {
        let answer: RTCSessionDescription =
            serde_json::from_str(r#"{"type":"answer","sdp":"v=0\r\n"}"#).unwrap();
        let text = SignalingMessage::Answer { answer }.to_text().unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["type"], "answer");
        assert_eq!(value["answer"]["type"], "answer");
        assert_eq!(value["answer"]["sdp"], "v=0\r\n");
    }

    #[test]
    fn unknown_type_is_rejected() {
        assert!(SignalingMessage::from_text(r#"{"type":"bye"}"#).is_err());
        assert!(SignalingMessage::from_text("not json").is_err());
    }
}
