use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;

use crate::state::ArmStatus;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("invalid {msg_type} payload: {source}")]
    Payload {
        msg_type: &'static str,
        source: serde_json::Error,
    },
    #[error("invalid camera frame image: {0}")]
    Image(#[from] base64::DecodeError),
}

/// Wire envelope used in both directions: `{"type": ..., "payload": ...}`.
#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    msg_type: String,
    #[serde(default)]
    payload: Value,
}

/// A decoded inbound frame, classified by its `type` discriminator.
/// Constructed per received frame and consumed immediately by the router.
#[derive(Debug, Clone)]
pub enum InboundMessage {
    DefectUpdate(DefectDelta),
    RoboticArmUpdate { status: ArmStatus },
    CameraFeed(CameraFrame),
    Unknown { msg_type: String },
}

/// Partial defect metrics update; only the fields present on the wire are
/// applied to the snapshot.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DefectDelta {
    pub total_defects: Option<u64>,
    pub defects_by_type: Option<HashMap<String, u64>>,
    pub sorting_success_rate: Option<f64>,
    pub new_defect: Option<NewDefect>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewDefect {
    #[serde(rename = "type")]
    pub defect_type: String,
}

#[derive(Deserialize)]
struct ArmStatusPayload {
    status: ArmStatus,
}

#[derive(Deserialize)]
struct CameraFeedPayload {
    image: String,
}

/// Decoded JPEG bytes of one camera frame.
#[derive(Debug, Clone)]
pub struct CameraFrame {
    pub jpeg: Vec<u8>,
}

/// Decode one UTF-8 text frame: one pass for the envelope, one typed pass
/// for the payload. An unrecognized `type` is not an error; a payload that
/// does not match its declared type is.
pub fn decode(text: &str) -> Result<InboundMessage, ProtocolError> {
    let envelope: Envelope = serde_json::from_str(text)?;

    match envelope.msg_type.as_str() {
        "defect_update" => {
            let delta = serde_json::from_value(envelope.payload).map_err(|source| {
                ProtocolError::Payload {
                    msg_type: "defect_update",
                    source,
                }
            })?;
            Ok(InboundMessage::DefectUpdate(delta))
        }
        "robotic_arm_update" => {
            let payload: ArmStatusPayload =
                serde_json::from_value(envelope.payload).map_err(|source| {
                    ProtocolError::Payload {
                        msg_type: "robotic_arm_update",
                        source,
                    }
                })?;
            Ok(InboundMessage::RoboticArmUpdate {
                status: payload.status,
            })
        }
        "camera_feed" => {
            let payload: CameraFeedPayload =
                serde_json::from_value(envelope.payload).map_err(|source| {
                    ProtocolError::Payload {
                        msg_type: "camera_feed",
                        source,
                    }
                })?;
            let jpeg = BASE64.decode(payload.image.as_bytes())?;
            Ok(InboundMessage::CameraFeed(CameraFrame { jpeg }))
        }
        _ => Ok(InboundMessage::Unknown {
            msg_type: envelope.msg_type,
        }),
    }
}

/// Outbound envelope, sent through the connection manager's send API.
#[derive(Debug, Clone, Serialize)]
pub struct OutboundMessage {
    #[serde(rename = "type")]
    pub msg_type: String,
    pub payload: Value,
}

impl OutboundMessage {
    pub fn new(msg_type: impl Into<String>, payload: Value) -> Self {
        Self {
            msg_type: msg_type.into(),
            payload,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
