//! Host <-> view message model.
//! - Message: `type`-tagged envelope (request/response/event)
//! - InboundRequest/InboundEvent: closed decoding of host-sent names
//! - OutboundEvent: notifications the view sends to the host

use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ProtocolError;

/// Message envelope; `type` selects the variant on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Message {
    Request(Request),
    Response(Response),
    Event(Event),
}

impl Message {
    /// Parse a raw JSON payload.
    pub fn parse(payload: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(payload).map_err(ProtocolError::Malformed)
    }

    #[must_use]
    pub fn seq(&self) -> u64 {
        match self {
            Self::Request(request) => request.seq,
            Self::Response(response) => response.seq,
            Self::Event(event) => event.seq,
        }
    }
}

/// Request message. Command-specific fields sit next to `seq`/`command`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub seq: u64,
    pub command: String,
    #[serde(flatten)]
    pub arguments: Map<String, Value>,
}

impl Request {
    /// Build a request from a serializable argument struct. Non-object
    /// arguments are dropped.
    pub fn with_arguments<T: Serialize>(
        seq: u64,
        command: impl Into<String>,
        arguments: &T,
    ) -> Result<Self, serde_json::Error> {
        let arguments = match serde_json::to_value(arguments)? {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Ok(Self {
            seq,
            command: command.into(),
            arguments,
        })
    }

    fn decode<T: DeserializeOwned>(&self) -> Result<T, ProtocolError> {
        serde_json::from_value(Value::Object(self.arguments.clone())).map_err(|source| {
            ProtocolError::InvalidArguments {
                command: self.command.clone(),
                source,
            }
        })
    }
}

/// Response message correlated to a request by `request_seq`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub seq: u64,
    pub command: String,
    #[serde(rename = "request_seq", alias = "requestSeq")]
    pub request_seq: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

/// Fire-and-forget notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub seq: u64,
    pub event: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Arguments for `setContents`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetContentsArguments {
    pub run_id: String,
    #[serde(default)]
    pub initial_contents: String,
    #[serde(default)]
    pub all_run_ids_to_label: IndexMap<String, String>,
}

/// Arguments for `appendContents`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppendContentsArguments {
    pub run_id: String,
    #[serde(alias = "appendedContents")]
    pub append_contents: String,
}

/// Arguments for `updateLabel`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateLabelArguments {
    pub run_id: String,
    pub label: String,
}

/// Body of the `onSetCurrentRunId` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetCurrentRunIdBody {
    pub run_id: String,
}

/// Host-to-view requests the view understands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundRequest {
    SetContents(SetContentsArguments),
    AppendContents(AppendContentsArguments),
    UpdateLabel(UpdateLabelArguments),
    Unknown,
}

impl InboundRequest {
    pub const SET_CONTENTS: &'static str = "setContents";
    pub const APPEND_CONTENTS: &'static str = "appendContents";
    pub const UPDATE_LABEL: &'static str = "updateLabel";

    /// Decode a request by command name. Unrecognized commands decode to
    /// [`InboundRequest::Unknown`]; known commands with bad arguments fail.
    pub fn from_request(request: &Request) -> Result<Self, ProtocolError> {
        match request.command.as_str() {
            Self::SET_CONTENTS => request.decode().map(Self::SetContents),
            Self::APPEND_CONTENTS => request.decode().map(Self::AppendContents),
            Self::UPDATE_LABEL => request.decode().map(Self::UpdateLabel),
            _ => Ok(Self::Unknown),
        }
    }
}

/// Host-to-view events. `output` is reserved but has no handler yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    Output,
    Unknown,
}

impl InboundEvent {
    pub const OUTPUT: &'static str = "output";

    #[must_use]
    pub fn from_event(event: &Event) -> Self {
        match event.event.as_str() {
            Self::OUTPUT => Self::Output,
            _ => Self::Unknown,
        }
    }
}

/// View-to-host notifications.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundEvent {
    /// The user activated a cross-reference inside the tree.
    ClickReference(Value),
    /// The user picked another run in the run selector.
    SetCurrentRunId(SetCurrentRunIdBody),
}

impl OutboundEvent {
    pub const CLICK_REFERENCE: &'static str = "onClickReference";
    pub const SET_CURRENT_RUN_ID: &'static str = "onSetCurrentRunId";

    /// Builds the reference notification; wired as the click callback when hosted.
    #[must_use]
    pub fn click_reference(reference: Value) -> Self {
        Self::ClickReference(reference)
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::ClickReference(_) => Self::CLICK_REFERENCE,
            Self::SetCurrentRunId(_) => Self::SET_CURRENT_RUN_ID,
        }
    }

    #[must_use]
    pub fn into_data(self) -> Option<Value> {
        match self {
            Self::ClickReference(reference) => Some(reference),
            Self::SetCurrentRunId(body) => serde_json::to_value(body).ok(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use expect_test::expect;
    use serde_json::json;

    #[test]
    fn response_without_body_omits_field() {
        let response = Message::Response(Response {
            seq: 2,
            command: "setContents".to_string(),
            request_seq: 1,
            body: None,
        });
        let serialized = serde_json::to_string(&response).unwrap();
        expect![[r#"{"type":"response","seq":2,"command":"setContents","request_seq":1}"#]]
            .assert_eq(&serialized);
    }

    #[test]
    fn request_arguments_are_flattened() {
        let request = Request::with_arguments(
            1,
            InboundRequest::SET_CONTENTS,
            &json!({"initialContents": "x", "runId": "r1"}),
        )
        .unwrap();
        let serialized = serde_json::to_string(&Message::Request(request)).unwrap();
        expect![[r#"{"type":"request","seq":1,"command":"setContents","initialContents":"x","runId":"r1"}"#]]
            .assert_eq(&serialized);
    }

    #[test]
    fn decodes_set_contents_with_default_labels() {
        let message = Message::parse(
            r#"{"type":"request","seq":4,"command":"setContents","runId":"r1","initialContents":"x"}"#,
        )
        .unwrap();
        let Message::Request(request) = message else {
            panic!("expected request");
        };
        assert!(!request.arguments.contains_key("type"));
        let decoded = InboundRequest::from_request(&request).unwrap();
        assert_eq!(
            decoded,
            InboundRequest::SetContents(SetContentsArguments {
                run_id: "r1".to_string(),
                initial_contents: "x".to_string(),
                all_run_ids_to_label: IndexMap::new(),
            })
        );
    }

    #[test]
    fn append_contents_accepts_legacy_field_name() {
        let request = Request::with_arguments(
            3,
            InboundRequest::APPEND_CONTENTS,
            &json!({"runId": "r1", "appendedContents": "chunk"}),
        )
        .unwrap();
        let decoded = InboundRequest::from_request(&request).unwrap();
        let InboundRequest::AppendContents(args) = decoded else {
            panic!("expected appendContents");
        };
        assert_eq!(args.append_contents, "chunk");
    }

    #[test]
    fn unknown_command_is_not_an_error() {
        let request = Request::with_arguments(9, "refreshEverything", &json!({})).unwrap();
        assert_eq!(
            InboundRequest::from_request(&request).unwrap(),
            InboundRequest::Unknown
        );
    }

    #[test]
    fn known_command_with_bad_arguments_fails() {
        let request =
            Request::with_arguments(9, InboundRequest::APPEND_CONTENTS, &json!({"runId": 5}))
                .unwrap();
        let err = InboundRequest::from_request(&request).unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidArguments { ref command, .. } if command == "appendContents"));
    }

    #[test]
    fn response_accepts_camel_case_request_seq() {
        let message =
            Message::parse(r#"{"type":"response","seq":5,"command":"ping","requestSeq":3,"body":null}"#)
                .unwrap();
        let Message::Response(response) = message else {
            panic!("expected response");
        };
        assert_eq!(response.request_seq, 3);
        assert_eq!(response.body, None);
    }

    #[test]
    fn output_event_is_a_known_slot() {
        let event = Event {
            seq: 1,
            event: "output".to_string(),
            data: Some(json!("hello")),
        };
        assert_eq!(InboundEvent::from_event(&event), InboundEvent::Output);
    }

    #[test]
    fn set_current_run_id_event_data() {
        let event = OutboundEvent::SetCurrentRunId(SetCurrentRunIdBody {
            run_id: "r2".to_string(),
        });
        assert_eq!(event.name(), "onSetCurrentRunId");
        assert_eq!(event.into_data(), Some(json!({"runId": "r2"})));
    }
}
