//! Chain event source client.

use crate::{error::EventSourceError, EventKind, EventPage, EventSource};
use preranker_types::{
    ser, ChainEvent, EventCursor, EventId, IntentSubmittedEvent, SolutionSubmittedEvent,
};
use serde::Deserialize;

/// JSON-RPC client for the chain's event query endpoint.
///
/// Events are filtered by the intent package's fully qualified event types
/// and returned in ascending order. Payload fields are parsed tolerantly;
/// producers disagree about casing and about whether numbers are strings.
pub struct HttpEventSource {
    http: reqwest::Client,
    rpc_url: reqwest::Url,
    package: String,
}

#[derive(serde::Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u32,
    method: &'static str,
    params: (EventFilter<'a>, Option<&'a EventCursor>, usize, bool),
}

#[derive(serde::Serialize)]
struct EventFilter<'a> {
    #[serde(rename = "MoveEventType")]
    move_event_type: &'a str,
}

#[derive(Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<QueryEventsResult>,
    #[serde(default)]
    error: Option<RpcError>,
}

#[derive(Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

#[derive(Deserialize)]
struct QueryEventsResult {
    #[serde(default)]
    data: Vec<WireEvent>,
    #[serde(default, alias = "nextCursor")]
    next_cursor: Option<EventCursor>,
}

#[derive(Deserialize)]
struct WireEvent {
    id: EventId,
    #[serde(alias = "parsedJson")]
    parsed_json: serde_json::Value,
    #[serde(
        default,
        alias = "timestampMs",
        deserialize_with = "ser::opt_u64_from_int_or_str"
    )]
    timestamp_ms: Option<u64>,
}

#[derive(Deserialize)]
struct IntentPayload {
    #[serde(alias = "intentId")]
    intent_id: String,
    #[serde(alias = "blobId")]
    blob_id: String,
}

#[derive(Deserialize)]
struct SolutionPayload {
    #[serde(alias = "intentId")]
    intent_id: String,
    #[serde(alias = "solutionId")]
    solution_id: String,
    #[serde(alias = "blobId")]
    blob_id: String,
}

impl HttpEventSource {
    /// Build a client for the chain RPC at `rpc_url`, filtering events to
    /// the given intent package.
    pub fn new(rpc_url: &str, package: &str) -> anyhow::Result<Self> {
        Ok(Self {
            http: reqwest::Client::new(),
            rpc_url: reqwest::Url::parse(rpc_url)?,
            package: package.to_string(),
        })
    }

    fn event_type(&self, kind: EventKind) -> String {
        match kind {
            EventKind::IntentSubmitted => format!("{}::intents::IntentSubmitted", self.package),
            EventKind::SolutionSubmitted => {
                format!("{}::solutions::SolutionSubmitted", self.package)
            }
        }
    }
}

fn parse_event(kind: EventKind, wire: WireEvent) -> Result<ChainEvent, EventSourceError> {
    let malformed = |err: serde_json::Error| EventSourceError::Malformed(err.to_string());
    match kind {
        EventKind::IntentSubmitted => {
            let payload: IntentPayload =
                serde_json::from_value(wire.parsed_json).map_err(malformed)?;
            Ok(ChainEvent::IntentSubmitted(IntentSubmittedEvent {
                id: wire.id,
                intent_id: payload.intent_id,
                blob_id: payload.blob_id,
                timestamp_ms: wire.timestamp_ms,
            }))
        }
        EventKind::SolutionSubmitted => {
            let payload: SolutionPayload =
                serde_json::from_value(wire.parsed_json).map_err(malformed)?;
            Ok(ChainEvent::SolutionSubmitted(SolutionSubmittedEvent {
                id: wire.id,
                intent_id: payload.intent_id,
                solution_id: payload.solution_id,
                blob_id: payload.blob_id,
                timestamp_ms: wire.timestamp_ms,
            }))
        }
    }
}

#[async_trait::async_trait]
impl EventSource for HttpEventSource {
    async fn query_events(
        &self,
        kind: EventKind,
        cursor: Option<&EventCursor>,
        limit: usize,
    ) -> Result<EventPage, EventSourceError> {
        let event_type = self.event_type(kind);
        let request = RpcRequest {
            jsonrpc: "2.0",
            id: 1,
            method: "suix_queryEvents",
            params: (
                EventFilter {
                    move_event_type: &event_type,
                },
                cursor,
                limit,
                // descending = false; the ingestor depends on ascending
                // order.
                false,
            ),
        };
        let response = self
            .http
            .post(self.rpc_url.clone())
            .json(&request)
            .send()
            .await
            .map_err(|err| EventSourceError::Transient(err.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(EventSourceError::Transient(format!(
                "event source answered {status}"
            )));
        }
        let body: RpcResponse = response
            .json()
            .await
            .map_err(|err| EventSourceError::Malformed(err.to_string()))?;
        if let Some(err) = body.error {
            return Err(EventSourceError::Transient(format!(
                "rpc error {}: {}",
                err.code, err.message
            )));
        }
        let result = body.result.ok_or_else(|| {
            EventSourceError::Malformed("response carries neither result nor error".to_string())
        })?;
        let mut events = result
            .data
            .into_iter()
            .map(|wire| parse_event(kind, wire))
            .collect::<Result<Vec<_>, _>>()?;
        events.sort_by(|a, b| a.id().cmp(b.id()));
        Ok(EventPage {
            events,
            next_cursor: result.next_cursor,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_snake_and_camel_payloads() {
        let camel: WireEvent = serde_json::from_str(
            r#"{
                "id": {"txDigest": "0xd1", "eventSeq": "3"},
                "parsedJson": {"intentId": "i-1", "blobId": "b-1"},
                "timestampMs": "1700000000000"
            }"#,
        )
        .unwrap();
        let snake: WireEvent = serde_json::from_str(
            r#"{
                "id": {"tx_digest": "0xd1", "event_seq": 3},
                "parsed_json": {"intent_id": "i-1", "blob_id": "b-1"},
                "timestamp_ms": 1700000000000
            }"#,
        )
        .unwrap();

        for wire in [camel, snake] {
            let event = parse_event(EventKind::IntentSubmitted, wire).unwrap();
            let ChainEvent::IntentSubmitted(ev) = event else {
                panic!("wrong event kind");
            };
            assert_eq!(ev.id.event_seq, 3);
            assert_eq!(ev.intent_id, "i-1");
            assert_eq!(ev.blob_id, "b-1");
            assert_eq!(ev.timestamp_ms, Some(1_700_000_000_000));
        }
    }

    #[test]
    fn solution_payload_requires_solution_id() {
        let wire: WireEvent = serde_json::from_str(
            r#"{
                "id": {"txDigest": "0xd2", "eventSeq": 4},
                "parsedJson": {"intentId": "i-1", "blobId": "b-2"}
            }"#,
        )
        .unwrap();
        assert!(parse_event(EventKind::SolutionSubmitted, wire).is_err());
    }
}
