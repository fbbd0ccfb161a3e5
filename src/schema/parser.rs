use serde::Deserialize;
use serde_json::Value;
use std::collections::HashSet;
use tracing::debug;

use super::catalog::{self, LIST_OF_SHIPMENTS_KEY};
use super::{ParsedRequest, ParsedSchema, ShipmentMode};
use crate::models::RequestId;

#[derive(Debug, Deserialize)]
struct RawRequest {
    request_id: RequestId,
    #[serde(default)]
    requested_fields: Vec<String>,
}

/// Parses Klarna's `requests_raw`.
///
/// Accepts the array itself or a JSON string holding it. Any structural
/// problem yields an empty schema; unknown field keys are skipped.
pub fn parse_requests(raw: Option<&Value>) -> ParsedSchema {
    let Some(raw) = raw else {
        return ParsedSchema::default();
    };

    let decoded = match raw {
        Value::Null => return ParsedSchema::default(),
        Value::String(text) => match serde_json::from_str::<Vec<RawRequest>>(text) {
            Ok(requests) => requests,
            Err(e) => {
                debug!(error = %e, "requests_raw string is not a request list; treating as empty");
                return ParsedSchema::default();
            }
        },
        other => match Vec::<RawRequest>::deserialize(other) {
            Ok(requests) => requests,
            Err(e) => {
                debug!(error = %e, "requests_raw is not a request list; treating as empty");
                return ParsedSchema::default();
            }
        },
    };

    ParsedSchema {
        requests: decoded.into_iter().map(parse_request).collect(),
    }
}

fn parse_request(raw: RawRequest) -> ParsedRequest {
    let mut shipments = ShipmentMode::None;
    let mut seen = HashSet::new();
    let mut fields = Vec::with_capacity(raw.requested_fields.len());

    for key in raw.requested_fields {
        let key = key.trim().to_string();

        if catalog::is_shipment_marker(&key) {
            shipments = if key == LIST_OF_SHIPMENTS_KEY || shipments == ShipmentMode::Multiple {
                ShipmentMode::Multiple
            } else {
                ShipmentMode::Single
            };
            continue;
        }

        if !seen.insert(key.clone()) {
            continue;
        }

        match catalog::lookup(&key) {
            Some(descriptor) => fields.push(descriptor),
            None => debug!(key = %key, request_id = %raw.request_id, "dropping unknown requested field"),
        }
    }

    ParsedRequest {
        request_id: raw.request_id,
        fields,
        shipments,
    }
}
