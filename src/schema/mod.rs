/*!
 * # Klarna Requirement Schema
 *
 * Klarna describes the evidence it still needs as loosely structured JSON:
 * an array of requests, each listing the keys of the fields it wants. This
 * module turns that description into form descriptors, a seeded evidence
 * package and the display form the editor renders.
 *
 * Parsing never fails. Anything unreadable yields an empty schema, which the
 * rest of the engine reads as "nothing further required".
 */

pub mod catalog;
mod parser;

pub use parser::parse_requests;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::models::{KlarnaEvidence, KlarnaRequestValues, RequestId, ShipmentValues};

/// Input control used to render a requested field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldType {
    Text,
    TextArea,
    DropDown,
    Date,
    UploadFile,
}

/// Presentation and constraints for one requested field. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestFieldDescriptor {
    pub key: String,
    pub label: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
}

/// Whether and how a request asks for shipment details.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShipmentMode {
    None,
    /// `shipment`: exactly one shipment.
    Single,
    /// `list_of_shipments`: one or more, the merchant may add more.
    Multiple,
}

impl ShipmentMode {
    pub fn has_shipments(&self) -> bool {
        !matches!(self, ShipmentMode::None)
    }
}

/// One request as understood by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedRequest {
    pub request_id: RequestId,
    /// Plain fields in the order the counterpart listed them.
    pub fields: Vec<RequestFieldDescriptor>,
    pub shipments: ShipmentMode,
}

/// Parser output: the structured form of `requests_raw`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedSchema {
    pub requests: Vec<ParsedRequest>,
}

impl ParsedSchema {
    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    pub fn request_ids(&self) -> Vec<RequestId> {
        self.requests.iter().map(|r| r.request_id.clone()).collect()
    }

    /// Per request: may the merchant add shipments.
    pub fn is_multi_shipments(&self) -> Vec<bool> {
        self.requests
            .iter()
            .map(|r| r.shipments == ShipmentMode::Multiple)
            .collect()
    }

    /// Any request asks for shipment details.
    pub fn has_shipments(&self) -> bool {
        self.requests.iter().any(|r| r.shipments.has_shipments())
    }

    /// Initial evidence: empty values per field and one empty shipment per
    /// shipment-bearing request.
    pub fn seed_evidence(&self) -> KlarnaEvidence {
        let requests = self
            .requests
            .iter()
            .map(|request| KlarnaRequestValues {
                request_id: request.request_id.clone(),
                fields: request
                    .fields
                    .iter()
                    .map(|field| (field.key.clone(), String::new()))
                    .collect::<BTreeMap<_, _>>(),
                shipments: request
                    .shipments
                    .has_shipments()
                    .then(|| vec![ShipmentValues::default()]),
            })
            .collect();

        KlarnaEvidence {
            requests,
            attachments: Vec::new(),
        }
    }

    /// Display form matching `seed_evidence`.
    pub fn seed_form(&self) -> KlarnaForm {
        KlarnaForm {
            requests: self
                .requests
                .iter()
                .map(|request| RequestForm {
                    request_id: request.request_id.clone(),
                    fields: request.fields.clone(),
                    shipment_block: request.shipments.has_shipments().then(|| ShipmentBlock {
                        multiple: request.shipments == ShipmentMode::Multiple,
                        entries: vec![catalog::shipment_field_set()],
                    }),
                })
                .collect(),
        }
    }
}

/// Renderable form for a Klarna case. Kept in lockstep with the evidence
/// values by the evidence store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KlarnaForm {
    pub requests: Vec<RequestForm>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestForm {
    pub request_id: RequestId,
    pub fields: Vec<RequestFieldDescriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shipment_block: Option<ShipmentBlock>,
}

/// Repeated shipment field sets of one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShipmentBlock {
    /// "Add shipment" is offered.
    pub multiple: bool,
    pub entries: Vec<Vec<RequestFieldDescriptor>>,
}
