//! Static lookup from Klarna requested-field keys to their form presentation.

use once_cell::sync::Lazy;
use std::collections::HashMap;
use strum::IntoEnumIterator;

use super::{FieldType, RequestFieldDescriptor};
use crate::models::ShipmentKey;

/// Reserved key: the request wants one or more shipments described.
pub const LIST_OF_SHIPMENTS_KEY: &str = "list_of_shipments";
/// Reserved key: the request wants exactly one shipment described.
pub const SHIPMENT_KEY: &str = "shipment";

const YES_NO: &[&str] = &["yes", "no"];

struct FieldSpec {
    label: &'static str,
    field_type: FieldType,
    options: &'static [&'static str],
    min_length: Option<usize>,
    max_length: Option<usize>,
}

const fn text(label: &'static str) -> FieldSpec {
    FieldSpec {
        label,
        field_type: FieldType::Text,
        options: &[],
        min_length: None,
        max_length: Some(255),
    }
}

const fn text_area(label: &'static str) -> FieldSpec {
    FieldSpec {
        label,
        field_type: FieldType::TextArea,
        options: &[],
        min_length: None,
        max_length: Some(2000),
    }
}

const fn date(label: &'static str) -> FieldSpec {
    FieldSpec {
        label,
        field_type: FieldType::Date,
        options: &[],
        min_length: None,
        max_length: None,
    }
}

const fn drop_down(label: &'static str, options: &'static [&'static str]) -> FieldSpec {
    FieldSpec {
        label,
        field_type: FieldType::DropDown,
        options,
        min_length: None,
        max_length: None,
    }
}

const fn upload(label: &'static str) -> FieldSpec {
    FieldSpec {
        label,
        field_type: FieldType::UploadFile,
        options: &[],
        min_length: None,
        max_length: None,
    }
}

static CATALOG: Lazy<HashMap<&'static str, FieldSpec>> = Lazy::new(|| {
    HashMap::from([
        // shipment field set
        ("capture_id", text("Capture ID")),
        (
            "is_shipping_company_contacted",
            drop_down("Has the shipping company been contacted?", YES_NO),
        ),
        ("shipping_carrier", text("Shipping Carrier")),
        ("shipping_date", date("Shipping Date")),
        ("tracking_id", text("Tracking ID")),
        // free-form statements
        ("merchant_comment", text_area("Merchant Comment")),
        ("additional_information", text_area("Additional Information")),
        ("product_description", text_area("Product Description")),
        ("delivery_address", text_area("Delivery Address")),
        ("reason_for_denial", text_area("Reason for Denying the Claim")),
        // dates
        ("refund_date", date("Refund Date")),
        ("cancellation_date", date("Cancellation Date")),
        ("service_date", date("Service Date")),
        ("return_received_date", date("Return Received Date")),
        // references
        ("refund_amount", text("Refund Amount")),
        ("refund_reference", text("Refund Reference")),
        ("return_tracking_id", text("Return Tracking ID")),
        ("order_reference", text("Order Reference")),
        // yes/no questions
        ("goods_returned", drop_down("Were the goods returned?", YES_NO)),
        ("service_provided", drop_down("Was the service provided?", YES_NO)),
        // documents
        ("proof_of_delivery", upload("Proof of Delivery")),
        ("proof_of_refund", upload("Proof of Refund")),
        ("invoice", upload("Invoice")),
        ("customer_communication", upload("Customer Communication")),
        ("cancellation_policy", upload("Cancellation Policy")),
        ("return_policy", upload("Return Policy")),
        ("terms_and_conditions", upload("Terms and Conditions")),
    ])
});

/// Descriptor for a known key, `None` for keys this build does not know.
pub fn lookup(key: &str) -> Option<RequestFieldDescriptor> {
    CATALOG.get(key).map(|spec| RequestFieldDescriptor {
        key: key.to_string(),
        label: spec.label.to_string(),
        field_type: spec.field_type,
        options: spec.options.iter().map(|o| o.to_string()).collect(),
        min_length: spec.min_length,
        max_length: spec.max_length,
    })
}

pub fn is_shipment_marker(key: &str) -> bool {
    key == LIST_OF_SHIPMENTS_KEY || key == SHIPMENT_KEY
}

static SHIPMENT_FIELD_SET: Lazy<Vec<RequestFieldDescriptor>> = Lazy::new(|| {
    ShipmentKey::iter()
        .filter_map(|key| lookup(key.as_ref()))
        .collect()
});

/// The five fixed descriptors of one shipment instance.
pub fn shipment_field_set() -> Vec<RequestFieldDescriptor> {
    SHIPMENT_FIELD_SET.clone()
}
