use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::ServiceError;
use crate::models::{
    Arity, CaseId, DisputeCase, EvidenceKind, EvidencePackage, KlarnaEvidence, ShipmentKey,
    ShipmentValues, UploadTarget, UploadedFile,
};
use crate::schema::{catalog, FieldType, KlarnaForm, ParsedSchema};

/// Editable generic evidence fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenericField {
    TrackingNumber,
    CarrierName,
    RefundId,
    Note,
}

/// Editable Afterpay text fields. File slots are written by uploads only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AfterpayField {
    ProductDescription,
    ShippingAddress,
    ShippingCarrier,
    ShippingDate,
    ShippingTrackingNumber,
    RefundPolicyDisclosure,
    RefundRefusalExplanation,
}

/// One field edit addressed to the open case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scope", rename_all = "snake_case")]
pub enum FieldEdit {
    Generic {
        field: GenericField,
        value: String,
    },
    Afterpay {
        field: AfterpayField,
        value: String,
    },
    Klarna {
        request_index: usize,
        key: String,
        value: String,
    },
    Shipment {
        request_index: usize,
        shipment_index: usize,
        key: ShipmentKey,
        value: String,
    },
}

/// Case-scoped evidence container. Holds exactly one package shape plus, for
/// Klarna, the display form that mirrors it.
#[derive(Debug, Clone)]
pub struct EvidenceStore {
    case_id: CaseId,
    package: EvidencePackage,
    form: Option<KlarnaForm>,
}

impl EvidenceStore {
    /// Fresh, empty store for a case. Klarna cases are seeded from `schema`.
    pub fn open(case: &DisputeCase, schema: Option<&ParsedSchema>) -> Self {
        let kind = case.vendor.evidence_kind();
        let (package, form) = match (kind, schema) {
            (EvidenceKind::Klarna, Some(schema)) => (
                EvidencePackage::Klarna(schema.seed_evidence()),
                Some(schema.seed_form()),
            ),
            (EvidenceKind::Klarna, None) => (
                EvidencePackage::Klarna(KlarnaEvidence::default()),
                Some(KlarnaForm::default()),
            ),
            (kind, _) => (EvidencePackage::empty(kind), None),
        };

        Self {
            case_id: case.case_id.clone(),
            package,
            form,
        }
    }

    pub fn case_id(&self) -> &CaseId {
        &self.case_id
    }

    pub fn package(&self) -> &EvidencePackage {
        &self.package
    }

    pub fn form(&self) -> Option<&KlarnaForm> {
        self.form.as_ref()
    }

    /// Applies a field edit. Never validates the value itself.
    pub fn apply(&mut self, edit: FieldEdit) -> Result<(), ServiceError> {
        match (&mut self.package, edit) {
            (EvidencePackage::Generic(generic), FieldEdit::Generic { field, value }) => {
                let slot = match field {
                    GenericField::TrackingNumber => &mut generic.tracking_number,
                    GenericField::CarrierName => &mut generic.carrier_name,
                    GenericField::RefundId => &mut generic.refund_id,
                    GenericField::Note => &mut generic.note,
                };
                *slot = value;
                Ok(())
            }
            (EvidencePackage::Afterpay(afterpay), FieldEdit::Afterpay { field, value }) => {
                let slot = match field {
                    AfterpayField::ProductDescription => &mut afterpay.product_description,
                    AfterpayField::ShippingAddress => &mut afterpay.shipping_address,
                    AfterpayField::ShippingCarrier => &mut afterpay.shipping_carrier,
                    AfterpayField::ShippingDate => &mut afterpay.shipping_date,
                    AfterpayField::ShippingTrackingNumber => {
                        &mut afterpay.shipping_tracking_number
                    }
                    AfterpayField::RefundPolicyDisclosure => {
                        &mut afterpay.refund_policy_disclosure
                    }
                    AfterpayField::RefundRefusalExplanation => {
                        &mut afterpay.refund_refusal_explanation
                    }
                };
                *slot = value;
                Ok(())
            }
            (
                EvidencePackage::Klarna(klarna),
                FieldEdit::Klarna {
                    request_index,
                    key,
                    value,
                },
            ) => {
                let form = self.form.as_ref().ok_or_else(missing_form)?;
                let request_form = form
                    .requests
                    .get(request_index)
                    .ok_or_else(|| request_out_of_range(request_index))?;
                let descriptor = request_form
                    .fields
                    .iter()
                    .find(|d| d.key == key)
                    .ok_or_else(|| {
                        ServiceError::InvalidOperation(format!(
                            "Request {} has no field '{}'",
                            request_index, key
                        ))
                    })?;
                if descriptor.field_type == FieldType::UploadFile {
                    return Err(ServiceError::InvalidOperation(format!(
                        "'{}' is satisfied by uploading files",
                        key
                    )));
                }

                let request = klarna
                    .requests
                    .get_mut(request_index)
                    .ok_or_else(|| request_out_of_range(request_index))?;
                request.fields.insert(key, value);
                Ok(())
            }
            (
                EvidencePackage::Klarna(klarna),
                FieldEdit::Shipment {
                    request_index,
                    shipment_index,
                    key,
                    value,
                },
            ) => {
                let shipments = klarna
                    .requests
                    .get_mut(request_index)
                    .ok_or_else(|| request_out_of_range(request_index))?
                    .shipments
                    .as_mut()
                    .ok_or_else(|| no_shipments(request_index))?;
                let shipment = shipments.get_mut(shipment_index).ok_or_else(|| {
                    ServiceError::InvalidOperation(format!(
                        "Shipment {} does not exist on request {}",
                        shipment_index, request_index
                    ))
                })?;
                shipment.set(key, value);
                Ok(())
            }
            (package, edit) => Err(ServiceError::InvalidOperation(format!(
                "{} edit does not apply to {} evidence",
                edit_scope(&edit),
                package.kind()
            ))),
        }
    }

    /// Appends an empty shipment to a multi-shipment request, in both the
    /// values and the display form. Returns the new shipment count.
    pub fn add_shipment(&mut self, request_index: usize) -> Result<usize, ServiceError> {
        let (klarna, form) = self.klarna_parts()?;

        let block = form
            .requests
            .get_mut(request_index)
            .ok_or_else(|| request_out_of_range(request_index))?
            .shipment_block
            .as_mut()
            .ok_or_else(|| no_shipments(request_index))?;
        if !block.multiple {
            return Err(ServiceError::InvalidOperation(format!(
                "Request {} accepts a single shipment",
                request_index
            )));
        }
        let shipments = klarna
            .requests
            .get_mut(request_index)
            .ok_or_else(|| request_out_of_range(request_index))?
            .shipments
            .get_or_insert_with(Vec::new);

        shipments.push(ShipmentValues::default());
        block.entries.push(catalog::shipment_field_set());
        debug_assert_eq!(shipments.len(), block.entries.len());
        Ok(shipments.len())
    }

    /// Removes one shipment from both lists. The last remaining shipment of a
    /// request cannot be removed.
    pub fn remove_shipment(
        &mut self,
        request_index: usize,
        shipment_index: usize,
    ) -> Result<(), ServiceError> {
        let (klarna, form) = self.klarna_parts()?;

        let block = form
            .requests
            .get_mut(request_index)
            .ok_or_else(|| request_out_of_range(request_index))?
            .shipment_block
            .as_mut()
            .ok_or_else(|| no_shipments(request_index))?;
        let shipments = klarna
            .requests
            .get_mut(request_index)
            .ok_or_else(|| request_out_of_range(request_index))?
            .shipments
            .as_mut()
            .ok_or_else(|| no_shipments(request_index))?;

        if shipment_index >= shipments.len() || shipment_index >= block.entries.len() {
            return Err(ServiceError::InvalidOperation(format!(
                "Shipment {} does not exist on request {}",
                shipment_index, request_index
            )));
        }
        if shipments.len() <= 1 {
            return Err(ServiceError::InvalidOperation(
                "At least one shipment is required".to_string(),
            ));
        }

        shipments.remove(shipment_index);
        block.entries.remove(shipment_index);
        Ok(())
    }

    /// Writes a successful upload response into the package: replace for
    /// single-file slots, append for multi-file targets.
    pub fn apply_upload(
        &mut self,
        target: UploadTarget,
        mut files: Vec<UploadedFile>,
    ) -> Result<(), ServiceError> {
        if target.evidence_kind() != self.package.kind() {
            return Err(ServiceError::InvalidOperation(format!(
                "Upload target {} does not belong to {} evidence",
                target,
                self.package.kind()
            )));
        }
        if files.is_empty() {
            debug!(case_id = %self.case_id, %target, "upload response carried no files");
            return Ok(());
        }

        match (&mut self.package, target) {
            (EvidencePackage::Generic(generic), UploadTarget::GenericFiles) => {
                generic.files.append(&mut files);
            }
            (EvidencePackage::Klarna(klarna), UploadTarget::KlarnaFiles) => {
                klarna.attachments.append(&mut files);
            }
            (EvidencePackage::Afterpay(afterpay), UploadTarget::AfterpayShippingDocument) => {
                debug_assert_eq!(target.arity(), Arity::Single);
                afterpay.shipping_document = files.pop();
            }
            (EvidencePackage::Afterpay(afterpay), UploadTarget::AfterpayRefundPolicy) => {
                afterpay.refund_policy = files.pop();
            }
            (package, target) => {
                return Err(ServiceError::InternalError(format!(
                    "No slot for {} in {} evidence",
                    target,
                    package.kind()
                )))
            }
        }
        Ok(())
    }

    fn klarna_parts(&mut self) -> Result<(&mut KlarnaEvidence, &mut KlarnaForm), ServiceError> {
        match (&mut self.package, self.form.as_mut()) {
            (EvidencePackage::Klarna(klarna), Some(form)) => Ok((klarna, form)),
            (EvidencePackage::Klarna(_), None) => Err(missing_form()),
            (package, _) => Err(ServiceError::InvalidOperation(format!(
                "Shipments do not apply to {} evidence",
                package.kind()
            ))),
        }
    }
}

fn edit_scope(edit: &FieldEdit) -> &'static str {
    match edit {
        FieldEdit::Generic { .. } => "generic",
        FieldEdit::Afterpay { .. } => "afterpay",
        FieldEdit::Klarna { .. } => "klarna",
        FieldEdit::Shipment { .. } => "shipment",
    }
}

fn missing_form() -> ServiceError {
    ServiceError::InternalError("Klarna evidence has no display form".to_string())
}

fn request_out_of_range(request_index: usize) -> ServiceError {
    ServiceError::InvalidOperation(format!("Request {} does not exist", request_index))
}

fn no_shipments(request_index: usize) -> ServiceError {
    ServiceError::InvalidOperation(format!(
        "Request {} does not ask for shipments",
        request_index
    ))
}
