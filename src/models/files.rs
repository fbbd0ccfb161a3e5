use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use strum::{AsRefStr, Display, EnumIter};

use super::dispute_case::EvidenceKind;

/// A file accepted by the backend. Only ever built from an upload response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedFile {
    pub file_id: String,
    pub file_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub static_url: Option<String>,
}

impl UploadedFile {
    pub fn new(file_id: impl Into<String>, file_name: impl Into<String>) -> Self {
        Self {
            file_id: file_id.into(),
            file_name: file_name.into(),
            static_url: None,
        }
    }
}

/// A file the merchant picked but that has not been uploaded yet.
#[derive(Clone, PartialEq, Eq)]
pub struct SelectedFile {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Bytes,
}

impl SelectedFile {
    pub fn new(
        file_name: impl Into<String>,
        content_type: impl Into<String>,
        bytes: impl Into<Bytes>,
    ) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: content_type.into(),
            bytes: bytes.into(),
        }
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    /// MIME type without parameters, lowercased. Falls back to the file
    /// extension when the browser reported nothing.
    pub fn effective_content_type(&self) -> String {
        let declared = self
            .content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        let declared = match declared.as_str() {
            "image/jpg" | "image/pjpeg" => "image/jpeg".to_string(),
            _ => declared,
        };

        if !declared.is_empty() {
            return declared;
        }

        let extension = self
            .file_name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default();

        match extension.as_str() {
            "png" => "image/png".to_string(),
            "jpg" | "jpeg" => "image/jpeg".to_string(),
            "pdf" => "application/pdf".to_string(),
            _ => String::new(),
        }
    }
}

// Debug output never includes file contents.
impl fmt::Debug for SelectedFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SelectedFile")
            .field("file_name", &self.file_name)
            .field("content_type", &self.content_type)
            .field("size", &self.size())
            .finish()
    }
}

/// How many files a target slot holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    /// One file; a new upload replaces the previous one.
    Single,
    /// Any number of files; uploads append.
    Multiple,
}

/// An upload destination. Each target has its own buffer, timer and
/// in-flight gate.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, AsRefStr, EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum UploadTarget {
    GenericFiles,
    AfterpayShippingDocument,
    AfterpayRefundPolicy,
    KlarnaFiles,
}

impl UploadTarget {
    pub fn arity(&self) -> Arity {
        match self {
            UploadTarget::GenericFiles | UploadTarget::KlarnaFiles => Arity::Multiple,
            UploadTarget::AfterpayShippingDocument | UploadTarget::AfterpayRefundPolicy => {
                Arity::Single
            }
        }
    }

    pub fn evidence_kind(&self) -> EvidenceKind {
        match self {
            UploadTarget::GenericFiles => EvidenceKind::Generic,
            UploadTarget::AfterpayShippingDocument | UploadTarget::AfterpayRefundPolicy => {
                EvidenceKind::Afterpay
            }
            UploadTarget::KlarnaFiles => EvidenceKind::Klarna,
        }
    }
}
