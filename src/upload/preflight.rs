use crate::config::EngineConfig;
use crate::errors::ServiceError;
use crate::models::{Arity, SelectedFile, UploadTarget};

const MIB: u64 = 1024 * 1024;

/// Type and size limits checked against a drained batch right before it is
/// sent. Contents are never inspected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadPolicy {
    pub allowed_content_types: Vec<String>,
    pub max_file_bytes: u64,
    pub max_batch_bytes: u64,
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

impl UploadPolicy {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            allowed_content_types: config
                .allowed_content_types
                .iter()
                .map(|t| t.trim().to_ascii_lowercase())
                .collect(),
            max_file_bytes: config.max_file_bytes,
            max_batch_bytes: config.max_batch_bytes,
        }
    }

    /// First violation wins. The aggregate limit applies to multi-file
    /// targets only.
    pub fn check(&self, target: UploadTarget, files: &[SelectedFile]) -> Result<(), ServiceError> {
        for file in files {
            let content_type = file.effective_content_type();
            if !self.allowed_content_types.contains(&content_type) {
                return Err(ServiceError::UploadRejected(format!(
                    "{} is not a supported file type. Please upload {}",
                    file.file_name,
                    self.describe_allowed()
                )));
            }
            if file.size() > self.max_file_bytes {
                return Err(ServiceError::UploadRejected(format!(
                    "{} exceeds the {} file size limit",
                    file.file_name,
                    format_limit(self.max_file_bytes)
                )));
            }
        }

        if target.arity() == Arity::Multiple {
            let total: u64 = files.iter().map(SelectedFile::size).sum();
            if total > self.max_batch_bytes {
                return Err(ServiceError::UploadRejected(format!(
                    "Selected files exceed the {} total size limit",
                    format_limit(self.max_batch_bytes)
                )));
            }
        }

        Ok(())
    }

    fn describe_allowed(&self) -> String {
        self.allowed_content_types
            .iter()
            .map(|t| match t.as_str() {
                "image/png" => "PNG".to_string(),
                "image/jpeg" => "JPEG".to_string(),
                "application/pdf" => "PDF".to_string(),
                other => other.to_string(),
            })
            .collect::<Vec<_>>()
            .join(", ")
    }
}

fn format_limit(bytes: u64) -> String {
    if bytes % MIB == 0 {
        format!("{} MB", bytes / MIB)
    } else {
        format!("{} bytes", bytes)
    }
}
