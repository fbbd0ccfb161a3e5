/*!
 * # Upload Coordination
 *
 * File selections are buffered per target and sent as one call once the
 * target has been quiet for the configured window. At most one call per
 * target is outstanding; selections made meanwhile keep buffering.
 */

mod coordinator;
mod dispatch;
mod preflight;

pub use coordinator::{UploadBatch, UploadCoordinator, UploadTicket};
pub use dispatch::execute_batch;
pub use preflight::UploadPolicy;
