//! Transform a `PendingRecord` into a remote HTTP write and classify the
//! result for the journal's drain protocol.

pub mod http;

pub use http::HttpUploadClient;

use crate::storage::sample::Sample;
use crate::storage::journal::UploadResult;

/// Anything that can attempt one delivery of a sample. The blocking HTTP
/// GET client is the production implementation; tests substitute a closure
/// or a scripted stub.
pub trait UploadTransport {
    fn upload(&mut self, sample: &Sample) -> UploadResult;
}

impl<F: FnMut(&Sample) -> UploadResult> UploadTransport for F {
    fn upload(&mut self, sample: &Sample) -> UploadResult {
        self(sample)
    }
}
