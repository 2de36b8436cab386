//! Blocking HTTP GET wire protocol (spec.md §6 "Wire protocol (external)").
//!
//! Grounded on the reqwest-blocking pattern used for outbound telemetry in
//! `examples/other_examples`'s IoT-relay manifests; the teacher's own stack
//! uses an async web framework for an inbound dashboard, which does not fit
//! this node's single blocking call per drain step.

use std::time::Duration;

use crate::storage::journal::UploadResult;
use crate::storage::sample::Sample;
use crate::uploader::UploadTransport;

/// Network timeout bound named in spec.md §5: "hard 5-7 s timeout".
const UPLOAD_TIMEOUT: Duration = Duration::from_secs(6);

/// Production upload transport: one blocking HTTP GET per sample.
pub struct HttpUploadClient {
    client: reqwest::blocking::Client,
    endpoint_url: String,
    api_key: String,
    mac: String,
}

impl HttpUploadClient {
    /// Build a client bound to `endpoint_url`/`api_key`. `mac` is the
    /// device MAC in any common format; colons are stripped per spec.md §6.
    pub fn new(endpoint_url: impl Into<String>, api_key: impl Into<String>, mac: &str) -> reqwest::Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(UPLOAD_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            endpoint_url: endpoint_url.into(),
            api_key: api_key.into(),
            mac: strip_colons(mac),
        })
    }
}

impl UploadTransport for HttpUploadClient {
    fn upload(&mut self, sample: &Sample) -> UploadResult {
        let response = self
            .client
            .get(&self.endpoint_url)
            .query(&[
                ("api_key", self.api_key.as_str()),
                ("measurement", &sample.measurement.to_string()),
                ("sensor", sample.sensor.as_str()),
                ("valor", &format!("{:.2}", sample.value)),
                ("ts", &sample.ts_us.to_string()),
                ("mac", self.mac.as_str()),
                ("source", &sample.source.to_string()),
            ])
            .send();

        let response = match response {
            Ok(r) => r,
            Err(_) => return UploadResult::TransportError,
        };
        let status = response.status().as_u16();
        let body = response.text().unwrap_or_default();
        classify_response(status, &body)
    }
}

fn strip_colons(mac: &str) -> String {
    mac.chars().filter(|c| *c != ':').collect()
}

/// Pure classification of the wire response, per spec.md §6: `Ok` iff HTTP
/// 200 with a body containing `OK`, or HTTP 204. Everything else
/// (including other 2xx/4xx/5xx) is a failure for cursor purposes.
fn classify_response(status: u16, body: &str) -> UploadResult {
    if status == 204 {
        UploadResult::Ok
    } else if status == 200 && body.contains("OK") {
        UploadResult::Ok
    } else {
        UploadResult::HttpError(status)
    }
}
