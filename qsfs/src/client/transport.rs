//! Thin synchronous HTTP transport over `ureq`, giving the adapter a single
//! seam to mock in tests without pulling in an async runtime (spec §1
//! Non-goals: "no async I/O").

use std::io::Read;
use std::time::Duration;

use crate::errors::{ClientError, ErrorKind};

/// One already-signed outgoing request.
pub struct RawRequest<'a> {
    pub method: &'a str,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
}

/// One response, with status/headers preserved for the caller to interpret
/// (e.g. `Content-Range`, `ETag`).
pub struct RawResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl RawResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Executes signed requests against the object store endpoint.
pub struct HttpTransport {
    agent: ureq::Agent,
}

impl HttpTransport {
    pub fn new(request_timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(request_timeout)
            .build();
        HttpTransport { agent }
    }

    pub fn execute(&self, request: RawRequest<'_>) -> Result<RawResponse, ClientError> {
        let mut req = self.agent.request(request.method, &request.url);
        for (name, value) in &request.headers {
            req = req.set(name, value);
        }

        let result = match request.body {
            Some(body) => req.send_bytes(&body),
            None => req.call(),
        };

        match result {
            Ok(response) => Ok(Self::read_response(response)),
            Err(ureq::Error::Status(_, response)) => Ok(Self::read_response(response)),
            Err(ureq::Error::Transport(transport)) => Err(ClientError::new(
                ErrorKind::NetworkConnection,
                "Transport",
                transport.to_string(),
            )),
        }
    }

    fn read_response(response: ureq::Response) -> RawResponse {
        let status = response.status();
        let headers: Vec<(String, String)> = response
            .headers_names()
            .into_iter()
            .filter_map(|name| response.header(&name).map(|v| (name, v.to_string())))
            .collect();
        let mut body = Vec::new();
        let _ = response.into_reader().read_to_end(&mut body);
        RawResponse { status, headers, body }
    }
}
