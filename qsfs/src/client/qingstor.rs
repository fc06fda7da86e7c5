//! Concrete [`ObjectStoreClient`] talking to a QingStor-shaped REST API over
//! [`HttpTransport`], grounded on `original_source/src/client/QSError.cpp`'s
//! two closed translation tables (HTTP status -> error kind, SDK error code
//! -> error kind) and `original_source/src/client/QSClient.cpp`'s per-call
//! shape.

use std::time::{Duration, SystemTime};

use log::warn;

use crate::errors::{ClientError, ErrorKind, Outcome};

use super::request::{
    parse_content_range, ByteRange, GetObjectRequest, GetObjectResponse, HeadObjectResponse,
    ListObjectsRequest, ListObjectsResponse, ObjectSummary, PutObjectRequest,
};
use super::signer::Signer;
use super::transport::{HttpTransport, RawRequest};
use super::ObjectStoreClient;

/// HTTP status -> error kind, following the vendor status-code table
/// (`SDKResponseToQSError` in `QSError.cpp`) but collapsed to the subset
/// `Drive` actually needs to distinguish.
fn status_to_error_kind(status: u16) -> ErrorKind {
    match status {
        200..=299 | 302 | 304 => ErrorKind::Good,
        301 => ErrorKind::ResourceNotFound,
        400 => ErrorKind::ServiceUnavailable,
        401 => ErrorKind::ClientUnrecognized,
        403 => ErrorKind::AccessDenied,
        404 => ErrorKind::KeyNotExist,
        405 | 409 | 501 => ErrorKind::ActionInvalid,
        406 => ErrorKind::AccessDenied,
        408 | 419 | 440 => ErrorKind::RequestExpired,
        412 => ErrorKind::InternalFailure,
        413 | 420 | 423 | 429 | 444 | 449 | 451 => ErrorKind::ServiceUnavailable,
        414 | 416 => ErrorKind::QueryParameterInvalid,
        415 | 417 | 422 | 431 | 450 => ErrorKind::ParameterValueInvalid,
        500 | 505 | 506 | 508 | 509 => ErrorKind::InternalFailure,
        502 | 504 | 511 | 598 | 599 => ErrorKind::NetworkConnection,
        503 => ErrorKind::ServiceUnavailable,
        _ => ErrorKind::Unknown,
    }
}

/// SDK error-code string -> error kind, following `StringToQSError` in
/// `QSError.cpp`.
fn error_code_to_kind(code: &str) -> ErrorKind {
    match code {
        "Good" => ErrorKind::Good,
        "AccessDenied" => ErrorKind::AccessDenied,
        "AccessKeyIdInvalid" => ErrorKind::AccessKeyIdInvalid,
        "ActionInvalid" => ErrorKind::ActionInvalid,
        "ActionMissing" => ErrorKind::ActionMissing,
        "AuthenticationTokenMissing" => ErrorKind::AuthenticationTokenMissing,
        "BucketAlreadyOwnedByYou" => ErrorKind::BucketAlreadyOwnedByYou,
        "BucketNotExist" => ErrorKind::BucketNotExist,
        "ClientUnrecognized" => ErrorKind::ClientUnrecognized,
        "ClientTokenIdInvalid" => ErrorKind::ClientTokenIdInvalid,
        "InternalFailure" => ErrorKind::InternalFailure,
        "KeyNotExist" => ErrorKind::KeyNotExist,
        "NetworkConnection" => ErrorKind::NetworkConnection,
        "NoSuchListMultipart" => ErrorKind::NoSuchListMultipart,
        "NoSuchListMultipartUploads" => ErrorKind::NoSuchListMultipartUploads,
        "NoSuchListObjects" => ErrorKind::NoSuchListObjects,
        "ObjectAlreadyInActiveTier" => ErrorKind::ObjectAlreadyInActiveTier,
        "ObjectNotInActiveTier" => ErrorKind::ObjectNotInActiveTier,
        "ParameterCombinationInvalid" => ErrorKind::ParameterCombinationInvalid,
        "ParameterMissing" => ErrorKind::ParameterMissing,
        "ParameterValueInvalid" => ErrorKind::ParameterValueInvalid,
        "QueryParameterInvalid" => ErrorKind::QueryParameterInvalid,
        "RequestExpired" => ErrorKind::RequestExpired,
        "ResourceNotFound" => ErrorKind::ResourceNotFound,
        "ServiceUnavailable" => ErrorKind::ServiceUnavailable,
        "SignatureDoesNotMatch" => ErrorKind::SignatureDoesNotMatch,
        "SignatureIncompleted" => ErrorKind::SignatureIncompleted,
        "SignatureInvalid" => ErrorKind::SignatureInvalid,
        "SDKConfigureFileInvalid" => ErrorKind::SdkConfigureFileInvalid,
        "SDKRequestSendError" => ErrorKind::SdkRequestSendError,
        _ => ErrorKind::Unknown,
    }
}

/// Picks the more specific error kind of the two tables: an explicit vendor
/// error code in the response body wins over the bare HTTP status.
fn classify_error(status: u16, body: &[u8]) -> ClientError {
    let code_from_body = std::str::from_utf8(body)
        .ok()
        .and_then(|text| quick_xml::de::from_str::<ErrorDocument>(text).ok())
        .map(|doc| doc.code);

    let (kind, exception_name) = match code_from_body {
        Some(code) => {
            let kind = error_code_to_kind(&code);
            if kind == ErrorKind::Unknown {
                (status_to_error_kind(status), code)
            } else {
                (kind, code)
            }
        }
        None => (status_to_error_kind(status), format!("Http{status}")),
    };

    ClientError::new(kind, exception_name, format!("request failed with status {status}"))
}

#[derive(serde::Deserialize)]
#[serde(rename = "Error")]
struct ErrorDocument {
    #[serde(rename = "Code")]
    code: String,
}

pub struct QingStorClient {
    transport: HttpTransport,
    signer: Signer,
    endpoint: String,
    bucket: String,
}

impl QingStorClient {
    pub fn new(
        endpoint: impl Into<String>,
        bucket: impl Into<String>,
        signer: Signer,
        request_timeout: Duration,
    ) -> Self {
        QingStorClient {
            transport: HttpTransport::new(request_timeout),
            signer,
            endpoint: endpoint.into(),
            bucket: bucket.into(),
        }
    }

    fn resource(&self, key: &str) -> String {
        format!("/{}/{}", self.bucket, key.trim_start_matches('/'))
    }

    fn url(&self, key: &str) -> String {
        format!("{}{}", self.endpoint, self.resource(key))
    }

    fn date_header() -> String {
        let now = time::OffsetDateTime::now_utc();
        now.format(&time::format_description::well_known::Rfc2822)
            .unwrap_or_default()
    }

    fn signed_headers(&self, method: &str, key: &str) -> Vec<(String, String)> {
        let date = Self::date_header();
        let auth = self.signer.authorization_header(method, &self.resource(key), &date);
        vec![("Date".to_string(), date), ("Authorization".to_string(), auth)]
    }

    fn run(&self, method: &str, key: &str, extra_headers: Vec<(String, String)>, body: Option<Vec<u8>>) -> Outcome<super::transport::RawResponse> {
        let mut headers = self.signed_headers(method, key);
        headers.extend(extra_headers);
        let response = self
            .transport
            .execute(RawRequest { method, url: self.url(key), headers, body })?;
        if response.status >= 300 {
            return Err(classify_error(response.status, &response.body));
        }
        Ok(response)
    }

    fn last_modified(response: &super::transport::RawResponse) -> Option<SystemTime> {
        let header = response.header("Last-Modified")?;
        let parsed = time::OffsetDateTime::parse(header, &time::format_description::well_known::Rfc2822).ok()?;
        Some(SystemTime::from(parsed))
    }
}

impl ObjectStoreClient for QingStorClient {
    fn head_object(&self, key: &str) -> Outcome<HeadObjectResponse> {
        let response = self.run("HEAD", key, Vec::new(), None)?;
        let size = response
            .header("Content-Length")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        Ok(HeadObjectResponse {
            size,
            etag: response.header("ETag").map(str::to_string),
            content_type: response.header("Content-Type").map(str::to_string),
            last_modified: Self::last_modified(&response),
        })
    }

    fn get_object(&self, req: GetObjectRequest) -> Outcome<GetObjectResponse> {
        let headers = match req.range {
            Some(range) => vec![("Range".to_string(), range.to_header_value())],
            None => Vec::new(),
        };
        let response = self.run("GET", &req.key, headers, None)?;
        let content_range = response.header("Content-Range").and_then(parse_content_range);
        Ok(GetObjectResponse {
            etag: response.header("ETag").map(str::to_string),
            content_type: response.header("Content-Type").map(str::to_string),
            last_modified: Self::last_modified(&response),
            content_range,
            body: response.body,
        })
    }

    fn put_object(&self, req: PutObjectRequest) -> Outcome<()> {
        let mut headers = Vec::new();
        if let Some(content_type) = &req.content_type {
            headers.push(("Content-Type".to_string(), content_type.clone()));
        }
        self.run("PUT", &req.key, headers, Some(req.body))?;
        Ok(())
    }

    fn delete_object(&self, key: &str) -> Outcome<()> {
        self.run("DELETE", key, Vec::new(), None)?;
        Ok(())
    }

    fn list_objects(&self, req: ListObjectsRequest) -> Outcome<ListObjectsResponse> {
        let mut key = format!("?prefix={}", req.prefix);
        if let Some(delimiter) = req.delimiter {
            key.push_str(&format!("&delimiter={delimiter}"));
        }
        if let Some(max_keys) = req.max_keys {
            key.push_str(&format!("&limit={max_keys}"));
        }
        if let Some(marker) = &req.marker {
            key.push_str(&format!("&marker={marker}"));
        }
        let response = self.run("GET", &key, Vec::new(), None)?;
        let body = std::str::from_utf8(&response.body).unwrap_or_default();
        let doc: ListBucketResult = match quick_xml::de::from_str(body) {
            Ok(doc) => doc,
            Err(err) => {
                warn!("malformed list-objects response body: {err}");
                ListBucketResult::default()
            }
        };
        Ok(ListObjectsResponse {
            objects: doc
                .contents
                .into_iter()
                .map(|c| ObjectSummary { key: c.key, size: c.size, etag: Some(c.etag), last_modified: None })
                .collect(),
            common_prefixes: doc.common_prefixes.into_iter().map(|p| p.prefix).collect(),
            is_truncated: doc.is_truncated,
            next_marker: doc.next_marker,
        })
    }

    fn initiate_multipart_upload(&self, key: &str) -> Outcome<String> {
        let response = self.run("POST", &format!("{key}?uploads"), Vec::new(), None)?;
        let body = std::str::from_utf8(&response.body).unwrap_or_default();
        let doc: InitiateMultipartUploadResult = quick_xml::de::from_str(body)
            .map_err(|err| ClientError::new(ErrorKind::InternalFailure, "MalformedResponse", err.to_string()))?;
        Ok(doc.upload_id)
    }

    fn upload_part(&self, key: &str, upload_id: &str, part_number: u16, data: &[u8]) -> Outcome<String> {
        let resource = format!("{key}?part_number={part_number}&upload_id={upload_id}");
        let response = self.run("PUT", &resource, Vec::new(), Some(data.to_vec()))?;
        response
            .header("ETag")
            .map(str::to_string)
            .ok_or_else(|| ClientError::new(ErrorKind::InternalFailure, "MissingETag", "upload_part response had no ETag"))
    }

    fn complete_multipart_upload(&self, key: &str, upload_id: &str, parts: &[(u16, String)]) -> Outcome<()> {
        let mut body = String::from("<CompleteMultipartUpload>");
        for (number, etag) in parts {
            body.push_str(&format!("<Part><PartNumber>{number}</PartNumber><ETag>{etag}</ETag></Part>"));
        }
        body.push_str("</CompleteMultipartUpload>");
        self.run("POST", &format!("{key}?upload_id={upload_id}"), Vec::new(), Some(body.into_bytes()))?;
        Ok(())
    }

    fn abort_multipart_upload(&self, key: &str, upload_id: &str) -> Outcome<()> {
        self.run("DELETE", &format!("{key}?upload_id={upload_id}"), Vec::new(), None)?;
        Ok(())
    }
}

#[derive(serde::Deserialize, Default)]
#[serde(rename = "ListBucketResult", default)]
struct ListBucketResult {
    #[serde(rename = "Contents", default)]
    contents: Vec<ContentEntry>,
    #[serde(rename = "CommonPrefixes", default)]
    common_prefixes: Vec<CommonPrefixEntry>,
    #[serde(rename = "IsTruncated", default)]
    is_truncated: bool,
    #[serde(rename = "NextMarker")]
    next_marker: Option<String>,
}

#[derive(serde::Deserialize)]
struct ContentEntry {
    #[serde(rename = "Key")]
    key: String,
    #[serde(rename = "Size")]
    size: u64,
    #[serde(rename = "ETag", default)]
    etag: String,
}

#[derive(serde::Deserialize)]
struct CommonPrefixEntry {
    #[serde(rename = "Prefix")]
    prefix: String,
}

#[derive(serde::Deserialize)]
struct InitiateMultipartUploadResult {
    #[serde(rename = "UploadID")]
    upload_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_table_matches_closed_taxonomy_spot_checks() {
        assert_eq!(status_to_error_kind(404), ErrorKind::KeyNotExist);
        assert_eq!(status_to_error_kind(403), ErrorKind::AccessDenied);
        assert_eq!(status_to_error_kind(400), ErrorKind::ServiceUnavailable);
        assert_eq!(status_to_error_kind(401), ErrorKind::ClientUnrecognized);
        assert_eq!(status_to_error_kind(502), ErrorKind::NetworkConnection);
        assert_eq!(status_to_error_kind(503), ErrorKind::ServiceUnavailable);
        assert_eq!(status_to_error_kind(200), ErrorKind::Good);
    }

    #[test]
    fn error_code_table_matches_closed_taxonomy_spot_checks() {
        assert_eq!(error_code_to_kind("KeyNotExist"), ErrorKind::KeyNotExist);
        assert_eq!(error_code_to_kind("SignatureDoesNotMatch"), ErrorKind::SignatureDoesNotMatch);
        assert_eq!(error_code_to_kind("TotallyMadeUp"), ErrorKind::Unknown);
    }

    #[test]
    fn body_error_code_wins_over_bare_status() {
        let body = b"<Error><Code>KeyNotExist</Code></Error>";
        let err = classify_error(500, body);
        assert_eq!(err.kind, ErrorKind::KeyNotExist);
    }

    #[test]
    fn falls_back_to_status_table_without_a_body_code() {
        let err = classify_error(404, b"");
        assert_eq!(err.kind, ErrorKind::KeyNotExist);
    }
}
