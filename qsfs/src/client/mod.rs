//! The object-store adapter (spec §4.J): a uniform typed request/response
//! surface over HTTP, with two closed translation tables from vendor status
//! codes and SDK error codes into the [`crate::errors::ErrorKind`] taxonomy.

mod qingstor;
mod request;
mod signer;
mod transport;

pub use qingstor::QingStorClient;
pub use request::{
    ByteRange, GetObjectRequest, GetObjectResponse, HeadObjectResponse, ListObjectsRequest,
    ListObjectsResponse, ObjectSummary, PutObjectRequest,
};
pub use signer::Signer;
pub use transport::HttpTransport;

use crate::errors::Outcome;

/// Operations the transfer engine and `Drive` need from the remote store.
/// A trait (rather than a concrete struct) so tests can substitute a fake
/// transport without touching the engine.
pub trait ObjectStoreClient: Send + Sync {
    fn head_object(&self, key: &str) -> Outcome<HeadObjectResponse>;
    fn get_object(&self, req: GetObjectRequest) -> Outcome<GetObjectResponse>;
    fn put_object(&self, req: PutObjectRequest) -> Outcome<()>;
    fn delete_object(&self, key: &str) -> Outcome<()>;
    fn list_objects(&self, req: ListObjectsRequest) -> Outcome<ListObjectsResponse>;

    fn initiate_multipart_upload(&self, key: &str) -> Outcome<String>;
    fn upload_part(&self, key: &str, upload_id: &str, part_number: u16, data: &[u8]) -> Outcome<String>;
    fn complete_multipart_upload(&self, key: &str, upload_id: &str, parts: &[(u16, String)]) -> Outcome<()>;
    fn abort_multipart_upload(&self, key: &str, upload_id: &str) -> Outcome<()>;
}
