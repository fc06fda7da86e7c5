//! Credentials file parser (spec §6 "Credentials file"), grounded on
//! `original_source/src/client/QSClientConfigure.cpp`'s line-based loader.

use std::collections::HashMap;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use log::warn;

#[derive(Debug, Clone)]
pub struct Credential {
    pub access_key_id: String,
    pub secret_access_key: String,
}

#[derive(Debug, Default)]
pub struct Credentials {
    pub default: Option<Credential>,
    pub per_bucket: HashMap<String, Credential>,
}

impl Credentials {
    pub fn for_bucket(&self, bucket: &str) -> Option<&Credential> {
        self.per_bucket.get(bucket).or(self.default.as_ref())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CredentialsError {
    #[error("failed to read credentials file {0}: {1}")]
    Read(std::path::PathBuf, std::io::Error),
    #[error("credentials file {0} must not be readable/writable by group or other, and must not be owner-executable")]
    BadPermissions(std::path::PathBuf),
    #[error("line {0}: malformed credentials entry: {1:?}")]
    MalformedLine(usize, String),
}

/// Owner rwx bits only; reject anything granting group/other access or
/// owner execute (spec §6: "File permissions must not include group or
/// other bits; owner execute bit forbidden").
fn has_unsafe_permissions(mode: u32) -> bool {
    let forbidden = libc::S_IRWXG | libc::S_IRWXO | libc::S_IXUSR;
    mode & forbidden != 0
}

pub fn load(path: &Path) -> Result<Credentials, CredentialsError> {
    let metadata = fs::metadata(path).map_err(|e| CredentialsError::Read(path.to_path_buf(), e))?;
    let mode = metadata.permissions().mode();
    if has_unsafe_permissions(mode) {
        return Err(CredentialsError::BadPermissions(path.to_path_buf()));
    }

    let contents = fs::read_to_string(path).map_err(|e| CredentialsError::Read(path.to_path_buf(), e))?;
    parse(&contents)
}

fn parse(contents: &str) -> Result<Credentials, CredentialsError> {
    let mut credentials = Credentials::default();

    for (idx, raw_line) in contents.lines().enumerate() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if line.starts_with('[') || line.chars().any(|c| c.is_whitespace()) || !line.contains(':') {
            return Err(CredentialsError::MalformedLine(idx + 1, raw_line.to_string()));
        }

        let fields: Vec<&str> = line.split(':').collect();
        match fields.as_slice() {
            [key_id, secret] => {
                let credential = Credential { access_key_id: key_id.to_string(), secret_access_key: secret.to_string() };
                if credentials.default.is_some() {
                    warn!("line {}: duplicate default credential ignored", idx + 1);
                } else {
                    credentials.default = Some(credential);
                }
            }
            [bucket, key_id, secret] => {
                let credential = Credential { access_key_id: key_id.to_string(), secret_access_key: secret.to_string() };
                credentials.per_bucket.insert(bucket.to_string(), credential);
            }
            _ => return Err(CredentialsError::MalformedLine(idx + 1, raw_line.to_string())),
        }
    }

    Ok(credentials)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_default_and_per_bucket_lines() {
        let text = "# comment\n\nAKID:SECRET\nbucket2:AKID2:SECRET2\n";
        let credentials = parse(text).unwrap();
        assert_eq!(credentials.default.unwrap().access_key_id, "AKID");
        assert_eq!(credentials.per_bucket["bucket2"].access_key_id, "AKID2");
    }

    #[test]
    fn second_default_line_is_ignored_not_an_error() {
        let text = "AKID:SECRET\nAKID2:SECRET2\n";
        let credentials = parse(text).unwrap();
        assert_eq!(credentials.default.unwrap().access_key_id, "AKID");
    }

    #[test]
    fn rejects_lines_without_colon() {
        let err = parse("not-a-credential-line\n").unwrap_err();
        assert!(matches!(err, CredentialsError::MalformedLine(1, _)));
    }

    #[test]
    fn rejects_lines_with_whitespace() {
        let err = parse("AKID: SECRET\n").unwrap_err();
        assert!(matches!(err, CredentialsError::MalformedLine(1, _)));
    }

    #[test]
    fn for_bucket_falls_back_to_default() {
        let mut credentials = Credentials::default();
        credentials.default = Some(Credential { access_key_id: "D".into(), secret_access_key: "d".into() });
        assert_eq!(credentials.for_bucket("anything").unwrap().access_key_id, "D");
    }
}
