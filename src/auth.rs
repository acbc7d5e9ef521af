use std::collections::HashMap;
use std::io;
use std::path::Path;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use sha1::{Digest, Sha1};

/// Credentials loaded from an Apache-htpasswd-style file: one
/// `user:credential` line per user. `{SHA}` credentials hold the base64 of
/// the password's SHA-1 digest; credentials without a recognised scheme
/// prefix are compared as plaintext. The file is read once at startup.
pub struct HtpasswdFile {
    users: HashMap<String, String>,
}

impl HtpasswdFile {
    pub fn load(path: impl AsRef<Path>) -> io::Result<HtpasswdFile> {
        let contents = std::fs::read_to_string(path)?;
        Ok(Self::parse(&contents))
    }

    fn parse(contents: &str) -> HtpasswdFile {
        let users = contents
            .lines()
            .filter_map(|line| {
                let line = line.trim();
                if line.is_empty() || line.starts_with('#') {
                    return None;
                }
                let (user, credential) = line.split_once(':')?;
                Some((user.to_string(), credential.to_string()))
            })
            .collect();
        HtpasswdFile { users }
    }

    pub fn validate(&self, user: &str, password: &str) -> bool {
        let Some(credential) = self.users.get(user) else {
            return false;
        };
        match credential.strip_prefix("{SHA}") {
            Some(digest) => BASE64.encode(Sha1::digest(password.as_bytes())) == digest,
            None => credential == password,
        }
    }
}
