//! Author/committer signature lines as they appear in a commit object:
//! `name <email> timestamp timezone`.

use std::fmt::Display;

use bincode::{Decode, Encode};
use bstr::ByteSlice;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::GitError;

/// Whether a signature line belongs to the author or committer of a commit.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Serialize, Deserialize, Decode, Encode)]
pub enum SignatureType {
    Author,
    Committer,
}

impl Display for SignatureType {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            SignatureType::Author => write!(f, "author"),
            SignatureType::Committer => write!(f, "committer"),
        }
    }
}

/// A parsed `name <email> timestamp timezone` line from a commit object.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize, Decode, Encode)]
pub struct Signature {
    pub signature_type: SignatureType,
    pub name: String,
    pub email: String,
    pub timestamp: i64,
    pub timezone: String,
}

impl Display for Signature {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "{} <{}> {} {}",
            self.name, self.email, self.timestamp, self.timezone
        )
    }
}

impl Signature {
    pub fn new(
        signature_type: SignatureType,
        name: String,
        email: String,
    ) -> Self {
        let now = Utc::now();
        Signature {
            signature_type,
            name,
            email,
            timestamp: now.timestamp(),
            timezone: "+0000".to_string(),
        }
    }

    /// Parses a single signature line, e.g.
    /// `author mega <admin@mega.org> 1700000000 +0800`.
    pub fn from_data(data: Vec<u8>) -> Result<Signature, GitError> {
        let text = data.to_str().map_err(|e| {
            GitError::InvalidSignatureType(format!("invalid utf8 in signature line: {e}"))
        })?;

        let type_end = text
            .find(' ')
            .ok_or_else(|| GitError::InvalidSignatureType(text.to_string()))?;
        let signature_type = match &text[..type_end] {
            "author" => SignatureType::Author,
            "committer" => SignatureType::Committer,
            other => {
                return Err(GitError::InvalidSignatureType(format!(
                    "unknown signature type `{other}`"
                )));
            }
        };

        let rest = &text[type_end + 1..];
        let email_start = rest
            .find('<')
            .ok_or_else(|| GitError::InvalidSignatureType(rest.to_string()))?;
        let email_end = rest
            .find('>')
            .ok_or_else(|| GitError::InvalidSignatureType(rest.to_string()))?;

        let name = rest[..email_start].trim().to_string();
        let email = rest[email_start + 1..email_end].trim().to_string();

        let tail = rest[email_end + 1..].trim();
        let mut tail_parts = tail.split_whitespace();
        let timestamp = tail_parts
            .next()
            .ok_or_else(|| GitError::InvalidSignatureType(tail.to_string()))?
            .parse::<i64>()
            .map_err(|e| GitError::InvalidSignatureType(e.to_string()))?;
        let timezone = tail_parts.next().unwrap_or("+0000").to_string();

        Ok(Signature {
            signature_type,
            name,
            email,
            timestamp,
            timezone,
        })
    }

    pub fn to_data(&self) -> Result<Vec<u8>, GitError> {
        Ok(format!(
            "{} {} <{}> {} {}",
            self.signature_type, self.name, self.email, self.timestamp, self.timezone
        )
        .into_bytes())
    }

    /// Conversion to a `chrono::DateTime<Utc>` for display and ordering.
    pub fn when(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.timestamp, 0).unwrap_or_else(Utc::now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_author_signature_round_trip() {
        let line = b"author benjamin.747 <benjamin.747@outlook.com> 1757467768 +0800".to_vec();
        let sig = Signature::from_data(line.clone()).unwrap();
        assert_eq!(sig.signature_type, SignatureType::Author);
        assert_eq!(sig.name, "benjamin.747");
        assert_eq!(sig.email, "benjamin.747@outlook.com");
        assert_eq!(sig.timestamp, 1757467768);
        assert_eq!(sig.timezone, "+0800");
        assert_eq!(sig.to_data().unwrap(), line);
    }

    #[test]
    fn test_committer_signature() {
        let line = b"committer jackie <jackie@example.com> 1700000000 -0500".to_vec();
        let sig = Signature::from_data(line).unwrap();
        assert_eq!(sig.signature_type, SignatureType::Committer);
        assert_eq!(sig.timezone, "-0500");
    }

    #[test]
    fn test_invalid_signature_type() {
        let line = b"tagger jackie <jackie@example.com> 1700000000 -0500".to_vec();
        assert!(Signature::from_data(line).is_err());
    }
}
