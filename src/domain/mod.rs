mod certificate;
mod hasher;

pub use certificate::{search, CertificateRecord, IssueMetadata};
pub use hasher::{digest, ContentHash, HashFormatError, HASH_HEX_LEN};
