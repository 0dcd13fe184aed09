use sha2::{Digest, Sha256};

/// Hex SHA-256 of a part payload.
pub fn fingerprint(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Fingerprint of a composed object: hash over the ordered part
/// fingerprints, suffixed with the part count (S3 multipart ETag style).
pub fn composite_fingerprint<'a, I>(part_fingerprints: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let mut hasher = Sha256::new();
    let mut count = 0usize;
    for fp in part_fingerprints {
        hasher.update(fp.as_bytes());
        count += 1;
    }
    format!("{}-{}", hex::encode(hasher.finalize()), count)
}
