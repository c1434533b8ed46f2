use std::path::Path;

use anyhow::Context;
use sha2::{Digest, Sha256};

const PREFIX: &str = "sha256:";

/// Fingerprint of a source specification, `sha256:<hex>`
pub fn spec_checksum(bytes: &[u8]) -> String {
    format!("{PREFIX}{:x}", Sha256::digest(bytes))
}

pub fn checksum_file(path: &Path) -> anyhow::Result<String> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to read specification {}", path.display()))?;
    Ok(spec_checksum(&bytes))
}

/// Compare two checksums, tolerating a missing prefix and hex case.
pub fn checksums_match(expected: &str, actual: &str) -> bool {
    normalize(expected) == normalize(actual)
}

fn normalize(checksum: &str) -> String {
    let trimmed = checksum.trim();
    trimmed
        .strip_prefix(PREFIX)
        .unwrap_or(trimmed)
        .to_ascii_lowercase()
}
