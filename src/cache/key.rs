//! Cache key generation.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Request fingerprint used as the cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    pub hash: String,
    pub multimodal: bool,
}

impl CacheKey {
    pub fn new(hash: impl Into<String>) -> Self {
        Self {
            hash: hash.into(),
            multimodal: false,
        }
    }
    pub fn as_str(&self) -> &str {
        &self.hash
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.hash)
    }
}

impl From<&str> for CacheKey {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}
impl From<String> for CacheKey {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// Lowercase hex SHA-256 of `bytes`.
pub fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex_digest(hasher)
}

fn hex_digest(hasher: Sha256) -> String {
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

/// Trim and collapse interior whitespace runs to a single space.
///
/// Semantically identical prompts that differ only in spacing hash to the
/// same key after this.
pub fn normalize_prompt(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Derives [`CacheKey`]s from normalized prompt text and an optional
/// auxiliary payload such as an image.
#[derive(Debug, Clone, Default)]
pub struct CacheKeyGenerator {
    salt: Option<String>,
}

impl CacheKeyGenerator {
    pub fn new() -> Self {
        Self { salt: None }
    }
    pub fn with_salt(mut self, salt: impl Into<String>) -> Self {
        self.salt = Some(salt.into());
        self
    }

    /// `text:<sha256(text)>` for text-only requests,
    /// `multimodal:<sha256(text)>:<sha256(aux)>` when an auxiliary payload is
    /// present. An empty payload counts as absent.
    pub fn generate(&self, primary_text: &str, auxiliary: Option<&[u8]>) -> CacheKey {
        let mut hasher = Sha256::new();
        if let Some(ref s) = self.salt {
            hasher.update(s.as_bytes());
            hasher.update([0u8]);
        }
        hasher.update(primary_text.as_bytes());
        let text_hash = hex_digest(hasher);

        match auxiliary.filter(|a| !a.is_empty()) {
            Some(aux) => CacheKey {
                hash: format!("multimodal:{}:{}", text_hash, hash_bytes(aux)),
                multimodal: true,
            },
            None => CacheKey {
                hash: format!("text:{}", text_hash),
                multimodal: false,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_key_is_deterministic() {
        let gen = CacheKeyGenerator::new();
        let a = gen.generate("boil pasta for two", None);
        let b = gen.generate("boil pasta for two", None);
        assert_eq!(a, b);
        assert!(a.as_str().starts_with("text:"));
        assert_eq!(a.as_str().len(), "text:".len() + 64);
        assert!(!a.multimodal);
    }

    #[test]
    fn test_auxiliary_payload_changes_key() {
        let gen = CacheKeyGenerator::new();
        let plain = gen.generate("what is in this fridge", None);
        let img1 = gen.generate("what is in this fridge", Some(&b"image-one"[..]));
        let img2 = gen.generate("what is in this fridge", Some(&b"image-two"[..]));
        assert_ne!(plain, img1);
        assert_ne!(img1, img2);
        assert!(img1.multimodal);
        assert!(img1.as_str().starts_with("multimodal:"));
    }

    #[test]
    fn test_empty_auxiliary_counts_as_absent() {
        let gen = CacheKeyGenerator::new();
        assert_eq!(gen.generate("soup", Some(&b""[..])), gen.generate("soup", None));
    }

    #[test]
    fn test_salt_namespaces_keys() {
        let plain = CacheKeyGenerator::new().generate("soup", None);
        let salted = CacheKeyGenerator::new().with_salt("tenant-a").generate("soup", None);
        assert_ne!(plain, salted);
    }

    #[test]
    fn test_normalize_prompt() {
        assert_eq!(normalize_prompt("  two   eggs\n and\ttoast "), "two eggs and toast");
        let gen = CacheKeyGenerator::new();
        assert_eq!(
            gen.generate(&normalize_prompt("a  b"), None),
            gen.generate(&normalize_prompt(" a b\n"), None)
        );
    }

    #[test]
    fn test_hash_bytes_known_value() {
        assert_eq!(
            hash_bytes(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
