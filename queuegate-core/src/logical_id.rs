//! Logical id allocation
//!
//! Every declared resource lives at a path such as `Queue/Resource`. The
//! logical id is a readable rendering of that path followed by the first
//! eight hex digits of its MD5, so two paths never collide and the same path
//! always maps to the same id.

use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};

/// Path component hidden from both the readable part and the hash
const HIDDEN_ID: &str = "Default";
/// Path component hidden from the readable part only
const HIDDEN_FROM_HUMAN_ID: &str = "Resource";
const MAX_ID_LEN: usize = 255;
const HASH_LEN: usize = 8;

/// Key of a resource or output in the template
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LogicalId(String);

impl LogicalId {
    /// Use `id` verbatim. The caller is responsible for it being alphanumeric.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Allocate an id for a construct path
    pub fn from_path(components: &[&str]) -> Self {
        let components: Vec<&str> = components
            .iter()
            .copied()
            .filter(|c| *c != HIDDEN_ID)
            .collect();

        if components.len() == 1 {
            let candidate = remove_non_alphanumeric(components[0]);
            if candidate.len() <= MAX_ID_LEN {
                return Self(candidate);
            }
        }

        let hash = path_hash(&components);
        let human: String = remove_dupes(&components)
            .into_iter()
            .filter(|c| *c != HIDDEN_FROM_HUMAN_ID)
            .map(remove_non_alphanumeric)
            .collect();
        let human: String = human.chars().take(MAX_ID_LEN - HASH_LEN).collect();

        Self(format!("{human}{hash}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for LogicalId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for LogicalId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Uppercase hex prefix of the MD5 of `data`
pub fn short_hash(data: &[u8]) -> String {
    let digest = Md5::digest(data);
    hex::encode_upper(digest)[..HASH_LEN].to_string()
}

fn path_hash(components: &[&str]) -> String {
    short_hash(components.join("/").as_bytes())
}

fn remove_non_alphanumeric(s: &str) -> String {
    s.chars().filter(char::is_ascii_alphanumeric).collect()
}

/// Drop components that repeat the previous one (`Api/Api/Resource` reads as `Api`)
fn remove_dupes<'a>(components: &[&'a str]) -> Vec<&'a str> {
    let mut out: Vec<&str> = Vec::with_capacity(components.len());
    for &component in components {
        if out.last() != Some(&component) {
            out.push(component);
        }
    }
    out
}
