//! Key naming under a namespace prefix.

use crate::VectorId;

/// Characters with special meaning in a Redis `MATCH` glob.
pub(crate) const GLOB_META: &[char] = &['*', '?', '[', ']', '\\'];

/// Backslash-escape every glob metacharacter in `literal`.
fn glob_escape(literal: &str) -> String {
    let mut out = String::with_capacity(literal.len());
    for c in literal.chars() {
        if GLOB_META.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Formats the store keys of one namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Keyspace {
    prefix: String,
}

impl Keyspace {
    /// The prefix must not contain `:`; [`LshConfig::validate`] enforces
    /// this for configured namespaces.
    ///
    /// [`LshConfig::validate`]: crate::LshConfig::validate
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// `{prefix}:band:{band}:{hash}`
    pub fn band_key(&self, band: usize, hash: u64) -> String {
        format!("{}:band:{band}:{hash}", self.prefix)
    }

    /// `{prefix}:vec:{id}`
    pub fn vector_key(&self, id: VectorId) -> String {
        format!("{}:vec:{id}", self.prefix)
    }

    /// `{prefix}:meta`
    pub fn meta_key(&self) -> String {
        format!("{}:meta", self.prefix)
    }

    /// Prefix shared by every key in the namespace, including the separator.
    pub fn namespace_prefix(&self) -> String {
        format!("{}:", self.prefix)
    }

    pub fn band_prefix(&self) -> String {
        format!("{}:band:", self.prefix)
    }

    pub fn vector_prefix(&self) -> String {
        format!("{}:vec:", self.prefix)
    }

    /// `MATCH` pattern for every key in the namespace. The prefix is
    /// matched literally.
    pub fn namespace_pattern(&self) -> String {
        format!("{}*", glob_escape(&self.namespace_prefix()))
    }

    /// `MATCH` pattern for every bucket key.
    pub fn band_pattern(&self) -> String {
        format!("{}*", glob_escape(&self.band_prefix()))
    }

    /// `MATCH` pattern for every payload key.
    pub fn vector_pattern(&self) -> String {
        format!("{}*", glob_escape(&self.vector_prefix()))
    }
}
