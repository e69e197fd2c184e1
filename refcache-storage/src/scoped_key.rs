//! Scope-prefixed binary keys for the LMDB store.
//!
//! A `ScopedKey` can only be built from a `ScopeId` and a `ReferenceKey`, so
//! every LMDB read or write names its scope explicitly.

use refcache_core::{ReferenceKey, ScopeId};

/// Separator between the scope and the identifier.
///
/// 0xFF never occurs in UTF-8, so a scope's prefix can never be a prefix of
/// another scope's keys.
const SEPARATOR: u8 = 0xFF;

/// An LMDB key scoped to a single tenant.
///
/// # Binary Format
///
/// `[scope bytes][0xFF][key bytes]`
///
/// Keys sort by scope first, so one scope's entries are contiguous.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScopedKey {
    inner: ScopedKeyInner,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ScopedKeyInner {
    scope: ScopeId,
    key: ReferenceKey,
}

impl ScopedKey {
    pub fn new(scope: &ScopeId, key: &ReferenceKey) -> Self {
        Self {
            inner: ScopedKeyInner {
                scope: scope.clone(),
                key: key.clone(),
            },
        }
    }

    pub fn scope(&self) -> &ScopeId {
        &self.inner.scope
    }

    pub fn key(&self) -> &ReferenceKey {
        &self.inner.key
    }

    pub fn encode(&self) -> Vec<u8> {
        let scope = self.inner.scope.as_str().as_bytes();
        let key = self.inner.key.as_str().as_bytes();
        let mut bytes = Vec::with_capacity(scope.len() + 1 + key.len());
        bytes.extend_from_slice(scope);
        bytes.push(SEPARATOR);
        bytes.extend_from_slice(key);
        bytes
    }

    /// Prefix shared by every key in `scope`.
    pub fn scope_prefix(scope: &ScopeId) -> Vec<u8> {
        let scope = scope.as_str().as_bytes();
        let mut bytes = Vec::with_capacity(scope.len() + 1);
        bytes.extend_from_slice(scope);
        bytes.push(SEPARATOR);
        bytes
    }

    /// Decode bytes produced by [`ScopedKey::encode`].
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        let split = bytes.iter().position(|b| *b == SEPARATOR)?;
        let scope = std::str::from_utf8(&bytes[..split]).ok()?;
        let key = std::str::from_utf8(&bytes[split + 1..]).ok()?;
        Some(Self {
            inner: ScopedKeyInner {
                scope: ScopeId::new(scope).ok()?,
                key: ReferenceKey::parse(key).ok()?,
            },
        })
    }
}
