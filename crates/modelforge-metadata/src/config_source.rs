//! Configuration-source lattice.
//!
//! Every mutable facet of the schema graph is stamped with the source that last
//! wrote it. A write may replace an existing value only when its source is at
//! least as authoritative as the stamp:
//!
//! ```text
//! Convention  <  DataAnnotation  <  Explicit
//! ```
//!
//! Ties are allowed, so re-affirming a value at the same (or a higher) source
//! succeeds and raises the stamp. A strictly lower source is a soft rejection:
//! nothing changes and the caller is told so, but nothing fails.

use serde::{Deserialize, Serialize};

/// Provenance of a configured value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigurationSource {
    /// Inferred by a convention.
    Convention,
    /// Supplied by a declarative marker on the host type.
    DataAnnotation,
    /// Configured explicitly by the caller.
    Explicit,
}

impl ConfigurationSource {
    /// `true` when a write at `self` may replace a value stamped `existing`.
    pub fn overrides(self, existing: Option<ConfigurationSource>) -> bool {
        can_set(existing, self)
    }

    /// `true` when `self` is strictly more authoritative than `existing`.
    pub fn overrides_strictly(self, existing: Option<ConfigurationSource>) -> bool {
        existing.map_or(true, |existing| self > existing)
    }

    /// The more authoritative of `self` and `other`.
    pub fn max(self, other: Option<ConfigurationSource>) -> ConfigurationSource {
        other.map_or(self, |other| std::cmp::max(self, other))
    }
}

impl std::fmt::Display for ConfigurationSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Convention => "convention",
            Self::DataAnnotation => "data annotation",
            Self::Explicit => "explicit",
        };
        f.write_str(name)
    }
}

/// `true` iff `candidate` may overwrite a facet last written at `existing`.
pub fn can_set(existing: Option<ConfigurationSource>, candidate: ConfigurationSource) -> bool {
    existing.map_or(true, |existing| candidate >= existing)
}

/// The more authoritative of two optional stamps.
pub fn max_source(
    a: Option<ConfigurationSource>,
    b: Option<ConfigurationSource>,
) -> Option<ConfigurationSource> {
    match (a, b) {
        (Some(a), Some(b)) => Some(std::cmp::max(a, b)),
        (a, None) => a,
        (None, b) => b,
    }
}

// ============================================================================
// Facet
// ============================================================================

/// Outcome of [`Facet::try_set`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FacetWrite<T> {
    /// The write lost on precedence; nothing changed.
    Rejected,
    /// The value was already equal; only the stamp may have been raised.
    Unchanged,
    /// The value changed; carries the previous value.
    Changed(T),
}

impl<T> FacetWrite<T> {
    pub fn applied(&self) -> bool {
        !matches!(self, Self::Rejected)
    }

    pub fn changed(&self) -> bool {
        matches!(self, Self::Changed(_))
    }
}

/// A value together with the source that last configured it.
///
/// A facet starts with a default value and no stamp; the stamp only ever
/// increases.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Facet<T> {
    value: T,
    source: Option<ConfigurationSource>,
}

impl<T: Default> Default for Facet<T> {
    fn default() -> Self {
        Self::unset(T::default())
    }
}

impl<T> Facet<T> {
    /// A facet holding `value` that no source has configured yet.
    pub fn unset(value: T) -> Self {
        Self {
            value,
            source: None,
        }
    }

    pub fn with_source(value: T, source: ConfigurationSource) -> Self {
        Self {
            value,
            source: Some(source),
        }
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn source(&self) -> Option<ConfigurationSource> {
        self.source
    }

    pub fn can_set(&self, source: ConfigurationSource) -> bool {
        can_set(self.source, source)
    }

    /// Raise the stamp without touching the value.
    pub fn promote(&mut self, source: ConfigurationSource) {
        self.source = Some(source.max(self.source));
    }
}

impl<T: PartialEq> Facet<T> {
    /// Attempt to write `value` at `source`.
    pub fn try_set(&mut self, value: T, source: ConfigurationSource) -> FacetWrite<T> {
        if !self.can_set(source) {
            return FacetWrite::Rejected;
        }
        self.promote(source);
        if self.value == value {
            return FacetWrite::Unchanged;
        }
        FacetWrite::Changed(std::mem::replace(&mut self.value, value))
    }

    /// Reset the value without a stamp (used when an owning element drops
    /// the configuration, e.g. a cascade).
    pub(crate) fn reset(&mut self, value: T) -> Option<T> {
        self.source = None;
        if self.value == value {
            return None;
        }
        Some(std::mem::replace(&mut self.value, value))
    }
}

impl<T: Copy> Facet<T> {
    pub fn get(&self) -> T {
        self.value
    }
}
