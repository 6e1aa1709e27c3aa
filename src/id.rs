//! Random element identifiers and the registries that keep them unique.
//!
//! Identifiers are drawn from `[A-Za-z0-9]`. The process-wide registry
//! remembers every identifier it has ever issued and never forgets one, so
//! its memory use grows for the lifetime of the process. Groups that only
//! need identifiers to be unique among their own members can use a scoped
//! registry instead (see [`IdScope`]).

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use arcstr::ArcStr;
use once_cell::sync::Lazy;
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default identifier length.
pub const DEFAULT_ID_LEN: usize = 7;

/// Number of symbols an identifier character is drawn from.
pub const ALPHABET_LEN: u64 = 62;

static GLOBAL: Lazy<Mutex<IdRegistry>> = Lazy::new(Default::default);

/// A unique element identifier.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ElementId(ArcStr);

impl ElementId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ElementId({})", self.0)
    }
}

impl AsRef<str> for ElementId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Where a group draws its element identifiers from.
#[derive(Copy, Clone, Debug, Default, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdScope {
    /// Unique across the whole process.
    #[default]
    Global,
    /// Unique among identifiers issued to one group.
    Scoped,
}

/// A set of issued identifiers.
#[derive(Debug, Default)]
pub struct IdRegistry {
    issued: HashSet<ArcStr>,
    per_len: HashMap<usize, u64>,
}

impl IdRegistry {
    /// Creates a new, empty registry.
    pub fn new() -> Self {
        Default::default()
    }

    /// Number of identifiers issued so far.
    pub fn len(&self) -> usize {
        self.issued.len()
    }

    pub fn is_empty(&self) -> bool {
        self.issued.is_empty()
    }

    /// Returns `true` if `id` was issued by this registry.
    pub fn contains(&self, id: &str) -> bool {
        self.issued.contains(id)
    }

    /// Issues a new identifier of `len` characters using the thread-local RNG.
    pub fn issue(&mut self, len: usize) -> Result<ElementId> {
        self.issue_with(len, &mut rand::thread_rng())
    }

    /// Issues a new identifier of `len` characters, redrawing until it does
    /// not collide with one issued before.
    pub fn issue_with<R: Rng + ?Sized>(&mut self, len: usize, rng: &mut R) -> Result<ElementId> {
        if len == 0 {
            return Err(Error::InvalidIdLength);
        }
        let issued = self.per_len.get(&len).copied().unwrap_or(0);
        // `None` means the space is larger than any registry could hold.
        if let Some(space) = u32::try_from(len)
            .ok()
            .and_then(|len| ALPHABET_LEN.checked_pow(len))
        {
            if issued >= space {
                return Err(Error::IdSpaceExhausted { length: len });
            }
        }

        let mut collisions = 0usize;
        let id = loop {
            let candidate = (0..len)
                .map(|_| char::from(rng.sample(Alphanumeric)))
                .collect::<String>();
            if !self.issued.contains(candidate.as_str()) {
                break ArcStr::from(candidate);
            }
            collisions += 1;
        };
        if collisions > 0 {
            tracing::trace!(%id, collisions, "redrew colliding identifier");
        }

        self.issued.insert(id.clone());
        *self.per_len.entry(len).or_default() += 1;
        Ok(ElementId(id))
    }
}

fn global() -> MutexGuard<'static, IdRegistry> {
    // The registry is only ever extended, so a poisoned lock still guards a
    // consistent set.
    GLOBAL.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Generates an identifier unique across the process.
pub fn generate_id(len: usize) -> Result<ElementId> {
    global().issue(len)
}

/// Number of identifiers issued by the process-wide registry.
pub fn issued_count() -> usize {
    global().len()
}

/// The identifier source owned by a group.
#[derive(Debug)]
pub(crate) enum Ids {
    Global,
    Scoped(IdRegistry),
}

impl Ids {
    pub(crate) fn new(scope: IdScope) -> Self {
        match scope {
            IdScope::Global => Ids::Global,
            IdScope::Scoped => Ids::Scoped(IdRegistry::new()),
        }
    }

    pub(crate) fn issue(&mut self, len: usize) -> Result<ElementId> {
        match self {
            Ids::Global => generate_id(len),
            Ids::Scoped(registry) => registry.issue(len),
        }
    }
}
