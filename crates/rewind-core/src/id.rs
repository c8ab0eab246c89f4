//! Compact object identities and the live identity registry.

use std::fmt;
use std::io::{Read, Write};

use indexmap::IndexSet;
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, trace};

use crate::codec::{read_i16_le, write_i16_le};
use crate::error::{CodecError, IdentityError};

/// Maximum number of random draws [`IdentityRegistry::register`] makes
/// before giving up.
pub const MAX_GENERATE_ATTEMPTS: u32 = 64;

/// Identifies one recorded object across snapshots.
///
/// A 16-bit signed value; `0` is the [`UNASSIGNED`](Self::UNASSIGNED)
/// sentinel. Uniqueness is only guaranteed among identities currently
/// held by one [`IdentityRegistry`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectIdentity(pub i16);

impl ObjectIdentity {
    /// The "not yet assigned" sentinel.
    pub const UNASSIGNED: ObjectIdentity = ObjectIdentity(0);

    /// Whether this identity holds a real value.
    pub fn is_assigned(self) -> bool {
        self != Self::UNASSIGNED
    }

    /// Encode as a little-endian i16.
    pub fn encode(self, w: &mut dyn Write) -> Result<(), CodecError> {
        write_i16_le(w, self.0)
    }

    /// Decode an identity written by [`encode`](Self::encode).
    pub fn decode(r: &mut dyn Read) -> Result<Self, CodecError> {
        Ok(Self(read_i16_le(r)?))
    }
}

impl fmt::Display for ObjectIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i16> for ObjectIdentity {
    fn from(v: i16) -> Self {
        Self(v)
    }
}

/// Set of identities currently held by live objects.
///
/// Owned by a session and passed by reference to whatever needs to
/// register or release identities. Mutated from the simulation thread
/// only; the storage worker never sees it.
pub struct IdentityRegistry {
    live: IndexSet<ObjectIdentity>,
    rng: ChaCha8Rng,
    max_attempts: u32,
}

impl IdentityRegistry {
    /// Create a registry seeded from OS entropy.
    pub fn new() -> Self {
        Self::with_rng(ChaCha8Rng::from_entropy())
    }

    /// Create a registry whose generated identities are reproducible.
    pub fn with_seed(seed: u64) -> Self {
        Self::with_rng(ChaCha8Rng::seed_from_u64(seed))
    }

    fn with_rng(rng: ChaCha8Rng) -> Self {
        Self {
            live: IndexSet::new(),
            rng,
            max_attempts: MAX_GENERATE_ATTEMPTS,
        }
    }

    /// Override the retry budget used when generating identities.
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Register an identity and return the value actually held.
    ///
    /// `requested` is kept if it is assigned and not already live.
    /// Otherwise a fresh value is drawn uniformly at random (never the
    /// sentinel) until an unused one turns up.
    ///
    /// # Errors
    ///
    /// [`IdentityError::Exhausted`] if no unused value was drawn within
    /// the retry budget. Nothing is registered in that case.
    pub fn register(
        &mut self,
        requested: ObjectIdentity,
    ) -> Result<ObjectIdentity, IdentityError> {
        if requested.is_assigned() && !self.live.contains(&requested) {
            self.live.insert(requested);
            return Ok(requested);
        }

        for _ in 0..self.max_attempts {
            let candidate = ObjectIdentity(self.draw());
            if !self.live.contains(&candidate) {
                self.live.insert(candidate);
                trace!(requested = %requested, assigned = %candidate, "generated object identity");
                return Ok(candidate);
            }
        }

        debug!(
            live = self.live.len(),
            attempts = self.max_attempts,
            "object identity generation exhausted"
        );
        Err(IdentityError::Exhausted {
            attempts: self.max_attempts,
        })
    }

    /// Register exactly `identity`, without falling back to a generated
    /// value. Used when a recorded object is recreated during playback
    /// and must keep the identity stored in the replay.
    ///
    /// # Errors
    ///
    /// [`IdentityError::AlreadyRegistered`] if another live object holds
    /// it. The unassigned sentinel is treated the same as [`register`]
    /// and receives a generated value.
    ///
    /// [`register`]: Self::register
    pub fn reserve(
        &mut self,
        identity: ObjectIdentity,
    ) -> Result<ObjectIdentity, IdentityError> {
        if !identity.is_assigned() {
            return self.register(identity);
        }
        if !self.live.insert(identity) {
            return Err(IdentityError::AlreadyRegistered {
                identity: identity.0,
            });
        }
        Ok(identity)
    }

    /// Release an identity. No-op if it is not registered.
    pub fn unregister(&mut self, identity: ObjectIdentity) {
        self.live.shift_remove(&identity);
    }

    /// Whether `identity` is currently held.
    pub fn is_registered(&self, identity: ObjectIdentity) -> bool {
        self.live.contains(&identity)
    }

    /// Number of live identities.
    pub fn len(&self) -> usize {
        self.live.len()
    }

    /// Whether no identities are live.
    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    /// Release every identity.
    pub fn clear(&mut self) {
        self.live.clear();
    }

    fn draw(&mut self) -> i16 {
        // Uniform over every i16 except 0.
        let v: i32 = self.rng.gen_range(i16::MIN as i32..i16::MAX as i32);
        if v >= 0 {
            (v + 1) as i16
        } else {
            v as i16
        }
    }
}

impl Default for IdentityRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for IdentityRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityRegistry")
            .field("live", &self.live.len())
            .field("max_attempts", &self.max_attempts)
            .finish()
    }
}
