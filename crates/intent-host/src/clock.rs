// SPDX-License-Identifier: Apache-2.0
//! The host's sole source of non-determinism: a real wall clock, captured
//! once per job into a frozen [`intent_core::EvalClock`] (CTX-1…5).
//!
//! Nothing downstream of [`FrozenContext`] ever reads [`std::time::SystemTime`]
//! or generates randomness directly — the pure core only ever sees the
//! frozen value a job's [`crate::host::Host`] built for it.

use std::time::{SystemTime, UNIX_EPOCH};

use intent_core::value::{Object, Value};
use intent_core::EvalClock;

/// Supplies wall-clock milliseconds. Injected so tests can pin `now` instead
/// of racing the real clock; production hosts use [`SystemClock`].
pub trait HostClock: Send + Sync {
    /// Milliseconds since the Unix epoch.
    fn now_millis(&self) -> i64;
}

/// The real wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl HostClock for SystemClock {
    fn now_millis(&self) -> i64 {
        #[allow(clippy::cast_possible_wrap)]
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0);
        millis
    }
}

/// A fixed clock for deterministic tests and replay fixtures.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub i64);

impl HostClock for FixedClock {
    fn now_millis(&self) -> i64 {
        self.0
    }
}

/// Derives a deterministic `randomSeed` from an intent id (§9 "Ambient
/// time/random"). The host is the sole source of randomness; this function
/// makes that source a pure hash rather than an RNG, so replaying the same
/// intent id always derives the same seed.
#[must_use]
pub fn derive_random_seed(intent_id: &str) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(b"intent-host:random-seed:v1");
    hasher.update(intent_id.as_bytes());
    hex::encode(hasher.finalize().as_bytes())
}

/// Per-job frozen `{now, randomSeed, env}` bundle (CTX-1…5). Built once at
/// the start of a job and passed to every Core call within that job; a
/// single job MUST see a single value, but consecutive jobs for the same
/// intent MAY see different ones.
#[derive(Debug, Clone)]
pub struct FrozenContext {
    /// The evaluator-facing clock (`now` + `randomSeed`).
    pub clock: EvalClock,
    /// Host-injected environment values, addressable by effect handlers
    /// (not by the pure core, which never reads `env` directly).
    pub env: Object,
}

impl FrozenContext {
    /// Freezes `now`/`randomSeed` for a job driven by `intent_id`.
    #[must_use]
    pub fn capture(clock: &dyn HostClock, intent_id: &str, env: Object) -> Self {
        Self {
            clock: EvalClock::new(clock.now_millis(), derive_random_seed(intent_id)),
            env,
        }
    }

    /// Renders `env` as a `Value`, for effect handlers that want it as a
    /// plain value rather than an `Object`.
    #[must_use]
    pub fn env_value(&self) -> Value {
        Value::Object(self.env.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_seed_is_stable_for_fixed_intent_id() {
        assert_eq!(derive_random_seed("intent-1"), derive_random_seed("intent-1"));
        assert_ne!(derive_random_seed("intent-1"), derive_random_seed("intent-2"));
    }

    #[test]
    fn fixed_clock_returns_pinned_value() {
        let clock = FixedClock(42);
        assert_eq!(clock.now_millis(), 42);
    }
}
