// SPDX-License-Identifier: Apache-2.0
//! intent-bridge: the read-only projection/binding layer UI adapters
//! consume (§4.5).
//!
//! A [`Bridge`] never mutates state directly — it forwards `dispatch` to
//! the [`intent_host::Host`] it wraps and re-broadcasts whatever snapshot
//! the host settles on to its subscribers. Disposing a bridge is terminal:
//! every operation after `dispose()` either fails with `DISPOSED` or
//! returns the bridge's "gone" value (`None`/no-op), and every live
//! subscription is torn down.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms, unused_must_use)]
#![warn(missing_docs, clippy::all, clippy::pedantic)]
#![allow(
    clippy::must_use_candidate,
    clippy::module_name_repetitions,
    clippy::missing_errors_doc
)]

/// The [`bridge::Bridge`] observer surface.
pub mod bridge;

pub use bridge::{Bridge, BridgeError, Subscription};
