//! The authorization gate.
//!
//! Every privileged broker operation consults this one function before
//! doing anything, rather than scattering bitmask checks across call sites.

use crate::error::{BrokerError, BrokerResult};
use portlink_types::Rights;

/// Checks that `held` covers every bit of `required`.
///
/// Returns [`BrokerError::Unauthorized`] naming the missing bits otherwise.
pub fn authorize(held: Rights, required: Rights) -> BrokerResult<()> {
    if held.contains(required) {
        Ok(())
    } else {
        Err(BrokerError::Unauthorized {
            missing: required.without(held),
        })
    }
}
