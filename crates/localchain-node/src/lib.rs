//! A localchain participant: the session actor, its peer transport and the
//! HTTP query surface.

pub mod api;
pub mod config;
mod constants;
pub mod peer;
pub mod runtime;
pub mod session;

use rand::distributions::Alphanumeric;
use rand::Rng;

pub use runtime::Handle;
pub use session::{Session, SessionError};

/// Random tag identifying this process on the peer network.
pub fn generate_node_id<R: Rng>(rng: &mut R) -> String {
    rng.sample_iter(&Alphanumeric)
        .take(constants::NODE_ID_LEN)
        .map(char::from)
        .collect()
}
