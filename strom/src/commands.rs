//! Method names shared by both protocol sides

/// Command name that starts the initialization handshake.
pub(crate) const INITIALIZE: &str = "initialize";

/// Command name for liveness checks; valid in both directions.
pub(crate) const PING: &str = "ping";
