//! hush_session - peer directory, frame transport, and the session driver
//!
//! # Modules
//! - `directory` - validated peer table fed by relay snapshots and hellos
//! - `transport` - `FrameSink` / `FrameSource` plus TCP and in-memory pipes
//! - `session`   - outbound signing and inbound verify/replay/decrypt pipeline
//! - `config`    - `ClientSettings` loaded from JSON

pub mod config;
pub mod directory;
pub mod error;
pub mod session;
pub mod transport;

pub use config::ClientSettings;
pub use directory::{DirectoryEntryError, PeerDirectory, PublicIdentity};
pub use error::{Result, SessionError};
pub use session::{Session, SessionEvent};
pub use transport::{connect_tcp, memory_pipe, FrameSink, FrameSource};

#[cfg(test)]
pub(crate) mod test_support {
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex, OnceLock};

    use hush_crypto::Identity;

    pub fn identity(name: &str) -> Arc<Identity> {
        static CACHE: OnceLock<Mutex<HashMap<String, Arc<Identity>>>> = OnceLock::new();
        let mut cache = CACHE.get_or_init(Default::default).lock().unwrap();
        cache
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Identity::generate(name).unwrap()))
            .clone()
    }
}
