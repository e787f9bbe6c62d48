//! Session lifecycle: the single paired identity and its live connection.
//!
//! ```text
//! Uninitialized --init--------------------------> Unpaired | Connected
//! Unpaired      --connect-----------------------> Pairing  | Connected (restored)
//! Pairing       --success-----------------------> Connected
//! Pairing       --timeout / closed--------------> Unpaired
//! Connected     --disconnect--> Disconnecting --> Unpaired
//! any           --reset-------> Resetting ------> Unpaired
//! any           --wipe--------> Resetting ------> Uninitialized
//! ```

mod controller;
mod holder;
mod pairing;
mod state;

pub use controller::{ConnectOutcome, LifecycleConfig, LifecycleController};
pub use holder::{SessionHolder, SessionStatus};
pub use pairing::{PairingEvent, PairingStream};
pub use state::ConnectionState;
