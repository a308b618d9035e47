//! The palaver message-processing engine.
//!
//! One top-level request follows a **generate → act → observe** cycle:
//!
//! 1. **Load** the conversation (or start one) and append the user turn
//! 2. **Build the window** — the last N completed interactions, always
//!    opening on a user or tool turn
//! 3. **Call the model** via the configured provider
//! 4. **If tool calls**: execute them concurrently, append results, loop
//!    back to step 3 over the full updated history
//! 5. **If a plain reply**: persist the conversation once and return it
//!
//! The loop ends when the model answers without requesting tools, the
//! provider fails, or the configured round limit is hit. `process` returns
//! the final reply as one value; `process_stream` forwards every fragment
//! as it happens over the same cycle.

pub mod agent_profile;
pub mod config;
pub mod event;
pub mod processor;
pub mod session_lock;
pub mod stream;

pub use agent_profile::AgentProfile;
pub use config::{EngineConfig, ProcessOptions};
pub use event::StreamEvent;
pub use processor::{MessageProcessor, ProcessRequest};
pub use session_lock::SessionLocks;
