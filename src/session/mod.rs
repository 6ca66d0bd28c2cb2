//! Signed, opaque session tokens multiplexing identity, one-shot flash
//! messages, and form-replay state over a single KV record.

mod manager;
mod record;

pub use manager::{
    BOT_TTL_SECS, LOGGED_IN_TTL_SECS, LOGGED_OUT_TTL_SECS, Session, SessionManager, TtlPolicy,
};
pub use record::{Flash, FlashKind, FormReplay, UserRef};
