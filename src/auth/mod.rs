//! # Auth Module
//!
//! Session emulation over a profiles table: password hashing, opaque
//! access tokens and a local store for the signed-in session.

pub mod crypto;
pub mod local_store;
pub mod session;

pub use local_store::{FileStore, LocalStore, MemoryStore};
pub use session::{Credentials, Session, SessionOptions, SessionStore};
