//! Core domain models, webhook events and user persistence.
//!
//! Provides the typed identity-provider events, the user records derived
//! from them, the storage seam the ingress writes through, and the error
//! taxonomy shared by every Tether crate.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod events;
pub mod models;
pub mod storage;
pub mod time;

pub use error::{CoreError, Result, TetherError};
pub use events::{DeletedUserPayload, EmailAddress, EventEnvelope, UserEvent, UserPayload};
pub use models::{ExternalUserId, NewUser, User, UserId, UserUpdate};
pub use storage::{PostgresUserStore, UserStore};
pub use time::{Clock, RealClock, TestClock};
