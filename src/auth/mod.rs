//! Authentication and authorization.
//!
//! # Data Flow
//! ```text
//! Authorization: Bearer <token>
//!     → authenticator.rs (shape check, SHA-256 lookup, scope + expiry)
//!     → RequestContext { principal } in request extensions
//!     → extract.rs (Authenticated / Activated / Permitted<P>)
//!     → gate.rs (layered checks, fresh permission lookup)
//!     → handler
//! ```
//!
//! # Design Decisions
//! - `Principal` is an enum; anonymity is checked by the type, not by a
//!   sentinel value
//! - Token plaintexts are only ever held in memory long enough to hash them
//! - Passwords are stored as Argon2id hashes and compared by the hasher
//! - Unknown, expired and wrong-scope tokens are indistinguishable to clients
//! - Backend failures during auth are internal errors, never auth failures

pub mod authenticator;
pub mod extract;
pub mod gate;
pub mod password;
pub mod principal;
pub mod token;

pub use authenticator::{authenticate, TokenAuthenticator};
pub use extract::{Activated, Authenticated, Permitted, ReadRecords, RequestContext, WriteRecords};
pub use gate::AuthorizationGate;
pub use password::PasswordHash;
pub use principal::{Identity, NewPrincipal, PermissionSet, Principal};
pub use token::{AuthToken, Scope};
