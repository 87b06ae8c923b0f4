//! Database records, request payloads and response schemas.
//!
//! Response types derive `ToSchema` for the OpenAPI document and `TS` so the mobile
//! client can import generated TypeScript bindings.

pub mod auth;
pub mod buddy;
pub mod chat;
pub mod gig;
pub mod review;
pub mod transaction;
pub mod upload;
pub mod user;

pub use auth::*;
pub use buddy::*;
pub use chat::*;
pub use gig::*;
pub use review::*;
pub use transaction::*;
pub use upload::*;
pub use user::*;
