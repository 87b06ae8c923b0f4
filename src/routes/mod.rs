/// Router Module Index
///
/// Splits the API into routers by access level. Access control is applied per router in
/// `create_router` (via Axum layers), so a route's protection is decided by the file it
/// is declared in.

/// Routes reachable without an access token.
pub mod public;

/// Routes protected by the `AuthUser` extractor middleware.
pub mod authenticated;
