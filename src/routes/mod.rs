/// Router Module Index
///
/// Routes are grouped by the gate they sit behind, so protection is applied once per
/// group (via Axum layers) instead of per handler.

/// Routes open to anyone: welcome page, OAuth callback, sign-out, health.
pub mod public;

/// Routes requiring a valid session, open to every role.
pub mod authenticated;

/// Billing routes requiring a valid session AND an access-control grant for the route.
pub mod billing;
