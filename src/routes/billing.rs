use crate::{AppState, handlers};
use axum::{Router, routing::get};

/// Billing Router Module
///
/// The billing workflows. Each route is a "function" in the access policy: the GET
/// renders the form and the POST processes it, and both are gated by the same grant.
///
/// Access Control:
/// The router is wrapped in the `access_gate` layer, which resolves the session and
/// checks the matched route path against the caller's role before any handler runs.
pub fn billing_routes() -> Router<AppState> {
    Router::new()
        // GET|POST /bill-payment
        // Payment form, and payment through `fun_process_payment`.
        .route(
            "/bill-payment",
            get(handlers::get_bill_payment).post(handlers::post_bill_payment),
        )
        // GET|POST /bill-retrieval
        // Bill lookup form, and the rendered bill for one connection and month.
        .route(
            "/bill-retrieval",
            get(handlers::get_bill_retrieval).post(handlers::post_bill_retrieval),
        )
        // GET|POST /bill-adjustments
        // Adjustment form, and the adjustment through `fun_adjust_bill`.
        .route(
            "/bill-adjustments",
            get(handlers::get_bill_adjustments).post(handlers::post_bill_adjustments),
        )
}
