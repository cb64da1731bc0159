use crate::{
    AppState,
    auth::{SessionUser, verify_token},
    config::AppConfig,
    error::{AppError, found},
    models::{
        AdjustmentForm, AdjustmentRequest, BillStatement, CallbackParams, PaymentForm,
        PaymentReceipt, RetrievalForm, adjustment_id, amounts_match, is_settled,
    },
    session::{SESSION_COOKIE_NAME, SessionPayload, new_session_token},
    templates::{
        AdjustmentReceiptPage, BillAdjustmentsPage, BillDetailsPage, BillPaymentPage,
        BillRetrievalPage, DashboardPage, ErrorPage, IndexPage, PaymentReceiptPage, render,
    },
};
use axum::{
    Form,
    extract::{
        Query, State,
        rejection::{FormRejection, QueryRejection},
    },
    response::{Html, IntoResponse, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};

const PROCESSING_FAILED: &str = "An error occured while processing the request. Please try again. Make sure the values are correct";
const INVALID_BILL: &str = "Invalid BillID provided.";

type Page = Result<Html<String>, AppError>;

/// Unwraps a form body, turning decode failures (missing fields, non-numeric ids)
/// into a 400 with the decoder's message.
fn form_body<T>(form: Result<Form<T>, FormRejection>) -> Result<T, AppError> {
    form.map(|Form(body)| body)
        .map_err(|rejection| AppError::BadRequest(rejection.body_text()))
}

/// The session cookie with every attribute it is issued and cleared with.
fn session_cookie(value: String, max_age: time::Duration) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE_NAME, value))
        .path("/")
        .http_only(true)
        .secure(true)
        .same_site(SameSite::None)
        .max_age(max_age)
        .build()
}

// --- Public ---

/// get_index
///
/// [Public Route] Welcome page carrying the sign-in link to the identity server.
#[utoipa::path(
    get,
    path = "/",
    responses((status = 200, description = "Welcome page"))
)]
pub async fn get_index(State(config): State<AppConfig>) -> Page {
    render(IndexPage {
        auth_server: config.auth_server.clone(),
        client_id: config.client_id.clone(),
        redirect_uri: config.redirect_uri(),
    })
}

/// oauth_callback
///
/// [Public Route] Landing point of the OAuth authorization-code flow.
///
/// *Flow*: exchanges the code at the identity server, verifies the returned JWT,
/// stores a short-lived session keyed by a fresh random token and hands that token to
/// the browser as an HttpOnly cookie before redirecting to the dashboard.
#[utoipa::path(
    post,
    path = "/callback",
    params(CallbackParams),
    responses(
        (status = 302, description = "Session issued, redirect to /dashboard"),
        (status = 400, description = "Authorization code missing"),
        (status = 401, description = "Token missing, invalid or without a username"),
        (status = 500, description = "Identity server unreachable")
    )
)]
pub async fn oauth_callback(
    State(state): State<AppState>,
    jar: CookieJar,
    params: Result<Query<CallbackParams>, QueryRejection>,
) -> Result<Response, AppError> {
    let Query(params) = params.map_err(|rejection| AppError::BadRequest(rejection.body_text()))?;
    let code = params
        .code
        .filter(|c| !c.is_empty())
        .ok_or_else(|| {
            AppError::BadRequest("Authorization code not provided/missing.".to_string())
        })?;

    let jwt = state.identity.exchange_code(&code).await?;
    let username = verify_token(&jwt, &state.config)?;

    let token = new_session_token();
    let ttl = state.config.session_ttl;
    state
        .sessions
        .put(&token, &SessionPayload::for_user(&username), ttl)
        .await
        .map_err(AppError::SessionStore)?;

    tracing::info!(username = %username, ttl_secs = ttl.as_secs(), "session issued");

    let max_age = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);
    let cookie = session_cookie(token, time::Duration::seconds(max_age));

    Ok((jar.add(cookie), found("/dashboard")).into_response())
}

/// sign_out
///
/// [Public Route] Drops the server-side session (if any), clears the cookie and sends
/// the browser back to the welcome page. Works without a session too.
#[utoipa::path(
    get,
    path = "/sign-out",
    responses((status = 302, description = "Signed out, redirect to the welcome page"))
)]
pub async fn sign_out(State(state): State<AppState>, jar: CookieJar) -> Response {
    if let Some(cookie) = jar.get(SESSION_COOKIE_NAME) {
        if let Err(e) = state.sessions.delete(cookie.value()).await {
            // The session expires on its own; signing out still clears the cookie.
            tracing::warn!(error = %e, "failed to delete session on sign-out");
        } else {
            tracing::info!("session closed");
        }
    }

    let jar = jar.remove(session_cookie(String::new(), time::Duration::ZERO));
    (jar, found(&state.config.welcome_url)).into_response()
}

// --- Authenticated ---

/// get_dashboard
///
/// [Authenticated Route] Landing page for every signed-in user, whatever the role.
#[utoipa::path(
    get,
    path = "/dashboard",
    responses(
        (status = 200, description = "Dashboard"),
        (status = 401, description = "No session cookie"),
        (status = 302, description = "Session expired, redirect to the welcome page")
    )
)]
pub async fn get_dashboard(user: SessionUser) -> Page {
    render(DashboardPage {
        role: user.role_label(),
        username: user.username,
    })
}

// --- Gated (session + access control) ---

#[utoipa::path(
    get,
    path = "/bill-payment",
    responses(
        (status = 200, description = "Payment form"),
        (status = 403, description = "Role not allowed")
    )
)]
pub async fn get_bill_payment(SessionUser { username, .. }: SessionUser) -> Page {
    render(BillPaymentPage { username })
}

#[utoipa::path(
    get,
    path = "/bill-retrieval",
    responses(
        (status = 200, description = "Retrieval form"),
        (status = 403, description = "Role not allowed")
    )
)]
pub async fn get_bill_retrieval(SessionUser { username, .. }: SessionUser) -> Page {
    render(BillRetrievalPage { username })
}

#[utoipa::path(
    get,
    path = "/bill-adjustments",
    responses(
        (status = 200, description = "Adjustment form"),
        (status = 403, description = "Role not allowed")
    )
)]
pub async fn get_bill_adjustments(SessionUser { username, .. }: SessionUser) -> Page {
    render(BillAdjustmentsPage { username })
}

/// post_bill_payment
///
/// [Gated Route] Records a payment through the `fun_process_payment` stored function
/// and renders a receipt with the resulting payment status.
#[utoipa::path(
    post,
    path = "/bill-payment",
    request_body(content = PaymentForm, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 200, description = "Receipt, or an error page for a rejected payment"),
        (status = 400, description = "Malformed form")
    )
)]
pub async fn post_bill_payment(
    SessionUser { username, .. }: SessionUser,
    State(state): State<AppState>,
    form: Result<Form<PaymentForm>, FormRejection>,
) -> Page {
    let form = form_body(form)?;

    if !state.repo.bill_exists(form.bill_id).await? {
        return render(ErrorPage::new(INVALID_BILL));
    }

    let payment_date = chrono::Local::now().naive_local();
    let status = state
        .repo
        .process_payment(form.bill_id, payment_date, form.payment_method_id, form.amount)
        .await?;

    if status != 1 {
        tracing::warn!(username = %username, bill_id = form.bill_id, status, "payment rejected");
        return render(ErrorPage::new(PROCESSING_FAILED));
    }

    let payment_status = state
        .repo
        .payment_status(form.bill_id)
        .await?
        .unwrap_or_else(|| "Unknown".to_string());
    let payment_method_description = state
        .repo
        .payment_method_description(form.payment_method_id)
        .await?
        .unwrap_or_default();

    tracing::info!(
        username = %username,
        bill_id = form.bill_id,
        amount = form.amount,
        payment_status = %payment_status,
        "payment processed"
    );

    render(PaymentReceiptPage {
        receipt: PaymentReceipt {
            bill_id: form.bill_id,
            amount: form.amount,
            payment_method_id: form.payment_method_id,
            payment_method_description,
            payment_date,
            payment_status,
        },
    })
}

/// post_bill_retrieval
///
/// [Gated Route] Renders the full bill for one connection and month. Any database
/// failure is shown on the error page rather than as a 500.
#[utoipa::path(
    post,
    path = "/bill-retrieval",
    request_body(content = RetrievalForm, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 200, description = "Bill details, or an error page"),
        (status = 400, description = "Malformed form")
    )
)]
pub async fn post_bill_retrieval(
    State(state): State<AppState>,
    form: Result<Form<RetrievalForm>, FormRejection>,
) -> Page {
    let form = form_body(form)?;

    if let Some(field) = form.missing_field() {
        return Err(AppError::BadRequest(format!("Field '{}' must not be empty.", field)));
    }

    match state.repo.bill_data(&form).await {
        Ok(Some(data)) => render(BillDetailsPage {
            bill: BillStatement::assemble(&form, data),
        }),
        Ok(None) => render(ErrorPage::new(
            "No bill found for the given customer, connection and billing month.",
        )),
        Err(e) => {
            tracing::error!(error = %e, "bill retrieval failed");
            render(ErrorPage::new(format!(
                "An error occured processing the request: {}",
                e
            )))
        }
    }
}

/// post_bill_adjustments
///
/// [Gated Route] Records a correction to an unpaid bill through `fun_adjust_bill`.
///
/// *Checks*: the bill must exist, the officer must quote the amount currently due,
/// and no payment may have been recorded against it yet.
#[utoipa::path(
    post,
    path = "/bill-adjustments",
    request_body(content = AdjustmentForm, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 200, description = "Adjustment receipt, or an error page"),
        (status = 400, description = "Malformed form")
    )
)]
pub async fn post_bill_adjustments(
    SessionUser { username, .. }: SessionUser,
    State(state): State<AppState>,
    form: Result<Form<AdjustmentForm>, FormRejection>,
) -> Page {
    let form = form_body(form)?;

    let Some(amount_due) = state.repo.bill_amount_due(form.bill_id).await? else {
        return render(ErrorPage::new(INVALID_BILL));
    };

    if !amounts_match(form.original_bill_amount, amount_due) {
        return render(ErrorPage::new(
            "The original bill amount provided does not match the actual amount due.",
        ));
    }

    let payment_status = state.repo.payment_status(form.bill_id).await?;
    if is_settled(payment_status.as_deref()) {
        return render(ErrorPage::new(
            "The bill has already been paid. Adjustments cannot be made to a paid bill.",
        ));
    }

    let adjustment_date = chrono::Local::now().naive_local();
    let Some(adjustment_id) = adjustment_id(form.bill_id, adjustment_date) else {
        return Err(AppError::BadRequest("Bill id out of range.".to_string()));
    };

    let adjustment = AdjustmentRequest {
        adjustment_id,
        bill_id: form.bill_id,
        adjustment_date,
        officer_name: form.officer_name,
        officer_designation: form.officer_designation,
        original_bill_amount: form.original_bill_amount,
        adjustment_amount: form.adjustment_amount,
        adjustment_reason: form.adjustment_reason,
    };

    let status = state.repo.adjust_bill(&adjustment).await?;
    if status != 1 {
        tracing::warn!(username = %username, bill_id = adjustment.bill_id, status, "adjustment rejected");
        return render(ErrorPage::new(PROCESSING_FAILED));
    }

    tracing::info!(
        username = %username,
        bill_id = adjustment.bill_id,
        adjustment_id,
        adjustment_amount = adjustment.adjustment_amount,
        "bill adjusted"
    );

    render(AdjustmentReceiptPage { adjustment })
}
