//! Askama page definitions. Each struct binds to one file under `templates/`.

use askama::Template;
use axum::response::Html;

use crate::{
    error::AppError,
    models::{AdjustmentRequest, BillStatement, PaymentReceipt},
};

#[derive(Template)]
#[template(path = "index.html")]
pub struct IndexPage {
    pub auth_server: String,
    pub client_id: String,
    pub redirect_uri: String,
}

#[derive(Template)]
#[template(path = "dashboard.html")]
pub struct DashboardPage {
    pub username: String,
    pub role: &'static str,
}

#[derive(Template)]
#[template(path = "bill_payment.html")]
pub struct BillPaymentPage {
    pub username: String,
}

#[derive(Template)]
#[template(path = "bill_retrieval.html")]
pub struct BillRetrievalPage {
    pub username: String,
}

#[derive(Template)]
#[template(path = "bill_adjustments.html")]
pub struct BillAdjustmentsPage {
    pub username: String,
}

#[derive(Template)]
#[template(path = "payment_receipt.html")]
pub struct PaymentReceiptPage {
    pub receipt: PaymentReceipt,
}

#[derive(Template)]
#[template(path = "bill_details.html")]
pub struct BillDetailsPage {
    pub bill: BillStatement,
}

#[derive(Template)]
#[template(path = "adjustment_receipt.html")]
pub struct AdjustmentReceiptPage {
    pub adjustment: AdjustmentRequest,
}

/// Shown for business rejections (unknown bill, amount mismatch, ...). These are
/// expected outcomes of a form submission, not server errors.
#[derive(Template)]
#[template(path = "error.html")]
pub struct ErrorPage {
    pub error_msg: String,
}

impl ErrorPage {
    pub fn new(error_msg: impl Into<String>) -> Self {
        Self {
            error_msg: error_msg.into(),
        }
    }
}

pub fn render<T: Template>(page: T) -> Result<Html<String>, AppError> {
    Ok(Html(page.render()?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_in_link_percent_encodes_query_values() {
        let html = IndexPage {
            auth_server: "id.example:8443".to_string(),
            client_id: "billing portal&x=1".to_string(),
            redirect_uri: "https://portal.example/callback?next=/a".to_string(),
        }
        .render()
        .unwrap();

        assert!(html.contains("client_id=billing%20portal%26x%3D1"));
        assert!(html.contains("redirect_uri=https%3A%2F%2Fportal.example%2Fcallback%3Fnext%3D%2Fa"));
    }
}
