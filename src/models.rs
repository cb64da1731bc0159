use chrono::{Datelike, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};

// --- Form Submissions ---

/// PaymentForm
///
/// Body of `POST /bill-payment`.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct PaymentForm {
    pub bill_id: i64,
    pub amount: f64,
    pub payment_method_id: i64,
}

/// RetrievalForm
///
/// Body of `POST /bill-retrieval`. Identifiers are kept as text: the billing schema
/// stores customer and connection ids as strings.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct RetrievalForm {
    pub customer_id: String,
    pub connection_id: String,
    pub month: String,
    pub year: String,
}

impl RetrievalForm {
    /// Returns the name of the first empty field, if any.
    pub fn missing_field(&self) -> Option<&'static str> {
        [
            ("customer_id", &self.customer_id),
            ("connection_id", &self.connection_id),
            ("month", &self.month),
            ("year", &self.year),
        ]
        .into_iter()
        .find(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
    }
}

/// AdjustmentForm
///
/// Body of `POST /bill-adjustments`.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct AdjustmentForm {
    pub bill_id: i64,
    pub officer_name: String,
    pub officer_designation: String,
    pub original_bill_amount: f64,
    pub adjustment_amount: f64,
    pub adjustment_reason: String,
}

/// CallbackParams
///
/// Query string of the OAuth redirect (`POST /callback?code=...`).
#[derive(Debug, Deserialize, IntoParams)]
pub struct CallbackParams {
    /// One-time authorization code issued by the identity server.
    pub code: Option<String>,
}

// --- Payment & Adjustment ---

/// Whether a recorded payment status means the bill can no longer be adjusted.
/// Any non-blank status counts; a bill without a payment row is still open.
pub fn is_settled(payment_status: Option<&str>) -> bool {
    payment_status.is_some_and(|s| !s.trim().is_empty())
}

/// Amounts are compared to the cent; anything finer is float noise.
pub fn amounts_match(a: f64, b: f64) -> bool {
    (a - b).abs() < 0.005
}

/// adjustment_id
///
/// Confirmation number of an adjustment: the decimal digits of the bill id, the year
/// and the month (not zero padded) concatenated. Returns `None` if the result does
/// not fit in an `i64`.
pub fn adjustment_id(bill_id: i64, at: NaiveDateTime) -> Option<i64> {
    format!("{}{}{}", bill_id, at.year(), at.month())
        .parse()
        .ok()
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentReceipt {
    pub bill_id: i64,
    pub amount: f64,
    pub payment_method_id: i64,
    pub payment_method_description: String,
    pub payment_date: NaiveDateTime,
    pub payment_status: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AdjustmentRequest {
    pub adjustment_id: i64,
    pub bill_id: i64,
    pub adjustment_date: NaiveDateTime,
    pub officer_name: String,
    pub officer_designation: String,
    pub original_bill_amount: f64,
    pub adjustment_amount: f64,
    pub adjustment_reason: String,
}

// --- Bill Retrieval (rows as returned by the billing schema) ---

#[derive(Debug, Clone, FromRow, Default)]
pub struct CustomerRow {
    pub first_name: String,
    pub last_name: String,
    pub address: String,
    pub phone_number: String,
    pub email: String,
}

#[derive(Debug, Clone, FromRow, Default)]
pub struct ConnectionRow {
    pub connection_type: String,
    pub division: String,
    pub subdivision: String,
    pub installation_date: NaiveDate,
    pub meter_type: String,
}

#[derive(Debug, Clone, FromRow, Default)]
pub struct BillRow {
    pub bill_id: i64,
    pub issue_date: NaiveDate,
    pub net_peak_units: f64,
    pub net_off_peak_units: f64,
    pub tax_amount: f64,
    pub fixed_fee_amount: f64,
    pub arrears_amount: f64,
    pub due_date: NaiveDate,
    pub amount_before_due_date: f64,
    pub amount_after_due_date: f64,
}

/// Units and amounts billed under the peak and off-peak tariffs.
#[derive(Debug, Clone, FromRow, Default)]
pub struct TariffUsageRow {
    pub peak_units: f64,
    pub off_peak_units: f64,
    pub peak_amount: f64,
    pub off_peak_amount: f64,
}

#[derive(Debug, Clone, FromRow, Default)]
pub struct TariffRateRow {
    pub name: String,
    pub rate_per_unit: f64,
}

#[derive(Debug, Clone, FromRow, Default)]
pub struct TaxRow {
    pub name: String,
    pub rate: f64,
}

#[derive(Debug, Clone, FromRow, Default)]
pub struct SubsidyRow {
    pub name: String,
    pub rate_per_unit: f64,
    pub provider_name: String,
}

#[derive(Debug, Clone, FromRow, Default)]
pub struct FixedFeeRow {
    pub name: String,
    pub amount: f64,
}

#[derive(Debug, Clone, FromRow, Default)]
pub struct PreviousBillRow {
    pub billing_year: i32,
    pub billing_month: i32,
    pub amount: f64,
    pub due_date: NaiveDate,
    pub status: String,
}

/// Everything the database returns for one bill retrieval.
#[derive(Debug, Clone, Default)]
pub struct BillData {
    pub customer: CustomerRow,
    pub connection: ConnectionRow,
    pub bill: BillRow,
    pub usage: TariffUsageRow,
    pub peak_tariff: TariffRateRow,
    pub off_peak_tariff: TariffRateRow,
    pub taxes: Vec<TaxRow>,
    pub subsidies: Vec<SubsidyRow>,
    pub fixed_fees: Vec<FixedFeeRow>,
    /// Most recent first, at most ten.
    pub previous_bills: Vec<PreviousBillRow>,
}

// --- Bill Statement (view model) ---

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TariffLine {
    pub name: String,
    pub units: f64,
    pub rate: f64,
    pub amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaxLine {
    pub name: String,
    pub rate: f64,
    pub amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubsidyLine {
    pub name: String,
    pub provider_name: String,
    pub rate_per_unit: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeeLine {
    pub name: String,
    pub amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PreviousBillLine {
    pub month: String,
    pub amount: f64,
    pub due_date: String,
    pub status: String,
}

/// BillStatement
///
/// The rendered bill: customer and connection details, the current bill's totals and
/// the itemised tariffs, taxes, subsidies, fees and billing history.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BillStatement {
    pub customer_id: String,
    pub connection_id: String,
    pub customer_name: String,
    pub customer_address: String,
    pub customer_phone: String,
    pub customer_email: String,
    pub connection_type: String,
    pub division: String,
    pub subdivision: String,
    pub installation_date: String,
    pub meter_type: String,
    pub month: String,
    pub issue_date: String,
    pub due_date: String,
    pub net_peak_units: f64,
    pub net_off_peak_units: f64,
    pub bill_amount: f64,
    pub amount_after_due_date: f64,
    pub arrears_amount: f64,
    pub fixed_fee_amount: f64,
    pub tax_amount: f64,
    pub tariffs: Vec<TariffLine>,
    pub taxes: Vec<TaxLine>,
    pub subsidies: Vec<SubsidyLine>,
    pub fixed_fees: Vec<FeeLine>,
    pub previous_bills: Vec<PreviousBillLine>,
}

const DATE_FORMAT: &str = "%Y-%m-%d";

impl BillStatement {
    pub fn assemble(form: &RetrievalForm, data: BillData) -> Self {
        let BillData {
            customer,
            connection,
            bill,
            usage,
            peak_tariff,
            off_peak_tariff,
            taxes,
            subsidies,
            fixed_fees,
            previous_bills,
        } = data;

        let bill_amount = bill.amount_before_due_date;

        let tariffs = vec![
            TariffLine {
                name: peak_tariff.name,
                units: usage.peak_units,
                rate: peak_tariff.rate_per_unit,
                amount: usage.peak_amount,
            },
            TariffLine {
                name: format!("{} (Off Peak)", off_peak_tariff.name),
                units: usage.off_peak_units,
                rate: off_peak_tariff.rate_per_unit,
                amount: usage.off_peak_amount,
            },
        ];

        Self {
            customer_id: form.customer_id.clone(),
            connection_id: form.connection_id.clone(),
            customer_name: format!("{} {}", customer.first_name, customer.last_name),
            customer_address: customer.address,
            customer_phone: customer.phone_number,
            customer_email: customer.email,
            connection_type: connection.connection_type,
            division: connection.division,
            subdivision: connection.subdivision,
            installation_date: connection.installation_date.format(DATE_FORMAT).to_string(),
            meter_type: connection.meter_type,
            month: form.month.clone(),
            issue_date: bill.issue_date.format(DATE_FORMAT).to_string(),
            due_date: bill.due_date.format(DATE_FORMAT).to_string(),
            net_peak_units: bill.net_peak_units,
            net_off_peak_units: bill.net_off_peak_units,
            bill_amount,
            amount_after_due_date: bill.amount_after_due_date,
            arrears_amount: bill.arrears_amount,
            fixed_fee_amount: bill.fixed_fee_amount,
            tax_amount: bill.tax_amount,
            tariffs,
            taxes: taxes
                .into_iter()
                .map(|t| TaxLine {
                    amount: t.rate * bill_amount,
                    name: t.name,
                    rate: t.rate,
                })
                .collect(),
            subsidies: subsidies
                .into_iter()
                .map(|s| SubsidyLine {
                    name: s.name,
                    provider_name: s.provider_name,
                    rate_per_unit: s.rate_per_unit,
                })
                .collect(),
            fixed_fees: fixed_fees
                .into_iter()
                .map(|f| FeeLine {
                    name: f.name,
                    amount: f.amount,
                })
                .collect(),
            previous_bills: previous_bills
                .into_iter()
                .map(|b| PreviousBillLine {
                    month: format!("{}-{:02}", b.billing_year, b.billing_month),
                    amount: b.amount,
                    due_date: b.due_date.format(DATE_FORMAT).to_string(),
                    status: b.status,
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn adjustment_id_concatenates_unpadded_month() {
        let at = date(2024, 3, 9).and_hms_opt(10, 0, 0).unwrap();
        assert_eq!(adjustment_id(1042, at), Some(104220243));

        let at = date(2024, 11, 1).and_hms_opt(0, 0, 0).unwrap();
        assert_eq!(adjustment_id(7, at), Some(7202411));
    }

    #[test]
    fn adjustment_id_overflow_is_none() {
        let at = date(2024, 12, 1).and_hms_opt(0, 0, 0).unwrap();
        assert_eq!(adjustment_id(i64::MAX, at), None);
    }

    #[test]
    fn settled_statuses() {
        assert!(!is_settled(None));
        assert!(!is_settled(Some("  ")));
        assert!(is_settled(Some("Unpaid")));
        assert!(is_settled(Some("Paid")));
        assert!(is_settled(Some("Partially Paid")));
    }

    #[test]
    fn amounts_compare_to_the_cent() {
        assert!(amounts_match(1520.50, 1520.5000001));
        assert!(!amounts_match(1520.50, 1520.51));
    }

    #[test]
    fn retrieval_form_reports_first_blank_field() {
        let form = RetrievalForm {
            customer_id: "C-1".into(),
            connection_id: " ".into(),
            month: "".into(),
            year: "2024".into(),
        };
        assert_eq!(form.missing_field(), Some("connection_id"));
    }

    #[test]
    fn statement_derives_lines_from_rows() {
        let form = RetrievalForm {
            customer_id: "C-100".into(),
            connection_id: "CN-7".into(),
            month: "3".into(),
            year: "2024".into(),
        };
        let data = BillData {
            customer: CustomerRow {
                first_name: "Ayesha".into(),
                last_name: "Khan".into(),
                ..Default::default()
            },
            connection: ConnectionRow {
                installation_date: date(2019, 6, 1),
                ..Default::default()
            },
            bill: BillRow {
                issue_date: date(2024, 3, 1),
                due_date: date(2024, 3, 15),
                amount_before_due_date: 2000.0,
                ..Default::default()
            },
            usage: TariffUsageRow {
                peak_units: 100.0,
                off_peak_units: 50.0,
                peak_amount: 1500.0,
                off_peak_amount: 400.0,
            },
            peak_tariff: TariffRateRow {
                name: "Residential".into(),
                rate_per_unit: 15.0,
            },
            off_peak_tariff: TariffRateRow {
                name: "Residential".into(),
                rate_per_unit: 8.0,
            },
            taxes: vec![TaxRow {
                name: "GST".into(),
                rate: 0.17,
            }],
            previous_bills: vec![PreviousBillRow {
                billing_year: 2024,
                billing_month: 2,
                amount: 1800.0,
                due_date: date(2024, 2, 15),
                status: "Paid".into(),
            }],
            ..Default::default()
        };

        let statement = BillStatement::assemble(&form, data);

        assert_eq!(statement.customer_name, "Ayesha Khan");
        assert_eq!(statement.installation_date, "2019-06-01");
        assert_eq!(statement.tariffs[1].name, "Residential (Off Peak)");
        assert_eq!(statement.tariffs[0].amount, 1500.0);
        assert!((statement.taxes[0].amount - 340.0).abs() < 1e-9);
        assert_eq!(statement.previous_bills[0].month, "2024-02");
        assert_eq!(statement.due_date, "2024-03-15");
    }
}
