use crate::models::{
    AdjustmentRequest, BillData, BillRow, ConnectionRow, CustomerRow, FixedFeeRow,
    PreviousBillRow, RetrievalForm, SubsidyRow, TariffRateRow, TariffUsageRow, TaxRow,
};
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use sqlx::PgPool;
use std::sync::Arc;

pub type RepoResult<T> = Result<T, sqlx::Error>;

/// BillingRepository Trait
///
/// Abstract contract for everything the portal asks of the billing database. The
/// database owns the business rules; these methods only read rows and call the stored
/// functions. `Send + Sync + async_trait` make `Arc<dyn BillingRepository>` shareable
/// across Axum's tasks.
#[async_trait]
pub trait BillingRepository: Send + Sync {
    async fn bill_exists(&self, bill_id: i64) -> RepoResult<bool>;

    /// Amount due before the due date, `None` for an unknown bill.
    async fn bill_amount_due(&self, bill_id: i64) -> RepoResult<Option<f64>>;

    /// Latest recorded payment status of the bill, `None` when nothing is recorded.
    async fn payment_status(&self, bill_id: i64) -> RepoResult<Option<String>>;

    async fn payment_method_description(&self, payment_method_id: i64)
    -> RepoResult<Option<String>>;

    /// Calls `fun_process_payment`. Returns the function's status code (1 = success).
    async fn process_payment(
        &self,
        bill_id: i64,
        paid_at: NaiveDateTime,
        payment_method_id: i64,
        amount: f64,
    ) -> RepoResult<i32>;

    /// Calls `fun_adjust_bill`. Returns the function's status code (1 = success).
    async fn adjust_bill(&self, adjustment: &AdjustmentRequest) -> RepoResult<i32>;

    /// Collects every row needed to render a bill. `None` when the customer,
    /// connection or bill for that month does not exist.
    async fn bill_data(&self, query: &RetrievalForm) -> RepoResult<Option<BillData>>;
}

/// RepositoryState
///
/// The concrete type used to share the persistence layer across the application state.
pub type RepositoryState = Arc<dyn BillingRepository>;

/// PostgresBillingRepository
///
/// `BillingRepository` backed by the PostgreSQL billing schema. Every statement binds
/// its parameters; nothing user supplied is ever spliced into SQL text.
pub struct PostgresBillingRepository {
    pool: PgPool,
}

impl PostgresBillingRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Tariff in force for the connection's type on `on`, peak or off-peak.
    async fn tariff_rate(
        &self,
        connection_id: &str,
        peak: bool,
        on: NaiveDate,
    ) -> RepoResult<Option<TariffRateRow>> {
        sqlx::query_as::<_, TariffRateRow>(
            r#"SELECT t.tariff_description AS name, t.rate_per_unit::float8 AS rate_per_unit
                 FROM tariff t
                 JOIN connections c ON c.connection_type_code = t.connection_type_code
                WHERE c.connection_id = $1
                  AND t.is_peak = $2
                  AND $3 BETWEEN t.start_date AND COALESCE(t.end_date, $3)
             ORDER BY t.start_date DESC
                LIMIT 1"#,
        )
        .bind(connection_id)
        .bind(peak)
        .bind(on)
        .fetch_optional(&self.pool)
        .await
    }
}

#[async_trait]
impl BillingRepository for PostgresBillingRepository {
    async fn bill_exists(&self, bill_id: i64) -> RepoResult<bool> {
        sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM bill WHERE bill_id = $1)")
            .bind(bill_id)
            .fetch_one(&self.pool)
            .await
    }

    async fn bill_amount_due(&self, bill_id: i64) -> RepoResult<Option<f64>> {
        sqlx::query_scalar::<_, f64>(
            "SELECT total_amount_before_due_date::float8 FROM bill WHERE bill_id = $1",
        )
        .bind(bill_id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn payment_status(&self, bill_id: i64) -> RepoResult<Option<String>> {
        sqlx::query_scalar::<_, String>(
            r#"SELECT payment_status
                 FROM payment_details
                WHERE bill_id = $1
             ORDER BY payment_date DESC
                LIMIT 1"#,
        )
        .bind(bill_id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn payment_method_description(
        &self,
        payment_method_id: i64,
    ) -> RepoResult<Option<String>> {
        sqlx::query_scalar::<_, String>(
            "SELECT payment_method_description FROM payment_methods WHERE payment_method_id = $1",
        )
        .bind(payment_method_id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn process_payment(
        &self,
        bill_id: i64,
        paid_at: NaiveDateTime,
        payment_method_id: i64,
        amount: f64,
    ) -> RepoResult<i32> {
        sqlx::query_scalar::<_, i32>("SELECT fun_process_payment($1, $2, $3, $4::numeric)::int4")
            .bind(bill_id)
            .bind(paid_at)
            .bind(payment_method_id)
            .bind(amount)
            .fetch_one(&self.pool)
            .await
    }

    async fn adjust_bill(&self, adjustment: &AdjustmentRequest) -> RepoResult<i32> {
        sqlx::query_scalar::<_, i32>(
            "SELECT fun_adjust_bill($1, $2, $3, $4, $5, $6::numeric, $7::numeric, $8)::int4",
        )
        .bind(adjustment.adjustment_id)
        .bind(adjustment.bill_id)
        .bind(adjustment.adjustment_date)
        .bind(&adjustment.officer_name)
        .bind(&adjustment.officer_designation)
        .bind(adjustment.original_bill_amount)
        .bind(adjustment.adjustment_amount)
        .bind(&adjustment.adjustment_reason)
        .fetch_one(&self.pool)
        .await
    }

    async fn bill_data(&self, query: &RetrievalForm) -> RepoResult<Option<BillData>> {
        let customer = sqlx::query_as::<_, CustomerRow>(
            r#"SELECT first_name, last_name, address, phone_number, email
                 FROM customers
                WHERE customer_id = $1"#,
        )
        .bind(&query.customer_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(customer) = customer else {
            return Ok(None);
        };

        let connection = sqlx::query_as::<_, ConnectionRow>(
            r#"SELECT ct.description AS connection_type,
                      d.division_name AS division,
                      d.subdivision_name AS subdivision,
                      c.installation_date,
                      c.meter_type
                 FROM connections c
                 JOIN connection_types ct ON ct.connection_type_code = c.connection_type_code
                 JOIN divinfo d ON d.division_id = c.division_id
                              AND d.subdivision_id = c.subdivision_id
                WHERE c.connection_id = $1
                  AND c.customer_id = $2"#,
        )
        .bind(&query.connection_id)
        .bind(&query.customer_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(connection) = connection else {
            return Ok(None);
        };

        let bill = sqlx::query_as::<_, BillRow>(
            r#"SELECT bill_id,
                      bill_issue_date AS issue_date,
                      net_peak_units::float8 AS net_peak_units,
                      net_off_peak_units::float8 AS net_off_peak_units,
                      tax_amount::float8 AS tax_amount,
                      fixed_fee::float8 AS fixed_fee_amount,
                      arrears::float8 AS arrears_amount,
                      due_date,
                      total_amount_before_due_date::float8 AS amount_before_due_date,
                      total_amount_after_due_date::float8 AS amount_after_due_date
                 FROM bill
                WHERE connection_id = $1
                  AND billing_month::text = $2
                  AND billing_year::text = $3"#,
        )
        .bind(&query.connection_id)
        .bind(query.month.trim())
        .bind(query.year.trim())
        .fetch_optional(&self.pool)
        .await?;

        let Some(bill) = bill else {
            return Ok(None);
        };

        let usage = sqlx::query_as::<_, TariffUsageRow>(
            r#"SELECT COALESCE(SUM(peak_units), 0)::float8 AS peak_units,
                      COALESCE(SUM(off_peak_units), 0)::float8 AS off_peak_units,
                      COALESCE(SUM(peak_amount), 0)::float8 AS peak_amount,
                      COALESCE(SUM(off_peak_amount), 0)::float8 AS off_peak_amount
                 FROM bill_details
                WHERE bill_id = $1"#,
        )
        .bind(bill.bill_id)
        .fetch_one(&self.pool)
        .await?;

        let peak_tariff = self
            .tariff_rate(&query.connection_id, true, bill.issue_date)
            .await?
            .unwrap_or_default();
        let off_peak_tariff = self
            .tariff_rate(&query.connection_id, false, bill.issue_date)
            .await?
            .unwrap_or_default();

        let taxes = sqlx::query_as::<_, TaxRow>(
            r#"SELECT tr.tax_type AS name, tr.rate::float8 AS rate
                 FROM tax_rates tr
                 JOIN connections c ON c.connection_type_code = tr.connection_type_code
                WHERE c.connection_id = $1
                  AND $2 BETWEEN tr.start_date AND COALESCE(tr.end_date, $2)"#,
        )
        .bind(&query.connection_id)
        .bind(bill.issue_date)
        .fetch_all(&self.pool)
        .await?;

        let subsidies = sqlx::query_as::<_, SubsidyRow>(
            r#"SELECT s.subsidy_description AS name,
                      s.rate_per_unit::float8 AS rate_per_unit,
                      sp.provider_name
                 FROM subsidy s
                 JOIN subsidy_provider sp ON sp.provider_id = s.provider_id
                 JOIN connections c ON c.connection_type_code = s.connection_type_code
                WHERE c.connection_id = $1
                  AND $2 BETWEEN s.start_date AND COALESCE(s.end_date, $2)"#,
        )
        .bind(&query.connection_id)
        .bind(bill.issue_date)
        .fetch_all(&self.pool)
        .await?;

        let fixed_fees = sqlx::query_as::<_, FixedFeeRow>(
            r#"SELECT fc.fixed_charge_type AS name, fc.fixed_fee::float8 AS amount
                 FROM fixed_charges fc
                 JOIN connections c ON c.connection_type_code = fc.connection_type_code
                WHERE c.connection_id = $1
                  AND $2 BETWEEN fc.start_date AND COALESCE(fc.end_date, $2)"#,
        )
        .bind(&query.connection_id)
        .bind(bill.issue_date)
        .fetch_all(&self.pool)
        .await?;

        let previous_bills = sqlx::query_as::<_, PreviousBillRow>(
            r#"SELECT b.billing_year::int4 AS billing_year,
                      b.billing_month::int4 AS billing_month,
                      b.total_amount_before_due_date::float8 AS amount,
                      b.due_date,
                      COALESCE(
                          (SELECT pd.payment_status
                             FROM payment_details pd
                            WHERE pd.bill_id = b.bill_id
                         ORDER BY pd.payment_date DESC
                            LIMIT 1),
                          'Unpaid') AS status
                 FROM bill b
                WHERE b.connection_id = $1
                  AND b.bill_id <> $2
                  AND b.bill_issue_date < $3
             ORDER BY b.billing_year DESC, b.billing_month DESC
                LIMIT 10"#,
        )
        .bind(&query.connection_id)
        .bind(bill.bill_id)
        .bind(bill.issue_date)
        .fetch_all(&self.pool)
        .await?;

        Ok(Some(BillData {
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
        }))
    }
}
