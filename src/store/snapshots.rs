use chrono::Utc;
use sqlx::Row;

use super::{
    format_date, format_timestamp, parse_date, parse_timestamp, ChangeLogEntry, HeaderSnapshot,
    LineSnapshot, PoMapping, RequirementSnapshot, StateStore, StoreError,
};

impl StateStore {
    pub async fn line_snapshots(&self, order_id: i64) -> Result<Vec<LineSnapshot>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT line_number, item_code, quantity, required_date
            FROM line_snapshots
            WHERE order_id = ?1
            ORDER BY line_number
            "#,
        )
        .bind(order_id)
        .fetch_all(self.pool())
        .await?;

        rows.iter()
            .map(|row| -> Result<LineSnapshot, StoreError> {
                Ok(LineSnapshot {
                    line_number: row.try_get("line_number")?,
                    item_code: row.try_get("item_code")?,
                    quantity: row.try_get("quantity")?,
                    required_date: parse_date(row.try_get("required_date")?),
                })
            })
            .collect()
    }

    /// Replace the line baseline of an order in one transaction
    pub async fn replace_line_snapshots(
        &self,
        order_id: i64,
        lines: &[LineSnapshot],
    ) -> Result<(), StoreError> {
        let now = format_timestamp(Utc::now());
        let mut tx = self.pool().begin().await?;

        sqlx::query("DELETE FROM line_snapshots WHERE order_id = ?1")
            .bind(order_id)
            .execute(&mut *tx)
            .await?;

        for line in lines {
            sqlx::query(
                r#"
                INSERT INTO line_snapshots (order_id, line_number, item_code, quantity, required_date, observed_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                "#,
            )
            .bind(order_id)
            .bind(line.line_number)
            .bind(&line.item_code)
            .bind(line.quantity)
            .bind(format_date(line.required_date))
            .bind(&now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    pub async fn header_snapshot(&self, order_id: i64) -> Result<Option<HeaderSnapshot>, StoreError> {
        let row = sqlx::query(
            "SELECT customer_reference, observed_at FROM header_snapshots WHERE order_id = ?1",
        )
        .bind(order_id)
        .fetch_optional(self.pool())
        .await?;

        row.map(|row| -> Result<HeaderSnapshot, StoreError> {
            let observed_at: Option<String> = row.try_get("observed_at")?;
            Ok(HeaderSnapshot {
                customer_reference: row.try_get("customer_reference")?,
                observed_at: observed_at.as_deref().and_then(parse_timestamp),
            })
        })
        .transpose()
    }

    pub async fn save_header_snapshot(
        &self,
        order_id: i64,
        customer_reference: &str,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO header_snapshots (order_id, customer_reference, observed_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(order_id) DO UPDATE SET
                customer_reference = excluded.customer_reference,
                observed_at = excluded.observed_at
            "#,
        )
        .bind(order_id)
        .bind(customer_reference)
        .bind(format_timestamp(Utc::now()))
        .execute(self.pool())
        .await?;
        Ok(())
    }

    pub async fn requirement_snapshots(
        &self,
        order_id: i64,
    ) -> Result<Vec<RequirementSnapshot>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT item_code, quantity, required_date
            FROM requirement_snapshots
            WHERE order_id = ?1
            ORDER BY item_code
            "#,
        )
        .bind(order_id)
        .fetch_all(self.pool())
        .await?;

        rows.iter()
            .map(|row| -> Result<RequirementSnapshot, StoreError> {
                Ok(RequirementSnapshot {
                    item_code: row.try_get("item_code")?,
                    quantity: row.try_get("quantity")?,
                    required_date: parse_date(row.try_get("required_date")?),
                })
            })
            .collect()
    }

    pub async fn replace_requirement_snapshots(
        &self,
        order_id: i64,
        requirements: &[RequirementSnapshot],
    ) -> Result<(), StoreError> {
        let now = format_timestamp(Utc::now());
        let mut tx = self.pool().begin().await?;

        sqlx::query("DELETE FROM requirement_snapshots WHERE order_id = ?1")
            .bind(order_id)
            .execute(&mut *tx)
            .await?;

        for requirement in requirements {
            sqlx::query(
                r#"
                INSERT OR REPLACE INTO requirement_snapshots (order_id, item_code, quantity, required_date, observed_at)
                VALUES (?1, ?2, ?3, ?4, ?5)
                "#,
            )
            .bind(order_id)
            .bind(&requirement.item_code)
            .bind(requirement.quantity)
            .bind(format_date(requirement.required_date))
            .bind(&now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Insert or extend a requirement mapping; downstream fields only fill in
    pub async fn record_po_mapping(&self, mapping: &PoMapping) -> Result<(), StoreError> {
        let now = format_timestamp(Utc::now());
        sqlx::query(
            r#"
            INSERT INTO po_mappings (
                order_id, item_code, po_number, po_line,
                sales_order_site_b, so_line, shipping_request, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)
            ON CONFLICT(order_id, item_code) DO UPDATE SET
                po_number = excluded.po_number,
                po_line = excluded.po_line,
                sales_order_site_b = COALESCE(excluded.sales_order_site_b, po_mappings.sales_order_site_b),
                so_line = COALESCE(excluded.so_line, po_mappings.so_line),
                shipping_request = COALESCE(excluded.shipping_request, po_mappings.shipping_request),
                updated_at = excluded.updated_at
            "#,
        )
        .bind(mapping.order_id)
        .bind(&mapping.item_code)
        .bind(mapping.po_number)
        .bind(mapping.po_line)
        .bind(mapping.sales_order_site_b)
        .bind(mapping.so_line)
        .bind(&mapping.shipping_request)
        .bind(&now)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    pub async fn po_mappings(&self, order_id: i64) -> Result<Vec<PoMapping>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT order_id, item_code, po_number, po_line, sales_order_site_b, so_line, shipping_request
            FROM po_mappings
            WHERE order_id = ?1
            ORDER BY item_code
            "#,
        )
        .bind(order_id)
        .fetch_all(self.pool())
        .await?;

        rows.iter()
            .map(|row| -> Result<PoMapping, StoreError> {
                Ok(PoMapping {
                    order_id: row.try_get("order_id")?,
                    item_code: row.try_get("item_code")?,
                    po_number: row.try_get("po_number")?,
                    po_line: row.try_get("po_line")?,
                    sales_order_site_b: row.try_get("sales_order_site_b")?,
                    so_line: row.try_get("so_line")?,
                    shipping_request: row.try_get("shipping_request")?,
                })
            })
            .collect()
    }

    pub async fn append_change(&self, entry: &ChangeLogEntry) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO change_log (order_id, run_id, field, old_value, new_value, recorded_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(entry.order_id)
        .bind(&entry.run_id)
        .bind(&entry.field)
        .bind(&entry.old_value)
        .bind(&entry.new_value)
        .bind(format_timestamp(entry.recorded_at.unwrap_or_else(Utc::now)))
        .execute(self.pool())
        .await?;
        Ok(())
    }

    pub async fn change_log(&self, order_id: i64) -> Result<Vec<ChangeLogEntry>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT order_id, run_id, field, old_value, new_value, recorded_at
            FROM change_log
            WHERE order_id = ?1
            ORDER BY id
            "#,
        )
        .bind(order_id)
        .fetch_all(self.pool())
        .await?;

        rows.iter()
            .map(|row| -> Result<ChangeLogEntry, StoreError> {
                let recorded_at: String = row.try_get("recorded_at")?;
                Ok(ChangeLogEntry {
                    order_id: row.try_get("order_id")?,
                    run_id: row.try_get("run_id")?,
                    field: row.try_get("field")?,
                    old_value: row.try_get("old_value")?,
                    new_value: row.try_get("new_value")?,
                    recorded_at: parse_timestamp(&recorded_at),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[tokio::test]
    async fn line_baseline_is_replaced_wholesale() {
        let store = StateStore::in_memory().await.unwrap();
        let date = NaiveDate::from_ymd_opt(2026, 2, 1);
        store
            .replace_line_snapshots(
                5,
                &[
                    LineSnapshot { line_number: 1, item_code: "LWS-A".into(), quantity: 10.0, required_date: date },
                    LineSnapshot { line_number: 2, item_code: "LWS-B".into(), quantity: 4.0, required_date: None },
                ],
            )
            .await
            .unwrap();
        store
            .replace_line_snapshots(
                5,
                &[LineSnapshot { line_number: 1, item_code: "LWS-A".into(), quantity: 12.0, required_date: date }],
            )
            .await
            .unwrap();

        let lines = store.line_snapshots(5).await.unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].quantity, 12.0);
        assert_eq!(lines[0].required_date, date);
    }

    #[tokio::test]
    async fn mapping_fills_downstream_fields_incrementally() {
        let store = StateStore::in_memory().await.unwrap();
        let mut mapping = PoMapping {
            order_id: 5,
            item_code: "16P4-ABC".into(),
            po_number: 5001,
            po_line: 1,
            sales_order_site_b: None,
            so_line: None,
            shipping_request: None,
        };
        store.record_po_mapping(&mapping).await.unwrap();

        mapping.sales_order_site_b = Some(7001);
        mapping.so_line = Some(1);
        store.record_po_mapping(&mapping).await.unwrap();

        mapping.sales_order_site_b = None;
        mapping.shipping_request = Some("SR-7001".into());
        store.record_po_mapping(&mapping).await.unwrap();

        let stored = store.po_mappings(5).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].sales_order_site_b, Some(7001));
        assert_eq!(stored[0].shipping_request.as_deref(), Some("SR-7001"));
    }

    #[tokio::test]
    async fn header_and_change_log() {
        let store = StateStore::in_memory().await.unwrap();
        assert!(store.header_snapshot(5).await.unwrap().is_none());
        store.save_header_snapshot(5, "PO-1").await.unwrap();
        store.save_header_snapshot(5, "PO-2").await.unwrap();
        assert_eq!(
            store.header_snapshot(5).await.unwrap().unwrap().customer_reference,
            "PO-2"
        );

        store
            .append_change(&ChangeLogEntry::new(5, Some("run-1"), "customer_reference", Some("PO-1".into()), Some("PO-2".into())))
            .await
            .unwrap();
        let log = store.change_log(5).await.unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].new_value.as_deref(), Some("PO-2"));
        assert!(log[0].recorded_at.is_some());
    }
}
