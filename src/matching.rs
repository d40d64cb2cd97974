// Matching engine: handshakes between bank transactions and invoices.
//
// A handshake is the only multi-entity mutation in the system. Creating one
// touches three tables (insert the handshake, flag the bank transaction
// matched, bump the invoice's paid amount and derived fields) and MUST land
// atomically: a crash between steps would leave the incrementally maintained
// invariant `invoice.paid_amount == sum(applied + proxy)` permanently broken.
// Every mutation here therefore runs inside one rusqlite transaction;
// dropping the transaction on any error path rolls everything back.
//
// `is_paid` uses a strict comparison against the running total. Tolerance is
// applied only when classifying status for display (settlement module).

use anyhow::{bail, Context, Result};
use rusqlite::{params, Connection, OptionalExtension};

use crate::db;

/// Inputs for one bank-to-invoice match.
#[derive(Debug, Clone, Default)]
pub struct HandshakeRequest {
    pub bank_id: i64,
    pub invoice_id: i64,
    /// Portion of the bank amount applied to this invoice.
    pub applied: f64,
    /// Manual adjustment absorbing FX differences or fees.
    pub proxy: f64,
    pub note: Option<String>,
    pub created_by: Option<String>,
}

/// Non-finite amounts are operator input gone wrong; treat them as zero
/// rather than poisoning the invoice totals.
fn sanitize(amount: f64) -> f64 {
    if amount.is_finite() {
        amount
    } else {
        0.0
    }
}

/// Create a handshake and maintain both derived invariants.
///
/// The bank transaction is flagged matched unconditionally: one payment may
/// fund several invoices and it is "matched" the moment it funds at least
/// one. Returns the new handshake id.
pub fn create_handshake(conn: &mut Connection, request: &HandshakeRequest) -> Result<i64> {
    let applied = sanitize(request.applied);
    let proxy = sanitize(request.proxy);
    let total_applied = applied + proxy;

    let tx = conn.transaction()?;

    let bank_exists: i64 = tx.query_row(
        "SELECT COUNT(*) FROM bank_transactions WHERE bank_id = ?1",
        params![request.bank_id],
        |row| row.get(0),
    )?;
    if bank_exists == 0 {
        bail!("Bank transaction {} not found", request.bank_id);
    }

    tx.execute(
        "INSERT INTO handshakes
            (bank_id, invoice_id, bank_amount_applied, proxy_amount, note, created_at, created_by)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            request.bank_id,
            request.invoice_id,
            applied,
            proxy,
            request.note,
            db::now_iso(),
            request.created_by,
        ],
    )
    .context("Failed to insert handshake")?;

    let handshake_id = tx.last_insert_rowid();

    tx.execute(
        "UPDATE bank_transactions SET is_matched = 1 WHERE bank_id = ?1",
        params![request.bank_id],
    )?;

    let updated = tx.execute(
        "UPDATE invoices
         SET paid_amount = paid_amount + ?1,
             balance_remaining = total_gross - (paid_amount + ?1),
             is_paid = CASE WHEN paid_amount + ?1 >= total_gross THEN 1 ELSE 0 END
         WHERE invoice_id = ?2",
        params![total_applied, request.invoice_id],
    )?;
    if updated == 0 {
        bail!("Invoice {} not found", request.invoice_id);
    }

    tx.commit()?;

    db::log_event(
        conn,
        "handshake_created",
        "handshake",
        &handshake_id.to_string(),
        serde_json::json!({
            "bank_id": request.bank_id,
            "invoice_id": request.invoice_id,
            "applied": applied,
            "proxy": proxy,
        }),
        request.created_by.as_deref().unwrap_or("matcher"),
    );

    Ok(handshake_id)
}

/// Delete a handshake, reversing its effects exactly.
///
/// The bank transaction reverts to unmatched only when its LAST handshake
/// goes; the invoice's paid amount is decremented with the same strict rule
/// used on creation, so create-then-delete restores the prior state
/// bit-for-bit. Returns Ok(false) when the handshake does not exist.
pub fn delete_handshake(conn: &mut Connection, handshake_id: i64) -> Result<bool> {
    let tx = conn.transaction()?;

    let row: Option<(i64, i64, f64, f64)> = tx
        .query_row(
            "SELECT bank_id, invoice_id, bank_amount_applied, proxy_amount
             FROM handshakes WHERE handshake_id = ?1",
            params![handshake_id],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
        )
        .optional()?;

    let (bank_id, invoice_id, applied, proxy) = match row {
        Some(values) => values,
        None => return Ok(false),
    };
    let total_applied = applied + proxy;

    tx.execute(
        "DELETE FROM handshakes WHERE handshake_id = ?1",
        params![handshake_id],
    )?;

    let remaining: i64 = tx.query_row(
        "SELECT COUNT(*) FROM handshakes WHERE bank_id = ?1",
        params![bank_id],
        |row| row.get(0),
    )?;
    if remaining == 0 {
        tx.execute(
            "UPDATE bank_transactions SET is_matched = 0 WHERE bank_id = ?1",
            params![bank_id],
        )?;
    }

    tx.execute(
        "UPDATE invoices
         SET paid_amount = paid_amount - ?1,
             balance_remaining = total_gross - (paid_amount - ?1),
             is_paid = CASE WHEN paid_amount - ?1 >= total_gross THEN 1 ELSE 0 END
         WHERE invoice_id = ?2",
        params![total_applied, invoice_id],
    )?;

    tx.commit()?;

    db::log_event(
        conn,
        "handshake_deleted",
        "handshake",
        &handshake_id.to_string(),
        serde_json::json!({
            "bank_id": bank_id,
            "invoice_id": invoice_id,
            "reversed": total_applied,
        }),
        "matcher",
    );

    Ok(true)
}

/// Apply one bank payment across several invoices, in order.
///
/// Each invoice receives min(remaining bank amount, invoice total); the
/// remaining amount shrinks after each application. The proxy adjustment is
/// a single delta for the whole payment and attaches to the FIRST invoice
/// only. Returns the created handshake ids.
pub fn split_match(
    conn: &mut Connection,
    bank_id: i64,
    invoice_ids: &[i64],
    proxy: f64,
    note: Option<&str>,
    created_by: Option<&str>,
) -> Result<Vec<i64>> {
    let bank = db::load_bank_transaction(conn, bank_id)?
        .with_context(|| format!("Bank transaction {} not found", bank_id))?;

    let mut remaining = bank.amount;
    let mut created = Vec::with_capacity(invoice_ids.len());

    for (idx, &invoice_id) in invoice_ids.iter().enumerate() {
        let invoice = db::load_invoice(conn, invoice_id)?
            .with_context(|| format!("Invoice {} not found", invoice_id))?;

        let applied = remaining.min(invoice.total_gross);
        let this_proxy = if idx == 0 { proxy } else { 0.0 };

        let handshake_id = create_handshake(
            conn,
            &HandshakeRequest {
                bank_id,
                invoice_id,
                applied,
                proxy: this_proxy,
                note: note.map(|n| n.to_string()),
                created_by: created_by.map(|c| c.to_string()),
            },
        )?;

        remaining -= applied;
        created.push(handshake_id);
    }

    Ok(created)
}

/// Repair path: rebuild an invoice's derived fields from its handshake rows.
///
/// The hot path maintains paid_amount incrementally; this recomputes it from
/// scratch for tests and maintenance. Returns Ok(false) when the invoice
/// does not exist.
pub fn recompute_invoice_totals(conn: &mut Connection, invoice_id: i64) -> Result<bool> {
    let tx = conn.transaction()?;

    let applied: f64 = tx.query_row(
        "SELECT COALESCE(SUM(bank_amount_applied + proxy_amount), 0.0)
         FROM handshakes WHERE invoice_id = ?1",
        params![invoice_id],
        |row| row.get(0),
    )?;

    let updated = tx.execute(
        "UPDATE invoices
         SET paid_amount = ?1,
             balance_remaining = total_gross - ?1,
             is_paid = CASE WHEN ?1 >= total_gross THEN 1 ELSE 0 END
         WHERE invoice_id = ?2",
        params![applied, invoice_id],
    )?;

    tx.commit()?;

    Ok(updated > 0)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{
        create_bank_transaction, create_invoice, init_db, load_bank_transaction,
        load_handshakes, load_invoice, BankTransaction, Invoice,
    };

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        init_db(&conn).unwrap();
        conn
    }

    fn add_bank(conn: &Connection, amount: f64, description: &str) -> i64 {
        let tx = BankTransaction {
            date: "2025-07-18".to_string(),
            description: description.to_string(),
            paid_in: amount.max(0.0),
            paid_out: (-amount).max(0.0),
            amount,
            currency: "GBP".to_string(),
            ..BankTransaction::default()
        };
        create_bank_transaction(conn, &tx).unwrap()
    }

    fn add_invoice(conn: &mut Connection, number: &str, gross: f64) -> i64 {
        let invoice = Invoice {
            invoice_number: number.to_string(),
            currency: "GBP".to_string(),
            total_net: gross,
            total_gross: gross,
            ..Invoice::default()
        };
        create_invoice(conn, &invoice, &[]).unwrap()
    }

    #[test]
    fn test_create_handshake_updates_both_sides() {
        let mut conn = test_conn();
        let bank_id = add_bank(&conn, 1000.0, "ATA INV-1");
        let invoice_id = add_invoice(&mut conn, "INV-1", 1000.0);

        let handshake_id = create_handshake(
            &mut conn,
            &HandshakeRequest {
                bank_id,
                invoice_id,
                applied: 1000.0,
                proxy: 0.0,
                note: None,
                created_by: Some("tester".to_string()),
            },
        )
        .unwrap();
        assert!(handshake_id > 0);

        let bank = load_bank_transaction(&conn, bank_id).unwrap().unwrap();
        assert!(bank.is_matched);

        let invoice = load_invoice(&conn, invoice_id).unwrap().unwrap();
        assert_eq!(invoice.paid_amount, 1000.0);
        assert_eq!(invoice.balance_remaining, 0.0);
        assert!(invoice.is_paid);
    }

    #[test]
    fn test_create_then_delete_is_exact_inverse() {
        let mut conn = test_conn();
        let bank_id = add_bank(&conn, 700.0, "partial payment");
        let invoice_id = add_invoice(&mut conn, "INV-1", 1000.0);

        // includes a negative proxy
        for (applied, proxy) in [(700.0, 0.0), (700.0, 300.0), (700.0, -50.0)] {
            let before = load_invoice(&conn, invoice_id).unwrap().unwrap();

            let handshake_id = create_handshake(
                &mut conn,
                &HandshakeRequest {
                    bank_id,
                    invoice_id,
                    applied,
                    proxy,
                    ..HandshakeRequest::default()
                },
            )
            .unwrap();

            let deleted = delete_handshake(&mut conn, handshake_id).unwrap();
            assert!(deleted);

            let after = load_invoice(&conn, invoice_id).unwrap().unwrap();
            assert_eq!(after.paid_amount, before.paid_amount);
            assert_eq!(after.balance_remaining, before.balance_remaining);
            assert_eq!(after.is_paid, before.is_paid);

            let bank = load_bank_transaction(&conn, bank_id).unwrap().unwrap();
            assert!(!bank.is_matched, "bank reverts once its last handshake goes");
        }
    }

    #[test]
    fn test_bank_stays_matched_until_last_handshake_removed() {
        let mut conn = test_conn();
        let bank_id = add_bank(&conn, 5000.0, "covers two invoices");
        let inv_a = add_invoice(&mut conn, "INV-A", 3000.0);
        let inv_b = add_invoice(&mut conn, "INV-B", 2000.0);

        let h1 = create_handshake(
            &mut conn,
            &HandshakeRequest {
                bank_id,
                invoice_id: inv_a,
                applied: 3000.0,
                ..HandshakeRequest::default()
            },
        )
        .unwrap();
        let h2 = create_handshake(
            &mut conn,
            &HandshakeRequest {
                bank_id,
                invoice_id: inv_b,
                applied: 2000.0,
                ..HandshakeRequest::default()
            },
        )
        .unwrap();

        delete_handshake(&mut conn, h1).unwrap();
        let bank = load_bank_transaction(&conn, bank_id).unwrap().unwrap();
        assert!(bank.is_matched, "one handshake still references the payment");

        delete_handshake(&mut conn, h2).unwrap();
        let bank = load_bank_transaction(&conn, bank_id).unwrap().unwrap();
        assert!(!bank.is_matched);
    }

    #[test]
    fn test_delete_missing_handshake_is_benign() {
        let mut conn = test_conn();
        assert!(!delete_handshake(&mut conn, 424242).unwrap());
    }

    #[test]
    fn test_create_against_missing_invoice_rolls_back() {
        let mut conn = test_conn();
        let bank_id = add_bank(&conn, 1000.0, "orphan payment");

        let result = create_handshake(
            &mut conn,
            &HandshakeRequest {
                bank_id,
                invoice_id: 999,
                applied: 1000.0,
                ..HandshakeRequest::default()
            },
        );
        assert!(result.is_err());

        // nothing committed: no handshake row, bank still unmatched
        assert!(load_handshakes(&conn, Some(bank_id), None).unwrap().is_empty());
        let bank = load_bank_transaction(&conn, bank_id).unwrap().unwrap();
        assert!(!bank.is_matched);
    }

    #[test]
    fn test_split_match_conserves_bank_amount() {
        let mut conn = test_conn();
        let bank_id = add_bank(&conn, 5000.0, "one payment, two invoices");
        let inv_a = add_invoice(&mut conn, "INV-A", 3000.0);
        let inv_b = add_invoice(&mut conn, "INV-B", 2000.0);

        let created =
            split_match(&mut conn, bank_id, &[inv_a, inv_b], 0.0, None, Some("User")).unwrap();
        assert_eq!(created.len(), 2);

        let handshakes = load_handshakes(&conn, Some(bank_id), None).unwrap();
        let mut applied: Vec<f64> = handshakes.iter().map(|h| h.bank_amount_applied).collect();
        applied.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_eq!(applied, vec![2000.0, 3000.0]);

        let total: f64 = handshakes.iter().map(|h| h.bank_amount_applied).sum();
        assert_eq!(total, 5000.0, "applied amounts sum to the bank amount");

        for invoice_id in [inv_a, inv_b] {
            let invoice = load_invoice(&conn, invoice_id).unwrap().unwrap();
            assert!(invoice.is_paid);
            assert_eq!(invoice.balance_remaining, 0.0);
        }
    }

    #[test]
    fn test_split_match_proxy_goes_to_first_invoice_only() {
        let mut conn = test_conn();
        let bank_id = add_bank(&conn, 4950.0, "short by FX fee");
        let inv_a = add_invoice(&mut conn, "INV-A", 3000.0);
        let inv_b = add_invoice(&mut conn, "INV-B", 2000.0);

        split_match(&mut conn, bank_id, &[inv_a, inv_b], 50.0, Some("FX"), None).unwrap();

        let first = load_handshakes(&conn, None, Some(inv_a)).unwrap();
        let second = load_handshakes(&conn, None, Some(inv_b)).unwrap();
        assert_eq!(first[0].proxy_amount, 50.0);
        assert_eq!(second[0].proxy_amount, 0.0);

        // invoice A gets min(4950, 3000) = 3000; B gets min(1950, 2000) = 1950
        assert_eq!(first[0].bank_amount_applied, 3000.0);
        assert_eq!(second[0].bank_amount_applied, 1950.0);
    }

    #[test]
    fn test_strict_is_paid_rule_inside_engine() {
        let mut conn = test_conn();
        let bank_id = add_bank(&conn, 999.995, "a hair short");
        let invoice_id = add_invoice(&mut conn, "INV-1", 1000.0);

        create_handshake(
            &mut conn,
            &HandshakeRequest {
                bank_id,
                invoice_id,
                applied: 999.995,
                ..HandshakeRequest::default()
            },
        )
        .unwrap();

        // strictly below total, so not paid here; display-time
        // classification with tolerance is the settlement module's job
        let invoice = load_invoice(&conn, invoice_id).unwrap().unwrap();
        assert!(!invoice.is_paid);
    }

    #[test]
    fn test_non_finite_amounts_are_coerced_to_zero() {
        let mut conn = test_conn();
        let bank_id = add_bank(&conn, 1000.0, "bad input");
        let invoice_id = add_invoice(&mut conn, "INV-1", 1000.0);

        create_handshake(
            &mut conn,
            &HandshakeRequest {
                bank_id,
                invoice_id,
                applied: f64::NAN,
                proxy: f64::INFINITY,
                ..HandshakeRequest::default()
            },
        )
        .unwrap();

        let invoice = load_invoice(&conn, invoice_id).unwrap().unwrap();
        assert_eq!(invoice.paid_amount, 0.0);
        assert_eq!(invoice.balance_remaining, 1000.0);
    }

    #[test]
    fn test_recompute_invoice_totals_repairs_drift() {
        let mut conn = test_conn();
        let bank_id = add_bank(&conn, 600.0, "payment");
        let invoice_id = add_invoice(&mut conn, "INV-1", 1000.0);

        create_handshake(
            &mut conn,
            &HandshakeRequest {
                bank_id,
                invoice_id,
                applied: 600.0,
                ..HandshakeRequest::default()
            },
        )
        .unwrap();

        // simulate drift from a partial failure
        conn.execute(
            "UPDATE invoices SET paid_amount = 9999, balance_remaining = -8999, is_paid = 1
             WHERE invoice_id = ?1",
            params![invoice_id],
        )
        .unwrap();

        assert!(recompute_invoice_totals(&mut conn, invoice_id).unwrap());

        let invoice = load_invoice(&conn, invoice_id).unwrap().unwrap();
        assert_eq!(invoice.paid_amount, 600.0);
        assert_eq!(invoice.balance_remaining, 400.0);
        assert!(!invoice.is_paid);

        assert!(!recompute_invoice_totals(&mut conn, 999).unwrap());
    }
}
