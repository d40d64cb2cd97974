// Bank statement importer.
//
// Input shape (HSBC-style export, but column names vary by exporter):
//   Date,Type,Description,Paid Out,Paid In,Currency
//   2025-07-18,CR,F&B OPERATING ACC ATA INV-16496,,9800,GBP
//   2025-10-03,,St Martins Place,800,,GBP
//
// Each line becomes one BankTransaction with a signed net amount
// (paid_in - paid_out). Duplicate suppression is fingerprint-based, so
// re-importing the same statement is a no-op.

use anyhow::Result;
use rusqlite::Connection;
use std::path::Path;

use crate::config::Config;
use crate::db::{self, BankTransaction};
use crate::fingerprint::bank_fingerprint;
use crate::importers::{new_batch_id, truncate_desc, ImportOutcome, ImportSummary};
use crate::ingest::{coerce_amount, coerce_text, resolve_column, Sheet};

const DATE_NAMES: [&str; 3] = ["date", "transaction date", "txn date"];
const DESC_NAMES: [&str; 4] = ["description", "narrative", "details", "reference"];
const TYPE_NAMES: [&str; 3] = ["type", "transaction type", "txn type"];
const CREDIT_NAMES: [&str; 4] = ["paid in", "credit", "cr", "amount in"];
const DEBIT_NAMES: [&str; 4] = ["paid out", "debit", "dr", "amount out"];
const CURRENCY_NAMES: [&str; 3] = ["currency", "ccy", "curr"];

pub struct BankImporter {
    config: Config,
    batch_id: String,
    errors: Vec<String>,
    skipped: Vec<String>,
    duplicates: Vec<String>,
}

impl BankImporter {
    pub fn new(config: Config) -> Self {
        BankImporter {
            config,
            batch_id: new_batch_id(),
            errors: Vec::new(),
            skipped: Vec::new(),
            duplicates: Vec::new(),
        }
    }

    pub fn batch_id(&self) -> &str {
        &self.batch_id
    }

    /// Import a statement CSV from disk.
    pub fn import_path(&mut self, conn: &mut Connection, path: &Path) -> Result<ImportOutcome> {
        let sheet = match Sheet::from_path(path) {
            Ok(sheet) => sheet,
            Err(err) => return Ok(ImportOutcome::failure(format!("Import error: {:#}", err))),
        };

        self.import_sheet(conn, &sheet)
    }

    /// Import an already-loaded statement sheet.
    ///
    /// Row-level problems accumulate into the summary lists and never abort
    /// the run. A missing required column aborts before any insert. Err is
    /// reserved for storage failures.
    pub fn import_sheet(&mut self, conn: &mut Connection, sheet: &Sheet) -> Result<ImportOutcome> {
        let staged = match self.stage_rows(conn, sheet)? {
            Some(rows) => rows,
            // required column missing; reported through `errors`
            None => return Ok(ImportOutcome::failure(self.errors.join("; "))),
        };

        let mut message_parts = Vec::new();
        if !self.errors.is_empty() {
            message_parts.push(format!("{} errors", self.errors.len()));
        }
        if !self.skipped.is_empty() {
            message_parts.push(format!("{} skipped", self.skipped.len()));
        }
        if !self.duplicates.is_empty() {
            message_parts.push(format!("{} duplicates", self.duplicates.len()));
        }

        if staged.is_empty() {
            let message = if message_parts.is_empty() {
                "No valid transactions found in CSV".to_string()
            } else {
                format!("No new transactions. {}", message_parts.join(", "))
            };
            return Ok(ImportOutcome {
                success: false,
                message,
                imported: 0,
            });
        }

        // Bulk insert: the whole staged batch lands or none of it does.
        let tx = conn.transaction()?;
        for record in &staged {
            db::create_bank_transaction(&tx, record)?;
        }
        tx.commit()?;

        db::log_event(
            conn,
            "bank_import",
            "import_batch",
            &self.batch_id,
            serde_json::json!({
                "imported": staged.len(),
                "skipped": self.skipped.len(),
                "duplicates": self.duplicates.len(),
            }),
            "bank_importer",
        );

        let mut message = format!("Imported {} transactions", staged.len());
        if !message_parts.is_empty() {
            message.push_str(&format!(" ({})", message_parts.join(", ")));
        }

        Ok(ImportOutcome {
            success: true,
            message,
            imported: staged.len(),
        })
    }

    /// Resolve columns and turn valid rows into persistence-ready records.
    /// Returns None when a required column is missing.
    fn stage_rows(
        &mut self,
        conn: &Connection,
        sheet: &Sheet,
    ) -> Result<Option<Vec<BankTransaction>>> {
        let date_col = resolve_column(&sheet.headers, &DATE_NAMES);
        let desc_col = resolve_column(&sheet.headers, &DESC_NAMES);
        let type_col = resolve_column(&sheet.headers, &TYPE_NAMES);
        let credit_col = resolve_column(&sheet.headers, &CREDIT_NAMES);
        let debit_col = resolve_column(&sheet.headers, &DEBIT_NAMES);
        let currency_col = resolve_column(&sheet.headers, &CURRENCY_NAMES);

        if date_col.is_none() {
            self.errors.push("Missing required column: Date".to_string());
            return Ok(None);
        }
        if desc_col.is_none() {
            self.errors
                .push("Missing required column: Description".to_string());
            return Ok(None);
        }

        let mut staged = Vec::new();

        for (idx, row) in sheet.rows.iter().enumerate() {
            // +2: one for the header row, one for 1-based numbering
            let row_num = idx + 2;

            let date = match sheet.cell(row, date_col).and_then(coerce_text) {
                Some(date) => date,
                None => {
                    self.skipped.push(format!("Row {}: Empty date", row_num));
                    continue;
                }
            };

            let description = match sheet.cell(row, desc_col).and_then(coerce_text) {
                Some(desc) => desc,
                None => {
                    self.skipped
                        .push(format!("Row {}: Empty description", row_num));
                    continue;
                }
            };

            let tx_type = sheet.cell(row, type_col).and_then(coerce_text);

            // Credit = money in, debit = money out, net amount is signed
            let credit = sheet.cell(row, credit_col).map(coerce_amount).unwrap_or(0.0);
            let debit = sheet.cell(row, debit_col).map(coerce_amount).unwrap_or(0.0);
            let amount = credit - debit;

            if amount.abs() < self.config.amount_tolerance {
                self.skipped.push(format!("Row {}: Zero amount", row_num));
                continue;
            }

            let currency = self
                .config
                .normalize_currency(sheet.cell(row, currency_col));

            let fingerprint = bank_fingerprint(&date, amount, &description);
            if db::bank_transaction_exists(conn, &fingerprint)? {
                self.duplicates
                    .push(format!("Row {}: {}", row_num, truncate_desc(&description, 30)));
                continue;
            }

            staged.push(BankTransaction {
                bank_id: 0,
                date,
                tx_type,
                description,
                paid_out: debit,
                paid_in: credit,
                amount,
                currency,
                transaction_hash: Some(fingerprint),
                is_matched: false,
                show_id: None,
                import_batch: Some(self.batch_id.clone()),
                imported_at: None,
            });
        }

        Ok(Some(staged))
    }

    pub fn summary(&self) -> ImportSummary {
        ImportSummary {
            batch_id: self.batch_id.clone(),
            errors: self.errors.clone(),
            skipped: self.skipped.clone(),
            duplicates: self.duplicates.clone(),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{init_db, load_bank_transactions, BankQuery};

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        init_db(&conn).unwrap();
        conn
    }

    fn statement_sheet() -> Sheet {
        Sheet::from_rows(
            &["Date", "Type", "Description", "Paid Out", "Paid In", "Currency"],
            &[
                &["2025-07-18", "CR", "F&B OPERATING ACC ATA INV-16496", "", "9800", "GBP"],
                &["2025-10-03", "", "St Martins Place", "800", "", "GBP"],
                &["2025-10-04", "", "", "", "120", "GBP"],
                &["2025-10-05", "", "Zero noise row", "", "", "GBP"],
            ],
        )
    }

    #[test]
    fn test_import_counts_and_amounts() {
        let mut conn = test_conn();
        let mut importer = BankImporter::new(Config::new());

        let outcome = importer.import_sheet(&mut conn, &statement_sheet()).unwrap();
        assert!(outcome.success, "{}", outcome.message);
        assert_eq!(outcome.imported, 2);

        let summary = importer.summary();
        assert_eq!(summary.skipped_count(), 2); // empty description + zero amount
        assert_eq!(summary.duplicate_count(), 0);

        let all = load_bank_transactions(&conn, &BankQuery::default()).unwrap();
        assert_eq!(all.len(), 2);

        let credit = all.iter().find(|t| t.amount > 0.0).unwrap();
        assert_eq!(credit.amount, 9800.0);
        assert_eq!(credit.paid_in, 9800.0);
        assert!(credit.transaction_hash.is_some());
        assert!(credit.import_batch.is_some());

        let debit = all.iter().find(|t| t.amount < 0.0).unwrap();
        assert_eq!(debit.amount, -800.0);
    }

    #[test]
    fn test_import_twice_is_idempotent() {
        let mut conn = test_conn();

        let mut first = BankImporter::new(Config::new());
        let outcome1 = first.import_sheet(&mut conn, &statement_sheet()).unwrap();
        assert_eq!(outcome1.imported, 2);

        let mut second = BankImporter::new(Config::new());
        let outcome2 = second.import_sheet(&mut conn, &statement_sheet()).unwrap();
        assert!(!outcome2.success);
        assert_eq!(outcome2.imported, 0);
        assert_eq!(second.summary().duplicate_count(), 2);

        let all = load_bank_transactions(&conn, &BankQuery::default()).unwrap();
        assert_eq!(all.len(), 2, "second run must insert nothing");
    }

    #[test]
    fn test_missing_required_column_aborts_before_writes() {
        let mut conn = test_conn();
        let mut importer = BankImporter::new(Config::new());

        let sheet = Sheet::from_rows(
            &["Description", "Paid In"],
            &[&["Payment from promoter", "1000"]],
        );

        let outcome = importer.import_sheet(&mut conn, &sheet).unwrap();
        assert!(!outcome.success);
        assert!(outcome.message.contains("Missing required column: Date"));

        let all = load_bank_transactions(&conn, &BankQuery::default()).unwrap();
        assert!(all.is_empty(), "no partial state on structural failure");
    }

    #[test]
    fn test_variant_column_names_resolve() {
        let mut conn = test_conn();
        let mut importer = BankImporter::new(Config::new());

        let sheet = Sheet::from_rows(
            &["Transaction Date", "Narrative", "Credit", "Debit"],
            &[&["2025-07-18", "ATA INV-16496", "9800", ""]],
        );

        let outcome = importer.import_sheet(&mut conn, &sheet).unwrap();
        assert!(outcome.success, "{}", outcome.message);
        assert_eq!(outcome.imported, 1);

        let all = load_bank_transactions(&conn, &BankQuery::default()).unwrap();
        assert_eq!(all[0].amount, 9800.0);
        assert_eq!(all[0].currency, "GBP"); // no currency column -> default
    }

    #[test]
    fn test_unknown_currency_falls_back_to_default() {
        let mut conn = test_conn();
        let mut importer = BankImporter::new(Config::new());

        let sheet = Sheet::from_rows(
            &["Date", "Description", "Paid In", "Currency"],
            &[
                &["2025-07-18", "EUR payment", "500", "eur"],
                &["2025-07-19", "Peso payment", "600", "MXN"],
            ],
        );

        importer.import_sheet(&mut conn, &sheet).unwrap();

        let all = load_bank_transactions(&conn, &BankQuery::default()).unwrap();
        let eur = all.iter().find(|t| t.description.contains("EUR")).unwrap();
        let mxn = all.iter().find(|t| t.description.contains("Peso")).unwrap();
        assert_eq!(eur.currency, "EUR");
        assert_eq!(mxn.currency, "GBP");
    }
}
