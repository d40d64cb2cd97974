// Invoice importer.
//
// Two input shapes exist in the wild:
//
//   Long format: every row is one line item, rows sharing an invoice number
//   belong to one invoice:
//     InvoiceNumber | Contract Number | AccountCode | Net  | VAT | Gross
//     ARC/I25-001   | 910516          | Booking Fee | 500  | 0   | 500
//     ARC/I25-001   | 910516          | Artist Fee  | 2000 | 0   | 2000
//
//   Simple format: one row per invoice with a single Value column; the
//   importer synthesizes one "Invoice Total" line item per row.
//
// Header totals are ALWAYS summed from the grouped line items, never read
// from a total column in the source, so header and lines cannot drift.

use anyhow::Result;
use rusqlite::Connection;
use std::collections::HashMap;
use std::path::Path;

use crate::config::Config;
use crate::db::{self, Invoice, InvoiceItem};
use crate::importers::{new_batch_id, ImportOutcome, ImportSummary};
use crate::ingest::{coerce_amount, coerce_text, resolve_fields, Sheet};

/// Account code stamped on the synthetic line item of a simple-format row.
const SIMPLE_FORMAT_ACCOUNT_CODE: &str = "Invoice Total";

const INVOICE_FIELDS: [(&str, &[&str]); 15] = [
    ("invoice_number", &["invoice number", "invoice", "inv", "invoicenumber"]),
    ("contract_number", &["contract number", "contract", "booking id"]),
    ("from_entity", &["from entity", "from", "sender", "company"]),
    ("promoter_name", &["contact", "promoter", "client", "contact name", "customer"]),
    ("payment_bank_details", &["payment bank details", "pay to", "bank details"]),
    ("reference", &["reference", "event", "ref"]),
    ("description", &["description", "line description", "item description"]),
    ("currency", &["currency", "ccy", "curr"]),
    ("account_code", &["accountcode", "account code", "item type", "account_code"]),
    ("net", &["net amount", "net", "nett"]),
    ("vat", &["vat amount", "vat", "tax"]),
    ("gross", &["gross amount", "gross"]),
    ("value", &["value", "amount", "total"]),
    ("invoice_date", &["invoice date", "date", "inv date"]),
    ("show_date", &["show date", "event date", "performance date"]),
];

/// Which input shape to parse. Auto keeps the column-presence heuristic
/// (value column without an account-code column means simple); pass Simple
/// or Long explicitly when an export is ambiguous.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InvoiceFormat {
    #[default]
    Auto,
    Simple,
    Long,
}

struct InvoiceGroup {
    invoice: Invoice,
    items: Vec<InvoiceItem>,
}

pub struct InvoiceImporter {
    config: Config,
    format: InvoiceFormat,
    batch_id: String,
    errors: Vec<String>,
    skipped: Vec<String>,
    duplicates: Vec<String>,
}

impl InvoiceImporter {
    pub fn new(config: Config) -> Self {
        Self::with_format(config, InvoiceFormat::Auto)
    }

    pub fn with_format(config: Config, format: InvoiceFormat) -> Self {
        InvoiceImporter {
            config,
            format,
            batch_id: new_batch_id(),
            errors: Vec::new(),
            skipped: Vec::new(),
            duplicates: Vec::new(),
        }
    }

    pub fn batch_id(&self) -> &str {
        &self.batch_id
    }

    pub fn import_path(&mut self, conn: &mut Connection, path: &Path) -> Result<ImportOutcome> {
        let sheet = match Sheet::from_path(path) {
            Ok(sheet) => sheet,
            Err(err) => return Ok(ImportOutcome::failure(format!("Import error: {:#}", err))),
        };

        self.import_sheet(conn, &sheet)
    }

    pub fn import_sheet(&mut self, conn: &mut Connection, sheet: &Sheet) -> Result<ImportOutcome> {
        let groups = match self.group_rows(sheet) {
            Some(groups) => groups,
            None => return Ok(ImportOutcome::failure(self.errors.join("; "))),
        };

        if groups.is_empty() {
            return Ok(ImportOutcome::failure("No valid invoices found in CSV"));
        }

        let mut invoice_count = 0usize;
        let mut item_count = 0usize;

        for group in groups {
            if db::invoice_exists(conn, &group.invoice.invoice_number)? {
                self.duplicates.push(group.invoice.invoice_number.clone());
                continue;
            }

            let mut invoice = group.invoice;

            // Best-effort show attachment via the contract number; absence of
            // a matching show is not an error.
            if let Some(contract_number) = invoice.contract_number.clone() {
                if let Some(show) = db::find_show_by_contract(conn, &contract_number)? {
                    invoice.show_id = Some(show.show_id);
                }
            }

            db::create_invoice(conn, &invoice, &group.items)?;
            invoice_count += 1;
            item_count += group.items.len();
        }

        if invoice_count > 0 {
            db::log_event(
                conn,
                "invoice_import",
                "import_batch",
                &self.batch_id,
                serde_json::json!({
                    "invoices": invoice_count,
                    "line_items": item_count,
                    "duplicates": self.duplicates.len(),
                }),
                "invoice_importer",
            );
        }

        let mut message_parts = vec![format!(
            "Imported {} invoices with {} line items",
            invoice_count, item_count
        )];
        if !self.duplicates.is_empty() {
            message_parts.push(format!("{} duplicates skipped", self.duplicates.len()));
        }
        if !self.skipped.is_empty() {
            message_parts.push(format!("{} rows skipped", self.skipped.len()));
        }

        Ok(ImportOutcome {
            success: true,
            message: message_parts.join(" | "),
            imported: invoice_count,
        })
    }

    /// Group the sheet's rows into invoice accumulators, preserving first-seen
    /// order. Returns None when a required column is missing.
    fn group_rows(&mut self, sheet: &Sheet) -> Option<Vec<InvoiceGroup>> {
        let cols = resolve_fields(&sheet.headers, &INVOICE_FIELDS);

        if !cols.contains_key("invoice_number") {
            self.errors
                .push("Missing required column: Invoice Number".to_string());
            return None;
        }

        let is_simple = match self.format {
            InvoiceFormat::Simple => true,
            InvoiceFormat::Long => false,
            InvoiceFormat::Auto => {
                cols.contains_key("value") && !cols.contains_key("account_code")
            }
        };

        if is_simple {
            if !cols.contains_key("value") {
                self.errors
                    .push("Missing required column: Value (for simple format)".to_string());
                return None;
            }
        } else {
            if !cols.contains_key("account_code") {
                self.errors
                    .push("Missing required column: Account Code (for long format)".to_string());
                return None;
            }
            if !cols.contains_key("gross") {
                self.errors
                    .push("Missing required column: Gross Amount (for long format)".to_string());
                return None;
            }
        }

        let mut order: Vec<String> = Vec::new();
        let mut groups: HashMap<String, InvoiceGroup> = HashMap::new();

        for (idx, row) in sheet.rows.iter().enumerate() {
            let row_num = idx + 2;

            let invoice_number = match self.text(sheet, row, &cols, "invoice_number") {
                Some(number) => number,
                None => {
                    self.skipped
                        .push(format!("Row {}: No invoice number", row_num));
                    continue;
                }
            };

            if is_simple {
                let value = sheet
                    .cell(row, cols.get("value").copied())
                    .map(coerce_amount)
                    .unwrap_or(0.0);
                if value.abs() < f64::EPSILON {
                    self.skipped.push(format!("Row {}: No value", row_num));
                    continue;
                }

                let description = self.text(sheet, row, &cols, "description");

                let mut invoice = self.header_from_row(sheet, row, &cols, &invoice_number);
                // simple format has no separate reference column worth keeping
                invoice.reference = description.clone();

                order.retain(|n| n != &invoice_number);
                order.push(invoice_number.clone());
                groups.insert(
                    invoice_number,
                    InvoiceGroup {
                        invoice,
                        items: vec![InvoiceItem {
                            item_id: 0,
                            invoice_id: 0,
                            account_code: SIMPLE_FORMAT_ACCOUNT_CODE.to_string(),
                            description,
                            net: value,
                            vat: 0.0,
                            gross: value,
                        }],
                    },
                );
                continue;
            }

            // Long format: every row with an account code is one line item
            let account_code = match self.text(sheet, row, &cols, "account_code") {
                Some(code) => code,
                None => {
                    self.skipped
                        .push(format!("Row {}: No account code", row_num));
                    continue;
                }
            };

            if !groups.contains_key(&invoice_number) {
                let invoice = self.header_from_row(sheet, row, &cols, &invoice_number);
                order.push(invoice_number.clone());
                groups.insert(
                    invoice_number.clone(),
                    InvoiceGroup {
                        invoice,
                        items: Vec::new(),
                    },
                );
            }

            let item = InvoiceItem {
                item_id: 0,
                invoice_id: 0,
                account_code,
                description: self.text(sheet, row, &cols, "description"),
                net: self.amount(sheet, row, &cols, "net"),
                vat: self.amount(sheet, row, &cols, "vat"),
                gross: self.amount(sheet, row, &cols, "gross"),
            };

            if let Some(group) = groups.get_mut(&invoice_number) {
                group.items.push(item);
            }
        }

        // Header totals come from the line items, never from the source
        let mut result = Vec::new();
        for invoice_number in order {
            if let Some(mut group) = groups.remove(&invoice_number) {
                if group.items.is_empty() {
                    continue;
                }
                group.invoice.total_gross = group.items.iter().map(|i| i.gross).sum();
                group.invoice.total_net = group.items.iter().map(|i| i.net).sum();
                group.invoice.total_vat = group.items.iter().map(|i| i.vat).sum();
                result.push(group);
            }
        }

        Some(result)
    }

    fn header_from_row(
        &self,
        sheet: &Sheet,
        row: &[String],
        cols: &HashMap<&'static str, usize>,
        invoice_number: &str,
    ) -> Invoice {
        Invoice {
            invoice_id: 0,
            invoice_number: invoice_number.to_string(),
            contract_number: self.text(sheet, row, cols, "contract_number"),
            show_id: None,
            from_entity: self.text(sheet, row, cols, "from_entity"),
            promoter_name: self.text(sheet, row, cols, "promoter_name"),
            payment_bank_details: self.text(sheet, row, cols, "payment_bank_details"),
            reference: self.text(sheet, row, cols, "reference"),
            currency: self
                .config
                .normalize_currency(sheet.cell(row, cols.get("currency").copied())),
            total_net: 0.0,
            total_vat: 0.0,
            total_gross: 0.0,
            invoice_date: self.text(sheet, row, cols, "invoice_date"),
            show_date: self.text(sheet, row, cols, "show_date"),
            is_paid: false,
            paid_amount: 0.0,
            balance_remaining: 0.0,
            import_batch: Some(self.batch_id.clone()),
            imported_at: None,
        }
    }

    fn text(
        &self,
        sheet: &Sheet,
        row: &[String],
        cols: &HashMap<&'static str, usize>,
        field: &str,
    ) -> Option<String> {
        sheet
            .cell(row, cols.get(field).copied())
            .and_then(coerce_text)
    }

    fn amount(
        &self,
        sheet: &Sheet,
        row: &[String],
        cols: &HashMap<&'static str, usize>,
        field: &str,
    ) -> f64 {
        sheet
            .cell(row, cols.get(field).copied())
            .map(coerce_amount)
            .unwrap_or(0.0)
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
