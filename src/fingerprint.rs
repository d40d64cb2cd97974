// Duplicate fingerprinting.
//
// Bank statement lines have no business key, so their identity for "has this
// been imported before" is a digest of the defining fields. Contracts and
// invoices carry real business keys (contract number / invoice number) and
// are checked by direct lookup instead; see db::contract_exists and
// db::invoice_exists.

use sha2::{Digest, Sha256};

/// Fingerprint for a bank statement line: SHA-256 over date, signed amount
/// and description joined with a separator. Not a security boundary, just a
/// stable well-distributed key.
pub fn bank_fingerprint(date: &str, amount: f64, description: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("{}|{}|{}", date, amount, description));
    format!("{:x}", hasher.finalize())
}
