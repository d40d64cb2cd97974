// Showledger - reconciliation core for a talent-booking agency
// Exposes all modules for use in the CLI and tests

pub mod config;
pub mod db;
pub mod fingerprint;
pub mod importers;
pub mod ingest;
pub mod matching;
pub mod settlement;

// Re-export commonly used types
pub use config::Config;
pub use db::{
    bank_batch_stats, bank_transaction_exists, contract_exists, create_bank_transaction,
    create_contract, create_invoice, create_outgoing_payment, create_show,
    find_show_by_contract, init_db, insert_event, invoice_exists, link_contract_to_show,
    link_outgoing_payment_to_bank, load_bank_transaction, load_bank_transactions,
    load_contracts, load_events_for_entity, load_handshakes, load_invoice,
    load_invoice_items, load_invoices, load_outgoing_payments, load_settlement,
    load_settlements, load_show, load_shows, update_show, update_show_status, BankQuery,
    BankTransaction, BatchStat, Contract, Event, Handshake, Invoice, InvoiceItem,
    InvoiceQuery, OutgoingPayment, Settlement, Show, ShowQuery,
};
pub use fingerprint::bank_fingerprint;
pub use importers::{
    BankImporter, ContractImporter, ImportOutcome, ImportSummary, InvoiceFormat,
    InvoiceImporter,
};
pub use ingest::{coerce_amount, coerce_int, coerce_text, resolve_column, resolve_fields, Sheet};
pub use matching::{
    create_handshake, delete_handshake, recompute_invoice_totals, split_match, HandshakeRequest,
};
pub use settlement::{
    classify_payment_status, compute_show_settlement, confirm_settlement, create_settlement,
    derive_settlement_status, find_settlement_for_show, invoice_payment_summaries,
    update_settlement_amounts, ArtistStatus, InvoicePaymentSummary, OverallStatus,
    PaymentStatus, PromoterStatus, SettlementStatus, ShowSettlement,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
