// Storage layer: schema, entity structs and queries.
//
// Everything hangs off a SHOW. Contracts, invoices, bank transactions,
// outgoing payments, handshakes and settlements all reference shows(show_id),
// which is what makes per-show settlement aggregation possible.
//
// All mutation helpers here are single-entity. The multi-entity writes
// (handshake create/delete and their derived-field updates) live in the
// matching module, inside explicit transactions.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

/// Current wall-clock timestamp in the format every table stores.
pub(crate) fn now_iso() -> String {
    Utc::now().to_rfc3339()
}

// ============================================================================
// ENTITIES
// ============================================================================

/// The booking anchor. One row per gig; created from a contract import or
/// entered manually, mutated by status transitions, never deleted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Show {
    pub show_id: i64,
    pub contract_number: Option<String>,
    pub agent: Option<String>,
    pub artist: String,
    pub event_name: Option<String>,
    pub venue: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub booking_date: Option<String>,
    pub performance_date: Option<String>,
    pub performance_day: Option<String>,
    pub deal_description: Option<String>,
    pub total_deal_value: f64,
    pub currency: String,
    pub artist_fee: f64,
    pub booking_fee: f64,
    pub hotel_buyout: f64,
    pub flight_buyout: f64,
    pub ground_transport_buyout: f64,
    pub withholding_tax: f64,
    pub net_artist_settlement: f64,
    pub promoter_name: Option<String>,
    pub status: String,
    pub settlement_status: String,
    pub notes: Option<String>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

/// Deal terms of record, unique by contract number. Immutable after import
/// except for the back-link to the show derived from it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Contract {
    pub contract_id: i64,
    pub contract_number: String,
    pub booking_date: Option<String>,
    pub artist: Option<String>,
    pub event_name: Option<String>,
    pub venue: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub performance_date: Option<String>,
    pub performance_day: Option<String>,
    pub deal_description: Option<String>,
    pub total_deal_value: f64,
    pub currency: String,
    pub artist_fee: f64,
    pub booking_fee: f64,
    pub booking_fee_vat: f64,
    pub hotel_buyout: f64,
    pub flight_buyout: f64,
    pub ground_transport_buyout: f64,
    pub withholding_tax: f64,
    pub total_artist_settlement: f64,
    pub import_batch: Option<String>,
    pub imported_at: Option<String>,
    pub show_id: Option<i64>,
}

/// One statement line. Positive amount = money in, negative = money out.
/// `is_matched` is flipped by the matching engine only.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BankTransaction {
    pub bank_id: i64,
    pub date: String,
    pub tx_type: Option<String>,
    pub description: String,
    pub paid_out: f64,
    pub paid_in: f64,
    pub amount: f64,
    pub currency: String,
    pub transaction_hash: Option<String>,
    pub is_matched: bool,
    pub show_id: Option<i64>,
    pub import_batch: Option<String>,
    pub imported_at: Option<String>,
}

/// A bill issued to a promoter, unique by invoice number.
///
/// `paid_amount`, `balance_remaining` and `is_paid` are derived fields
/// maintained incrementally by the matching engine; `balance_remaining =
/// total_gross - paid_amount` holds at all times.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Invoice {
    pub invoice_id: i64,
    pub invoice_number: String,
    pub contract_number: Option<String>,
    pub show_id: Option<i64>,
    pub from_entity: Option<String>,
    pub promoter_name: Option<String>,
    pub payment_bank_details: Option<String>,
    pub reference: Option<String>,
    pub currency: String,
    pub total_net: f64,
    pub total_vat: f64,
    pub total_gross: f64,
    pub invoice_date: Option<String>,
    pub show_date: Option<String>,
    pub is_paid: bool,
    pub paid_amount: f64,
    pub balance_remaining: f64,
    pub import_batch: Option<String>,
    pub imported_at: Option<String>,
}

/// One line on an invoice: account code plus net/vat/gross.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InvoiceItem {
    pub item_id: i64,
    pub invoice_id: i64,
    pub account_code: String,
    pub description: Option<String>,
    pub net: f64,
    pub vat: f64,
    pub gross: f64,
}

/// A payment the agency makes out: artist advance/settlement, hotel,
/// flights, ground transport, production, other.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutgoingPayment {
    pub payment_id: i64,
    pub show_id: Option<i64>,
    pub payment_type: String,
    pub description: Option<String>,
    pub amount: f64,
    pub currency: String,
    pub payment_date: Option<String>,
    pub payee: Option<String>,
    pub bank_reference: Option<String>,
    pub bank_id: Option<i64>,
    pub notes: Option<String>,
    pub created_at: Option<String>,
    pub created_by: Option<String>,
}

/// A match between one bank transaction and one invoice. The applied amount
/// plus the proxy adjustment is what counts toward the invoice.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Handshake {
    pub handshake_id: i64,
    pub bank_id: i64,
    pub invoice_id: i64,
    pub bank_amount_applied: f64,
    pub proxy_amount: f64,
    pub note: Option<String>,
    pub created_at: Option<String>,
    pub created_by: Option<String>,
}

/// Artist payout confirmation record for one show.
/// Status walks Pending -> Partial -> Paid -> Confirmed (terminal).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settlement {
    pub settlement_id: i64,
    pub show_id: i64,
    pub artist: String,
    pub amount_due: f64,
    pub currency: String,
    pub amount_paid: f64,
    pub balance: f64,
    pub status: String,
    pub payment_date: Option<String>,
    pub payment_reference: Option<String>,
    pub payment_method: Option<String>,
    pub confirmed_by: Option<String>,
    pub confirmed_at: Option<String>,
    pub artist_confirmed: bool,
    pub notes: Option<String>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

/// Audit trail entry. Every import batch, handshake mutation and settlement
/// confirmation appends one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub entity_type: String,
    pub entity_id: String,
    pub data: serde_json::Value,
    pub actor: String,
}

// ============================================================================
// SCHEMA
// ============================================================================

pub fn init_db(conn: &Connection) -> Result<()> {
    // WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS shows (
            show_id INTEGER PRIMARY KEY AUTOINCREMENT,
            contract_number TEXT,
            agent TEXT,
            artist TEXT NOT NULL,
            event_name TEXT,
            venue TEXT,
            city TEXT,
            country TEXT,
            booking_date TEXT,
            performance_date TEXT,
            performance_day TEXT,
            deal_description TEXT,
            total_deal_value REAL DEFAULT 0,
            currency TEXT DEFAULT 'GBP',
            artist_fee REAL DEFAULT 0,
            booking_fee REAL DEFAULT 0,
            hotel_buyout REAL DEFAULT 0,
            flight_buyout REAL DEFAULT 0,
            ground_transport_buyout REAL DEFAULT 0,
            withholding_tax REAL DEFAULT 0,
            net_artist_settlement REAL DEFAULT 0,
            promoter_name TEXT,
            status TEXT DEFAULT 'Contracted',
            settlement_status TEXT DEFAULT 'Pending',
            notes TEXT,
            created_at TEXT,
            updated_at TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS contracts (
            contract_id INTEGER PRIMARY KEY AUTOINCREMENT,
            contract_number TEXT NOT NULL UNIQUE,
            booking_date TEXT,
            artist TEXT,
            event_name TEXT,
            venue TEXT,
            city TEXT,
            country TEXT,
            performance_date TEXT,
            performance_day TEXT,
            deal_description TEXT,
            total_deal_value REAL DEFAULT 0,
            currency TEXT DEFAULT 'GBP',
            artist_fee REAL DEFAULT 0,
            booking_fee REAL DEFAULT 0,
            booking_fee_vat REAL DEFAULT 0,
            hotel_buyout REAL DEFAULT 0,
            flight_buyout REAL DEFAULT 0,
            ground_transport_buyout REAL DEFAULT 0,
            withholding_tax REAL DEFAULT 0,
            total_artist_settlement REAL DEFAULT 0,
            import_batch TEXT,
            imported_at TEXT,
            show_id INTEGER,
            FOREIGN KEY(show_id) REFERENCES shows(show_id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS bank_transactions (
            bank_id INTEGER PRIMARY KEY AUTOINCREMENT,
            date TEXT NOT NULL,
            type TEXT,
            description TEXT NOT NULL,
            paid_out REAL DEFAULT 0,
            paid_in REAL DEFAULT 0,
            amount REAL NOT NULL,
            currency TEXT NOT NULL DEFAULT 'GBP',
            transaction_hash TEXT,
            is_matched INTEGER DEFAULT 0,
            show_id INTEGER,
            import_batch TEXT,
            imported_at TEXT,
            FOREIGN KEY(show_id) REFERENCES shows(show_id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS invoices (
            invoice_id INTEGER PRIMARY KEY AUTOINCREMENT,
            invoice_number TEXT NOT NULL UNIQUE,
            contract_number TEXT,
            show_id INTEGER,
            from_entity TEXT,
            promoter_name TEXT,
            payment_bank_details TEXT,
            reference TEXT,
            currency TEXT NOT NULL DEFAULT 'GBP',
            total_net REAL DEFAULT 0,
            total_vat REAL DEFAULT 0,
            total_gross REAL NOT NULL,
            invoice_date TEXT,
            show_date TEXT,
            is_paid INTEGER DEFAULT 0,
            paid_amount REAL DEFAULT 0,
            balance_remaining REAL,
            import_batch TEXT,
            imported_at TEXT,
            FOREIGN KEY(show_id) REFERENCES shows(show_id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS invoice_items (
            item_id INTEGER PRIMARY KEY AUTOINCREMENT,
            invoice_id INTEGER NOT NULL,
            account_code TEXT NOT NULL,
            description TEXT,
            net REAL DEFAULT 0,
            vat REAL DEFAULT 0,
            gross REAL DEFAULT 0,
            FOREIGN KEY(invoice_id) REFERENCES invoices(invoice_id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS outgoing_payments (
            payment_id INTEGER PRIMARY KEY AUTOINCREMENT,
            show_id INTEGER,
            payment_type TEXT NOT NULL,
            description TEXT,
            amount REAL NOT NULL,
            currency TEXT DEFAULT 'GBP',
            payment_date TEXT,
            payee TEXT,
            bank_reference TEXT,
            bank_id INTEGER,
            notes TEXT,
            created_at TEXT,
            created_by TEXT,
            FOREIGN KEY(show_id) REFERENCES shows(show_id),
            FOREIGN KEY(bank_id) REFERENCES bank_transactions(bank_id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS handshakes (
            handshake_id INTEGER PRIMARY KEY AUTOINCREMENT,
            bank_id INTEGER NOT NULL,
            invoice_id INTEGER NOT NULL,
            bank_amount_applied REAL NOT NULL,
            proxy_amount REAL DEFAULT 0,
            note TEXT,
            created_at TEXT,
            created_by TEXT,
            FOREIGN KEY(bank_id) REFERENCES bank_transactions(bank_id),
            FOREIGN KEY(invoice_id) REFERENCES invoices(invoice_id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settlements (
            settlement_id INTEGER PRIMARY KEY AUTOINCREMENT,
            show_id INTEGER NOT NULL,
            artist TEXT NOT NULL,
            amount_due REAL NOT NULL,
            currency TEXT DEFAULT 'GBP',
            amount_paid REAL DEFAULT 0,
            balance REAL,
            status TEXT DEFAULT 'Pending',
            payment_date TEXT,
            payment_reference TEXT,
            payment_method TEXT,
            confirmed_by TEXT,
            confirmed_at TEXT,
            artist_confirmed INTEGER DEFAULT 0,
            notes TEXT,
            created_at TEXT,
            updated_at TEXT,
            FOREIGN KEY(show_id) REFERENCES shows(show_id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id TEXT UNIQUE NOT NULL,
            timestamp TEXT NOT NULL,
            event_type TEXT NOT NULL,
            entity_type TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            data TEXT NOT NULL,
            actor TEXT NOT NULL
        )",
        [],
    )?;

    // Indexes on the columns the queries below filter by
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_shows_contract ON shows(contract_number)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_shows_status ON shows(status)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_bank_hash ON bank_transactions(transaction_hash)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_bank_matched ON bank_transactions(is_matched)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_invoices_contract ON invoices(contract_number)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_invoices_show ON invoices(show_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_items_invoice ON invoice_items(invoice_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_outgoing_show ON outgoing_payments(show_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_handshakes_bank ON handshakes(bank_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_handshakes_invoice ON handshakes(invoice_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_settlements_show ON settlements(show_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_entity ON events(entity_type, entity_id)",
        [],
    )?;

    Ok(())
}

// ============================================================================
// SHOWS
// ============================================================================

const SHOW_COLUMNS: &str =
    "show_id, contract_number, agent, artist, event_name, venue, city, \
     country, booking_date, performance_date, performance_day, deal_description, \
     total_deal_value, currency, artist_fee, booking_fee, hotel_buyout, flight_buyout, \
     ground_transport_buyout, withholding_tax, net_artist_settlement, promoter_name, \
     status, settlement_status, notes, created_at, updated_at";

fn show_from_row(row: &Row) -> rusqlite::Result<Show> {
    Ok(Show {
        show_id: row.get(0)?,
        contract_number: row.get(1)?,
        agent: row.get(2)?,
        artist: row.get(3)?,
        event_name: row.get(4)?,
        venue: row.get(5)?,
        city: row.get(6)?,
        country: row.get(7)?,
        booking_date: row.get(8)?,
        performance_date: row.get(9)?,
        performance_day: row.get(10)?,
        deal_description: row.get(11)?,
        total_deal_value: row.get(12)?,
        currency: row.get(13)?,
        artist_fee: row.get(14)?,
        booking_fee: row.get(15)?,
        hotel_buyout: row.get(16)?,
        flight_buyout: row.get(17)?,
        ground_transport_buyout: row.get(18)?,
        withholding_tax: row.get(19)?,
        net_artist_settlement: row.get(20)?,
        promoter_name: row.get(21)?,
        status: row.get(22)?,
        settlement_status: row.get(23)?,
        notes: row.get(24)?,
        created_at: row.get(25)?,
        updated_at: row.get(26)?,
    })
}

pub fn create_show(conn: &Connection, show: &Show) -> Result<i64> {
    let now = now_iso();

    conn.execute(
        "INSERT INTO shows (
            contract_number, agent, artist, event_name, venue, city, country,
            booking_date, performance_date, performance_day, deal_description,
            total_deal_value, currency, artist_fee, booking_fee, hotel_buyout,
            flight_buyout, ground_transport_buyout, withholding_tax,
            net_artist_settlement, promoter_name, status, settlement_status,
            notes, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14,
                  ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26)",
        params![
            show.contract_number,
            show.agent,
            show.artist,
            show.event_name,
            show.venue,
            show.city,
            show.country,
            show.booking_date,
            show.performance_date,
            show.performance_day,
            show.deal_description,
            show.total_deal_value,
            show.currency,
            show.artist_fee,
            show.booking_fee,
            show.hotel_buyout,
            show.flight_buyout,
            show.ground_transport_buyout,
            show.withholding_tax,
            show.net_artist_settlement,
            show.promoter_name,
            show.status,
            show.settlement_status,
            show.notes,
            now,
            now,
        ],
    )
    .context("Failed to insert show")?;

    Ok(conn.last_insert_rowid())
}

/// Rewrite a manually edited show. Identity, creation timestamp and the
/// contract back-link stay as they are; everything else comes from the
/// caller's record. Returns Ok(false) when the show does not exist.
pub fn update_show(conn: &Connection, show: &Show) -> Result<bool> {
    let changed = conn.execute(
        "UPDATE shows SET
            agent = ?1, artist = ?2, event_name = ?3, venue = ?4, city = ?5,
            country = ?6, booking_date = ?7, performance_date = ?8,
            performance_day = ?9, deal_description = ?10, total_deal_value = ?11,
            currency = ?12, artist_fee = ?13, booking_fee = ?14,
            hotel_buyout = ?15, flight_buyout = ?16,
            ground_transport_buyout = ?17, withholding_tax = ?18,
            net_artist_settlement = ?19, promoter_name = ?20, status = ?21,
            settlement_status = ?22, notes = ?23, updated_at = ?24
         WHERE show_id = ?25",
        params![
            show.agent,
            show.artist,
            show.event_name,
            show.venue,
            show.city,
            show.country,
            show.booking_date,
            show.performance_date,
            show.performance_day,
            show.deal_description,
            show.total_deal_value,
            show.currency,
            show.artist_fee,
            show.booking_fee,
            show.hotel_buyout,
            show.flight_buyout,
            show.ground_transport_buyout,
            show.withholding_tax,
            show.net_artist_settlement,
            show.promoter_name,
            show.status,
            show.settlement_status,
            show.notes,
            now_iso(),
            show.show_id,
        ],
    )
    .context("Failed to update show")?;

    Ok(changed > 0)
}

/// Move a show through its status lifecycle. Passing None leaves a field
/// unchanged.
pub fn update_show_status(
    conn: &Connection,
    show_id: i64,
    status: Option<&str>,
    settlement_status: Option<&str>,
) -> Result<bool> {
    let changed = conn.execute(
        "UPDATE shows SET
            status = COALESCE(?1, status),
            settlement_status = COALESCE(?2, settlement_status),
            updated_at = ?3
         WHERE show_id = ?4",
        params![status, settlement_status, now_iso(), show_id],
    )?;

    Ok(changed > 0)
}

#[derive(Debug, Clone, Default)]
pub struct ShowQuery {
    pub search: Option<String>,
    pub contract_number: Option<String>,
    pub status: Option<String>,
}

pub fn load_shows(conn: &Connection, query: &ShowQuery) -> Result<Vec<Show>> {
    let like = query.search.as_ref().map(|s| format!("%{}%", s));

    let sql = format!(
        "SELECT {} FROM shows
         WHERE (?1 IS NULL OR contract_number = ?1)
           AND (?2 IS NULL OR status = ?2)
           AND (?3 IS NULL
                OR artist LIKE ?3 OR event_name LIKE ?3 OR venue LIKE ?3
                OR promoter_name LIKE ?3 OR contract_number LIKE ?3)
         ORDER BY performance_date DESC",
        SHOW_COLUMNS
    );

    let mut stmt = conn.prepare(&sql)?;
    let shows = stmt
        .query_map(
            params![query.contract_number, query.status, like],
            show_from_row,
        )?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(shows)
}

pub fn load_show(conn: &Connection, show_id: i64) -> Result<Option<Show>> {
    let sql = format!("SELECT {} FROM shows WHERE show_id = ?1", SHOW_COLUMNS);

    let show = conn
        .query_row(&sql, params![show_id], show_from_row)
        .optional()?;

    Ok(show)
}

/// Look up the show a contract number belongs to. Whitespace around the
/// number is ignored on both sides so " 910516 " still matches.
pub fn find_show_by_contract(conn: &Connection, contract_number: &str) -> Result<Option<Show>> {
    let trimmed = contract_number.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }

    let sql = format!(
        "SELECT {} FROM shows WHERE TRIM(contract_number) = ?1 ORDER BY show_id LIMIT 1",
        SHOW_COLUMNS
    );

    let show = conn
        .query_row(&sql, params![trimmed], show_from_row)
        .optional()?;

    Ok(show)
}

// ============================================================================
// CONTRACTS
// ============================================================================

const CONTRACT_COLUMNS: &str =
    "contract_id, contract_number, booking_date, artist, event_name, venue, \
     city, country, performance_date, performance_day, deal_description, total_deal_value, \
     currency, artist_fee, booking_fee, booking_fee_vat, hotel_buyout, flight_buyout, \
     ground_transport_buyout, withholding_tax, total_artist_settlement, import_batch, \
     imported_at, show_id";

fn contract_from_row(row: &Row) -> rusqlite::Result<Contract> {
    Ok(Contract {
        contract_id: row.get(0)?,
        contract_number: row.get(1)?,
        booking_date: row.get(2)?,
        artist: row.get(3)?,
        event_name: row.get(4)?,
        venue: row.get(5)?,
        city: row.get(6)?,
        country: row.get(7)?,
        performance_date: row.get(8)?,
        performance_day: row.get(9)?,
        deal_description: row.get(10)?,
        total_deal_value: row.get(11)?,
        currency: row.get(12)?,
        artist_fee: row.get(13)?,
        booking_fee: row.get(14)?,
        booking_fee_vat: row.get(15)?,
        hotel_buyout: row.get(16)?,
        flight_buyout: row.get(17)?,
        ground_transport_buyout: row.get(18)?,
        withholding_tax: row.get(19)?,
        total_artist_settlement: row.get(20)?,
        import_batch: row.get(21)?,
        imported_at: row.get(22)?,
        show_id: row.get(23)?,
    })
}

pub fn contract_exists(conn: &Connection, contract_number: &str) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM contracts WHERE contract_number = ?1",
        params![contract_number],
        |row| row.get(0),
    )?;

    Ok(count > 0)
}

pub fn create_contract(conn: &Connection, contract: &Contract) -> Result<i64> {
    conn.execute(
        "INSERT INTO contracts (
            contract_number, booking_date, artist, event_name, venue, city,
            country, performance_date, performance_day, deal_description,
            total_deal_value, currency, artist_fee, booking_fee, booking_fee_vat,
            hotel_buyout, flight_buyout, ground_transport_buyout, withholding_tax,
            total_artist_settlement, import_batch, imported_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14,
                  ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22)",
        params![
            contract.contract_number,
            contract.booking_date,
            contract.artist,
            contract.event_name,
            contract.venue,
            contract.city,
            contract.country,
            contract.performance_date,
            contract.performance_day,
            contract.deal_description,
            contract.total_deal_value,
            contract.currency,
            contract.artist_fee,
            contract.booking_fee,
            contract.booking_fee_vat,
            contract.hotel_buyout,
            contract.flight_buyout,
            contract.ground_transport_buyout,
            contract.withholding_tax,
            contract.total_artist_settlement,
            contract.import_batch,
            now_iso(),
        ],
    )
    .with_context(|| format!("Failed to insert contract {}", contract.contract_number))?;

    Ok(conn.last_insert_rowid())
}

/// Record which show was derived from a contract.
pub fn link_contract_to_show(conn: &Connection, contract_id: i64, show_id: i64) -> Result<()> {
    conn.execute(
        "UPDATE contracts SET show_id = ?1 WHERE contract_id = ?2",
        params![show_id, contract_id],
    )?;

    Ok(())
}

pub fn load_contracts(conn: &Connection, search: Option<&str>) -> Result<Vec<Contract>> {
    let like = search.map(|s| format!("%{}%", s));

    let sql = format!(
        "SELECT {} FROM contracts
         WHERE (?1 IS NULL OR contract_number LIKE ?1 OR artist LIKE ?1)
         ORDER BY booking_date DESC",
        CONTRACT_COLUMNS
    );

    let mut stmt = conn.prepare(&sql)?;
    let contracts = stmt
        .query_map(params![like], contract_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(contracts)
}

// ============================================================================
// BANK TRANSACTIONS
// ============================================================================

const BANK_COLUMNS: &str =
    "bank_id, date, type, description, paid_out, paid_in, amount, currency, \
     transaction_hash, is_matched, show_id, import_batch, imported_at";

fn bank_from_row(row: &Row) -> rusqlite::Result<BankTransaction> {
    Ok(BankTransaction {
        bank_id: row.get(0)?,
        date: row.get(1)?,
        tx_type: row.get(2)?,
        description: row.get(3)?,
        paid_out: row.get(4)?,
        paid_in: row.get(5)?,
        amount: row.get(6)?,
        currency: row.get(7)?,
        transaction_hash: row.get(8)?,
        is_matched: row.get(9)?,
        show_id: row.get(10)?,
        import_batch: row.get(11)?,
        imported_at: row.get(12)?,
    })
}

pub fn bank_transaction_exists(conn: &Connection, fingerprint: &str) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM bank_transactions WHERE transaction_hash = ?1",
        params![fingerprint],
        |row| row.get(0),
    )?;

    Ok(count > 0)
}

pub fn create_bank_transaction(conn: &Connection, tx: &BankTransaction) -> Result<i64> {
    conn.execute(
        "INSERT INTO bank_transactions (
            date, type, description, paid_out, paid_in, amount, currency,
            transaction_hash, is_matched, show_id, import_batch, imported_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            tx.date,
            tx.tx_type,
            tx.description,
            tx.paid_out,
            tx.paid_in,
            tx.amount,
            tx.currency,
            tx.transaction_hash,
            tx.is_matched,
            tx.show_id,
            tx.import_batch,
            now_iso(),
        ],
    )
    .context("Failed to insert bank transaction")?;

    Ok(conn.last_insert_rowid())
}

#[derive(Debug, Clone, Default)]
pub struct BankQuery {
    pub search: Option<String>,
    pub unmatched_only: bool,
    pub incoming_only: bool,
    pub outgoing_only: bool,
}

pub fn load_bank_transactions(
    conn: &Connection,
    query: &BankQuery,
) -> Result<Vec<BankTransaction>> {
    let like = query.search.as_ref().map(|s| format!("%{}%", s));

    let sql = format!(
        "SELECT {} FROM bank_transactions
         WHERE (?1 IS NULL OR description LIKE ?1)
           AND (?2 = 0 OR is_matched = 0)
           AND (?3 = 0 OR amount > 0)
           AND (?4 = 0 OR amount < 0)
         ORDER BY date DESC",
        BANK_COLUMNS
    );

    let mut stmt = conn.prepare(&sql)?;
    let transactions = stmt
        .query_map(
            params![
                like,
                query.unmatched_only as i64,
                query.incoming_only as i64,
                query.outgoing_only as i64
            ],
            bank_from_row,
        )?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(transactions)
}

pub fn load_bank_transaction(conn: &Connection, bank_id: i64) -> Result<Option<BankTransaction>> {
    let sql = format!(
        "SELECT {} FROM bank_transactions WHERE bank_id = ?1",
        BANK_COLUMNS
    );

    let tx = conn
        .query_row(&sql, params![bank_id], bank_from_row)
        .optional()?;

    Ok(tx)
}

/// Per-batch statistics: how many lines each import run brought in and the
/// money totals they carried. Groups "transactions imported together".
#[derive(Debug, Clone, Serialize)]
pub struct BatchStat {
    pub import_batch: String,
    pub transaction_count: i64,
    pub total_in: f64,
    pub total_out: f64,
    pub date_range: String,
}

pub fn bank_batch_stats(conn: &Connection) -> Result<Vec<BatchStat>> {
    let mut stmt = conn.prepare(
        "SELECT
            import_batch,
            COUNT(*) as count,
            SUM(CASE WHEN amount > 0 THEN amount ELSE 0.0 END) as total_in,
            SUM(CASE WHEN amount < 0 THEN ABS(amount) ELSE 0.0 END) as total_out,
            MIN(date) || ' - ' || MAX(date) as date_range
         FROM bank_transactions
         WHERE import_batch IS NOT NULL
         GROUP BY import_batch
         ORDER BY import_batch",
    )?;

    let stats = stmt
        .query_map([], |row| {
            Ok(BatchStat {
                import_batch: row.get(0)?,
                transaction_count: row.get(1)?,
                total_in: row.get(2)?,
                total_out: row.get(3)?,
                date_range: row.get(4)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(stats)
}

// ============================================================================
// INVOICES
// ============================================================================

const INVOICE_COLUMNS: &str =
    "invoice_id, invoice_number, contract_number, show_id, from_entity, \
     promoter_name, payment_bank_details, reference, currency, total_net, total_vat, \
     total_gross, invoice_date, show_date, is_paid, paid_amount, balance_remaining, \
     import_batch, imported_at";

fn invoice_from_row(row: &Row) -> rusqlite::Result<Invoice> {
    Ok(Invoice {
        invoice_id: row.get(0)?,
        invoice_number: row.get(1)?,
        contract_number: row.get(2)?,
        show_id: row.get(3)?,
        from_entity: row.get(4)?,
        promoter_name: row.get(5)?,
        payment_bank_details: row.get(6)?,
        reference: row.get(7)?,
        currency: row.get(8)?,
        total_net: row.get(9)?,
        total_vat: row.get(10)?,
        total_gross: row.get(11)?,
        invoice_date: row.get(12)?,
        show_date: row.get(13)?,
        is_paid: row.get(14)?,
        paid_amount: row.get(15)?,
        balance_remaining: row.get(16)?,
        import_batch: row.get(17)?,
        imported_at: row.get(18)?,
    })
}

pub fn invoice_exists(conn: &Connection, invoice_number: &str) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM invoices WHERE invoice_number = ?1",
        params![invoice_number],
        |row| row.get(0),
    )?;

    Ok(count > 0)
}

/// Insert an invoice header and its line items as one unit. The header's
/// balance starts at the full gross total.
pub fn create_invoice(
    conn: &mut Connection,
    invoice: &Invoice,
    items: &[InvoiceItem],
) -> Result<i64> {
    let tx = conn.transaction()?;

    tx.execute(
        "INSERT INTO invoices (
            invoice_number, contract_number, show_id, from_entity, promoter_name,
            payment_bank_details, reference, currency, total_net, total_vat,
            total_gross, invoice_date, show_date, is_paid, paid_amount,
            balance_remaining, import_batch, imported_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14,
                  ?15, ?16, ?17, ?18)",
        params![
            invoice.invoice_number,
            invoice.contract_number,
            invoice.show_id,
            invoice.from_entity,
            invoice.promoter_name,
            invoice.payment_bank_details,
            invoice.reference,
            invoice.currency,
            invoice.total_net,
            invoice.total_vat,
            invoice.total_gross,
            invoice.invoice_date,
            invoice.show_date,
            false,
            0.0,
            invoice.total_gross,
            invoice.import_batch,
            now_iso(),
        ],
    )
    .with_context(|| format!("Failed to insert invoice {}", invoice.invoice_number))?;

    let invoice_id = tx.last_insert_rowid();

    for item in items {
        tx.execute(
            "INSERT INTO invoice_items (invoice_id, account_code, description, net, vat, gross)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                invoice_id,
                item.account_code,
                item.description,
                item.net,
                item.vat,
                item.gross
            ],
        )
        .context("Failed to insert invoice line item")?;
    }

    tx.commit()?;

    Ok(invoice_id)
}

#[derive(Debug, Clone, Default)]
pub struct InvoiceQuery {
    pub search: Option<String>,
    pub unpaid_only: bool,
}

pub fn load_invoices(conn: &Connection, query: &InvoiceQuery) -> Result<Vec<Invoice>> {
    let like = query.search.as_ref().map(|s| format!("%{}%", s));

    let sql = format!(
        "SELECT {} FROM invoices
         WHERE (?1 IS NULL OR invoice_number LIKE ?1 OR promoter_name LIKE ?1)
           AND (?2 = 0 OR is_paid = 0)
         ORDER BY invoice_date DESC",
        INVOICE_COLUMNS
    );

    let mut stmt = conn.prepare(&sql)?;
    let invoices = stmt
        .query_map(params![like, query.unpaid_only as i64], invoice_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(invoices)
}

pub fn load_invoice(conn: &Connection, invoice_id: i64) -> Result<Option<Invoice>> {
    let sql = format!(
        "SELECT {} FROM invoices WHERE invoice_id = ?1",
        INVOICE_COLUMNS
    );

    let invoice = conn
        .query_row(&sql, params![invoice_id], invoice_from_row)
        .optional()?;

    Ok(invoice)
}

pub fn load_invoice_items(conn: &Connection, invoice_id: i64) -> Result<Vec<InvoiceItem>> {
    let mut stmt = conn.prepare(
        "SELECT item_id, invoice_id, account_code, description, net, vat, gross
         FROM invoice_items WHERE invoice_id = ?1 ORDER BY item_id",
    )?;

    let items = stmt
        .query_map(params![invoice_id], |row| {
            Ok(InvoiceItem {
                item_id: row.get(0)?,
                invoice_id: row.get(1)?,
                account_code: row.get(2)?,
                description: row.get(3)?,
                net: row.get(4)?,
                vat: row.get(5)?,
                gross: row.get(6)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(items)
}

// ============================================================================
// OUTGOING PAYMENTS
// ============================================================================

const OUTGOING_COLUMNS: &str =
    "payment_id, show_id, payment_type, description, amount, currency, \
     payment_date, payee, bank_reference, bank_id, notes, created_at, created_by";

fn outgoing_from_row(row: &Row) -> rusqlite::Result<OutgoingPayment> {
    Ok(OutgoingPayment {
        payment_id: row.get(0)?,
        show_id: row.get(1)?,
        payment_type: row.get(2)?,
        description: row.get(3)?,
        amount: row.get(4)?,
        currency: row.get(5)?,
        payment_date: row.get(6)?,
        payee: row.get(7)?,
        bank_reference: row.get(8)?,
        bank_id: row.get(9)?,
        notes: row.get(10)?,
        created_at: row.get(11)?,
        created_by: row.get(12)?,
    })
}

pub fn create_outgoing_payment(conn: &Connection, payment: &OutgoingPayment) -> Result<i64> {
    conn.execute(
        "INSERT INTO outgoing_payments (
            show_id, payment_type, description, amount, currency, payment_date,
            payee, bank_reference, bank_id, notes, created_at, created_by
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            payment.show_id,
            payment.payment_type,
            payment.description,
            payment.amount,
            payment.currency,
            payment.payment_date,
            payment.payee,
            payment.bank_reference,
            payment.bank_id,
            payment.notes,
            now_iso(),
            payment.created_by,
        ],
    )
    .context("Failed to insert outgoing payment")?;

    Ok(conn.last_insert_rowid())
}

/// Attach an outgoing payment to the bank line that funded it.
pub fn link_outgoing_payment_to_bank(
    conn: &Connection,
    payment_id: i64,
    bank_id: i64,
) -> Result<bool> {
    let changed = conn.execute(
        "UPDATE outgoing_payments SET bank_id = ?1 WHERE payment_id = ?2",
        params![bank_id, payment_id],
    )?;

    Ok(changed > 0)
}

pub fn load_outgoing_payments(
    conn: &Connection,
    show_id: Option<i64>,
    payment_type: Option<&str>,
) -> Result<Vec<OutgoingPayment>> {
    let sql = format!(
        "SELECT {} FROM outgoing_payments
         WHERE (?1 IS NULL OR show_id = ?1)
           AND (?2 IS NULL OR payment_type = ?2)
         ORDER BY payment_date DESC",
        OUTGOING_COLUMNS
    );

    let mut stmt = conn.prepare(&sql)?;
    let payments = stmt
        .query_map(params![show_id, payment_type], outgoing_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(payments)
}

// ============================================================================
// HANDSHAKES (read side; mutations live in matching.rs)
// ============================================================================

const HANDSHAKE_COLUMNS: &str =
    "handshake_id, bank_id, invoice_id, bank_amount_applied, proxy_amount, \
     note, created_at, created_by";

fn handshake_from_row(row: &Row) -> rusqlite::Result<Handshake> {
    Ok(Handshake {
        handshake_id: row.get(0)?,
        bank_id: row.get(1)?,
        invoice_id: row.get(2)?,
        bank_amount_applied: row.get(3)?,
        proxy_amount: row.get(4)?,
        note: row.get(5)?,
        created_at: row.get(6)?,
        created_by: row.get(7)?,
    })
}

pub fn load_handshakes(
    conn: &Connection,
    bank_id: Option<i64>,
    invoice_id: Option<i64>,
) -> Result<Vec<Handshake>> {
    let sql = format!(
        "SELECT {} FROM handshakes
         WHERE (?1 IS NULL OR bank_id = ?1)
           AND (?2 IS NULL OR invoice_id = ?2)
         ORDER BY handshake_id DESC",
        HANDSHAKE_COLUMNS
    );

    let mut stmt = conn.prepare(&sql)?;
    let handshakes = stmt
        .query_map(params![bank_id, invoice_id], handshake_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(handshakes)
}

// ============================================================================
// SETTLEMENTS (entity reads; state machine lives in settlement.rs)
// ============================================================================

const SETTLEMENT_COLUMNS: &str =
    "settlement_id, show_id, artist, amount_due, currency, amount_paid, \
     balance, status, payment_date, payment_reference, payment_method, confirmed_by, \
     confirmed_at, artist_confirmed, notes, created_at, updated_at";

pub(crate) fn settlement_from_row(row: &Row) -> rusqlite::Result<Settlement> {
    Ok(Settlement {
        settlement_id: row.get(0)?,
        show_id: row.get(1)?,
        artist: row.get(2)?,
        amount_due: row.get(3)?,
        currency: row.get(4)?,
        amount_paid: row.get(5)?,
        balance: row.get(6)?,
        status: row.get(7)?,
        payment_date: row.get(8)?,
        payment_reference: row.get(9)?,
        payment_method: row.get(10)?,
        confirmed_by: row.get(11)?,
        confirmed_at: row.get(12)?,
        artist_confirmed: row.get(13)?,
        notes: row.get(14)?,
        created_at: row.get(15)?,
        updated_at: row.get(16)?,
    })
}

pub fn load_settlements(
    conn: &Connection,
    show_id: Option<i64>,
    status: Option<&str>,
) -> Result<Vec<Settlement>> {
    let sql = format!(
        "SELECT {} FROM settlements
         WHERE (?1 IS NULL OR show_id = ?1)
           AND (?2 IS NULL OR status = ?2)
         ORDER BY settlement_id DESC",
        SETTLEMENT_COLUMNS
    );

    let mut stmt = conn.prepare(&sql)?;
    let settlements = stmt
        .query_map(params![show_id, status], settlement_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(settlements)
}

pub fn load_settlement(conn: &Connection, settlement_id: i64) -> Result<Option<Settlement>> {
    let sql = format!(
        "SELECT {} FROM settlements WHERE settlement_id = ?1",
        SETTLEMENT_COLUMNS
    );

    let settlement = conn
        .query_row(&sql, params![settlement_id], settlement_from_row)
        .optional()?;

    Ok(settlement)
}

// ============================================================================
// EVENTS (audit trail)
// ============================================================================

impl Event {
    pub fn new(
        event_type: &str,
        entity_type: &str,
        entity_id: &str,
        data: serde_json::Value,
        actor: &str,
    ) -> Self {
        Event {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type: event_type.to_string(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            data,
            actor: actor.to_string(),
        }
    }
}

pub fn insert_event(conn: &Connection, event: &Event) -> Result<()> {
    let data_json = serde_json::to_string(&event.data)?;

    conn.execute(
        "INSERT INTO events (event_id, timestamp, event_type, entity_type, entity_id, data, actor)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            event.event_id,
            event.timestamp.to_rfc3339(),
            event.event_type,
            event.entity_type,
            event.entity_id,
            data_json,
            event.actor,
        ],
    )?;

    Ok(())
}

/// Append an audit event, swallowing failures: the audit trail must never
/// take a committed business operation down with it.
pub(crate) fn log_event(
    conn: &Connection,
    event_type: &str,
    entity_type: &str,
    entity_id: &str,
    data: serde_json::Value,
    actor: &str,
) {
    let event = Event::new(event_type, entity_type, entity_id, data, actor);
    let _ = insert_event(conn, &event);
}

pub fn load_events_for_entity(
    conn: &Connection,
    entity_type: &str,
    entity_id: &str,
) -> Result<Vec<Event>> {
    let mut stmt = conn.prepare(
        "SELECT event_id, timestamp, event_type, entity_type, entity_id, data, actor
         FROM events
         WHERE entity_type = ?1 AND entity_id = ?2
         ORDER BY timestamp DESC",
    )?;

    let events = stmt
        .query_map(params![entity_type, entity_id], |row| {
            let timestamp_str: String = row.get(1)?;
            let data_json: String = row.get(5)?;

            Ok(Event {
                event_id: row.get(0)?,
                timestamp: DateTime::parse_from_rfc3339(&timestamp_str)
                    .map_err(|_| rusqlite::Error::InvalidQuery)?
                    .with_timezone(&Utc),
                event_type: row.get(2)?,
                entity_type: row.get(3)?,
                entity_id: row.get(4)?,
                data: serde_json::from_str(&data_json)
                    .map_err(|_| rusqlite::Error::InvalidQuery)?,
                actor: row.get(6)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(events)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        init_db(&conn).unwrap();
        conn
    }

    fn sample_show(artist: &str, contract: &str) -> Show {
        Show {
            artist: artist.to_string(),
            contract_number: Some(contract.to_string()),
            venue: Some("Fabric".to_string()),
            currency: "GBP".to_string(),
            artist_fee: 1000.0,
            booking_fee: 200.0,
            status: "Contracted".to_string(),
            settlement_status: "Pending".to_string(),
            ..Show::default()
        }
    }

    #[test]
    fn test_init_db_is_idempotent() {
        let conn = test_conn();
        init_db(&conn).unwrap();
        init_db(&conn).unwrap();
    }

    #[test]
    fn test_show_roundtrip() {
        let conn = test_conn();

        let show_id = create_show(&conn, &sample_show("Minna", "910516")).unwrap();
        assert!(show_id > 0);

        let loaded = load_show(&conn, show_id).unwrap().unwrap();
        assert_eq!(loaded.artist, "Minna");
        assert_eq!(loaded.contract_number.as_deref(), Some("910516"));
        assert_eq!(loaded.status, "Contracted");
        assert!(loaded.created_at.is_some());
    }

    #[test]
    fn test_find_show_by_contract_trims_whitespace() {
        let conn = test_conn();
        create_show(&conn, &sample_show("Minna", "910516")).unwrap();

        let found = find_show_by_contract(&conn, " 910516 ").unwrap();
        assert!(found.is_some());

        assert!(find_show_by_contract(&conn, "999999").unwrap().is_none());
        assert!(find_show_by_contract(&conn, "   ").unwrap().is_none());
    }

    #[test]
    fn test_update_show_rewrites_fields_and_stamps_updated_at() {
        let conn = test_conn();
        let show_id = create_show(&conn, &sample_show("Minna", "910516")).unwrap();

        let mut show = load_show(&conn, show_id).unwrap().unwrap();
        show.venue = Some("Printworks".to_string());
        show.artist_fee = 1500.0;
        show.notes = Some("fee renegotiated".to_string());

        assert!(update_show(&conn, &show).unwrap());

        let updated = load_show(&conn, show_id).unwrap().unwrap();
        assert_eq!(updated.venue.as_deref(), Some("Printworks"));
        assert_eq!(updated.artist_fee, 1500.0);
        assert_eq!(updated.notes.as_deref(), Some("fee renegotiated"));
        // contract back-link untouched
        assert_eq!(updated.contract_number.as_deref(), Some("910516"));

        let mut missing = updated.clone();
        missing.show_id = 9999;
        assert!(!update_show(&conn, &missing).unwrap());
    }

    #[test]
    fn test_update_show_status() {
        let conn = test_conn();
        let show_id = create_show(&conn, &sample_show("Minna", "910516")).unwrap();

        let updated = update_show_status(&conn, show_id, Some("Performed"), None).unwrap();
        assert!(updated);

        let show = load_show(&conn, show_id).unwrap().unwrap();
        assert_eq!(show.status, "Performed");
        assert_eq!(show.settlement_status, "Pending");

        assert!(!update_show_status(&conn, 9999, Some("Performed"), None).unwrap());
    }

    #[test]
    fn test_contract_unique_constraint() {
        let conn = test_conn();

        let contract = Contract {
            contract_number: "910516".to_string(),
            artist: Some("Minna".to_string()),
            currency: "GBP".to_string(),
            ..Contract::default()
        };

        create_contract(&conn, &contract).unwrap();
        assert!(contract_exists(&conn, "910516").unwrap());
        assert!(!contract_exists(&conn, "910517").unwrap());

        // second insert trips the storage-level unique constraint
        assert!(create_contract(&conn, &contract).is_err());
    }

    #[test]
    fn test_invoice_created_with_items_and_initial_balance() {
        let mut conn = test_conn();

        let invoice = Invoice {
            invoice_number: "ARC/I25-001".to_string(),
            currency: "GBP".to_string(),
            total_net: 2500.0,
            total_gross: 2500.0,
            ..Invoice::default()
        };
        let items = vec![
            InvoiceItem {
                account_code: "Booking Fee".to_string(),
                net: 500.0,
                gross: 500.0,
                ..InvoiceItem::default()
            },
            InvoiceItem {
                account_code: "Artist Fee".to_string(),
                net: 2000.0,
                gross: 2000.0,
                ..InvoiceItem::default()
            },
        ];

        let invoice_id = create_invoice(&mut conn, &invoice, &items).unwrap();

        let loaded = load_invoice(&conn, invoice_id).unwrap().unwrap();
        assert_eq!(loaded.paid_amount, 0.0);
        assert_eq!(loaded.balance_remaining, 2500.0);
        assert!(!loaded.is_paid);

        let loaded_items = load_invoice_items(&conn, invoice_id).unwrap();
        assert_eq!(loaded_items.len(), 2);
        assert_eq!(loaded_items[0].account_code, "Booking Fee");
    }

    #[test]
    fn test_bank_transaction_filters() {
        let conn = test_conn();

        let incoming = BankTransaction {
            date: "2025-07-18".to_string(),
            description: "ATA INV-16496".to_string(),
            paid_in: 9800.0,
            amount: 9800.0,
            currency: "GBP".to_string(),
            ..BankTransaction::default()
        };
        let outgoing = BankTransaction {
            date: "2025-10-03".to_string(),
            description: "St Martins Place".to_string(),
            paid_out: 800.0,
            amount: -800.0,
            currency: "GBP".to_string(),
            ..BankTransaction::default()
        };

        create_bank_transaction(&conn, &incoming).unwrap();
        create_bank_transaction(&conn, &outgoing).unwrap();

        let all = load_bank_transactions(&conn, &BankQuery::default()).unwrap();
        assert_eq!(all.len(), 2);

        let incoming_only = load_bank_transactions(
            &conn,
            &BankQuery {
                incoming_only: true,
                ..BankQuery::default()
            },
        )
        .unwrap();
        assert_eq!(incoming_only.len(), 1);
        assert_eq!(incoming_only[0].amount, 9800.0);

        let searched = load_bank_transactions(
            &conn,
            &BankQuery {
                search: Some("Martins".to_string()),
                ..BankQuery::default()
            },
        )
        .unwrap();
        assert_eq!(searched.len(), 1);
        assert_eq!(searched[0].amount, -800.0);
    }

    #[test]
    fn test_bank_batch_stats() {
        let conn = test_conn();

        for (date, amount) in [("2025-07-18", 9800.0), ("2025-10-03", -800.0)] {
            let tx = BankTransaction {
                date: date.to_string(),
                description: "stmt line".to_string(),
                amount,
                currency: "GBP".to_string(),
                import_batch: Some("batch_20250801_120000".to_string()),
                ..BankTransaction::default()
            };
            create_bank_transaction(&conn, &tx).unwrap();
        }

        let stats = bank_batch_stats(&conn).unwrap();
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].transaction_count, 2);
        assert_eq!(stats[0].total_in, 9800.0);
        assert_eq!(stats[0].total_out, 800.0);
    }

    #[test]
    fn test_outgoing_payment_roundtrip_and_bank_link() {
        let conn = test_conn();
        let show_id = create_show(&conn, &sample_show("Minna", "910516")).unwrap();

        let payment = OutgoingPayment {
            show_id: Some(show_id),
            payment_type: "Hotel".to_string(),
            description: Some("2 nights, Premier Inn".to_string()),
            amount: 300.0,
            currency: "GBP".to_string(),
            payment_date: Some("2025-11-07".to_string()),
            payee: Some("Premier Inn".to_string()),
            created_by: Some("Angelo".to_string()),
            ..OutgoingPayment::default()
        };
        let payment_id = create_outgoing_payment(&conn, &payment).unwrap();

        let by_show = load_outgoing_payments(&conn, Some(show_id), None).unwrap();
        assert_eq!(by_show.len(), 1);
        assert_eq!(by_show[0].amount, 300.0);
        assert!(by_show[0].bank_id.is_none());

        let by_type = load_outgoing_payments(&conn, None, Some("Flights")).unwrap();
        assert!(by_type.is_empty());

        let bank_id = create_bank_transaction(
            &conn,
            &BankTransaction {
                date: "2025-11-07".to_string(),
                description: "PREMIER INN".to_string(),
                paid_out: 300.0,
                amount: -300.0,
                currency: "GBP".to_string(),
                ..BankTransaction::default()
            },
        )
        .unwrap();

        assert!(link_outgoing_payment_to_bank(&conn, payment_id, bank_id).unwrap());
        let linked = load_outgoing_payments(&conn, Some(show_id), None).unwrap();
        assert_eq!(linked[0].bank_id, Some(bank_id));

        assert!(!link_outgoing_payment_to_bank(&conn, 999, bank_id).unwrap());
    }

    #[test]
    fn test_event_log_roundtrip() {
        let conn = test_conn();

        log_event(
            &conn,
            "bank_import",
            "import_batch",
            "batch_20250801_120000",
            serde_json::json!({"imported": 12}),
            "bank_importer",
        );

        let events =
            load_events_for_entity(&conn, "import_batch", "batch_20250801_120000").unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "bank_import");
        assert_eq!(events[0].actor, "bank_importer");
        assert_eq!(events[0].data["imported"], 12);
    }
}
