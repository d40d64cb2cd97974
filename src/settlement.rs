// Status derivation and per-show settlement.
//
// The calculators here are pure: given snapshots of the relevant tables they
// produce derived views and never write anything back. Recomputing them is
// always safe. The one piece of state this module owns is the Settlement
// entity (the artist-payout confirmation record) and its status machine:
//
//   Pending --(amount_paid > 0)--> Partial --(paid >= due)--> Paid
//       --(explicit confirm)--> Confirmed   (terminal)
//
// Confirmation is an attestation by an operator, not a derived fact: an
// amount update never downgrades a Confirmed settlement.

use anyhow::Result;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::config::Config;
use crate::db::{self, Handshake, Invoice, OutgoingPayment, Settlement, Show};

// ============================================================================
// PAYMENT STATUS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentStatus {
    Unpaid,
    PartPaid,
    Paid,
    Overpaid,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Unpaid => "UNPAID",
            PaymentStatus::PartPaid => "PART PAID",
            PaymentStatus::Paid => "PAID",
            PaymentStatus::Overpaid => "OVERPAID",
        }
    }
}

/// Classify how paid something is, under tolerance.
///
/// Evaluation order matters: the near-zero check runs first so a tiny
/// applied amount can never read as part-paid.
pub fn classify_payment_status(applied: f64, total: f64, tolerance: f64) -> PaymentStatus {
    if applied.abs() < tolerance {
        PaymentStatus::Unpaid
    } else if applied + tolerance < total {
        PaymentStatus::PartPaid
    } else if (applied - total).abs() <= tolerance {
        PaymentStatus::Paid
    } else {
        PaymentStatus::Overpaid
    }
}

// ============================================================================
// INVOICE PAYMENT OVERVIEW
// ============================================================================

/// Read-side payment summary for one invoice, derived from its handshakes
/// rather than the incrementally maintained columns.
#[derive(Debug, Clone, Serialize)]
pub struct InvoicePaymentSummary {
    pub invoice_id: i64,
    pub invoice_number: String,
    pub total_gross: f64,
    pub paid_amount: f64,
    pub proxy_amount: f64,
    pub total_applied: f64,
    pub balance: f64,
    pub status: PaymentStatus,
}

/// Summarize payment state per invoice by summing handshakes. Used by
/// reports, and by tests as the independent check against the incremental
/// fields the matching engine maintains.
pub fn invoice_payment_summaries(
    invoices: &[Invoice],
    handshakes: &[Handshake],
    config: &Config,
) -> Vec<InvoicePaymentSummary> {
    invoices
        .iter()
        .map(|invoice| {
            let mut paid = 0.0;
            let mut proxy = 0.0;
            for handshake in handshakes.iter().filter(|h| h.invoice_id == invoice.invoice_id) {
                paid += handshake.bank_amount_applied;
                proxy += handshake.proxy_amount;
            }

            let total_applied = paid + proxy;

            InvoicePaymentSummary {
                invoice_id: invoice.invoice_id,
                invoice_number: invoice.invoice_number.clone(),
                total_gross: invoice.total_gross,
                paid_amount: paid,
                proxy_amount: proxy,
                total_applied,
                balance: invoice.total_gross - total_applied,
                status: classify_payment_status(
                    total_applied,
                    invoice.total_gross,
                    config.amount_tolerance,
                ),
            }
        })
        .collect()
}

// ============================================================================
// SHOW SETTLEMENT VIEW
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PromoterStatus {
    Paid,
    PartPaid,
    Unpaid,
}

impl PromoterStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PromoterStatus::Paid => "PAID",
            PromoterStatus::PartPaid => "PART PAID",
            PromoterStatus::Unpaid => "UNPAID",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArtistStatus {
    Settled,
    Partial,
    Pending,
}

impl ArtistStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtistStatus::Settled => "SETTLED",
            ArtistStatus::Partial => "PARTIAL",
            ArtistStatus::Pending => "PENDING",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OverallStatus {
    Complete,
    AwaitingArtistPayment,
    AwaitingPromoterPayment,
    InProgress,
}

impl OverallStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OverallStatus::Complete => "COMPLETE",
            OverallStatus::AwaitingArtistPayment => "AWAITING ARTIST PAYMENT",
            OverallStatus::AwaitingPromoterPayment => "AWAITING PROMOTER PAYMENT",
            OverallStatus::InProgress => "IN PROGRESS",
        }
    }
}

/// The full financial picture of one show: what was billed, what arrived,
/// what went out, and where the artist settlement stands.
#[derive(Debug, Clone, Serialize)]
pub struct ShowSettlement {
    // show info
    pub show_id: i64,
    pub contract_number: Option<String>,
    pub artist: String,
    pub event_name: Option<String>,
    pub venue: Option<String>,
    pub performance_date: Option<String>,
    pub currency: String,

    // deal terms
    pub deal_description: Option<String>,
    pub total_deal_value: f64,
    pub artist_fee: f64,
    pub booking_fee: f64,
    pub hotel_buyout: f64,
    pub flight_buyout: f64,
    pub withholding_tax: f64,

    // money in
    pub total_invoiced: f64,
    pub total_received: f64,
    pub outstanding_from_promoter: f64,
    pub promoter_status: PromoterStatus,

    // money out
    pub artist_payments: f64,
    pub hotel_payments: f64,
    pub flight_payments: f64,
    pub other_payments: f64,
    pub total_paid_out: f64,

    // artist settlement
    pub net_artist_due: f64,
    pub artist_paid: f64,
    pub artist_balance: f64,
    pub artist_status: ArtistStatus,

    // agency
    pub agency_position: f64,

    pub overall_status: OverallStatus,

    // filtered detail lists
    pub invoices: Vec<Invoice>,
    pub outgoing_payments: Vec<OutgoingPayment>,
}

/// Aggregate everything known about one show into a settlement snapshot.
///
/// Pure function over table snapshots: deterministic, no storage access, no
/// side effects, so it can be recomputed on every call. Returns None when
/// the show id is unknown.
pub fn compute_show_settlement(
    show_id: i64,
    shows: &[Show],
    invoices: &[Invoice],
    handshakes: &[Handshake],
    outgoing_payments: &[OutgoingPayment],
    config: &Config,
) -> Option<ShowSettlement> {
    let show = shows.iter().find(|s| s.show_id == show_id)?;
    let tolerance = config.amount_tolerance;

    // ---- money in: invoiced vs received ----
    let show_invoices: Vec<Invoice> = invoices
        .iter()
        .filter(|i| i.show_id == Some(show_id))
        .cloned()
        .collect();

    let total_invoiced: f64 = show_invoices.iter().map(|i| i.total_gross).sum();

    let invoice_ids: HashSet<i64> = show_invoices.iter().map(|i| i.invoice_id).collect();
    let total_received: f64 = handshakes
        .iter()
        .filter(|h| invoice_ids.contains(&h.invoice_id))
        .map(|h| h.bank_amount_applied + h.proxy_amount)
        .sum();

    let outstanding_from_promoter = total_invoiced - total_received;

    // ---- money out, bucketed by payment type ----
    let show_outgoing: Vec<OutgoingPayment> = outgoing_payments
        .iter()
        .filter(|p| p.show_id == Some(show_id))
        .cloned()
        .collect();

    let mut artist_payments = 0.0;
    let mut hotel_payments = 0.0;
    let mut flight_payments = 0.0;
    let mut other_payments = 0.0;

    for payment in &show_outgoing {
        let kind = payment.payment_type.to_lowercase();
        if kind.contains("artist") {
            artist_payments += payment.amount;
        } else if kind.contains("hotel") {
            hotel_payments += payment.amount;
        } else if kind.contains("flight") {
            flight_payments += payment.amount;
        } else {
            other_payments += payment.amount;
        }
    }

    let total_paid_out = artist_payments + hotel_payments + flight_payments + other_payments;

    // ---- artist settlement from the deal terms ----
    let net_artist_due =
        show.artist_fee - show.hotel_buyout - show.flight_buyout - show.withholding_tax;
    let artist_paid = artist_payments;
    let artist_balance = net_artist_due - artist_paid;

    let agency_position = total_received - total_paid_out;

    // ---- statuses ----
    let promoter_status = if outstanding_from_promoter <= tolerance {
        PromoterStatus::Paid
    } else if total_received > tolerance {
        PromoterStatus::PartPaid
    } else {
        PromoterStatus::Unpaid
    };

    let artist_status = if artist_balance <= tolerance {
        ArtistStatus::Settled
    } else if artist_paid > tolerance {
        ArtistStatus::Partial
    } else {
        ArtistStatus::Pending
    };

    let overall_status = match (promoter_status, artist_status) {
        (PromoterStatus::Paid, ArtistStatus::Settled) => OverallStatus::Complete,
        (PromoterStatus::Paid, _) => OverallStatus::AwaitingArtistPayment,
        (_, _) => OverallStatus::AwaitingPromoterPayment,
    };

    Some(ShowSettlement {
        show_id,
        contract_number: show.contract_number.clone(),
        artist: show.artist.clone(),
        event_name: show.event_name.clone(),
        venue: show.venue.clone(),
        performance_date: show.performance_date.clone(),
        currency: show.currency.clone(),
        deal_description: show.deal_description.clone(),
        total_deal_value: show.total_deal_value,
        artist_fee: show.artist_fee,
        booking_fee: show.booking_fee,
        hotel_buyout: show.hotel_buyout,
        flight_buyout: show.flight_buyout,
        withholding_tax: show.withholding_tax,
        total_invoiced,
        total_received,
        outstanding_from_promoter,
        promoter_status,
        artist_payments,
        hotel_payments,
        flight_payments,
        other_payments,
        total_paid_out,
        net_artist_due,
        artist_paid,
        artist_balance,
        artist_status,
        agency_position,
        overall_status,
        invoices: show_invoices,
        outgoing_payments: show_outgoing,
    })
}

// ============================================================================
// SETTLEMENT ENTITY & STATE MACHINE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SettlementStatus {
    Pending,
    Partial,
    Paid,
    Confirmed,
}

impl SettlementStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SettlementStatus::Pending => "Pending",
            SettlementStatus::Partial => "Partial",
            SettlementStatus::Paid => "Paid",
            SettlementStatus::Confirmed => "Confirmed",
        }
    }

    pub fn parse(value: &str) -> SettlementStatus {
        match value {
            "Partial" => SettlementStatus::Partial,
            "Paid" => SettlementStatus::Paid,
            "Confirmed" => SettlementStatus::Confirmed,
            _ => SettlementStatus::Pending,
        }
    }
}

/// Status implied by the amounts alone. Confirmation is not derivable here;
/// it only happens through confirm_settlement.
pub fn derive_settlement_status(amount_due: f64, amount_paid: f64) -> SettlementStatus {
    if amount_paid > 0.0 && amount_paid >= amount_due {
        SettlementStatus::Paid
    } else if amount_paid > 0.0 {
        SettlementStatus::Partial
    } else {
        SettlementStatus::Pending
    }
}

/// Create the payout record for a show. Balance and status are derived from
/// the amounts at creation time.
pub fn create_settlement(conn: &Connection, settlement: &Settlement) -> Result<i64> {
    let now = db::now_iso();
    let balance = settlement.amount_due - settlement.amount_paid;
    let status = derive_settlement_status(settlement.amount_due, settlement.amount_paid);

    conn.execute(
        "INSERT INTO settlements (
            show_id, artist, amount_due, currency, amount_paid, balance, status,
            payment_date, payment_reference, payment_method, artist_confirmed,
            notes, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
        params![
            settlement.show_id,
            settlement.artist,
            settlement.amount_due,
            settlement.currency,
            settlement.amount_paid,
            balance,
            status.as_str(),
            settlement.payment_date,
            settlement.payment_reference,
            settlement.payment_method,
            settlement.artist_confirmed,
            settlement.notes,
            now,
            now,
        ],
    )?;

    Ok(conn.last_insert_rowid())
}

/// Update a settlement's amounts; balance and status recompute automatically.
/// A Confirmed settlement keeps its status (terminal), only the figures move.
/// Returns Ok(false) when the settlement does not exist.
pub fn update_settlement_amounts(
    conn: &Connection,
    settlement_id: i64,
    amount_due: Option<f64>,
    amount_paid: Option<f64>,
) -> Result<bool> {
    let current = match db::load_settlement(conn, settlement_id)? {
        Some(settlement) => settlement,
        None => return Ok(false),
    };

    let due = amount_due.unwrap_or(current.amount_due);
    let paid = amount_paid.unwrap_or(current.amount_paid);

    let status = if SettlementStatus::parse(&current.status) == SettlementStatus::Confirmed {
        SettlementStatus::Confirmed
    } else {
        derive_settlement_status(due, paid)
    };

    conn.execute(
        "UPDATE settlements
         SET amount_due = ?1, amount_paid = ?2, balance = ?3, status = ?4, updated_at = ?5
         WHERE settlement_id = ?6",
        params![due, paid, due - paid, status.as_str(), db::now_iso(), settlement_id],
    )?;

    Ok(true)
}

/// Operator attestation that the artist has been paid out. Moves the record
/// to Confirmed regardless of what the amounts say.
pub fn confirm_settlement(conn: &Connection, settlement_id: i64, confirmed_by: &str) -> Result<bool> {
    let now = db::now_iso();

    let changed = conn.execute(
        "UPDATE settlements
         SET status = ?1, confirmed_by = ?2, confirmed_at = ?3, updated_at = ?3
         WHERE settlement_id = ?4",
        params![
            SettlementStatus::Confirmed.as_str(),
            confirmed_by,
            now,
            settlement_id
        ],
    )?;

    if changed > 0 {
        db::log_event(
            conn,
            "settlement_confirmed",
            "settlement",
            &settlement_id.to_string(),
            serde_json::json!({ "confirmed_by": confirmed_by }),
            confirmed_by,
        );
    }

    Ok(changed > 0)
}

/// Convenience: is there a settlement for this show already?
pub fn find_settlement_for_show(conn: &Connection, show_id: i64) -> Result<Option<Settlement>> {
    let settlement = conn
        .query_row(
            "SELECT settlement_id, show_id, artist, amount_due, currency, amount_paid,
                    balance, status, payment_date, payment_reference, payment_method,
                    confirmed_by, confirmed_at, artist_confirmed, notes, created_at, updated_at
             FROM settlements WHERE show_id = ?1 ORDER BY settlement_id DESC LIMIT 1",
            params![show_id],
            db::settlement_from_row,
        )
        .optional()?;

    Ok(settlement)
}

// ============================================================================
// TESTS
// ============================================================================
