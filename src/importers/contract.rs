// Contract importer (booking-system exports).
//
// Each row carries the full deal terms for one booking. Importing a contract
// also derives and persists its companion show, so a contract import always
// produces a 1:1 contract/show pair: the contract is the deal of record, the
// show is the anchor everything else (invoices, payments, settlements)
// attaches to.

use anyhow::Result;
use rusqlite::Connection;
use std::collections::HashMap;
use std::path::Path;

use crate::config::Config;
use crate::db::{self, Contract, Show};
use crate::importers::{new_batch_id, ImportOutcome, ImportSummary};
use crate::ingest::{coerce_amount, coerce_text, resolve_fields, Sheet};

/// Synonym sets for every deal-term field a booking export may carry.
/// Order matters: the exact pass runs over all of them before any substring
/// matching, so short names ("af", "bf", "wht") only ever match exactly.
const CONTRACT_FIELDS: [(&str, &[&str]); 20] = [
    ("contract_number", &["contract number", "contract", "booking id", "contract_number"]),
    ("booking_date", &["booking date", "booked", "date booked"]),
    ("artist", &["artist", "act", "performer"]),
    ("event_name", &["event", "event name", "show", "festival"]),
    ("venue", &["venue", "location", "club"]),
    ("city", &["city", "town"]),
    ("country", &["country", "nation"]),
    ("performance_date", &["performance date", "show date", "date", "gig date"]),
    ("performance_day", &["performance day", "day", "day of week"]),
    ("deal_description", &["contracted deal", "deal", "deal description", "deal terms"]),
    ("total_deal_value", &["total deal value", "deal value", "total value", "total"]),
    ("currency", &["currency", "ccy", "curr"]),
    ("artist_fee", &["af", "artist fee", "fee"]),
    ("booking_fee", &["bf", "booking fee", "agency fee"]),
    ("booking_fee_vat", &["bf vat", "booking fee vat", "vat"]),
    ("hotel_buyout", &["hotel buyout", "hotel", "accommodation"]),
    ("flight_buyout", &["flight", "flights", "air"]),
    ("ground_transport_buyout", &["ground buyout", "ground transport", "transport", "ground"]),
    ("withholding_tax", &["wht", "withholding tax", "withholding", "tax"]),
    ("total_artist_settlement", &["total settlement", "artist settlement", "settlement", "net to artist"]),
];

pub struct ContractImporter {
    config: Config,
    batch_id: String,
    errors: Vec<String>,
    skipped: Vec<String>,
    duplicates: Vec<String>,
}

impl ContractImporter {
    pub fn new(config: Config) -> Self {
        ContractImporter {
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

    pub fn import_path(&mut self, conn: &mut Connection, path: &Path) -> Result<ImportOutcome> {
        let sheet = match Sheet::from_path(path) {
            Ok(sheet) => sheet,
            Err(err) => return Ok(ImportOutcome::failure(format!("Import error: {:#}", err))),
        };

        self.import_sheet(conn, &sheet)
    }

    pub fn import_sheet(&mut self, conn: &mut Connection, sheet: &Sheet) -> Result<ImportOutcome> {
        let cols = resolve_fields(&sheet.headers, &CONTRACT_FIELDS);

        if !cols.contains_key("contract_number") {
            self.errors
                .push("Missing required column: Contract Number".to_string());
            return Ok(ImportOutcome::failure(
                "Missing required column: Contract Number",
            ));
        }

        let mut contracts_created = 0usize;
        let mut shows_created = 0usize;

        for (idx, row) in sheet.rows.iter().enumerate() {
            let row_num = idx + 2;

            let contract_number = match self.text(sheet, row, &cols, "contract_number") {
                Some(number) => number,
                None => {
                    self.skipped
                        .push(format!("Row {}: No contract number", row_num));
                    continue;
                }
            };

            if db::contract_exists(conn, &contract_number)? {
                self.duplicates
                    .push(format!("Row {}: Contract {}", row_num, contract_number));
                continue;
            }

            let contract = self.parse_contract(sheet, row, &cols, &contract_number);
            let contract_id = db::create_contract(conn, &contract)?;
            contracts_created += 1;

            // A contract always gets its companion show
            let show = contract_to_show(&contract);
            let show_id = db::create_show(conn, &show)?;
            shows_created += 1;

            db::link_contract_to_show(conn, contract_id, show_id)?;
        }

        if contracts_created > 0 {
            db::log_event(
                conn,
                "contract_import",
                "import_batch",
                &self.batch_id,
                serde_json::json!({
                    "contracts": contracts_created,
                    "shows": shows_created,
                    "duplicates": self.duplicates.len(),
                }),
                "contract_importer",
            );
        }

        let mut message_parts = vec![format!("Imported {} contracts", contracts_created)];
        if shows_created > 0 {
            message_parts.push(format!("Created {} shows", shows_created));
        }
        if !self.duplicates.is_empty() {
            message_parts.push(format!("{} duplicates", self.duplicates.len()));
        }
        if !self.skipped.is_empty() {
            message_parts.push(format!("{} skipped", self.skipped.len()));
        }

        Ok(ImportOutcome {
            success: true,
            message: message_parts.join(" | "),
            imported: contracts_created,
        })
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

    fn parse_contract(
        &self,
        sheet: &Sheet,
        row: &[String],
        cols: &HashMap<&'static str, usize>,
        contract_number: &str,
    ) -> Contract {
        Contract {
            contract_id: 0,
            contract_number: contract_number.to_string(),
            booking_date: self.text(sheet, row, cols, "booking_date"),
            artist: self.text(sheet, row, cols, "artist"),
            event_name: self.text(sheet, row, cols, "event_name"),
            venue: self.text(sheet, row, cols, "venue"),
            city: self.text(sheet, row, cols, "city"),
            country: self.text(sheet, row, cols, "country"),
            performance_date: self.text(sheet, row, cols, "performance_date"),
            performance_day: self.text(sheet, row, cols, "performance_day"),
            deal_description: self.text(sheet, row, cols, "deal_description"),
            total_deal_value: self.amount(sheet, row, cols, "total_deal_value"),
            currency: self
                .config
                .normalize_currency(sheet.cell(row, cols.get("currency").copied())),
            artist_fee: self.amount(sheet, row, cols, "artist_fee"),
            booking_fee: self.amount(sheet, row, cols, "booking_fee"),
            booking_fee_vat: self.amount(sheet, row, cols, "booking_fee_vat"),
            hotel_buyout: self.amount(sheet, row, cols, "hotel_buyout"),
            flight_buyout: self.amount(sheet, row, cols, "flight_buyout"),
            ground_transport_buyout: self.amount(sheet, row, cols, "ground_transport_buyout"),
            withholding_tax: self.amount(sheet, row, cols, "withholding_tax"),
            total_artist_settlement: self.amount(sheet, row, cols, "total_artist_settlement"),
            import_batch: Some(self.batch_id.clone()),
            imported_at: None,
            show_id: None,
        }
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

/// Derive the show record a contract describes. The contract is the deal;
/// the show is what reconciliation tracks from here on.
fn contract_to_show(contract: &Contract) -> Show {
    Show {
        show_id: 0,
        contract_number: Some(contract.contract_number.clone()),
        agent: None,
        artist: contract.artist.clone().unwrap_or_default(),
        event_name: contract.event_name.clone(),
        venue: contract.venue.clone(),
        city: contract.city.clone(),
        country: contract.country.clone(),
        booking_date: contract.booking_date.clone(),
        performance_date: contract.performance_date.clone(),
        performance_day: contract.performance_day.clone(),
        deal_description: contract.deal_description.clone(),
        total_deal_value: contract.total_deal_value,
        currency: contract.currency.clone(),
        artist_fee: contract.artist_fee,
        booking_fee: contract.booking_fee,
        hotel_buyout: contract.hotel_buyout,
        flight_buyout: contract.flight_buyout,
        ground_transport_buyout: contract.ground_transport_buyout,
        withholding_tax: contract.withholding_tax,
        net_artist_settlement: contract.total_artist_settlement,
        promoter_name: None,
        status: "Contracted".to_string(),
        settlement_status: "Pending".to_string(),
        notes: None,
        created_at: None,
        updated_at: None,
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{init_db, load_contracts, load_shows, ShowQuery};

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        init_db(&conn).unwrap();
        conn
    }

    fn booking_sheet() -> Sheet {
        Sheet::from_rows(
            &[
                "Contract Number", "Booking Date", "Artist", "Event", "Venue", "City",
                "Performance date", "Contracted Deal", "Total deal Value", "AF",
                "Hotel buyout", "Flight", "WHT", "BF", "Total Settlement",
            ],
            &[
                &[
                    "910516", "2025-05-01", "Minna", "Fabric Live", "Fabric", "London",
                    "2025-11-08", "AF £1000 & BF £200", "1200", "1000",
                    "0", "0", "0", "200", "1000",
                ],
                &[
                    "910517", "2025-05-02", "Shubostar", "Warehouse Project", "Depot", "Manchester",
                    "2025-11-15", "AF £3400 & BF £600", "4000", "3400",
                    "150", "250", "0", "600", "3000",
                ],
            ],
        )
    }

    #[test]
    fn test_contract_import_creates_contract_show_pairs() {
        let mut conn = test_conn();
        let mut importer = ContractImporter::new(Config::new());

        let outcome = importer.import_sheet(&mut conn, &booking_sheet()).unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.imported, 2);

        let contracts = load_contracts(&conn, None).unwrap();
        let shows = load_shows(&conn, &ShowQuery::default()).unwrap();
        assert_eq!(contracts.len(), 2);
        assert_eq!(shows.len(), 2);

        // every contract is back-linked to exactly the show it derived
        for contract in &contracts {
            let show_id = contract.show_id.expect("contract must link to its show");
            let show = shows.iter().find(|s| s.show_id == show_id).unwrap();
            assert_eq!(show.contract_number.as_deref(), Some(contract.contract_number.as_str()));
            assert_eq!(show.status, "Contracted");
            assert_eq!(show.settlement_status, "Pending");
        }

        let minna = shows.iter().find(|s| s.artist == "Minna").unwrap();
        assert_eq!(minna.artist_fee, 1000.0);
        assert_eq!(minna.booking_fee, 200.0);
        assert_eq!(minna.net_artist_settlement, 1000.0);
    }

    #[test]
    fn test_duplicate_contract_numbers_are_skipped() {
        let mut conn = test_conn();

        let mut first = ContractImporter::new(Config::new());
        first.import_sheet(&mut conn, &booking_sheet()).unwrap();

        let mut second = ContractImporter::new(Config::new());
        let outcome = second.import_sheet(&mut conn, &booking_sheet()).unwrap();
        assert_eq!(outcome.imported, 0);
        assert_eq!(second.summary().duplicate_count(), 2);

        // no extra shows either
        let shows = load_shows(&conn, &ShowQuery::default()).unwrap();
        assert_eq!(shows.len(), 2);
    }

    #[test]
    fn test_missing_contract_number_column_aborts() {
        let mut conn = test_conn();
        let mut importer = ContractImporter::new(Config::new());

        let sheet = Sheet::from_rows(&["Artist", "Venue"], &[&["Minna", "Fabric"]]);
        let outcome = importer.import_sheet(&mut conn, &sheet).unwrap();

        assert!(!outcome.success);
        assert!(outcome.message.contains("Contract Number"));
        assert!(load_contracts(&conn, None).unwrap().is_empty());
    }

    #[test]
    fn test_rows_without_contract_number_are_skipped() {
        let mut conn = test_conn();
        let mut importer = ContractImporter::new(Config::new());

        let sheet = Sheet::from_rows(
            &["Contract Number", "Artist"],
            &[&["", "No Number"], &["910518", "Kerri"]],
        );

        let outcome = importer.import_sheet(&mut conn, &sheet).unwrap();
        assert_eq!(outcome.imported, 1);
        assert_eq!(importer.summary().skipped_count(), 1);
    }

    #[test]
    fn test_short_field_codes_resolve_exactly() {
        // "AF"/"BF"/"WHT" columns must land on the right fields even though
        // they are too short for substring matching
        let mut conn = test_conn();
        let mut importer = ContractImporter::new(Config::new());

        let sheet = Sheet::from_rows(
            &["Contract Number", "Artist", "AF", "BF", "WHT"],
            &[&["910519", "Minna", "2000", "400", "100"]],
        );

        importer.import_sheet(&mut conn, &sheet).unwrap();

        let contracts = load_contracts(&conn, None).unwrap();
        assert_eq!(contracts[0].artist_fee, 2000.0);
        assert_eq!(contracts[0].booking_fee, 400.0);
        assert_eq!(contracts[0].withholding_tax, 100.0);
    }
}
