// Thin CLI over the library: import files, list shows, print a settlement.
// All business logic lives in the library modules; this just wires paths
// and arguments to them.

use anyhow::Result;
use rusqlite::Connection;
use std::env;
use std::path::Path;

use showledger::{
    bank_batch_stats, compute_show_settlement, init_db, load_bank_transactions,
    load_handshakes, load_invoices, load_outgoing_payments, load_shows, BankImporter,
    BankQuery, Config, ContractImporter, InvoiceImporter, InvoiceQuery, ShowQuery,
};

fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();

    if args.len() < 3 {
        print_usage();
        std::process::exit(1);
    }

    let command = args[1].as_str();
    let db_path = args[2].as_str();

    let mut conn = Connection::open(Path::new(db_path))?;
    init_db(&conn)?;

    let config = Config::new();

    match command {
        "import-bank" => {
            let file = require_arg(&args, 3, "import-bank needs a CSV file");
            let mut importer = BankImporter::new(config);
            let outcome = importer.import_path(&mut conn, Path::new(&file))?;
            print_outcome(&outcome.message, outcome.success);
            print_report(&importer.summary().skipped, "Skipped");
            print_report(&importer.summary().duplicates, "Duplicates");
        }
        "import-contracts" => {
            let file = require_arg(&args, 3, "import-contracts needs a CSV file");
            let mut importer = ContractImporter::new(config);
            let outcome = importer.import_path(&mut conn, Path::new(&file))?;
            print_outcome(&outcome.message, outcome.success);
        }
        "import-invoices" => {
            let file = require_arg(&args, 3, "import-invoices needs a CSV file");
            let mut importer = InvoiceImporter::new(config);
            let outcome = importer.import_path(&mut conn, Path::new(&file))?;
            print_outcome(&outcome.message, outcome.success);
        }
        "shows" => {
            let shows = load_shows(&conn, &ShowQuery::default())?;
            println!("{} shows", shows.len());
            for show in shows {
                println!(
                    "  #{} {} @ {} [{} / {}]",
                    show.show_id,
                    show.artist,
                    show.venue.as_deref().unwrap_or("-"),
                    show.status,
                    show.settlement_status
                );
            }
        }
        "batches" => {
            for stat in bank_batch_stats(&conn)? {
                println!(
                    "  {}: {} transactions, in {:.2}, out {:.2} ({})",
                    stat.import_batch,
                    stat.transaction_count,
                    stat.total_in,
                    stat.total_out,
                    stat.date_range
                );
            }
        }
        "settlement" => {
            let show_id: i64 = require_arg(&args, 3, "settlement needs a show id")
                .parse()
                .unwrap_or(0);

            let shows = load_shows(&conn, &ShowQuery::default())?;
            let invoices = load_invoices(&conn, &InvoiceQuery::default())?;
            let handshakes = load_handshakes(&conn, None, None)?;
            let outgoing = load_outgoing_payments(&conn, None, None)?;

            match compute_show_settlement(show_id, &shows, &invoices, &handshakes, &outgoing, &config)
            {
                Some(s) => {
                    println!("Settlement for show #{} ({})", s.show_id, s.artist);
                    println!("  Invoiced:     {} {:.2}", s.currency, s.total_invoiced);
                    println!("  Received:     {} {:.2}", s.currency, s.total_received);
                    println!(
                        "  Outstanding:  {} {:.2} [{}]",
                        s.currency,
                        s.outstanding_from_promoter,
                        s.promoter_status.as_str()
                    );
                    println!("  Paid out:     {} {:.2}", s.currency, s.total_paid_out);
                    println!(
                        "  Artist due:   {} {:.2}, balance {:.2} [{}]",
                        s.currency,
                        s.net_artist_due,
                        s.artist_balance,
                        s.artist_status.as_str()
                    );
                    println!("  Agency:       {} {:.2}", s.currency, s.agency_position);
                    println!("  Overall:      {}", s.overall_status.as_str());
                }
                None => {
                    eprintln!("Show {} not found", show_id);
                    std::process::exit(1);
                }
            }
        }
        "unmatched" => {
            let unmatched = load_bank_transactions(
                &conn,
                &BankQuery {
                    unmatched_only: true,
                    incoming_only: true,
                    ..BankQuery::default()
                },
            )?;
            println!("{} unmatched incoming transactions", unmatched.len());
            for tx in unmatched {
                println!("  #{} {} {} {:.2} {}", tx.bank_id, tx.date, tx.currency, tx.amount, tx.description);
            }
        }
        _ => {
            print_usage();
            std::process::exit(1);
        }
    }

    Ok(())
}

fn require_arg(args: &[String], index: usize, message: &str) -> String {
    match args.get(index) {
        Some(value) => value.clone(),
        None => {
            eprintln!("{}", message);
            std::process::exit(1);
        }
    }
}

fn print_outcome(message: &str, success: bool) {
    if success {
        println!("✓ {}", message);
    } else {
        eprintln!("✗ {}", message);
    }
}

fn print_report(lines: &[String], label: &str) {
    if lines.is_empty() {
        return;
    }
    println!("{}:", label);
    for line in lines {
        println!("  {}", line);
    }
}

fn print_usage() {
    eprintln!("Usage: showledger <command> <db> [args]");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  import-bank      <db> <csv>   Import a bank statement");
    eprintln!("  import-contracts <db> <csv>   Import booking contracts (creates shows)");
    eprintln!("  import-invoices  <db> <csv>   Import invoices (long or simple format)");
    eprintln!("  shows            <db>         List shows");
    eprintln!("  unmatched        <db>         List unmatched incoming bank transactions");
    eprintln!("  batches          <db>         Per-import-batch statistics");
    eprintln!("  settlement       <db> <id>    Full settlement view for one show");
}
