use std::error::Error;
use std::path::Path;
use std::process::exit;

use clap::Parser;
use rusqlite::Connection;
use rust_decimal::Decimal;
use time::{Duration, OffsetDateTime};

use subscription_billing::{
    CategoryType, CurrencyCode, IntervalUnit, NewSubscription, create_account, create_category,
    create_user, initialize_db, insert_subscription,
};

/// A utility for creating a demo database for the subscription billing job.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// File path to save the SQLite database to.
    #[arg(long, short)]
    output_path: String,
}

/// Create and populate a database for manual testing.
///
/// Two of the subscriptions start today, so running `billing run` straight
/// after bills them.
fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();

    let output_path = Path::new(&args.output_path);

    match output_path.extension() {
        None => {
            eprintln!("Output path must include a file extension (e.g., 'my_database.db').");
            exit(1);
        }
        Some(extension) if extension.is_empty() => {
            eprintln!("Output path must include a file extension (e.g., 'my_database.db').");
            exit(1);
        }
        _ => {}
    }

    if output_path.is_file() {
        eprintln!("File already exists at {output_path:#?}!");
        exit(1);
    }

    println!("Creating database at {output_path:#?}");
    let conn = Connection::open(output_path)?;

    initialize_db(&conn)?;

    println!("Creating demo user...");
    let user = create_user("Demo", &conn)?;

    println!("Creating accounts and categories...");
    let everyday = create_account(user.id, "Everyday", CurrencyCode::new("NZD")?, &conn)?;
    let travel = create_account(user.id, "Travel", CurrencyCode::new("USD")?, &conn)?;
    let streaming = create_category(user.id, "Streaming", CategoryType::Expense, &conn)?;
    let utilities = create_category(user.id, "Utilities", CategoryType::Expense, &conn)?;
    create_category(user.id, "Salary", CategoryType::Income, &conn)?;

    println!("Creating subscriptions...");
    let today = OffsetDateTime::now_utc().date();
    let tomorrow = today + Duration::days(1);
    let in_three_days = today + Duration::days(3);
    let subscriptions = [
        (everyday.id, streaming.id, "Netflix", 1899, "NZD", today, IntervalUnit::Month),
        (everyday.id, streaming.id, "Spotify", 1199, "USD", today, IntervalUnit::Month),
        (travel.id, utilities.id, "VPN", 9999, "EUR", in_three_days, IntervalUnit::Year),
        (everyday.id, utilities.id, "Cleaner", 6000, "NZD", tomorrow, IntervalUnit::Week),
    ];

    for (account_id, category_id, vendor, cents, currency, starts_on, interval) in subscriptions {
        let subscription = NewSubscription::new(
            user.id,
            account_id,
            category_id,
            vendor,
            Decimal::new(cents, 2),
            CurrencyCode::new(currency)?,
            starts_on,
            interval,
        )?;

        insert_subscription(&subscription, &conn)?;
    }

    println!("Success!");

    Ok(())
}
