use std::{
    error::Error,
    path::PathBuf,
    process::ExitCode,
    sync::{Arc, Mutex},
};

use clap::{Parser, Subcommand};
use rusqlite::Connection;
use time::{Date, Time, macros::format_description};

use subscription_billing::{
    BillingConfig, BillingJob, DEFAULT_BASE_URL, ExchangeRateClient, ExchangeRateConfig,
    initialize_db, local_today, log_report, parse_run_time, run_daily, setup_logging,
};

/// Bills recurring subscriptions once a day.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// File path to the application SQLite database.
    #[arg(long, env = "DB_PATH")]
    db_path: PathBuf,

    /// The API key for exchangerate-api.com.
    #[arg(long, env = "EXCHANGE_RATE_API_KEY", hide_env_values = true)]
    exchange_rate_api_key: String,

    /// The base URL of the exchange rate API.
    #[arg(long, env = "EXCHANGE_RATE_BASE_URL", default_value = DEFAULT_BASE_URL)]
    exchange_rate_base_url: String,

    /// The canonical timezone that decides which day it is, e.g. "Pacific/Auckland".
    #[arg(long, env = "LOCAL_TIMEZONE", default_value = "Etc/UTC")]
    local_timezone: String,

    /// Also write debug logs to this file.
    #[arg(long)]
    debug_log: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the billing job every day at a fixed local time.
    Serve {
        /// The local time of day to bill at, as HH:MM.
        #[arg(long, env = "BILLING_RUN_AT", default_value = "09:00", value_parser = parse_run_time)]
        run_at: Time,
    },
    /// Run the billing job once, right now.
    Run {
        /// Bill the subscriptions due on this date (YYYY-MM-DD) instead of today.
        #[arg(long, value_parser = parse_date)]
        date: Option<Date>,
    },
}

fn parse_date(text: &str) -> Result<Date, time::error::Parse> {
    Date::parse(text, format_description!("[year]-[month]-[day]"))
}

fn main() -> ExitCode {
    let args = Args::parse();

    if let Err(error) = setup_logging(args.debug_log.as_deref()) {
        eprintln!("Could not set up logging: {error}");
        return ExitCode::FAILURE;
    }

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            tracing::error!("{error}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<(), Box<dyn Error>> {
    let connection = Connection::open(&args.db_path)?;
    initialize_db(&connection)?;

    let exchange_rate = ExchangeRateConfig {
        api_key: args.exchange_rate_api_key,
        base_url: args.exchange_rate_base_url,
        ..ExchangeRateConfig::default()
    };
    // The blocking client must be built and dropped outside the async runtime.
    let rates = ExchangeRateClient::new(&exchange_rate)?;
    let job = Arc::new(BillingJob::new(Arc::new(Mutex::new(connection)), rates));

    match args.command {
        Command::Run { date } => {
            let today = match date {
                Some(date) => date,
                None => local_today(&args.local_timezone)?,
            };

            tracing::info!("Running billing job for {today}");
            let report = job.run(today)?;
            log_report(&report);
        }
        Command::Serve { run_at } => {
            let config = BillingConfig {
                db_path: args.db_path,
                local_timezone: args.local_timezone,
                run_at,
                exchange_rate,
            };

            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()?;

            tracing::info!("Billing scheduler started for {:?}", config.db_path);
            runtime.block_on(run_daily(job.clone(), &config))?;
        }
    }

    Ok(())
}
