use std::error::Error;
use std::sync::Arc;

use dotenv::dotenv;
use structopt::StructOpt;

use log::{debug, info, initialize_logger};
use reunite::config::get_variable;
use reunite::db::PgDb;
use reunite::environment::{Config, Environment};
use reunite::matcher::HttpMatcher;
use reunite::normalization::normalize;
use reunite::store::S3Store;
use reunite::urls::Urls;

#[derive(Debug, StructOpt)]
#[structopt(
    name = "potential-matches",
    about = "Print the potential matches for a reporter's missing reports as JSON"
)]
struct Opt {
    /// The phone number the missing reports were filed under
    phone_number: String,

    /// How many sightings to keep per missing report
    #[structopt(short, long)]
    limit_per_report: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenv().ok();

    let opt = Opt::from_args();

    let logger = Arc::new(initialize_logger());

    let connection_string = get_variable("BACKEND_DB_CONNECTION_STRING");
    let pool = sqlx::PgPool::connect(&connection_string)
        .await
        .expect("create database pool from BACKEND_DB_CONNECTION_STRING");

    let config = Config::from_env();
    let environment = Environment::new(
        logger.clone(),
        Arc::new(PgDb::new(pool)),
        Arc::new(Urls::new(get_variable("BACKEND_BASE_URL"))),
        Arc::new(S3Store::from_env()?),
        Arc::new(HttpMatcher::from_env(logger.clone())),
        config,
    );

    let phone_number = normalize(&opt.phone_number);
    let limit_per_report = opt
        .limit_per_report
        .unwrap_or_else(|| environment.config.default_limit_per_report());

    info!(logger, "Finding potential matches..."; "phone_number" => &phone_number, "limit_per_report" => limit_per_report);

    let correlation = environment
        .correlator()
        .find_potential_matches(&phone_number, limit_per_report)
        .await?;

    debug!(logger, "Done"; "matches" => correlation.matches.len(), "failed_reports" => correlation.failed_reports.len());

    println!("{}", serde_json::to_string_pretty(&correlation)?);

    Ok(())
}
