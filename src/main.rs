use std::error::Error;
use std::sync::Arc;

use futures::future::FutureExt;
use tokio::sync::mpsc;
use warp::Filter;

use log::{info, initialize_logger};
use reunite::config::{get_variable, parse_variable};
use reunite::db::PgDb;
use reunite::environment::{Config, Environment};
use reunite::matcher::HttpMatcher;
use reunite::routes;
use reunite::store::S3Store;
use reunite::urls::Urls;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenv::dotenv().ok();

    #[cfg(feature = "env_logging")]
    let _guard = log::initialize_env_logger();

    let logger = initialize_logger();

    let main_port: u16 = parse_variable("BACKEND_PORT");
    let admin_port: u16 = parse_variable("BACKEND_ADMIN_PORT");

    info!(logger, "Starting..."; "main_port" => main_port, "admin_port" => admin_port);
    let logger = Arc::new(logger);

    let store = Arc::new(S3Store::from_env().expect("initialize S3 store from environment"));

    info!(logger, "Creating database pool...");
    let connection_string = get_variable("BACKEND_DB_CONNECTION_STRING");
    let pool = sqlx::PgPool::connect(&connection_string)
        .await
        .expect("create database pool from BACKEND_DB_CONNECTION_STRING");
    let db = Arc::new(PgDb::new(pool));

    let matcher = Arc::new(HttpMatcher::from_env(logger.clone()));
    let urls = Arc::new(Urls::new(get_variable("BACKEND_BASE_URL")));
    let config = Config::from_env();
    info!(logger, "Loaded configuration"; "config" => ?config);

    let environment = Environment::new(logger.clone(), db, urls, store, matcher, config);

    let (termination_sender, mut termination_receiver) = mpsc::channel::<()>(1);

    let terminate: routes::admin::TerminationFunctionWrapper = Arc::new(move || {
        let termination_sender = termination_sender.clone();

        async move {
            // a full channel means termination is already under way
            let _ = termination_sender.try_send(());
        }
        .boxed()
    });

    let should_terminate = async move {
        termination_receiver.recv().await;
    }
    .shared();

    let ctrlc = {
        let should_terminate = should_terminate.clone();
        let terminate = terminate.clone();

        let signal = tokio::signal::ctrl_c();

        async move {
            tokio::select! {
                _ = should_terminate => {},
                _ = signal => {
                    terminate().await;
                }
            }
        }
    };

    let main_server = {
        let should_terminate = should_terminate.clone();
        let logger = logger.clone();

        let routes = routes::make_main_routes(environment.clone())
            .recover(move |r| routes::format_rejection(logger.clone(), r));

        let (_, main_server) =
            warp::serve(routes).bind_with_graceful_shutdown(([0, 0, 0, 0], main_port), async {
                should_terminate.await;
            });

        main_server
    };

    let admin_server = {
        let should_terminate = should_terminate.clone();

        let routes = routes::admin::make_healthz_route()
            .or(routes::admin::make_termination_route(terminate.clone()));

        let (_, admin_server) =
            warp::serve(routes).bind_with_graceful_shutdown(([0, 0, 0, 0], admin_port), async {
                should_terminate.await;
            });

        admin_server
    };

    tokio::join!(ctrlc, main_server, admin_server);

    info!(logger, "Exiting gracefully...");

    Ok(())
}
