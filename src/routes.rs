use std::sync::Arc;

use log::{debug, error, Logger};
use warp::http::StatusCode;
use warp::reject;
use warp::reply::{json, with_status, Json, WithStatus};

use crate::errors::BackendError;

pub mod admin;
mod handlers;
mod query;
mod rejection;
mod response;

pub use internal::*;

/// The maximum form data size to accept, photo included.
const MAX_CONTENT_LENGTH: u64 = 64 * 1024 * 1024;

pub async fn format_rejection(
    logger: Arc<Logger>,
    rej: reject::Rejection,
) -> Result<WithStatus<Json>, reject::Rejection> {
    if let Some(r) = rej.find::<rejection::Rejection>() {
        let e = &r.error;
        let status = status_code_for(e);

        if status.is_server_error() {
            error!(logger, "Backend error"; "context" => ?r.context, "error" => ?r.error, "status" => %status, "message" => %r.error);
        } else {
            debug!(logger, "Request refused"; "context" => ?r.context, "status" => %status, "message" => %r.error);
        }

        return Ok(with_status(json(&r.flatten()), status));
    }

    Err(rej)
}

fn status_code_for(e: &BackendError) -> StatusCode {
    use BackendError::*;

    if e.is_not_found() {
        return StatusCode::NOT_FOUND;
    }

    match e {
        MalformedFormSubmission | MissingField(..) | InvalidField { .. } => {
            StatusCode::BAD_REQUEST
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

mod internal {
    use warp::filters::multipart::form;
    use warp::filters::BoxedFilter;
    use warp::path::end;
    use warp::Filter;
    use warp::Reply;
    use warp::{get as g, patch, path as p, path::param as par, post, query};

    use super::{handlers, query as q, MAX_CONTENT_LENGTH};
    use crate::environment::Environment;
    use crate::urls::FILES_PATH;

    type Route = BoxedFilter<(Box<dyn Reply>,)>;

    macro_rules! route_filter {
        ($route_variable:ident; $first:expr) => (let $route_variable = $route_variable.and($first););
        ($route_variable:ident; $first:expr, $($rest:expr),+) => (
            let $route_variable = $route_variable.and($first);
            route_filter!($route_variable; $($rest),+);
        )
    }

    macro_rules! route {
        ($name:ident => $handler:ident, $route_variable:ident; $($filters:expr),+) => (
            pub fn $name(environment: Environment) -> Route {
                let $route_variable = warp::any().map(move || environment.clone());

                route_filter!($route_variable; $($filters),+);

                $route_variable.and_then(handlers::$handler)
                    .boxed()
            }
        );
    }

    route!(make_report_missing_route => report_missing, rt; p("report-missing"), end(), post(), form().max_length(MAX_CONTENT_LENGTH));
    route!(make_report_sighting_route => report_sighting, rt; p("report-sighting"), end(), post(), form().max_length(MAX_CONTENT_LENGTH));
    route!(make_my_reports_route => my_reports, rt; p("my-reports"), end(), g(), query::<q::PhoneQuery>());
    route!(make_my_searches_route => my_searches, rt; p("my-searches"), end(), g(), query::<q::PhoneQuery>());
    route!(make_potential_matches_route => potential_matches, rt; p("potential-matches"), end(), g(), query::<q::MatchesQuery>());
    route!(make_file_route => file, rt; p(FILES_PATH), par::<String>(), end(), g());
    route!(make_mark_found_route => mark_found, rt; p("my-reports"), par::<String>(), p("found"), end(), patch());

    /// Any origin may call the public routes.
    fn cors() -> warp::cors::Cors {
        warp::cors()
            .allow_any_origin()
            .allow_methods(vec!["GET", "POST", "PATCH"])
            .allow_header("content-type")
            .build()
    }

    /// Every public route, in the order they are tried.
    pub fn make_main_routes(environment: Environment) -> Route {
        make_report_missing_route(environment.clone())
            .or(make_report_sighting_route(environment.clone()))
            .unify()
            .or(make_my_reports_route(environment.clone()))
            .unify()
            .or(make_my_searches_route(environment.clone()))
            .unify()
            .or(make_potential_matches_route(environment.clone()))
            .unify()
            .or(make_file_route(environment.clone()))
            .unify()
            .or(make_mark_found_route(environment))
            .unify()
            .with(cors())
            .map(|reply| Box::new(reply) as Box<dyn Reply>)
            .boxed()
    }
}
