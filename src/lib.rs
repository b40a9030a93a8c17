pub mod config;
pub mod correlation;
pub mod dates;
pub mod db;
pub mod environment;
pub mod errors;
pub mod io;
pub mod lifecycle;
pub mod matcher;
pub mod normalization;
pub mod report;
pub mod routes;
pub mod store;
pub mod urls;
