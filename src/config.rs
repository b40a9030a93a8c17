use std::env;
use std::fmt::Debug;
use std::str::FromStr;

/// Returns the value of the named environment variable if it exists or panics.
pub fn get_variable(name: &str) -> String {
    env::var(name).unwrap_or_else(|_| panic!("must define {} environment variable", name))
}

/// Parses the named environment variable, or panics if it's missing or malformed.
pub fn parse_variable<T>(name: &str) -> T
where
    T: FromStr,
    T::Err: Debug,
{
    let value = get_variable(name);

    value
        .parse()
        .unwrap_or_else(|e| panic!("parse {}={:?}: {:?}", name, value, e))
}

/// Parses the named environment variable if it's set, otherwise returns `default`.
pub fn parse_variable_or<T>(name: &str, default: T) -> T
where
    T: FromStr,
    T::Err: Debug,
{
    match env::var(name) {
        Ok(_) => parse_variable(name),
        Err(_) => default,
    }
}
