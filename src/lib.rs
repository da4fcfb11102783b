pub mod anonymizer;
pub mod db;
pub mod error;
pub mod export;
pub mod logic;
pub mod models;
pub mod results;
pub mod roster;
pub mod statistics;
pub mod store;
pub mod timing;
pub mod visibility;

#[cfg(test)]
mod fixtures;
