pub mod config;
pub mod db;
pub mod errors;
pub mod evaluator;
pub mod models;
pub mod report;
pub mod repositories;
pub mod services;

pub mod test_utils;
