pub mod analysis;
pub mod cache;
pub mod changes;
pub mod cli;
pub mod config;
pub mod db;
pub mod dispatch;
pub mod model;
pub mod parser;
pub mod resolver;
