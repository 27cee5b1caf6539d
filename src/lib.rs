pub mod db;
pub mod geo;
pub mod server;
pub mod services;
pub mod tracking;
pub mod web;

pub mod alerting;
