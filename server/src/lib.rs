pub extern crate actix_web;

pub mod admin;
pub mod connection;
mod connection_tx_storage;
pub mod handlers;
pub mod registry;
pub mod room;
pub mod rooms;
pub mod store;
