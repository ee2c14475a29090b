//! Reading and adjusting a Danfoss ECL Comfort 310 heating controller over Modbus TCP.
//!
//! [`service::Service`] exposes the controller in domain terms (heat curves, circuit modes, the
//! clock) on top of any [`access::RegisterAccess`]. [`connection::Connection`] is the Modbus TCP
//! transport used by the command line tool.

pub mod access;
pub mod codec;
pub mod commands;
pub mod connection;
pub mod modbus;
pub mod model;
pub mod output;
pub mod planner;
pub mod registers;
pub mod service;
pub mod validate;

#[cfg(test)]
mod testing;
