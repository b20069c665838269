//! Keepa Relay: forwards today's Keepa price alerts from Gmail to WhatsApp.

pub mod auth;
pub mod config;
pub mod error;
pub mod mail;
pub mod messaging;
pub mod relay;
