//! capslayer -- CapsLock chord layer for macOS and Windows.
//!
//! Holding the chord key turns the keyboard into a navigation and command
//! layer. The crate is split into the pure pieces (key space, action table,
//! chord state machine, dispatcher) and the platform backends that tap and
//! inject events.

pub mod action;
pub mod chord;
pub mod cli;
pub mod config;
pub mod console;
pub mod control;
pub mod dispatch;
pub mod engine;
pub mod event_bus;
pub mod guard;
pub mod keycode;
pub mod platform;
pub mod service;
pub mod table;
