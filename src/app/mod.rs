//! Core application logic: room state, message routing, and the actions the
//! handlers ask the runtime to carry out.

pub mod action;
pub mod display;
pub mod handler;
pub mod state;
