//! Luxtronik socket protocol: command set, frame codec and TCP client.

pub mod client;
pub mod codec;
pub mod command;

pub use client::{ClientOptions, LuxtronikClient};
pub use command::{Command, ReadKind};
