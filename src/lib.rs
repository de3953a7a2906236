extern crate byteorder;
extern crate bytes;
#[macro_use]
extern crate error_chain;
extern crate futures;
#[macro_use]
extern crate log;
extern crate nix;
extern crate serde;
extern crate serde_cbor;
#[macro_use]
extern crate serde_derive;
extern crate tokio_core;
extern crate tokio_io;
extern crate tokio_timer;
extern crate tokio_uds;

pub mod common;
pub mod errors;
pub mod rpc;
pub mod scheduler;
pub mod table;
pub mod worker;

pub use errors::{Error, ErrorKind, Result, ResultExt};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const WORKER_PROTOCOL_VERSION: i32 = 0;
