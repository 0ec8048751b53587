//! Private database exploration protocol
//!
//! The [`Client`] holds the secrets and builds a [`Request`]: key material,
//! one encrypted lookup table per column, and two private thresholds. The
//! [`Server`] evaluates the request over a plaintext [`Database`] and returns
//! a single ciphertext: ≈1 when at least `t_global` rows have a score sum of
//! at least `t_local`, ≈0 otherwise.
//!
//! # Example
//!
//! ```
//! use pde_explore::engine::ClearEngine;
//! use pde_explore::lut::ScoringFunction;
//! use pde_explore::params::PdeParams;
//! use pde_explore::pde::{Client, DenseDatabase, Server};
//!
//! let engine = ClearEngine::with_seed(1);
//! let (client, keys) = Client::init(&engine, PdeParams::test_small()).unwrap();
//!
//! let functions = vec![ScoringFunction::indicator((0.0, 4.0), 32, 1.5, 1.0).unwrap(); 2];
//! let request = client.gen_request(keys, &functions, 2.0, 1.0, 8).unwrap();
//!
//! let db = DenseDatabase::synthetic(8, 2, 3);
//! let score = Server::new(&engine).process_request(&request, &db).unwrap();
//! let value = client.decrypt(&score).unwrap()[0];
//! assert!(value > -0.01 && value < 1.01);
//! ```

mod client;
mod database;
mod debug;
mod request;
mod server;

pub use client::{plaintext_score, Client};
pub use database::{Database, DenseDatabase};
pub use debug::DebugDecryptor;
pub use request::{PrivateThreshold, Request, RequestSizes};
pub use server::Server;
