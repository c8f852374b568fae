//! Client engine for a hierarchical coordination service.
//!
//! A session talks to the ensemble through a [`transport::SessionTransport`],
//! is driven by an [`engine::ConnectionEngine`], and exposes one-shot watches
//! ([`watch::WatchHandle`]) and atomic multi-op transactions
//! ([`multi::MultiBuilder`]) over a small, strongly-typed value model
//! ([`value`]).
//!
//! ```no_run
//! use std::sync::Arc;
//! use zk_client::connect_string::ConnectParams;
//! use zk_client::engine::ConnectionEngine;
//! use zk_client::transport::TestEnsemble;
//! use zk_client::value::{well_known, CreateMode};
//!
//! let _params = ConnectParams::parse("zk://localhost:2181").unwrap();
//! let ensemble = TestEnsemble::new();
//! let engine = ConnectionEngine::new(Arc::new(ensemble.connect()));
//! let result = engine
//!     .create("/service", *b"v1", well_known::open_unsafe(), CreateMode::NORMAL)
//!     .unwrap()
//!     .wait();
//! assert!(result.is_ok());
//! ```

pub mod completion;
pub mod connect_string;
pub mod engine;
pub mod error;
pub mod multi;
pub mod path;
pub mod request;
pub mod session;
pub mod transport;
pub mod value;
pub mod watch;

pub use error::{Error, ErrorKind};
pub use path::Path;
