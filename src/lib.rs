//! mockwire
//!
//! Emulates backend services: inbound messages arrive over a transport,
//! are matched against configured rules and answered with canned responses.
//!
//! # Features
//!
//! - **Transports**: HTTP request/response and AMQP queue consumers
//! - **Routing**: static and templated HTTP paths (`/users/{id}`)
//! - **Rules**: first matching `when` condition wins, ruleless entries act
//!   as defaults
//! - **Dispatch**: bounded worker pool with per-request response channels,
//!   admission control and a response timeout
//!
//! # Example Suite (`main.yml`)
//!
//! ```yaml
//! connections:
//!   - name: web
//!     protocol: http
//!     host: 0.0.0.0
//!     port: 8080
//! listen:
//!   - source: web
//!     workers: 4
//!     endpoints:
//!       - name: echo
//!         method: POST
//!         url: /echo
//!         tests:
//!           - when:
//!               type: a
//!             then:
//!               response: A
//!           - then:
//!               response: default
//! ```

pub mod codec;
pub mod config;
pub mod connector;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod listener;
pub mod message;
pub mod router;
pub mod supervisor;
pub mod value;

pub use config::Suite;
pub use supervisor::Supervisor;
