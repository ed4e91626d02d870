//! Queue-driven dataset ingestion
//!
//! # Architecture
//!
//! - **validator**: MD5 check of a received body against the queue's claim
//! - **filter**: path-glob key filters (`--prefix`)
//! - **decoder**: notification envelope / storage event decoding
//! - **registrar**: metadata fetch, `creation_dt` fill-in, index registration
//! - **outcome**: per-key results and the products-touched accumulator
//! - **consumer**: the drain loop deciding delete vs. retain for each message
//!
//! A message is deleted iff every key selected from it registered. Skipped keys are
//! not failures; checksum mismatches are deleted without being looked at.

pub mod consumer;
pub mod decoder;
pub mod filter;
pub mod outcome;
pub mod registrar;
pub mod validator;

pub use consumer::{Consumer, Disposition, PassSummary};
pub use decoder::{BodyFormat, DecodeError, DecodedEvent, EventDecoder, ObjectRecord};
pub use filter::{KeyFilter, PathGlob};
pub use outcome::{BatchOutcome, ProductTracker, RegistrationOutcome, RegistrationResult};
pub use registrar::{DatasetRegistrar, Registrar, RegistrationError};
