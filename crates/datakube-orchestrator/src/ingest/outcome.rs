//! Per-message outcome aggregation

use datakube_common::{DatasetRef, ProductRef};
use std::collections::BTreeSet;
use thiserror::Error;

use super::{decoder::DecodeError, registrar::RegistrationError};

/// Error attached to a failed outcome
#[derive(Error, Debug)]
pub enum OutcomeError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Registration(#[from] RegistrationError),
}

/// Result of handling one key
#[derive(Debug)]
pub enum RegistrationResult {
    Registered(DatasetRef),
    Failed(OutcomeError),
    /// Filtered out; not an error
    Skipped,
}

#[derive(Debug)]
pub struct RegistrationOutcome {
    pub key: String,
    pub result: RegistrationResult,
}

impl RegistrationOutcome {
    pub fn registered(key: impl Into<String>, dataset: DatasetRef) -> Self {
        Self {
            key: key.into(),
            result: RegistrationResult::Registered(dataset),
        }
    }

    pub fn failed(key: impl Into<String>, error: impl Into<OutcomeError>) -> Self {
        Self {
            key: key.into(),
            result: RegistrationResult::Failed(error.into()),
        }
    }

    pub fn skipped(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            result: RegistrationResult::Skipped,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self.result, RegistrationResult::Failed(_))
    }
}

/// Every outcome produced for one message
#[derive(Debug, Default)]
pub struct BatchOutcome {
    outcomes: Vec<RegistrationOutcome>,
}

impl BatchOutcome {
    pub fn new() -> Self {
        Self::default()
    }

    /// A message that could not be decoded carries one synthetic failure keyed by the error code
    pub fn from_decode_error(error: DecodeError) -> Self {
        Self {
            outcomes: vec![RegistrationOutcome::failed(error.code(), error)],
        }
    }

    pub fn push(&mut self, outcome: RegistrationOutcome) {
        self.outcomes.push(outcome);
    }

    /// True when no key failed. Skipped keys do not count as failures.
    pub fn all_ok(&self) -> bool {
        !self.outcomes.iter().any(RegistrationOutcome::is_failure)
    }

    pub fn registered(&self) -> impl Iterator<Item = &DatasetRef> {
        self.outcomes.iter().filter_map(|outcome| match &outcome.result {
            RegistrationResult::Registered(dataset) => Some(dataset),
            _ => None,
        })
    }

    pub fn failures(&self) -> impl Iterator<Item = (&str, &OutcomeError)> {
        self.outcomes.iter().filter_map(|outcome| match &outcome.result {
            RegistrationResult::Failed(error) => Some((outcome.key.as_str(), error)),
            _ => None,
        })
    }

    pub fn skipped_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|outcome| matches!(outcome.result, RegistrationResult::Skipped))
            .count()
    }
}

/// Distinct products touched since the last range recomputation
#[derive(Debug, Default)]
pub struct ProductTracker {
    products: BTreeSet<ProductRef>,
}

impl ProductTracker {
    pub fn record(&mut self, product: &ProductRef) {
        self.products.insert(product.clone());
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }

    pub fn len(&self) -> usize {
        self.products.len()
    }

    /// Hand out the accumulated products and start over
    pub fn take(&mut self) -> Vec<ProductRef> {
        std::mem::take(&mut self.products).into_iter().collect()
    }
}
