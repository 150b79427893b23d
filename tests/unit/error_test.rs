//! Tests for error types

use kitchen_slots::core::{AdminError, AdmissionError, SlotId, StoreError};

#[test]
fn test_admission_error_codes() {
    assert_eq!(AdmissionError::KitchenClosed.code(), "kitchen_closed");
    assert_eq!(AdmissionError::FullyBooked.code(), "fully_booked");
    assert_eq!(
        AdmissionError::StoreUnavailable(StoreError::Timeout).code(),
        "store_unavailable"
    );
    assert_eq!(
        AdmissionError::InvalidOrder("zero".into()).code(),
        "invalid_order"
    );
    assert_eq!(
        AdmissionError::AlreadyAdmitted(SlotId(0)).code(),
        "already_admitted"
    );
}

#[test]
fn test_retryable_conditions() {
    assert!(AdmissionError::KitchenClosed.is_retryable());
    assert!(AdmissionError::FullyBooked.is_retryable());
    assert!(AdmissionError::StoreUnavailable(StoreError::Timeout).is_retryable());
    assert!(!AdmissionError::InvalidOrder("x".into()).is_retryable());
    assert!(!AdmissionError::AlreadyAdmitted(SlotId(1)).is_retryable());
}

#[test]
fn test_store_error_transience() {
    assert!(StoreError::Timeout.is_transient());
    assert!(StoreError::Unavailable("down".into()).is_transient());
    assert!(StoreError::Backend("deadlock".into()).is_transient());
    assert!(!StoreError::Corrupt("bad int".into()).is_transient());
}

#[test]
fn test_error_display() {
    let err = AdmissionError::StoreUnavailable(StoreError::Unavailable("refused".into()));
    assert_eq!(
        err.to_string(),
        "capacity store unavailable: store unavailable: refused"
    );
    assert_eq!(
        AdminError::InvalidCapacity(0).to_string(),
        "invalid capacity 0: must be greater than 0"
    );
}

#[test]
fn test_admission_error_source_chain() {
    use std::error::Error;
    let err = AdmissionError::StoreUnavailable(StoreError::Timeout);
    let source = err.source().map(ToString::to_string);
    assert_eq!(source.as_deref(), Some("store timeout"));
}

#[test]
fn test_store_error_converts_into_admin_error() {
    let err: AdminError = StoreError::Timeout.into();
    assert_eq!(err, AdminError::Store(StoreError::Timeout));
}
