use licensor_activation::{ActivationError, AuthorityError};
use licensor_types::{RateLimitReason, Reason};

#[test]
fn error_display_hardware_id() {
    let err = ActivationError::HardwareId("no machine id".into());
    let msg = format!("{err}");
    assert!(msg.contains("hardware id"));
    assert!(msg.contains("no machine id"));
}

#[test]
fn error_display_rate_limited() {
    let err = ActivationError::RateLimited {
        reason: RateLimitReason::RateLimitInterval,
        retry_after_secs: 42,
    };
    let msg = format!("{err}");
    assert!(msg.contains("rate_limit_interval"));
    assert!(msg.contains("42"));
}

#[test]
fn error_display_invalid_transfer_token_is_low_detail() {
    let err = ActivationError::InvalidTransferToken;
    assert_eq!(format!("{err}"), "invalid or expired transfer token");
}

#[test]
fn error_display_invalid_input() {
    let err = ActivationError::InvalidInput("empty code".into());
    assert!(format!("{err}").contains("invalid input"));
}

#[test]
fn error_from_serde_json() {
    let serde_err: Result<serde_json::Value, _> = serde_json::from_str("not json");
    let err: ActivationError = serde_err.unwrap_err().into();
    assert!(format!("{err}").contains("serialization"));
}

#[test]
fn error_from_types() {
    let types_err = licensor_types::AccountId::new("nope").unwrap_err();
    let err: ActivationError = types_err.into();
    assert!(matches!(err, ActivationError::Types(_)));
}

#[test]
fn authority_error_is_transparent() {
    let err: ActivationError =
        AuthorityError::rejected(Reason::Expired, "subscription expired").into();
    assert_eq!(format!("{err}"), "subscription expired (expired)");
}

#[test]
fn authority_error_reasons() {
    assert_eq!(
        AuthorityError::Unreachable("timeout".into()).reason(),
        Reason::NoInternet
    );
    assert_eq!(
        AuthorityError::QuotaExhausted { used: 10, max: 10 }.reason(),
        Reason::MaxTransfersExceeded
    );
    assert_eq!(
        AuthorityError::RateLimited {
            reason: RateLimitReason::RateLimitExceeded,
            retry_after_secs: 900,
        }
        .reason(),
        Reason::RateLimitExceeded
    );
    assert_eq!(AuthorityError::Protocol("bad".into()).reason(), Reason::Generic);
}

#[test]
fn authority_error_connectivity() {
    assert!(AuthorityError::Unreachable("x".into()).is_connectivity());
    assert!(AuthorityError::rejected(Reason::NoInternet, "offline").is_connectivity());
    assert!(!AuthorityError::rejected(Reason::Expired, "gone").is_connectivity());
}

#[test]
fn retryable_errors() {
    assert!(
        ActivationError::RateLimited {
            reason: RateLimitReason::RateLimitThrottled,
            retry_after_secs: 1,
        }
        .is_retryable()
    );
    assert!(ActivationError::from(AuthorityError::Unreachable("x".into())).is_retryable());
    assert!(!ActivationError::InvalidTransferToken.is_retryable());
    assert!(
        !ActivationError::from(AuthorityError::rejected(Reason::NotFound, "none")).is_retryable()
    );
}

#[test]
fn authority_error_message_prefers_server_text() {
    let err = AuthorityError::rejected(Reason::Generic, "try again later");
    assert_eq!(err.message(), "try again later");
    assert!(
        AuthorityError::Unreachable("refused".into())
            .message()
            .contains("refused")
    );
}

#[test]
fn error_is_debug() {
    let err = ActivationError::InvalidTransferToken;
    let _ = format!("{err:?}");
}
