use chrono::{TimeZone, Utc};
use licensor_types::protocol::{
    CompleteTransferRequest, ConfirmCodeRebindRequest, Envelope, InitiateTransferRequest,
};
use licensor_types::{
    AccountId, ActivationRecord, CodeBinding, HardwareId, RateLimitReason, Reason,
    SubscriptionSummary, TransferToken, TransferUsage, TrialOffer,
};
use pretty_assertions::assert_eq;
use serde::de::DeserializeOwned;
use serde_json::json;

fn account() -> AccountId {
    AccountId::new("a@x.com").unwrap()
}

fn hw(id: &str) -> HardwareId {
    HardwareId::new(id).unwrap()
}

// ── Reason tags ───────────────────────────────────────────────────

#[test]
fn rate_limit_reason_wire_tags() {
    for (reason, tag) in [
        (RateLimitReason::RateLimitInterval, "rate_limit_interval"),
        (RateLimitReason::RateLimitExceeded, "rate_limit_exceeded"),
        (RateLimitReason::RateLimitThrottled, "rate_limit_throttled"),
    ] {
        assert_eq!(serde_json::to_value(reason).unwrap(), json!(tag));
        assert_eq!(reason.as_str(), tag);
        assert_eq!(serde_json::to_value(Reason::from(reason)).unwrap(), json!(tag));
    }
}

#[test]
fn status_failure_wire_tags() {
    assert_eq!(serde_json::to_value(Reason::Expired).unwrap(), json!("expired"));
    assert_eq!(serde_json::to_value(Reason::HostNotRunning).unwrap(), json!("fortnite_closed"));
    assert_eq!(serde_json::to_value(Reason::NoInternet).unwrap(), json!("no_internet"));
    assert_eq!(serde_json::to_value(Reason::NotFound).unwrap(), json!("not_found"));
    assert_eq!(
        serde_json::to_value(Reason::MaxTransfersExceeded).unwrap(),
        json!("max_transfers_exceeded")
    );
}

#[test]
fn trial_refusal_wire_tag() {
    assert_eq!(
        serde_json::to_value(Reason::TrialUsed).unwrap(),
        json!("trial_already_used_on_device")
    );
}

#[test]
fn reason_display_uses_wire_tag() {
    assert_eq!(Reason::HostNotRunning.to_string(), "fortnite_closed");
    assert_eq!(Reason::InvalidTransferToken.to_string(), "invalid_transfer_token");
}

#[test]
fn reason_rate_limit_projection() {
    assert_eq!(Reason::RateLimitThrottled.rate_limit(), Some(RateLimitReason::RateLimitThrottled));
    assert_eq!(Reason::Expired.rate_limit(), None);
}

#[test]
fn entitlement_failures() {
    assert!(Reason::Expired.is_entitlement_failure());
    assert!(Reason::NotFound.is_entitlement_failure());
    assert!(Reason::DeviceMismatch.is_entitlement_failure());
    assert!(!Reason::RateLimitExceeded.is_entitlement_failure());
    assert!(!Reason::Generic.is_entitlement_failure());
}

// ── Envelope ──────────────────────────────────────────────────────

#[test]
fn failure_envelope_omits_empty_fields() {
    let env: Envelope<()> = Envelope::fail(Reason::RateLimitInterval, "wait")
        .with_retry_after(42);
    let value = serde_json::to_value(&env).unwrap();
    assert_eq!(
        value,
        json!({
            "success": false,
            "message": "wait",
            "reason": "rate_limit_interval",
            "retry_after_secs": 42
        })
    );
}

#[test]
fn quota_envelope_reports_usage() {
    let env: Envelope<()> = Envelope::fail(Reason::MaxTransfersExceeded, "limit")
        .with_usage(TransferUsage { used: 10, max: 10 });
    let value = serde_json::to_value(&env).unwrap();
    assert_eq!(value["usage"]["transfers_used"], json!(10));
    assert_eq!(value["usage"]["max_transfers_per_30days"], json!(10));
}

#[test]
fn envelope_parses_without_optional_fields() {
    let env: Envelope<SubscriptionSummary> =
        serde_json::from_str(r#"{"success":false,"message":"nothing here"}"#).unwrap();
    assert!(!env.success);
    assert!(env.reason.is_none());
    assert!(env.data.is_none());
}

/// Parses the way a client generic over the payload type does.
fn parse_any<T: DeserializeOwned>(body: &str) -> Envelope<T> {
    serde_json::from_str(body).unwrap()
}

#[test]
fn envelope_parses_for_any_payload_type() {
    let env: Envelope<TrialOffer> =
        parse_any(r#"{"success":true,"message":"sent","data":{"trial_days":7}}"#);
    assert_eq!(
        env.data,
        Some(TrialOffer {
            trial_days: 7,
            existing_trial: false
        })
    );

    let empty: Envelope<CodeBinding> = parse_any(r#"{"success":true,"message":"ok"}"#);
    assert_eq!(empty.data, None);
}

#[test]
fn envelope_roundtrip_with_summary() {
    let summary = SubscriptionSummary {
        account: account(),
        tier: "pro".into(),
        expires_at: Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap(),
        is_active: true,
        hardware_id: Some(hw("H1")),
    };
    let env = Envelope::ok("found", summary.clone());
    let json = serde_json::to_string(&env).unwrap();
    let parsed: Envelope<SubscriptionSummary> = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed.data, Some(summary));
}

// ── Requests ──────────────────────────────────────────────────────

#[test]
fn transfer_requests_use_wire_field_names() {
    let init = InitiateTransferRequest {
        email: account(),
        current_hardware_id: hw("H1"),
    };
    assert_eq!(
        serde_json::to_value(&init).unwrap(),
        json!({"email": "a@x.com", "current_hardware_id": "H1"})
    );

    let complete = CompleteTransferRequest {
        email: account(),
        new_hardware_id: hw("H2"),
        transfer_token: TransferToken::parse("tok").unwrap(),
    };
    assert_eq!(
        serde_json::to_value(&complete).unwrap(),
        json!({"email": "a@x.com", "new_hardware_id": "H2", "transfer_token": "TOK"})
    );
}

// ── ActivationRecord ──────────────────────────────────────────────

#[test]
fn activation_record_wire_names() {
    let value = json!({
        "email": "A@X.com",
        "hardware_id": "H1",
        "subscription_type": "pro",
        "expiry_date": "2030-01-01T00:00:00Z",
        "is_active": true
    });
    let record: ActivationRecord = serde_json::from_value(value).unwrap();
    assert_eq!(record.account, account());
    assert_eq!(record.tier, "pro");
    assert!(!record.email_verified);
    assert_eq!(record.transfer_count, 0);
    assert!(record.last_transfer_at.is_none());
}

#[test]
fn activation_record_expiry_and_binding() {
    let expires = Utc.with_ymd_and_hms(2030, 1, 31, 0, 0, 0).unwrap();
    let summary = SubscriptionSummary {
        account: account(),
        tier: "pro".into(),
        expires_at: expires,
        is_active: true,
        hardware_id: None,
    };
    let record = ActivationRecord::from_summary(&summary, hw("H1"));

    assert!(record.is_bound_to(&hw("H1")));
    assert!(!record.is_bound_to(&hw("H2")));

    let before = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();
    assert!(!record.is_expired(before));
    assert_eq!(record.days_until_expiry(before), 30);
    assert!(record.is_expired(expires));
    assert_eq!(record.days_until_expiry(expires + chrono::Duration::days(3)), 0);

    assert_eq!(record.summary().hardware_id, Some(hw("H1")));
}

#[test]
fn transfer_usage_remaining() {
    let usage = TransferUsage { used: 7, max: 10 };
    assert_eq!(usage.remaining(), 3);
    assert!(!usage.is_exhausted());
    assert!(TransferUsage { used: 10, max: 10 }.is_exhausted());
    assert_eq!(TransferUsage { used: 12, max: 10 }.remaining(), 0);
}

#[test]
fn code_rebind_request_uses_wire_field_names() {
    let confirm = ConfirmCodeRebindRequest {
        code: "PROMO-30".to_string(),
        otp_code: "123456".to_string(),
        new_hardware_id: hw("H2"),
    };
    assert_eq!(
        serde_json::to_value(&confirm).unwrap(),
        json!({"code": "PROMO-30", "otp_code": "123456", "new_hardware_id": "H2"})
    );
}
