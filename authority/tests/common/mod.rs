//! Shared fixtures for authority tests.

#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use licensor_activation::ManualClock;
use licensor_authority::{CodeSeed, MemoryAuthority, MemoryMailer, build_router};
use licensor_types::{AccountId, ActivationRecord, HardwareId};
use std::sync::Arc;

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2030, 1, 1, 12, 0, 0).unwrap()
}

pub fn account(email: &str) -> AccountId {
    AccountId::new(email).unwrap()
}

pub fn hw(id: &str) -> HardwareId {
    HardwareId::new(id).unwrap()
}

/// Active record bound to `hardware`, expiring 30 days after `t0`.
pub fn subscription(email: &str, hardware: &str) -> ActivationRecord {
    ActivationRecord {
        account: account(email),
        hardware_id: hw(hardware),
        tier: "pro".to_string(),
        code: None,
        activated_at: Some(t0() - Duration::days(10)),
        expires_at: t0() + Duration::days(30),
        is_active: true,
        email_verified: true,
        last_synced_at: None,
        transfer_count: 0,
        last_transfer_at: None,
    }
}

pub fn code(code: &str, days: u32) -> CodeSeed {
    CodeSeed {
        code: code.to_string(),
        tier: "pro".to_string(),
        duration_days: days,
        expires_at: None,
        redeemed_by: None,
    }
}

/// Authority on a manual clock with `a@x.com` bound to `H1` and a
/// 30-day `PROMO-30` code.
pub struct Fixture {
    pub authority: Arc<MemoryAuthority>,
    pub mailer: Arc<MemoryMailer>,
    pub clock: ManualClock,
}

impl Fixture {
    pub fn new() -> Self {
        let clock = ManualClock::new(t0());
        let mailer = Arc::new(MemoryMailer::new());
        let authority = Arc::new(MemoryAuthority::new(
            mailer.clone(),
            Arc::new(clock.clone()),
        ));
        authority.insert_subscription(subscription("a@x.com", "H1"));
        authority.insert_code(code("PROMO-30", 30));
        Self {
            authority,
            mailer,
            clock,
        }
    }
}

/// Spin up the HTTP server on an OS-assigned port, returning the base URL.
pub async fn spawn_test_server(authority: Arc<MemoryAuthority>) -> String {
    let app = build_router(authority);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://127.0.0.1:{}", port)
}
