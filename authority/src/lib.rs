//! Reference activation authority for Licensor.
//!
//! An in-memory [`MemoryAuthority`] enforces every server-side rule: code
//! redemption and rebinding, one trial per machine, passcode expiry,
//! per-account throttling of requests and failed attempts, single-use
//! transfer tokens and the rolling transfer quota. [`build_router`] exposes it over
//! the JSON protocol in [`licensor_types::protocol`].

mod mailer;
mod routes;
mod seed;
mod store;

use axum::Router;
use axum::routing::{get, post};
use licensor_activation::ActivationAuthority;
use licensor_types::protocol;
use std::sync::Arc;

pub use mailer::{MailError, Mailer, MemoryMailer, TracingMailer};
pub use routes::HealthResponse;
pub use seed::{CodeSeed, Seed, SubscriptionSeed};
pub use store::{AuthorityOptions, MemoryAuthority};

/// Build the HTTP API router around `authority`.
pub fn build_router(authority: Arc<dyn ActivationAuthority>) -> Router {
    Router::new()
        .route("/", get(routes::health))
        .route(
            protocol::GET_SUBSCRIPTION_BY_HARDWARE,
            post(routes::subscription_by_hardware),
        )
        .route(protocol::CHECK_ACTIVATION_STATUS, post(routes::check_status))
        .route(protocol::AUTHENTICATE, post(routes::authenticate))
        .route(protocol::VALIDATE_CODE, post(routes::validate_code))
        .route(protocol::REDEEM_CODE, post(routes::redeem_code))
        .route(protocol::GENERATE_OTP, post(routes::generate_otp))
        .route(protocol::VERIFY_OTP, post(routes::verify_otp))
        .route(
            protocol::INITIATE_DEVICE_TRANSFER,
            post(routes::initiate_transfer),
        )
        .route(
            protocol::COMPLETE_DEVICE_TRANSFER,
            post(routes::complete_transfer),
        )
        .route(protocol::START_TRIAL, post(routes::start_trial))
        .route(protocol::CONTINUE_TRIAL, post(routes::continue_trial))
        .route(
            protocol::CHECK_CODE_DEVICE_MISMATCH,
            post(routes::check_code_binding),
        )
        .route(
            protocol::REQUEST_CODE_REBIND,
            post(routes::request_code_rebind),
        )
        .route(
            protocol::REBIND_SUBSCRIPTION_CODE,
            post(routes::confirm_code_rebind),
        )
        .with_state(authority)
}
