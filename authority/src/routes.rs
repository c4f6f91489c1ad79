//! HTTP handlers. Each one decodes a request, calls the authority and
//! wraps the result in an [`Envelope`].
//!
//! Domain failures are answered with `200 OK` and `success: false`; only
//! throttling (`429`) and undecodable bodies (`4xx`) change the status.

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use licensor_activation::{ActivationAuthority, AuthorityError, AuthorityResult};
use licensor_types::Reason;
use licensor_types::protocol::{
    AuthenticateRequest, CodeBindingRequest, CodeRebindRequest, CompleteTransferRequest,
    ConfirmCodeRebindRequest, ContinueTrialRequest, Envelope, GenerateOtpRequest,
    HardwareLookupRequest, InitiateTransferRequest, RedeemCodeRequest, StartTrialRequest,
    StatusRequest, ValidateCodeRequest, VerifyOtpRequest,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

pub(crate) type SharedAuthority = Arc<dyn ActivationAuthority>;

type Reply = Result<Response, Response>;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

pub(crate) async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

fn malformed(rejection: JsonRejection) -> Response {
    debug!(error = %rejection, "malformed request");
    let envelope = Envelope::<()>::fail(Reason::InvalidRequest, rejection.body_text());
    (rejection.status(), Json(envelope)).into_response()
}

fn failure(err: &AuthorityError) -> Response {
    let mut envelope = Envelope::<()>::fail(err.reason(), err.message());
    let mut status = StatusCode::OK;
    if let AuthorityError::RateLimited {
        retry_after_secs, ..
    } = err
    {
        envelope = envelope.with_retry_after(*retry_after_secs);
        status = StatusCode::TOO_MANY_REQUESTS;
    }
    if let Some(usage) = err.usage() {
        envelope = envelope.with_usage(usage);
    }
    (status, Json(envelope)).into_response()
}

fn reply<T: Serialize>(result: AuthorityResult<T>, message: &str) -> Reply {
    match result {
        Ok(data) => Ok(Json(Envelope::ok(message, data)).into_response()),
        Err(err) => Err(failure(&err)),
    }
}

pub(crate) async fn subscription_by_hardware(
    State(authority): State<SharedAuthority>,
    payload: Result<Json<HardwareLookupRequest>, JsonRejection>,
) -> Reply {
    let Json(request) = payload.map_err(malformed)?;
    match authority.subscription_by_hardware(&request.hardware_id).await {
        Ok(Some(summary)) => Ok(Json(Envelope::ok("subscription found", summary)).into_response()),
        Ok(None) => Err(failure(&AuthorityError::rejected(
            Reason::NotFound,
            "no subscription for this device",
        ))),
        Err(err) => Err(failure(&err)),
    }
}

pub(crate) async fn check_status(
    State(authority): State<SharedAuthority>,
    payload: Result<Json<StatusRequest>, JsonRejection>,
) -> Reply {
    let Json(request) = payload.map_err(malformed)?;
    reply(authority.check_status(&request.email).await, "activation found")
}

pub(crate) async fn authenticate(
    State(authority): State<SharedAuthority>,
    payload: Result<Json<AuthenticateRequest>, JsonRejection>,
) -> Reply {
    let Json(request) = payload.map_err(malformed)?;
    reply(
        authority
            .authenticate(&request.email, &request.hardware_id)
            .await,
        "activated",
    )
}

pub(crate) async fn validate_code(
    State(authority): State<SharedAuthority>,
    payload: Result<Json<ValidateCodeRequest>, JsonRejection>,
) -> Reply {
    let Json(request) = payload.map_err(malformed)?;
    reply(
        authority.validate_code(&request.code, &request.email).await,
        "code is valid",
    )
}

pub(crate) async fn redeem_code(
    State(authority): State<SharedAuthority>,
    payload: Result<Json<RedeemCodeRequest>, JsonRejection>,
) -> Reply {
    let Json(request) = payload.map_err(malformed)?;
    reply(
        authority
            .redeem_code(&request.code, &request.email, &request.hardware_id)
            .await,
        "code redeemed",
    )
}

pub(crate) async fn generate_otp(
    State(authority): State<SharedAuthority>,
    payload: Result<Json<GenerateOtpRequest>, JsonRejection>,
) -> Reply {
    let Json(request) = payload.map_err(malformed)?;
    match authority.generate_otp(&request.email).await {
        Ok(()) => Ok(Json(Envelope::<()>::done("verification code sent")).into_response()),
        Err(err) => Err(failure(&err)),
    }
}

pub(crate) async fn verify_otp(
    State(authority): State<SharedAuthority>,
    payload: Result<Json<VerifyOtpRequest>, JsonRejection>,
) -> Reply {
    let Json(request) = payload.map_err(malformed)?;
    let result = authority
        .verify_otp(&request.email, &request.otp_code, &request.hardware_id)
        .await;
    match result {
        Ok(Some(summary)) => Ok(Json(Envelope::ok("email verified", summary)).into_response()),
        Ok(None) => Ok(Json(Envelope::<()>::done("email verified")).into_response()),
        Err(err) => Err(failure(&err)),
    }
}

pub(crate) async fn initiate_transfer(
    State(authority): State<SharedAuthority>,
    payload: Result<Json<InitiateTransferRequest>, JsonRejection>,
) -> Reply {
    let Json(request) = payload.map_err(malformed)?;
    reply(
        authority
            .initiate_transfer(&request.email, &request.current_hardware_id)
            .await,
        "transfer initiated",
    )
}

pub(crate) async fn complete_transfer(
    State(authority): State<SharedAuthority>,
    payload: Result<Json<CompleteTransferRequest>, JsonRejection>,
) -> Reply {
    let Json(request) = payload.map_err(malformed)?;
    reply(
        authority
            .complete_transfer(
                &request.email,
                &request.new_hardware_id,
                &request.transfer_token,
            )
            .await,
        "transfer completed",
    )
}

pub(crate) async fn start_trial(
    State(authority): State<SharedAuthority>,
    payload: Result<Json<StartTrialRequest>, JsonRejection>,
) -> Reply {
    let Json(request) = payload.map_err(malformed)?;
    reply(
        authority
            .start_trial(&request.email, &request.hardware_id)
            .await,
        "verification code sent",
    )
}

pub(crate) async fn continue_trial(
    State(authority): State<SharedAuthority>,
    payload: Result<Json<ContinueTrialRequest>, JsonRejection>,
) -> Reply {
    let Json(request) = payload.map_err(malformed)?;
    reply(
        authority
            .continue_trial(&request.email, &request.otp_code, &request.hardware_id)
            .await,
        "trial activated",
    )
}

pub(crate) async fn check_code_binding(
    State(authority): State<SharedAuthority>,
    payload: Result<Json<CodeBindingRequest>, JsonRejection>,
) -> Reply {
    let Json(request) = payload.map_err(malformed)?;
    reply(
        authority
            .check_code_binding(&request.code, &request.current_hardware_id)
            .await,
        "code checked",
    )
}

pub(crate) async fn request_code_rebind(
    State(authority): State<SharedAuthority>,
    payload: Result<Json<CodeRebindRequest>, JsonRejection>,
) -> Reply {
    let Json(request) = payload.map_err(malformed)?;
    match authority.request_code_rebind(&request.code).await {
        Ok(()) => Ok(Json(Envelope::<()>::done("verification code sent")).into_response()),
        Err(err) => Err(failure(&err)),
    }
}

pub(crate) async fn confirm_code_rebind(
    State(authority): State<SharedAuthority>,
    payload: Result<Json<ConfirmCodeRebindRequest>, JsonRejection>,
) -> Reply {
    let Json(request) = payload.map_err(malformed)?;
    reply(
        authority
            .confirm_code_rebind(&request.code, &request.otp_code, &request.new_hardware_id)
            .await,
        "code rebound",
    )
}
