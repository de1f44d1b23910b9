use crate::errors::ApiError;
use crate::models::*;
use crate::state::{AppState, LedgerCore};
use axum::{
    extract::{Path, Query, Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Extension, Json, Router,
};
use confidential_ledger::client::{RatingInputBuilder, DEFAULT_IDENTITY};
use confidential_ledger::types::{Address, FacilityId, Handle, Scope};
use confidential_ledger::{CallContext, LedgerResult};
use tower_http::cors::{Any, CorsLayer};

pub const API_KEY_HEADER: &str = "X-API-KEY";

/// The account bound to the request's API key, set by [`auth_middleware`].
#[derive(Clone, Copy, Debug)]
pub struct Caller(pub Address);

pub fn router(state: AppState) -> Router {
    let protected_routes = Router::new()
        .route("/api/v1/facilities", post(create_facility))
        .route("/api/v1/facilities/:id/deactivate", post(deactivate_facility))
        .route("/api/v1/facilities/:id/reactivate", post(reactivate_facility))
        .route("/api/v1/admin/stop", post(stop))
        .route("/api/v1/admin/resume", post(resume))
        .route("/api/v1/ratings", post(submit_rating))
        .route("/api/v1/coprocessor/ratings", post(seal_rating))
        .route("/api/v1/coprocessor/decrypt", post(public_decrypt))
        .route("/api/v1/coprocessor/user-decrypt", post(user_decrypt))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/api/v1/ledger", get(get_ledger))
        .route("/api/v1/facilities", get(list_facilities))
        .route("/api/v1/facilities/active", get(list_active_facilities))
        .route("/api/v1/facilities/:id", get(get_facility))
        .route("/api/v1/facilities/:id/statistics", get(get_facility_statistics))
        .route("/api/v1/statistics", get(get_global_statistics))
        .route("/api/v1/participants/:address/submissions", get(get_submission_status))
        .route("/api/v1/events", get(list_events))
        .merge(protected_routes)
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}

async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let account = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|key| key.to_str().ok())
        .and_then(|key| state.credentials.resolve(key));

    match account {
        Some(account) => {
            request.extensions_mut().insert(Caller(account));
            Ok(next.run(request).await)
        }
        None => {
            tracing::warn!("unauthorized access attempt");
            Err(StatusCode::UNAUTHORIZED)
        }
    }
}

async fn get_ledger(State(state): State<AppState>) -> Json<LedgerInfoResponse> {
    let info = state
        .read(|c| LedgerInfoResponse {
            protocol_id: c.ledger.protocol_id(),
            administrator: c.ledger.administrator(),
            ledger_address: c.ledger.ledger_address(),
            mode: c.ledger.mode(),
            state: c.ledger.operational_state(),
            total_facilities: c.ledger.total_facilities() as u64,
            version: c.ledger.version(),
        })
        .await;
    Json(info)
}

async fn list_facilities(State(state): State<AppState>) -> Json<FacilityIdsResponse> {
    let facility_ids = state.read(|c| c.ledger.all_facility_ids()).await;
    Json(FacilityIdsResponse { facility_ids })
}

async fn list_active_facilities(State(state): State<AppState>) -> Json<FacilityIdsResponse> {
    let facility_ids = state.read(|c| c.ledger.active_facility_ids()).await;
    Json(FacilityIdsResponse { facility_ids })
}

async fn get_facility(
    State(state): State<AppState>,
    Path(id): Path<FacilityId>,
) -> Result<Json<FacilityResponse>, ApiError> {
    let facility = state.read(|c| c.ledger.facility(id).map(FacilityResponse::from)).await?;
    Ok(Json(facility))
}

async fn get_facility_statistics(
    State(state): State<AppState>,
    Path(id): Path<FacilityId>,
) -> Result<Json<StatisticsResponse>, ApiError> {
    let statistics = state.read(|c| c.ledger.statistics(Scope::Facility(id))).await?;
    Ok(Json(StatisticsResponse { scope: id.to_string(), statistics }))
}

async fn get_global_statistics(State(state): State<AppState>) -> Json<StatisticsResponse> {
    let statistics = state.read(|c| c.ledger.global_statistics()).await;
    Json(StatisticsResponse { scope: "global".to_string(), statistics })
}

async fn get_submission_status(
    State(state): State<AppState>,
    Path(address): Path<String>,
    Query(params): Query<SubmissionStatusParams>,
) -> Result<Json<SubmissionStatusResponse>, ApiError> {
    let participant: Address = address.parse()?;
    let resp = state
        .read(|c| SubmissionStatusResponse {
            participant,
            has_submitted: c.ledger.has_submitted(participant),
            facility_id: params.facility_id,
            has_submitted_to_facility: params.facility_id.map(|f| c.ledger.has_submitted_to(participant, f)),
        })
        .await;
    Ok(Json(resp))
}

async fn list_events(State(state): State<AppState>, Query(params): Query<EventsParams>) -> Json<EventsResponse> {
    let since = params.since.unwrap_or(0);
    let resp = state
        .read(|c| EventsResponse {
            next_seq: c.ledger.events().len() as u64,
            events: c.ledger.events_since(since).to_vec(),
        })
        .await;
    Json(resp)
}

async fn create_facility(
    State(state): State<AppState>,
    Extension(Caller(caller)): Extension<Caller>,
    Json(req): Json<FacilityCreateRequest>,
) -> Result<Json<FacilityCreateResponse>, ApiError> {
    let (facility_id, version) = state
        .transact(|core, _| {
            let ctx = core.context(caller);
            let id = core.ledger.create_facility(&ctx, &req.name, &req.location)?;
            Ok((id, core.ledger.version()))
        })
        .await?;

    Ok(Json(FacilityCreateResponse { facility_id, version }))
}

/// Run an administrative call and report the resulting state.
async fn admin_call(
    state: &AppState,
    caller: Address,
    op: impl FnOnce(&mut LedgerCore, &CallContext) -> LedgerResult<()>,
) -> Result<Json<CommitResponse>, ApiError> {
    let resp = state
        .transact(|core, _| {
            let ctx = core.context(caller);
            op(core, &ctx)?;
            Ok(CommitResponse { state: core.ledger.operational_state(), version: core.ledger.version() })
        })
        .await?;

    Ok(Json(resp))
}

async fn deactivate_facility(
    State(state): State<AppState>,
    Extension(Caller(caller)): Extension<Caller>,
    Path(id): Path<FacilityId>,
) -> Result<Json<CommitResponse>, ApiError> {
    admin_call(&state, caller, |core, ctx| core.ledger.deactivate_facility(ctx, id)).await
}

async fn reactivate_facility(
    State(state): State<AppState>,
    Extension(Caller(caller)): Extension<Caller>,
    Path(id): Path<FacilityId>,
) -> Result<Json<CommitResponse>, ApiError> {
    admin_call(&state, caller, |core, ctx| core.ledger.reactivate_facility(ctx, id)).await
}

async fn stop(
    State(state): State<AppState>,
    Extension(Caller(caller)): Extension<Caller>,
) -> Result<Json<CommitResponse>, ApiError> {
    admin_call(&state, caller, |core, ctx| core.ledger.stop(ctx)).await
}

async fn resume(
    State(state): State<AppState>,
    Extension(Caller(caller)): Extension<Caller>,
) -> Result<Json<CommitResponse>, ApiError> {
    admin_call(&state, caller, |core, ctx| core.ledger.resume(ctx)).await
}

async fn submit_rating(
    State(state): State<AppState>,
    Extension(Caller(caller)): Extension<Caller>,
    Json(req): Json<RatingSubmitRequest>,
) -> Result<Json<CommitResponse>, ApiError> {
    let facility = req.facility_id;
    let submission = req.into_submission()?;

    let resp = state
        .transact(|core, verifier| {
            let ctx = core.context(caller);
            let LedgerCore { ledger, coprocessor } = core;
            ledger.submit_rating(&ctx, coprocessor, verifier, facility, &submission)?;
            Ok(CommitResponse { state: ledger.operational_state(), version: ledger.version() })
        })
        .await?;

    Ok(Json(resp))
}

/// Development helper: seal plaintext scores for the caller, as a client would.
async fn seal_rating(
    State(state): State<AppState>,
    Extension(Caller(sender)): Extension<Caller>,
    Json(req): Json<SealRatingRequest>,
) -> Result<Json<RatingSubmitRequest>, ApiError> {
    let identity = req.identity.unwrap_or(DEFAULT_IDENTITY);
    let scores = req.scores.into_array();

    let submission = state
        .transact(|core, verifier| {
            RatingInputBuilder::new(sender, core.ledger.ledger_address())
                .identity(identity)
                .scores(scores)
                .encrypt(&mut core.coprocessor, verifier)
        })
        .await?;

    Ok(Json(RatingSubmitRequest::from_submission(req.facility_id, &submission)))
}

/// Decrypt every handle or none.
async fn decrypt_all(
    state: &AppState,
    handles: &[Handle],
    open: impl Fn(&LedgerCore, &Handle) -> LedgerResult<u32>,
) -> Result<Json<DecryptResponse>, ApiError> {
    let values = state
        .read(|c| {
            handles
                .iter()
                .map(|h| open(c, h).map(|value| DecryptedValue { handle: *h, value }))
                .collect::<LedgerResult<Vec<_>>>()
        })
        .await?;

    Ok(Json(DecryptResponse { values }))
}

async fn public_decrypt(
    State(state): State<AppState>,
    Json(req): Json<DecryptRequest>,
) -> Result<Json<DecryptResponse>, ApiError> {
    decrypt_all(&state, &req.handles, |c, h| c.coprocessor.public_decrypt(h)).await
}

/// Decrypt handles the caller has been granted, such as its own submitted inputs.
async fn user_decrypt(
    State(state): State<AppState>,
    Extension(Caller(caller)): Extension<Caller>,
    Json(req): Json<DecryptRequest>,
) -> Result<Json<DecryptResponse>, ApiError> {
    decrypt_all(&state, &req.handles, |c, h| c.coprocessor.user_decrypt(h, caller)).await
}
