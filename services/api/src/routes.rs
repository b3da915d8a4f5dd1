use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post, put};
use axum::{Extension, Json, Router};
use chrono::{Local, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use leases_core::charges::ChargeMethod;
use leases_core::invoicing::details::InvoicingDetails;
use leases_core::invoicing::ledger::{Invoice, InvoiceId};
use leases_core::ports::{DocumentCategory, DocumentStore, IdentityDirectory, NotificationSender};
use leases_core::proposals::domain::{
    ApplicationType, ApprovalId, ApprovalType, IssuanceDecision, OrganisationId, PostalAddress,
    ProcessingStatus, ProposalId, ProposalType, ReferralId, UserId,
};
use leases_core::proposals::service::{
    FinalApprovalOutcome, IssuanceRequest, LodgementRequest,
};
use leases_core::store::LeasingStore;

use crate::error::AppError;
use crate::infra::{AppState, LeasingContext};

type Context<S, D, N, C> = Arc<LeasingContext<S, D, N, C>>;

pub(crate) fn leasing_router<S, D, N, C>(context: Context<S, D, N, C>) -> Router
where
    S: LeasingStore + 'static,
    D: IdentityDirectory + 'static,
    N: NotificationSender + 'static,
    C: DocumentStore + 'static,
{
    Router::new()
        .route("/health", get(healthcheck))
        .route("/ready", get(readiness_endpoint))
        .route("/metrics", get(metrics_endpoint))
        .route("/api/v1/proposals", post(lodge_handler::<S, D, N, C>))
        .route(
            "/api/v1/proposals/:proposal_id",
            get(proposal_handler::<S, D, N, C>),
        )
        .route(
            "/api/v1/proposals/:proposal_id/submit",
            post(submit_handler::<S, D, N, C>),
        )
        .route(
            "/api/v1/proposals/:proposal_id/move",
            post(move_handler::<S, D, N, C>),
        )
        .route(
            "/api/v1/proposals/:proposal_id/referrals",
            post(send_referral_handler::<S, D, N, C>),
        )
        .route(
            "/api/v1/referrals/:referral_id/complete",
            post(complete_referral_handler::<S, D, N, C>),
        )
        .route(
            "/api/v1/referrals/:referral_id/recall",
            post(recall_referral_handler::<S, D, N, C>),
        )
        .route(
            "/api/v1/referrals/:referral_id/resend",
            post(resend_referral_handler::<S, D, N, C>),
        )
        .route(
            "/api/v1/proposals/:proposal_id/documents",
            post(attach_document_handler::<S, D, N, C>),
        )
        .route(
            "/api/v1/proposals/:proposal_id/propose-decline",
            post(propose_decline_handler::<S, D, N, C>),
        )
        .route(
            "/api/v1/proposals/:proposal_id/final-decline",
            post(final_decline_handler::<S, D, N, C>),
        )
        .route(
            "/api/v1/proposals/:proposal_id/final-approval",
            post(final_approval_handler::<S, D, N, C>),
        )
        .route(
            "/api/v1/approvals/:approval_id/renew",
            post(renew_handler::<S, D, N, C>),
        )
        .route(
            "/api/v1/approvals/:approval_id/amend",
            post(amend_handler::<S, D, N, C>),
        )
        .route(
            "/api/v1/proposals/:proposal_id/invoicing-details",
            put(update_invoicing_details_handler::<S, D, N, C>),
        )
        .route(
            "/api/v1/proposals/:proposal_id/complete-editing",
            post(complete_editing_handler::<S, D, N, C>),
        )
        .route(
            "/api/v1/invoices/:invoice_id",
            get(invoice_handler::<S, D, N, C>),
        )
        .route(
            "/api/v1/invoices/:invoice_id/transactions",
            post(record_transaction_handler::<S, D, N, C>),
        )
        .route(
            "/api/v1/invoices/:invoice_id/oracle-invoice-number",
            post(upload_oracle_handler::<S, D, N, C>),
        )
        .route(
            "/api/v1/invoices/:invoice_id/void",
            post(void_invoice_handler::<S, D, N, C>),
        )
        .route(
            "/api/v1/approvals/:approval_id/ad-hoc-invoice",
            post(ad_hoc_invoice_handler::<S, D, N, C>),
        )
        .route(
            "/api/v1/invoicing/pay-invoice-success/:invoice_uuid",
            post(pay_invoice_success_handler::<S, D, N, C>),
        )
        .with_state(context)
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

#[derive(Debug, Deserialize)]
pub(crate) struct LodgeRequestBody {
    pub(crate) proposal_type: ProposalType,
    pub(crate) application_type: ApplicationType,
    pub(crate) submitter: UserId,
    #[serde(default)]
    pub(crate) organisation: Option<OrganisationId>,
    #[serde(default)]
    pub(crate) individual: Option<UserId>,
    #[serde(default)]
    pub(crate) proxy: Option<UserId>,
    #[serde(default)]
    pub(crate) postal_address: Option<PostalAddress>,
    #[serde(default)]
    pub(crate) site_name: Option<String>,
    #[serde(default)]
    pub(crate) groups: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ActorBody {
    pub(crate) actor: UserId,
}

#[derive(Debug, Deserialize)]
pub(crate) struct MoveBody {
    pub(crate) actor: UserId,
    pub(crate) status: ProcessingStatus,
    #[serde(default)]
    pub(crate) approver_comment: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SendReferralBody {
    pub(crate) actor: UserId,
    pub(crate) referee: UserId,
    pub(crate) text: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CompleteReferralBody {
    pub(crate) actor: UserId,
    #[serde(default)]
    pub(crate) comment: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct DeclineBody {
    pub(crate) actor: UserId,
    pub(crate) reason: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct FinalApprovalBody {
    pub(crate) actor: UserId,
    #[serde(default)]
    pub(crate) decision: Option<IssuanceDecision>,
    #[serde(default)]
    pub(crate) approval_type: Option<ApprovalType>,
    #[serde(default)]
    pub(crate) start_date: Option<NaiveDate>,
    #[serde(default)]
    pub(crate) expiry_date: Option<NaiveDate>,
    #[serde(default)]
    pub(crate) record_management_number: Option<String>,
    #[serde(default)]
    pub(crate) details: Option<String>,
    #[serde(default)]
    pub(crate) charge_method: Option<ChargeMethod>,
    #[serde(default)]
    pub(crate) today: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct UpdateInvoicingDetailsBody {
    pub(crate) actor: UserId,
    pub(crate) details: InvoicingDetails,
    #[serde(default)]
    pub(crate) today: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CompleteEditingBody {
    pub(crate) actor: UserId,
    #[serde(default)]
    pub(crate) today: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TransactionBody {
    pub(crate) actor: UserId,
    #[serde(default)]
    pub(crate) credit: Option<Decimal>,
    #[serde(default)]
    pub(crate) debit: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct OracleNumberBody {
    pub(crate) actor: UserId,
    pub(crate) oracle_invoice_number: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AdHocInvoiceBody {
    pub(crate) actor: UserId,
    pub(crate) amount: Decimal,
    pub(crate) description: String,
}

fn proposal_summary(proposal: &leases_core::proposals::domain::Proposal) -> serde_json::Value {
    json!({
        "id": proposal.id,
        "lodgement_number": proposal.lodgement_number(),
        "processing_status": proposal.processing_status,
        "proposal_type": proposal.proposal_type,
        "application_type": proposal.application_type,
        "approval": proposal.approval,
    })
}

fn invoice_summary(invoice: &Invoice, balance: Option<Decimal>) -> serde_json::Value {
    json!({
        "id": invoice.id,
        "uuid": invoice.uuid,
        "approval": invoice.approval,
        "status": invoice.status,
        "amount": invoice.amount,
        "gst_free": invoice.gst_free,
        "balance": balance,
        "oracle_invoice_number": invoice.oracle_invoice_number,
        "date_issued": invoice.date_issued,
        "date_due": invoice.date_due,
        "date_paid": invoice.date_paid,
    })
}

pub(crate) async fn lodge_handler<S, D, N, C>(
    State(context): State<Context<S, D, N, C>>,
    Json(body): Json<LodgeRequestBody>,
) -> Result<impl IntoResponse, AppError>
where
    S: LeasingStore + 'static,
    D: IdentityDirectory + 'static,
    N: NotificationSender + 'static,
    C: DocumentStore + 'static,
{
    let proposal = context.proposals.lodge(LodgementRequest {
        proposal_type: body.proposal_type,
        application_type: body.application_type,
        submitter: body.submitter,
        organisation: body.organisation,
        individual: body.individual,
        proxy: body.proxy,
        postal_address: body.postal_address,
        site_name: body.site_name,
        groups: body.groups,
    })?;
    Ok((StatusCode::CREATED, Json(proposal_summary(&proposal))))
}

pub(crate) async fn proposal_handler<S, D, N, C>(
    State(context): State<Context<S, D, N, C>>,
    Path(proposal_id): Path<u64>,
) -> Result<impl IntoResponse, AppError>
where
    S: LeasingStore + 'static,
    D: IdentityDirectory + 'static,
    N: NotificationSender + 'static,
    C: DocumentStore + 'static,
{
    let proposal = context.proposals.proposal(ProposalId(proposal_id))?;
    Ok(Json(proposal))
}

pub(crate) async fn submit_handler<S, D, N, C>(
    State(context): State<Context<S, D, N, C>>,
    Path(proposal_id): Path<u64>,
    Json(body): Json<ActorBody>,
) -> Result<impl IntoResponse, AppError>
where
    S: LeasingStore + 'static,
    D: IdentityDirectory + 'static,
    N: NotificationSender + 'static,
    C: DocumentStore + 'static,
{
    let proposal = context
        .proposals
        .submit(body.actor, ProposalId(proposal_id))?;
    Ok(Json(proposal_summary(&proposal)))
}

pub(crate) async fn move_handler<S, D, N, C>(
    State(context): State<Context<S, D, N, C>>,
    Path(proposal_id): Path<u64>,
    Json(body): Json<MoveBody>,
) -> Result<impl IntoResponse, AppError>
where
    S: LeasingStore + 'static,
    D: IdentityDirectory + 'static,
    N: NotificationSender + 'static,
    C: DocumentStore + 'static,
{
    let proposal = context.proposals.move_to_status(
        body.actor,
        ProposalId(proposal_id),
        body.status,
        body.approver_comment,
    )?;
    Ok(Json(proposal_summary(&proposal)))
}

pub(crate) async fn send_referral_handler<S, D, N, C>(
    State(context): State<Context<S, D, N, C>>,
    Path(proposal_id): Path<u64>,
    Json(body): Json<SendReferralBody>,
) -> Result<impl IntoResponse, AppError>
where
    S: LeasingStore + 'static,
    D: IdentityDirectory + 'static,
    N: NotificationSender + 'static,
    C: DocumentStore + 'static,
{
    let referral = context.proposals.send_referral(
        body.actor,
        ProposalId(proposal_id),
        body.referee,
        body.text,
    )?;
    Ok((StatusCode::CREATED, Json(referral)))
}

pub(crate) async fn complete_referral_handler<S, D, N, C>(
    State(context): State<Context<S, D, N, C>>,
    Path(referral_id): Path<u64>,
    Json(body): Json<CompleteReferralBody>,
) -> Result<impl IntoResponse, AppError>
where
    S: LeasingStore + 'static,
    D: IdentityDirectory + 'static,
    N: NotificationSender + 'static,
    C: DocumentStore + 'static,
{
    let referral =
        context
            .proposals
            .complete_referral(body.actor, ReferralId(referral_id), body.comment)?;
    Ok(Json(referral))
}

pub(crate) async fn recall_referral_handler<S, D, N, C>(
    State(context): State<Context<S, D, N, C>>,
    Path(referral_id): Path<u64>,
    Json(body): Json<ActorBody>,
) -> Result<impl IntoResponse, AppError>
where
    S: LeasingStore + 'static,
    D: IdentityDirectory + 'static,
    N: NotificationSender + 'static,
    C: DocumentStore + 'static,
{
    let referral = context
        .proposals
        .recall_referral(body.actor, ReferralId(referral_id))?;
    Ok(Json(referral))
}

pub(crate) async fn resend_referral_handler<S, D, N, C>(
    State(context): State<Context<S, D, N, C>>,
    Path(referral_id): Path<u64>,
    Json(body): Json<ActorBody>,
) -> Result<impl IntoResponse, AppError>
where
    S: LeasingStore + 'static,
    D: IdentityDirectory + 'static,
    N: NotificationSender + 'static,
    C: DocumentStore + 'static,
{
    let referral = context
        .proposals
        .resend_referral(body.actor, ReferralId(referral_id))?;
    Ok(Json(referral))
}

#[derive(Debug, Deserialize)]
pub(crate) struct AttachDocumentBody {
    pub(crate) category: DocumentCategory,
}

pub(crate) async fn attach_document_handler<S, D, N, C>(
    State(context): State<Context<S, D, N, C>>,
    Path(proposal_id): Path<u64>,
    Json(body): Json<AttachDocumentBody>,
) -> Result<impl IntoResponse, AppError>
where
    S: LeasingStore + 'static,
    D: IdentityDirectory + 'static,
    N: NotificationSender + 'static,
    C: DocumentStore + 'static,
{
    let proposal = ProposalId(proposal_id);
    context.documents.attach(proposal, body.category);
    let count = context.documents.count(proposal, body.category);
    Ok((
        StatusCode::CREATED,
        Json(json!({ "proposal": proposal, "category": body.category, "count": count })),
    ))
}

pub(crate) async fn propose_decline_handler<S, D, N, C>(
    State(context): State<Context<S, D, N, C>>,
    Path(proposal_id): Path<u64>,
    Json(body): Json<DeclineBody>,
) -> Result<impl IntoResponse, AppError>
where
    S: LeasingStore + 'static,
    D: IdentityDirectory + 'static,
    N: NotificationSender + 'static,
    C: DocumentStore + 'static,
{
    let proposal =
        context
            .proposals
            .propose_decline(body.actor, ProposalId(proposal_id), body.reason)?;
    Ok(Json(proposal_summary(&proposal)))
}

pub(crate) async fn final_decline_handler<S, D, N, C>(
    State(context): State<Context<S, D, N, C>>,
    Path(proposal_id): Path<u64>,
    Json(body): Json<DeclineBody>,
) -> Result<impl IntoResponse, AppError>
where
    S: LeasingStore + 'static,
    D: IdentityDirectory + 'static,
    N: NotificationSender + 'static,
    C: DocumentStore + 'static,
{
    let proposal =
        context
            .proposals
            .final_decline(body.actor, ProposalId(proposal_id), body.reason)?;
    Ok(Json(proposal_summary(&proposal)))
}

pub(crate) async fn final_approval_handler<S, D, N, C>(
    State(context): State<Context<S, D, N, C>>,
    Path(proposal_id): Path<u64>,
    Json(body): Json<FinalApprovalBody>,
) -> Result<impl IntoResponse, AppError>
where
    S: LeasingStore + 'static,
    D: IdentityDirectory + 'static,
    N: NotificationSender + 'static,
    C: DocumentStore + 'static,
{
    let today = body.today.unwrap_or_else(|| Local::now().date_naive());
    let outcome = context.proposals.final_approval(
        body.actor,
        ProposalId(proposal_id),
        IssuanceRequest {
            decision: body.decision,
            approval_type: body.approval_type,
            start_date: body.start_date,
            expiry_date: body.expiry_date,
            record_management_number: body.record_management_number,
            details: body.details,
            charge_method: body.charge_method,
        },
        today,
        Utc::now(),
    )?;

    let payload = match outcome {
        FinalApprovalOutcome::ApprovalReady { proposal, approval } => json!({
            "outcome": "approval_ready",
            "proposal": proposal_summary(&proposal),
            "approval": approval,
        }),
        FinalApprovalOutcome::ApplicationGenerated {
            proposal,
            generated,
        } => json!({
            "outcome": "application_generated",
            "proposal": proposal_summary(&proposal),
            "generated_proposal": proposal_summary(&generated),
        }),
        FinalApprovalOutcome::CompetitiveProcessGenerated {
            proposal,
            competitive_process,
        } => json!({
            "outcome": "competitive_process_generated",
            "proposal": proposal_summary(&proposal),
            "competitive_process": competitive_process,
        }),
    };
    Ok(Json(payload))
}

pub(crate) async fn renew_handler<S, D, N, C>(
    State(context): State<Context<S, D, N, C>>,
    Path(approval_id): Path<u64>,
    Json(body): Json<ActorBody>,
) -> Result<impl IntoResponse, AppError>
where
    S: LeasingStore + 'static,
    D: IdentityDirectory + 'static,
    N: NotificationSender + 'static,
    C: DocumentStore + 'static,
{
    let proposal = context
        .proposals
        .renew_approval(body.actor, ApprovalId(approval_id))?;
    Ok((StatusCode::CREATED, Json(proposal_summary(&proposal))))
}

pub(crate) async fn amend_handler<S, D, N, C>(
    State(context): State<Context<S, D, N, C>>,
    Path(approval_id): Path<u64>,
    Json(body): Json<ActorBody>,
) -> Result<impl IntoResponse, AppError>
where
    S: LeasingStore + 'static,
    D: IdentityDirectory + 'static,
    N: NotificationSender + 'static,
    C: DocumentStore + 'static,
{
    let proposal = context
        .proposals
        .amend_approval(body.actor, ApprovalId(approval_id))?;
    Ok((StatusCode::CREATED, Json(proposal_summary(&proposal))))
}

pub(crate) async fn update_invoicing_details_handler<S, D, N, C>(
    State(context): State<Context<S, D, N, C>>,
    Path(proposal_id): Path<u64>,
    Json(body): Json<UpdateInvoicingDetailsBody>,
) -> Result<impl IntoResponse, AppError>
where
    S: LeasingStore + 'static,
    D: IdentityDirectory + 'static,
    N: NotificationSender + 'static,
    C: DocumentStore + 'static,
{
    let today = body.today.unwrap_or_else(|| Local::now().date_naive());
    let details = context.proposals.update_invoicing_details(
        body.actor,
        ProposalId(proposal_id),
        body.details,
        today,
    )?;
    Ok(Json(details))
}

pub(crate) async fn complete_editing_handler<S, D, N, C>(
    State(context): State<Context<S, D, N, C>>,
    Path(proposal_id): Path<u64>,
    Json(body): Json<CompleteEditingBody>,
) -> Result<impl IntoResponse, AppError>
where
    S: LeasingStore + 'static,
    D: IdentityDirectory + 'static,
    N: NotificationSender + 'static,
    C: DocumentStore + 'static,
{
    let today = body.today.unwrap_or_else(|| Local::now().date_naive());
    let invoices =
        context
            .proposals
            .finance_complete_editing(body.actor, ProposalId(proposal_id), today)?;
    let raised: Vec<_> = invoices
        .iter()
        .map(|invoice| invoice_summary(invoice, None))
        .collect();
    Ok(Json(json!({ "invoices_raised": raised })))
}

pub(crate) async fn invoice_handler<S, D, N, C>(
    State(context): State<Context<S, D, N, C>>,
    Path(invoice_id): Path<u64>,
) -> Result<impl IntoResponse, AppError>
where
    S: LeasingStore + 'static,
    D: IdentityDirectory + 'static,
    N: NotificationSender + 'static,
    C: DocumentStore + 'static,
{
    let invoice = context.ledger.invoice(InvoiceId(invoice_id))?;
    let balance = context.ledger.balance_of(invoice.id)?;
    Ok(Json(invoice_summary(&invoice, Some(balance))))
}

pub(crate) async fn record_transaction_handler<S, D, N, C>(
    State(context): State<Context<S, D, N, C>>,
    Path(invoice_id): Path<u64>,
    Json(body): Json<TransactionBody>,
) -> Result<impl IntoResponse, AppError>
where
    S: LeasingStore + 'static,
    D: IdentityDirectory + 'static,
    N: NotificationSender + 'static,
    C: DocumentStore + 'static,
{
    let invoice = context.ledger.record_transaction(
        body.actor,
        InvoiceId(invoice_id),
        body.credit.unwrap_or(Decimal::ZERO),
        body.debit.unwrap_or(Decimal::ZERO),
        Utc::now(),
    )?;
    let balance = context.ledger.balance_of(invoice.id)?;
    Ok(Json(invoice_summary(&invoice, Some(balance))))
}

pub(crate) async fn upload_oracle_handler<S, D, N, C>(
    State(context): State<Context<S, D, N, C>>,
    Path(invoice_id): Path<u64>,
    Json(body): Json<OracleNumberBody>,
) -> Result<impl IntoResponse, AppError>
where
    S: LeasingStore + 'static,
    D: IdentityDirectory + 'static,
    N: NotificationSender + 'static,
    C: DocumentStore + 'static,
{
    let invoice = context.ledger.upload_oracle_invoice(
        body.actor,
        InvoiceId(invoice_id),
        body.oracle_invoice_number,
        Utc::now(),
    )?;
    Ok(Json(invoice_summary(&invoice, None)))
}

pub(crate) async fn void_invoice_handler<S, D, N, C>(
    State(context): State<Context<S, D, N, C>>,
    Path(invoice_id): Path<u64>,
    Json(body): Json<ActorBody>,
) -> Result<impl IntoResponse, AppError>
where
    S: LeasingStore + 'static,
    D: IdentityDirectory + 'static,
    N: NotificationSender + 'static,
    C: DocumentStore + 'static,
{
    let invoice = context
        .ledger
        .void_invoice(body.actor, InvoiceId(invoice_id))?;
    Ok(Json(invoice_summary(&invoice, None)))
}

pub(crate) async fn ad_hoc_invoice_handler<S, D, N, C>(
    State(context): State<Context<S, D, N, C>>,
    Path(approval_id): Path<u64>,
    Json(body): Json<AdHocInvoiceBody>,
) -> Result<impl IntoResponse, AppError>
where
    S: LeasingStore + 'static,
    D: IdentityDirectory + 'static,
    N: NotificationSender + 'static,
    C: DocumentStore + 'static,
{
    let invoice = context.ledger.create_ad_hoc_invoice(
        body.actor,
        ApprovalId(approval_id),
        body.amount,
        body.description,
    )?;
    Ok((StatusCode::CREATED, Json(invoice_summary(&invoice, None))))
}

/// Payment gateway callback. Replaying a settled invoice is acknowledged
/// without change.
pub(crate) async fn pay_invoice_success_handler<S, D, N, C>(
    State(context): State<Context<S, D, N, C>>,
    Path(invoice_uuid): Path<Uuid>,
) -> Result<impl IntoResponse, AppError>
where
    S: LeasingStore + 'static,
    D: IdentityDirectory + 'static,
    N: NotificationSender + 'static,
    C: DocumentStore + 'static,
{
    let invoice = context.ledger.pay_invoice_success(invoice_uuid, Utc::now())?;
    Ok(Json(invoice_summary(&invoice, None)))
}
