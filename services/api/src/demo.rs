use chrono::{Duration, NaiveDate, TimeZone, Utc};
use clap::Args;
use rust_decimal::Decimal;
use std::sync::Arc;

use leases_core::charges::cpi::CpiTable;
use leases_core::charges::ChargeMethod;
use leases_core::config::InvoicingConfig;
use leases_core::invoicing::generation::InvoiceGenerationJob;
use leases_core::invoicing::details::AnnualIncrementPercentage;
use leases_core::invoicing::outbox::OutboxWorker;
use leases_core::invoicing::reminders::CustomCpiReminderJob;
use leases_core::ports::{DocumentCategory, DocumentStore};
use leases_core::proposals::domain::{
    ApprovalType, ApprovalTypeKind, PostalAddress, ProcessingStatus, ProposalType, UserId,
};
use leases_core::proposals::domain::ApplicationType;
use leases_core::proposals::service::{FinalApprovalOutcome, IssuanceRequest, LodgementRequest};
use leases_core::store::InMemoryLeasingStore;

use crate::error::AppError;
use crate::infra::{
    seeded_directory, InMemoryDocumentStore, LeasingContext, RecordingNotificationSender,
    RecordingPaymentGateway, DEMO_APPROVER, DEMO_ASSESSOR, DEMO_FINANCE_OFFICER,
};

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Evaluation date for the demo (YYYY-MM-DD). Defaults to 2025-06-10.
    #[arg(long, value_parser = crate::infra::parse_date)]
    pub(crate) today: Option<NaiveDate>,
    /// Base fee for the demo lease (defaults to 10000.00)
    #[arg(long, value_parser = crate::infra::parse_decimal)]
    pub(crate) base_fee: Option<Decimal>,
}

/// Scripted walkthrough: lodgement, assessment, referral, approval,
/// invoicing editing, gateway sync, and payment.
pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let today = args
        .today
        .unwrap_or_else(|| NaiveDate::from_ymd_opt(2025, 6, 10).unwrap_or_default());
    let base_fee = args.base_fee.unwrap_or_else(|| Decimal::from(10_000));
    let now = Utc
        .from_utc_datetime(&today.and_hms_opt(9, 0, 0).unwrap_or_default());

    let invoicing = InvoicingConfig {
        gst_percentage: Decimal::TEN,
        days_before_payment_due: 30,
        external_url: "http://localhost:3000".to_string(),
    };

    let store = Arc::new(InMemoryLeasingStore::default());
    let directory = Arc::new(seeded_directory());
    let notifications = Arc::new(RecordingNotificationSender::default());
    let documents = Arc::new(InMemoryDocumentStore::default());
    let gateway = Arc::new(RecordingPaymentGateway::default());
    let context = LeasingContext::new(
        Arc::clone(&store),
        Arc::clone(&directory),
        Arc::clone(&notifications),
        Arc::clone(&documents),
        CpiTable::new(Vec::new()),
        &invoicing,
    );

    let applicant = UserId(1);
    let referee = UserId(42);

    println!("Leases and licensing demo (evaluated {today})");

    let proposal = context.proposals.lodge(LodgementRequest {
        proposal_type: ProposalType::New,
        application_type: ApplicationType::LeaseLicence,
        submitter: applicant,
        organisation: None,
        individual: Some(applicant),
        proxy: None,
        postal_address: Some(PostalAddress {
            line1: "1 Kensington Terrace".to_string(),
            locality: "Kensington".to_string(),
            state: "WA".to_string(),
            postcode: "6151".to_string(),
        }),
        site_name: Some("Jarrah Grove campground".to_string()),
        groups: vec!["South West".to_string()],
    })?;
    println!("- Lodged {} as a draft", proposal.lodgement_number());

    context.proposals.submit(applicant, proposal.id)?;
    println!("- Submitted for assessment");

    context.proposals.move_to_status(
        DEMO_ASSESSOR,
        proposal.id,
        ProcessingStatus::WithAssessorConditions,
        None,
    )?;
    println!("- Assessor opened conditions editing (default requirements attached)");

    let referral = context.proposals.send_referral(
        DEMO_ASSESSOR,
        proposal.id,
        referee,
        "Please confirm the site has no conservation overlay".to_string(),
    )?;
    context.proposals.complete_referral(
        referee,
        referral.id,
        Some("No overlay recorded".to_string()),
    )?;
    println!("- Referral {} sent and completed", referral.id);

    context.proposals.move_to_status(
        DEMO_APPROVER,
        proposal.id,
        ProcessingStatus::WithApprover,
        None,
    )?;

    for category in [
        DocumentCategory::LicenceDocument,
        DocumentCategory::CoverLetter,
        DocumentCategory::SignOffSheet,
    ] {
        documents.attach(proposal.id, category);
    }
    println!("- Licence documents attached");

    let start_date = NaiveDate::from_ymd_opt(2025, 7, 1).unwrap_or(today);
    let expiry_date = NaiveDate::from_ymd_opt(2027, 6, 30).unwrap_or(today);
    let outcome = context.proposals.final_approval(
        DEMO_APPROVER,
        proposal.id,
        IssuanceRequest {
            decision: None,
            approval_type: Some(ApprovalType {
                kind: ApprovalTypeKind::Lease,
                gst_free: false,
            }),
            start_date: Some(start_date),
            expiry_date: Some(expiry_date),
            record_management_number: Some("DOC2025/001".to_string()),
            details: Some("Two year lease over the campground".to_string()),
            charge_method: Some(ChargeMethod::BaseFeePlusFixedAnnualPercentage),
        },
        today,
        now,
    )?;
    let approval = match outcome {
        FinalApprovalOutcome::ApprovalReady { approval, .. } => approval,
        other => {
            println!("  Unexpected approval outcome: {other:?}");
            return Ok(());
        }
    };
    println!(
        "- Approval {} issued: {} to {}",
        approval.id, approval.start_date, approval.expiry_date
    );

    let mut details = context.proposals.invoicing_details_for(proposal.id)?;
    details.base_fee = Some(base_fee);
    details.annual_increment_percentages = vec![AnnualIncrementPercentage {
        year: 2,
        percentage: Decimal::from(5),
    }];
    context
        .proposals
        .update_invoicing_details(DEMO_FINANCE_OFFICER, proposal.id, details, today)?;
    println!("- Finance configured a {base_fee} base fee with a 5% year-two increment");

    let raised = context.proposals.finance_complete_editing(
        DEMO_FINANCE_OFFICER,
        proposal.id,
        start_date,
    )?;
    println!("- Invoicing editing complete; {} invoice(s) raised", raised.len());
    for invoice in &raised {
        println!(
            "  - {} for {} covering {:?} to {:?}",
            invoice.id, invoice.amount, invoice.cover_start, invoice.cover_end
        );
    }

    let Some(first) = raised.first() else {
        println!("  No invoice raised; nothing further to demonstrate");
        return Ok(());
    };

    let issued = context.ledger.upload_oracle_invoice(
        DEMO_FINANCE_OFFICER,
        first.id,
        "ORA-771001".to_string(),
        now,
    )?;
    println!(
        "- Oracle invoice number recorded; payment due {:?}",
        issued.date_due
    );

    let worker = OutboxWorker::new(
        Arc::clone(&store),
        Arc::clone(&gateway),
        Arc::clone(&notifications),
        invoicing.external_url.clone(),
        invoicing.gst_percentage,
        3,
    );
    let outbox_report = worker.run()?;
    println!(
        "- Gateway sync: {} processed, {} completed",
        outbox_report.processed, outbox_report.completed
    );
    for request in gateway.requests() {
        println!(
            "  - registered {} ({} incl. GST, callback {})",
            request.invoice_uuid, request.amount_incl_tax, request.callback_url
        );
    }

    let paid = context
        .ledger
        .pay_invoice_success(issued.uuid, now + Duration::hours(1))?;
    println!(
        "- Payment callback settled the invoice: status {:?}, paid {:?}",
        paid.status, paid.date_paid
    );

    // The daily runs: second-year invoicing and custom CPI figure chasing.
    let generation = InvoiceGenerationJob::new(
        Arc::clone(&store),
        Arc::clone(&notifications),
        CpiTable::new(Vec::new()),
        invoicing.gst_percentage,
    );
    let second_year = start_date + Duration::days(370);
    let generation_report = generation.run(second_year)?;
    println!(
        "- Daily invoice run at {second_year}: {} invoice(s) created",
        generation_report.invoices_created
    );

    let reminders = CustomCpiReminderJob::new(Arc::clone(&store), Arc::clone(&notifications));
    let reminder_report = reminders.run(second_year)?;
    println!(
        "- Custom CPI reminder run: {} sent",
        reminder_report.reminders_sent
    );

    println!("\nNotifications dispatched:");
    for event in notifications.events() {
        println!("  - {event:?}");
    }

    Ok(())
}
