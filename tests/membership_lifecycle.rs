//! Integration tests for membership lifecycles driven by the application
//! handlers: checkout, refunds, cancellation and the periodic sweep.

use std::sync::Arc;

use proptest::prelude::*;

use khm_billing::adapters::memory::{
    InMemoryIdempotencyStore, InMemoryMembershipRepository, InMemoryOrderRepository,
    InMemoryUserDirectory, MockPaymentGateway, RecordingEmailService,
};
use khm_billing::application::{
    CancelMembershipCommand, CancelMembershipHandler, CheckoutCommand, CheckoutHandler,
    MemberNotifier, MembershipAccessControl, MembershipSweepHandler, RefundOrderCommand,
    RefundOrderHandler, SweepSettings,
};
use khm_billing::domain::billing::{BillingPeriod, BillingUser, FailureCode, Outcome};
use khm_billing::domain::foundation::{LevelId, Money, Timestamp, UserId};
use khm_billing::domain::membership::{AssignOptions, MembershipStatus};
use khm_billing::domain::order::{BillingPlan, CheckoutContext, OrderStatus, TaxPolicy};
use khm_billing::ports::{
    AccessControl, MembershipRepository, OrderRepository, TEMPLATE_MEMBERSHIP_CANCELLED,
    TEMPLATE_MEMBERSHIP_EXPIRED,
};

const USER: UserId = UserId::new(42);
const LEVEL: LevelId = LevelId::new(7);

struct Billing {
    gateway: Arc<MockPaymentGateway>,
    orders: Arc<InMemoryOrderRepository>,
    memberships: Arc<InMemoryMembershipRepository>,
    email: Arc<RecordingEmailService>,
    checkout: CheckoutHandler,
    refund: RefundOrderHandler,
    cancel: CancelMembershipHandler,
    sweep: MembershipSweepHandler,
    access: MembershipAccessControl,
}

fn billing() -> Billing {
    let gateway = Arc::new(MockPaymentGateway::new());
    let orders = Arc::new(InMemoryOrderRepository::new());
    let memberships = Arc::new(InMemoryMembershipRepository::new());
    let email = Arc::new(RecordingEmailService::new());
    let users = Arc::new(InMemoryUserDirectory::new().with_user(BillingUser {
        id: USER,
        email: "member@example.com".to_string(),
        display_name: None,
        login: "member".to_string(),
    }));
    let notifier = MemberNotifier::new(email.clone(), users);

    Billing {
        checkout: CheckoutHandler::new(
            gateway.clone(),
            orders.clone(),
            memberships.clone(),
            TaxPolicy::new("ON", "13".parse().unwrap()),
        ),
        refund: RefundOrderHandler::new(gateway.clone(), orders.clone(), memberships.clone()),
        cancel: CancelMembershipHandler::new(gateway.clone(), memberships.clone(), notifier.clone()),
        sweep: MembershipSweepHandler::new(
            memberships.clone(),
            Arc::new(InMemoryIdempotencyStore::new()),
            notifier,
            SweepSettings::default(),
        ),
        access: MembershipAccessControl::new(memberships.clone()),
        gateway,
        orders,
        memberships,
        email,
    }
}

fn money(value: &str) -> Money {
    value.parse().unwrap()
}

fn purchase(subtotal: &str, plan: Option<BillingPlan>) -> CheckoutCommand {
    CheckoutCommand {
        user_id: USER,
        level_id: LEVEL,
        subtotal: money(subtotal),
        billing_region: Some("on".to_string()),
        currency: None,
        checkout: CheckoutContext {
            payment_method_id: Some("pm_card_visa".to_string()),
            level_name: Some("Gold".to_string()),
            plan,
            ..Default::default()
        },
    }
}

#[tokio::test]
async fn one_off_purchase_then_full_refund_revokes_access() {
    let b = billing();

    let bought = b.checkout.handle(purchase("20.00", None)).await.unwrap();
    assert!(bought.is_paid());
    assert_eq!(bought.order.total, money("22.60"));
    assert_eq!(bought.order.status, OrderStatus::Success);
    assert!(b.access.can_access(USER, LEVEL).await.unwrap());

    let refunded = b
        .refund
        .handle(RefundOrderCommand {
            order_id: bought.order.id,
            amount: None,
            reason: Some("requested_by_customer".to_string()),
        })
        .await
        .unwrap();

    assert!(refunded.membership_cancelled);
    assert_eq!(refunded.order.status, OrderStatus::Refunded);
    assert!(!b.access.can_access(USER, LEVEL).await.unwrap());
}

#[tokio::test]
async fn declined_card_leaves_no_access() {
    let b = billing();
    b.gateway.script(
        "charge",
        Outcome::failure("Your card was declined.", FailureCode::CardDeclined),
    );

    let result = b.checkout.handle(purchase("20.00", None)).await.unwrap();

    assert!(!result.is_paid());
    assert!(result.membership.is_none());
    let order = b.orders.find(result.order.id).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Pending);
    assert_eq!(order.failure_code.as_deref(), Some("card_declined"));
    assert!(!b.access.can_access(USER, LEVEL).await.unwrap());
}

#[tokio::test]
async fn subscription_cancelled_at_period_end_then_expires_from_access() {
    let b = billing();
    let plan = BillingPlan::new(money("15.00"), BillingPeriod::Month);
    b.checkout
        .handle(purchase("15.00", Some(plan)))
        .await
        .unwrap();
    assert!(b.gateway.was_called("create_subscription"));

    let end = Timestamp::from_ymd(2025, 6, 1);
    b.memberships
        .update_end_date(USER, LEVEL, end)
        .await
        .unwrap();

    let cancelled = b
        .cancel
        .handle(CancelMembershipCommand {
            user_id: USER,
            level_id: LEVEL,
            at_period_end: true,
            reason: None,
        })
        .await
        .unwrap();

    assert_eq!(cancelled.membership.status, MembershipStatus::Cancelled);
    assert_eq!(cancelled.membership.end_date, end);
    assert!(!b.access.can_access(USER, LEVEL).await.unwrap());
    assert_eq!(b.email.sent_with_template(TEMPLATE_MEMBERSHIP_CANCELLED).len(), 1);
}

#[tokio::test]
async fn past_due_then_reassign_starts_active() {
    let b = billing();
    b.memberships
        .assign(USER, LEVEL, AssignOptions::default())
        .await
        .unwrap();

    let past_due = b
        .memberships
        .mark_past_due(USER, LEVEL, "Renewal declined")
        .await
        .unwrap();
    assert!(!past_due.has_access());

    let reassigned = b
        .memberships
        .assign(USER, LEVEL, AssignOptions::default().with_reason("Paid manually"))
        .await
        .unwrap();

    assert_eq!(reassigned.status, MembershipStatus::Active);
    assert_eq!(reassigned.status_log.len(), 1, "past-due history is not carried over");
    assert!(!reassigned.start_date.is_before(&past_due.start_date));
    assert!(b.access.can_access(USER, LEVEL).await.unwrap());
}

#[tokio::test]
async fn sweep_expires_lapsed_membership() {
    let b = billing();
    let now = Timestamp::now();
    b.memberships
        .assign(
            USER,
            LEVEL,
            AssignOptions::default().with_end_date(Some(now.minus_days(2))),
        )
        .await
        .unwrap();

    let report = b.sweep.handle(now).await.unwrap();

    assert_eq!(report.expired, 1);
    let membership = b.memberships.find(USER, LEVEL).await.unwrap().unwrap();
    assert_eq!(membership.status, MembershipStatus::Expired);
    assert_eq!(b.email.sent_with_template(TEMPLATE_MEMBERSHIP_EXPIRED).len(), 1);

    let again = b.sweep.handle(now).await.unwrap();
    assert_eq!(again.expired, 0);
}

#[tokio::test]
async fn invalid_transition_does_not_mutate() {
    let b = billing();
    b.memberships
        .assign(USER, LEVEL, AssignOptions::default())
        .await
        .unwrap();
    let expired = b
        .memberships
        .expire(USER, LEVEL, "Period ended")
        .await
        .unwrap();

    assert!(b.memberships.pause(USER, LEVEL, None, "Holiday").await.is_err());
    assert!(b.memberships.resume(USER, LEVEL, "Back").await.is_err());

    let stored = b.memberships.find(USER, LEVEL).await.unwrap().unwrap();
    assert_eq!(stored.status, MembershipStatus::Expired);
    assert_eq!(stored.version, expired.version);
    assert_eq!(stored.status_log.len(), expired.status_log.len());
}

#[derive(Debug, Clone, Copy)]
enum Step {
    Cancel,
    Expire,
    Pause,
    Resume,
    PastDue,
    Recover,
}

fn step() -> impl Strategy<Value = Step> {
    prop_oneof![
        Just(Step::Cancel),
        Just(Step::Expire),
        Just(Step::Pause),
        Just(Step::Resume),
        Just(Step::PastDue),
        Just(Step::Recover),
    ]
}

proptest! {
    #[test]
    fn access_tracks_active_status_through_any_sequence(steps in prop::collection::vec(step(), 1..12)) {
        let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
        runtime.block_on(async {
            let repository = InMemoryMembershipRepository::new();
            repository.assign(USER, LEVEL, AssignOptions::default()).await.unwrap();

            for step in steps {
                let before = repository.find(USER, LEVEL).await.unwrap().unwrap();
                let result = match step {
                    Step::Cancel => repository.cancel(USER, LEVEL, false, "cancel").await,
                    Step::Expire => repository.expire(USER, LEVEL, "expire").await,
                    Step::Pause => repository.pause(USER, LEVEL, None, "pause").await,
                    Step::Resume => repository.resume(USER, LEVEL, "resume").await,
                    Step::PastDue => repository.mark_past_due(USER, LEVEL, "declined").await,
                    Step::Recover => {
                        repository
                            .set_status(USER, LEVEL, MembershipStatus::Active, "recovered")
                            .await
                    }
                };
                let after = repository.find(USER, LEVEL).await.unwrap().unwrap();

                if result.is_err() {
                    assert_eq!(after.status, before.status);
                    assert_eq!(after.version, before.version);
                }
                assert_eq!(
                    repository.has_access(USER, LEVEL).await.unwrap(),
                    after.status == MembershipStatus::Active
                );
            }
        });
    }
}
