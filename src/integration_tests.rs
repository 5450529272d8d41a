#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::time::Duration;

    use rust_decimal::Decimal;
    use tokio::sync::{broadcast, watch};

    use crate::app_system::{Settings, StorefrontSession, StorefrontSystem};
    use crate::checkout::{CheckoutEvent, CheckoutStep, CheckoutView, SubmitOutcome, SubmittedPhase};
    use crate::domain::{
        AddressForm, AddressSelection, CheckoutPatch, CreateOrderResponse, Currency, NewLineItem, OrderId,
        PaymentData, PaymentMethod, PaymentReceipt, ProductId, StockLevel, StockStatus, SubjectId, VariantId,
    };
    use crate::error::CheckoutError;
    use crate::mock_framework::{create_mock_services, expect_call, ServiceReceivers};
    use crate::services::{InventoryService, ServiceError};

    const PATIENCE: Duration = Duration::from_secs(5);

    fn settings() -> Settings {
        let mut settings = Settings::default();
        // Only composition changes and manual refreshes fetch during a test.
        settings.availability.cart_refresh_secs = 3600;
        settings.availability.badge_refresh_secs = 3600;
        settings
    }

    fn tee() -> NewLineItem {
        NewLineItem::new("tee", Decimal::from(300), Currency::inr()).with_variant("tee-m")
    }

    fn tee_subject() -> SubjectId {
        SubjectId::Variant(VariantId::new("tee-m"))
    }

    fn checkout_patch(method: PaymentMethod) -> CheckoutPatch {
        let mut payment_data = PaymentData::new();
        for field in method.required_fields() {
            payment_data.insert(field.to_string(), format!("test-{field}"));
        }
        CheckoutPatch {
            shipping: Some(AddressSelection::Manual(AddressForm {
                name: "Asha Rao".into(),
                phone: "9876543210".into(),
                pincode: "560001".into(),
                street: "12 MG Road".into(),
                locality: "Ashok Nagar".into(),
                city: "Bengaluru".into(),
                state: "Karnataka".into(),
                landmark: None,
            })),
            payment_method: Some(method),
            payment_data: Some(payment_data),
            ..CheckoutPatch::default()
        }
    }

    fn order_response(id: &str, number: &str) -> CreateOrderResponse {
        CreateOrderResponse {
            id: Some(id.to_string()),
            order_number: Some(number.to_string()),
            status: Some("CONFIRMED".to_string()),
        }
    }

    async fn wait_for<T: Clone>(mut rx: watch::Receiver<T>, check: impl FnMut(&T) -> bool) -> T {
        tokio::time::timeout(PATIENCE, async move {
            rx.wait_for(check).await.map(|value| value.clone())
        })
        .await
        .expect("condition not reached in time")
        .expect("channel closed")
    }

    async fn wait_for_view(session: &StorefrontSession, check: impl FnMut(&CheckoutView) -> bool) -> CheckoutView {
        wait_for(session.checkout.watch_view(), check).await
    }

    async fn next_event(events: &mut broadcast::Receiver<CheckoutEvent>, wanted: fn(&CheckoutEvent) -> bool) -> CheckoutEvent {
        tokio::time::timeout(PATIENCE, async {
            loop {
                let event = events.recv().await.expect("event stream closed");
                if wanted(&event) {
                    return event;
                }
            }
        })
        .await
        .expect("event not received in time")
    }

    /// A session with two tees in the cart, stock confirmed as `on_hand`, and
    /// the checkout filled in and sitting on the payment step.
    async fn session_at_payment(
        method: PaymentMethod,
        on_hand: u32,
    ) -> (StorefrontSystem, StorefrontSession, ServiceReceivers) {
        let (collaborators, mut services) = create_mock_services();
        let system = StorefrontSystem::new(settings(), collaborators);
        let session = system.open_session().await.unwrap();

        session.cart.add(tee(), 2).await.unwrap();
        let (query, responder) = expect_call(&mut services.inventory).await.expect("availability lookup");
        assert_eq!(query.variant_ids, vec![VariantId::new("tee-m")]);
        let status = if on_hand == 0 { StockStatus::OutOfStock } else { StockStatus::InStock };
        responder
            .send(Ok(HashMap::from([(tee_subject(), StockLevel::new(status, on_hand))])))
            .unwrap();
        wait_for(session.availability.watch(), |report| {
            !report.loading && report.snapshots.contains_key(&tee_subject())
        })
        .await;

        assert_eq!(session.checkout.begin().await, Ok(CheckoutStep::Information));
        session.checkout.update_checkout_data(checkout_patch(method)).await.unwrap();
        assert_eq!(session.checkout.advance().await, Ok(CheckoutStep::Payment));
        (system, session, services)
    }

    #[tokio::test]
    async fn cod_submission_creates_exactly_one_order() {
        let (_system, session, mut services) = session_at_payment(PaymentMethod::CashOnDelivery, 10).await;
        let mut events = session.checkout.subscribe();
        assert_eq!(session.checkout.is_checkout_enabled().await, Ok(true));

        assert_eq!(session.checkout.submit().await, Ok(SubmitOutcome::Started));
        assert_eq!(session.checkout.submit().await, Ok(SubmitOutcome::AlreadyInFlight));
        assert_eq!(session.checkout.is_checkout_enabled().await, Ok(false));

        let (request, responder) = expect_call(&mut services.orders).await.expect("create order");
        assert_eq!(request.items.len(), 1);
        assert_eq!(request.items[0].quantity, 2);
        assert_eq!(request.payment_method, PaymentMethod::CashOnDelivery);
        responder.send(Ok(order_response("order_1", "SO-000001"))).unwrap();

        let placed = next_event(&mut events, |e| matches!(e, CheckoutEvent::OrderPlaced { .. })).await;
        assert_eq!(
            placed,
            CheckoutEvent::OrderPlaced {
                order_id: OrderId::new("order_1"),
                order_number: "SO-000001".into(),
            }
        );
        // Published before the event went out.
        let view = session.checkout.view();
        assert_eq!(view.step, CheckoutStep::Success);
        assert_eq!(view.data.order_id(), Some(&OrderId::new("order_1")));

        let cart = wait_for(session.cart.watch().await.unwrap(), |cart| cart.is_empty()).await;
        assert_eq!(cart.totals().subtotal, Decimal::ZERO);
        assert!(services.orders.try_recv().is_err());
        assert!(services.payments.try_recv().is_err());
        assert!(matches!(
            session.checkout.submit().await,
            Err(CheckoutError::InvalidTransition { from: CheckoutStep::Success, .. })
        ));
    }

    #[tokio::test]
    async fn card_payment_error_keeps_the_order_for_a_retry() {
        let (_system, session, mut services) = session_at_payment(PaymentMethod::Card, 10).await;

        assert_eq!(session.checkout.submit().await, Ok(SubmitOutcome::Started));
        let (_, responder) = expect_call(&mut services.orders).await.expect("create order");
        responder.send(Ok(order_response("order_1", "SO-000001"))).unwrap();

        let (payment, responder) = expect_call(&mut services.payments).await.expect("payment");
        assert_eq!(payment.order_id, OrderId::new("order_1"));
        assert_eq!(payment.amount, Decimal::from(630));
        assert_eq!(payment.payment_data.len(), 3);
        let awaiting = wait_for_view(&session, |view| {
            view.step == CheckoutStep::Submitted(SubmittedPhase::AwaitingPayment)
        })
        .await;
        assert!(awaiting.data.payment_started());
        responder.send(Err(ServiceError::Rejected("card declined".into()))).unwrap();

        let failed = wait_for_view(&session, |view| view.step == CheckoutStep::Payment && !view.submitting).await;
        assert_eq!(failed.data.order_id(), Some(&OrderId::new("order_1")));
        assert!(!failed.data.payment_started());
        assert!(failed.data.payment_error().is_some_and(|message| message.contains("card declined")));

        // The retry only repeats the payment.
        assert_eq!(session.checkout.submit().await, Ok(SubmitOutcome::Started));
        let (payment, responder) = expect_call(&mut services.payments).await.expect("second payment");
        assert_eq!(payment.order_id, OrderId::new("order_1"));
        responder
            .send(Ok(PaymentReceipt {
                order_id: OrderId::new("order_1"),
                payment_id: "pay_1".into(),
            }))
            .unwrap();

        let done = wait_for_view(&session, |view| view.step == CheckoutStep::Success).await;
        assert_eq!(done.data.payment_error(), None);
        assert!(services.orders.try_recv().is_err());
    }

    #[tokio::test]
    async fn payment_retry_charges_what_the_order_was_created_for() {
        let (_system, session, mut services) = session_at_payment(PaymentMethod::Card, 10).await;

        session.checkout.submit().await.unwrap();
        let (order, responder) = expect_call(&mut services.orders).await.expect("create order");
        assert_eq!(order.items[0].quantity, 2);
        responder.send(Ok(order_response("order_1", "SO-000001"))).unwrap();
        let (payment, responder) = expect_call(&mut services.payments).await.expect("payment");
        assert_eq!(payment.amount, Decimal::from(630));
        responder.send(Err(ServiceError::Rejected("card declined".into()))).unwrap();
        wait_for_view(&session, |view| view.step == CheckoutStep::Payment && !view.submitting).await;

        // The basket changes after the order exists.
        session
            .cart
            .set_quantity(crate::domain::LineKey::variant("tee", "tee-m"), 3)
            .await
            .unwrap();
        wait_for_view(&session, |view| view.totals.total == Decimal::from(945)).await;

        assert_eq!(session.checkout.submit().await, Ok(SubmitOutcome::Started));
        let (payment, _pending) = expect_call(&mut services.payments).await.expect("second payment");
        assert_eq!(payment.order_id, OrderId::new("order_1"));
        assert_eq!(payment.amount, Decimal::from(630));
        assert_eq!(payment.currency, Currency::inr());
        assert!(services.orders.try_recv().is_err());
    }

    #[tokio::test]
    async fn processor_callbacks_drive_the_awaiting_payment_step() {
        let (_system, session, mut services) = session_at_payment(PaymentMethod::Upi, 10).await;

        session.checkout.submit().await.unwrap();
        let (_, responder) = expect_call(&mut services.orders).await.expect("create order");
        responder.send(Ok(order_response("order_9", "SO-000009"))).unwrap();
        let (_payment, _pending) = expect_call(&mut services.payments).await.expect("payment");

        assert_eq!(
            session.checkout.payment_failed("timed out".into()).await,
            Ok(CheckoutStep::Payment)
        );
        let data = session.checkout.checkout_data().await.unwrap();
        assert_eq!(data.order_id(), Some(&OrderId::new("order_9")));
        assert!(data.payment_error().is_some());

        assert!(matches!(
            session
                .checkout
                .payment_completed(PaymentReceipt {
                    order_id: OrderId::new("order_9"),
                    payment_id: "pay_4".into(),
                })
                .await,
            Err(CheckoutError::InvalidTransition { from: CheckoutStep::Payment, .. })
        ));
    }

    #[tokio::test]
    async fn unavailable_stock_blocks_checkout() {
        let (_system, session, mut services) = session_at_payment(PaymentMethod::CashOnDelivery, 1).await;

        assert_eq!(session.checkout.is_step1_complete().await, Ok(true));
        assert_eq!(session.checkout.is_step2_complete().await, Ok(true));
        assert_eq!(session.checkout.is_checkout_enabled().await, Ok(false));
        assert_eq!(
            session.availability.report().unavailable.into_iter().collect::<Vec<_>>(),
            vec![ProductId::new("tee")]
        );

        let refused = session.checkout.submit().await;
        assert!(matches!(refused, Err(CheckoutError::AvailabilityConflict { .. })));
        assert!(session.checkout.checkout_data().await.unwrap().payment_error().is_some());
        assert!(services.orders.try_recv().is_err());

        // One unit is in stock, so one tee can be ordered.
        session
            .cart
            .set_quantity(crate::domain::LineKey::variant("tee", "tee-m"), 1)
            .await
            .unwrap();
        assert_eq!(session.checkout.is_checkout_enabled().await, Ok(true));
    }

    #[tokio::test]
    async fn failed_refresh_keeps_the_last_known_stock() {
        let (_system, session, mut services) = session_at_payment(PaymentMethod::CashOnDelivery, 10).await;

        session.availability.refresh_now().await.unwrap();
        let (_, responder) = expect_call(&mut services.inventory).await.expect("refresh");
        responder.send(Err(ServiceError::Transport("connection reset".into()))).unwrap();

        let report = wait_for(session.availability.watch(), |report| report.last_error.is_some()).await;
        assert_eq!(report.snapshots[&tee_subject()].available_quantity, 10);
        assert!(!report.blocked());
        assert_eq!(session.checkout.is_checkout_enabled().await, Ok(true));
    }

    #[tokio::test]
    async fn item_added_after_the_last_fetch_is_unverified() {
        let (_system, session, _services) = session_at_payment(PaymentMethod::CashOnDelivery, 10).await;

        session
            .cart
            .add(NewLineItem::new("mug", Decimal::from(250), Currency::inr()), 1)
            .await
            .unwrap();

        // The lookup for the mug is never answered.
        match session.checkout.submit().await {
            Err(CheckoutError::AvailabilityConflict { unknown, .. }) => {
                assert_eq!(unknown, vec![SubjectId::Product(ProductId::new("mug"))]);
            }
            other => panic!("expected an availability conflict, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn reset_session_ignores_a_late_order_result() {
        let (_system, session, mut services) = session_at_payment(PaymentMethod::CashOnDelivery, 10).await;

        session.checkout.submit().await.unwrap();
        let (_, responder) = expect_call(&mut services.orders).await.expect("create order");

        assert_eq!(session.checkout.reset().await, Ok(1));
        responder.send(Ok(order_response("order_1", "SO-000001"))).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        let view = session.checkout.view();
        assert_eq!(view.session, 1);
        assert_eq!(view.step, CheckoutStep::Cart);
        assert_eq!(session.checkout.checkout_data().await.unwrap().order_id(), None);
        assert!(!session.cart.snapshot().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn order_without_id_blocks_blind_retries() {
        let (_system, session, mut services) = session_at_payment(PaymentMethod::CashOnDelivery, 10).await;

        session.checkout.submit().await.unwrap();
        let (_, responder) = expect_call(&mut services.orders).await.expect("create order");
        responder
            .send(Ok(CreateOrderResponse {
                order_number: Some("SO-000001".into()),
                ..CreateOrderResponse::default()
            }))
            .unwrap();

        let view = wait_for_view(&session, |view| {
            view.step == CheckoutStep::Payment && !view.submitting && view.data.payment_error().is_some()
        })
        .await;
        assert!(view.data.payment_error().is_some_and(|message| message.contains("contact support")));
        assert_eq!(session.checkout.submit().await, Err(CheckoutError::UnknownOrderResponse));
        assert!(!view.checkout_enabled);
        assert!(services.orders.try_recv().is_err());
    }

    #[tokio::test]
    async fn missing_payment_fields_are_listed() {
        let (_system, session, _services) = session_at_payment(PaymentMethod::CashOnDelivery, 10).await;
        session
            .checkout
            .update_checkout_data(CheckoutPatch {
                payment_method: Some(PaymentMethod::Upi),
                payment_data: Some(PaymentData::new()),
                ..CheckoutPatch::default()
            })
            .await
            .unwrap();

        assert_eq!(session.checkout.is_step2_complete().await, Ok(false));
        assert_eq!(
            session.checkout.submit().await,
            Err(CheckoutError::Validation {
                fields: vec!["paymentData.upiId".into()]
            })
        );
        assert_eq!(session.checkout.checkout_data().await.unwrap().payment_error(), None);
    }

    #[tokio::test]
    async fn emptying_the_cart_resets_the_checkout() {
        let (_system, session, _services) = session_at_payment(PaymentMethod::CashOnDelivery, 10).await;
        let mut events = session.checkout.subscribe();

        session.cart.clear().await.unwrap();

        let reset = next_event(&mut events, |e| matches!(e, CheckoutEvent::SessionReset { .. })).await;
        assert_eq!(reset, CheckoutEvent::SessionReset { session: 1 });
        let view = wait_for_view(&session, |view| view.session == 1).await;
        assert_eq!(view.step, CheckoutStep::Cart);
        assert_eq!(view.data.payment_method, None);
        assert_eq!(session.checkout.begin().await, Err(CheckoutError::EmptyCart));
    }

    #[tokio::test]
    async fn badges_follow_their_subjects() {
        let (collaborators, mut services) = create_mock_services();
        let system = StorefrontSystem::new(settings(), collaborators);

        let badges = system.badges(&[ProductId::new("tee")], &[]);
        let (query, responder) = expect_call(&mut services.inventory).await.expect("badge lookup");
        assert_eq!(query.product_ids, vec![ProductId::new("tee")]);
        responder
            .send(Ok(HashMap::from([(
                SubjectId::Product(ProductId::new("tee")),
                StockLevel::new(StockStatus::LowStock, 3),
            )])))
            .unwrap();
        wait_for(badges.watch(), |report| !report.loading && !report.snapshots.is_empty()).await;

        let view = badges.view();
        assert_eq!(view.product_availability[&ProductId::new("tee")].available_quantity, 3);
        assert!(view.variant_availability.is_empty());

        badges.set_subjects(&[], &[VariantId::new("tee-l")]);
        let (query, _pending) = expect_call(&mut services.inventory).await.expect("lookup after change");
        assert_eq!(query.variant_ids, vec![VariantId::new("tee-l")]);
    }

    #[tokio::test]
    async fn in_memory_storefront_end_to_end() {
        let (system, backend) = StorefrontSystem::in_memory(settings(), None);
        backend.inventory.stock(tee_subject(), 8).await.unwrap();

        let session = system.open_session().await.unwrap();
        session.cart.add(tee(), 2).await.unwrap();
        session.cart.apply_coupon("welcome10").await.unwrap();
        wait_for(session.availability.watch(), |report| {
            !report.loading && !report.blocked() && !report.snapshots.is_empty()
        })
        .await;

        session.checkout.begin().await.unwrap();
        session.checkout.update_checkout_data(checkout_patch(PaymentMethod::Card)).await.unwrap();
        session.checkout.advance().await.unwrap();
        let mut events = session.checkout.subscribe();
        assert_eq!(session.checkout.submit().await, Ok(SubmitOutcome::Started));

        let placed = next_event(&mut events, |e| matches!(e, CheckoutEvent::OrderPlaced { .. })).await;
        let CheckoutEvent::OrderPlaced { order_id, order_number } = placed else {
            unreachable!()
        };
        assert_eq!(order_number, "SO-000001");

        let record = backend.orders.order(order_id).await.unwrap().unwrap();
        assert_eq!(record.status.as_str(), "PAID");
        assert_eq!(record.coupon_code.as_deref(), Some("WELCOME10"));
        let levels = backend
            .inventory
            .get_availability(crate::services::AvailabilityQuery::from_subjects(&[tee_subject()]))
            .await
            .unwrap();
        assert_eq!(levels[&tee_subject()].available_quantity, 6);

        session.close().await.unwrap();
        drop(backend);
        system.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn declined_payment_is_retried_after_the_order_took_the_stock() {
        let (system, backend) = StorefrontSystem::in_memory(settings(), Some("card declined".into()));
        backend.inventory.stock(tee_subject(), 2).await.unwrap();

        let session = system.open_session().await.unwrap();
        session.cart.add(tee(), 2).await.unwrap();
        wait_for(session.availability.watch(), |report| {
            !report.loading && !report.blocked() && !report.snapshots.is_empty()
        })
        .await;
        session.checkout.begin().await.unwrap();
        session.checkout.update_checkout_data(checkout_patch(PaymentMethod::Card)).await.unwrap();
        session.checkout.advance().await.unwrap();
        let mut events = session.checkout.subscribe();

        assert_eq!(session.checkout.submit().await, Ok(SubmitOutcome::Started));
        let failed = next_event(&mut events, |e| matches!(e, CheckoutEvent::SubmissionFailed { .. })).await;
        assert!(matches!(
            failed,
            CheckoutEvent::SubmissionFailed { error: CheckoutError::PaymentFailure(_) }
        ));
        let view = wait_for_view(&session, |view| view.step == CheckoutStep::Payment && !view.submitting).await;
        assert_eq!(view.data.order_id(), Some(&OrderId::new("order_1")));

        // The order reserved both tees, so a fresh lookup reads as short.
        session.availability.refresh_now().await.unwrap();
        let report = wait_for(session.availability.watch(), |report| !report.loading && report.blocked()).await;
        assert!(report.unavailable.contains(&ProductId::new("tee")));
        assert_eq!(session.checkout.is_checkout_enabled().await, Ok(true));

        assert_eq!(session.checkout.submit().await, Ok(SubmitOutcome::Started));
        let retried = next_event(&mut events, |e| matches!(e, CheckoutEvent::SubmissionFailed { .. })).await;
        assert!(matches!(
            retried,
            CheckoutEvent::SubmissionFailed { error: CheckoutError::PaymentFailure(_) }
        ));
        assert!(backend.orders.order(OrderId::new("order_2")).await.unwrap().is_none());

        session.close().await.unwrap();
        drop(backend);
        system.shutdown().await.unwrap();
    }
}
