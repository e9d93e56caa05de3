use std::sync::Arc;

use campus_store::domain::aggregates::{Approval, OrderStatus, Product, Role};
use campus_store::domain::value_objects::{Money, Quantity};
use campus_store::repository::{CatalogRepository, MemoryStore, OrderRepository};
use campus_store::services::{EventPublisher, Identity, OrderSource, PlaceOrder, Services, SubmitRefund};
use campus_store::{ProductId, StoreError};
use rust_decimal::Decimal;
use uuid::Uuid;

fn setup() -> (Arc<MemoryStore>, Services, EventPublisher) {
    let store = Arc::new(MemoryStore::new());
    let publisher = EventPublisher::recording();
    let services = Services::new(store.clone(), publisher.clone());
    (store, services, publisher)
}

async fn product(store: &MemoryStore, label: &str, cents: i64, stock: i64) -> Product {
    let p = Product::create(label, Money::new(Decimal::new(cents, 2)).unwrap(), stock).unwrap();
    store.insert_product(&p).await.unwrap();
    p
}

async fn stock(store: &MemoryStore, id: ProductId) -> i64 {
    store.get_product(id).await.unwrap().unwrap().stock
}

fn buyer() -> Identity { Identity::new(Uuid::now_v7(), Role::Student) }
fn staff() -> Identity { Identity::new(Uuid::now_v7(), Role::Staff) }

fn from_lines(items: &[(ProductId, u32)]) -> PlaceOrder {
    PlaceOrder {
        source: OrderSource::Lines(items.iter().map(|&(p, n)| (p, Quantity::new(n).unwrap())).collect()),
        payment_method: "cash".into(),
        initial_status: OrderStatus::PendingUserConfirmation,
    }
}

#[tokio::test]
async fn test_cart_checkout_refund_round_trip() {
    let (store, svc, publisher) = setup();
    let a = product(&store, "Campus Hoodie", 3500, 5).await;
    let me = buyer();

    svc.carts.add_to_cart(&me, me.user_id, a.id, 2).await.unwrap();
    let req = PlaceOrder { source: OrderSource::Cart, payment_method: "cash".into(), initial_status: OrderStatus::PendingUserConfirmation };
    let order = svc.checkout.place_order(&me, me.user_id, req).await.unwrap();
    assert_eq!(stock(&store, a.id).await, 3);
    assert_eq!(order.status, OrderStatus::PendingUserConfirmation);
    assert_eq!(order.total_price, a.price.multiply(Quantity::new(2).unwrap()));
    assert!(svc.carts.view_cart(&me, me.user_id).await.unwrap().lines.is_empty());

    let submit = SubmitRefund { transaction_number: order.transaction_number.clone(), reason: "changed my mind".into(), date_cancelled: None };
    let refund = svc.refunds.submit_refund(&me, submit).await.unwrap();
    let approved = svc.refunds.approve_refund(&staff(), refund.id).await.unwrap();

    assert_eq!(approved.approval, Approval::Approved);
    assert_eq!(stock(&store, a.id).await, 5);
    assert_eq!(store.get_order(order.id).await.unwrap().unwrap().status, OrderStatus::Cancelled);

    let subjects: Vec<String> = publisher.recorded().await.iter().map(|e| e.subject()).collect();
    assert!(subjects.contains(&"store.order.placed".to_string()));
    assert!(subjects.contains(&"store.order.cancelled".to_string()));
    assert!(subjects.contains(&"store.refund.approved".to_string()));
}

#[tokio::test]
async fn test_second_line_failure_rolls_back_first() {
    let (store, svc, _) = setup();
    let a = product(&store, "Notebook", 450, 4).await;
    let b = product(&store, "Calculator", 2500, 1).await;
    let me = buyer();

    let err = svc.checkout.place_order(&me, me.user_id, from_lines(&[(a.id, 3), (b.id, 2)])).await.unwrap_err();
    assert!(matches!(err, StoreError::InsufficientStock { product_id, .. } if product_id == b.id));
    assert_eq!(stock(&store, a.id).await, 4);
    assert_eq!(stock(&store, b.id).await, 1);
    assert!(svc.checkout.list_orders(&me).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_refund_restores_exactly_once() {
    let (store, svc, _) = setup();
    let a = product(&store, "Mug", 800, 10).await;
    let me = buyer();
    let admin = Identity::new(Uuid::now_v7(), Role::Admin);
    let order = svc.checkout.place_order(&me, me.user_id, from_lines(&[(a.id, 4)])).await.unwrap();
    let submit = SubmitRefund { transaction_number: order.transaction_number.clone(), reason: "damaged".into(), date_cancelled: None };
    let refund = svc.refunds.submit_refund(&me, submit).await.unwrap();

    svc.refunds.approve_refund(&admin, refund.id).await.unwrap();
    assert!(matches!(svc.refunds.approve_refund(&admin, refund.id).await, Err(StoreError::AlreadyDecided(_))));
    assert!(matches!(svc.refunds.decline_refund(&admin, refund.id).await, Err(StoreError::AlreadyDecided(_))));
    assert_eq!(stock(&store, a.id).await, 10);
}

#[tokio::test]
async fn test_decline_then_approve_fails() {
    let (store, svc, _) = setup();
    let a = product(&store, "Pen", 150, 3).await;
    let me = buyer();
    let order = svc.checkout.place_order(&me, me.user_id, from_lines(&[(a.id, 1)])).await.unwrap();
    let submit = SubmitRefund { transaction_number: order.transaction_number.clone(), reason: "duplicate".into(), date_cancelled: None };
    let refund = svc.refunds.submit_refund(&me, submit).await.unwrap();

    assert_eq!(svc.refunds.decline_refund(&staff(), refund.id).await.unwrap().approval, Approval::Declined);
    assert!(matches!(svc.refunds.approve_refund(&staff(), refund.id).await, Err(StoreError::AlreadyDecided(_))));
    assert_eq!(stock(&store, a.id).await, 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_checkouts_for_last_unit() {
    let (store, svc, _) = setup();
    let b = product(&store, "Graduation Gown", 6000, 1).await.id;

    let mut handles = Vec::new();
    for _ in 0..2 {
        let svc = svc.clone();
        let me = buyer();
        handles.push(tokio::spawn(async move { svc.checkout.place_order(&me, me.user_id, from_lines(&[(b, 1)])).await }));
    }
    let mut placed = 0;
    let mut rejected = 0;
    for h in handles {
        match h.await.unwrap() {
            Ok(_) => placed += 1,
            Err(StoreError::InsufficientStock { .. }) => rejected += 1,
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
    assert_eq!((placed, rejected), (1, 1));
    assert_eq!(stock(&store, b).await, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_many_concurrent_checkouts_never_overdraw() {
    let (store, svc, _) = setup();
    let a = product(&store, "Sticker", 100, 7).await.id;
    let c = product(&store, "Badge", 100, 20).await.id;

    let handles: Vec<_> = (0..12)
        .map(|_| {
            let svc = svc.clone();
            tokio::spawn(async move {
                let me = buyer();
                svc.checkout.place_order(&me, me.user_id, from_lines(&[(c, 1), (a, 1)])).await
            })
        })
        .collect();
    let mut placed = 0;
    for h in handles {
        if h.await.unwrap().is_ok() { placed += 1; }
    }
    assert_eq!(placed, 7);
    assert_eq!(stock(&store, a).await, 0);
    assert_eq!(stock(&store, c).await, 13);
}

#[tokio::test]
async fn test_cart_merge_and_idempotent_remove() {
    let (store, svc, _) = setup();
    let a = product(&store, "Tote Bag", 1200, 10).await;
    let me = buyer();

    svc.carts.add_to_cart(&me, me.user_id, a.id, 2).await.unwrap();
    let cart = svc.carts.add_to_cart(&me, me.user_id, a.id, 3).await.unwrap();
    assert_eq!(cart.lines().len(), 1);
    assert_eq!(cart.lines()[0].quantity.value(), 5);

    let line = cart.lines()[0].id;
    svc.carts.remove_cart_line(&me, me.user_id, line).await.unwrap();
    let again = svc.carts.remove_cart_line(&me, me.user_id, line).await.unwrap();
    assert!(again.is_empty());
}

#[tokio::test]
async fn test_deleting_a_product_purges_carts_but_keeps_orders() {
    let (store, svc, _) = setup();
    let a = product(&store, "Poster", 500, 10).await;
    let me = buyer();
    svc.carts.add_to_cart(&me, me.user_id, a.id, 1).await.unwrap();
    let order = svc.checkout.place_order(&me, me.user_id, from_lines(&[(a.id, 2)])).await.unwrap();

    svc.catalog.delete_products(&staff(), &[a.id], "licensing ended").await.unwrap();
    assert!(store.get_product(a.id).await.unwrap().is_none());
    assert!(svc.carts.view_cart(&me, me.user_id).await.unwrap().lines.is_empty());
    let kept = svc.checkout.get_order(&me, order.id).await.unwrap();
    assert_eq!(kept.lines.len(), 1);
    assert_eq!(kept.lines[0].label, "Poster");
}
