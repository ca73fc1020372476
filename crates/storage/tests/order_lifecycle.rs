use chrono::NaiveDate;
use shared::domain::{OrderFlag, OrderInsert};
use storage::Storage;

#[tokio::test]
async fn order_lifecycle_create_toggle_and_delete() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");

    let order = storage
        .insert_order(&OrderInsert {
            client_name: "Ana García".to_string(),
            contact_number: String::new(),
            description: "parche escudo".to_string(),
            quantity: 4,
            unit_price: 12.5,
            total_price: 50.0,
            delivery_date: NaiveDate::from_ymd_opt(2024, 7, 15).expect("date"),
            completed: false,
            paid: false,
        })
        .await
        .expect("insert");

    for expected in [true, false, true] {
        let updated = storage
            .set_flag(order.id, OrderFlag::Completed, expected)
            .await
            .expect("toggle")
            .expect("order exists");
        assert_eq!(updated.completed, expected);
    }

    let listed = storage.list_orders().await.expect("list");
    assert_eq!(listed.len(), 1);
    assert!(listed[0].completed);
    assert_eq!(listed[0].contact_number, "");

    assert!(storage.delete_order(order.id).await.expect("delete"));
    assert!(storage.get_order(order.id).await.expect("get").is_none());
}
