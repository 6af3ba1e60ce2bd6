use chrono::{TimeZone, Utc};
use popwatch::database::models::{PriceHistoryDbModel, StockHistoryDbModel};
use popwatch::database::{self, ProductRepository, SqlxProductRepository};
use popwatch::domain::{ProductSnapshot, ProductState};
use tempfile::TempDir;

async fn repository(dir: &TempDir) -> SqlxProductRepository {
    let db_path = dir.path().join("popwatch.db");
    let db_url = format!(
        "sqlite:{}?mode=rwc",
        db_path.to_string_lossy().replace('\\', "/")
    );

    let pool = database::init_pool(&db_url).await.unwrap();
    let write_pool = database::init_write_pool(&db_url).await.unwrap();
    database::run_migrations(&pool).await.unwrap();
    SqlxProductRepository::new(pool, write_pool)
}

fn at(ms: i64) -> chrono::DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).unwrap()
}

#[tokio::test]
async fn state_round_trips_through_sqlite() {
    let dir = TempDir::new().unwrap();
    let repo = repository(&dir).await;

    let mut snapshot = ProductSnapshot::new("1001", "SKULLPANDA 溫度系列", 350.0).with_stock(true, 12);
    snapshot.brand_name = Some("SKULLPANDA".to_string());
    snapshot.product_url = Some("https://www.popmart.com/hk/products/1001".to_string());
    let state = ProductState::first_seen(snapshot, at(1_750_000_000_000));

    repo.put_state(&state).await.unwrap();
    let loaded = repo.get_state("1001").await.unwrap().unwrap();
    assert_eq!(loaded, state);
    assert!(repo.get_state("missing").await.unwrap().is_none());
}

#[tokio::test]
async fn observation_writes_state_and_history_together() {
    let dir = TempDir::new().unwrap();
    let repo = repository(&dir).await;

    let before = ProductSnapshot::new("2002", "LABUBU 太空旅行系列", 129.0).with_stock(false, 0);
    let first = ProductState::first_seen(before.clone(), at(1_750_000_000_000));
    repo.record_observation(&first, None, None).await.unwrap();

    let after = ProductSnapshot::new("2002", "LABUBU 太空旅行系列", 99.0).with_stock(true, 4);
    let now = at(1_750_000_600_000);
    let second = first.advance(after.clone(), now);
    let price = PriceHistoryDbModel::between(&before, &after, now);
    let stock = StockHistoryDbModel::between(&before, &after, now);
    repo.record_observation(&second, Some(&price), Some(&stock))
        .await
        .unwrap();

    let loaded = repo.get_state("2002").await.unwrap().unwrap();
    assert_eq!(loaded.snapshot.price, 99.0);
    assert_eq!(loaded.first_seen_at, at(1_750_000_000_000));
    assert_eq!(loaded.last_checked_at, now);

    let prices = repo.price_history("2002", 10).await.unwrap();
    assert_eq!(prices.len(), 1);
    assert_eq!((prices[0].old_price, prices[0].new_price), (129.0, 99.0));
    assert!(prices[0].id > 0);

    let stocks = repo.stock_history("2002", 10).await.unwrap();
    assert_eq!(stocks.len(), 1);
    assert!(!stocks[0].old_in_stock);
    assert_eq!(stocks[0].new_quantity, 4);
}

#[tokio::test]
async fn products_are_paged_by_last_check() {
    let dir = TempDir::new().unwrap();
    let repo = repository(&dir).await;

    for (i, id) in ["a", "b", "c"].iter().enumerate() {
        let snapshot = ProductSnapshot::new(*id, format!("item {id}"), 10.0);
        let state = ProductState::first_seen(snapshot, at(1_750_000_000_000 + i as i64 * 1000));
        repo.put_state(&state).await.unwrap();
    }

    assert_eq!(repo.count_products().await.unwrap(), 3);
    let first_page = repo.list_products(0, 2).await.unwrap();
    let ids: Vec<_> = first_page.iter().map(|s| s.id().to_string()).collect();
    assert_eq!(ids, vec!["c", "b"]);
    let second_page = repo.list_products(2, 2).await.unwrap();
    assert_eq!(second_page.len(), 1);
    assert_eq!(second_page[0].id(), "a");
}
