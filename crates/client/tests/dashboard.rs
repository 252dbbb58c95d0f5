mod common;

use std::sync::Arc;

use chrono::Utc;
use common::Backend;
use gymmaster::cache::ClassBoard;
use gymmaster::services::AvailableClassesQuery;
use gymmaster::{AppError, ErrorKind, MemoryStorage};

#[tokio::test]
async fn test_dashboard_halves_fail_independently() {
    let backend = Backend::new();
    backend.with(|s| s.classes_fail = true);
    let base = backend.spawn().await;
    let client = common::client(&base, Arc::new(MemoryStorage::new()));
    client.auth().login("ana@example.com", "secret").await.unwrap();

    let dash = client.member_dashboard().await;
    let stats = dash.stats.as_ref().unwrap();
    assert_eq!(stats.total_checkins_this_month, 7);
    match &dash.classes {
        Err(AppError::Api(api)) => {
            assert_eq!(api.kind, ErrorKind::ServerError);
            assert_eq!(api.status, Some(500));
            assert_eq!(api.message, "boom");
        }
        other => panic!("unexpected classes result: {:?}", other),
    }
    assert_eq!(dash.upcoming(Utc::now()), 0);

    backend.with(|s| s.classes_fail = false);
    let dash = client.member_dashboard().await;
    assert_eq!(dash.upcoming(Utc::now()), 1);
}

#[tokio::test]
async fn test_reserve_and_cancel_with_board() {
    let backend = Backend::new();
    let base = backend.spawn().await;
    let client = common::client(&base, Arc::new(MemoryStorage::new()));
    client.auth().login("ana@example.com", "secret").await.unwrap();
    let classes = client.classes();

    let mut board = ClassBoard::new();
    board.reconcile(classes.available(&AvailableClassesQuery::default()).await.unwrap());
    assert_eq!(board.get("c1").unwrap().attendees(), 3);

    classes.reserve("c1").await.unwrap();
    board.apply_reserved("c1");
    assert_eq!(board.get("c1").unwrap().attendees(), 4);
    assert!(board.get("c1").unwrap().is_provisional());

    // Someone else reserved too; the refetch wins
    backend.with(|s| s.attendees += 1);
    board.reconcile(classes.available(&AvailableClassesQuery::default()).await.unwrap());
    assert_eq!(board.get("c1").unwrap().attendees(), 5);
    assert!(!board.get("c1").unwrap().is_provisional());

    classes.cancel("c1").await.unwrap();
    board.apply_cancelled("c1");
    assert_eq!(board.get("c1").unwrap().attendees(), 4);

    let err = classes.reserve("  ").await.unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
}
