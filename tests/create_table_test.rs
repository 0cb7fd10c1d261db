mod common;

use common::MockTransport;
use dynamo_mapper::{
    record, CancellationToken, Db, Error, Index, ProjectionType, RetryPolicy, ScalarAttributeType,
    TableStatus, TransportError,
};
use pretty_assertions::assert_eq;
use std::time::Duration;
use tokio::time::Instant;

record! {
    #[derive(Debug, Default)]
    pub struct Widget {
        #[tag = r#"dynamo:"UserID,hash""#]
        pub user_id: i64,
        #[tag = r#"dynamo:"Time,range" index:"Msg-Time-index,range""#]
        pub time: chrono::DateTime<chrono::Utc>,
        #[tag = r#"dynamo:"Msg" index:"Msg-Time-index,hash""#]
        pub msg: String,
        #[tag = r#"dynamo:"Count""#]
        pub count: i64,
    }
}

fn throttled() -> TransportError {
    TransportError::new(Some(400), Some("ThrottlingException"), "rate exceeded")
}

#[tokio::test(start_paused = true)]
async fn retries_throttled_create_table() {
    common::init_tracing();

    let db = Db::with_transport(MockTransport::failing_with(vec![throttled(), throttled()]));
    let start = Instant::now();

    db.create_table("Widgets", &Widget::default())
        .provision(4, 2)
        .provision_index("Msg-Time-index", 1, 1)
        .run()
        .await
        .unwrap();

    assert_eq!(db.transport().attempts(), 3);
    assert_eq!(start.elapsed(), Duration::from_millis(500 + 750));

    let requests = db.transport().requests.lock().unwrap();
    let input = &requests[2];
    assert_eq!(input.table_name(), Some("Widgets"));
    let attribs: Vec<_> = input
        .attribute_definitions()
        .iter()
        .map(|a| (a.attribute_name(), a.attribute_type().clone()))
        .collect();
    assert_eq!(
        attribs,
        vec![
            ("UserID", ScalarAttributeType::N),
            ("Time", ScalarAttributeType::S),
            ("Msg", ScalarAttributeType::S),
        ]
    );
    let throughput = input.provisioned_throughput().unwrap();
    assert_eq!(throughput.read_capacity_units(), 4);
    assert_eq!(throughput.write_capacity_units(), 2);
    assert_eq!(input.global_secondary_indexes().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn terminal_errors_come_back_untouched() {
    let validation = TransportError::new(Some(400), Some("ValidationException"), "bad key");
    let db = Db::with_transport(MockTransport::failing_with(vec![validation]));

    let err = db
        .create_table("Widgets", &Widget::default())
        .run()
        .await
        .unwrap_err();

    assert_eq!(db.transport().attempts(), 1);
    match err {
        Error::Transport(e) => {
            assert_eq!(e.status(), Some(400));
            assert_eq!(e.code(), Some("ValidationException"));
            assert_eq!(e.message(), "bad key");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn gives_up_before_the_deadline() {
    let failures = (0..10)
        .map(|_| TransportError::new(Some(500), None, "internal"))
        .collect();
    let db = Db::with_transport(MockTransport::failing_with(failures))
        .with_retry_policy(RetryPolicy::default().with_timeout(Duration::from_secs(1)));

    let err = db
        .create_table("Widgets", &Widget::default())
        .run()
        .await
        .unwrap_err();

    // the second backoff step would end past the deadline
    assert_eq!(db.transport().attempts(), 2);
    assert!(matches!(err, Error::Transport(ref e) if e.status() == Some(500)));
}

#[tokio::test(start_paused = true)]
async fn wait_polls_until_active() {
    let db = Db::with_transport(MockTransport::with_statuses(vec![
        None,
        Some(TableStatus::Creating),
        Some(TableStatus::Creating),
    ]));
    let start = Instant::now();

    db.create_table("Widgets", &Widget::default())
        .on_demand(true)
        .wait()
        .await
        .unwrap();

    assert_eq!(db.transport().attempts(), 1);
    assert_eq!(start.elapsed(), Duration::from_millis(1500));
}

#[tokio::test(start_paused = true)]
async fn canceled_before_start() {
    let db = Db::with_transport(MockTransport::failing_with(vec![throttled()]));
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = db
        .create_table("Widgets", &Widget::default())
        .run_with_cancel(&cancel)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Canceled));
    assert_eq!(db.transport().attempts(), 0);
}

#[tokio::test(start_paused = true)]
async fn cancel_during_backoff() {
    let failures = (0..5).map(|_| throttled()).collect();
    let db = Db::with_transport(MockTransport::failing_with(failures));
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(600)).await;
        trigger.cancel();
    });

    let err = db
        .create_table("Widgets", &Widget::default())
        .run_with_cancel(&cancel)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Canceled));
    // attempts at 0ms and 500ms, canceled during the 750ms sleep
    assert_eq!(db.transport().attempts(), 2);
}

#[tokio::test]
async fn schema_errors_skip_the_network() {
    let db = Db::with_transport(MockTransport::default());

    let err = db
        .create_table("Widgets", &Widget::default())
        .index(
            Index::global("Count-index", "Count", ScalarAttributeType::N)
                .project(ProjectionType::KeysOnly, &[]),
        )
        .project("Missing-index", ProjectionType::All, &[])
        .run()
        .await
        .unwrap_err();

    assert!(matches!(err, Error::NoSuchIndex(ref name) if name == "Missing-index"));
    assert_eq!(db.transport().attempts(), 0);
}

#[tokio::test(start_paused = true)]
async fn wait_shares_one_deadline_with_creation() {
    let db = Db::with_transport(MockTransport {
        failures: std::sync::Mutex::new((0..3).map(|_| throttled()).collect()),
        statuses: std::sync::Mutex::new(vec![Some(TableStatus::Creating); 100].into()),
        ..MockTransport::default()
    })
    .with_retry_policy(RetryPolicy::default().with_timeout(Duration::from_secs(3)));
    let start = Instant::now();

    let err = db
        .create_table("Widgets", &Widget::default())
        .wait()
        .await
        .unwrap_err();

    assert!(matches!(err, Error::DeadlineExceeded));
    assert_eq!(db.transport().attempts(), 4);
    // created at 2375ms, polled at 2375ms and 2875ms, the next poll would pass 3s
    assert_eq!(start.elapsed(), Duration::from_millis(2875));
}
