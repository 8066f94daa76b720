mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use common::{day, kdata, kdata_row, seed_kdata, setup, STOCK_A, STOCK_B};
use quant_data::domain::schema::ENTITY_ID;
use quant_data::{
    DataError, DataFrame, DataListener, DataQuery, DataReader, DataSource, Filter, QueryEngine, ReaderConfig,
    Result,
};

#[derive(Default)]
struct RecordingListener {
    loaded: Mutex<Vec<usize>>,
    changed: Mutex<Vec<usize>>,
    added: Mutex<Vec<(String, usize)>>,
}

impl DataListener for RecordingListener {
    fn on_data_loaded(&self, data: &DataFrame) {
        self.loaded.lock().unwrap().push(data.len());
    }

    fn on_data_changed(&self, data: &DataFrame) {
        self.changed.lock().unwrap().push(data.len());
    }

    fn on_category_data_added(&self, category: &str, added: &DataFrame) {
        self.added.lock().unwrap().push((category.to_string(), added.len()));
    }
}

/// 指定分类的查询永远不返回
struct HangingSource {
    inner: Arc<QueryEngine>,
    hang_category: String,
}

#[async_trait]
impl DataSource for HangingSource {
    async fn fetch(&self, query: &DataQuery) -> Result<DataFrame> {
        if query
            .filters
            .contains(&Filter::eq(ENTITY_ID, self.hang_category.as_str()))
        {
            std::future::pending::<()>().await;
        }
        self.inner.fetch(query).await
    }
}

/// 首次加载之后的查询都报未注册
struct UnregisteredAfterLoad {
    inner: Arc<QueryEngine>,
    calls: AtomicUsize,
}

#[async_trait]
impl DataSource for UnregisteredAfterLoad {
    async fn fetch(&self, query: &DataQuery) -> Result<DataFrame> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            return self.inner.fetch(query).await;
        }
        Err(DataError::SchemaNotRegistered(query.record_type.name().to_string()))
    }
}

fn config(entity_ids: &[&str]) -> ReaderConfig {
    ReaderConfig {
        entity_ids: Some(entity_ids.iter().map(|s| s.to_string()).collect()),
        retry_interval: Duration::from_millis(50),
        ..ReaderConfig::default()
    }
}

fn ids(frame: &DataFrame) -> Vec<String> {
    frame.rows().iter().filter_map(|r| r.id().map(str::to_string)).collect()
}

#[tokio::test]
async fn test_move_on_without_new_data_is_idempotent() {
    let env = setup().await;
    seed_kdata(&env.engine, &[STOCK_A], 1..=5).await;

    let mut reader = DataReader::new(kdata(), env.engine.clone(), config(&[STOCK_A]));
    reader.load_data().await.unwrap();
    let before = ids(reader.data());

    let timeout = Duration::from_millis(200);
    assert!(!reader.move_on(None, timeout).await.unwrap());
    assert!(!reader.move_on(None, timeout).await.unwrap());
    assert_eq!(ids(reader.data()), before);
    assert_eq!(reader.data().len(), 5);
}

#[tokio::test]
async fn test_move_on_merges_new_rows() {
    let env = setup().await;
    seed_kdata(&env.engine, &[STOCK_A], 1..=5).await;

    let mut reader = DataReader::new(kdata(), env.engine.clone(), config(&[STOCK_A]));
    reader.load_data().await.unwrap();
    let listener = Arc::new(RecordingListener::default());
    reader.register_data_listener(listener.clone());

    env.engine
        .init_entities(
            "netease",
            &kdata(),
            vec![kdata_row(STOCK_A, 7, 17.0), kdata_row(STOCK_A, 6, 16.0)],
        )
        .await
        .unwrap();

    let changed = reader.move_on(Some(day(7)), Duration::from_secs(1)).await.unwrap();
    assert!(changed);
    assert_eq!(*listener.added.lock().unwrap(), vec![(STOCK_A.to_string(), 2)]);
    assert_eq!(*listener.changed.lock().unwrap(), vec![7]);

    let timestamps: Vec<_> = reader.data().rows().iter().filter_map(|r| r.timestamp()).collect();
    assert_eq!(timestamps, (1..=7).map(day).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_move_on_on_empty_reader_loads() {
    let env = setup().await;
    seed_kdata(&env.engine, &[STOCK_A, STOCK_B], 1..=3).await;

    let mut reader = DataReader::new(kdata(), env.engine.clone(), config(&[STOCK_A, STOCK_B]));
    let listener = Arc::new(RecordingListener::default());
    reader.register_data_listener(listener.clone());
    assert!(listener.loaded.lock().unwrap().is_empty());

    let changed = reader.move_on(None, Duration::from_millis(200)).await.unwrap();
    assert!(!changed);
    assert_eq!(reader.data().len(), 6);
    assert_eq!(reader.categories(), vec![STOCK_A, STOCK_B]);
    assert_eq!(*listener.loaded.lock().unwrap(), vec![6]);
    assert!(listener.changed.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_move_on_timeout_keeps_partial_progress() {
    let env = setup().await;
    let hanging = "stock_sh_600000";
    seed_kdata(&env.engine, &[hanging, STOCK_A], 1..=3).await;

    let source = Arc::new(HangingSource {
        inner: env.engine.clone(),
        hang_category: hanging.to_string(),
    });
    let config = ReaderConfig {
        retry_interval: Duration::from_millis(500),
        ..config(&[hanging, STOCK_A])
    };
    let mut reader = DataReader::new(kdata(), source, config);
    reader.load_data().await.unwrap();
    assert_eq!(reader.categories(), vec![hanging, STOCK_A]);

    seed_kdata(&env.engine, &[hanging, STOCK_A], 4..=4).await;
    let listener = Arc::new(RecordingListener::default());
    reader.register_data_listener(listener.clone());

    let changed = reader.move_on(None, Duration::from_secs(1)).await.unwrap();
    assert!(changed);
    assert_eq!(*listener.added.lock().unwrap(), vec![(STOCK_A.to_string(), 1)]);
    assert_eq!(reader.data().category_rows(STOCK_A).len(), 4);
    assert_eq!(reader.data().category_rows(hanging).len(), 3);
}

#[tokio::test]
async fn test_listener_replay_and_deregister() {
    let env = setup().await;
    seed_kdata(&env.engine, &[STOCK_A], 1..=2).await;

    let mut reader = DataReader::new(kdata(), env.engine.clone(), config(&[STOCK_A]));
    reader.load_data().await.unwrap();

    let listener = Arc::new(RecordingListener::default());
    let as_dyn: Arc<dyn DataListener> = listener.clone();
    reader.register_data_listener(as_dyn.clone());
    reader.register_data_listener(as_dyn.clone());
    assert_eq!(reader.listener_count(), 1);
    assert_eq!(*listener.loaded.lock().unwrap(), vec![2]);

    reader.deregister_data_listener(&as_dyn);
    assert_eq!(reader.listener_count(), 0);
    reader.load_data().await.unwrap();
    assert_eq!(*listener.loaded.lock().unwrap(), vec![2]);
}

#[tokio::test]
async fn test_run_stops_on_handle() {
    let env = setup().await;
    seed_kdata(&env.engine, &[STOCK_A], 1..=2).await;

    let mut reader = DataReader::new(
        kdata(),
        env.engine.clone(),
        ReaderConfig {
            real_time: true,
            refresh_interval: Duration::from_millis(20),
            move_on_timeout: Duration::from_millis(20),
            ..config(&[STOCK_A])
        },
    );
    let handle = reader.stop_handle();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        handle.stop();
    });

    let result = tokio::time::timeout(Duration::from_secs(5), reader.run()).await;
    assert!(matches!(result, Ok(Ok(()))));
    assert_eq!(reader.data().len(), 2);
}

#[tokio::test]
async fn test_the_timestamp_loads_single_point() {
    let env = setup().await;
    seed_kdata(&env.engine, &[STOCK_A, STOCK_B], 1..=5).await;

    let mut reader = DataReader::new(
        kdata(),
        env.engine.clone(),
        ReaderConfig {
            the_timestamp: Some(day(3)),
            ..config(&[STOCK_A, STOCK_B])
        },
    );
    reader.load_data().await.unwrap();
    assert_eq!(reader.data().len(), 2);
    assert_eq!(reader.data().table_type().unwrap().entities, quant_data::query::Cardinality::Multiple);
}

#[tokio::test]
async fn test_move_on_returns_configuration_error() {
    let env = setup().await;
    seed_kdata(&env.engine, &[STOCK_A], 1..=3).await;

    let source = Arc::new(UnregisteredAfterLoad {
        inner: env.engine.clone(),
        calls: AtomicUsize::new(0),
    });
    let mut reader = DataReader::new(kdata(), source.clone(), config(&[STOCK_A]));
    reader.load_data().await.unwrap();

    let started = std::time::Instant::now();
    let err = reader.move_on(Some(day(5)), Duration::from_secs(1)).await.unwrap_err();
    assert!(matches!(err, DataError::SchemaNotRegistered(_)));
    assert!(started.elapsed() < Duration::from_millis(500));
    assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    assert_eq!(reader.data().len(), 3);
}
