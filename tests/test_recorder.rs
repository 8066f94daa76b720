mod common;

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use common::{kdata, kdata_row, setup, STOCK_A};
use quant_data::{
    record_data, DataError, DataQuery, IntervalLevel, RecordContext, RecordOptions, Recorder, Result,
};

struct FakeKdataRecorder {
    seen_level: Mutex<Option<IntervalLevel>>,
}

#[async_trait]
impl Recorder for FakeKdataRecorder {
    fn name(&self) -> &str {
        "fake_kdata"
    }

    fn provider(&self) -> &str {
        "netease"
    }

    async fn run(&self, ctx: &RecordContext) -> Result<usize> {
        *self.seen_level.lock().unwrap() = ctx.options().level;
        let size = ctx.options().batch_size as i64;
        let rows = (1..=size).map(|n| kdata_row(STOCK_A, n, 10.0 + n as f64)).collect();
        ctx.save(rows).await
    }
}

#[tokio::test]
async fn test_record_data_runs_default_recorder() {
    let env = setup().await;
    let recorder = Arc::new(FakeKdataRecorder {
        seen_level: Mutex::new(None),
    });
    env.registry.register_recorder("Stock1dKdata", recorder.clone()).await;
    env.registry.register_recorder("Stock1dKdata", recorder.clone()).await;
    assert_eq!(env.registry.recorders("Stock1dKdata").await.len(), 1);

    let options = RecordOptions {
        batch_size: 3,
        ..RecordOptions::default()
    };
    let saved = record_data(&env.engine, &kdata(), 0, options).await.unwrap();
    assert_eq!(saved, 3);
    assert_eq!(*recorder.seen_level.lock().unwrap(), Some(IntervalLevel::Level1Day));

    let frame = env
        .engine
        .get_data(&DataQuery::new(kdata()).entity_id(STOCK_A))
        .await
        .unwrap();
    assert_eq!(frame.len(), 3);
}

#[tokio::test]
async fn test_record_data_without_recorder() {
    let env = setup().await;
    let err = record_data(&env.engine, &kdata(), 1, RecordOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, DataError::RecorderNotFound { index: 1, .. }));
}
