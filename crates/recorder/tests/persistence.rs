#![forbid(unsafe_code)]

use config::Config;
use metrics::{AggregatorSettings, Calibration, MetricKind, SensorSample};
use pretty_assertions::assert_eq;
use recorder::domain::{ActivityInfo, Profile, SessionId};
use recorder::persistence::{
    ChunkStore, MemoryChunkStore, SqliteChunkStore, aggregate_all_chunks,
};
use recorder::{Error, ManualClock, RecorderEngine, Services, SessionGate};
use std::sync::Arc;
use tempfile::tempdir;

fn profile() -> Profile {
    Profile::new(
        "athlete-7",
        Calibration {
            ftp_w: Some(260.0),
            threshold_hr_bpm: Some(172.0),
            max_hr_bpm: Some(190.0),
        },
    )
}

/// Ninety minutes of a rolling ride with power, heart rate, altitude and
/// distance, sampled once per second.
async fn record_ride(engine: &mut RecorderEngine, clock: &ManualClock) -> SessionId {
    let session = engine
        .start(profile(), ActivityInfo::new("ride").with_location("outdoor"))
        .await
        .unwrap();
    for s in 0..5_400u64 {
        let t = s * 1_000;
        clock.set_ms(t);
        let wave = (s as f64 / 90.0).sin();
        engine.ingest(SensorSample::new(MetricKind::Power, 210.0 + 60.0 * wave, t, "pm"));
        engine.ingest(SensorSample::new(
            MetricKind::HeartRate,
            140.0 + s as f64 / 200.0,
            t,
            "strap",
        ));
        if s % 10 == 0 {
            engine.ingest(SensorSample::new(MetricKind::Altitude, 100.0 + 20.0 * wave, t, "gps"));
        }
        engine.ingest(SensorSample::new(MetricKind::Distance, s as f64 * 8.5, t, "gps"));
        if s % 60 == 0 {
            engine.tick();
        }
        if s == 2_000 {
            engine.pause().unwrap();
        }
        if s == 2_100 {
            engine.resume().unwrap();
        }
    }
    engine.finish().await.unwrap();
    session
}

#[tokio::test]
async fn sqlite_chunks_rebuild_live_aggregates() {
    let dir = tempdir().unwrap();
    let store = Arc::new(
        SqliteChunkStore::new(dir.path().join("chunks.db"))
            .await
            .unwrap(),
    );
    let clock = Arc::new(ManualClock::default());
    let config = Config::default();
    let services = Services {
        clock: clock.clone(),
        store: store.clone(),
        gate: SessionGate::new(),
    };
    let mut engine = RecorderEngine::new(config.clone(), services).unwrap();
    let session = record_ride(&mut engine, &clock).await;

    let rebuilt = aggregate_all_chunks(
        store.as_ref(),
        session,
        None,
        AggregatorSettings::from_config(&config),
        profile().calibration,
    )
    .await
    .unwrap();
    assert_eq!(Some(&rebuilt), engine.aggregator());

    let payload = engine.submission().await.unwrap();
    assert_eq!(payload.moving_time_s, 5_299.0);
    assert!(payload.derived.normalized_power.is_some());
    assert!(payload.derived.decoupling_pct.is_some());
    assert!(payload.derived.ascent_m.unwrap() > 0.0);
    assert_eq!(payload.derived.hr_zone_ms.as_ref().map(Vec::len), Some(5));
    assert_eq!(payload, engine.submission().await.unwrap());

    let json = serde_json::to_string(&payload).unwrap();
    let parsed: recorder::SubmissionPayload = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed.session_id, session);

    engine.cleanup().await.unwrap();
    assert!(store.sequences(session).await.unwrap().is_empty());
}

#[tokio::test]
async fn missing_chunk_fails_submission() {
    let store = Arc::new(MemoryChunkStore::new());
    let clock = Arc::new(ManualClock::default());
    let services = Services {
        clock: clock.clone(),
        store: store.clone(),
        gate: SessionGate::new(),
    };
    let mut engine = RecorderEngine::new(Config::default(), services).unwrap();
    let session = record_ride(&mut engine, &clock).await;

    assert!(store.remove(session, 3));
    let err = engine.submission().await.unwrap_err();
    assert!(matches!(
        err,
        Error::IncompleteAggregation { sequence: 3, .. }
    ));
    assert!(matches!(engine.cleanup().await, Err(Error::CleanupNotAllowed)));
    assert!(!store.is_empty());
}

#[tokio::test]
async fn corrupt_chunk_is_reported_by_sequence() {
    let store = Arc::new(MemoryChunkStore::new());
    let clock = Arc::new(ManualClock::default());
    let services = Services {
        clock: clock.clone(),
        store: store.clone(),
        gate: SessionGate::new(),
    };
    let mut engine = RecorderEngine::new(Config::default(), services).unwrap();
    let session = record_ride(&mut engine, &clock).await;

    store.corrupt(session, 0, b"{\"sequence\":0".to_vec());
    let err = aggregate_all_chunks(
        store.as_ref(),
        session,
        None,
        AggregatorSettings::default(),
        Calibration::default(),
    )
    .await
    .unwrap_err();
    assert!(matches!(
        err,
        Error::IncompleteAggregation { sequence: 0, .. }
    ));
}
