//! Saving and loading fitted models through the filesystem

use chrono::{Duration, TimeZone, Utc};
use sar_recommender::{matrix, Interaction, RecommendParams, SarConfig, SarError, SarModel, SimilarityMetric};
use tempfile::TempDir;

fn fitted() -> SarModel {
    let now = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
    let log = vec![
        Interaction::new("u1".to_string(), "i1".to_string()).at(now - Duration::days(3)),
        Interaction::new("u1".to_string(), "i2".to_string()).at(now),
        Interaction::new("u2".to_string(), "i1".to_string()).at(now - Duration::days(10)),
        Interaction::new("u3".to_string(), "i2".to_string()).at(now - Duration::days(1)),
        Interaction::new("u3".to_string(), "i3".to_string()).at(now - Duration::days(1)),
    ];
    let config = SarConfig::default()
        .with_metric(SimilarityMetric::Cosine)
        .with_time_decay(7.0);
    SarModel::fit(config, &log).unwrap()
}

#[test]
fn test_round_trip_through_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("model.bin");

    let original = fitted();
    original.save_to_path(&path).unwrap();
    let restored: SarModel = SarModel::load_from_path(&path).unwrap();

    assert_eq!(restored.stats(), original.stats());
    assert_eq!(restored.config(), original.config());
    assert_eq!(restored.reference_time(), original.reference_time());
    assert_eq!(restored.popularity(), original.popularity());
    assert_eq!(
        matrix::to_triplets(restored.affinity()),
        matrix::to_triplets(original.affinity())
    );

    let users: Vec<String> = ["u1", "u2", "u3"].iter().map(|u| u.to_string()).collect();
    let params = RecommendParams::top_k(2).keep_seen();
    assert_eq!(
        restored.recommend(&users, &params).unwrap(),
        original.recommend(&users, &params).unwrap()
    );
}

#[test]
fn test_restored_model_scores_adhoc_with_fit_reference_time() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("model.bin");
    let original = fitted();
    original.save_to_path(&path).unwrap();
    let restored: SarModel = SarModel::load_from_path(&path).unwrap();

    let visit = vec![Interaction::new("guest".to_string(), "i2".to_string())
        .at(Utc.with_ymd_and_hms(2024, 4, 24, 0, 0, 0).unwrap())];
    let params = RecommendParams::default();

    let recs = restored.recommend_adhoc(&visit, &params).unwrap();
    assert_eq!(recs, original.recommend_adhoc(&visit, &params).unwrap());
    assert!(!recs.is_empty());
}

#[test]
fn test_missing_file_is_io_error() {
    let dir = TempDir::new().unwrap();
    let err = SarModel::<String, String>::load_from_path(dir.path().join("absent.bin")).unwrap_err();
    assert!(matches!(err, SarError::Io(_)));
}

#[test]
fn test_short_file_is_rejected() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("short.bin");
    std::fs::write(&path, [0u8, 1]).unwrap();

    assert!(SarModel::<String, String>::load_from_path(&path).is_err());
}
