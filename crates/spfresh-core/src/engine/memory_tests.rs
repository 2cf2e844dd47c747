//! Tests for `memory` module

use super::memory::*;
use super::{BuildParams, Engine, MetadataBatch, SearchStats};
use crate::vector::VectorMatrix;

fn built_engine(data: &[f32], dimension: usize) -> InMemoryEngine<f32> {
    let engine = InMemoryEngine::new();
    let matrix = VectorMatrix::new(data, dimension).expect("matrix");
    let metadata = MetadataBatch::from_external_ids(0..matrix.rows() as i64);
    engine
        .build(matrix, &metadata, &BuildParams::default())
        .expect("build");
    engine
}

#[test]
fn test_new_engine_is_not_built() {
    // Arrange
    let engine = InMemoryEngine::<f32>::new();

    // Act
    let insert = engine.insert_one(&[1.0, 2.0], 0);
    let search = engine.search_memory(&[1.0, 2.0], 1);

    // Assert
    assert!(engine.is_empty());
    assert_eq!(insert.expect_err("not built").code, status::NOT_BUILT);
    assert_eq!(search.expect_err("not built").code, status::NOT_BUILT);
}

#[test]
fn test_build_assigns_row_order_ids() {
    // Arrange & Act
    let engine = built_engine(&[0.0, 0.0, 1.0, 1.0, 2.0, 2.0], 2);

    // Assert
    assert_eq!(engine.len(), 3);
    assert_eq!(engine.vector(1), Some(vec![1.0, 1.0]));
    assert!(engine.contains(2));
    assert!(!engine.contains(3));
}

#[test]
fn test_build_rejects_metadata_count_mismatch() {
    // Arrange
    let engine = InMemoryEngine::<f32>::new();
    let matrix = VectorMatrix::new(&[0.0, 1.0], 1).expect("matrix");
    let metadata = MetadataBatch::from_external_ids([0]);

    // Act
    let result = engine.build(matrix, &metadata, &BuildParams::default());

    // Assert
    assert_eq!(result.expect_err("mismatch").code, status::INVALID_ARGUMENT);
}

#[test]
fn test_build_checks_dim_parameter() {
    // Arrange
    let engine = InMemoryEngine::<f32>::new();
    let matrix = VectorMatrix::new(&[0.0, 1.0], 2).expect("matrix");
    let mut params = BuildParams::default();
    params.set(BuildParams::BASE, "Dim", 3);

    // Act
    let result = engine.build(matrix, &MetadataBatch::from_external_ids([0]), &params);

    // Assert
    assert_eq!(result.expect_err("dim").code, status::DIMENSION_MISMATCH);
}

#[test]
fn test_insert_and_delete() {
    // Arrange
    let engine = built_engine(&[0.0, 0.0], 2);

    // Act
    engine.insert_one(&[5.0, 5.0], 7).expect("insert");
    let duplicate = engine.insert_one(&[6.0, 6.0], 7);
    let wrong_dim = engine.insert_one(&[6.0], 8);
    engine.delete_one(0).expect("delete");
    let missing = engine.delete_one(0);

    // Assert
    assert_eq!(duplicate.expect_err("duplicate").code, status::DUPLICATE_ID);
    assert_eq!(wrong_dim.expect_err("dim").code, status::DIMENSION_MISMATCH);
    assert_eq!(missing.expect_err("missing").code, status::VECTOR_NOT_FOUND);
    assert_eq!(engine.len(), 1);
    assert_eq!(engine.vector(7), Some(vec![5.0, 5.0]));
}

#[test]
fn test_search_memory_returns_at_least_internal_result_num() {
    // Arrange
    let data: Vec<f32> = (0..100).map(|i| i as f32).collect();
    let engine = built_engine(&data, 1);

    // Act
    let candidates = engine.search_memory(&[0.0], 5).expect("search");

    // Assert
    assert_eq!(candidates.len(), 32);
    assert_eq!(candidates[0].internal_id, 0);
    assert!(candidates
        .windows(2)
        .all(|w| w[0].distance <= w[1].distance));
}

#[test]
fn test_search_internal_result_num_from_build_params() {
    // Arrange
    let engine = InMemoryEngine::<f32>::new();
    let data: Vec<f32> = (0..50).map(|i| i as f32).collect();
    let matrix = VectorMatrix::new(&data, 1).expect("matrix");
    let mut params = BuildParams::default();
    params.set(BuildParams::BUILD_SSD_INDEX, "SearchInternalResultNum", 4);
    engine
        .build(matrix, &MetadataBatch::from_external_ids(0..50), &params)
        .expect("build");

    // Act
    let small_k = engine.search_memory(&[0.0], 2).expect("search");
    let large_k = engine.search_memory(&[0.0], 10).expect("search");

    // Assert
    assert_eq!(small_k.len(), 4);
    assert_eq!(large_k.len(), 10);
}

#[test]
fn test_search_secondary_drops_deleted_and_counts_reads() {
    // Arrange
    let engine = built_engine(&[0.0, 1.0, 2.0, 3.0], 1);
    let candidates = engine.search_memory(&[0.0], 4).expect("phase 1");
    engine.delete_one(1).expect("delete");
    let mut stats = SearchStats::default();

    // Act
    let refined = engine
        .search_secondary(&[0.0], candidates, &mut stats)
        .expect("phase 2");

    // Assert
    let ids: Vec<i64> = refined.iter().map(|n| n.internal_id).collect();
    assert_eq!(ids, vec![0, 2, 3]);
    assert_eq!(stats.disk_reads, 1);
    assert_eq!(stats.pages_read, 4);
}

#[test]
fn test_ties_broken_by_internal_id() {
    // Arrange
    let engine = built_engine(&[1.0, -1.0, 1.0], 1);

    // Act
    let candidates = engine.search_memory(&[0.0], 3).expect("search");

    // Assert
    let ids: Vec<i64> = candidates.iter().map(|n| n.internal_id).collect();
    assert_eq!(ids, vec![0, 1, 2]);
}

#[test]
fn test_integer_elements() {
    // Arrange
    let engine = InMemoryEngine::<u8>::new();
    let data: Vec<u8> = vec![0, 0, 10, 10, 200, 200];
    let matrix = VectorMatrix::new(&data, 2).expect("matrix");
    engine
        .build(matrix, &MetadataBatch::from_external_ids(0..3), &BuildParams::default())
        .expect("build");

    // Act
    let candidates = engine.search_memory(&[9, 9], 1).expect("search");

    // Assert
    assert_eq!(candidates[0].internal_id, 1);
    assert!((candidates[0].distance - 2.0).abs() < f32::EPSILON);
}

#[test]
fn test_save_and_load() {
    // Arrange
    let dir = tempfile::tempdir().expect("temp dir");
    let engine = built_engine(&[0.0, 0.0, 3.0, 4.0], 2);
    engine.insert_one(&[1.0, 1.0], 10).expect("insert");
    engine.delete_one(0).expect("delete");

    // Act
    engine.save(dir.path()).expect("save");
    let loaded = InMemoryEngine::<f32>::load(dir.path()).expect("load");

    // Assert
    assert_eq!(loaded.len(), 2);
    assert!(!loaded.contains(0));
    assert_eq!(loaded.vector(10), Some(vec![1.0, 1.0]));
    assert_eq!(loaded.vector(1), Some(vec![3.0, 4.0]));
}

#[test]
fn test_load_missing_snapshot_is_io_error() {
    // Arrange
    let dir = tempfile::tempdir().expect("temp dir");

    // Act
    let result = InMemoryEngine::<f32>::load(dir.path());

    // Assert
    assert_eq!(result.expect_err("missing").code, status::IO);
}

#[test]
fn test_save_before_build_fails() {
    let dir = tempfile::tempdir().expect("temp dir");
    let engine = InMemoryEngine::<i8>::new();
    assert_eq!(
        engine.save(dir.path()).expect_err("not built").code,
        status::NOT_BUILT
    );
}
