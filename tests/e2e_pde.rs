//! End-to-end exploration tests
//!
//! Client: init → request; server: lookup → pack → merge → switch → local
//! threshold → inner sum → global threshold; client: decrypt ≈ plaintext score.

use pde_explore::engine::ClearEngine;
use pde_explore::lut::ScoringFunction;
use pde_explore::params::PdeParams;
use pde_explore::pde::{plaintext_score, Client, Database, DenseDatabase, Request, Server};
use pde_explore::registry::ResolutionRegistry;
use pde_explore::PdeError;

const TOLERANCE: f64 = 1.0 / 512.0;

fn step_functions() -> Vec<ScoringFunction> {
    vec![
        ScoringFunction::step((0.0, 64.0), 64, 8.0, 2.0).unwrap(),
        ScoringFunction::step((0.0, 64.0), 64, 16.0, 1.0).unwrap(),
    ]
}

/// Row sums 17, 3, 13 and 8
fn four_rows() -> DenseDatabase {
    DenseDatabase::from_rows(&[
        vec![56.0, 48.0],
        vec![8.0, 16.0],
        vec![52.0, 20.0],
        vec![24.0, 40.0],
    ])
    .unwrap()
}

fn run(
    engine: &ClearEngine,
    params: PdeParams,
    functions: &[ScoringFunction],
    db: &DenseDatabase,
    t_local: f64,
    t_global: f64,
) -> f64 {
    let (client, keys) = Client::init(engine, params).unwrap();
    let rows = db.dims().0;
    let request = client.gen_request(keys, functions, t_local, t_global, rows).unwrap();
    let score = Server::new(engine).process_request(&request, db).unwrap();
    client.decrypt(&score).unwrap()[0]
}

#[test]
fn test_e2e_enough_rows_pass() {
    let engine = ClearEngine::with_seed(1001);
    let functions = step_functions();
    let db = four_rows();

    assert_eq!(plaintext_score(&db, &functions, 12.0, 0.04).unwrap(), 1.0);
    let got = run(&engine, PdeParams::test_small(), &functions, &db, 12.0, 0.04);
    assert!((got - 1.0).abs() < TOLERANCE, "score {}", got);
}

#[test]
fn test_e2e_too_few_rows_pass() {
    let engine = ClearEngine::with_seed(1002);
    let functions = step_functions();
    let db = four_rows();

    // Two rows reach 12, three are required
    assert_eq!(plaintext_score(&db, &functions, 12.0, 3.0).unwrap(), 0.0);
    let got = run(&engine, PdeParams::test_small(), &functions, &db, 12.0, 3.0);
    assert!(got.abs() < TOLERANCE, "score {}", got);
}

#[test]
fn test_e2e_thresholds_outside_score_range() {
    let functions = step_functions();
    let db = four_rows();

    // Local thresholds below, above and inside [0, 17]; global ones above the
    // row count, below zero and in between
    let cases = [
        (0.0, 5.0),
        (40.0, 0.04),
        (0.25, 63.0),
        (12.0, 20.0),
        (12.0, -3.0),
        (-8.0, 4.0),
        (17.0, 1.0),
        (18.0, 1.0),
    ];
    for (i, &(t_local, t_global)) in cases.iter().enumerate() {
        let engine = ClearEngine::with_seed(1020 + i as u64);
        let expected = plaintext_score(&db, &functions, t_local, t_global).unwrap();
        let got = run(&engine, PdeParams::test_small(), &functions, &db, t_local, t_global);
        assert!(
            (got - expected).abs() < TOLERANCE,
            "t_local {} t_global {}: {} vs {}",
            t_local,
            t_global,
            got,
            expected
        );
    }
}

#[test]
fn test_e2e_padding_slots_are_not_counted() {
    let functions = step_functions();
    let db = four_rows();

    // Every row passes a zero local threshold, and so would the 60 padding
    // slots of the 64-slot top ring if they were counted
    for (t_global, expected) in [(4.0, 1.0), (5.0, 0.0)] {
        assert_eq!(plaintext_score(&db, &functions, 0.0, t_global).unwrap(), expected);
        let engine = ClearEngine::with_seed(1030);
        let got = run(&engine, PdeParams::test_small(), &functions, &db, 0.0, t_global);
        assert!((got - expected).abs() < TOLERANCE, "t_global {}: {}", t_global, got);
    }
}

#[test]
fn test_e2e_row_count_mismatch() {
    let engine = ClearEngine::with_seed(1031);
    let (client, keys) = Client::init(&engine, PdeParams::test_small()).unwrap();
    let request = client.gen_request(keys, &step_functions(), 12.0, 1.0, 5).unwrap();

    assert!(matches!(
        Server::new(&engine).process_request(&request, &four_rows()),
        Err(PdeError::InvalidArgument(_))
    ));
}

#[test]
fn test_e2e_multi_block_matches_plaintext() {
    let engine = ClearEngine::with_seed(1003);
    let params = PdeParams::test_small();
    let functions = vec![ScoringFunction::indicator((0.0, 4.0), 32, 1.5, 1.0).unwrap(); 2];

    // 40 rows: three blocks of 16 at 2^4, the last one partial
    let db = DenseDatabase::synthetic(40, 2, 77);
    let passing = (0..40)
        .filter(|&i| {
            let row = db.row(i).unwrap();
            let sum: f64 = functions
                .iter()
                .zip(row)
                .map(|(f, &x)| f.discretize(x).unwrap())
                .sum();
            sum >= 2.0
        })
        .count() as f64;

    for t_global in [passing, passing + 1.0] {
        let expected = plaintext_score(&db, &functions, 2.0, t_global).unwrap();
        let got = run(&engine, params.clone(), &functions, &db, 2.0, t_global);
        assert!(
            (got - expected).abs() < TOLERANCE,
            "t_global {}: {} vs {}",
            t_global,
            got,
            expected
        );
    }
    assert!(engine.bootstrap_count() > 0);
}

#[test]
fn test_e2e_single_resolution_chain() {
    let engine = ClearEngine::with_seed(1004);
    let mut params = PdeParams::test_small();
    params.min_log_n = params.max_log_n;

    let got = run(&engine, params, &step_functions(), &four_rows(), 12.0, 0.04);
    assert!((got - 1.0).abs() < TOLERANCE, "score {}", got);
}

#[test]
fn test_e2e_debug_keys_do_not_change_result() {
    let engine = ClearEngine::with_seed(1005);
    let (client, keys) = Client::init(&engine, PdeParams::test_small()).unwrap();
    let request = client.gen_request(keys, &step_functions(), 12.0, 0.04, 4).unwrap();

    let server = Server::new(&engine).with_debug_keys(client.secrets().clone());
    let score = server.process_request(&request, &four_rows()).unwrap();
    let got = client.decrypt(&score).unwrap()[0];
    assert!((got - 1.0).abs() < TOLERANCE);
}

#[test]
fn test_e2e_request_survives_serialization() {
    let engine = ClearEngine::with_seed(1006);
    let (client, keys) = Client::init(&engine, PdeParams::test_small()).unwrap();
    let request = client.gen_request(keys, &step_functions(), 12.0, 3.0, 4).unwrap();

    let size = request.serialized_size().unwrap();
    let sizes = request.sizes().unwrap();
    assert!(size > 0);
    assert!(sizes.keys > 0 && sizes.tables > 0 && sizes.thresholds > 0);

    let bytes = bincode::serialize(&request).unwrap();
    assert_eq!(bytes.len() as u64, size);
    let received: Request<ClearEngine> = bincode::deserialize(&bytes).unwrap();

    let score = Server::new(&engine).process_request(&received, &four_rows()).unwrap();
    assert!(client.decrypt(&score).unwrap()[0].abs() < TOLERANCE);
}

#[test]
fn test_e2e_value_out_of_domain() {
    let engine = ClearEngine::with_seed(1007);
    let (client, keys) = Client::init(&engine, PdeParams::test_small()).unwrap();
    let request = client.gen_request(keys, &step_functions(), 12.0, 1.0, 2).unwrap();

    // 63.5 is within one grid step of the upper bound
    let db = DenseDatabase::from_rows(&[vec![56.0, 48.0], vec![63.5, 1.0]]).unwrap();
    assert!(matches!(
        Server::new(&engine).process_request(&request, &db),
        Err(PdeError::OutOfDomain { .. })
    ));
}

#[test]
fn test_e2e_table_count_mismatch() {
    let engine = ClearEngine::with_seed(1008);
    let (client, keys) = Client::init(&engine, PdeParams::test_small()).unwrap();
    let request = client.gen_request(keys, &step_functions(), 12.0, 1.0, 1).unwrap();

    let db = DenseDatabase::from_rows(&[vec![1.0, 2.0, 3.0]]).unwrap();
    assert!(matches!(
        Server::new(&engine).process_request(&request, &db),
        Err(PdeError::InvalidArgument(_))
    ));
}

#[test]
fn test_e2e_missing_key_material() {
    let engine = ClearEngine::with_seed(1009);
    let params = PdeParams::test_small();
    let (client, keys) = Client::init(&engine, params.clone()).unwrap();
    let mut request = client.gen_request(keys, &step_functions(), 12.0, 1.0, 4).unwrap();

    request.keys.registry = ResolutionRegistry::new(&params).unwrap();
    assert!(matches!(
        Server::new(&engine).process_request(&request, &four_rows()),
        Err(PdeError::Configuration(_))
    ));
}

#[test]
fn test_e2e_missing_normalization() {
    let engine = ClearEngine::with_seed(1010);
    let (client, keys) = Client::init(&engine, PdeParams::test_small()).unwrap();
    let mut request = client.gen_request(keys, &step_functions(), 12.0, 1.0, 4).unwrap();

    request.local.normalization = None;
    assert!(matches!(
        Server::new(&engine).process_request(&request, &four_rows()),
        Err(PdeError::InvalidArgument(_))
    ));
}
