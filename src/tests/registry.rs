use rand::{rngs::SmallRng, Rng, SeedableRng};

use crate::prelude::{Constellation, NoiseModel, StateKey, StateRegistry, SV};
use crate::tests::{epoch, init_logger};

use nalgebra::DMatrix;

fn random_key(rng: &mut SmallRng) -> StateKey {
    let sv = SV::new(Constellation::GPS, rng.random_range(1..=8));
    match rng.random_range(0..4) {
        0 => StateKey::sat_clock(sv),
        1 => StateKey::rec_clock(["ABMF", "GRAS", "ZIMM"][rng.random_range(0..3)]),
        2 => StateKey::ambiguity("ABMF", sv, rng.random_range(0..2)),
        _ => StateKey::orbit(sv, rng.random_range(0..6)),
    }
}

fn assert_consistent(registry: &StateRegistry) {
    let n = registry.len();
    assert_eq!(registry.x().len(), n, "x dimension");
    assert_eq!(registry.p().shape(), (n, n), "P dimension");
    assert_eq!(registry.keys().len(), n, "index dimension");
    for (pos, key) in registry.keys().iter().enumerate() {
        assert_eq!(registry.position(key), Some(pos), "{} misplaced", key);
    }
    for i in 0..n {
        assert!(registry.p()[(i, i)] >= 0.0, "negative variance");
        for j in 0..n {
            assert_eq!(registry.p()[(i, j)], registry.p()[(j, i)], "P not symmetric");
        }
    }
}

#[test]
fn randomized_consistency() {
    init_logger();

    let mut rng = SmallRng::seed_from_u64(0x5EED);
    let mut registry = StateRegistry::new();
    let mut t = 0;

    for _ in 0..500 {
        let key = random_key(&mut rng);
        match rng.random_range(0..10) {
            0..=4 => {
                let x0 = rng.random_range(-100.0..100.0);
                let var0 = rng.random_range(0.0..1.0E4);
                let existed = registry.contains(&key);
                let len = registry.len();
                let pos = registry.upsert_with(key.clone(), x0, var0);
                if existed {
                    assert_eq!(registry.len(), len);
                } else {
                    assert_eq!(pos, len);
                    assert_eq!(registry.value(&key), Some((x0, var0)));
                }
            },
            5..=7 => {
                let len = registry.len();
                let existed = registry.contains(&key);
                assert_eq!(registry.remove(&key).is_some(), existed);
                assert_eq!(registry.len(), if existed { len - 1 } else { len });
                assert!(!registry.contains(&key));
            },
            8 => {
                if registry.contains(&key) {
                    let sigma = rng.random_range(0.1..10.0);
                    registry
                        .set_noise_model(&key, NoiseModel::random_walk(sigma))
                        .unwrap();
                }
            },
            _ => {
                t += rng.random_range(1..30);
                registry.time_update(epoch(t)).unwrap();
                assert_eq!(registry.epoch(), Some(epoch(t)));
            },
        }
        assert_consistent(&registry);
    }
}

#[test]
fn removal_is_idempotent() {
    let g01 = SV::new(Constellation::GPS, 1);
    let mut registry = StateRegistry::new();

    registry.upsert_with(StateKey::sat_clock(g01), 1.0, 1.0);
    registry.upsert_with(StateKey::rec_clock("ABMF"), 2.0, 2.0);
    registry.upsert_with(StateKey::ambiguity("ABMF", g01, 0), 3.0, 3.0);

    let key = StateKey::rec_clock("ABMF");
    assert_eq!(registry.remove(&key), Some(1));

    let once = registry.clone();
    assert_eq!(registry.remove(&key), None);

    assert_eq!(registry.keys(), once.keys());
    assert_eq!(registry.x(), once.x());
    assert_eq!(registry.p(), once.p());
    assert_eq!(
        registry.value(&StateKey::ambiguity("ABMF", g01, 0)),
        Some((3.0, 3.0))
    );

    // absent from the start
    let absent = StateKey::sat_clock(SV::new(Constellation::Galileo, 5));
    assert_eq!(registry.remove(&absent), None);
    assert_eq!(registry.len(), 2);
}

#[test]
fn time_update_integrates_orbits() {
    let g01 = SV::new(Constellation::GPS, 1);
    let mut registry = StateRegistry::new();

    for component in 0..6 {
        registry.upsert_with(StateKey::orbit(g01, component), component as f64, 1.0);
    }
    registry.upsert_with(StateKey::sat_clock(g01), 10.0, 1.0);

    registry.time_update(epoch(0)).unwrap();
    registry.time_update(epoch(10)).unwrap();

    // x += 10 * vx
    let (x, _) = registry.value(&StateKey::orbit(g01, 0)).unwrap();
    assert_eq!(x, 30.0);
    let (vx, var_vx) = registry.value(&StateKey::orbit(g01, 3)).unwrap();
    assert_eq!((vx, var_vx), (3.0, 1.0));

    // position variance picks up velocity uncertainty
    let (_, var_x) = registry.value(&StateKey::orbit(g01, 0)).unwrap();
    assert_eq!(var_x, 1.0 + 100.0);

    // clocks are held constant
    assert_eq!(registry.value(&StateKey::sat_clock(g01)), Some((10.0, 1.0)));

    // toward the past
    assert!(registry.time_update(epoch(5)).is_err());
}

#[test]
fn propagation_applies_noise_models() {
    let mut registry = StateRegistry::new();
    let key = StateKey::rec_clock("ABMF");
    registry.upsert_with(key.clone(), 0.0, 1.0);
    registry
        .set_noise_model(&key, NoiseModel::random_walk(2.0))
        .unwrap();

    registry.time_update(epoch(0)).unwrap();
    assert_eq!(registry.value(&key), Some((0.0, 1.0)));

    registry.time_update(epoch(3)).unwrap();
    assert_eq!(registry.value(&key), Some((0.0, 1.0 + 12.0)));

    // manual transitions ignore the noise models
    let f = DMatrix::<f64>::identity(1, 1);
    let q = DMatrix::<f64>::from_element(1, 1, 0.5);
    registry.manual_transition(&f, &q, epoch(10)).unwrap();
    assert_eq!(registry.value(&key), Some((0.0, 13.5)));
}
