use celestial_crossmatch::constants::ARCSEC_TO_RAD;
use celestial_crossmatch::{
    cross_fields, matching, BackendKind, CrossmatchError, Field, MatchParams, PixelIndex, Sample,
    SampleId,
};

const T1_CAT: &str = "tests/data/asciicat/t1_cat.txt";
const T3_CAT: &str = "tests/data/asciicat/t3_cat.txt";

fn params(order: u32, backend: BackendKind) -> MatchParams {
    MatchParams {
        order,
        radius_arcsec: 2.0,
        backend,
        parallel: false,
    }
}

fn lcg(state: &mut u64) -> f64 {
    *state = state
        .wrapping_mul(6364136223846793005)
        .wrapping_add(1442695040888963407);
    (*state >> 11) as f64 / (1u64 << 53) as f64
}

/// Two fields over a 2x2 degree patch: every second sample of the first
/// field gets a sub-arcsecond counterpart in the second, the rest get one
/// well outside the radius.
fn jittered_fields(count: usize, seed: u64) -> Vec<Field> {
    let mut state = seed;
    let mut reference = Vec::with_capacity(count);
    let mut observed = Vec::with_capacity(count);
    for i in 0..count {
        let ra = 40.0 + 2.0 * lcg(&mut state);
        let dec = 10.0 + 2.0 * lcg(&mut state);
        reference.push(Sample::from_degrees(i as i64, ra, dec));

        let offset_arcsec = if i % 2 == 0 {
            0.2 + lcg(&mut state)
        } else {
            30.0 + 30.0 * lcg(&mut state)
        };
        observed.push(Sample::from_degrees(
            i as i64,
            ra,
            dec + offset_arcsec / 3600.0,
        ));
    }
    vec![
        Field::from_samples(reference),
        Field::from_samples(observed),
    ]
}

// --- Fixture scenario ---

#[test]
fn fixture_catalogs_give_two_matches() {
    let fields = vec![
        Field::open_ascii(T1_CAT).unwrap(),
        Field::open_ascii(T3_CAT).unwrap(),
    ];
    let outcome = cross_fields(&fields, &params(10, BackendKind::BalancedTree)).unwrap();
    assert_eq!(outcome.match_count(), 2);

    // The one within-radius pair links mutually; the far samples stay
    // unmatched.
    let (partner, distance) = outcome.best_match(SampleId(1)).unwrap();
    assert_eq!(partner, SampleId(3));
    assert!(distance < 2.0 * ARCSEC_TO_RAD);
    let (partner, _) = outcome.best_match(SampleId(3)).unwrap();
    assert_eq!(partner, SampleId(1));
    assert!(outcome.best_match(SampleId(0)).is_none());
    assert!(outcome.best_match(SampleId(2)).is_none());
}

#[test]
fn fixture_counts_agree_across_backends() {
    let fields = vec![
        Field::open_ascii(T1_CAT).unwrap(),
        Field::open_ascii(T3_CAT).unwrap(),
    ];
    let tree = cross_fields(&fields, &params(10, BackendKind::BalancedTree)).unwrap();
    let dense = cross_fields(&fields, &params(10, BackendKind::DenseArray)).unwrap();
    assert_eq!(tree.match_count(), dense.match_count());
    assert_eq!(tree.test_count(), dense.test_count());
    assert_eq!(tree.best_matches(), dense.best_matches());
}

// --- Properties on generated skies ---

#[test]
fn backends_produce_identical_outcomes() {
    let fields = jittered_fields(200, 7);
    let tree = cross_fields(&fields, &params(8, BackendKind::BalancedTree)).unwrap();
    let dense = cross_fields(&fields, &params(8, BackendKind::DenseArray)).unwrap();

    assert_eq!(tree.match_count(), dense.match_count());
    assert_eq!(tree.test_count(), dense.test_count());
    assert_eq!(tree.best_matches(), dense.best_matches());
    assert!(tree.match_count() > 0, "fixture sky produced no matches");
}

#[test]
fn rerunning_identical_input_is_idempotent() {
    let fields = jittered_fields(150, 99);
    let first = cross_fields(&fields, &params(10, BackendKind::BalancedTree)).unwrap();
    let second = cross_fields(&fields, &params(10, BackendKind::BalancedTree)).unwrap();

    assert_eq!(first.match_count(), second.match_count());
    assert_eq!(first.test_count(), second.test_count());
    assert_eq!(first.best_matches(), second.best_matches());
}

#[test]
fn parallel_runner_matches_sequential() {
    let fields = jittered_fields(400, 3);
    let sequential = cross_fields(&fields, &params(10, BackendKind::BalancedTree)).unwrap();
    let mut parallel_params = params(10, BackendKind::BalancedTree);
    parallel_params.parallel = true;
    let parallel = cross_fields(&fields, &parallel_params).unwrap();

    assert_eq!(sequential.match_count(), parallel.match_count());
    assert_eq!(sequential.test_count(), parallel.test_count());
    assert_eq!(sequential.best_matches(), parallel.best_matches());
}

#[test]
fn every_match_is_within_radius_and_cross_field() {
    let fields = jittered_fields(250, 42);
    let mut index = PixelIndex::build(&fields, 10, BackendKind::BalancedTree).unwrap();
    let radius = 2.0 * ARCSEC_TO_RAD;
    let outcome = matching::run(&mut index, radius);

    let mut seen = 0;
    for (id, partner, distance) in outcome.iter_matches() {
        assert!(distance < radius);
        assert_ne!(index.sample(id).field, index.sample(partner).field);
        seen += 1;
    }
    assert!(seen > 0);
    assert!(outcome.match_count() <= seen);
}

#[test]
fn unmatched_samples_keep_the_radius_sentinel() {
    let fields = jittered_fields(100, 5);
    let radius = 2.0 * ARCSEC_TO_RAD;
    let mut index = PixelIndex::build(&fields, 10, BackendKind::BalancedTree).unwrap();
    let outcome = matching::run(&mut index, radius);

    let mut unmatched = 0;
    for best in outcome.best_matches() {
        if best.partner.is_none() {
            assert_eq!(best.distance, radius);
            unmatched += 1;
        } else {
            assert!(best.distance < radius);
        }
    }
    assert!(unmatched > 0, "expected some isolated samples");
}

#[test]
fn fields_with_multiple_sets_stay_one_field() {
    // a1 and a2 are two sets of one field, 0.6 arcsec apart; c from the
    // second field sits between them. Same-field pairs never match, so
    // only c initiates successfully.
    let field_a = Field {
        sets: vec![
            celestial_crossmatch::Set {
                samples: vec![Sample::from_degrees(1, 0.0400000, 0.0)],
            },
            celestial_crossmatch::Set {
                samples: vec![Sample::from_degrees(2, 0.0401667, 0.0)],
            },
        ],
    };
    let field_b = Field::from_samples(vec![Sample::from_degrees(1, 0.0400556, 0.0)]);

    let outcome = cross_fields(&[field_a, field_b], &params(10, BackendKind::BalancedTree)).unwrap();
    assert_eq!(outcome.match_count(), 1);

    // c pairs with the closer of the two; both field-a samples point
    // back at c; a1-a2 never link to each other.
    let (partner, _) = outcome.best_match(SampleId(2)).unwrap();
    assert_eq!(partner, SampleId(0));
    let (partner, _) = outcome.best_match(SampleId(0)).unwrap();
    assert_eq!(partner, SampleId(2));
    let (partner, _) = outcome.best_match(SampleId(1)).unwrap();
    assert_eq!(partner, SampleId(2));
}

#[test]
fn invalid_order_fails_before_any_work() {
    let fields = jittered_fields(10, 1);
    let err = cross_fields(&fields, &params(30, BackendKind::BalancedTree)).unwrap_err();
    assert!(matches!(err, CrossmatchError::InvalidResolution(30)));
}

#[test]
fn missing_catalog_file_reports_io_error() {
    let err = Field::open_ascii("tests/data/asciicat/absent.txt").unwrap_err();
    assert!(matches!(err, CrossmatchError::Io(_)));
}
