//! Integration tests: decontaminate synthetic cluster regions against field
//! regions drawn from a separate population.


use starcluster::decontamination::{Normalization, ResamplePolicy};
use starcluster::region::{bootstrap_resample, trim_frame};
use starcluster::{
    decontaminate, DecontaminationConfig, DecontaminationEngine, DecontaminationStatus, Error,
    Frame, Measurement, Region, Star, WeightPolicy,
};
use test_data::{contaminated_region, draw_stars, seeded, CLUSTER, FIELD};

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_env_filter("info").try_init();
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// 500 cluster stars, two fields of 50: stable probabilities converge well
/// before the budget.
#[test]
fn separated_populations_converge() {
    init_tracing();
    let mut rng = seeded(1);
    let cluster = Region::cluster(draw_stars(&CLUSTER, 500, 0, &mut rng));
    let fields = vec![
        Region::field(draw_stars(&FIELD, 50, 1000, &mut rng)),
        Region::field(draw_stars(&FIELD, 50, 2000, &mut rng)),
    ];

    let config = DecontaminationConfig {
        max_runs: 50,
        seed: Some(7),
        ..Default::default()
    };
    let result = decontaminate(&cluster, &fields, config).unwrap();

    println!("status {:?} after {} runs", result.status, result.runs);
    assert!(result.converged());
    match result.status {
        DecontaminationStatus::Converged { run } => {
            // Convergence is only accepted from run floor(0.1 * 50) on.
            assert!(run >= 5);
            assert!(run < 50);
        }
        DecontaminationStatus::BudgetExhausted => unreachable!(),
    }
    assert_eq!(result.evaluations, 2 * result.runs as u64);
    assert_eq!(result.probabilities.len(), 500);
    assert!(result.probabilities.iter().all(|&p| p > 0.99 && p <= 1.0));
}

#[test]
fn contaminants_score_lower_than_members() {
    init_tracing();
    let mut rng = seeded(2);
    let n_members = 300;
    let cluster = Region::cluster(contaminated_region(n_members, 100, &mut rng));
    let fields = vec![
        Region::field(draw_stars(&FIELD, 100, 5000, &mut rng)),
        Region::field(draw_stars(&FIELD, 100, 6000, &mut rng)),
    ];

    let config = DecontaminationConfig {
        max_runs: 100,
        seed: Some(3),
        ..Default::default()
    };
    let result = decontaminate(&cluster, &fields, config).unwrap();
    let (members, contaminants) = result.probabilities.split_at(n_members);

    let p_members = mean(members);
    let p_contaminants = mean(contaminants);
    println!(
        "members {:.3}, contaminants {:.3}",
        p_members, p_contaminants
    );
    assert!(p_members > 0.9);
    assert!(p_contaminants < 0.6);
    assert!(p_members - p_contaminants > 0.4);
    assert!(result
        .probabilities
        .iter()
        .all(|p| p.is_finite() && (0.0..=1.0).contains(p)));

    let cmp = result.compare_member_count(n_members).unwrap();
    assert!(!cmp.discrepant, "{:?}", cmp);
}

/// A field region larger than the cluster region: every star gets the
/// floor-derived probability.
#[test]
fn larger_field_region_uses_floor_likelihood() {
    let mut rng = seeded(3);
    let cluster = Region::cluster(contaminated_region(15, 5, &mut rng));
    let fields = vec![Region::field(draw_stars(&FIELD, 40, 100, &mut rng))];

    let config = DecontaminationConfig {
        max_runs: 20,
        seed: Some(1),
        ..Default::default()
    };
    let engine = DecontaminationEngine::new(&cluster, &fields, config).unwrap();
    let field_lkl: Vec<f64> = engine.field_likelihoods().next().unwrap().to_vec();
    let result = engine.run();

    for (p, fl) in result.probabilities.iter().zip(&field_lkl) {
        let expected = 1.0 / (1.0 + fl / 1e-7);
        assert!(p.is_finite());
        assert!((0.0..=1.0).contains(p));
        assert!(
            (p - expected).abs() <= 1e-9 * expected.max(1e-300),
            "p = {}, expected {}",
            p,
            expected
        );
    }
}

#[test]
fn same_seed_same_result() {
    let mut rng = seeded(4);
    let cluster = Region::cluster(contaminated_region(80, 40, &mut rng));
    let fields = vec![
        Region::field(draw_stars(&FIELD, 30, 500, &mut rng)),
        Region::field(draw_stars(&FIELD, 35, 600, &mut rng)),
    ];
    let config = DecontaminationConfig {
        max_runs: 30,
        seed: Some(99),
        ..Default::default()
    };

    let a = decontaminate(&cluster, &fields, config.clone()).unwrap();
    let b = decontaminate(&cluster, &fields, config).unwrap();
    assert_eq!(a.probabilities, b.probabilities);
    assert_eq!(a.status, b.status);
    assert_eq!(a.runs, b.runs);
}

#[test]
fn policies_and_normalizations_stay_in_bounds() {
    let mut rng = seeded(5);
    let cluster = Region::cluster(contaminated_region(60, 20, &mut rng));
    let fields = vec![
        Region::field(draw_stars(&FIELD, 25, 500, &mut rng)),
        Region::field(Vec::new()),
    ];

    for normalization in [
        Normalization::Shared,
        Normalization::PerRegion,
        Normalization::None,
    ] {
        for resample_policy in [ResamplePolicy::FeedbackWeighted, ResamplePolicy::Uniform] {
            let config = DecontaminationConfig {
                max_runs: 10,
                seed: Some(11),
                normalization,
                resample_policy,
                ..Default::default()
            };
            let result = decontaminate(&cluster, &fields, config).unwrap();
            // The empty field region is skipped.
            assert_eq!(result.evaluations, result.runs as u64);
            assert!(result
                .probabilities
                .iter()
                .all(|p| p.is_finite() && (0.0..=1.0).contains(p)));
        }
    }
}

#[test]
fn degenerate_inputs_are_errors() {
    let mut rng = seeded(6);
    let cluster = Region::cluster(draw_stars(&CLUSTER, 20, 0, &mut rng));
    let field = Region::field(draw_stars(&FIELD, 10, 100, &mut rng));

    let empty = Region::cluster(Vec::new());
    let err = decontaminate(&empty, std::slice::from_ref(&field), Default::default());
    assert_eq!(err.unwrap_err(), Error::EmptyClusterRegion);

    let err = decontaminate(&cluster, &[], Default::default());
    assert_eq!(err.unwrap_err(), Error::NoFieldRegions);

    let err = decontaminate(&cluster, &[Region::field(Vec::new())], Default::default());
    assert_eq!(err.unwrap_err(), Error::NoFieldRegions);

    let config = DecontaminationConfig {
        weights: WeightPolicy::Explicit(vec![1.0]),
        ..Default::default()
    };
    let err = decontaminate(&cluster, std::slice::from_ref(&field), config);
    assert_eq!(
        err.unwrap_err(),
        Error::WeightLengthMismatch {
            expected: 2,
            got: 1
        }
    );

    let no_colors: Vec<Star> = cluster
        .stars()
        .iter()
        .map(|s| Star {
            colors: vec![None],
            ..s.clone()
        })
        .collect();
    let err = decontaminate(&Region::cluster(no_colors), &[field], Default::default());
    assert!(matches!(err.unwrap_err(), Error::UndefinedDimension { dim: 1, .. }));
}

#[test]
fn partially_undefined_stars_still_get_probabilities() {
    let mut rng = seeded(7);
    let mut stars = draw_stars(&CLUSTER, 50, 0, &mut rng);
    stars[3].colors[0] = None;
    stars[7].colors[0] = Some(Measurement::new(f64::NAN, 0.1));
    let cluster = Region::cluster(stars);
    let fields = vec![Region::field(draw_stars(&FIELD, 20, 100, &mut rng))];

    let config = DecontaminationConfig {
        max_runs: 20,
        seed: Some(2),
        ..Default::default()
    };
    let result = decontaminate(&cluster, &fields, config).unwrap();
    assert!(result.probabilities[3].is_finite());
    assert!(result.probabilities[7].is_finite());
    assert!(result.probabilities[3] > 0.5);
}

#[test]
fn trimmed_and_bootstrapped_regions() {
    let mut rng = seeded(8);
    let stars = draw_stars(&CLUSTER, 200, 0, &mut rng);

    let frame = Frame {
        xmin: 25.0,
        xmax: 75.0,
        ymin: 25.0,
        ymax: 75.0,
    };
    let trimmed = trim_frame(stars.clone(), &frame).unwrap();
    assert!(trimmed.len() < stars.len());
    assert!(trimmed.iter().all(|s| frame.contains(s)));

    let tiny = Frame {
        xmin: 0.0,
        xmax: 1.0,
        ymin: 0.0,
        ymax: 1.0,
    };
    assert!(matches!(
        trim_frame(stars.clone(), &tiny),
        Err(Error::TooFewStarsAfterTrim(_))
    ));

    let resampled = bootstrap_resample(&trimmed, &mut rng);
    assert_eq!(resampled.len(), trimmed.len());
    assert!(resampled
        .iter()
        .all(|s| trimmed.iter().any(|t| t.id == s.id)));

    let fields = vec![Region::field(draw_stars(&FIELD, 20, 1000, &mut rng))];
    let config = DecontaminationConfig {
        max_runs: 10,
        seed: Some(5),
        ..Default::default()
    };
    let result = decontaminate(&Region::cluster(resampled), &fields, config).unwrap();
    assert_eq!(result.probabilities.len(), trimmed.len());
}
