use std::{sync::Mutex, thread, time::Duration};

use arcfit::{
    arc_builder::ArcBuilder,
    estimator::{EstimationError, EstimationRequest, EstimationResult},
    reference::select_reference,
    ArcfitError, FailurePolicy, PartitionedStrategy, Pipeline, PipelineConfig,
    SequentialStrategy, SlotStatus, Store,
};
use nalgebra::DVector;

mod common;
use common::{mock_estimator, picky_estimator, synthetic_store};

#[test]
fn test_partition_counts_match_sequential() {
    let store = synthetic_store(23, 9, 42);
    let pipeline = Pipeline::new(PipelineConfig::default(), mock_estimator);

    let sequential = pipeline.run(&store, &SequentialStrategy).unwrap();
    assert!(sequential.results.pending().is_empty());

    for n_partitions in 1..=store.len() + 2 {
        let partitioned = pipeline
            .run(&store, &PartitionedStrategy::new(n_partitions).unwrap())
            .unwrap();
        assert_eq!(partitioned.reference, sequential.reference);
        assert!(
            partitioned.results.bit_identical(&sequential.results),
            "partitioned({n_partitions}) differs from sequential"
        );
    }
}

#[test]
fn test_partitions_far_beyond_arcs() {
    let store = synthetic_store(11, 5, 8);
    let pipeline = Pipeline::new(PipelineConfig::default(), mock_estimator);

    let sequential = pipeline.run(&store, &SequentialStrategy).unwrap();
    let partitioned = pipeline
        .run(&store, &PartitionedStrategy::new(5000).unwrap())
        .unwrap();
    assert!(partitioned.results.bit_identical(&sequential.results));
}

#[test]
fn test_order_survives_reversed_completion() {
    let n_points = 12;
    // the temperature series carries the store position, so the estimator can see it
    let points = synthetic_store(n_points, 6, 17)
        .points()
        .iter()
        .enumerate()
        .map(|(position, point)| {
            let mut point = point.clone();
            point.temperature = DVector::from_element(6, position as f64);
            point
        })
        .collect();
    let store = Store::new(points).unwrap();

    let completed = Mutex::new(Vec::new());
    // early positions are the slowest
    let slow_first = |request: &EstimationRequest<'_>| -> Result<EstimationResult, EstimationError> {
        let position = request.arc.temp[0] as usize;
        thread::sleep(Duration::from_millis(4 * (n_points - position) as u64));
        completed.lock().unwrap().push(position);
        mock_estimator(request)
    };
    let pipeline = Pipeline::new(PipelineConfig::default(), slow_first);

    let sequential = pipeline.run(&store, &SequentialStrategy).unwrap();
    let in_order = std::mem::take(&mut *completed.lock().unwrap());
    assert!(in_order.windows(2).all(|w| w[0] < w[1]));

    let partitioned = pipeline
        .run(&store, &PartitionedStrategy::new(n_points).unwrap())
        .unwrap();
    let completion = completed.lock().unwrap().clone();
    assert_eq!(completion.len(), in_order.len());
    assert_ne!(completion, in_order, "workers finished in input order");

    assert_eq!(partitioned.reference, sequential.reference);
    assert!(partitioned.results.bit_identical(&sequential.results));
}

#[test]
fn test_slot_matches_isolated_estimate() {
    let store = synthetic_store(11, 6, 7);
    let pipeline = Pipeline::new(PipelineConfig::default(), mock_estimator);
    let output = pipeline
        .run(&store, &PartitionedStrategy::new(4).unwrap())
        .unwrap();

    let reference = select_reference(&store.nmad_init()).unwrap();
    assert_eq!(output.reference, reference);

    let config = pipeline.config();
    let builder = ArcBuilder::new(&store, reference, config.sigma_model).unwrap();
    for position in (0..store.len()).filter(|p| *p != reference) {
        let arc = builder.build(position, store.point(position).unwrap()).unwrap();
        let request = arcfit::EstimationRequest {
            wavelength: config.wavelength,
            arc: &arc,
            priors: &config.priors,
            method: config.method,
        };
        let expected = mock_estimator(&request).unwrap();
        assert_eq!(output.results.slot(position).unwrap(), expected);
    }
}

#[test]
fn test_skip_point_equivalence() {
    let store = synthetic_store(15, 8, 3);
    let config = PipelineConfig::builder()
        .failure_policy(FailurePolicy::SkipPoint)
        .build()
        .unwrap();
    let pipeline = Pipeline::new(config, picky_estimator);

    let sequential = pipeline.run(&store, &SequentialStrategy).unwrap();
    let failed = sequential.results.failed();
    assert!(!failed.is_empty());
    assert!(failed.len() < store.len() - 1);
    for position in &failed {
        assert!(sequential.results.x_hat().row(*position).iter().all(|v| v.is_nan()));
        assert!(matches!(sequential.results.status()[*position], SlotStatus::Failed(_)));
    }

    for n_partitions in [1, 2, 4, 7, 15] {
        let partitioned = pipeline
            .run(&store, &PartitionedStrategy::new(n_partitions).unwrap())
            .unwrap();
        assert!(partitioned.results.bit_identical(&sequential.results));
    }
}

#[test]
fn test_fail_fast_reports_same_point() {
    let store = synthetic_store(15, 8, 3);
    let pipeline = Pipeline::new(PipelineConfig::default(), picky_estimator);

    let sequential = pipeline.run(&store, &SequentialStrategy).unwrap_err();
    let ArcfitError::EstimationFailed { point, .. } = &sequential else {
        panic!("unexpected error: {sequential}");
    };

    let skip = Pipeline::new(
        PipelineConfig::builder()
            .failure_policy(FailurePolicy::SkipPoint)
            .build()
            .unwrap(),
        picky_estimator,
    )
    .run(&store, &SequentialStrategy)
    .unwrap();
    assert_eq!(*point, skip.results.failed()[0]);

    for n_partitions in [1, 3, 5, 14] {
        let partitioned = pipeline
            .run(&store, &PartitionedStrategy::new(n_partitions).unwrap())
            .unwrap_err();
        assert_eq!(partitioned, sequential);
    }
}

#[test]
fn test_strict_partitioning() {
    // 13 points: the work list holds 12 arcs
    let store = synthetic_store(13, 5, 11);
    let pipeline = Pipeline::new(PipelineConfig::default(), mock_estimator);

    assert!(pipeline
        .run(&store, &PartitionedStrategy::new(4).unwrap().strict(true))
        .is_ok());
    assert!(matches!(
        pipeline.run(&store, &PartitionedStrategy::new(5).unwrap().strict(true)),
        Err(ArcfitError::InvalidPipelineParameter(_))
    ));
}

#[test]
fn test_malformed_point() {
    let store = synthetic_store(6, 5, 1);
    let reference = select_reference(&store.nmad_init()).unwrap();
    let broken = (0..6).find(|p| *p != reference).unwrap();

    let mut points = store.points().to_vec();
    points[broken].h2ph = nalgebra::DVector::zeros(4);
    let store = arcfit::Store::new(points).unwrap();

    let pipeline = Pipeline::new(PipelineConfig::default(), mock_estimator);
    assert_eq!(
        pipeline.run(&store, &SequentialStrategy).unwrap_err(),
        ArcfitError::ShapeMismatch {
            point: broken,
            field: "h2ph",
            expected: 5,
            found: 4
        }
    );

    let pipeline = Pipeline::new(
        PipelineConfig::builder()
            .failure_policy(FailurePolicy::SkipPoint)
            .build()
            .unwrap(),
        mock_estimator,
    );
    let output = pipeline
        .run(&store, &PartitionedStrategy::new(2).unwrap())
        .unwrap();
    assert_eq!(output.results.failed(), vec![broken]);
}
