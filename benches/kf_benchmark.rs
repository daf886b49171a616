use criterion::{criterion_group, criterion_main, Criterion};

use nalgebra::{Matrix1, Matrix4, Matrix4x1, Matrix6, SMatrix, SVector, Vector1, Vector4, Vector6};
extern crate gnc;
use gnc::control::lqr::{LqController, RiccatiForm};
use gnc::localization::{BayesianFilter, ExtendedKalmanFilter};
use gnc::models::measurement::DirectObservation;
use gnc::models::motion::ConstantVelocities6D;
use gnc::models::state::Cart3dQuat as States;
use gnc::utils::state::GaussianState;

fn ekf(b: &mut Criterion) {
    // setup ekf
    let mut x = SVector::<f64, 13>::zeros();
    x[States::QW] = 1.0;
    x[States::VX] = 1.0;
    x[States::WZ] = 0.1;
    let initial = GaussianState {
        x,
        cov: SMatrix::<f64, 13, 13>::identity(),
    };
    let gps = DirectObservation::gps(Matrix6::identity()).unwrap();
    let mut ekf: ExtendedKalmanFilter<f64, _, _, 13, 6, 1> =
        ExtendedKalmanFilter::new(initial, ConstantVelocities6D::new(0.1, 0.01), gps);

    let dt = 0.1;
    let u = Vector1::zeros();
    let z = Vector6::new(0.1, 0.0, 0.0, 1.0, 0.0, 0.0);

    b.bench_function("ekf", |b| {
        b.iter(|| ekf.update_estimate(&u, &z, dt))
    });
}

fn riccati(b: &mut Criterion) {
    // discretized inverted pendulum
    let dt = 0.05;
    #[rustfmt::skip]
    let a = Matrix4::identity() + dt * Matrix4::new(
        0.0, 1.0, 0.0, 0.0,
        0.0, 0.0, 2.94, 0.0,
        0.0, 0.0, 0.0, 1.0,
        0.0, 0.0, 6.37, 0.0
    );
    let bu = dt * Matrix4x1::new(0.0, 1.0, 0.0, 0.5);
    let controller = LqController::new(
        Matrix4::from_diagonal(&Vector4::new(10.0, 1.0, 10.0, 1.0)),
        Matrix1::new(0.001),
    )
    .unwrap();

    b.bench_function("riccati", |b| {
        b.iter(|| {
            let mut controller = controller.clone();
            controller.update_model(a, bu, RiccatiForm::Recursive)
        })
    });
}

criterion_group!(benches, ekf, riccati);
criterion_main!(benches);
