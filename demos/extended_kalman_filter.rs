// Extended kalman filter (EKF) tracking of a rigid body from noisy GPS fixes

use nalgebra::{Matrix6, SMatrix, SVector, Vector1, Vector6};
use plotters::prelude::*;
use rand_distr::{Distribution, Normal};
use serde::Serialize;
use std::error::Error;

extern crate gnc;
use gnc::localization::{Ekf, Filter};
use gnc::models::measurement::{DirectObservation, Measurement};
use gnc::models::motion::{ConstantVelocities6D, MotionModel};
use gnc::models::state::Cart3dQuat as States;

#[derive(Debug, Serialize)]
struct Record {
    time: f64,
    x_true: f64,
    y_true: f64,
    x_gps: f64,
    y_gps: f64,
    x_est: f64,
    y_est: f64,
    std_x: f64,
    std_y: f64,
    nis: f64,
}

fn run() -> Result<Vec<Record>, Box<dyn Error>> {
    let sim_time = 60.0;
    let dt = 0.1;
    let mut time = 0.;

    let gps_std = Vector6::new(2.0, 2.0, 4.0, 0.3, 0.3, 0.6);
    let gps_noise = Matrix6::from_diagonal(&gps_std.component_mul(&gps_std));
    let normal = Normal::new(0., 1.)?;
    let mut rng = rand::thread_rng();

    // truth: circling at 2 m/s while yawing at 0.1 rad/s
    let motion = ConstantVelocities6D::new(0.5, 0.05);
    let mut truth = Filter::<f64, 13, 1>::new();
    States::initialize(&mut truth);
    truth.state[States::VX] = 2.0;
    truth.state[States::WZ] = 0.1;

    let mut initial = truth.gaussian_state();
    initial.x[States::VX] = 0.0;
    initial.x[States::WZ] = 0.0;
    initial.cov = SMatrix::<f64, 13, 13>::identity() * 10.0;

    let gps = DirectObservation::gps(gps_noise)?;
    let mut estimate = Filter::<f64, 13, 1>::from_gaussian(initial);
    let mut skipped = 0;

    let mut history = Vec::new();
    let u = Vector1::zeros();
    while time < sim_time {
        time += dt;

        // the truth turns in the body frame; velocity is rotated by hand so the
        // trajectory is a circle
        let yaw = truth.state[States::WZ] * time;
        truth.state[States::VX] = 2.0 * yaw.cos();
        truth.state[States::VY] = 2.0 * yaw.sin();
        truth.state = motion.propagate(&truth.state, &u, dt);

        let observed = truth.state.fixed_rows::<6>(States::POSITION).clone_owned();
        let z = observed + gps_std.component_mul(&SVector::from_fn(|_, _| normal.sample(&mut rng)));

        Ekf::time_update(&mut estimate, &motion, dt)?;
        let nis = match Ekf::measurement_update(
            &mut estimate,
            Measurement::with_nominal_noise(z, &gps),
            &gps,
        ) {
            Ok(innovation) => innovation.nis,
            Err(error) => {
                log::warn!("skipping GPS fix at t = {time:.1}: {error}");
                skipped += 1;
                f64::NAN
            }
        };
        let (x, cov) = (estimate.state, estimate.covariance);

        history.push(Record {
            time,
            x_true: truth.state[States::X],
            y_true: truth.state[States::Y],
            x_gps: z[0],
            y_gps: z[1],
            x_est: x[States::X],
            y_est: x[States::Y],
            std_x: cov[(States::X, States::X)].sqrt(),
            std_y: cov[(States::Y, States::Y)].sqrt(),
            nis,
        });
    }
    log::info!("skipped {skipped} measurement updates");
    Ok(history)
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let history = run()?;

    // Create output directory if it didnt exist
    std::fs::create_dir_all("./img")?;

    let path_csv = "./img/ekf.csv";
    let mut writer = csv::Writer::from_path(path_csv)?;
    for record in &history {
        writer.serialize(record)?;
    }
    writer.flush()?;
    println!("Trajectory has been saved to {path_csv}");

    let path_img = "./img/ekf.png";
    let root = BitMapBackend::new(path_img, (1024, 768)).into_drawing_area();
    root.fill(&WHITE)?;
    let mut chart = ChartBuilder::on(&root)
        .margin(10)
        .caption("Extended Kalman Filter (EKF)", ("sans-serif", 40))
        .x_label_area_size(30)
        .y_label_area_size(30)
        .build_cartesian_2d(-30.0..30.0, -10.0..50.0)?;
    chart.configure_mesh().draw()?;

    chart
        .draw_series(
            history
                .iter()
                .map(|r| Circle::new((r.x_gps, r.y_gps), 2, GREEN.filled())),
        )?
        .label("GPS")
        .legend(|(x, y)| Circle::new((x, y), 2, GREEN.filled()));
    chart
        .draw_series(LineSeries::new(
            history.iter().map(|r| (r.x_true, r.y_true)),
            &BLUE,
        ))?
        .label("True")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], BLUE));
    chart
        .draw_series(LineSeries::new(
            history.iter().map(|r| (r.x_est, r.y_est)),
            &RED,
        ))?
        .label("EKF")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], RED));

    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()?;
    root.present()?;
    println!("Result has been saved to {path_img}");
    Ok(())
}
