use nalgebra::{Matrix1, Matrix4, Matrix4x1, Vector4};
use plotters::prelude::*;
use std::error::Error;
use std::time::Instant;

extern crate gnc;
use gnc::control::lqr::{LinearModel, LqController, RiccatiForm};
use gnc::utils::deg2rad;

/// [x, x_dot, theta, thetha_dot]
struct InvertedPendulumModel {
    da: Matrix4<f64>,
    db: Matrix4x1<f64>,
}

impl InvertedPendulumModel {
    fn new(l_bar: f64, mass_cart: f64, mass_ball: f64, g: f64) -> InvertedPendulumModel {
        #[rustfmt::skip]
        let da = Matrix4::new(
            0.0, 1.0, 0.0, 0.0,
            0.0, 0.0, mass_ball * g / mass_cart, 0.0,
            0.0, 0.0, 0.0, 1.0,
            0.0, 0.0, g * (mass_cart + mass_ball) / (l_bar * mass_cart), 0.0
        );

        let db = Matrix4x1::new(0.0, 1.0 / mass_cart, 0.0, 1.0 / (l_bar * mass_cart));

        InvertedPendulumModel { da, db }
    }

    fn step(&self, x: &Vector4<f64>, u: f64, dt: f64) -> Vector4<f64> {
        self.a(dt) * x + self.b(dt) * u
    }
}

impl LinearModel<f64, 4, 1> for InvertedPendulumModel {
    fn a(&self, dt: f64) -> Matrix4<f64> {
        Matrix4::identity() + dt * self.da
    }
    fn b(&self, dt: f64) -> Matrix4x1<f64> {
        dt * self.db
    }
}

struct History {
    time: Vec<f64>,
    states: Vec<Vector4<f64>>,
    commands: Vec<f64>,
}

fn run() -> Result<History, Box<dyn Error>> {
    let sim_time = 5.0;
    let dt = 0.05;
    let mut time = 0.;

    let l_bar = 2.0; // length of bar
    let mass_cart = 1.0; // [kg]
    let mass_ball = 0.3; // [kg]
    let g = 9.8; // [m/s^2]

    let model = InvertedPendulumModel::new(l_bar, mass_cart, mass_ball, g);
    let mut controller = LqController::new(
        Matrix4::from_diagonal(&Vector4::new(10.0, 1.0, 10.0, 1.0)),
        Matrix1::new(0.001),
    )?;

    // the linearization does not change, the gain is derived once
    let start = Instant::now();
    let status = controller.update_from_linear_model(&model, dt, RiccatiForm::Recursive)?;
    log::info!("riccati solve {status:?} in {:?}", start.elapsed());
    log::debug!("L = {}", controller.gain());

    let mut x = Vector4::new(0.0, 0.0, deg2rad(-10.0), 0.0);
    let x_goal = Vector4::new(1.0, 0.0, 0.0, 0.0);

    let mut history = History {
        time: vec![time],
        states: vec![x],
        commands: vec![0.0],
    };
    while time < sim_time {
        time += dt;
        let u = controller.control_signal_to(&x, &x_goal).x;
        x = model.step(&x, u, dt);

        history.time.push(time);
        history.states.push(x);
        history.commands.push(u);
    }
    Ok(history)
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let history = run()?;

    // Create output directory if it didnt exist
    std::fs::create_dir_all("./img")?;

    let path_img = "./img/lqr.png";
    let root = BitMapBackend::new(path_img, (1024, 768)).into_drawing_area();
    root.fill(&WHITE)?;
    let mut chart = ChartBuilder::on(&root)
        .margin(10)
        .caption("Linear Quadratic Regulator (LQR)", ("sans-serif", 40))
        .x_label_area_size(30)
        .y_label_area_size(30)
        .build_cartesian_2d(0.0..5.0, -2.0..2.0)?;
    chart.configure_mesh().draw()?;

    let curves: [(&str, usize, RGBColor); 4] = [
        ("x", 0, BLUE),
        ("x dot", 1, CYAN),
        ("theta", 2, RED),
        ("theta dot", 3, MAGENTA),
    ];
    for (label, row, color) in curves {
        chart
            .draw_series(LineSeries::new(
                history
                    .time
                    .iter()
                    .zip(history.states.iter())
                    .map(|(t, s)| (*t, s[row])),
                &color,
            ))?
            .label(label)
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color));
    }
    chart
        .draw_series(LineSeries::new(
            history
                .time
                .iter()
                .zip(history.commands.iter())
                .map(|(t, u)| (*t, u / 10.0)),
            &BLACK,
        ))?
        .label("u / 10")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], BLACK));

    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()?;
    root.present()?;
    println!("Result has been saved to {path_img}");
    Ok(())
}
