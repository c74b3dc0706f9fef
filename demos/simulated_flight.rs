use core::time::Duration;
use flight_tasks::{
    gateway::{TaskRequest, TaskResult},
    hal::{CommandSink, Sensors, StampedVelocity},
    mock::{MockGateway, MockSafety},
    motion::MotionPlan,
    task::{Land, PositionHold, TaskKind},
    Config, Coordinator,
};
use nalgebra::Vector3;
use std::sync::{Arc, Mutex};
use std_embedded_time::StandardClock;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const CONFIG: &str = r#"
    update_rate = 20.0
    task_timeout = 1.0
    linear_motion_profile_acceleration = 1.0
    linear_motion_profile_duration = 2.0
    linear_motion_profile_timestep = 0.1

    [position_hold]
    max_translation_acceleration = 1.0
    max_translation_speed = 1.5
    translation_position_hold_tolerance = 0.05

    [land]
    descend_rate = 0.6
    cushion_height = 0.5
"#;

/// A point mass that moves at the last commanded velocity.
#[derive(Clone)]
struct Vehicle {
    state: Arc<Mutex<(Vector3<f64>, Vector3<f64>)>>,
    period: f64,
}

impl CommandSink for Vehicle {
    fn publish_velocity(&mut self, velocity: &StampedVelocity) {
        if let Ok(mut state) = self.state.lock() {
            state.1 = velocity.linear;
            state.0 += velocity.linear * self.period;
        }
    }

    fn publish_plan(&mut self, _plan: &MotionPlan) {}
}

impl Sensors for Vehicle {
    fn velocity(&mut self) -> Vector3<f64> {
        self.state.lock().map(|state| state.1).unwrap_or_default()
    }

    fn position(&mut self) -> Vector3<f64> {
        self.state.lock().map(|state| state.0).unwrap_or_default()
    }
}

#[tokio::main]
async fn main() -> flight_tasks::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_toml_str(CONFIG)?;
    let period = config.update_period()?.as_secs_f64();

    let gateway = MockGateway::new();
    let safety = MockSafety::new();
    let vehicle = Vehicle {
        state: Arc::new(Mutex::new((Vector3::new(0., 0., 2.), Vector3::zeros()))),
        period,
    };

    let coordinator = Coordinator::builder()
        .clock(StandardClock::default())
        .safety(safety.clone())
        .gateway(gateway.clone())
        .sensors(vehicle.clone())
        .sink(vehicle.clone())
        .config(config.clone())
        .build()
        .await?;

    let handle = tokio::spawn({
        let coordinator = coordinator.clone();
        async move { coordinator.run().await }
    });

    gateway.push_request(TaskRequest::new(
        TaskKind::HoldPosition,
        PositionHold::at(config.position_hold, period, 1., 0.),
    ));
    tokio::time::sleep(Duration::from_secs(3)).await;
    info!(position = ?vehicle.clone().position(), "holding");

    safety.set_active(true);
    tokio::time::sleep(Duration::from_millis(200)).await;

    let reported = gateway.results().len();
    gateway.push_request(
        TaskRequest::new(TaskKind::Land, Land::new(config.land, period)).with_preempt(true),
    );
    while gateway.results().get(reported) != Some(&TaskResult::Succeeded) {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    info!(position = ?vehicle.clone().position(), "landed");

    coordinator.landing_complete(true).await;
    match handle.await {
        Ok(result) => result,
        Err(error) => panic!("control loop panicked: {error}"),
    }
}
