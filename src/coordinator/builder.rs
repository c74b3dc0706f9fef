use super::{CommandHandler, Coordinator, Parts};
use crate::{
    gateway::RequestGateway,
    hal::{CommandSink, Sensors},
    motion::LinearMotionProfileGenerator,
    safety::SafetyMonitor,
    transition::{StateMonitor, TransitionValidator},
    Config, Error, Result,
};
use embedded_time::Clock;
use tracing::{error, info};

pub struct Builder<C> {
    clock: Option<C>,
    safety: Option<Box<dyn SafetyMonitor>>,
    gateway: Option<Box<dyn RequestGateway>>,
    validator: Option<Box<dyn TransitionValidator>>,
    sensors: Option<Box<dyn Sensors>>,
    sink: Option<Box<dyn CommandSink>>,
    config: Option<Config>,
}

impl<C> Default for Builder<C> {
    fn default() -> Self {
        Self {
            clock: None,
            safety: None,
            gateway: None,
            validator: None,
            sensors: None,
            sink: None,
            config: None,
        }
    }
}

impl<C> Builder<C>
where
    C: Clock + Send + 'static,
    u64: TryFrom<C::T>,
{
    pub fn clock(mut self, clock: C) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn safety<S>(mut self, safety: S) -> Self
    where
        S: SafetyMonitor + 'static,
    {
        self.safety = Some(Box::new(safety));
        self
    }

    pub fn gateway<G>(mut self, gateway: G) -> Self
    where
        G: RequestGateway + 'static,
    {
        self.gateway = Some(Box::new(gateway));
        self
    }

    /// Replace the default [`StateMonitor`] validator.
    pub fn validator<V>(mut self, validator: V) -> Self
    where
        V: TransitionValidator + 'static,
    {
        self.validator = Some(Box::new(validator));
        self
    }

    pub fn sensors<S>(mut self, sensors: S) -> Self
    where
        S: Sensors + 'static,
    {
        self.sensors = Some(Box::new(sensors));
        self
    }

    pub fn sink<K>(mut self, sink: K) -> Self
    where
        K: CommandSink + 'static,
    {
        self.sink = Some(Box::new(sink));
        self
    }

    pub fn config(mut self, config: Config) -> Self {
        self.config = Some(config);
        self
    }

    /// Validate the configuration and bring the coordinator up.
    ///
    /// Waits for the request gateway and forms the safety bond before the
    /// control loop can run. A failed bond is fatal.
    pub async fn build(self) -> Result<Coordinator<C>> {
        let config = required(self.config, "config")?;
        config.validate()?;
        let generator = LinearMotionProfileGenerator::new(config.profile())?;

        let clock = required(self.clock, "clock")?;
        let mut safety = required(self.safety, "safety monitor")?;
        let mut gateway = required(self.gateway, "request gateway")?;
        let sensors = required(self.sensors, "sensors")?;
        let sink = required(self.sink, "command sink")?;
        let validator = match self.validator {
            Some(validator) => validator,
            None => Box::new(StateMonitor::new()) as Box<dyn TransitionValidator>,
        };

        info!("waiting for the request gateway");
        gateway.wait_until_ready().await;

        info!("forming bond with the safety monitor");
        if !safety.form_bond().await {
            error!("could not form bond with the safety monitor");
            return Err(Error::SafetyBond);
        }
        info!("safety bond formed");

        Ok(Coordinator::new(Parts {
            clock,
            safety,
            gateway,
            validator,
            sensors,
            commands: CommandHandler::new(generator, sink),
            update_period: config.update_period()?,
            task_timeout: config.task_timeout()?,
        }))
    }
}

fn required<T>(value: Option<T>, name: &str) -> Result<T> {
    value.ok_or_else(|| Error::Config(format!("missing {name}")))
}
