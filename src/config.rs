use std::time::Duration;

use clap::Parser;

use crate::error::{IngestError, Result};
use crate::registry::SensorRegistry;

/// Local port for listening to incoming sensor data.
pub const DEFAULT_LISTEN_PORT: u16 = 8888;

const MEASUREMENT_PREFIX: &str = "sensor_outputs_test_";

#[derive(Debug, Parser)]
#[clap(
    name = "sensor-ingest",
    version,
    about = "Collects UDP sensor broadcasts into InfluxDB for a timed test run"
)]
pub struct Args {
    /// Identifier of the test run; selects the target measurement
    #[clap(long, env = "TEST_ID")]
    pub test_id: u32,

    /// How long to listen for sensor broadcasts, in seconds
    #[clap(long, env = "EXECUTION_TIME")]
    pub execution_time: u64,

    /// Allowed sensor endpoints as ip:port
    #[clap(long, env = "SENSORS", value_delimiter = ',', num_args = 1.., required = true)]
    pub sensors: Vec<String>,

    /// Local UDP port to listen on
    #[clap(long, env = "LISTEN_PORT", default_value_t = DEFAULT_LISTEN_PORT)]
    pub listen_port: u16,

    /// InfluxDB endpoint
    #[clap(long, env = "INFLUX_URL", default_value = "http://localhost:8086")]
    pub influx_url: String,

    /// InfluxDB database the run writes into
    #[clap(long, env = "INFLUX_DATABASE", default_value = "dms_influx_db")]
    pub database: String,
}

/// One bounded-duration listening session.
#[derive(Debug, Clone)]
pub struct TestRun {
    pub test_id: u32,
    pub measurement: String,
    pub execution_duration: Duration,
}

/// Resolved process configuration. Constructed once, shared read-only.
#[derive(Debug)]
pub struct Config {
    pub run: TestRun,
    pub registry: SensorRegistry,
    pub listen_port: u16,
    pub influx_url: String,
    pub database: String,
}

impl Config {
    pub fn resolve(args: Args) -> Result<Self> {
        if args.execution_time == 0 {
            return Err(IngestError::Config(
                "execution time must be strictly positive".into(),
            ));
        }
        let registry = SensorRegistry::from_specs(&args.sensors)?;
        let run = TestRun {
            test_id: args.test_id,
            measurement: format!("{MEASUREMENT_PREFIX}{}", args.test_id),
            execution_duration: Duration::from_secs(args.execution_time),
        };
        Ok(Self {
            run,
            registry,
            listen_port: args.listen_port,
            influx_url: args.influx_url,
            database: args.database,
        })
    }
}
