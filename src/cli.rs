//! Command Line Interface (CLI) arguments.

use clap::Parser;

/// ncserve command line interface
#[derive(Clone, Debug, Parser)]
pub struct CommandLineArgs {
    /// The IP address on which the server should listen
    #[arg(long, default_value = "0.0.0.0", env = "NCSERVE_HOST")]
    pub host: String,
    /// The port to which the server should bind
    #[arg(long, default_value_t = 18080, env = "NCSERVE_PORT")]
    pub port: u16,
    /// Flag indicating whether HTTPS should be used
    #[arg(long, default_value_t = false, env = "NCSERVE_HTTPS")]
    pub https: bool,
    /// Path to the certificate file to be used for HTTPS encryption
    #[arg(
        long,
        default_value = "~/.config/ncserve/certs/cert.pem",
        env = "NCSERVE_CERT_FILE"
    )]
    pub cert_file: String,
    /// Path to the key file to be used for HTTPS encryption
    #[arg(
        long,
        default_value = "~/.config/ncserve/certs/key.pem",
        env = "NCSERVE_KEY_FILE"
    )]
    pub key_file: String,
    /// Maximum time in seconds to wait for requests to complete upon receiving `ctrl+c` signal.
    #[arg(long, default_value_t = 60, env = "NCSERVE_SHUTDOWN_TIMEOUT")]
    pub graceful_shutdown_timeout: u64,
    /// Path to the dataset. Files ending in `.json` are loaded into memory, anything else is
    /// opened as netCDF.
    #[arg(
        long,
        default_value = "data/concentration.timeseries.nc",
        env = "NCSERVE_DATASET"
    )]
    pub dataset: String,
    /// Name of the 4-D (time, z, y, x) variable served by slice requests
    #[arg(long, default_value = "concentration", env = "NCSERVE_FIELD_VARIABLE")]
    pub field_variable: String,
    /// Name of the x coordinate variable
    #[arg(long, default_value = "x", env = "NCSERVE_X_VARIABLE")]
    pub x_variable: String,
    /// Name of the y coordinate variable
    #[arg(long, default_value = "y", env = "NCSERVE_Y_VARIABLE")]
    pub y_variable: String,
    /// Name of the dimension indexed by the `time` query parameter
    #[arg(long, default_value = "time", env = "NCSERVE_TIME_DIMENSION")]
    pub time_dimension: String,
    /// Name of the dimension indexed by the `z` query parameter
    #[arg(long, default_value = "z", env = "NCSERVE_Z_DIMENSION")]
    pub z_dimension: String,
    /// Directory in which rendered images are written before being returned
    #[arg(long, default_value = "assets", env = "NCSERVE_ARTIFACT_DIR")]
    pub artifact_dir: String,
    /// File name prefix of rendered images
    #[arg(long, default_value = "output_", env = "NCSERVE_ARTIFACT_PREFIX")]
    pub artifact_prefix: String,
    /// Interval in milliseconds between checks for a rendered image
    #[arg(
        long,
        default_value_t = 100,
        env = "NCSERVE_RENDER_POLL_INTERVAL_MS",
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub render_poll_interval_ms: u64,
    /// Maximum time in milliseconds to wait for a rendered image
    #[arg(long, default_value_t = 2000, env = "NCSERVE_RENDER_TIMEOUT_MS")]
    pub render_timeout_ms: u64,
    /// Maximum number of concurrent renders. Defaults to the number of CPUs.
    #[arg(
        long,
        env = "NCSERVE_RENDER_LIMIT",
        value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..)
    )]
    pub render_limit: Option<usize>,
    /// Whether to use Rayon for execution of CPU-bound tasks.
    #[arg(long, default_value_t = false, env = "NCSERVE_USE_RAYON")]
    pub use_rayon: bool,
    /// Whether to remove images left behind by a previous run at startup.
    #[arg(
        long,
        default_value_t = true,
        action = clap::ArgAction::Set,
        env = "NCSERVE_SWEEP_ARTIFACTS"
    )]
    pub sweep_artifacts: bool,
}

/// Returns parsed command line arguments.
pub fn parse() -> CommandLineArgs {
    CommandLineArgs::parse()
}
