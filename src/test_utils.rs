use crate::app_state::{AppState, SharedAppState};
use crate::cli::CommandLineArgs;
use crate::dataset::{
    Attribute, AttributeValue, Dataset, DatasetError, Dimension, MemoryDataset, VariableInfo,
};

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

use clap::Parser;

static REGISTER_METRICS: Once = Once::new();

/// Register the Prometheus metrics, which may only be done once per process.
pub(crate) fn register_metrics() {
    REGISTER_METRICS.call_once(crate::metrics::register_metrics);
}

pub(crate) const TIME_SIZE: usize = 8;
pub(crate) const Z_SIZE: usize = 1;
pub(crate) const Y_SIZE: usize = 27;
pub(crate) const X_SIZE: usize = 36;

/// Value of the test concentration field at `(t, z, i, j)`.
pub(crate) fn fixture_value(t: usize, z: usize, i: usize, j: usize) -> f64 {
    (((t * Z_SIZE + z) * Y_SIZE + i) * X_SIZE + j) as f64 * 0.25
}

pub(crate) fn x_value(j: usize) -> f64 {
    -1750.0 + 100.0 * j as f64
}

pub(crate) fn y_value(i: usize) -> f64 {
    -1300.0 + 100.0 * i as f64
}

fn text(value: &str) -> AttributeValue {
    AttributeValue::Text(value.to_string())
}

/// Create a dataset shaped like a plume dispersion time series.
pub(crate) fn get_test_dataset() -> MemoryDataset {
    let mut concentration = Vec::with_capacity(TIME_SIZE * Z_SIZE * Y_SIZE * X_SIZE);
    for t in 0..TIME_SIZE {
        for z in 0..Z_SIZE {
            for i in 0..Y_SIZE {
                for j in 0..X_SIZE {
                    concentration.push(fixture_value(t, z, i, j));
                }
            }
        }
    }
    MemoryDataset::new()
        .with_dimension("time", TIME_SIZE)
        .with_dimension("z", Z_SIZE)
        .with_dimension("y", Y_SIZE)
        .with_dimension("x", X_SIZE)
        .with_variable(
            "time",
            &["time"],
            (0..TIME_SIZE).map(|t| (t * 3600) as f64).collect(),
        )
        .unwrap()
        .with_variable("z", &["z"], vec![2.0])
        .unwrap()
        .with_variable("y", &["y"], (0..Y_SIZE).map(y_value).collect())
        .unwrap()
        .with_variable("x", &["x"], (0..X_SIZE).map(x_value).collect())
        .unwrap()
        .with_variable("concentration", &["time", "z", "y", "x"], concentration)
        .unwrap()
        .with_variable_attribute("time", "units", text("seconds"))
        .unwrap()
        .with_variable_attribute("x", "units", text("m"))
        .unwrap()
        .with_variable_attribute("y", "units", text("m"))
        .unwrap()
        .with_variable_attribute("concentration", "units", text("kg m-3"))
        .unwrap()
        .with_variable_attribute("concentration", "long_name", text("Concentration"))
        .unwrap()
        .with_variable_attribute(
            "concentration",
            "_FillValue",
            AttributeValue::Doubles(vec![-999.0]),
        )
        .unwrap()
        .with_global_attribute("id", text("1"))
        .with_global_attribute("event_name", text("ContinuousEvent"))
        .with_global_attribute("agent", AttributeValue::Ints(vec![1]))
        .with_global_attribute("release_height", AttributeValue::Floats(vec![2.5]))
}

/// A bounded read recorded by [CountingDataset].
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct BoundedRead {
    pub variable: String,
    pub origin: Vec<usize>,
    pub extent: Vec<usize>,
}

/// Wraps a [MemoryDataset], recording how it is accessed.
pub(crate) struct CountingDataset {
    inner: MemoryDataset,
    /// Delay added to each `variables` call
    delay: Duration,
    reads: Mutex<Vec<BoundedRead>>,
    variables_calls: AtomicUsize,
    touches: AtomicUsize,
}

impl CountingDataset {
    pub fn new(inner: MemoryDataset) -> Self {
        Self {
            inner,
            delay: Duration::ZERO,
            reads: Mutex::new(vec![]),
            variables_calls: AtomicUsize::new(0),
            touches: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Bounded reads performed so far, in order.
    pub fn reads(&self) -> Vec<BoundedRead> {
        self.reads.lock().unwrap().clone()
    }

    /// Number of calls to `variables`.
    pub fn variables_calls(&self) -> usize {
        self.variables_calls.load(Ordering::SeqCst)
    }

    /// Number of calls to any method.
    pub fn touches(&self) -> usize {
        self.touches.load(Ordering::SeqCst)
    }

    fn touch(&self) {
        self.touches.fetch_add(1, Ordering::SeqCst);
    }
}

impl Dataset for CountingDataset {
    fn dimensions(&self) -> Vec<Dimension> {
        self.touch();
        self.inner.dimensions()
    }

    fn variables(&self) -> Result<Vec<VariableInfo>, DatasetError> {
        self.touch();
        self.variables_calls.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(self.delay);
        self.inner.variables()
    }

    fn global_attributes(&self) -> Result<Vec<Attribute>, DatasetError> {
        self.touch();
        self.inner.global_attributes()
    }

    fn shape(&self, variable: &str) -> Result<Vec<usize>, DatasetError> {
        self.touch();
        self.inner.shape(variable)
    }

    fn read_bounded(
        &self,
        variable: &str,
        origin: &[usize],
        extent: &[usize],
    ) -> Result<Vec<f64>, DatasetError> {
        self.touch();
        self.reads.lock().unwrap().push(BoundedRead {
            variable: variable.to_string(),
            origin: origin.to_vec(),
            extent: extent.to_vec(),
        });
        self.inner.read_bounded(variable, origin, extent)
    }
}

/// Command line arguments with default values and rendered images written to `artifact_dir`.
pub(crate) fn get_test_args(artifact_dir: &Path) -> CommandLineArgs {
    let mut args = CommandLineArgs::parse_from(["ncserve"]);
    args.artifact_dir = artifact_dir.to_string_lossy().into_owned();
    args.render_poll_interval_ms = 10;
    args
}

/// Application state serving `dataset`.
pub(crate) fn get_test_state(artifact_dir: &Path, dataset: Arc<dyn Dataset>) -> SharedAppState {
    Arc::new(AppState::new(&get_test_args(artifact_dir), dataset))
}
