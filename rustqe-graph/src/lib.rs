//! rustqe-graph: Declarative quantity graph for reduction workflows.
//!
//! Physical quantities are declared as marker types implementing
//! [`Quantity`]. Each is either supplied as a parameter or produced by a
//! [`Provider`] from other quantities. A [`Pipeline`] resolves the providers
//! needed for a request, orders them, and runs each exactly once per
//! distinct context (run kind, monitor, detector bank).
//!
//! # Context axes
//!
//! For every declared input the pipeline compares the input's axes with the
//! output's:
//!
//! - axes on both are threaded (the input is taken at the same tag),
//! - axes only on the output are broadcast (one input serves all tags),
//! - axes only on the input are reduced (the provider receives the input
//!   for every tag in the pipeline's domain for that axis).
//!
//! # Example
//!
//! ```
//! use rustqe_graph::{quantity, GraphError, Inputs, Pipeline, Provider};
//!
//! quantity!(Length: f64);
//! quantity!(Area: f64);
//!
//! fn area(inputs: &Inputs<'_>) -> Result<f64, GraphError> {
//!     let side = inputs.get::<Length>()?;
//!     Ok(*side * *side)
//! }
//!
//! let mut pipeline = Pipeline::new();
//! pipeline.insert(Provider::output::<Area>().input::<Length>().compute(area));
//! pipeline.set_param::<Length>(3.0);
//! assert_eq!(*pipeline.compute_global::<Area>().unwrap(), 9.0);
//! ```

mod error;
mod pipeline;
mod provider;
mod quantity;

pub use error::{BoxError, GraphError, Result};
pub use pipeline::{Domains, Pipeline, Plan};
pub use provider::{Inputs, Provider, ProviderBuilder};
pub use quantity::{NodeKey, Quantity};

// Re-export context types used to parameterize quantities
pub use rustqe_core::context::{Axis, AxisValue, BankId, Context, MonitorId, RunKind};
