//! Providers: pure functions from declared inputs to one output quantity.

use crate::error::{BoxError, GraphError, Result};
use crate::quantity::{NodeKey, Quantity};
use rustqe_core::context::{Axis, Context};
use std::any::Any;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

/// Type-erased node value.
pub(crate) type Value = Arc<dyn Any + Send + Sync>;

type ComputeFn = dyn Fn(&Inputs<'_>) -> std::result::Result<Value, BoxError> + Send + Sync;

/// A declared input of a provider.
#[derive(Debug, Clone, Copy)]
pub(crate) struct InputSpec {
    pub(crate) quantity: &'static str,
    pub(crate) axes: &'static [Axis],
}

impl InputSpec {
    /// Axes of this input that the output does not carry.
    pub(crate) fn reduced_axes(&self, output_axes: &[Axis]) -> Vec<Axis> {
        self.axes
            .iter()
            .copied()
            .filter(|axis| !output_axes.contains(axis))
            .collect()
    }

    /// Axes of this input that the output carries.
    pub(crate) fn threaded_axes(&self, output_axes: &[Axis]) -> Vec<Axis> {
        self.axes
            .iter()
            .copied()
            .filter(|axis| output_axes.contains(axis))
            .collect()
    }
}

/// Produces one quantity from its declared inputs.
pub struct Provider {
    pub(crate) output: &'static str,
    pub(crate) output_axes: &'static [Axis],
    pub(crate) inputs: Vec<InputSpec>,
    compute: Box<ComputeFn>,
}

impl Provider {
    /// Starts declaring a provider for `Q`.
    #[must_use]
    pub fn output<Q: Quantity>() -> ProviderBuilder<Q> {
        ProviderBuilder {
            inputs: Vec::new(),
            _output: PhantomData,
        }
    }

    /// Name of the produced quantity.
    #[must_use]
    pub fn output_name(&self) -> &'static str {
        self.output
    }

    /// Names of the declared inputs, in declaration order.
    #[must_use]
    pub fn input_names(&self) -> Vec<&'static str> {
        self.inputs.iter().map(|input| input.quantity).collect()
    }

    pub(crate) fn run(&self, inputs: &Inputs<'_>) -> std::result::Result<Value, BoxError> {
        (self.compute)(inputs)
    }
}

impl std::fmt::Debug for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Provider")
            .field("output", &self.output)
            .field("inputs", &self.input_names())
            .finish_non_exhaustive()
    }
}

/// Builder returned by [`Provider::output`].
pub struct ProviderBuilder<Q: Quantity> {
    inputs: Vec<InputSpec>,
    _output: PhantomData<fn() -> Q>,
}

impl<Q: Quantity> ProviderBuilder<Q> {
    /// Declares an input quantity.
    #[must_use]
    pub fn input<A: Quantity>(mut self) -> Self {
        if !self.inputs.iter().any(|input| input.quantity == A::NAME) {
            self.inputs.push(InputSpec {
                quantity: A::NAME,
                axes: A::AXES,
            });
        }
        self
    }

    /// Finishes the provider with its compute function.
    pub fn compute<F, E>(self, f: F) -> Provider
    where
        F: Fn(&Inputs<'_>) -> std::result::Result<Q::Value, E> + Send + Sync + 'static,
        E: Into<BoxError>,
    {
        Provider {
            output: Q::NAME,
            output_axes: Q::AXES,
            inputs: self.inputs,
            compute: Box::new(
                move |inputs: &Inputs<'_>| -> std::result::Result<Value, BoxError> {
                    match f(inputs) {
                        Ok(value) => Ok(Arc::new(value) as Value),
                        Err(err) => Err(err.into()),
                    }
                },
            ),
        }
    }
}

/// Read access to a provider's declared inputs for one instantiation.
pub struct Inputs<'a> {
    pub(crate) output: &'static str,
    pub(crate) context: Context,
    pub(crate) inputs: &'a [InputSpec],
    /// Dependency keys per declared input, parallel to `inputs`.
    pub(crate) dependencies: &'a [Vec<NodeKey>],
    pub(crate) reduced: &'a [bool],
    pub(crate) values: &'a HashMap<NodeKey, Value>,
}

impl Inputs<'_> {
    /// Context tags of the output being computed.
    #[must_use]
    pub fn context(&self) -> Context {
        self.context
    }

    /// Returns a threaded or broadcast input.
    ///
    /// # Errors
    /// Returns an error if `A` was not declared, is reduced over an axis, or
    /// its value has the wrong type.
    pub fn get<A: Quantity>(&self) -> Result<Arc<A::Value>> {
        let index = self.position::<A>()?;
        if self.reduced[index] {
            return Err(GraphError::ReducedInput {
                quantity: self.output,
                input: A::NAME,
            });
        }
        let key = self.dependencies[index][0];
        self.value::<A>(key)
    }

    /// Returns every instance of an input, with its context.
    ///
    /// For reduced inputs this is one entry per tag in the pipeline domain,
    /// in domain order; otherwise a single entry.
    ///
    /// # Errors
    /// Returns an error if `A` was not declared or a value has the wrong type.
    pub fn all<A: Quantity>(&self) -> Result<Vec<(Context, Arc<A::Value>)>> {
        let index = self.position::<A>()?;
        self.dependencies[index]
            .iter()
            .map(|&key| Ok((key.context, self.value::<A>(key)?)))
            .collect()
    }

    fn position<A: Quantity>(&self) -> Result<usize> {
        self.inputs
            .iter()
            .position(|input| input.quantity == A::NAME)
            .ok_or(GraphError::UndeclaredInput {
                quantity: self.output,
                input: A::NAME,
            })
    }

    fn value<A: Quantity>(&self, key: NodeKey) -> Result<Arc<A::Value>> {
        let value = self
            .values
            .get(&key)
            .cloned()
            .ok_or(GraphError::MissingProvider {
                node: key,
                path: Vec::new(),
            })?;
        downcast::<A>(key, value)
    }
}

pub(crate) fn downcast<A: Quantity>(key: NodeKey, value: Value) -> Result<Arc<A::Value>> {
    value
        .downcast::<A::Value>()
        .map_err(|_| GraphError::TypeMismatch { node: key })
}
