//! Quantity declarations and node identities.

use rustqe_core::context::{Axis, Context};
use std::fmt;

/// A named, typed value in the graph.
///
/// Implementors are usually uninhabited marker types declared with
/// [`quantity!`](crate::quantity).
pub trait Quantity: 'static {
    /// Type of the computed value.
    type Value: Send + Sync + 'static;
    /// Unique name, used for node identity and diagnostics.
    const NAME: &'static str;
    /// Context axes the quantity is parameterized by.
    const AXES: &'static [Axis];
}

/// Declares a quantity marker type.
///
/// ```
/// use rustqe_graph::quantity;
///
/// quantity!(
///     /// Counts per detector bank and run.
///     pub BankCounts: Vec<u64>, [Run, Bank]
/// );
/// quantity!(Threshold: f64);
/// ```
#[macro_export]
macro_rules! quantity {
    ($(#[$meta:meta])* $vis:vis $name:ident : $value:ty $(, [$($axis:ident),* $(,)?])? $(,)?) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy)]
        $vis enum $name {}

        impl $crate::Quantity for $name {
            type Value = $value;
            const NAME: &'static str = stringify!($name);
            const AXES: &'static [$crate::Axis] = &[$($($crate::Axis::$axis),*)?];
        }
    };
}

/// Identity of one instantiated quantity: its name and context tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeKey {
    pub quantity: &'static str,
    pub context: Context,
}

impl NodeKey {
    /// Key of `Q` at `context`, keeping only the tags on `Q`'s axes.
    #[must_use]
    pub fn of<Q: Quantity>(context: Context) -> Self {
        Self {
            quantity: Q::NAME,
            context: context.project(Q::AXES),
        }
    }
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.context == Context::GLOBAL {
            f.write_str(self.quantity)
        } else {
            write!(f, "{}[{}]", self.quantity, self.context)
        }
    }
}
