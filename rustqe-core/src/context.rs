//! Context tags that parameterize quantities.
//!
//! A quantity may be instantiated once per run kind, once per beam monitor,
//! once per detector bank, or any combination. A [`Context`] carries the
//! tags of one instantiation; unset axes are `None`.

use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Kind of measurement a quantity belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum RunKind {
    Sample,
    Background,
}

impl fmt::Display for RunKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sample => f.write_str("sample"),
            Self::Background => f.write_str("background"),
        }
    }
}

/// Detector bank identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BankId(pub u32);

/// Beam monitor identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MonitorId(pub u32);

/// Axis along which a quantity can be parameterized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Axis {
    Run,
    Monitor,
    Bank,
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Run => f.write_str("run"),
            Self::Monitor => f.write_str("monitor"),
            Self::Bank => f.write_str("bank"),
        }
    }
}

/// Value of one axis tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AxisValue {
    Run(RunKind),
    Monitor(MonitorId),
    Bank(BankId),
}

impl AxisValue {
    #[must_use]
    pub fn axis(self) -> Axis {
        match self {
            Self::Run(_) => Axis::Run,
            Self::Monitor(_) => Axis::Monitor,
            Self::Bank(_) => Axis::Bank,
        }
    }
}

impl From<RunKind> for AxisValue {
    fn from(value: RunKind) -> Self {
        Self::Run(value)
    }
}

impl From<MonitorId> for AxisValue {
    fn from(value: MonitorId) -> Self {
        Self::Monitor(value)
    }
}

impl From<BankId> for AxisValue {
    fn from(value: BankId) -> Self {
        Self::Bank(value)
    }
}

/// Tags identifying one instantiation of a quantity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Context {
    pub run: Option<RunKind>,
    pub monitor: Option<MonitorId>,
    pub bank: Option<BankId>,
}

impl Context {
    /// Context with no tags set.
    pub const GLOBAL: Self = Self {
        run: None,
        monitor: None,
        bank: None,
    };

    #[must_use]
    pub fn for_run(run: RunKind) -> Self {
        Self::GLOBAL.with_run(run)
    }

    #[must_use]
    pub fn with_run(mut self, run: RunKind) -> Self {
        self.run = Some(run);
        self
    }

    #[must_use]
    pub fn with_monitor(mut self, monitor: MonitorId) -> Self {
        self.monitor = Some(monitor);
        self
    }

    #[must_use]
    pub fn with_bank(mut self, bank: BankId) -> Self {
        self.bank = Some(bank);
        self
    }

    /// Sets the tag for the value's axis.
    #[must_use]
    pub fn with(mut self, value: AxisValue) -> Self {
        match value {
            AxisValue::Run(run) => self.run = Some(run),
            AxisValue::Monitor(monitor) => self.monitor = Some(monitor),
            AxisValue::Bank(bank) => self.bank = Some(bank),
        }
        self
    }

    #[must_use]
    pub fn get(&self, axis: Axis) -> Option<AxisValue> {
        match axis {
            Axis::Run => self.run.map(AxisValue::Run),
            Axis::Monitor => self.monitor.map(AxisValue::Monitor),
            Axis::Bank => self.bank.map(AxisValue::Bank),
        }
    }

    #[must_use]
    pub fn has(&self, axis: Axis) -> bool {
        self.get(axis).is_some()
    }

    /// Keeps only the tags on `axes`, clearing every other axis.
    #[must_use]
    pub fn project(&self, axes: &[Axis]) -> Self {
        let mut out = Self::GLOBAL;
        for &axis in axes {
            if let Some(value) = self.get(axis) {
                out = out.with(value);
            }
        }
        out
    }
}

impl fmt::Display for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::with_capacity(3);
        if let Some(run) = self.run {
            parts.push(format!("run={run}"));
        }
        if let Some(MonitorId(id)) = self.monitor {
            parts.push(format!("monitor={id}"));
        }
        if let Some(BankId(id)) = self.bank {
            parts.push(format!("bank={id}"));
        }
        if parts.is_empty() {
            f.write_str("global")
        } else {
            f.write_str(&parts.join(", "))
        }
    }
}
