//! Reduction workflow expressed as a quantity graph.
//!
//! Instrument-wide quantities (source, choppers, lookup table, beamline)
//! carry no context. Rotation angles vary per run, pixel lists per bank,
//! and events per run and bank. [`RunEvents`] reduces the bank axis.
//!
//! ```no_run
//! use rustqe_kinematics::workflow::{self, BankPixels, RawEvents, Rotation, RunEvents};
//! use rustqe_kinematics::{ConversionSettings, PrimaryBeamline, RotationState};
//! use rustqe_graph::{BankId, Context, Pipeline, RunKind};
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! # let config = rustqe_tof::TofConfig::from_file("instrument.json")?;
//! let mut pipeline = Pipeline::new();
//! workflow::register(&mut pipeline);
//! workflow::set_instrument(&mut pipeline, &config, PrimaryBeamline::new(160.0));
//! pipeline.set_param::<workflow::Settings>(ConversionSettings::default());
//! pipeline.set_runs([RunKind::Sample]);
//! pipeline.set_banks([BankId(0)]);
//! pipeline.set_param_for::<Rotation>(Context::for_run(RunKind::Sample), RotationState::new(0.0, 30.0));
//! # pipeline.set_param_for::<BankPixels>(Context::GLOBAL.with_bank(BankId(0)), Vec::new());
//! # pipeline.set_param_for::<RawEvents>(Context::for_run(RunKind::Sample).with_bank(BankId(0)), Default::default());
//! let run = pipeline.compute::<RunEvents>(Context::for_run(RunKind::Sample))?;
//! println!("{} events", run.len());
//! # Ok(())
//! # }
//! ```

use crate::error::Result;
use crate::geometry::{DetectorPixel, RotationState, SecondaryGeometry};
use crate::primary::PrimaryBeamline;
use crate::processing::{
    convert_bank, convert_monitor, BankConversion, ConversionContext, ConversionSettings,
    MonitorConversion, RunConversion,
};
use rustqe_core::EventBatch;
use rustqe_graph::{quantity, Inputs, Pipeline, Provider};
use rustqe_tof::{
    build_lookup_table, simulate, ChopperCascade, DiskChopper, FrameUnwrapper, LookupTable,
    SimulatedNeutrons, SimulationSettings, SourceModel, TableCoverage, TableSettings, TofConfig,
};
use std::collections::BTreeMap;

quantity!(
    /// Pulsed source.
    pub SourceParams: SourceModel
);
quantity!(pub ChopperParams: Vec<DiskChopper>);
quantity!(pub SimulationParams: SimulationSettings);
quantity!(pub TableParams: TableSettings);
quantity!(
    /// Neutrons that passed the chopper cascade.
    pub SimulatedBeam: SimulatedNeutrons
);
quantity!(pub TofTable: LookupTable);
quantity!(pub Coverage: TableCoverage);
quantity!(pub Unwrapper: FrameUnwrapper);
quantity!(pub Beamline: PrimaryBeamline);
quantity!(pub Settings: ConversionSettings);
quantity!(
    /// Sample-table and tank angles of a run.
    pub Rotation: RotationState, [Run]
);
quantity!(
    /// Pixels of a bank in the tank frame.
    pub BankPixels: Vec<DetectorPixel>, [Bank]
);
quantity!(pub BankGeometry: SecondaryGeometry, [Run, Bank]);
quantity!(
    /// Detector events as recorded, frame-relative.
    pub RawEvents: EventBatch, [Run, Bank]
);
quantity!(pub ConvertedEvents: BankConversion, [Run, Bank]);
quantity!(
    /// Every bank of a run.
    pub RunEvents: RunConversion, [Run]
);
quantity!(
    /// Source-to-monitor distance, m.
    pub MonitorDistance: f64, [Monitor]
);
quantity!(pub RawMonitor: EventBatch, [Run, Monitor]);
quantity!(pub MonitorSpectrum: MonitorConversion, [Run, Monitor]);

/// Registers every provider of the workflow.
pub fn register(pipeline: &mut Pipeline) {
    pipeline.insert(
        Provider::output::<SimulatedBeam>()
            .input::<SourceParams>()
            .input::<ChopperParams>()
            .input::<SimulationParams>()
            .compute(simulated_beam),
    );
    pipeline.insert(
        Provider::output::<TofTable>()
            .input::<SimulatedBeam>()
            .input::<SourceParams>()
            .input::<TableParams>()
            .compute(tof_table),
    );
    pipeline.insert(
        Provider::output::<Coverage>()
            .input::<TofTable>()
            .compute(|inputs: &Inputs<'_>| -> Result<TableCoverage> {
                Ok(inputs.get::<TofTable>()?.coverage())
            }),
    );
    pipeline.insert(
        Provider::output::<Unwrapper>()
            .input::<TofTable>()
            .compute(|inputs: &Inputs<'_>| -> Result<FrameUnwrapper> {
                Ok(FrameUnwrapper::new(inputs.get::<TofTable>()?))
            }),
    );
    pipeline.insert(
        Provider::output::<BankGeometry>()
            .input::<BankPixels>()
            .input::<Rotation>()
            .compute(|inputs: &Inputs<'_>| -> Result<SecondaryGeometry> {
                let pixels = inputs.get::<BankPixels>()?;
                let rotation = inputs.get::<Rotation>()?;
                SecondaryGeometry::build(&pixels, rotation.a4_deg)
            }),
    );
    pipeline.insert(
        Provider::output::<ConvertedEvents>()
            .input::<RawEvents>()
            .input::<BankGeometry>()
            .input::<Beamline>()
            .input::<Rotation>()
            .input::<Unwrapper>()
            .input::<Settings>()
            .compute(converted_events),
    );
    pipeline.insert(
        Provider::output::<RunEvents>()
            .input::<ConvertedEvents>()
            .compute(|inputs: &Inputs<'_>| -> Result<RunConversion> {
                let banks: BTreeMap<_, _> = inputs
                    .all::<ConvertedEvents>()?
                    .into_iter()
                    .filter_map(|(context, bank)| context.bank.map(|id| (id, bank)))
                    .collect();
                Ok(RunConversion { banks })
            }),
    );
    pipeline.insert(
        Provider::output::<MonitorSpectrum>()
            .input::<RawMonitor>()
            .input::<MonitorDistance>()
            .input::<Unwrapper>()
            .compute(|inputs: &Inputs<'_>| -> Result<MonitorConversion> {
                let events = inputs.get::<RawMonitor>()?;
                let distance = inputs.get::<MonitorDistance>()?;
                convert_monitor(&events, *distance, &*inputs.get::<Unwrapper>()?)
            }),
    );
}

/// Sets the instrument-wide parameters from a table configuration and the
/// primary beamline.
pub fn set_instrument(pipeline: &mut Pipeline, config: &TofConfig, beamline: PrimaryBeamline) {
    pipeline.set_param::<SourceParams>(config.source.clone());
    pipeline.set_param::<ChopperParams>(config.choppers.clone());
    pipeline.set_param::<SimulationParams>(config.simulation);
    pipeline.set_param::<TableParams>(config.table);
    pipeline.set_param::<Beamline>(beamline);
}

fn simulated_beam(inputs: &Inputs<'_>) -> Result<SimulatedNeutrons> {
    let source = inputs.get::<SourceParams>()?;
    let cascade = ChopperCascade::new(inputs.get::<ChopperParams>()?.to_vec())?;
    let settings = inputs.get::<SimulationParams>()?;
    Ok(simulate(&source, &cascade, &settings)?)
}

fn tof_table(inputs: &Inputs<'_>) -> Result<LookupTable> {
    let neutrons = inputs.get::<SimulatedBeam>()?;
    let source = inputs.get::<SourceParams>()?;
    let settings = inputs.get::<TableParams>()?;
    Ok(build_lookup_table(&neutrons, source.period_ns(), &settings)?)
}

fn converted_events(inputs: &Inputs<'_>) -> Result<BankConversion> {
    let events = inputs.get::<RawEvents>()?;
    let geometry = inputs.get::<BankGeometry>()?;
    let beamline = inputs.get::<Beamline>()?;
    let rotation = inputs.get::<Rotation>()?;
    let unwrapper = inputs.get::<Unwrapper>()?;
    let settings = inputs.get::<Settings>()?;
    let context = ConversionContext {
        geometry: &geometry,
        beamline: &beamline,
        rotation: &rotation,
        unwrapper: &unwrapper,
        settings: &settings,
    };
    convert_bank(&events, &context)
}
