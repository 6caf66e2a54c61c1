//! File writers for converted events and monitor spectra.

use crate::Result;
use rustqe_core::{ConvertedBatch, MonitorBatch};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Size of one binary converted-event record.
pub const CONVERTED_RECORD_BYTES: usize = 8 + 4 + 4 + 13 * 8;

/// Writer for converted detector events and monitor spectra.
pub struct ConvertedFileWriter {
    writer: BufWriter<File>,
}

impl ConvertedFileWriter {
    /// Creates a new file writer.
    ///
    /// # Errors
    /// Returns an error if the file cannot be created.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::create(path)?;
        let writer = BufWriter::new(file);
        Ok(Self { writer })
    }

    /// Writes converted events as CSV, one row per event.
    ///
    /// # Errors
    /// Returns an error if writing fails.
    pub fn write_converted_csv(&mut self, events: &ConvertedBatch) -> Result<()> {
        writeln!(
            self.writer,
            "event_index,pixel_id,weight,sample_tof_ns,incident_wavelength_angstrom,\
             incident_energy_mev,final_energy_mev,energy_transfer_mev,\
             qx,qy,qz,qx_table,qy_table,qz_table,a3_deg,a4_deg"
        )?;

        for e in events.iter() {
            writeln!(
                self.writer,
                "{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{}",
                e.event_index,
                e.pixel_id,
                e.weight,
                e.sample_tof_ns,
                e.incident_wavelength_angstrom,
                e.incident_energy_mev,
                e.final_energy_mev,
                e.energy_transfer_mev,
                e.q_lab.x,
                e.q_lab.y,
                e.q_lab.z,
                e.q_sample_table.x,
                e.q_sample_table.y,
                e.q_sample_table.z,
                e.a3_deg,
                e.a4_deg
            )?;
        }

        self.writer.flush()?;
        Ok(())
    }

    /// Writes converted events as little-endian binary records.
    ///
    /// Format per event: u64 (event index) + u32 (pixel id) + f32 (weight)
    /// + 13 f64 (sample TOF, incident wavelength, incident energy, final
    /// energy, energy transfer, lab Q xyz, sample-table Q xyz, a3, a4).
    /// Total: [`CONVERTED_RECORD_BYTES`] bytes per event
    ///
    /// # Errors
    /// Returns an error if writing fails.
    pub fn write_converted_binary(&mut self, events: &ConvertedBatch) -> Result<()> {
        for e in events.iter() {
            self.writer.write_all(&e.event_index.to_le_bytes())?;
            self.writer.write_all(&e.pixel_id.to_le_bytes())?;
            self.writer.write_all(&e.weight.to_le_bytes())?;
            for value in [
                e.sample_tof_ns,
                e.incident_wavelength_angstrom,
                e.incident_energy_mev,
                e.final_energy_mev,
                e.energy_transfer_mev,
                e.q_lab.x,
                e.q_lab.y,
                e.q_lab.z,
                e.q_sample_table.x,
                e.q_sample_table.y,
                e.q_sample_table.z,
                e.a3_deg,
                e.a4_deg,
            ] {
                self.writer.write_all(&value.to_le_bytes())?;
            }
        }

        self.writer.flush()?;
        Ok(())
    }

    /// Writes a monitor spectrum as CSV.
    ///
    /// # Errors
    /// Returns an error if writing fails.
    pub fn write_monitor_csv(&mut self, spectrum: &MonitorBatch) -> Result<()> {
        writeln!(self.writer, "tof_ns,wavelength_angstrom,weight")?;

        for ((tof, wavelength), weight) in spectrum
            .tof_ns
            .iter()
            .zip(&spectrum.wavelength_angstrom)
            .zip(&spectrum.weight)
        {
            writeln!(self.writer, "{tof},{wavelength},{weight}")?;
        }

        self.writer.flush()?;
        Ok(())
    }

    /// Flushes the writer.
    ///
    /// # Errors
    /// Returns an error if flushing fails.
    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rustqe_core::{ConvertedEvent, Vec3};
    use tempfile::NamedTempFile;

    fn event(index: u64, pixel_id: u32) -> ConvertedEvent {
        ConvertedEvent {
            event_index: index,
            pixel_id,
            weight: 1.5,
            sample_tof_ns: 8.0e7,
            incident_wavelength_angstrom: 2.0,
            incident_energy_mev: 20.0,
            final_energy_mev: 3.5,
            energy_transfer_mev: 16.5,
            q_lab: Vec3::new(0.5, 0.0, -1.0),
            q_sample_table: Vec3::new(1.0, 0.0, 0.5),
            a3_deg: -12.5,
            a4_deg: 65.0,
        }
    }

    #[test]
    fn test_write_converted_csv() {
        let file = NamedTempFile::new().unwrap();
        let mut writer = ConvertedFileWriter::create(file.path()).unwrap();

        let mut events = ConvertedBatch::with_capacity(2);
        events.push(&event(0, 7));
        events.push(&event(3, 9));
        writer.write_converted_csv(&events).unwrap();

        let content = std::fs::read_to_string(file.path()).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("event_index,pixel_id,weight"));
        assert!(lines[0].ends_with("qz_table,a3_deg,a4_deg"));
        assert_eq!(lines[2], "3,9,1.5,80000000,2,20,3.5,16.5,0.5,0,-1,1,0,0.5,-12.5,65");
    }

    #[test]
    fn test_write_converted_binary() {
        let file = NamedTempFile::new().unwrap();
        let mut writer = ConvertedFileWriter::create(file.path()).unwrap();

        let mut events = ConvertedBatch::with_capacity(1);
        events.push(&event(42, 9));
        writer.write_converted_binary(&events).unwrap();

        let data = std::fs::read(file.path()).unwrap();
        assert_eq!(data.len(), CONVERTED_RECORD_BYTES);
        assert_eq!(u64::from_le_bytes(data[0..8].try_into().unwrap()), 42);
        assert_eq!(u32::from_le_bytes(data[8..12].try_into().unwrap()), 9);
        let transfer = f64::from_le_bytes(data[48..56].try_into().unwrap());
        assert!((transfer - 16.5).abs() < f64::EPSILON);
        let a3 = f64::from_le_bytes(data[104..112].try_into().unwrap());
        let a4 = f64::from_le_bytes(data[112..120].try_into().unwrap());
        assert!((a3 + 12.5).abs() < f64::EPSILON);
        assert!((a4 - 65.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_write_monitor_csv() {
        let file = NamedTempFile::new().unwrap();
        let mut writer = ConvertedFileWriter::create(file.path()).unwrap();

        let mut spectrum = MonitorBatch::with_capacity(1);
        spectrum.push(6.0e7, 1.5, 2.0);
        writer.write_monitor_csv(&spectrum).unwrap();

        let content = std::fs::read_to_string(file.path()).unwrap();
        assert!(content.contains("tof_ns,wavelength_angstrom,weight"));
        assert!(content.contains("60000000,1.5,2"));
    }
}
