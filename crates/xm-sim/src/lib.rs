//! `xm-sim` — the simulation facade of `rust_xm`.
//!
//! Wires a validated model, the registered transition functions, and a
//! loaded population into a compiled scheduler, then drives it iteration by
//! iteration with observer callbacks and end-of-iteration compaction.
//!
//! # Typical flow
//!
//! ```rust,ignore
//! let model = xm_io::parse_model_file(&model_path)?;
//! let mut sim = Simulation::new(model)?;
//! sim.register_transition("Circle", "move", circle_move);
//! let mut reader = XmlPopReader::new(sim.schema());
//! sim.load_population(&mut *reader_for_path(&pop_path, sim.schema()), &pop_path)?;
//! sim.set_output(make_sink(OutputFormat::Xml, &out_dir, ""));
//! sim.compile(SimConfig::default())?;
//! sim.run(100, &mut NoopObserver)?;
//! ```

pub mod error;
pub mod observer;
pub mod sim;

#[cfg(test)]
mod tests;

// ── Re-exports ────────────────────────────────────────────────────────────────

pub use error::{SimError, SimResult};
pub use observer::{NoopObserver, SimObserver};
pub use sim::{SimConfig, Simulation};
