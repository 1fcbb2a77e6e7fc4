//! An attached emulator with its variable table.
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use ramwatch_core::prelude::*;
//!
//! let table = Arc::new(VariableTable::from_file("variables.json", &SpecialRegistry::with_builtins())?);
//! let process = Arc::new(RamImage::load("ram.bin", 0)?);
//! let mut session = Session::new(process, &SessionConfig::default(), table);
//! session.detect_region();
//!
//! session.set("Mario X", "1200")?;
//! let moved = session.batch(ResolvePolicy::Snapshot, |batch| {
//!     batch.adjust("Mario X", 100.0)?;
//!     batch.adjust("Mario Z", -100.0)
//! })?;
//! ```

use std::f64::consts::TAU;
use std::sync::Arc;

use strum::{Display, EnumString};
use tracing::{debug, info};

use crate::config::SessionConfig;
use crate::context::AccessContext;
use crate::error::Result;
use crate::memory::layout::object;
use crate::memory::{ForeignProcess, MemoryStream};
use crate::region::{self, Region};
use crate::resolve::BaseSnapshot;
use crate::transaction::Transactor;
use crate::variable::{LiveVariable, VariableTable};

/// When a batch re-reads the live bases
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, EnumString, Display)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum ResolvePolicy {
    /// Resolve every step against the bases captured when the batch began
    #[default]
    Snapshot,
    /// Re-read the bases before every step, seeing the batch's own writes
    PerStep,
}

pub struct Session {
    stream: MemoryStream,
    transactor: Transactor,
    region: Region,
    table: Arc<VariableTable>,
}

impl Session {
    pub fn new(
        process: Arc<dyn ForeignProcess>,
        config: &SessionConfig,
        table: Arc<VariableTable>,
    ) -> Self {
        info!(
            "Attached to {} (region {}, RAM at {:#x})",
            process.describe(),
            config.region,
            config.mapping.process_offset
        );
        Self {
            stream: MemoryStream::new(Arc::clone(&process), config.mapping),
            transactor: Transactor::new(process, config.pause_timeout()),
            region: config.region,
            table,
        }
    }

    /// Identify the release from the table's signatures, keeping the
    /// configured region when they do not match
    pub fn detect_region(&mut self) -> Region {
        if let Some(detector) = self.table.detector() {
            self.region = region::detect_region(detector, &self.stream, self.region);
        }
        self.region
    }

    pub fn region(&self) -> Region {
        self.region
    }

    pub fn set_region(&mut self, region: Region) {
        self.region = region;
    }

    pub fn stream(&self) -> &MemoryStream {
        &self.stream
    }

    pub fn transactor(&self) -> &Transactor {
        &self.transactor
    }

    pub fn table(&self) -> &Arc<VariableTable> {
        &self.table
    }

    /// Read the live bases right now
    pub fn snapshot(&self) -> BaseSnapshot {
        self.table.enumerator().snapshot(&self.stream)
    }

    pub fn context<'a>(&'a self, bases: &'a BaseSnapshot) -> AccessContext<'a> {
        AccessContext::new(&self.stream, &self.transactor, self.region, bases)
    }

    pub fn variable(&self, name: &str) -> Result<&Arc<LiveVariable>> {
        self.table.require(name)
    }

    pub fn resolve(&self, name: &str) -> Result<Vec<u64>> {
        let variable = self.variable(name)?;
        Ok(variable.addresses(self.region, &self.snapshot()))
    }

    pub fn get(&self, name: &str) -> Result<Vec<String>> {
        let variable = self.variable(name)?;
        let bases = self.snapshot();
        Ok(variable.get_values(&self.context(&bases), None))
    }

    pub fn set(&self, name: &str, text: &str) -> Result<bool> {
        let variable = self.variable(name)?;
        let bases = self.snapshot();
        variable.set_value(&self.context(&bases), text, None)
    }

    /// Run several steps inside one transaction
    ///
    /// The process stays paused until `f` returns. Steps that fail report
    /// `false` without undoing earlier ones.
    pub fn batch<T, F>(&self, policy: ResolvePolicy, f: F) -> Result<T>
    where
        F: FnOnce(&mut Batch<'_>) -> Result<T>,
    {
        let tx = self.transactor.begin()?;
        let mut batch = Batch {
            session: self,
            policy,
            bases: self.snapshot(),
        };
        debug!("Batch started ({})", policy);
        let result = f(&mut batch);
        let finished = tx.finish();
        let value = result?;
        finished?;
        Ok(value)
    }

    /// Add a delta to every instance of each named variable in one transaction
    ///
    /// Reports `false` without pausing when there is nothing to move.
    pub fn translate(&self, moves: &[(&str, f64)], policy: ResolvePolicy) -> Result<bool> {
        if moves.is_empty() {
            return Ok(false);
        }
        self.batch(policy, |batch| {
            let mut success = true;
            for &(name, delta) in moves {
                success &= batch.adjust(name, delta)?;
            }
            Ok(success)
        })
    }

    /// Turn every object under `tag` by `rotation` and, for a yaw turn, swing
    /// the group's positions around its horizontal centroid by the same angle
    ///
    /// Bases under `tag` must use the object struct layout. Reports `false`
    /// without pausing when the tag has no live bases.
    pub fn rotate_about_centroid(
        &self,
        tag: &str,
        rotation: Rotation,
        policy: ResolvePolicy,
    ) -> Result<bool> {
        if self.snapshot().get(tag).is_empty() {
            debug!("No live bases under {}", tag);
            return Ok(false);
        }

        self.batch(policy, |batch| {
            let session = batch.session;
            let stream = session.stream();
            let mut success = true;

            for base in batch.bases_for(tag) {
                for (field, delta) in rotation.fields() {
                    let turned = stream
                        .read_u16(base + field)
                        .and_then(|angle| stream.write_u16(base + field, angle.wrapping_add(delta as u16)));
                    if let Err(e) = turned {
                        debug!("{}", e);
                        success = false;
                    }
                }
            }

            if rotation.yaw == 0 {
                return Ok(success);
            }

            let mut positions = Vec::new();
            for base in batch.bases_for(tag) {
                match (stream.read_f32(base + object::X), stream.read_f32(base + object::Z)) {
                    (Ok(x), Ok(z)) => positions.push((base, x as f64, z as f64)),
                    _ => success = false,
                }
            }
            if positions.is_empty() {
                return Ok(false);
            }

            let count = positions.len() as f64;
            let cx = positions.iter().map(|p| p.1).sum::<f64>() / count;
            let cz = positions.iter().map(|p| p.2).sum::<f64>() / count;
            let turn = rotation.yaw as f64 * TAU / 65536.0;

            for (base, x, z) in positions {
                let (dx, dz) = (x - cx, z - cz);
                let radius = dx.hypot(dz);
                let bearing = dx.atan2(dz) + turn;
                let moved = stream
                    .write_f32(base + object::X, (cx + radius * bearing.sin()) as f32)
                    .and_then(|()| {
                        stream.write_f32(base + object::Z, (cz + radius * bearing.cos()) as f32)
                    });
                if let Err(e) = moved {
                    debug!("{}", e);
                    success = false;
                }
            }
            Ok(success)
        })
    }
}

/// Angle deltas in 65536ths of a turn, added to both facing and moving angles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rotation {
    pub yaw: i32,
    pub pitch: i32,
    pub roll: i32,
}

impl Rotation {
    pub fn yaw(yaw: i32) -> Self {
        Self {
            yaw,
            ..Self::default()
        }
    }

    fn fields(&self) -> [(u64, i32); 6] {
        [
            (object::YAW_FACING, self.yaw),
            (object::YAW_MOVING, self.yaw),
            (object::PITCH_FACING, self.pitch),
            (object::PITCH_MOVING, self.pitch),
            (object::ROLL_FACING, self.roll),
            (object::ROLL_MOVING, self.roll),
        ]
    }
}

/// Steps of a [`Session::batch`], all inside the same transaction
pub struct Batch<'a> {
    session: &'a Session,
    policy: ResolvePolicy,
    bases: BaseSnapshot,
}

impl Batch<'_> {
    pub fn policy(&self) -> ResolvePolicy {
        self.policy
    }

    fn refresh(&mut self) {
        if self.policy == ResolvePolicy::PerStep {
            self.bases = self.session.snapshot();
        }
    }

    /// Bases under `tag` as seen by the next step
    pub fn bases_for(&mut self, tag: &str) -> Vec<u64> {
        self.refresh();
        self.bases.get(tag).to_vec()
    }

    pub fn resolve(&mut self, name: &str) -> Result<Vec<u64>> {
        let variable = self.session.variable(name)?;
        self.refresh();
        Ok(variable.addresses(self.session.region, &self.bases))
    }

    pub fn get(&mut self, name: &str) -> Result<Vec<String>> {
        let variable = self.session.variable(name)?;
        self.refresh();
        Ok(variable.get_values(&self.session.context(&self.bases), None))
    }

    pub fn set(&mut self, name: &str, text: &str) -> Result<bool> {
        let variable = self.session.variable(name)?;
        self.refresh();
        variable.set_value(&self.session.context(&self.bases), text, None)
    }

    /// Add `delta` to every instance of `name`
    pub fn adjust(&mut self, name: &str, delta: f64) -> Result<bool> {
        let variable = self.session.variable(name)?;
        self.refresh();
        let ctx = self.session.context(&self.bases);
        let addresses = variable.addresses(ctx.region, ctx.bases);
        if addresses.is_empty() {
            return Ok(false);
        }
        let mut success = true;
        for address in addresses {
            success &= variable.adjust_value(&ctx, delta, address);
        }
        Ok(success)
    }
}
