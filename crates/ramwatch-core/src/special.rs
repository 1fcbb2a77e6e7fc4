//! Computed variables.
//!
//! A special variable has no single memory cell behind it. Its getter derives
//! a value from one or more fields and its setter works backwards to the
//! writes that produce the requested value. Handlers are registered by tag and
//! looked up when the variable table is loaded.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::context::AccessContext;
use crate::error::Result;
use crate::marshal::ValueKind;
use crate::memory::layout::{object, pendulum, player, tags};

/// Shown in place of a value that could not be read
pub const READ_ERROR: &str = "(error)";

/// Getter and setter pair for a computed variable
///
/// Setters may be called while a transaction is already open and must take
/// their own hold through [`AccessContext::begin`] when they issue more than
/// one write.
pub trait SpecialVariable: Send + Sync {
    fn get(&self, ctx: &AccessContext<'_>, address: u64) -> String;

    fn set(&self, ctx: &AccessContext<'_>, text: &str, address: u64) -> bool;
}

#[derive(Clone, Default)]
pub struct SpecialRegistry {
    handlers: HashMap<String, Arc<dyn SpecialVariable>>,
}

impl SpecialRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the built-in handlers
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("pendulum_amplitude", Arc::new(PendulumAmplitude));
        registry.register("angle_degrees", Arc::new(AngleDegrees));
        registry.register("lateral_distance_to_player", Arc::new(LateralDistanceToPlayer));
        registry
    }

    /// Add a handler, replacing any previous one under `tag`
    pub fn register(&mut self, tag: &str, handler: Arc<dyn SpecialVariable>) {
        if self.handlers.insert(tag.to_string(), handler).is_some() {
            debug!("Replaced special handler '{}'", tag);
        }
    }

    pub fn lookup(&self, tag: &str) -> Option<Arc<dyn SpecialVariable>> {
        self.handlers.get(tag).cloned()
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.handlers.contains_key(tag)
    }

    /// Registered tags in sorted order
    pub fn tags(&self) -> Vec<&str> {
        let mut tags: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        tags.sort_unstable();
        tags
    }
}

fn parse_number(text: &str) -> Option<f64> {
    match text.trim().parse::<f64>() {
        Ok(value) if value.is_finite() => Some(value),
        _ => {
            debug!("'{}' is not a number", text);
            None
        }
    }
}

fn write_all(ctx: &AccessContext<'_>, writes: &[(u64, f32)]) -> Result<bool> {
    let tx = ctx.begin()?;
    let mut success = true;
    for &(address, value) in writes {
        if let Err(e) = ctx.stream.write_f32(address, value) {
            warn!("{}", e);
            success = false;
        }
    }
    tx.finish()?;
    Ok(success)
}

/// Angle where the swing in progress comes to rest
///
/// Steps the per-frame update: acceleration points back towards the vertical,
/// velocity accumulates it, and the swing peaks once velocity reaches zero or
/// changes sign.
pub fn pendulum_amplitude(direction: f32, angle: f32, velocity: f32, magnitude: f32) -> f32 {
    if velocity == 0.0 || magnitude == 0.0 {
        return angle;
    }

    let (mut direction, mut angle, mut velocity) = (direction, angle, velocity);
    for _ in 0..pendulum::MAX_SWING_FRAMES {
        if angle > 0.0 {
            direction = -1.0;
        } else if angle < 0.0 {
            direction = 1.0;
        }
        let next = velocity + direction * magnitude;
        if next == 0.0 || next.signum() != velocity.signum() {
            return angle;
        }
        velocity = next;
        angle += velocity;
    }
    angle
}

/// Peak angle of a swinging pendulum object
pub struct PendulumAmplitude;

impl PendulumAmplitude {
    fn read(ctx: &AccessContext<'_>, address: u64) -> Result<f32> {
        let stream = ctx.stream;
        Ok(pendulum_amplitude(
            stream.read_f32(address + pendulum::ACCELERATION_DIRECTION)?,
            stream.read_f32(address + pendulum::ANGLE)?,
            stream.read_f32(address + pendulum::ANGULAR_VELOCITY)?,
            stream.read_f32(address + pendulum::ACCELERATION_MAGNITUDE)?,
        ))
    }
}

impl SpecialVariable for PendulumAmplitude {
    fn get(&self, ctx: &AccessContext<'_>, address: u64) -> String {
        match Self::read(ctx, address) {
            Ok(amplitude) => amplitude.to_string(),
            Err(e) => {
                debug!("{}", e);
                READ_ERROR.to_string()
            }
        }
    }

    fn set(&self, ctx: &AccessContext<'_>, text: &str, address: u64) -> bool {
        let Some(amplitude) = parse_number(text) else {
            return false;
        };
        let writes = [
            (address + pendulum::ANGLE, amplitude as f32),
            (address + pendulum::ANGULAR_VELOCITY, 0.0),
        ];
        write_all(ctx, &writes).unwrap_or_else(|e| {
            warn!("{}", e);
            false
        })
    }
}

/// A 16-bit angle cell shown in degrees
pub struct AngleDegrees;

const ANGLE_UNITS: f64 = 65536.0;

impl SpecialVariable for AngleDegrees {
    fn get(&self, ctx: &AccessContext<'_>, address: u64) -> String {
        match ctx.stream.read_u16(address) {
            Ok(units) => (units as f64 * 360.0 / ANGLE_UNITS).to_string(),
            Err(e) => {
                debug!("{}", e);
                READ_ERROR.to_string()
            }
        }
    }

    fn set(&self, ctx: &AccessContext<'_>, text: &str, address: u64) -> bool {
        let Some(degrees) = parse_number(text) else {
            return false;
        };
        let units = degrees * ANGLE_UNITS / 360.0;
        ctx.stream
            .write_value_numeric(ValueKind::U16, units, address, false, None)
    }
}

/// Horizontal distance from an object to the player
pub struct LateralDistanceToPlayer;

impl LateralDistanceToPlayer {
    fn positions(ctx: &AccessContext<'_>, address: u64) -> Result<Option<[f32; 4]>> {
        let Some(player_base) = ctx.bases.first(tags::PLAYER) else {
            return Ok(None);
        };
        let stream = ctx.stream;
        Ok(Some([
            stream.read_f32(address + object::X)?,
            stream.read_f32(address + object::Z)?,
            stream.read_f32(player_base + player::X)?,
            stream.read_f32(player_base + player::Z)?,
        ]))
    }

    /// Put the object `distance` from the player along its current bearing
    fn move_to(ctx: &AccessContext<'_>, address: u64, distance: f64) -> Result<bool> {
        let tx = ctx.begin()?;
        let Some([ox, oz, px, pz]) = Self::positions(ctx, address)? else {
            tx.finish()?;
            return Ok(false);
        };
        let bearing = ((ox - px) as f64).atan2((oz - pz) as f64);
        let writes = [
            (address + object::X, (px as f64 + distance * bearing.sin()) as f32),
            (address + object::Z, (pz as f64 + distance * bearing.cos()) as f32),
        ];
        let success = write_all(ctx, &writes)?;
        tx.finish()?;
        Ok(success)
    }
}

impl SpecialVariable for LateralDistanceToPlayer {
    fn get(&self, ctx: &AccessContext<'_>, address: u64) -> String {
        match Self::positions(ctx, address) {
            Ok(Some([ox, oz, px, pz])) => (ox - px).hypot(oz - pz).to_string(),
            Ok(None) => READ_ERROR.to_string(),
            Err(e) => {
                debug!("{}", e);
                READ_ERROR.to_string()
            }
        }
    }

    fn set(&self, ctx: &AccessContext<'_>, text: &str, address: u64) -> bool {
        let Some(distance) = parse_number(text) else {
            return false;
        };
        Self::move_to(ctx, address, distance).unwrap_or_else(|e| {
            warn!("{}", e);
            false
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{AddressSpaceMapping, MemoryStream, MockProcess};
    use crate::resolve::BaseSnapshot;
    use crate::transaction::Transactor;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    const OBJECT: u64 = 0x8000_0100;
    const PLAYER: u64 = 0x8000_0800;

    struct Fixture {
        process: Arc<MockProcess>,
        stream: MemoryStream,
        transactor: Transactor,
        bases: BaseSnapshot,
    }

    impl Fixture {
        fn new() -> Self {
            let process = Arc::new(MockProcess::new(0, 0x1000));
            let stream = MemoryStream::new(process.clone(), AddressSpaceMapping::default());
            let transactor = Transactor::new(process.clone(), Duration::from_millis(10));
            let mut bases = BaseSnapshot::new();
            bases.insert(tags::PLAYER, PLAYER);
            bases.insert("object", OBJECT);
            Self {
                process,
                stream,
                transactor,
                bases,
            }
        }

        fn ctx(&self) -> AccessContext<'_> {
            AccessContext::new(&self.stream, &self.transactor, Default::default(), &self.bases)
        }
    }

    #[test]
    fn test_builtins_registered() {
        let registry = SpecialRegistry::with_builtins();
        assert_eq!(
            registry.tags(),
            vec!["angle_degrees", "lateral_distance_to_player", "pendulum_amplitude"]
        );
        assert!(registry.lookup("nope").is_none());
    }

    #[test]
    fn test_pendulum_amplitude_projection() {
        // At rest: the current angle is the amplitude
        assert_eq!(pendulum_amplitude(1.0, 500.0, 0.0, 13.0), 500.0);
        // Swinging positive past the vertical, decelerating by 13 per frame
        // v: 26 -> 13 -> 0, angle: 10 -> 23 -> 23
        assert_eq!(pendulum_amplitude(-1.0, 10.0, 26.0, 13.0), 23.0);
        // Velocity overshoots zero: the peak is the last angle before it flips
        // v: 20 -> 7 -> -6, angle: 10 -> 17
        assert_eq!(pendulum_amplitude(-1.0, 10.0, 20.0, 13.0), 17.0);
        assert_eq!(pendulum_amplitude(1.0, -10.0, -20.0, 13.0), -17.0);
    }

    #[test]
    fn test_angle_degrees() {
        let fixture = Fixture::new();
        let ctx = fixture.ctx();
        let handler = AngleDegrees;

        assert!(handler.set(&ctx, "90", OBJECT));
        assert_eq!(fixture.stream.read_u16(OBJECT).unwrap(), 0x4000);
        assert_eq!(handler.get(&ctx, OBJECT), "90");

        // 360 wraps to 0
        assert!(handler.set(&ctx, "360", OBJECT));
        assert_eq!(fixture.stream.read_u16(OBJECT).unwrap(), 0);
        assert!(!handler.set(&ctx, "north", OBJECT));
    }

    #[test]
    fn test_lateral_distance_set_keeps_bearing() {
        let fixture = Fixture::new();
        let stream = &fixture.stream;
        stream.write_f32(PLAYER + player::X, 100.0).unwrap();
        stream.write_f32(PLAYER + player::Z, 100.0).unwrap();
        stream.write_f32(OBJECT + object::X, 103.0).unwrap();
        stream.write_f32(OBJECT + object::Z, 104.0).unwrap();

        let ctx = fixture.ctx();
        let handler = LateralDistanceToPlayer;
        assert_eq!(handler.get(&ctx, OBJECT), "5");

        assert!(handler.set(&ctx, "10", OBJECT));
        assert_eq!(stream.read_f32(OBJECT + object::X).unwrap(), 106.0);
        assert_eq!(stream.read_f32(OBJECT + object::Z).unwrap(), 108.0);
        assert_eq!(fixture.process.suspends.load(Ordering::SeqCst), 1);
        assert!(!fixture.process.is_paused());
    }

    #[test]
    fn test_setter_nests_inside_open_transaction() {
        let fixture = Fixture::new();
        let ctx = fixture.ctx();

        let tx = fixture.transactor.begin().unwrap();
        assert!(PendulumAmplitude.set(&ctx, "1200", OBJECT));
        assert!(fixture.process.is_paused());
        tx.finish().unwrap();

        assert_eq!(fixture.process.suspends.load(Ordering::SeqCst), 1);
        assert_eq!(fixture.stream.read_f32(OBJECT + pendulum::ANGLE).unwrap(), 1200.0);
        assert_eq!(PendulumAmplitude.get(&ctx, OBJECT), "1200");
    }

    #[test]
    fn test_missing_player_reads_as_error() {
        let fixture = Fixture::new();
        let empty = BaseSnapshot::new();
        let ctx = fixture.ctx().with_bases(&empty);
        assert_eq!(LateralDistanceToPlayer.get(&ctx, OBJECT), READ_ERROR);
        assert!(!LateralDistanceToPlayer.set(&ctx, "3", OBJECT));
    }
}
