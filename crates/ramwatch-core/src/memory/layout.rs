//! Memory layout constants for emulated console RAM
//!
//! This module centralizes the address-space conventions and the struct field
//! offsets used by the built-in special variables and object rotation.
//! Constants are organized by structure type.

/// Address-space conventions of the emulated console
pub mod ram {
    /// Size of emulated RAM (8 MiB with the expansion pak)
    pub const SIZE: u64 = 0x80_0000;

    /// Cached, unmapped segment bit set on addresses as the game sees them
    pub const KSEG0: u64 = 0x8000_0000;

    /// Mask that strips segment bits, leaving a physical RAM offset
    pub const PHYSICAL_MASK: u64 = 0x0FFF_FFFF;

    /// Host emulators store RAM as words of this many bytes
    pub const WORD: u64 = 4;
}

/// Memory layout constants for the generic object struct
pub mod object {
    pub const X: u64 = 0xA0;
    pub const Z: u64 = 0xA8;

    // Angles are stored as s32 but only the low halfword is meaningful
    pub const YAW_FACING: u64 = 0xD6;
    pub const PITCH_FACING: u64 = 0xD2;
    pub const ROLL_FACING: u64 = 0xDA;
    pub const YAW_MOVING: u64 = 0xCA;
    pub const PITCH_MOVING: u64 = 0xC6;
    pub const ROLL_MOVING: u64 = 0xCE;
}

/// Memory layout constants for the player struct
pub mod player {
    pub const X: u64 = 0x3C;
    pub const Z: u64 = 0x44;
}

/// Pendulum object fields (all f32)
pub mod pendulum {
    pub const ACCELERATION_DIRECTION: u64 = 0xF4;
    pub const ANGLE: u64 = 0xF8;
    pub const ANGULAR_VELOCITY: u64 = 0xFC;
    pub const ACCELERATION_MAGNITUDE: u64 = 0x100;

    /// Upper bound on frames integrated when projecting a swing
    pub const MAX_SWING_FRAMES: usize = 10_000;
}

/// Base address tags used by the built-in special variables
pub mod tags {
    /// Always live with a single base of 0, so offsets are plain RAM addresses
    pub const RAM: &str = "ram";
    pub const PLAYER: &str = "player";
}

/// Timing constants for polling and pausing
pub mod timing {
    /// Interval between display refresh polls (ms)
    pub const POLL_INTERVAL_MS: u64 = 33;

    /// Maximum time allowed for the emulator to acknowledge a pause (ms)
    pub const PAUSE_TIMEOUT_MS: u64 = 500;

    /// Delay between attempts to attach to the emulator (ms)
    pub const ATTACH_RETRY_DELAY_MS: u64 = 2_000;
}
