//! Opaque identifiers that cross the RPC boundary.
//!
//! Engine and codec handles are issued by the engine port and the codec
//! backends. They pack a slot index and a generation counter so a stale
//! handle from a released resource never aliases a live one:
//!
//! ```text
//!  31            16 15             0
//! ┌────────────────┬────────────────┐
//! │   generation   │   index + 1    │
//! └────────────────┴────────────────┘
//! ```
//!
//! The registry never looks inside a handle. It only stores and compares them.

use core::fmt;
use core::num::NonZeroU32;

use serde::{Deserialize, Serialize};

/// Identity of one remote client, assigned by the transport layer.
///
/// Zero is reserved to mean "no client", so it is not representable here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionId(NonZeroU32);

impl ConnectionId {
    pub fn new(raw: u32) -> Option<Self> {
        NonZeroU32::new(raw).map(Self)
    }

    pub const fn get(self) -> u32 {
        self.0.get()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0.get())
    }
}

macro_rules! tagged_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(NonZeroU32);

        impl $name {
            /// Rebuild a handle from its wire form. Zero is the null handle.
            pub fn from_raw(raw: u32) -> Option<Self> {
                NonZeroU32::new(raw).map(Self)
            }

            /// Build a handle for `index` at `generation`.
            pub fn tagged(index: u16, generation: u16) -> Option<Self> {
                let low = u32::from(index).checked_add(1)?;
                if low > 0xFFFF {
                    return None;
                }
                Self::from_raw((u32::from(generation) << 16) | low)
            }

            pub const fn raw(self) -> u32 {
                self.0.get()
            }

            pub const fn index(self) -> u16 {
                ((self.0.get() & 0xFFFF) - 1) as u16
            }

            pub const fn generation(self) -> u16 {
                (self.0.get() >> 16) as u16
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{:08x}", self.0.get())
            }
        }
    };
}

tagged_handle!(
    /// Hardware-acceleration context handle.
    EngineHandle
);

tagged_handle!(
    /// Encoder or decoder instance handle.
    CodecHandle
);
