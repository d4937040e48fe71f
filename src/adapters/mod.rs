//! Adapters: concrete implementations of the port traits.
//!
//! | Adapter | Implements                         | Connects to            |
//! |---------|------------------------------------|------------------------|
//! | `sim`   | SharedMemoryPort, CachePort        | host heap arena        |
//! |         | EnginePort, AcceleratorPort        | in-process slot tables |
//! |         | CodecBackend (decode + encode)     | frame-counting codecs  |

pub mod sim;
