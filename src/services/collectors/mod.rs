//! Metrics collector implementations (C4, §4.4).
//!
//! The domain layer (`domain::models::collector`) defines the [`Collector`]
//! capability interface and the shared [`CollectorStatus`] bookkeeping. This
//! service layer provides:
//!
//! 1. **Concrete collectors** -- CPU, memory, network, disk, and lifecycle,
//!    each reading one [`RuntimeAdapter`](crate::infrastructure::runtime_adapter::RuntimeAdapter)
//!    call and turning it into [`MetricSample`](crate::domain::models::sample::MetricSample)s.
//! 2. **[`CollectorRegistry`]** -- fans `collect_all` out across every
//!    initialized, enabled, and healthy collector concurrently.
//! 3. **[`RuntimeProbe`]** and the Docker stats string parsers shared by all
//!    five collectors.

pub mod cpu;
pub mod disk;
pub mod lifecycle;
pub mod memory;
pub mod network;
pub mod registry;
pub mod traits;

pub use cpu::CpuCollector;
pub use disk::DiskCollector;
pub use lifecycle::LifecycleCollector;
pub use memory::MemoryCollector;
pub use network::NetworkCollector;
pub use registry::CollectorRegistry;
pub use traits::{parse_byte_pair, parse_byte_size, parse_percent, RuntimeProbe};
