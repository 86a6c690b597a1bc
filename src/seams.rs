//! The small injected seams named in §6 that stand in for physical
//! host/hardware facts no demo or test run actually has: which NIC to
//! report as this node's address, how saturated its GPU is, and where the
//! next frame to send comes from. Each is a one-method trait with a fixed
//! test double; a real deployment swaps the double for something that reads
//! `/proc`, queries nvidia-smi, or opens a camera.

/// Resolves this process's own address, the way the original discovered its
/// IP by probing `eth0`/`wlan0`.
pub trait LocalAddress: Send + Sync {
    fn discover(&self) -> crate::error::Result<String>;
}

/// Always reports the address it was built with; no NIC enumeration.
pub struct ConfiguredAddress(String);

impl ConfiguredAddress {
    pub fn new(ip: impl Into<String>) -> Self {
        Self(ip.into())
    }
}

impl LocalAddress for ConfiguredAddress {
    fn discover(&self) -> crate::error::Result<String> {
        Ok(self.0.clone())
    }
}

/// Reports this node's idle GPU capacity as a residual fraction in `[0,1]`.
pub trait GpuProbe: Send + Sync {
    fn gpu_capacity(&self) -> f64;
}

/// Reports a fixed capacity regardless of actual load.
pub struct StaticGpuProbe(f64);

impl StaticGpuProbe {
    pub fn new(capacity: f64) -> Self {
        Self(capacity.clamp(0.0, 1.0))
    }
}

impl GpuProbe for StaticGpuProbe {
    fn gpu_capacity(&self) -> f64 {
        self.0
    }
}

/// Produces the raw bytes of each frame a sender offloads. `next_frame`
/// returns `None` once the source is exhausted (end of a fixed clip, a
/// finite replay buffer, ...), the signal a sender uses to announce its
/// last job to the controller.
pub trait FrameSource: Send {
    fn next_frame(&mut self) -> Option<Vec<u8>>;
}

/// Produces a fixed number of frames of a fixed byte size, then exhausts.
pub struct FixedSizeFrameSource {
    frame_bytes: usize,
    remaining: usize,
}

impl FixedSizeFrameSource {
    pub fn new(frame_bytes: usize, frame_count: usize) -> Self {
        Self { frame_bytes, remaining: frame_count }
    }
}

impl FrameSource for FixedSizeFrameSource {
    fn next_frame(&mut self) -> Option<Vec<u8>> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        Some(vec![0u8; self.frame_bytes])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configured_address_reports_the_fixed_ip() {
        let address = ConfiguredAddress::new("10.0.0.1");
        assert_eq!(address.discover().unwrap(), "10.0.0.1");
    }

    #[test]
    fn static_gpu_probe_clamps_to_unit_interval() {
        assert_eq!(StaticGpuProbe::new(1.5).gpu_capacity(), 1.0);
        assert_eq!(StaticGpuProbe::new(-0.5).gpu_capacity(), 0.0);
    }

    #[test]
    fn fixed_size_frame_source_exhausts_after_its_count() {
        let mut source = FixedSizeFrameSource::new(16, 2);
        assert_eq!(source.next_frame().unwrap().len(), 16);
        assert!(source.next_frame().is_some());
        assert!(source.next_frame().is_none());
    }
}
