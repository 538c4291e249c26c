//! Texture sampler resource.

use std::sync::Arc;

use crate::backend::GpuSampler;
use crate::types::SamplerDescriptor;

struct SamplerInner {
    descriptor: SamplerDescriptor,
    gpu: GpuSampler,
}

/// A texture sampler.
///
/// Samplers hold no memory worth tracking, so they are shared by cloning and
/// freed with their last handle.
#[derive(Clone)]
pub struct Sampler {
    inner: Arc<SamplerInner>,
}

impl Sampler {
    pub(crate) fn new(descriptor: SamplerDescriptor, gpu: GpuSampler) -> Self {
        Self {
            inner: Arc::new(SamplerInner { descriptor, gpu }),
        }
    }

    /// Get the sampler descriptor.
    pub fn descriptor(&self) -> &SamplerDescriptor {
        &self.inner.descriptor
    }

    /// Whether this is a depth-comparison sampler.
    pub fn is_comparison(&self) -> bool {
        self.inner.descriptor.compare.is_some()
    }

    pub fn gpu(&self) -> &GpuSampler {
        &self.inner.gpu
    }
}

impl std::fmt::Debug for Sampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sampler")
            .field("label", &self.inner.descriptor.label)
            .field("mag_filter", &self.inner.descriptor.mag_filter)
            .field("compare", &self.inner.descriptor.compare)
            .finish()
    }
}

static_assertions::assert_impl_all!(Sampler: Send, Sync);
