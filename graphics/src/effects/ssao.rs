//! Screen-space ambient occlusion.
//!
//! Occlusion is estimated from the depth buffer and the normal G-buffer by
//! testing a hemisphere of kernel samples around each pixel, rotated per
//! pixel by a tiled noise texture. The raw result is blurred horizontally
//! into an intermediate target and vertically back into the SSAO map.

use std::sync::Arc;

use half::f16;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use umbra_core::camera::Camera;
use umbra_core::math::{Mat4, Vec3, mat4_to_cols_array_2d};

use crate::command::{
    ColorAttachment, CommandBuffer, RenderPassDescriptor, padded_bytes_per_row,
};
use crate::device::Device;
use crate::error::GraphicsError;
use crate::pipeline::GraphicsPipeline;
use crate::resources::{Sampler, Texture, TextureRef, TransferBuffer, TransferDirection};
use crate::shader::library;
use crate::types::{
    AddressMode, Color, SamplerDescriptor, TextureDescriptor, TextureFormat, TextureUsage,
};
use crate::uniforms::{BlurParams, SSAO_KERNEL_SIZE, SsaoParams};

use super::{
    EFFECT_TARGET_FORMAT, create_effect_target, create_fullscreen_pipeline, create_nearest_sampler,
    draw_fullscreen,
};

/// Format of the per-pixel rotation texture.
pub const NOISE_FORMAT: TextureFormat = TextureFormat::Rg16Float;

#[derive(Debug, Clone, PartialEq)]
pub struct SsaoConfig {
    /// Sampling radius in view-space units.
    pub radius: f32,
    /// Depth bias against self-occlusion.
    pub bias: f32,
    /// Edge length of the square noise texture.
    pub noise_size: u32,
    /// Seed for the kernel and noise; random when `None`.
    pub seed: Option<u64>,
}

impl Default for SsaoConfig {
    fn default() -> Self {
        Self {
            radius: 0.5,
            bias: 0.025,
            noise_size: 4,
            seed: None,
        }
    }
}

impl SsaoConfig {
    pub fn with_radius(mut self, radius: f32) -> Self {
        self.radius = radius;
        self
    }

    pub fn with_bias(mut self, bias: f32) -> Self {
        self.bias = bias;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + t * (b - a)
}

/// Hemisphere kernel around `+Z`, denser near the origin.
///
/// Every sample has `z >= 0`, length at most 1 and `w == 1`.
pub fn generate_ssao_kernel<R: Rng + ?Sized>(rng: &mut R) -> [[f32; 4]; SSAO_KERNEL_SIZE] {
    std::array::from_fn(|i| {
        let direction = Vec3::new(
            rng.random_range(-1.0..=1.0),
            rng.random_range(-1.0..=1.0),
            rng.random_range(0.0..=1.0),
        );
        let direction = direction.try_normalize(1e-6).unwrap_or_else(Vec3::z);
        let t = i as f32 / SSAO_KERNEL_SIZE as f32;
        let sample = direction * rng.random::<f32>() * lerp(0.1, 1.0, t * t);
        [sample.x, sample.y, sample.z, 1.0]
    })
}

/// `size * size` unit rotation vectors in the XY plane, as half floats.
pub fn generate_ssao_noise<R: Rng + ?Sized>(rng: &mut R, size: u32) -> Vec<[f16; 2]> {
    (0..size * size)
        .map(|_| {
            let angle = rng.random_range(0.0..std::f32::consts::TAU);
            let (sin, cos) = angle.sin_cos();
            [f16::from_f32(cos), f16::from_f32(sin)]
        })
        .collect()
}

/// Upload tightly packed `texels` into every texel of `texture` and submit.
fn upload_texels(
    device: &Arc<Device>,
    texture: &TextureRef,
    texels: &[u8],
) -> Result<(), GraphicsError> {
    let texel_size = texture.format().block_size();
    let row = (texture.width() * texel_size) as usize;
    let pitch = padded_bytes_per_row(texture.width(), texel_size);
    debug_assert_eq!(texels.len(), row * texture.height() as usize);

    let transfer = TransferBuffer::new(
        device,
        TransferDirection::Upload,
        pitch as u64 * texture.height() as u64,
    )?;
    for (y, chunk) in texels.chunks_exact(row).enumerate() {
        transfer.write(y as u64 * pitch as u64, chunk)?;
    }
    let mut cmd = device.acquire_command_buffer();
    {
        let mut copy = cmd.begin_copy_pass()?;
        copy.upload_to_texture(&transfer, 0, pitch, texture);
    }
    cmd.submit()
}

/// SSAO targets, pipelines and sampling state.
#[derive(Debug)]
pub struct SsaoPass {
    device: Arc<Device>,
    config: SsaoConfig,
    pipeline: GraphicsPipeline,
    blur_pipeline: GraphicsPipeline,
    sampler: Sampler,
    noise: Texture,
    noise_sampler: Sampler,
    kernel: [[f32; 4]; SSAO_KERNEL_SIZE],
    /// Raw occlusion, then the final blurred result.
    ssao_map: Texture,
    /// Output of the horizontal blur.
    blur_target: Texture,
}

impl SsaoPass {
    /// Create targets of `width x height` and upload the noise texture.
    pub fn new(
        device: &Arc<Device>,
        width: u32,
        height: u32,
        config: SsaoConfig,
    ) -> Result<Self, GraphicsError> {
        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let kernel = generate_ssao_kernel(&mut rng);

        let noise = device.create_texture(
            &TextureDescriptor::new_2d(
                config.noise_size,
                config.noise_size,
                NOISE_FORMAT,
                TextureUsage::TEXTURE_BINDING | TextureUsage::COPY_DST | TextureUsage::COPY_SRC,
            )
            .with_label("ssao noise"),
        )?;
        let noise_values = generate_ssao_noise(&mut rng, config.noise_size);
        upload_texels(device, &noise.share(), bytemuck::cast_slice(&noise_values))?;
        let noise_sampler = device.create_sampler(
            &SamplerDescriptor::nearest()
                .with_label("ssao noise sampler")
                .with_address_mode(AddressMode::Repeat),
        )?;

        let pipeline =
            create_fullscreen_pipeline(device, library::SSAO, EFFECT_TARGET_FORMAT, "ssao")?;
        let blur_pipeline = create_fullscreen_pipeline(
            device,
            library::SSAO_BLUR,
            EFFECT_TARGET_FORMAT,
            "ssao blur",
        )?;
        let sampler = create_nearest_sampler(device, "ssao input sampler")?;

        let ssao_map = create_effect_target(device, width, height, "ssao map")?;
        let blur_target = create_effect_target(device, width, height, "ssao blur target")?;
        log::info!(
            "created SSAO pass: {width}x{height}, {SSAO_KERNEL_SIZE} samples, {0}x{0} noise",
            config.noise_size
        );

        Ok(Self {
            device: Arc::clone(device),
            config,
            pipeline,
            blur_pipeline,
            sampler,
            noise,
            noise_sampler,
            kernel,
            ssao_map,
            blur_target,
        })
    }

    pub fn config(&self) -> &SsaoConfig {
        &self.config
    }

    pub fn kernel(&self) -> &[[f32; 4]] {
        &self.kernel
    }

    pub fn noise_texture(&self) -> TextureRef {
        self.noise.share()
    }

    /// Blurred occlusion, 1 where unoccluded.
    pub fn ssao_map(&self) -> TextureRef {
        self.ssao_map.share()
    }

    /// Nearest sampler suitable for reading [`ssao_map`](Self::ssao_map).
    pub fn sampler(&self) -> &Sampler {
        &self.sampler
    }

    pub fn size(&self) -> (u32, u32) {
        (self.ssao_map.width(), self.ssao_map.height())
    }

    /// Recreate the targets if the viewport changed size.
    pub fn resize(&mut self, width: u32, height: u32) -> Result<(), GraphicsError> {
        if self.size() == (width, height) && !self.ssao_map.is_released() {
            return Ok(());
        }
        log::debug!("resizing SSAO targets to {width}x{height}");
        self.ssao_map = create_effect_target(&self.device, width, height, "ssao map")?;
        self.blur_target = create_effect_target(&self.device, width, height, "ssao blur target")?;
        Ok(())
    }

    fn params(&self, projection: &Mat4) -> SsaoParams {
        let (width, height) = self.size();
        let noise = self.config.noise_size as f32;
        SsaoParams {
            projection: mat4_to_cols_array_2d(projection),
            inv_projection: mat4_to_cols_array_2d(
                &projection.try_inverse().unwrap_or_else(Mat4::identity),
            ),
            kernel: self.kernel,
            noise_scale: [width as f32 / noise, height as f32 / noise],
            radius: self.config.radius,
            bias: self.config.bias,
        }
    }

    /// Record the occlusion pass and both blur passes.
    ///
    /// `depth` and `normals` are only sampled.
    pub fn render(
        &self,
        cmd: &mut CommandBuffer,
        camera: &Camera,
        depth: &TextureRef,
        normals: &TextureRef,
    ) -> Result<(), GraphicsError> {
        debug_assert!(!depth.same_texture(&self.ssao_map.share()));
        let params = self.params(&camera.projection);
        {
            let mut pass = cmd.begin_render_pass(
                RenderPassDescriptor::new()
                    .with_label("ssao")
                    .with_color_attachment(ColorAttachment::clear(
                        self.ssao_map.share(),
                        Color::WHITE,
                    )),
            )?;
            pass.bind_pipeline(&self.pipeline);
            pass.push_fragment_uniform(0, &params);
            pass.bind_fragment_sampler(0, depth, &self.sampler);
            pass.bind_fragment_sampler(1, normals, &self.sampler);
            pass.bind_fragment_sampler(2, &self.noise.share(), &self.noise_sampler);
            draw_fullscreen(&mut pass);
        }

        let (width, height) = self.size();
        let texel_size = [1.0 / width as f32, 1.0 / height as f32];
        let steps = [
            ([1.0, 0.0], &self.ssao_map, &self.blur_target),
            ([0.0, 1.0], &self.blur_target, &self.ssao_map),
        ];
        for (direction, source, target) in steps {
            let mut pass = cmd.begin_render_pass(
                RenderPassDescriptor::new()
                    .with_label("ssao blur")
                    .with_color_attachment(ColorAttachment::clear(target.share(), Color::WHITE)),
            )?;
            pass.bind_pipeline(&self.blur_pipeline);
            pass.push_fragment_uniform(
                0,
                &BlurParams {
                    direction,
                    texel_size,
                },
            );
            pass.bind_fragment_sampler(0, &source.share(), &self.sampler);
            draw_fullscreen(&mut pass);
        }
        Ok(())
    }

    /// Free the targets and the noise texture. Inputs are borrowed and left
    /// alone.
    pub fn release(&mut self) {
        self.ssao_map.release();
        self.blur_target.release();
        self.noise.release();
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::device::DeviceDescriptor;
    use crate::readback::download_texture;

    #[test]
    fn test_kernel_is_a_hemisphere() {
        let kernel = generate_ssao_kernel(&mut StdRng::seed_from_u64(7));
        for sample in kernel {
            let v = Vec3::new(sample[0], sample[1], sample[2]);
            assert!(v.z >= 0.0);
            assert!(v.norm() <= 1.0 + 1e-6);
            assert_eq!(sample[3], 1.0);
        }
    }

    #[test]
    fn test_kernel_is_deterministic_for_a_seed() {
        let a = generate_ssao_kernel(&mut StdRng::seed_from_u64(3));
        let b = generate_ssao_kernel(&mut StdRng::seed_from_u64(3));
        assert_eq!(a, b);
    }

    #[test]
    fn test_noise_vectors_are_unit() {
        let noise = generate_ssao_noise(&mut StdRng::seed_from_u64(1), 4);
        assert_eq!(noise.len(), 16);
        for [x, y] in noise {
            let len = (x.to_f32().powi(2) + y.to_f32().powi(2)).sqrt();
            assert_relative_eq!(len, 1.0, epsilon = 1e-2);
        }
    }

    #[test]
    fn test_noise_texture_uploaded() {
        let device = Device::new(DeviceDescriptor::dummy()).unwrap();
        let pass = SsaoPass::new(&device, 8, 6, SsaoConfig::default().with_seed(11)).unwrap();
        let bytes = download_texture(&device, &pass.noise_texture()).unwrap();
        let mut rng = StdRng::seed_from_u64(11);
        generate_ssao_kernel(&mut rng);
        let expected = generate_ssao_noise(&mut rng, 4);
        assert_eq!(bytes, bytemuck::cast_slice::<_, u8>(&expected));
        assert_eq!(pass.size(), (8, 6));
        assert_eq!(pass.ssao_map().format(), EFFECT_TARGET_FORMAT);
    }

    #[test]
    fn test_resize_and_release() {
        let device = Device::new(DeviceDescriptor::dummy()).unwrap();
        let mut pass = SsaoPass::new(&device, 4, 4, SsaoConfig::default()).unwrap();
        let before = pass.ssao_map();
        pass.resize(4, 4).unwrap();
        assert!(pass.ssao_map().same_texture(&before));
        pass.resize(10, 5).unwrap();
        assert!(before.is_released());
        assert_eq!(pass.size(), (10, 5));

        pass.release();
        pass.release();
        assert_eq!(device.live_texture_count(), 0);
    }
}
