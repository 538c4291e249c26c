//! Blocking GPU to CPU readback.
//!
//! Each helper records one copy pass into a download transfer buffer,
//! submits it, waits on the fence and then maps the result. Texture rows are
//! padded to [`COPY_BYTES_PER_ROW_ALIGNMENT`] on the way out and unpadded here.

use std::path::Path;
use std::sync::Arc;

use crate::command::{COPY_BUFFER_ALIGNMENT, COPY_BYTES_PER_ROW_ALIGNMENT, padded_bytes_per_row};
use crate::device::Device;
use crate::error::GraphicsError;
use crate::resources::{BufferRef, TextureRef, TransferBuffer, TransferDirection};
use crate::types::TextureFormat;

/// Read `len` bytes of `buffer` starting at `offset`.
///
/// Offset and length must be multiples of 4.
pub fn download_buffer(
    device: &Arc<Device>,
    buffer: &BufferRef,
    offset: u64,
    len: u64,
) -> Result<Vec<u8>, GraphicsError> {
    if offset % COPY_BUFFER_ALIGNMENT != 0 || len % COPY_BUFFER_ALIGNMENT != 0 {
        return Err(GraphicsError::InvalidParameter(format!(
            "readback of '{}' at {offset}+{len} is not {COPY_BUFFER_ALIGNMENT}-byte aligned",
            buffer.label()
        )));
    }
    if offset + len > buffer.size() {
        return Err(GraphicsError::InvalidParameter(format!(
            "readback of '{}' at {offset}+{len} overflows its {} bytes",
            buffer.label(),
            buffer.size()
        )));
    }
    if len == 0 {
        return Ok(Vec::new());
    }

    let transfer = TransferBuffer::new(device, TransferDirection::Download, len)?;
    let mut cmd = device.acquire_command_buffer();
    {
        let mut copy = cmd.begin_copy_pass()?;
        copy.download_from_buffer(buffer, offset, &transfer, 0, len);
    }
    cmd.submit_and_acquire_fence()?.wait()?;
    transfer.read(0, len)
}

/// Read every texel of `texture`, rows tightly packed.
pub fn download_texture(
    device: &Arc<Device>,
    texture: &TextureRef,
) -> Result<Vec<u8>, GraphicsError> {
    let size = texture.size();
    let texel = texture.format().block_size();
    let row = (size.width * texel) as usize;
    let padded = padded_bytes_per_row(size.width, texel);
    let rows = (size.height * size.depth) as usize;
    debug_assert_eq!(padded % COPY_BYTES_PER_ROW_ALIGNMENT, 0);

    let transfer_size = padded as u64 * rows as u64;
    let transfer = TransferBuffer::new(device, TransferDirection::Download, transfer_size)?;
    let mut cmd = device.acquire_command_buffer();
    {
        let mut copy = cmd.begin_copy_pass()?;
        copy.download_from_texture(texture, &transfer, 0, padded);
    }
    cmd.submit_and_acquire_fence()?.wait()?;

    let padded_bytes = transfer.read(0, transfer_size)?;
    Ok(unpad_rows(&padded_bytes, row, padded as usize, rows))
}

fn unpad_rows(padded: &[u8], row: usize, pitch: usize, rows: usize) -> Vec<u8> {
    if row == pitch {
        return padded[..row * rows].to_vec();
    }
    padded
        .chunks(pitch)
        .take(rows)
        .flat_map(|chunk| &chunk[..row])
        .copied()
        .collect()
}

/// Read a `Depth32Float` texture as one `f32` per texel.
pub fn read_depth_texture(
    device: &Arc<Device>,
    texture: &TextureRef,
) -> Result<Vec<f32>, GraphicsError> {
    if texture.format() != TextureFormat::Depth32Float {
        return Err(GraphicsError::FeatureNotSupported(format!(
            "depth readback of '{}' requires Depth32Float, got {:?}",
            texture.label(),
            texture.format()
        )));
    }
    let bytes = download_texture(device, texture)?;
    Ok(bytemuck::pod_collect_to_vec(&bytes))
}

/// Convert texels of `format` to RGBA8.
fn to_rgba8(format: TextureFormat, bytes: &[u8]) -> Result<Vec<u8>, GraphicsError> {
    let gray = |v: f32| {
        let v = (v.clamp(0.0, 1.0) * 255.0).round() as u8;
        [v, v, v, 255]
    };
    Ok(match format {
        TextureFormat::Rgba8Unorm | TextureFormat::Rgba8UnormSrgb => bytes.to_vec(),
        TextureFormat::Bgra8Unorm | TextureFormat::Bgra8UnormSrgb => bytes
            .chunks_exact(4)
            .flat_map(|t| [t[2], t[1], t[0], t[3]])
            .collect(),
        TextureFormat::R8Unorm => bytes.iter().flat_map(|&v| [v, v, v, 255]).collect(),
        TextureFormat::R32Float | TextureFormat::Depth32Float => {
            bytemuck::pod_collect_to_vec::<u8, f32>(bytes)
                .into_iter()
                .flat_map(gray)
                .collect()
        }
        other => {
            return Err(GraphicsError::FeatureNotSupported(format!(
                "cannot dump {other:?} textures to an image"
            )));
        }
    })
}

/// Read `texture` back and write it as an RGBA8 PNG.
///
/// BGRA swapchain formats are swizzled; single-channel float formats are
/// written as grayscale clamped to `[0, 1]`.
pub fn dump_texture_to_file(
    device: &Arc<Device>,
    texture: &TextureRef,
    path: impl AsRef<Path>,
) -> Result<(), GraphicsError> {
    let path = path.as_ref();
    let bytes = download_texture(device, texture)?;
    let rgba = to_rgba8(texture.format(), &bytes)?;
    let image = image::RgbaImage::from_raw(texture.width(), texture.height(), rgba)
        .ok_or_else(|| {
            GraphicsError::Internal(format!(
                "texture '{}' readback has the wrong size",
                texture.label()
            ))
        })?;
    image
        .save_with_format(path, image::ImageFormat::Png)
        .map_err(|e| {
            GraphicsError::Internal(format!(
                "failed to write '{}' to {}: {e}",
                texture.label(),
                path.display()
            ))
        })?;
    log::info!("wrote '{}' to {}", texture.label(), path.display());
    Ok(())
}
