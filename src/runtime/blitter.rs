//! # Context Blitter
//!
//! Moves one launch's arguments to the device and its results back.
//!
//! ## Host to device
//!
//! 1. Host arrays the kernel reads are copied into their staging buffers
//!    (one map cycle each). Arrays the kernel only writes are never uploaded.
//! 2. The args block is encoded on the host: array slots receive the device
//!    address of the array's buffer (textures leave their slot untouched),
//!    scalar slots receive the value in the declared type, and the
//!    extra-args block follows the slots.
//! 3. The args buffer is mapped once and the block copied in.
//!
//! ## Device to host
//!
//! Host arrays the kernel writes are read back in one batch after the open
//! command list is submitted and the device is idle. Without readbacks, a
//! kernel that returns values still forces a synchronous submission. Return
//! slots are then decoded from a single map of the returns buffer.
//!
//! Mappings are scoped to [`Device::map`] calls, so none is ever held across
//! a submission.

use std::collections::HashMap;

use crate::error::{GfxError, GfxResult};
use crate::rhi::{Device, DeviceAllocation, DevicePtr, RhiError};
use crate::runtime::batcher::CommandBatcher;
use crate::runtime::kernel::KernelContextAttributes;
use crate::runtime::launch::{ArgValue, LaunchContext};
use crate::types::{PrimitiveType, Scalar};

/// Marshals one launch. Exists only for kernels with arguments or returns.
pub(crate) struct ContextBlitter<'k, D: Device> {
    device: &'k D,
    ctx_attribs: &'k KernelContextAttributes,
    args_buffer: DeviceAllocation,
    args_buffer_size: usize,
    ret_buffer: DeviceAllocation,
    arrays: &'k HashMap<usize, DeviceAllocation>,
}

impl<'k, D: Device> ContextBlitter<'k, D> {
    /// Blitter for a launch, or `None` when the schema is empty.
    pub(crate) fn maybe_make(
        device: &'k D,
        ctx_attribs: &'k KernelContextAttributes,
        args_buffer: DeviceAllocation,
        args_buffer_size: u64,
        ret_buffer: DeviceAllocation,
        arrays: &'k HashMap<usize, DeviceAllocation>,
    ) -> Option<Self> {
        if ctx_attribs.is_empty() {
            return None;
        }
        Some(Self {
            device,
            ctx_attribs,
            args_buffer,
            args_buffer_size: args_buffer_size as usize,
            ret_buffer,
            arrays,
        })
    }

    fn staging(&self, index: usize) -> GfxResult<DeviceAllocation> {
        self.arrays.get(&index).copied().ok_or_else(|| GfxError::ArgumentMismatch {
            index,
            expected: "array with a device buffer".into(),
            found: "unbound array".into(),
        })
    }

    fn unsupported(&self, ty: PrimitiveType, context: &'static str) -> GfxError {
        GfxError::UnsupportedType {
            ty,
            device: self.device.name().to_owned(),
            context,
        }
    }

    /// Stages read arrays and writes the args buffer.
    pub(crate) fn host_to_device(&self, ctx: &LaunchContext<'_>) -> GfxResult<()> {
        let caps = self.device.caps();
        let mut block = vec![0u8; self.args_buffer_size];

        for (index, arg) in self.ctx_attribs.args().iter().enumerate() {
            let value = ctx.arg(index).ok_or(GfxError::ArgumentMissing { index })?;

            if arg.is_array {
                let alloc = match value {
                    ArgValue::HostArray(data) => {
                        let staging = self.staging(index)?;
                        if arg.access.read && !data.is_empty() {
                            self.device
                                .map(staging, &mut |bytes: &mut [u8]| {
                                    let n = data.len().min(bytes.len());
                                    bytes[..n].copy_from_slice(&data[..n]);
                                })
                                .map_err(GfxError::device("map external array"))?;
                        }
                        staging
                    }
                    ArgValue::Ndarray(alloc) => *alloc,
                    ArgValue::Texture(_) | ArgValue::RwTexture(_) => continue,
                    ArgValue::Scalar(_) => {
                        return Err(GfxError::ArgumentMismatch {
                            index,
                            expected: "array".into(),
                            found: value.kind().into(),
                        })
                    }
                };
                let address = self.device.get_memory_physical_pointer(DevicePtr::from(alloc));
                write_slot(&mut block, arg.offset_in_mem, &address.to_le_bytes());
                continue;
            }

            let ArgValue::Scalar(scalar) = value else {
                return Err(GfxError::ArgumentMismatch {
                    index,
                    expected: arg.dtype.to_string(),
                    found: value.kind().into(),
                });
            };
            if !caps.supports(arg.dtype) {
                return Err(self.unsupported(arg.dtype, "kernel argument"));
            }
            block
                .get_mut(arg.offset_in_mem..)
                .and_then(|slot| scalar.encode(arg.dtype, slot))
                .ok_or_else(|| GfxError::ArgumentMismatch {
                    index,
                    expected: arg.dtype.to_string(),
                    found: scalar.primitive_type().to_string(),
                })?;
        }

        if self.args_buffer.is_null() {
            return Ok(());
        }

        let extra = ctx.extra_args_bytes();
        let extra_len = self.ctx_attribs.extra_args_bytes().min(extra.len());
        write_slot(&mut block, self.ctx_attribs.args_bytes(), &extra[..extra_len]);

        self.device
            .map(self.args_buffer, &mut |bytes: &mut [u8]| {
                let n = bytes.len().min(block.len());
                bytes[..n].copy_from_slice(&block[..n]);
            })
            .map_err(GfxError::device("map args buffer"))
    }

    /// Reads back written arrays and decodes return values.
    ///
    /// Returns `true` when this call synchronized the device, in which case
    /// the batch the launch was recorded into has completed.
    pub(crate) fn device_to_host(
        &self,
        batcher: &mut CommandBatcher<D>,
        ctx: &mut LaunchContext<'_>,
    ) -> GfxResult<bool> {
        if self.ctx_attribs.is_empty() {
            return Ok(false);
        }
        let has_rets = self.ctx_attribs.has_rets();

        {
            let mut srcs: Vec<DevicePtr> = Vec::new();
            let mut dsts: Vec<&mut [u8]> = Vec::new();
            for (index, value) in ctx.args_mut() {
                let Some(arg) = self.ctx_attribs.args().get(index) else {
                    continue;
                };
                if !arg.is_array || !arg.access.write {
                    continue;
                }
                if let ArgValue::HostArray(data) = value {
                    if data.is_empty() {
                        continue;
                    }
                    srcs.push(DevicePtr::from(self.staging(index)?));
                    dsts.push(&mut **data);
                }
            }

            if !srcs.is_empty() {
                let semaphore = batcher.submit(self.device)?;
                self.device.wait_idle().map_err(GfxError::Submission)?;
                let waits: Vec<D::Semaphore> = semaphore.into_iter().collect();
                self.device
                    .readback_data(&srcs, &mut dsts, &waits)
                    .map_err(GfxError::device("readback external arrays"))?;
            } else if has_rets {
                batcher.submit_synced(self.device)?;
            } else {
                return Ok(false);
            }
        }

        if !has_rets {
            return Ok(true);
        }

        let mut raw = Vec::new();
        self.device
            .map(self.ret_buffer, &mut |bytes: &mut [u8]| raw.extend_from_slice(bytes))
            .map_err(GfxError::device("map returns buffer"))?;

        let caps = self.device.caps();
        let mut results = Vec::with_capacity(self.ctx_attribs.rets().len());
        for ret in self.ctx_attribs.rets() {
            if !caps.supports(ret.dtype) {
                return Err(self.unsupported(ret.dtype, "return value"));
            }
            let size = ret.dtype.size();
            let values = (0..ret.num_elements())
                .map(|j| {
                    raw.get(ret.offset_in_mem + j * size..)
                        .and_then(|bytes| Scalar::decode(ret.dtype, bytes))
                        .ok_or_else(|| GfxError::Device {
                            op: "decode return value",
                            source: RhiError::InvalidUsage(format!(
                                "returns buffer of {} bytes too small for slot at {}",
                                raw.len(),
                                ret.offset_in_mem
                            )),
                        })
                })
                .collect::<GfxResult<Vec<Scalar>>>()?;
            results.push(values);
        }
        ctx.set_results(results);
        Ok(true)
    }
}

fn write_slot(block: &mut [u8], offset: usize, bytes: &[u8]) {
    if let Some(dst) = block.get_mut(offset..offset + bytes.len()) {
        dst.copy_from_slice(bytes);
    }
}
