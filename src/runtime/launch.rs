//! Host-side launch context.
//!
//! A [`LaunchContext`] carries everything the host supplies for one kernel
//! launch: a value per argument index, the extra-args block (array shapes),
//! and, after the launch, the decoded return values.
//!
//! Host arrays are borrowed mutably for the lifetime of the context: the
//! runtime copies them to the device before dispatch when the kernel reads
//! them, and copies device results back into them when the kernel writes
//! them.

use bytemuck::Pod;

use crate::rhi::DeviceAllocation;
use crate::runtime::kernel::{MAX_NUM_ARGS_EXTRA, MAX_NUM_INDICES};
use crate::types::Scalar;

/// How an array argument's memory is provided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DevAllocType {
    /// Host memory, staged through a transient device buffer.
    None,
    /// Device-resident array passed by reference.
    Ndarray,
    /// Sampled texture.
    Texture,
    /// Storage texture.
    RwTexture,
}

/// Value of one argument.
#[derive(Debug)]
pub enum ArgValue<'a> {
    /// Scalar value.
    Scalar(Scalar),
    /// Host array; its length is the runtime byte size.
    HostArray(&'a mut [u8]),
    /// Device-resident array.
    Ndarray(DeviceAllocation),
    /// Sampled texture.
    Texture(DeviceAllocation),
    /// Storage texture.
    RwTexture(DeviceAllocation),
}

impl ArgValue<'_> {
    /// Memory provider of an array value; `None` for scalars.
    pub fn dev_alloc_type(&self) -> Option<DevAllocType> {
        match self {
            ArgValue::Scalar(_) => None,
            ArgValue::HostArray(_) => Some(DevAllocType::None),
            ArgValue::Ndarray(_) => Some(DevAllocType::Ndarray),
            ArgValue::Texture(_) => Some(DevAllocType::Texture),
            ArgValue::RwTexture(_) => Some(DevAllocType::RwTexture),
        }
    }

    pub(crate) fn kind(&self) -> &'static str {
        match self {
            ArgValue::Scalar(_) => "scalar",
            ArgValue::HostArray(_) => "host array",
            ArgValue::Ndarray(_) => "ndarray",
            ArgValue::Texture(_) => "texture",
            ArgValue::RwTexture(_) => "rw texture",
        }
    }
}

/// Extra-args block: shape entries per argument.
pub type ExtraArgs = [[i32; MAX_NUM_INDICES]; MAX_NUM_ARGS_EXTRA];

/// Arguments in, results out, for one launch.
#[derive(Debug)]
pub struct LaunchContext<'a> {
    args: Vec<Option<ArgValue<'a>>>,
    extra_args: ExtraArgs,
    results: Vec<Vec<Scalar>>,
}

impl Default for LaunchContext<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> LaunchContext<'a> {
    /// Context with no arguments set.
    pub fn new() -> Self {
        Self {
            args: Vec::new(),
            extra_args: [[0; MAX_NUM_INDICES]; MAX_NUM_ARGS_EXTRA],
            results: Vec::new(),
        }
    }

    fn slot(&mut self, index: usize) -> &mut Option<ArgValue<'a>> {
        if self.args.len() <= index {
            self.args.resize_with(index + 1, || None);
        }
        &mut self.args[index]
    }

    /// Sets argument `index` to a scalar.
    pub fn set_arg(&mut self, index: usize, value: impl Into<Scalar>) -> &mut Self {
        *self.slot(index) = Some(ArgValue::Scalar(value.into()));
        self
    }

    /// Sets argument `index` to a host byte array.
    pub fn set_host_array(&mut self, index: usize, data: &'a mut [u8]) -> &mut Self {
        *self.slot(index) = Some(ArgValue::HostArray(data));
        self
    }

    /// Sets argument `index` to a typed host array.
    pub fn set_host_array_of<T: Pod>(&mut self, index: usize, data: &'a mut [T]) -> &mut Self {
        self.set_host_array(index, bytemuck::cast_slice_mut(data))
    }

    /// Sets argument `index` to a device-resident array.
    pub fn set_ndarray(&mut self, index: usize, alloc: DeviceAllocation) -> &mut Self {
        *self.slot(index) = Some(ArgValue::Ndarray(alloc));
        self
    }

    /// Sets argument `index` to a sampled texture.
    pub fn set_texture(&mut self, index: usize, image: DeviceAllocation) -> &mut Self {
        *self.slot(index) = Some(ArgValue::Texture(image));
        self
    }

    /// Sets argument `index` to a storage texture.
    pub fn set_rw_texture(&mut self, index: usize, image: DeviceAllocation) -> &mut Self {
        *self.slot(index) = Some(ArgValue::RwTexture(image));
        self
    }

    /// Records the shape of array argument `index` in the extra-args block.
    /// Indices beyond the block's capacity are ignored; extra dimensions are
    /// truncated.
    pub fn set_array_shape(&mut self, index: usize, shape: &[i32]) -> &mut Self {
        if let Some(row) = self.extra_args.get_mut(index) {
            for (dst, &dim) in row.iter_mut().zip(shape) {
                *dst = dim;
            }
        }
        self
    }

    /// Value of argument `index`.
    pub fn arg(&self, index: usize) -> Option<&ArgValue<'a>> {
        self.args.get(index).and_then(Option::as_ref)
    }

    pub(crate) fn args_mut(&mut self) -> impl Iterator<Item = (usize, &mut ArgValue<'a>)> {
        self.args
            .iter_mut()
            .enumerate()
            .filter_map(|(i, v)| v.as_mut().map(|v| (i, v)))
    }

    /// Extra-args block as bytes.
    pub fn extra_args_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(&self.extra_args)
    }

    /// Scalars of return slot `index` from the last launch.
    pub fn ret(&self, index: usize) -> Option<&[Scalar]> {
        self.results.get(index).map(Vec::as_slice)
    }

    /// Scalar `element` of return slot `index`.
    pub fn ret_scalar(&self, index: usize, element: usize) -> Option<Scalar> {
        self.ret(index)?.get(element).copied()
    }

    pub(crate) fn set_results(&mut self, results: Vec<Vec<Scalar>>) {
        self.results = results;
    }
}
