//! # Compiled Kernels
//!
//! Registration input and the immutable record the runtime keeps for every
//! registered kernel.
//!
//! ## Registration
//!
//! A [`RegisterParams`] carries what the compiler produced for one kernel:
//! its [`KernelAttributes`] (ordered tasks plus argument/return schema), the
//! number of data trees that existed at compile time, and one opaque program
//! blob per task. [`CompiledKernel::new`] turns each blob into a device
//! pipeline, in task order, and derives the transient buffer sizes a launch
//! needs. Any pipeline failure aborts registration.
//!
//! ## Argument schema
//!
//! [`KernelContextAttributes`] describes the args buffer a kernel reads and
//! the returns buffer it writes. Build it with
//! [`KernelContextAttributes::builder`], which lays out offsets with natural
//! alignment; array arguments occupy an 8-byte device-address slot.
//!
//! ```
//! use gfx_runtime::runtime::kernel::{ArrayAccess, KernelContextAttributes};
//! use gfx_runtime::types::PrimitiveType;
//!
//! let ctx = KernelContextAttributes::builder()
//!     .scalar_arg(PrimitiveType::I32)
//!     .array_arg(PrimitiveType::F32, ArrayAccess::READ_WRITE)
//!     .ret(PrimitiveType::F64)
//!     .build();
//!
//! assert_eq!(ctx.args()[1].offset_in_mem, 8);
//! assert!(ctx.has_rets());
//! ```

use std::sync::Arc;

use crate::error::{GfxError, GfxResult};
use crate::rhi::Device;
use crate::types::PrimitiveType;

/// Number of arguments that can carry extra (shape) metadata.
pub const MAX_NUM_ARGS_EXTRA: usize = 32;

/// Maximum number of shape entries per argument.
pub const MAX_NUM_INDICES: usize = 12;

/// Size of the extra-args block appended to the args buffer.
pub const EXTRA_ARGS_BYTES: usize = MAX_NUM_ARGS_EXTRA * MAX_NUM_INDICES * std::mem::size_of::<i32>();

/// Opaque kernel handle: the kernel's registration index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KernelHandle(pub(crate) usize);

impl KernelHandle {
    /// Registration index.
    pub fn id(self) -> usize {
        self.0
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tasks
// ─────────────────────────────────────────────────────────────────────────────

/// Logical buffer a task binds; resolved to an allocation at record time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferRef {
    /// Root buffer of a data tree.
    Root(usize),
    /// Global temporaries scratch buffer.
    GlobalTmps,
    /// List-generation scratch buffer.
    ListGen,
    /// Device buffer behind an array argument.
    ExtArr(usize),
    /// The launch's args buffer.
    Args,
    /// The launch's returns buffer.
    Rets,
}

/// Buffer bound at a binding slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferBinding {
    /// Logical buffer.
    pub buffer: BufferRef,
    /// Binding slot.
    pub binding: u32,
}

/// Texture argument bound at a binding slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureBinding {
    /// Argument index holding the texture.
    pub arg_id: usize,
    /// Binding slot.
    pub binding: u32,
    /// Storage image (read-write) rather than sampled.
    pub is_storage: bool,
}

/// Kind of task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TaskKind {
    /// Ordinary dispatch.
    #[default]
    Dispatch,
    /// List generation; its list-gen buffer is zeroed before dispatch.
    ListGen,
}

/// One dispatchable unit of a kernel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskAttributes {
    /// Task name; also the profiler scope name.
    pub name: String,
    /// Threads the task wants in total.
    pub advisory_total_num_threads: u32,
    /// Threads per workgroup.
    pub advisory_num_threads_per_group: u32,
    /// Buffer bindings, in binding order.
    pub buffer_binds: Vec<BufferBinding>,
    /// Texture bindings.
    pub texture_binds: Vec<TextureBinding>,
    /// Task kind.
    pub task_type: TaskKind,
}

impl TaskAttributes {
    /// Dispatch task with one thread and one thread per group.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            advisory_total_num_threads: 1,
            advisory_num_threads_per_group: 1,
            buffer_binds: Vec::new(),
            texture_binds: Vec::new(),
            task_type: TaskKind::Dispatch,
        }
    }

    /// Sets total and per-group thread counts.
    pub fn threads(mut self, total: u32, per_group: u32) -> Self {
        self.advisory_total_num_threads = total;
        self.advisory_num_threads_per_group = per_group;
        self
    }

    /// Adds a buffer binding.
    pub fn bind(mut self, buffer: BufferRef, binding: u32) -> Self {
        self.buffer_binds.push(BufferBinding { buffer, binding });
        self
    }

    /// Adds a texture binding.
    pub fn bind_texture(mut self, arg_id: usize, binding: u32, is_storage: bool) -> Self {
        self.texture_binds.push(TextureBinding { arg_id, binding, is_storage });
        self
    }

    /// Marks this as a list-generation task.
    pub fn list_gen(mut self) -> Self {
        self.task_type = TaskKind::ListGen;
        self
    }

    /// Workgroups to dispatch: `ceil(total / per_group)`.
    pub fn group_count(&self) -> u32 {
        let per_group = self.advisory_num_threads_per_group.max(1);
        self.advisory_total_num_threads.div_ceil(per_group)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Argument schema
// ─────────────────────────────────────────────────────────────────────────────

/// Declared access of a kernel to an array argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ArrayAccess {
    /// The kernel reads the array.
    pub read: bool,
    /// The kernel writes the array.
    pub write: bool,
}

impl ArrayAccess {
    /// Read only.
    pub const READ: ArrayAccess = ArrayAccess { read: true, write: false };
    /// Write only.
    pub const WRITE: ArrayAccess = ArrayAccess { read: false, write: true };
    /// Read and write.
    pub const READ_WRITE: ArrayAccess = ArrayAccess { read: true, write: true };
}

/// Schema of one kernel argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArgAttributes {
    /// Element type.
    pub dtype: PrimitiveType,
    /// Array (or texture) argument rather than a scalar.
    pub is_array: bool,
    /// Byte offset of the argument's slot in the args buffer.
    pub offset_in_mem: usize,
    /// Declared access; meaningful for arrays only.
    pub access: ArrayAccess,
}

/// Schema of one return slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetAttributes {
    /// Element type.
    pub dtype: PrimitiveType,
    /// Byte offset of the slot in the returns buffer.
    pub offset_in_mem: usize,
    /// Bytes in the slot; `stride / dtype.size()` scalars.
    pub stride: usize,
}

impl RetAttributes {
    /// Scalars held by the slot.
    pub fn num_elements(&self) -> usize {
        self.stride / self.dtype.size()
    }
}

/// Argument and return layout of a kernel.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct KernelContextAttributes {
    args: Vec<ArgAttributes>,
    rets: Vec<RetAttributes>,
    args_bytes: usize,
    rets_bytes: usize,
    extra_args_bytes: usize,
}

impl KernelContextAttributes {
    /// A layout computed elsewhere, typically by the compiler that produced
    /// the task programs.
    ///
    /// Offsets, strides and block sizes are taken as given. The extra-args
    /// block starts at `args_bytes`, and the args buffer holds
    /// `args_bytes + extra_args_bytes` bytes. Slots that fall outside their
    /// block are never written, and reading one back fails the launch.
    pub fn new(
        args: Vec<ArgAttributes>,
        rets: Vec<RetAttributes>,
        args_bytes: usize,
        rets_bytes: usize,
        extra_args_bytes: usize,
    ) -> Self {
        Self {
            args,
            rets,
            args_bytes,
            rets_bytes,
            extra_args_bytes,
        }
    }

    /// Starts an empty layout with naturally aligned slots.
    pub fn builder() -> KernelContextAttributesBuilder {
        KernelContextAttributesBuilder::default()
    }

    /// Arguments, by index.
    pub fn args(&self) -> &[ArgAttributes] {
        &self.args
    }

    /// Return slots, by index.
    pub fn rets(&self) -> &[RetAttributes] {
        &self.rets
    }

    /// Bytes of scalar/address slots in the args buffer.
    pub fn args_bytes(&self) -> usize {
        self.args_bytes
    }

    /// Bytes of the returns buffer.
    pub fn rets_bytes(&self) -> usize {
        self.rets_bytes
    }

    /// Bytes of the extra-args block following the argument slots.
    pub fn extra_args_bytes(&self) -> usize {
        self.extra_args_bytes
    }

    /// Whether the kernel takes arguments.
    pub fn has_args(&self) -> bool {
        !self.args.is_empty()
    }

    /// Whether the kernel returns values.
    pub fn has_rets(&self) -> bool {
        !self.rets.is_empty()
    }

    /// No arguments and no returns.
    pub fn is_empty(&self) -> bool {
        !self.has_args() && !self.has_rets()
    }
}

/// Builder for [`KernelContextAttributes`].
#[derive(Debug, Clone, Default)]
pub struct KernelContextAttributesBuilder {
    args: Vec<ArgAttributes>,
    rets: Vec<RetAttributes>,
    args_cursor: usize,
    rets_cursor: usize,
}

fn align_up(value: usize, align: usize) -> usize {
    value.div_ceil(align) * align
}

impl KernelContextAttributesBuilder {
    /// Appends a scalar argument.
    pub fn scalar_arg(mut self, dtype: PrimitiveType) -> Self {
        let offset = align_up(self.args_cursor, dtype.size());
        self.args.push(ArgAttributes {
            dtype,
            is_array: false,
            offset_in_mem: offset,
            access: ArrayAccess::default(),
        });
        self.args_cursor = offset + dtype.size();
        self
    }

    /// Appends an array argument (host array or ndarray).
    pub fn array_arg(mut self, dtype: PrimitiveType, access: ArrayAccess) -> Self {
        let offset = align_up(self.args_cursor, 8);
        self.args.push(ArgAttributes {
            dtype,
            is_array: true,
            offset_in_mem: offset,
            access,
        });
        self.args_cursor = offset + 8;
        self
    }

    /// Appends a texture argument.
    pub fn texture_arg(self) -> Self {
        self.array_arg(PrimitiveType::F32, ArrayAccess::READ)
    }

    /// Appends a single-scalar return slot.
    pub fn ret(self, dtype: PrimitiveType) -> Self {
        self.ret_vector(dtype, 1)
    }

    /// Appends a return slot holding `count` contiguous scalars.
    pub fn ret_vector(mut self, dtype: PrimitiveType, count: usize) -> Self {
        let offset = align_up(self.rets_cursor, dtype.size());
        let stride = dtype.size() * count.max(1);
        self.rets.push(RetAttributes { dtype, offset_in_mem: offset, stride });
        self.rets_cursor = offset + stride;
        self
    }

    /// Finishes the layout. Slot regions are rounded up to 8 bytes.
    pub fn build(self) -> KernelContextAttributes {
        let args_bytes = align_up(self.args_cursor, 8);
        KernelContextAttributes {
            extra_args_bytes: if self.args.is_empty() { 0 } else { EXTRA_ARGS_BYTES },
            args: self.args,
            rets: self.rets,
            args_bytes,
            rets_bytes: align_up(self.rets_cursor, 8),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Kernels
// ─────────────────────────────────────────────────────────────────────────────

/// Name, tasks and schema of a kernel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelAttributes {
    /// Kernel name.
    pub name: String,
    /// Tasks in dispatch order.
    pub tasks: Vec<TaskAttributes>,
    /// Argument and return layout.
    pub ctx_attribs: KernelContextAttributes,
}

/// Registration request.
#[derive(Debug, Clone)]
pub struct RegisterParams {
    /// Kernel description.
    pub kernel_attribs: KernelAttributes,
    /// Data trees that existed when the kernel was compiled.
    pub num_snode_trees: usize,
    /// One program blob per task, in task order.
    pub task_programs: Vec<Vec<u8>>,
}

/// A registered kernel: attributes, one pipeline per task, derived sizes.
pub struct CompiledKernel<D: Device> {
    attribs: KernelAttributes,
    pipelines: Vec<D::Pipeline>,
    args_buffer_size: u64,
    ret_buffer_size: u64,
    num_snode_trees: usize,
}

impl<D: Device> CompiledKernel<D> {
    /// Creates one pipeline per task.
    ///
    /// ## Errors
    /// * [`GfxError::TaskProgramMismatch`] if tasks and programs differ in count.
    /// * [`GfxError::PipelineCreation`] for the first task whose program the
    ///   device rejects.
    pub fn new(device: &D, params: RegisterParams, cache: Option<&D::PipelineCache>) -> GfxResult<Self> {
        let RegisterParams {
            kernel_attribs,
            num_snode_trees,
            task_programs,
        } = params;

        if kernel_attribs.tasks.len() != task_programs.len() {
            return Err(GfxError::TaskProgramMismatch {
                kernel: kernel_attribs.name,
                tasks: kernel_attribs.tasks.len(),
                programs: task_programs.len(),
            });
        }

        let pipelines = kernel_attribs
            .tasks
            .iter()
            .zip(&task_programs)
            .map(|(task, program)| {
                device
                    .create_pipeline(program, &task.name, cache)
                    .map_err(|source| GfxError::PipelineCreation {
                        kernel: kernel_attribs.name.clone(),
                        task: task.name.clone(),
                        source,
                    })
            })
            .collect::<GfxResult<Vec<_>>>()?;

        let ctx = &kernel_attribs.ctx_attribs;
        let args_buffer_size = if ctx.args_bytes() > 0 {
            (ctx.args_bytes() + ctx.extra_args_bytes()) as u64
        } else {
            0
        };
        let ret_buffer_size = ctx.rets_bytes() as u64;

        Ok(Self {
            attribs: kernel_attribs,
            pipelines,
            args_buffer_size,
            ret_buffer_size,
            num_snode_trees,
        })
    }

    /// Kernel attributes.
    pub fn attribs(&self) -> &KernelAttributes {
        &self.attribs
    }

    /// Pipelines, one per task.
    pub fn pipelines(&self) -> &[D::Pipeline] {
        &self.pipelines
    }

    /// Tasks paired with their pipelines.
    pub fn tasks(&self) -> impl Iterator<Item = (&TaskAttributes, &D::Pipeline)> {
        self.attribs.tasks.iter().zip(&self.pipelines)
    }

    /// Args buffer size; 0 when the kernel takes no arguments.
    pub fn args_buffer_size(&self) -> u64 {
        self.args_buffer_size
    }

    /// Returns buffer size; 0 when the kernel returns nothing.
    pub fn ret_buffer_size(&self) -> u64 {
        self.ret_buffer_size
    }

    /// Data trees known at registration.
    pub fn num_snode_trees(&self) -> usize {
        self.num_snode_trees
    }
}

/// Shared registry entry.
pub(crate) type KernelRef<D> = Arc<CompiledKernel<D>>;
