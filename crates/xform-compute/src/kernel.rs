//! Kernel signatures and argument binding.
//!
//! Every kernel takes `(src, dst, extras...)`. Positions 0 and 1 are the
//! source texture and destination storage texture and are bound by type;
//! the extras are validated here against the declared signature and
//! packed into the kernel's parameter uniform.

use bytemuck::{Pod, Zeroable};

use crate::{XformError, XformResult};

pub const RECSCALE: &str = "image_recscale";
pub const ROTATE: &str = "image_rotate";
pub const FLIP_H: &str = "image_flip_h";
pub const FLIP_V: &str = "image_flip_v";
pub const FLIP_HV: &str = "image_flip_hv";
pub const AFFINE: &str = "image_affine";
pub const AFFINE2: &str = "image_affine2";

/// Position of the first extra argument.
pub const FIRST_EXTRA_ARG: usize = 2;

/// Number of f32 slots in a [`ParamBlock`].
const PARAM_SLOTS: usize = 8;

/// Scalar or vector kernel parameter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum KernelArg {
    Float(f32),
    Float2([f32; 2]),
}

impl KernelArg {
    pub fn kind(&self) -> ArgKind {
        match self {
            Self::Float(_) => ArgKind::Float,
            Self::Float2(_) => ArgKind::Float2,
        }
    }
}

/// Declared type of an extra kernel parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
    Float,
    Float2,
}

/// Entry point name plus the types of its extra parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelSignature {
    pub name: &'static str,
    pub params: &'static [ArgKind],
    /// Nearest-neighbour kernels read with `textureLoad`, the rest sample linearly.
    pub nearest: bool,
}

/// The fixed kernel library. All seven must build for an environment to exist.
pub static KERNELS: [KernelSignature; 7] = [
    KernelSignature {
        name: RECSCALE,
        params: &[ArgKind::Float, ArgKind::Float],
        nearest: false,
    },
    KernelSignature {
        name: ROTATE,
        params: &[ArgKind::Float, ArgKind::Float],
        nearest: false,
    },
    KernelSignature {
        name: FLIP_H,
        params: &[],
        nearest: true,
    },
    KernelSignature {
        name: FLIP_V,
        params: &[],
        nearest: true,
    },
    KernelSignature {
        name: FLIP_HV,
        params: &[],
        nearest: true,
    },
    KernelSignature {
        name: AFFINE,
        params: &[ArgKind::Float2, ArgKind::Float2],
        nearest: false,
    },
    KernelSignature {
        name: AFFINE2,
        params: &[ArgKind::Float2, ArgKind::Float2, ArgKind::Float2, ArgKind::Float2],
        nearest: false,
    },
];

/// Look up a kernel signature by entry point name.
pub fn signature(name: &str) -> Option<&'static KernelSignature> {
    KERNELS.iter().find(|k| k.name == name)
}

/// Uniform block holding packed extra arguments.
///
/// Matches the WGSL `Params { lo: vec4<f32>, hi: vec4<f32> }` layout.
/// A `Float` takes one slot, a `Float2` an even-aligned pair.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub(crate) struct ParamBlock {
    pub(crate) slots: [f32; PARAM_SLOTS],
}

pub(crate) const PARAM_BLOCK_SIZE: u64 = std::mem::size_of::<ParamBlock>() as u64;

impl KernelSignature {
    /// Validate `args` against this signature and pack them.
    ///
    /// Errors carry the positional index of the offending argument,
    /// counting the source and destination images as 0 and 1.
    pub(crate) fn bind(&self, args: &[KernelArg]) -> XformResult<ParamBlock> {
        let fail = |index: usize, reason: String| XformError::ArgumentBindingFailed {
            kernel: self.name,
            index,
            reason,
        };

        if args.len() > self.params.len() {
            return Err(fail(
                FIRST_EXTRA_ARG + self.params.len(),
                format!("takes {} extra arguments, got {}", self.params.len(), args.len()),
            ));
        }
        if args.len() < self.params.len() {
            return Err(fail(
                FIRST_EXTRA_ARG + args.len(),
                format!("missing argument, expected {:?}", self.params[args.len()]),
            ));
        }

        let mut block = ParamBlock::default();
        let mut cursor = 0usize;

        for (i, (arg, expected)) in args.iter().zip(self.params).enumerate() {
            if arg.kind() != *expected {
                return Err(fail(
                    FIRST_EXTRA_ARG + i,
                    format!("expected {:?}, got {:?}", expected, arg.kind()),
                ));
            }
            match *arg {
                KernelArg::Float(v) => {
                    block.slots[cursor] = v;
                    cursor += 1;
                }
                KernelArg::Float2([x, y]) => {
                    cursor += cursor % 2;
                    if cursor + 2 > PARAM_SLOTS {
                        return Err(fail(FIRST_EXTRA_ARG + i, "parameter block overflow".into()));
                    }
                    block.slots[cursor] = x;
                    block.slots[cursor + 1] = y;
                    cursor += 2;
                }
            }
        }

        Ok(block)
    }
}
