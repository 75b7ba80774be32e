//! Memory effects of builtin functions.
//!
//! Calls to well-known library functions do not need to be treated as escape points: their
//! reads and writes are described by the argument that points to the accessed memory and the
//! argument giving its size.

use crate::ir::Builtin;

/// How much memory a builtin accesses through a pointer argument.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccessSize {
    /// The number of bytes is given by an argument.
    Arg(usize),
    /// A pointer-sized object.
    Pointer,
    /// An unknown number of bytes starting at the pointer.
    Unbounded,
    /// Anything the pointer points to, wherever in the object.
    Pointee,
}

/// Memory accessed through the pointer argument `ptr`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MemArg {
    /// Index of the pointer argument.
    pub ptr: usize,
    /// Extent of the access.
    pub size: AccessSize,
}

/// How a builtin interacts with `errno`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrnoEffect {
    /// The builtin leaves `errno` alone.
    None,
    /// The builtin may set `errno` on failure, and does nothing else to memory beyond its
    /// listed writes.
    Sets,
    /// With `errno` math the memory effects are not described beyond the listed writes.
    Untracked,
}

/// The memory effects of a builtin.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BuiltinEffects {
    /// All memory the builtin reads, or `None` if unknown.
    pub reads: Option<&'static [MemArg]>,
    /// All memory the builtin writes, or `None` if unknown.
    pub writes: Option<&'static [MemArg]>,
    /// The builtin synchronizes threads and must be treated as using and clobbering all memory.
    pub barrier: bool,
    /// Interaction with `errno`.
    pub errno: ErrnoEffect,
}

const fn arg(ptr: usize, size: usize) -> MemArg {
    MemArg {
        ptr,
        size: AccessSize::Arg(size),
    }
}

const fn unbounded(ptr: usize) -> MemArg {
    MemArg {
        ptr,
        size: AccessSize::Unbounded,
    }
}

const fn pointee(ptr: usize) -> MemArg {
    MemArg {
        ptr,
        size: AccessSize::Pointee,
    }
}

const UNKNOWN: BuiltinEffects = BuiltinEffects {
    reads: None,
    writes: None,
    barrier: false,
    errno: ErrnoEffect::None,
};

const BARRIER: BuiltinEffects = BuiltinEffects {
    barrier: true,
    ..UNKNOWN
};

const fn effects(reads: &'static [MemArg], writes: &'static [MemArg]) -> BuiltinEffects {
    BuiltinEffects {
        reads: Some(reads),
        writes: Some(writes),
        barrier: false,
        errno: ErrnoEffect::None,
    }
}

const fn with_errno(mut e: BuiltinEffects, errno: ErrnoEffect) -> BuiltinEffects {
    e.errno = errno;
    e
}

const COPY_STRING: BuiltinEffects = effects(&[unbounded(1)], &[unbounded(0)]);
const COPY_SIZED: BuiltinEffects = effects(&[arg(1, 2)], &[arg(0, 2)]);
const CONCAT: BuiltinEffects = effects(&[unbounded(0), unbounded(1)], &[unbounded(0)]);
// The destination is written after its terminating NUL, the bound only applies to the source.
const CONCAT_SIZED: BuiltinEffects = effects(&[unbounded(0), arg(1, 2)], &[unbounded(0)]);
const SET: BuiltinEffects = effects(&[], &[arg(0, 2)]);
const BCOPY: BuiltinEffects = effects(&[arg(0, 2)], &[arg(1, 2)]);
const DUP: BuiltinEffects = with_errno(effects(&[unbounded(0)], &[]), ErrnoEffect::Sets);
const DUP_SIZED: BuiltinEffects = with_errno(effects(&[arg(0, 1)], &[]), ErrnoEffect::Sets);
const SEARCH: BuiltinEffects = BuiltinEffects {
    reads: Some(&[unbounded(0)]),
    ..UNKNOWN
};
const SEARCH_SIZED: BuiltinEffects = BuiltinEffects {
    reads: Some(&[arg(0, 2)]),
    ..UNKNOWN
};
const SEARCH_TWO: BuiltinEffects = BuiltinEffects {
    reads: Some(&[unbounded(0), unbounded(1)]),
    ..UNKNOWN
};
const ALLOC: BuiltinEffects = with_errno(effects(&[], &[]), ErrnoEffect::Sets);
const POSIX_MEMALIGN: BuiltinEffects = with_errno(
    effects(
        &[],
        &[MemArg {
            ptr: 0,
            size: AccessSize::Pointer,
        }],
    ),
    ErrnoEffect::Sets,
);
const REALLOC: BuiltinEffects = with_errno(effects(&[arg(0, 1)], &[pointee(0)]), ErrnoEffect::Sets);
// Freed memory cannot be accessed anymore, so the call is a barrier for accesses to it.
const FREE: BuiltinEffects = effects(&[], &[pointee(0)]);
const NO_MEMORY: BuiltinEffects = effects(&[], &[]);
const STACK_RESTORE: BuiltinEffects = BuiltinEffects {
    reads: Some(&[]),
    ..UNKNOWN
};
const OUT_ARG: BuiltinEffects = effects(&[], &[pointee(1)]);
const OUT_ARG_ERRNO: BuiltinEffects = with_errno(OUT_ARG, ErrnoEffect::Untracked);
const REMQUO: BuiltinEffects = with_errno(effects(&[], &[pointee(2)]), ErrnoEffect::Untracked);
const SINCOS: BuiltinEffects = effects(&[], &[pointee(1), pointee(2)]);

impl BuiltinEffects {
    /// The memory effects of `builtin`.
    pub fn of(builtin: Builtin) -> Self {
        use Builtin::*;
        match builtin {
            Strcpy | Stpcpy | StrcpyChk | StpcpyChk => COPY_STRING,
            Strncpy | Stpncpy | Memcpy | Memmove | Mempcpy | StrncpyChk | StpncpyChk
            | MemcpyChk | MemmoveChk | MempcpyChk => COPY_SIZED,
            Strcat | StrcatChk => CONCAT,
            Strncat | StrncatChk => CONCAT_SIZED,
            Memset | MemsetChk => SET,
            Bcopy => BCOPY,
            Strdup => DUP,
            Strndup => DUP_SIZED,
            Index | Strchr | Strrchr => SEARCH,
            Memchr => SEARCH_SIZED,
            Strstr | Strpbrk => SEARCH_TWO,
            Malloc | AlignedAlloc | Calloc => ALLOC,
            PosixMemalign => POSIX_MEMALIGN,
            Realloc => REALLOC,
            Free | VaEnd => FREE,
            Alloca | StackSave | AssumeAligned => NO_MEMORY,
            StackRestore => STACK_RESTORE,
            Frexp | Modf => OUT_ARG,
            GammaR | LgammaR => OUT_ARG_ERRNO,
            Remquo => REMQUO,
            Sincos => SINCOS,
            SyncSynchronize | SyncFetchAndAdd | GompAtomicStart | GompAtomicEnd | GompBarrier
            | GompTaskwait | GompCriticalStart | GompCriticalEnd => BARRIER,
            Sqrt | Popcount | Ffs | Parity | Clz | Ctz | ConstantP => UNKNOWN,
        }
    }

    /// Are the reads of the builtin fully described?
    pub fn reads_known(&self) -> bool {
        self.reads.is_some() && !self.barrier
    }
}
