//! Builtin functions with known semantics.
//!
//! A call to an external function declared with a [`Builtin`] identity is analyzed according to
//! the builtin's semantics instead of as an opaque call.

use core::fmt;
use core::str::FromStr;

macro_rules! define_builtins {
    ($($(#[$doc:meta])* $variant:ident: $name:literal,)*) => {
        /// A builtin function identity.
        #[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
        pub enum Builtin {
            $($(#[$doc])* $variant,)*
        }

        impl Builtin {
            /// All the builtins.
            pub const ALL: &'static [Builtin] = &[$(Builtin::$variant,)*];

            /// The C name of the builtin.
            pub fn name(self) -> &'static str {
                match self {
                    $(Builtin::$variant => $name,)*
                }
            }
        }

        impl FromStr for Builtin {
            type Err = ();

            fn from_str(s: &str) -> Result<Self, ()> {
                match s {
                    $($name => Ok(Builtin::$variant),)*
                    _ => Err(()),
                }
            }
        }
    };
}

define_builtins! {
    /// `strcpy(dst, src)`.
    Strcpy: "strcpy",
    /// `strncpy(dst, src, n)`.
    Strncpy: "strncpy",
    /// `stpcpy(dst, src)`.
    Stpcpy: "stpcpy",
    /// `stpncpy(dst, src, n)`.
    Stpncpy: "stpncpy",
    /// `strcat(dst, src)`.
    Strcat: "strcat",
    /// `strncat(dst, src, n)`.
    Strncat: "strncat",
    /// `memcpy(dst, src, n)`.
    Memcpy: "memcpy",
    /// `memmove(dst, src, n)`.
    Memmove: "memmove",
    /// `mempcpy(dst, src, n)`.
    Mempcpy: "mempcpy",
    /// `memset(dst, c, n)`.
    Memset: "memset",
    /// `bcopy(src, dst, n)`.
    Bcopy: "bcopy",
    /// Object size checking variant of `strcpy`.
    StrcpyChk: "__strcpy_chk",
    /// Object size checking variant of `strncpy`.
    StrncpyChk: "__strncpy_chk",
    /// Object size checking variant of `stpcpy`.
    StpcpyChk: "__stpcpy_chk",
    /// Object size checking variant of `stpncpy`.
    StpncpyChk: "__stpncpy_chk",
    /// Object size checking variant of `strcat`.
    StrcatChk: "__strcat_chk",
    /// Object size checking variant of `strncat`.
    StrncatChk: "__strncat_chk",
    /// Object size checking variant of `memcpy`.
    MemcpyChk: "__memcpy_chk",
    /// Object size checking variant of `memmove`.
    MemmoveChk: "__memmove_chk",
    /// Object size checking variant of `mempcpy`.
    MempcpyChk: "__mempcpy_chk",
    /// Object size checking variant of `memset`.
    MemsetChk: "__memset_chk",
    /// `strdup(s)`.
    Strdup: "strdup",
    /// `strndup(s, n)`.
    Strndup: "strndup",
    /// `index(s, c)`.
    Index: "index",
    /// `strchr(s, c)`.
    Strchr: "strchr",
    /// `strrchr(s, c)`.
    Strrchr: "strrchr",
    /// `memchr(s, c, n)`.
    Memchr: "memchr",
    /// `strstr(haystack, needle)`.
    Strstr: "strstr",
    /// `strpbrk(s, accept)`.
    Strpbrk: "strpbrk",
    /// `malloc(n)`.
    Malloc: "malloc",
    /// `aligned_alloc(align, n)`.
    AlignedAlloc: "aligned_alloc",
    /// `calloc(n, size)`.
    Calloc: "calloc",
    /// `realloc(p, n)`.
    Realloc: "realloc",
    /// `posix_memalign(pp, align, n)`.
    PosixMemalign: "posix_memalign",
    /// `free(p)`.
    Free: "free",
    /// `alloca(n)`.
    Alloca: "alloca",
    /// Save the stack pointer.
    StackSave: "__builtin_stack_save",
    /// Restore the stack pointer.
    StackRestore: "__builtin_stack_restore",
    /// `__builtin_assume_aligned(p, align)`.
    AssumeAligned: "__builtin_assume_aligned",
    /// `va_end(ap)`.
    VaEnd: "__builtin_va_end",
    /// `frexp(x, exp)`.
    Frexp: "frexp",
    /// `modf(x, iptr)`.
    Modf: "modf",
    /// `gamma_r(x, sign)`.
    GammaR: "gamma_r",
    /// `lgamma_r(x, sign)`.
    LgammaR: "lgamma_r",
    /// `remquo(x, y, quo)`.
    Remquo: "remquo",
    /// `sincos(x, sin, cos)`.
    Sincos: "sincos",
    /// `sqrt(x)`.
    Sqrt: "sqrt",
    /// A full memory barrier.
    SyncSynchronize: "__sync_synchronize",
    /// Atomic fetch-and-add.
    SyncFetchAndAdd: "__sync_fetch_and_add",
    /// Start of an OpenMP atomic region.
    GompAtomicStart: "GOMP_atomic_start",
    /// End of an OpenMP atomic region.
    GompAtomicEnd: "GOMP_atomic_end",
    /// OpenMP barrier.
    GompBarrier: "GOMP_barrier",
    /// OpenMP task wait.
    GompTaskwait: "GOMP_taskwait",
    /// Start of an OpenMP critical region.
    GompCriticalStart: "GOMP_critical_start",
    /// End of an OpenMP critical region.
    GompCriticalEnd: "GOMP_critical_end",
    /// Population count.
    Popcount: "__builtin_popcount",
    /// Find first set bit, 1-based.
    Ffs: "__builtin_ffs",
    /// Parity.
    Parity: "__builtin_parity",
    /// Count leading zeros.
    Clz: "__builtin_clz",
    /// Count trailing zeros.
    Ctz: "__builtin_ctz",
    /// Is the argument a compile-time constant?
    ConstantP: "__builtin_constant_p",
}

impl Builtin {
    /// Does the builtin allocate memory and return a pointer to it?
    pub fn is_allocation(self) -> bool {
        matches!(
            self,
            Builtin::Malloc
                | Builtin::AlignedAlloc
                | Builtin::Calloc
                | Builtin::Realloc
                | Builtin::Strdup
                | Builtin::Strndup
                | Builtin::Alloca
        )
    }
}

impl fmt::Display for Builtin {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip() {
        for &b in Builtin::ALL {
            assert_eq!(b.name().parse::<Builtin>(), Ok(b));
        }
        assert_eq!("printf".parse::<Builtin>(), Err(()));
        assert_eq!(Builtin::MemcpyChk.to_string(), "__memcpy_chk");
    }
}
