//! Memory effects of calls.

use crate::alias::ao_ref::AoRef;
use crate::alias::builtins::{AccessSize, BuiltinEffects, ErrnoEffect, MemArg};
use crate::alias::oracle::AliasOracle;
use crate::ir::{ArgValue, CallData, CallFlags, Callee, Operand, RefBase, TypeKind};
use crate::trace;

impl<'a> AliasOracle<'a> {
    /// May `call` read the memory of `r`?
    pub fn ref_maybe_used_by_call(&self, call: &CallData, r: &AoRef, tbaa_p: bool) -> bool {
        let res = self.ref_maybe_used_by_call_1(call, r, tbaa_p);
        trace!("call {:?} may use {r}: {res}", call.callee);
        if let Some(stats) = self.stats {
            stats.ref_maybe_used_by_call.record(res);
        }
        res
    }

    /// May `call` write the memory of `r`?
    pub fn call_may_clobber_ref(&self, call: &CallData, r: &AoRef) -> bool {
        let res = self.call_may_clobber_ref_1(call, r);
        trace!("call {:?} may clobber {r}: {res}", call.callee);
        if let Some(stats) = self.stats {
            stats.call_may_clobber_ref.record(res);
        }
        res
    }

    fn ref_maybe_used_by_call_1(&self, call: &CallData, r: &AoRef, tbaa_p: bool) -> bool {
        let func = self.func;

        // Const functions without a static chain only read memory passed by value.
        if call.flags.intersects(CallFlags::CONST | CallFlags::NOVOPS)
            && call.static_chain.is_none()
        {
            return self.ref_used_by_args(call, r, tbaa_p);
        }
        if r.is_volatile() {
            return true;
        }

        let base = r.base(func);
        // Locals whose address is never taken are not visible to the callee.
        if let RefBase::Var(var) = *base {
            let data = func.var(var);
            if !data.may_be_aliased() && !data.is_global() {
                return self.ref_used_by_args(call, r, tbaa_p);
            }
        }

        if let Some(builtin) = self.call_builtin(call) {
            let effects = BuiltinEffects::of(builtin);
            if effects.barrier {
                return true;
            }
            if let Some(reads) = effects.reads {
                let hit = reads
                    .iter()
                    .any(|&arg| self.builtin_arg_may_alias(call, arg, r));
                trace!("{builtin} reads described, hit {hit}");
                return hit;
            }
        }

        if let RefBase::Var(var) = *base {
            let data = func.var(var);
            if data.is_global()
                && let Callee::Direct(f) = call.callee
                && func.ext_funcs[f].never_reads(var)
            {
                return self.ref_used_by_args(call, r, tbaa_p);
            }
            if func.pta.includes(&call.uses, var, data.is_global()) {
                return true;
            }
        } else if let RefBase::Deref(d) = base {
            let Operand::Value(ptr) = d.ptr else {
                return true;
            };
            match func.pta.get(ptr) {
                Some(pt) if !func.pta.intersect(&call.uses, pt) => {}
                _ => return true,
            }
        } else {
            return true;
        }

        self.ref_used_by_args(call, r, tbaa_p)
    }

    /// Aggregates passed by value are read by the call.
    fn ref_used_by_args(&self, call: &CallData, r: &AoRef, tbaa_p: bool) -> bool {
        call.args.iter().any(|arg| match &arg.value {
            ArgValue::Mem(mem) if !arg.unused => {
                self.refs_may_alias_tbaa(&AoRef::new(mem), r, tbaa_p)
            }
            _ => false,
        })
    }

    /// May the memory a builtin accesses through `arg` overlap `r`?
    fn builtin_arg_may_alias(&self, call: &CallData, arg: MemArg, r: &AoRef) -> bool {
        let func = self.func;
        let Some(ptr) = call.arg(arg.ptr) else {
            return true;
        };
        let size = match arg.size {
            AccessSize::Pointee => return self.ptr_deref_may_alias_ref(ptr, r),
            AccessSize::Arg(i) => call.arg(i),
            AccessSize::Pointer => func.types.size_bytes(func.types.void_ptr).map(|bytes| {
                Operand::Const {
                    ty: func.types.size,
                    value: i128::from(bytes),
                }
            }),
            AccessSize::Unbounded => None,
        };
        let dref = AoRef::from_pointer_and_size(func, ptr, size);
        self.refs_may_alias_tbaa(&dref, r, false)
    }

    fn call_may_clobber_ref_1(&self, call: &CallData, r: &AoRef) -> bool {
        let func = self.func;

        if call.flags.intersects(
            CallFlags::CONST | CallFlags::PURE | CallFlags::LOOPING_CONST_OR_PURE | CallFlags::NOVOPS,
        ) {
            return false;
        }
        let base = r.base(func);
        if matches!(base, RefBase::Value(_) | RefBase::Const) {
            return false;
        }
        if r.is_volatile() {
            return true;
        }

        // Locals whose address is never taken, and read-only globals, are not written by the
        // callee.
        if let RefBase::Var(var) = *base {
            let data = func.var(var);
            if !data.may_be_aliased() && (data.readonly || !data.is_global()) {
                return false;
            }
        }
        if let RefBase::Deref(d) = base
            && let Operand::Value(ptr) = d.ptr
            && func.dfg.value_data(ptr).points_to_readonly
        {
            return false;
        }

        if let Some(builtin) = self.call_builtin(call) {
            let effects = BuiltinEffects::of(builtin);
            if effects.barrier {
                return true;
            }
            if let Some(writes) = effects.writes {
                if writes
                    .iter()
                    .any(|&arg| self.builtin_arg_may_alias(call, arg, r))
                {
                    return true;
                }
                match effects.errno {
                    ErrnoEffect::None => return false,
                    ErrnoEffect::Sets => {
                        return self.flags.errno_math() && self.ref_may_alias_errno(r);
                    }
                    ErrnoEffect::Untracked if !self.flags.errno_math() => return false,
                    ErrnoEffect::Untracked => {}
                }
            }
        }

        match *base {
            RefBase::Var(var) => {
                let data = func.var(var);
                if data.is_global()
                    && let Callee::Direct(f) = call.callee
                    && func.ext_funcs[f].never_writes(var)
                {
                    return false;
                }
                func.pta.includes(&call.clobbers, var, data.is_global())
            }
            RefBase::Deref(ref d) => match d.ptr {
                Operand::Value(ptr) => match func.pta.get(ptr) {
                    Some(pt) => func.pta.intersect(&call.clobbers, pt),
                    None => true,
                },
                _ => true,
            },
            _ => true,
        }
    }

    /// May `r` be the `errno` location?
    pub fn ref_may_alias_errno(&self, r: &AoRef) -> bool {
        let func = self.func;
        let ty = match r.mem() {
            Some(mem) => mem.ty(func),
            None => return false,
        };
        // errno is an int.
        if !matches!(
            func.types.kind(ty),
            TypeKind::Int {
                bits: 32,
                signed: true,
                ..
            }
        ) {
            return false;
        }
        match *r.base(func) {
            // errno is defined in the C library.
            RefBase::Var(var) => func.var(var).is_external(),
            RefBase::Deref(ref d) => match d.ptr {
                Operand::Value(ptr) => func
                    .pta
                    .get(ptr)
                    .is_none_or(|pt| pt.anything || pt.nonlocal),
                _ => false,
            },
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alias::stats::AliasStats;
    use crate::ir::{Builtin, CallArg, Deref, ExtFuncData, Function, Linkage, MemRef, PtSolution, VarData};
    use crate::settings::{self, Configurable, Flags};
    use crate::test_utils::init_logging;

    #[test]
    fn memcpy_effects() {
        init_logging();
        let mut func = Function::new();
        let i64t = func.types.int(64, true);
        let pi = func.types.pointer_to(i64t);
        let size = func.types.size;
        let dst = func.declare_param("dst", pi);
        let src = func.declare_param("src", pi);
        let unrelated = func.declare_var(VarData::local("u", i64t));
        let taken = func.declare_var(VarData::local("t", i64t).address_taken());
        let other = func.declare_var(VarData::local("o", i64t).address_taken());
        let memcpy = func.import_function(ExtFuncData::builtin(Builtin::Memcpy));
        let eight = func.iconst(size, 8);
        let call = CallData::new(
            Callee::Direct(memcpy),
            [dst.into(), src.into(), eight].map(CallArg::from),
        );
        func.pta.set(dst, PtSolution::vars([taken]));
        func.pta.set(src, PtSolution::anything());

        let stats = AliasStats::default();
        let flags = Flags::default();
        let oracle = AliasOracle::new(&func, &flags).with_stats(&stats);
        let load_dst = MemRef::deref(Deref::new(dst.into(), i64t, pi));
        let load_src = MemRef::deref(Deref::new(src.into(), i64t, pi));
        let local = MemRef::var(unrelated);
        let (rd, rs, rl) = (AoRef::new(&load_dst), AoRef::new(&load_src), AoRef::new(&local));

        assert!(oracle.call_may_clobber_ref(&call, &rd));
        assert!(!oracle.call_may_clobber_ref(&call, &rl));
        assert!(oracle.ref_maybe_used_by_call(&call, &rs, true));
        assert!(!oracle.ref_maybe_used_by_call(&call, &rl, true));

        // The copy only writes the object dst points to.
        let mt = MemRef::var(taken);
        assert!(oracle.call_may_clobber_ref(&call, &AoRef::new(&mt)));
        let other = MemRef::var(other);
        assert!(!oracle.call_may_clobber_ref(&call, &AoRef::new(&other)));

        assert_eq!(stats.call_may_clobber_ref.queries(), 4);
        assert_eq!(stats.ref_maybe_used_by_call.queries(), 2);
    }

    #[test]
    fn const_and_pure_calls() {
        let mut func = Function::new();
        let i32t = func.types.int(32, true);
        let g = func.declare_var(VarData::global("g", i32t, Linkage::Public));
        let f = func.import_function(ExtFuncData::new("f"));
        let mut pure = CallData::new(Callee::Direct(f), []);
        pure.flags = CallFlags::PURE;
        let mut konst = CallData::new(Callee::Direct(f), []);
        konst.flags = CallFlags::CONST;
        let plain = CallData::new(Callee::Direct(f), []);

        let flags = Flags::default();
        let oracle = AliasOracle::new(&func, &flags);
        let mg = MemRef::var(g);
        let rg = AoRef::new(&mg);
        assert!(!oracle.call_may_clobber_ref(&pure, &rg));
        assert!(oracle.ref_maybe_used_by_call(&pure, &rg, true));
        assert!(!oracle.call_may_clobber_ref(&konst, &rg));
        assert!(!oracle.ref_maybe_used_by_call(&konst, &rg, true));
        assert!(oracle.call_may_clobber_ref(&plain, &rg));

        // A const call still reads aggregates passed by value.
        let mut by_value = CallData::new(
            Callee::Direct(f),
            [CallArg {
                value: ArgValue::Mem(Box::new(MemRef::var(g))),
                unused: false,
            }],
        );
        by_value.flags = CallFlags::CONST;
        assert!(oracle.ref_maybe_used_by_call(&by_value, &rg, true));
    }

    #[test]
    fn points_to_of_uses_and_clobbers() {
        let mut func = Function::new();
        let i32t = func.types.int(32, true);
        let a = func.declare_var(VarData::local("a", i32t).address_taken());
        let b = func.declare_var(VarData::local("b", i32t).address_taken());
        let f = func.import_function(ExtFuncData::new("f"));
        let mut call = CallData::new(Callee::Direct(f), []);
        call.uses = PtSolution::vars([a]);
        call.clobbers = PtSolution::vars([a, b]);

        let flags = Flags::default();
        let oracle = AliasOracle::new(&func, &flags);
        let (ma, mb) = (MemRef::var(a), MemRef::var(b));
        let (ra, rb) = (AoRef::new(&ma), AoRef::new(&mb));
        assert!(oracle.ref_maybe_used_by_call(&call, &ra, true));
        assert!(!oracle.ref_maybe_used_by_call(&call, &rb, true));
        assert!(oracle.call_may_clobber_ref(&call, &rb));
    }

    #[test]
    fn errno() {
        let mut func = Function::new();
        let i32t = func.types.int(32, true);
        let errno = func.declare_var(VarData::global("errno", i32t, Linkage::External));
        let size = func.types.size;
        let malloc = func.import_function(ExtFuncData::builtin(Builtin::Malloc));
        let n = func.iconst(size, 16);
        let call = CallData::new(Callee::Direct(malloc), [CallArg::from(n)]);
        let mem = MemRef::var(errno);
        let r = AoRef::new(&mem);

        let flags = Flags::default();
        let oracle = AliasOracle::new(&func, &flags);
        assert!(oracle.ref_may_alias_errno(&r));
        assert!(oracle.call_may_clobber_ref(&call, &r));

        let mut b = settings::builder();
        b.set("errno_math", "false").unwrap();
        let flags = Flags::new(b);
        let oracle = AliasOracle::new(&func, &flags);
        assert!(!oracle.call_may_clobber_ref(&call, &r));
    }

    #[test]
    fn barriers() {
        let mut func = Function::new();
        let i32t = func.types.int(32, true);
        let g = func.declare_var(VarData::global("g", i32t, Linkage::Static).address_taken());
        let sync = func.import_function(ExtFuncData::builtin(Builtin::SyncSynchronize));
        let call = CallData::new(Callee::Direct(sync), []);
        let flags = Flags::default();
        let oracle = AliasOracle::new(&func, &flags);
        let mem = MemRef::var(g);
        let r = AoRef::new(&mem);
        assert!(oracle.call_may_clobber_ref(&call, &r));
        assert!(oracle.ref_maybe_used_by_call(&call, &r, true));
    }
}
