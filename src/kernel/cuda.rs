//! CUDA lowering: produces CUDA C source from a kernel plan.
//!
//! Thread mapping: one thread block per IJ tile of the plane, threads
//! iterate k in the multistage's execution order. IJ caches live in shared
//! memory and are filled cooperatively before a `__syncthreads()`; fields
//! that no stage writes are read through `__ldg`. K and IJK caches are
//! served from global memory.

use std::collections::BTreeSet;

use super::{KernelCache, KernelLowering, KernelMultistage, KernelPlan};
use crate::compose::{CachePolicy, CacheScope, ExecutionOrder};
use crate::diagnostic::Diagnostic;
use crate::exec::BackendKind;
use crate::grid::KRange;
use crate::span::Span;
use crate::stencil::{Accessor, BinOp, Expr, UnOp};

const MAX_THREADS_PER_BLOCK: usize = 1024;

#[derive(Default)]
pub struct CudaLowering;

impl CudaLowering {
    pub fn new() -> Self {
        Self
    }
}

/// Per-stage lowering context.
struct Ctx<'a> {
    plan: &'a KernelPlan,
    ms: &'a KernelMultistage,
    /// Param index to argument index of the stage being lowered.
    args: &'a [usize],
}

impl Ctx<'_> {
    fn name(&self, arg: usize) -> String {
        ident(&self.plan.args[arg].name)
    }

    fn ij_cache(&self, arg: usize) -> Option<&KernelCache> {
        self.ms
            .caches
            .iter()
            .find(|c| c.arg == arg && c.scope == CacheScope::IJ)
    }

    fn literal(&self, v: f64) -> String {
        let suffix = if self.plan.value_type == "float" { "f" } else { "" };
        if v.is_nan() {
            return "NAN".to_string();
        }
        if v.is_infinite() {
            return if v > 0.0 { "INFINITY" } else { "(-INFINITY)" }.to_string();
        }
        let text = format!("{:?}{}", v, suffix);
        if v < 0.0 {
            format!("({})", text)
        } else {
            text
        }
    }

    fn load(&self, acc: &Accessor) -> String {
        let arg = self.args[acc.param];
        let name = self.name(arg);
        let [di, dj, dk] = acc.offset;
        if acc.snapshot == 0 && self.ij_cache(arg).is_some() {
            return format!("ij_{}[TILE_{}({}, {})]", name, name, shift("i", di), shift("j", dj));
        }
        let ptr = if acc.snapshot == 0 {
            name.clone()
        } else {
            format!("{}_s{}", name, acc.snapshot)
        };
        let idx = format!(
            "IDX_{}({}, {}, {})",
            name,
            shift("i", di),
            shift("j", dj),
            shift("k", dk)
        );
        if self.ms.readonly[arg] {
            format!("__ldg(&{}[{}])", ptr, idx)
        } else {
            format!("{}[{}]", ptr, idx)
        }
    }

    fn expr(&self, e: &Expr) -> String {
        match e {
            Expr::Const(v) => self.literal(*v),
            Expr::Load(acc) => self.load(acc),
            Expr::Unary(op, a) => {
                let a = self.expr(a);
                match op {
                    UnOp::Neg => format!("(-{})", a),
                    UnOp::Abs => format!("fabs({})", a),
                    UnOp::Sqrt => format!("sqrt({})", a),
                    UnOp::Exp => format!("exp({})", a),
                }
            }
            Expr::Binary(op, a, b) => {
                let (a, b) = (self.expr(a), self.expr(b));
                match op {
                    BinOp::Min => format!("fmin({}, {})", a, b),
                    BinOp::Max => format!("fmax({}, {})", a, b),
                    _ => format!("({} {} {})", a, op.as_str(), b),
                }
            }
        }
    }

    /// Statements storing `value` into the param's argument at (i, j, k).
    fn store(&self, param: usize, value: &str, out: &mut Vec<String>, indent: &str) {
        let arg = self.args[param];
        let name = self.name(arg);
        let memory = format!("{}{}[IDX_{}(i, j, k)] = {};", indent, name, name, value);
        match self.ij_cache(arg) {
            Some(cache) => {
                out.push(format!("{}ij_{}[TILE_{}(i, j)] = {};", indent, name, name, value));
                if cache.policy == CachePolicy::Fill {
                    out.push(memory);
                }
            }
            None => out.push(memory),
        }
    }
}

fn ident(name: &str) -> String {
    let mut s: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    if s.starts_with(|c: char| c.is_ascii_digit()) {
        s.insert(0, '_');
    }
    s
}

fn shift(var: &str, d: i32) -> String {
    match d {
        0 => var.to_string(),
        d if d > 0 => format!("{} + {}", var, d),
        d => format!("{} - {}", var, -d),
    }
}

/// Merged k ranges of the overloads that write `arg`.
fn writer_ranges(ms: &KernelMultistage, arg: usize) -> Vec<KRange> {
    let mut ranges: Vec<KRange> = ms
        .stages
        .iter()
        .flat_map(|stage| {
            stage.overloads.iter().filter_map(move |o| {
                let body = o.body.as_ref()?;
                let writes = body.iter().any(|a| stage.args[a.target.param] == arg);
                if writes {
                    o.range
                } else {
                    None
                }
            })
        })
        .collect();
    ranges.sort_by_key(|r| r.first);
    let mut merged: Vec<KRange> = Vec::with_capacity(ranges.len());
    for r in ranges {
        match merged.last_mut() {
            Some(last) if r.first <= last.last + 1 => last.last = last.last.max(r.last),
            _ => merged.push(r),
        }
    }
    merged
}

/// C condition selecting the levels of `ranges`.
fn k_guard(ranges: &[KRange]) -> String {
    let terms: Vec<String> = ranges
        .iter()
        .map(|r| {
            if r.first == r.last {
                format!("k == {}", r.first)
            } else {
                format!("k >= {} && k <= {}", r.first, r.last)
            }
        })
        .collect();
    match terms.as_slice() {
        [one] => one.clone(),
        _ => terms.iter().map(|t| format!("({})", t)).collect::<Vec<_>>().join(" || "),
    }
}

impl CudaLowering {
    fn lower_multistage(
        &self,
        plan: &KernelPlan,
        ms: &KernelMultistage,
        block: [usize; 2],
        out: &mut Vec<String>,
    ) -> Result<(), Diagnostic> {
        let ty = plan.value_type;

        // Arguments touched by the multistage, their written set and the
        // snapshots read.
        let mut used = BTreeSet::new();
        let mut written = BTreeSet::new();
        let mut snapshots = BTreeSet::new();
        for stage in &ms.stages {
            used.extend(stage.args.iter().copied());
            for overload in &stage.overloads {
                let Some(body) = &overload.body else {
                    return Err(Diagnostic::error(
                        format!(
                            "stage '{}' has a native body and cannot be lowered to {}",
                            stage.name,
                            self.target_name()
                        ),
                        Span::dummy(),
                    )
                    .with_help("write the body as stencil expressions".to_string()));
                };
                for assign in body {
                    written.insert(stage.args[assign.target.param]);
                    for acc in assign.expr.loads() {
                        if acc.snapshot > 0 {
                            snapshots.insert((stage.args[acc.param], acc.snapshot));
                        }
                    }
                }
            }
        }

        let mut params = Vec::new();
        for &arg in &used {
            let name = ident(&plan.args[arg].name);
            let qualifier = if written.contains(&arg) { "" } else { "const " };
            params.push(format!("{}{}* __restrict__ {}", qualifier, ty, name));
        }
        for &(arg, n) in &snapshots {
            let name = ident(&plan.args[arg].name);
            params.push(format!("const {}* __restrict__ {}_s{}", ty, name, n));
        }

        let (gi, gj) = (plan.grid.i(), plan.grid.j());
        out.push(format!(
            "// multistage {}: {} stage{}, {} order",
            ms.index,
            ms.stages.len(),
            if ms.stages.len() == 1 { "" } else { "s" },
            ms.order
        ));
        out.push(format!(
            "extern \"C\" __global__ void multistage_{}({})",
            ms.index,
            params.join(", ")
        ));
        out.push("{".to_string());
        out.push("    const int tid = threadIdx.y * blockDim.x + threadIdx.x;".to_string());
        out.push("    const int nthreads = blockDim.x * blockDim.y;".to_string());
        out.push(format!("    const int bi = {} + blockIdx.x * {};", gi.begin, block[0]));
        out.push(format!("    const int bj = {} + blockIdx.y * {};", gj.begin, block[1]));
        out.push(format!("    const int bi_end = min(bi + {}, {});", block[0] - 1, gi.end));
        out.push(format!("    const int bj_end = min(bj + {}, {});", block[1] - 1, gj.end));

        let ij_caches: Vec<&KernelCache> = ms
            .caches
            .iter()
            .filter(|c| c.scope == CacheScope::IJ)
            .collect();
        for cache in &ij_caches {
            let name = ident(&plan.args[cache.arg].name);
            let h = cache.halo;
            let tni = block[0] + (h.iminus + h.iplus) as usize;
            let tnj = block[1] + (h.jminus + h.jplus) as usize;
            out.push(format!("    __shared__ {} ij_{}[{}];", ty, name, tni * tnj));
            out.push(format!(
                "#define TILE_{}(i, j) (((i) - bi + {}) + ((j) - bj + {}) * {})",
                name, h.iminus, h.jminus, tni
            ));
        }

        let (first, last) = (ms.k_range.first, ms.k_range.last);
        match ms.order {
            ExecutionOrder::Backward => {
                out.push(format!("    for (int k = {}; k >= {}; --k) {{", last, first))
            }
            _ => out.push(format!("    for (int k = {}; k <= {}; ++k) {{", first, last)),
        }

        // Cooperative fill of the shared tiles.
        let mut filled = false;
        for cache in ij_caches.iter().filter(|c| c.policy == CachePolicy::Fill) {
            let name = ident(&plan.args[cache.arg].name);
            let h = cache.halo;
            let tni = block[0] + (h.iminus + h.iplus) as usize;
            let tnj = block[1] + (h.jminus + h.jplus) as usize;
            let load = if ms.readonly[cache.arg] {
                format!("__ldg(&{}[IDX_{}(i, j, k)])", name, name)
            } else {
                format!("{}[IDX_{}(i, j, k)]", name, name)
            };
            out.push(format!("        for (int p = tid; p < {}; p += nthreads) {{", tni * tnj));
            out.push(format!("            const int i = bi - {} + p % {};", h.iminus, tni));
            out.push(format!("            const int j = bj - {} + p / {};", h.jminus, tni));
            out.push(format!(
                "            if (i <= bi_end + {} && j <= bj_end + {}) ij_{}[p] = {};",
                h.iplus, h.jplus, name, load
            ));
            out.push("        }".to_string());
            filled = true;
        }
        if filled {
            out.push("        __syncthreads();".to_string());
        }

        for (s, stage) in ms.stages.iter().enumerate() {
            let ctx = Ctx {
                plan,
                ms,
                args: &stage.args,
            };
            let e = stage.extent;
            let eni = block[0] + (e.iminus + e.iplus) as usize;
            let enj = block[1] + (e.jminus + e.jplus) as usize;
            out.push(format!("        // stage {}: {}", s, stage.name));
            for overload in &stage.overloads {
                let (Some(range), Some(body)) = (overload.range, &overload.body) else {
                    continue;
                };
                out.push(format!("        if ({}) {{", k_guard(&[range])));
                out.push(format!("            for (int p = tid; p < {}; p += nthreads) {{", eni * enj));
                out.push(format!("                const int i = bi - {} + p % {};", e.iminus, eni));
                out.push(format!("                const int j = bj - {} + p / {};", e.jminus, eni));
                out.push(format!(
                    "                if (i > bi_end + {} || j > bj_end + {}) continue;",
                    e.iplus, e.jplus
                ));
                for (n, assign) in body.iter().enumerate() {
                    let value = format!("v{}", n);
                    out.push(format!(
                        "                const {} {} = {};",
                        ty,
                        value,
                        ctx.expr(&assign.expr)
                    ));
                    ctx.store(assign.target.param, &value, out, "                ");
                }
                out.push("            }".to_string());
                out.push("        }".to_string());
            }
            if s + 1 < ms.stages.len() {
                out.push("        __syncthreads();".to_string());
            }
        }

        // Write back flushed tiles, only at levels where an overload wrote
        // the field; elsewhere the tile holds an earlier level.
        let flushes: Vec<(&KernelCache, Option<String>)> = ij_caches
            .iter()
            .filter(|c| c.policy == CachePolicy::Flush)
            .filter_map(|c| {
                let ranges = writer_ranges(ms, c.arg);
                match ranges.as_slice() {
                    [] => None,
                    [r] if r.first <= first && r.last >= last => Some((*c, None)),
                    _ => Some((*c, Some(k_guard(&ranges)))),
                }
            })
            .collect();
        if !flushes.is_empty() {
            out.push("        __syncthreads();".to_string());
            out.push(format!(
                "        for (int p = tid; p < {}; p += nthreads) {{",
                block[0] * block[1]
            ));
            out.push(format!("            const int i = bi + p % {};", block[0]));
            out.push(format!("            const int j = bj + p / {};", block[0]));
            out.push("            if (i > bi_end || j > bj_end) continue;".to_string());
            for (cache, guard) in &flushes {
                let name = ident(&plan.args[cache.arg].name);
                let store = format!("{}[IDX_{}(i, j, k)] = ij_{}[TILE_{}(i, j)];", name, name, name, name);
                match guard {
                    Some(guard) => out.push(format!("            if ({}) {}", guard, store)),
                    None => out.push(format!("            {}", store)),
                }
            }
            out.push("        }".to_string());
        }
        if !ij_caches.is_empty() {
            out.push("        __syncthreads();".to_string());
        }
        out.push("    }".to_string());

        for cache in &ij_caches {
            out.push(format!("#undef TILE_{}", ident(&plan.args[cache.arg].name)));
        }
        out.push("}".to_string());
        Ok(())
    }
}

impl KernelLowering for CudaLowering {
    fn target_name(&self) -> &str {
        "cuda"
    }

    fn lower(&self, plan: &KernelPlan) -> Result<String, Diagnostic> {
        let threads = plan.block[0].saturating_mul(plan.block[1]);
        let block = if threads == 0 || threads > MAX_THREADS_PER_BLOCK {
            BackendKind::Cuda.default_block()
        } else {
            plan.block
        };
        let (gi, gj) = (plan.grid.i(), plan.grid.j());
        let k = plan.grid.k_range();
        let n_i_blocks = gi.len().div_ceil(block[0]);
        let n_j_blocks = gj.len().div_ceil(block[1]);

        let mut out = vec![
            "// Generated by gridstencil.".to_string(),
            format!(
                "// grid: i {}..={}, j {}..={}, k {}..={}",
                gi.begin, gi.end, gj.begin, gj.end, k.first, k.last
            ),
            format!(
                "// launch every kernel in order with grid ({}, {}) and block ({}, {})",
                n_i_blocks, n_j_blocks, block[0], block[1]
            ),
            String::new(),
        ];

        for arg in &plan.args {
            let name = ident(&arg.name);
            let [s0, s1, s2] = arg.strides;
            if arg.temporary {
                let [d0, d1, d2] = arg.dims;
                out.push(format!(
                    "#define IDX_{}(i, j, k) (((((i) % {d0}) + {d0}) % {d0}) * {} + ((((j) % {d1}) + {d1}) % {d1}) * {} + ((((k) % {d2}) + {d2}) % {d2}) * {})",
                    name, s0, s1, s2
                ));
            } else {
                out.push(format!(
                    "#define IDX_{}(i, j, k) ((i) * {} + (j) * {} + (k) * {})",
                    name, s0, s1, s2
                ));
            }
        }

        for ms in &plan.multistages {
            out.push(String::new());
            self.lower_multistage(plan, ms, block, &mut out)?;
        }
        out.push(String::new());
        Ok(out.join("\n"))
    }
}
